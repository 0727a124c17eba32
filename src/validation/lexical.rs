//! Lexical helpers shared by the SQL validator and the condition extractor.

/// Result of scanning SQL for quoted regions
#[derive(Debug, Clone)]
pub(crate) struct LiteralScan {
    /// Input with literal bodies blanked, same byte length as the input
    pub masked: String,
    /// Every literal, quoted identifier and dollar-quoted body was closed
    pub terminated: bool,
    /// An `E'...'` string with backslash escapes was seen
    pub escape_strings: bool,
    /// A `$tag$...$tag$` body was seen
    pub dollar_quotes: bool,
}

/// Blank out the contents of string literals, preserving byte offsets.
///
/// Understands `'...'` with `''` escapes, `E'...'` with backslash escapes and
/// `$tag$...$tag$` bodies. Double-quoted identifiers are kept verbatim but
/// quotes inside them do not open a literal.
pub(crate) fn scan_literals(sql: &str) -> LiteralScan {
    let bytes = sql.as_bytes();
    let mut scan = LiteralScan {
        masked: String::with_capacity(sql.len()),
        terminated: true,
        escape_strings: false,
        dollar_quotes: false,
    };
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                let backslash = is_escape_string_prefix(bytes, i);
                scan.escape_strings |= backslash;
                scan.masked.push('\'');
                match closing_single_quote(bytes, i + 1, backslash) {
                    Some(end) => {
                        blank(&mut scan.masked, end - i - 1);
                        scan.masked.push('\'');
                        i = end + 1;
                    }
                    None => {
                        blank(&mut scan.masked, bytes.len() - i - 1);
                        scan.terminated = false;
                        break;
                    }
                }
            }
            b'"' => match closing_double_quote(bytes, i + 1) {
                Some(end) => {
                    scan.masked.push_str(&sql[i..=end]);
                    i = end + 1;
                }
                None => {
                    scan.masked.push_str(&sql[i..]);
                    scan.terminated = false;
                    break;
                }
            },
            b'$' => match dollar_tag_len(bytes, i) {
                Some(tag_len) => {
                    scan.dollar_quotes = true;
                    let tag = &sql[i..i + tag_len];
                    let body_start = i + tag_len;
                    scan.masked.push_str(tag);
                    match sql[body_start..].find(tag) {
                        Some(body_len) => {
                            blank(&mut scan.masked, body_len);
                            scan.masked.push_str(tag);
                            i = body_start + body_len + tag_len;
                        }
                        None => {
                            blank(&mut scan.masked, bytes.len() - body_start);
                            scan.terminated = false;
                            break;
                        }
                    }
                }
                None => {
                    scan.masked.push('$');
                    i += 1;
                }
            },
            _ => {
                let Some(c) = sql[i..].chars().next() else {
                    break;
                };
                scan.masked.push(c);
                i += c.len_utf8();
            }
        }
    }

    scan
}

/// Masked text and whether every literal was terminated
pub(crate) fn mask_string_literals(sql: &str) -> (String, bool) {
    let scan = scan_literals(sql);
    (scan.masked, scan.terminated)
}

fn blank(masked: &mut String, len: usize) {
    masked.extend(std::iter::repeat(' ').take(len));
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// `E'` / `e'` not preceded by another identifier character
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    quote >= 1
        && matches!(bytes[quote - 1], b'E' | b'e')
        && (quote < 2 || !(is_identifier_byte(bytes[quote - 2]) || bytes[quote - 2] == b'$'))
}

fn closing_single_quote(bytes: &[u8], mut j: usize, backslash_escapes: bool) -> Option<usize> {
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if backslash_escapes => j += 2,
            b'\'' if bytes.get(j + 1) == Some(&b'\'') => j += 2,
            b'\'' => return Some(j),
            _ => j += 1,
        }
    }
    None
}

fn closing_double_quote(bytes: &[u8], mut j: usize) -> Option<usize> {
    while j < bytes.len() {
        match bytes[j] {
            b'"' if bytes.get(j + 1) == Some(&b'"') => j += 2,
            b'"' => return Some(j),
            _ => j += 1,
        }
    }
    None
}

/// Length of a `$$` or `$tag$` opener at `start`; positional parameters such
/// as `$1` and identifiers containing `$` are not openers
fn dollar_tag_len(bytes: &[u8], start: usize) -> Option<usize> {
    if start > 0 && (is_identifier_byte(bytes[start - 1]) || bytes[start - 1] == b'$') {
        return None;
    }

    let mut j = start + 1;
    match bytes.get(j) {
        Some(b'$') => return Some(2),
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' || *b >= 0x80 => {}
        _ => return None,
    }
    while j < bytes.len() && is_identifier_byte(bytes[j]) {
        j += 1;
    }

    (bytes.get(j) == Some(&b'$')).then(|| j - start + 1)
}

/// Any `;` before the single optional trailing one
pub(crate) fn has_multiple_statements(masked: &str) -> bool {
    let body = masked.trim_end();
    let body = body.strip_suffix(';').unwrap_or(body);
    body.contains(';')
}

pub(crate) fn paren_depth(prefix: &str) -> i32 {
    prefix.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

/// Split on a separator at parenthesis depth zero. Offsets come from `masked`,
/// text from `original`; both must have the same byte length.
pub(crate) fn split_top_level(original: &str, masked: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;

    for (idx, c) in masked.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if c == separator && depth == 0 => {
                parts.push(original[start..idx].trim().to_string());
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(original[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

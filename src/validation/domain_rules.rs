//! Fixed payment-gateway vocabulary used by the query plan rules.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Domain terms and the entity they imply. Korean terms match as substrings
/// (particles attach to the noun); English terms match as whole words.
pub const DOMAIN_TERMS: &[(&str, &str)] = &[
    ("결제 이력", "PaymentHistory"),
    ("결제이력", "PaymentHistory"),
    ("payment history", "PaymentHistory"),
    ("상태 변경", "PaymentHistory"),
    ("환불", "Refund"),
    ("refund", "Refund"),
    ("취소 요청", "Refund"),
    ("정산", "Settlement"),
    ("settlement", "Settlement"),
    ("payout", "Settlement"),
    ("가맹점", "Merchant"),
    ("상점", "Merchant"),
    ("merchant", "Merchant"),
    ("주문", "Order"),
    ("order", "Order"),
    ("결제", "Payment"),
    ("거래", "Payment"),
    ("승인", "Payment"),
    ("payment", "Payment"),
    ("transaction", "Payment"),
];

pub const KNOWN_ENTITIES: &[&str] = &["Payment", "PaymentHistory", "Refund", "Settlement", "Merchant", "Order"];

/// Entities that can stand in for each other without an entity mismatch
pub const RELATED_ENTITY_GROUPS: &[&[&str]] = &[&["Payment", "PaymentHistory"]];

/// Entities whose tables grow without bound and need a time window or a row cap
pub const TIME_SERIES_ENTITIES: &[&str] = &["Payment", "PaymentHistory", "Refund", "Settlement", "Order"];

pub const ALLOWED_OPERATORS: &[&str] = &[
    "eq", "ne", "gt", "gte", "lt", "lte", "like", "in", "not_in", "between", "is_null", "is_not_null",
];

/// Operators that compare against nothing
pub const UNARY_OPERATORS: &[&str] = &["is_null", "is_not_null"];

pub const ENTITY_FIELDS: &[(&str, &[&str])] = &[
    (
        "Payment",
        &[
            "id", "payment_key", "order_id", "merchant_id", "customer_id", "status", "method", "amount",
            "currency", "approved_at", "created_at", "updated_at",
        ],
    ),
    (
        "PaymentHistory",
        &["id", "payment_id", "merchant_id", "previous_status", "status", "amount", "reason", "created_at"],
    ),
    (
        "Refund",
        &["id", "payment_id", "merchant_id", "status", "amount", "reason", "refunded_at", "created_at"],
    ),
    (
        "Settlement",
        &["id", "merchant_id", "status", "amount", "fee", "net_amount", "settlement_date", "created_at"],
    ),
    (
        "Merchant",
        &["id", "name", "business_number", "category", "status", "created_at", "updated_at"],
    ),
    (
        "Order",
        &["id", "merchant_id", "customer_id", "status", "total_amount", "created_at", "updated_at"],
    ),
];

/// Phrases that point at the result already on screen
pub const LOCAL_REFERENCE_TRIGGERS: &[&str] = &[
    "이 중", "이중에", "그 중", "그중", "여기서", "거기서", "위 결과", "이 결과", "방금", "these", "those",
    "among them", "from that", "this result", "previous result",
];

/// Status words and the status value they imply
pub const STATUS_TERMS: &[(&str, &str)] = &[
    ("취소", "CANCELED"),
    ("cancel", "CANCELED"),
    ("실패", "FAILED"),
    ("fail", "FAILED"),
    ("완료", "DONE"),
    ("done", "DONE"),
    ("대기", "WAITING"),
    ("pending", "WAITING"),
];

pub const CLARIFICATION_QUESTION: &str = "어떤 데이터를 조회할까요?";

pub const CLARIFICATION_OPTIONS: &[&str] = &["결제 (Payment)", "환불 (Refund)", "정산 (Settlement)", "가맹점 (Merchant)"];

/// Sorting phrases that use "order" without meaning the Order entity
static ORDERING_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:in\s+(?:\w+\s+)?order|(?:descending|ascending|sort|sorted|sorting|reverse|chronological|alphabetical|numerical)\s+order|order(?:ed)?\s+(?:by|of))\b",
    )
    .unwrap()
});

/// Whole-word matchers for the English terms, plural included; `None` for Korean terms
static ENGLISH_TERM_RES: LazyLock<Vec<Option<Regex>>> = LazyLock::new(|| {
    DOMAIN_TERMS
        .iter()
        .map(|(term, _)| {
            term.is_ascii()
                .then(|| Regex::new(&format!(r"\b{}(?:s|es)?\b", regex::escape(term))).unwrap())
        })
        .collect()
});

/// The earliest domain term in the utterance, with its entity. Terms starting
/// at the same position resolve to the longer one, so "결제 이력" wins over "결제".
pub fn find_domain_term(utterance: &str) -> Option<(&'static str, &'static str)> {
    let lower = utterance.to_lowercase();
    let text = ORDERING_PHRASE_RE.replace_all(&lower, |caps: &Captures| " ".repeat(caps[0].len()));

    DOMAIN_TERMS
        .iter()
        .zip(ENGLISH_TERM_RES.iter())
        .filter_map(|((term, entity), english)| {
            let position = match english {
                Some(re) => re.find(&text).map(|m| m.start()),
                None => text.find(term),
            }?;
            Some((position, term.len(), *term, *entity))
        })
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, term, entity)| (term, entity))
}

pub fn entity_for_utterance(utterance: &str) -> Option<&'static str> {
    find_domain_term(utterance).map(|(_, entity)| entity)
}

pub fn has_local_reference(utterance: &str) -> bool {
    let lower = utterance.to_lowercase();
    LOCAL_REFERENCE_TRIGGERS.iter().any(|trigger| lower.contains(trigger))
}

pub fn status_for_utterance(utterance: &str) -> Option<&'static str> {
    let lower = utterance.to_lowercase();
    STATUS_TERMS
        .iter()
        .find(|(term, _)| lower.contains(term))
        .map(|(_, status)| *status)
}

/// Case-insensitive lookup returning the canonical entity name
pub fn canonical_entity(entity: &str) -> Option<&'static str> {
    KNOWN_ENTITIES.iter().copied().find(|known| known.eq_ignore_ascii_case(entity.trim()))
}

pub fn entities_related(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
        || RELATED_ENTITY_GROUPS.iter().any(|group| {
            group.iter().any(|e| e.eq_ignore_ascii_case(a)) && group.iter().any(|e| e.eq_ignore_ascii_case(b))
        })
}

pub fn is_time_series(entity: &str) -> bool {
    TIME_SERIES_ENTITIES.iter().any(|e| e.eq_ignore_ascii_case(entity))
}

pub fn fields_for(entity: &str) -> Option<&'static [&'static str]> {
    ENTITY_FIELDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(entity))
        .map(|(_, fields)| *fields)
}

pub fn is_allowed_operator(operator: &str) -> bool {
    ALLOWED_OPERATORS.contains(&operator.trim().to_lowercase().as_str())
}

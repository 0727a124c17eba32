//! Decides whether an utterance continues the previous query.
//!
//! Precedence is new > filter > aggregation > none. An utterance with both a
//! demonstrative and an aggregation word resolves to `Filter`: narrowing
//! first keeps the aggregation step available on the narrowed set.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::ReferenceType;

const NEW_QUERY_MARKERS: &[&str] = &[
    "새로 조회", "새로운 조회", "새로 검색", "처음부터", "다시 처음", "초기화", "새 질문", "다른 질문",
    "이전 조건 무시", "조건 없이",
];

const FILTER_MARKERS: &[&str] = &[
    "이 중", "이중에", "그 중", "그중", "저 중", "여기서", "거기서", "위 결과", "이 결과", "그 결과", "이전 결과",
    "앞의 결과", "방금", "위에서", "이것들", "그것들",
];

const AGGREGATION_MARKERS: &[&str] = &[
    "합계", "총액", "총 금액", "총합", "합산", "평균", "건수", "개수", "몇 건", "몇건", "몇 개", "최대", "최소",
    "최댓값", "최솟값",
];

static NEW_QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(start over|new (query|search|question)|from scratch|reset|forget (that|the previous|previous))\b")
        .unwrap()
});

static FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(among (these|them|those)|of (these|those)|from (that|these|those|this)( list| result)?|(the )?previous results?|(these|those|the above) (results|rows|ones|payments|transactions)|only (these|those))\b",
    )
    .unwrap()
});

static AGGREGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(sum|count|average|avg|total|how many|maximum|minimum|max|min)\b").unwrap()
});

fn contains_any(utterance: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| utterance.contains(marker))
}

/// Classify an utterance, returning whether it references the previous
/// result set together with the kind of reference
pub fn classify_reference(utterance: &str) -> (bool, ReferenceType) {
    let kind = if contains_any(utterance, NEW_QUERY_MARKERS) || NEW_QUERY_RE.is_match(utterance) {
        ReferenceType::New
    } else if contains_any(utterance, FILTER_MARKERS) || FILTER_RE.is_match(utterance) {
        ReferenceType::Filter
    } else if contains_any(utterance, AGGREGATION_MARKERS) || AGGREGATION_RE.is_match(utterance) {
        ReferenceType::Aggregation
    } else {
        ReferenceType::Unrelated
    };

    (kind.is_refinement(), kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_query() {
        assert_eq!(classify_reference("처음부터 다시, 이번 달 환불 내역"), (false, ReferenceType::New));
        assert_eq!(classify_reference("Start over and show refunds"), (false, ReferenceType::New));
    }

    #[test]
    fn test_filter_reference() {
        assert_eq!(classify_reference("이 중에서 카드 결제만"), (true, ReferenceType::Filter));
        assert_eq!(classify_reference("Only those from merchant m1"), (true, ReferenceType::Filter));
        assert_eq!(classify_reference("from that list, status DONE"), (true, ReferenceType::Filter));
    }

    #[test]
    fn test_aggregation_reference() {
        assert_eq!(classify_reference("총 금액은 얼마야?"), (true, ReferenceType::Aggregation));
        assert_eq!(classify_reference("What is the average amount?"), (true, ReferenceType::Aggregation));
        assert_eq!(classify_reference("건수 알려줘"), (true, ReferenceType::Aggregation));
    }

    #[test]
    fn test_filter_wins_over_aggregation() {
        assert_eq!(classify_reference("이 중에서 합계는?"), (true, ReferenceType::Filter));
        assert_eq!(classify_reference("sum among these"), (true, ReferenceType::Filter));
    }

    #[test]
    fn test_new_wins_over_everything() {
        assert_eq!(classify_reference("처음부터, 이 중 합계 말고"), (false, ReferenceType::New));
    }

    #[test]
    fn test_unrelated() {
        assert_eq!(classify_reference("어제 결제 보여줘"), (false, ReferenceType::Unrelated));
        assert_eq!(classify_reference("show me the accounting summary"), (false, ReferenceType::Unrelated));
        assert_eq!(classify_reference("이중 결제 내역"), (false, ReferenceType::Unrelated));
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 已创建的融资协议
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementRef {
    pub agreement_id: i64,
    pub invoice_id: i64,
    pub purchaser_id: i64,
}

/// 非致命发现 (不会中断批次)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingKind {
    NoEligibleOffer,
    DataInconsistency { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub invoice_id: i64,
    #[serde(flatten)]
    pub kind: FindingKind,
}

/// 一次融资批次的统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub evaluation_date: NaiveDate,
    pub scanned: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub inconsistent: usize,
    /// 债权人不在加载集合中的报价
    pub ignored_offers: usize,
    pub total_discount_in_cents: i64,
    pub agreements: Vec<AgreementRef>,
    pub findings: Vec<Finding>,
}

impl BatchSummary {
    pub fn empty(evaluation_date: NaiveDate) -> Self {
        Self {
            evaluation_date,
            scanned: 0,
            matched: 0,
            unmatched: 0,
            inconsistent: 0,
            ignored_offers: 0,
            total_discount_in_cents: 0,
            agreements: Vec::new(),
            findings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn findings_serialize_with_a_kind_tag() {
        let findings = vec![
            Finding {
                invoice_id: 1,
                kind: FindingKind::NoEligibleOffer,
            },
            Finding {
                invoice_id: 2,
                kind: FindingKind::DataInconsistency {
                    reason: "creditor 9 was not loaded".to_string(),
                },
            },
        ];

        assert_eq!(
            serde_json::to_value(&findings).unwrap(),
            json!([
                { "invoice_id": 1, "kind": "no_eligible_offer" },
                { "invoice_id": 2, "kind": "data_inconsistency", "reason": "creditor 9 was not loaded" },
            ])
        );
    }

    #[test]
    fn empty_summary_serializes_the_evaluation_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let value = serde_json::to_value(BatchSummary::empty(date)).unwrap();

        assert_eq!(value["evaluation_date"], json!("2024-06-03"));
        assert_eq!(value["scanned"], json!(0));
        assert_eq!(value["agreements"], json!([]));
    }
}

use serde::{Deserialize, Serialize};

/// 单张发票的匹配结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub invoice_id: i64,
    pub purchaser_id: i64,
    pub settings_id: i64,
    pub financing_days: i64,
    pub effective_rate_in_bps: i64,
    pub discount_amount_in_cents: i64,
    pub early_payment_amount_in_cents: i64,
}

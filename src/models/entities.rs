use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 债权人 (开票方)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Creditor {
    pub id: i64,
    pub name: String,
    /// 该债权人可接受的最高实际融资利率 (bps, 含上限)
    pub max_financing_rate_in_bps: i32,
}

/// 债务人 (付款方)，不参与匹配逻辑
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Debtor {
    pub id: i64,
    pub name: String,
}

/// 发票
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub creditor_id: i64,
    pub debtor_id: i64,
    /// 债务人付款日 / 向购买方兑付日
    pub maturity_date: NaiveDate,
    /// 票面金额 (分)
    pub value_in_cents: i64,
    pub financed: bool,
    pub early_payment_amount_in_cents: Option<i64>,
    /// 一旦写入: early_payment + discounted == value_in_cents
    pub discounted_amount_in_cents: Option<i64>,
}

impl Invoice {
    /// 融资期限: 评估日到到期日的整天数 (可为负)
    pub fn financing_days(&self, evaluation_date: NaiveDate) -> i64 {
        self.maturity_date
            .signed_duration_since(evaluation_date)
            .num_days()
    }
}

/// 购买方 (通常为银行)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Purchaser {
    pub id: i64,
    pub name: String,
    /// 发票剩余天数必须严格大于该值
    pub minimum_financing_term_in_days: i32,
}

/// 购买方针对单个债权人的融资设置
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PurchaserFinancingSettings {
    pub id: i64,
    pub purchaser_id: i64,
    pub creditor_id: i64,
    pub annual_rate_in_bps: i32,
}

/// 融资协议: 发票 1:1, 购买方 N:1
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FinancingAgreement {
    pub id: i64,
    pub invoice_id: i64,
    pub purchaser_id: i64,
}

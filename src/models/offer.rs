use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{Purchaser, PurchaserFinancingSettings};

/// 报价查询的扁平行 (purchaser JOIN purchaser_financing_settings)
#[derive(Debug, Clone, FromRow)]
pub struct OfferRow {
    pub settings_id: i64,
    pub purchaser_id: i64,
    pub purchaser_name: String,
    pub minimum_financing_term_in_days: i32,
    pub creditor_id: i64,
    pub annual_rate_in_bps: i32,
}

/// 候选报价: 融资设置及其所属购买方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub purchaser: Purchaser,
    pub settings: PurchaserFinancingSettings,
}

impl Offer {
    pub fn new(purchaser: Purchaser, settings: PurchaserFinancingSettings) -> Self {
        Self { purchaser, settings }
    }

    pub fn creditor_id(&self) -> i64 {
        self.settings.creditor_id
    }

    pub fn purchaser_id(&self) -> i64 {
        self.purchaser.id
    }
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Self {
            purchaser: Purchaser {
                id: row.purchaser_id,
                name: row.purchaser_name,
                minimum_financing_term_in_days: row.minimum_financing_term_in_days,
            },
            settings: PurchaserFinancingSettings {
                id: row.settings_id,
                purchaser_id: row.purchaser_id,
                creditor_id: row.creditor_id,
                annual_rate_in_bps: row.annual_rate_in_bps,
            },
        }
    }
}

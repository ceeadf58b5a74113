use crate::models::{Creditor, Offer};
use crate::service::rate::effective_rate;

/// 报价对该发票适用时返回实际利率
///
/// 条件: 融资天数为正，最短期限严格小于融资天数，年利率非负，
/// 且实际利率不超过债权人上限 (含)。
pub fn eligible_rate(offer: &Offer, creditor: &Creditor, financing_days: i64) -> Option<i64> {
    if financing_days <= 0 || offer.settings.annual_rate_in_bps < 0 {
        return None;
    }
    if i64::from(offer.purchaser.minimum_financing_term_in_days) >= financing_days {
        return None;
    }

    let rate = effective_rate(i64::from(offer.settings.annual_rate_in_bps), financing_days);
    (rate <= i64::from(creditor.max_financing_rate_in_bps)).then_some(rate)
}

pub fn is_eligible(offer: &Offer, creditor: &Creditor, financing_days: i64) -> bool {
    eligible_rate(offer, creditor, financing_days).is_some()
}

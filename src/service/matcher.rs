use crate::error::DataInconsistency;
use crate::models::{Creditor, Invoice, MatchResult, Offer};
use crate::service::eligibility::eligible_rate;
use crate::service::rate::discount_amount;
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// 报价簿: 每批次构建一次，按债权人分组
///
/// 每条报价自带所属购买方，选中后无需再扫描全部购买方。
#[derive(Debug, Default)]
pub struct OfferBook {
    by_creditor: IndexMap<i64, Vec<Offer>>,
    duplicates: HashMap<i64, DataInconsistency>,
    ignored: usize,
}

impl OfferBook {
    pub fn build(offers: Vec<Offer>, creditors: &HashMap<i64, Creditor>) -> Self {
        let mut book = OfferBook::default();
        let mut seen: HashSet<(i64, i64)> = HashSet::with_capacity(offers.len());

        for offer in offers {
            let creditor_id = offer.creditor_id();
            if !creditors.contains_key(&creditor_id) {
                tracing::warn!(
                    "报价 {} (购买方 {}) 引用了未加载的债权人 {}, 已忽略",
                    offer.settings.id,
                    offer.purchaser_id(),
                    creditor_id
                );
                book.ignored += 1;
                continue;
            }

            if !seen.insert((offer.purchaser_id(), creditor_id)) {
                tracing::warn!(
                    "购买方 {} 对债权人 {} 存在多条融资设置",
                    offer.purchaser_id(),
                    creditor_id
                );
                book.duplicates
                    .entry(creditor_id)
                    .or_insert(DataInconsistency::DuplicateCreditorSetting {
                        purchaser_id: offer.purchaser_id(),
                        creditor_id,
                    });
                continue;
            }

            book.by_creditor.entry(creditor_id).or_default().push(offer);
        }

        for offers in book.by_creditor.values_mut() {
            offers.sort_by_key(|o| (o.purchaser_id(), o.settings.id));
        }

        book
    }

    pub fn offers_for(&self, creditor_id: i64) -> &[Offer] {
        self.by_creditor
            .get(&creditor_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn inconsistency_for(&self, creditor_id: i64) -> Option<&DataInconsistency> {
        self.duplicates.get(&creditor_id)
    }

    /// 因债权人缺失而丢弃的报价数
    pub fn ignored_offers(&self) -> usize {
        self.ignored
    }
}

/// 为单张发票选出最优报价
///
/// 只考虑属于该发票债权人且通过资格过滤的报价。排序键 (全序):
/// 实际利率, 年利率, 购买方 id, 设置 id，均取最小。
pub fn match_invoice(
    invoice: &Invoice,
    creditor: &Creditor,
    offers: &[Offer],
    evaluation_date: NaiveDate,
) -> Option<MatchResult> {
    let financing_days = invoice.financing_days(evaluation_date);

    let (rate, best) = offers
        .iter()
        .filter(|o| o.creditor_id() == invoice.creditor_id)
        .filter_map(|o| eligible_rate(o, creditor, financing_days).map(|rate| (rate, o)))
        .min_by_key(|(rate, o)| {
            (
                *rate,
                o.settings.annual_rate_in_bps,
                o.purchaser_id(),
                o.settings.id,
            )
        })?;

    let discount = discount_amount(invoice.value_in_cents, rate);
    Some(MatchResult {
        invoice_id: invoice.id,
        purchaser_id: best.purchaser_id(),
        settings_id: best.settings.id,
        financing_days,
        effective_rate_in_bps: rate,
        discount_amount_in_cents: discount,
        early_payment_amount_in_cents: invoice.value_in_cents - discount,
    })
}

/// 单张发票的评估结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceOutcome {
    Matched(MatchResult),
    NoEligibleOffer,
    Inconsistent(DataInconsistency),
}

/// 匹配引擎: 纯计算，可跨线程共享
#[derive(Debug)]
pub struct MatchingEngine {
    evaluation_date: NaiveDate,
    creditors: HashMap<i64, Creditor>,
    book: OfferBook,
}

impl MatchingEngine {
    pub fn new(evaluation_date: NaiveDate, creditors: Vec<Creditor>, offers: Vec<Offer>) -> Self {
        let creditors: HashMap<i64, Creditor> =
            creditors.into_iter().map(|c| (c.id, c)).collect();
        let book = OfferBook::build(offers, &creditors);
        Self {
            evaluation_date,
            creditors,
            book,
        }
    }

    pub fn evaluation_date(&self) -> NaiveDate {
        self.evaluation_date
    }

    pub fn book(&self) -> &OfferBook {
        &self.book
    }

    pub fn evaluate(&self, invoice: &Invoice) -> InvoiceOutcome {
        if invoice.financed
            || invoice.early_payment_amount_in_cents.is_some()
            || invoice.discounted_amount_in_cents.is_some()
        {
            return InvoiceOutcome::Inconsistent(DataInconsistency::AlreadyFinanced);
        }
        if invoice.value_in_cents <= 0 {
            return InvoiceOutcome::Inconsistent(DataInconsistency::NonPositiveValue {
                value_in_cents: invoice.value_in_cents,
            });
        }
        let Some(creditor) = self.creditors.get(&invoice.creditor_id) else {
            return InvoiceOutcome::Inconsistent(DataInconsistency::UnknownCreditor {
                creditor_id: invoice.creditor_id,
            });
        };
        if let Some(problem) = self.book.inconsistency_for(invoice.creditor_id) {
            return InvoiceOutcome::Inconsistent(problem.clone());
        }

        match match_invoice(
            invoice,
            creditor,
            self.book.offers_for(invoice.creditor_id),
            self.evaluation_date,
        ) {
            Some(result) => InvoiceOutcome::Matched(result),
            None => InvoiceOutcome::NoEligibleOffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Purchaser, PurchaserFinancingSettings};
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn creditor(id: i64, max_rate: i32) -> Creditor {
        Creditor {
            id,
            name: format!("Creditor{id}"),
            max_financing_rate_in_bps: max_rate,
        }
    }

    fn offer(
        settings_id: i64,
        purchaser_id: i64,
        creditor_id: i64,
        minimum_term: i32,
        annual_rate: i32,
    ) -> Offer {
        Offer::new(
            Purchaser {
                id: purchaser_id,
                name: format!("Purchaser{purchaser_id}"),
                minimum_financing_term_in_days: minimum_term,
            },
            PurchaserFinancingSettings {
                id: settings_id,
                purchaser_id,
                creditor_id,
                annual_rate_in_bps: annual_rate,
            },
        )
    }

    fn invoice(id: i64, creditor_id: i64, value: i64, days: i64) -> Invoice {
        Invoice {
            id,
            creditor_id,
            debtor_id: 1,
            maturity_date: today() + chrono::Duration::days(days),
            value_in_cents: value,
            financed: false,
            early_payment_amount_in_cents: None,
            discounted_amount_in_cents: None,
        }
    }

    #[test]
    fn picks_the_only_offer_within_cap() {
        let engine = MatchingEngine::new(
            today(),
            vec![creditor(1, 3)],
            vec![offer(10, 1, 1, 20, 50), offer(20, 2, 1, 20, 40)],
        );

        let result = match engine.evaluate(&invoice(1, 1, 1_000_000, 30)) {
            InvoiceOutcome::Matched(result) => result,
            other => panic!("expected a match, got {other:?}"),
        };
        assert_eq!(result.purchaser_id, 2);
        assert_eq!(result.effective_rate_in_bps, 3);
        assert_eq!(result.discount_amount_in_cents, 300);
        assert_eq!(result.early_payment_amount_in_cents, 999_700);
    }

    #[test]
    fn lower_rate_wins_regardless_of_order() {
        let expensive = offer(10, 1, 1, 10, 100);
        let cheap = offer(20, 2, 1, 10, 30);
        let inv = invoice(1, 1, 2_000_000, 20);
        let cred = creditor(1, 60);

        let forward = match_invoice(&inv, &cred, &[expensive.clone(), cheap.clone()], today());
        let backward = match_invoice(&inv, &cred, &[cheap, expensive], today());

        assert_eq!(forward, backward);
        let result = forward.unwrap();
        assert_eq!(result.purchaser_id, 2);
        assert_eq!(result.effective_rate_in_bps, 2);
        assert_eq!(result.discount_amount_in_cents, 400);
    }

    #[test]
    fn equal_rates_resolve_to_lowest_purchaser_id() {
        let inv = invoice(1, 1, 100_000, 30);
        let cred = creditor(1, 60);
        let offers = [offer(31, 9, 1, 0, 40), offer(32, 4, 1, 0, 40), offer(33, 6, 1, 0, 40)];

        let result = match_invoice(&inv, &cred, &offers, today()).unwrap();
        assert_eq!(result.purchaser_id, 4);
    }

    #[test]
    fn equal_effective_rates_prefer_lower_annual_rate() {
        // 41 * 30 / 360 = 3.41 → 3, 40 * 30 / 360 = 3.33 → 3
        let inv = invoice(1, 1, 100_000, 30);
        let cred = creditor(1, 60);
        let offers = [offer(1, 1, 1, 0, 41), offer(2, 2, 1, 0, 40)];

        let result = match_invoice(&inv, &cred, &offers, today()).unwrap();
        assert_eq!(result.purchaser_id, 2);
    }

    #[test]
    fn offers_for_other_creditors_are_not_candidates() {
        let inv = invoice(1, 1, 100_000, 30);
        let cred = creditor(1, 60);
        let offers = [offer(1, 1, 2, 0, 10)];

        assert_eq!(match_invoice(&inv, &cred, &offers, today()), None);
    }

    #[test]
    fn minimum_term_boundary() {
        let engine = MatchingEngine::new(today(), vec![creditor(1, 60)], vec![offer(1, 1, 1, 15, 40)]);

        assert_eq!(engine.evaluate(&invoice(1, 1, 100_000, 15)), InvoiceOutcome::NoEligibleOffer);
        assert!(matches!(
            engine.evaluate(&invoice(2, 1, 100_000, 16)),
            InvoiceOutcome::Matched(_)
        ));
    }

    #[test]
    fn duplicate_setting_poisons_only_that_creditor() {
        let engine = MatchingEngine::new(
            today(),
            vec![creditor(1, 60), creditor(2, 60)],
            vec![
                offer(1, 1, 1, 0, 40),
                offer(2, 1, 1, 0, 30),
                offer(3, 1, 2, 0, 40),
            ],
        );

        assert_eq!(
            engine.evaluate(&invoice(1, 1, 100_000, 30)),
            InvoiceOutcome::Inconsistent(DataInconsistency::DuplicateCreditorSetting {
                purchaser_id: 1,
                creditor_id: 1,
            })
        );
        assert!(matches!(
            engine.evaluate(&invoice(2, 2, 100_000, 30)),
            InvoiceOutcome::Matched(_)
        ));
    }

    #[test]
    fn offers_for_unloaded_creditors_are_ignored() {
        let engine = MatchingEngine::new(today(), vec![creditor(1, 60)], vec![offer(1, 1, 5, 0, 40)]);

        assert_eq!(engine.book().ignored_offers(), 1);
        assert_eq!(
            engine.evaluate(&invoice(1, 5, 100_000, 30)),
            InvoiceOutcome::Inconsistent(DataInconsistency::UnknownCreditor { creditor_id: 5 })
        );
    }

    #[test]
    fn rejects_invalid_invoices() {
        let engine = MatchingEngine::new(today(), vec![creditor(1, 60)], vec![offer(1, 1, 1, 0, 40)]);

        assert_eq!(
            engine.evaluate(&invoice(1, 1, 0, 30)),
            InvoiceOutcome::Inconsistent(DataInconsistency::NonPositiveValue { value_in_cents: 0 })
        );

        let mut financed = invoice(2, 1, 100_000, 30);
        financed.financed = true;
        assert_eq!(
            engine.evaluate(&financed),
            InvoiceOutcome::Inconsistent(DataInconsistency::AlreadyFinanced)
        );
    }

    fn arb_offers() -> impl Strategy<Value = Vec<Offer>> {
        prop::collection::vec((0i32..60, 0i32..500), 0..8).prop_map(|pairs| {
            pairs
                .into_iter()
                .enumerate()
                .map(|(i, (term, rate))| offer(i as i64 + 1, i as i64 + 1, 1, term, rate))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn matched_amounts_sum_to_face_value(
            offers in arb_offers(),
            value in 1i64..10_000_000_000,
            days in -30i64..400,
            cap in 0i32..200,
        ) {
            let engine = MatchingEngine::new(today(), vec![creditor(1, cap)], offers);
            if let InvoiceOutcome::Matched(r) = engine.evaluate(&invoice(1, 1, value, days)) {
                prop_assert_eq!(r.discount_amount_in_cents + r.early_payment_amount_in_cents, value);
                prop_assert!(r.effective_rate_in_bps <= i64::from(cap));
            }
        }

        #[test]
        fn raising_the_cap_never_loses_a_match(
            offers in arb_offers(),
            days in 1i64..400,
            cap in 0i32..200,
            raise in 0i32..200,
        ) {
            let inv = invoice(1, 1, 1_000_000, days);
            let low = match_invoice(&inv, &creditor(1, cap), &offers, today());
            let high = match_invoice(&inv, &creditor(1, cap + raise), &offers, today());
            if low.is_some() {
                prop_assert!(high.is_some());
            }
        }

        #[test]
        fn result_does_not_depend_on_offer_order(
            offers in arb_offers(),
            days in 1i64..400,
            cap in 0i32..200,
        ) {
            let inv = invoice(1, 1, 1_000_000, days);
            let mut reversed = offers.clone();
            reversed.reverse();

            let a = MatchingEngine::new(today(), vec![creditor(1, cap)], offers).evaluate(&inv);
            let b = MatchingEngine::new(today(), vec![creditor(1, cap)], reversed).evaluate(&inv);
            prop_assert_eq!(a, b);
        }
    }
}

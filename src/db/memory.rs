use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::store::{FinancingStore, FinancingTx};
use crate::error::StoreError;
use crate::models::{
    Creditor, Debtor, FinancingAgreement, Invoice, Offer, Purchaser, PurchaserFinancingSettings,
};

#[derive(Debug, Default)]
struct State {
    creditors: BTreeMap<i64, Creditor>,
    debtors: BTreeMap<i64, Debtor>,
    invoices: BTreeMap<i64, Invoice>,
    purchasers: BTreeMap<i64, Purchaser>,
    settings: BTreeMap<i64, PurchaserFinancingSettings>,
    agreements: Vec<FinancingAgreement>,
    next_id: i64,
    /// 第 n 次写操作失败 (从 1 计)
    fail_write_at: Option<usize>,
    /// 接下来 n 次 commit 以冲突失败
    failing_commits: usize,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// 内存存储，用于测试和本地运行
///
/// 写操作缓存在工作单元中，commit 时在一个临界区内整体生效。
#[derive(Debug, Clone, Default)]
pub struct MemoryFinancingStore {
    state: Arc<RwLock<State>>,
    run_lock: Arc<Mutex<()>>,
}

impl MemoryFinancingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_creditor(&self, name: &str, max_financing_rate_in_bps: i32) -> Creditor {
        let mut state = self.state();
        let creditor = Creditor {
            id: state.next_id(),
            name: name.to_string(),
            max_financing_rate_in_bps,
        };
        state.creditors.insert(creditor.id, creditor.clone());
        creditor
    }

    pub fn add_debtor(&self, name: &str) -> Debtor {
        let mut state = self.state();
        let debtor = Debtor {
            id: state.next_id(),
            name: name.to_string(),
        };
        state.debtors.insert(debtor.id, debtor.clone());
        debtor
    }

    pub fn add_invoice(
        &self,
        creditor_id: i64,
        debtor_id: i64,
        maturity_date: NaiveDate,
        value_in_cents: i64,
    ) -> Invoice {
        let mut state = self.state();
        let invoice = Invoice {
            id: state.next_id(),
            creditor_id,
            debtor_id,
            maturity_date,
            value_in_cents,
            financed: false,
            early_payment_amount_in_cents: None,
            discounted_amount_in_cents: None,
        };
        state.invoices.insert(invoice.id, invoice.clone());
        invoice
    }

    pub fn add_purchaser(&self, name: &str, minimum_financing_term_in_days: i32) -> Purchaser {
        let mut state = self.state();
        let purchaser = Purchaser {
            id: state.next_id(),
            name: name.to_string(),
            minimum_financing_term_in_days,
        };
        state.purchasers.insert(purchaser.id, purchaser.clone());
        purchaser
    }

    pub fn add_financing_settings(
        &self,
        purchaser_id: i64,
        creditor_id: i64,
        annual_rate_in_bps: i32,
    ) -> PurchaserFinancingSettings {
        let mut state = self.state();
        let settings = PurchaserFinancingSettings {
            id: state.next_id(),
            purchaser_id,
            creditor_id,
            annual_rate_in_bps,
        };
        state.settings.insert(settings.id, settings.clone());
        settings
    }

    pub fn invoice(&self, invoice_id: i64) -> Option<Invoice> {
        self.state().invoices.get(&invoice_id).cloned()
    }

    pub fn agreements(&self) -> Vec<FinancingAgreement> {
        self.state().agreements.clone()
    }

    /// 让工作单元的第 `n` 次写操作失败
    pub fn fail_write_at(&self, n: usize) {
        self.state().fail_write_at = Some(n);
    }

    /// 让接下来 `n` 次 commit 以冲突失败
    pub fn fail_commits(&self, n: usize) {
        self.state().failing_commits = n;
    }
}

#[async_trait]
impl FinancingStore for MemoryFinancingStore {
    type Tx = MemoryFinancingTx;

    async fn begin(&self) -> Result<MemoryFinancingTx, StoreError> {
        Ok(MemoryFinancingTx {
            state: Arc::clone(&self.state),
            run_lock: Arc::clone(&self.run_lock),
            guard: None,
            pending_updates: Vec::new(),
            pending_agreements: Vec::new(),
            writes: 0,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingUpdate {
    invoice_id: i64,
    financed: bool,
    early_payment_amount_in_cents: i64,
    discounted_amount_in_cents: i64,
}

pub struct MemoryFinancingTx {
    state: Arc<RwLock<State>>,
    run_lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    pending_updates: Vec<PendingUpdate>,
    pending_agreements: Vec<FinancingAgreement>,
    writes: usize,
}

impl MemoryFinancingTx {
    fn state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_write(&mut self) -> Result<(), StoreError> {
        self.writes += 1;
        if self.state().fail_write_at == Some(self.writes) {
            return Err(StoreError::Unavailable(format!("write #{} failed", self.writes)));
        }
        Ok(())
    }
}

#[async_trait]
impl FinancingTx for MemoryFinancingTx {
    async fn try_lock_run(&mut self) -> Result<bool, StoreError> {
        if self.guard.is_some() {
            return Ok(true);
        }
        match Arc::clone(&self.run_lock).try_lock_owned() {
            Ok(guard) => {
                self.guard = Some(guard);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn list_unfinanced_invoices(&mut self) -> Result<Vec<Invoice>, StoreError> {
        Ok(self
            .state()
            .invoices
            .values()
            .filter(|i| !i.financed)
            .cloned()
            .collect())
    }

    async fn list_creditors(&mut self, creditor_ids: &[i64]) -> Result<Vec<Creditor>, StoreError> {
        let state = self.state();
        Ok(creditor_ids
            .iter()
            .filter_map(|id| state.creditors.get(id).cloned())
            .collect())
    }

    async fn list_offers_for_creditors(
        &mut self,
        creditor_ids: &[i64],
    ) -> Result<Vec<Offer>, StoreError> {
        let state = self.state();
        let mut offers: Vec<Offer> = state
            .settings
            .values()
            .filter(|s| creditor_ids.contains(&s.creditor_id))
            .filter_map(|s| {
                state
                    .purchasers
                    .get(&s.purchaser_id)
                    .map(|p| Offer::new(p.clone(), s.clone()))
            })
            .collect();
        offers.sort_by_key(|o| (o.purchaser_id(), o.settings.id));
        Ok(offers)
    }

    async fn update_invoice_financing_outcome(
        &mut self,
        invoice_id: i64,
        financed: bool,
        early_payment_amount_in_cents: i64,
        discounted_amount_in_cents: i64,
    ) -> Result<(), StoreError> {
        self.record_write()?;
        self.pending_updates.push(PendingUpdate {
            invoice_id,
            financed,
            early_payment_amount_in_cents,
            discounted_amount_in_cents,
        });
        Ok(())
    }

    async fn create_financing_agreement(
        &mut self,
        invoice_id: i64,
        purchaser_id: i64,
    ) -> Result<i64, StoreError> {
        self.record_write()?;
        let id = {
            let mut state = self.state();
            state.next_id()
        };
        self.pending_agreements.push(FinancingAgreement {
            id,
            invoice_id,
            purchaser_id,
        });
        Ok(id)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(StoreError::Conflict("commit rejected".to_string()));
        }

        for update in &self.pending_updates {
            match state.invoices.get(&update.invoice_id) {
                Some(invoice) if !invoice.financed => {}
                _ => {
                    return Err(StoreError::Conflict(format!(
                        "invoice {} is missing or already financed",
                        update.invoice_id
                    )))
                }
            }
        }
        for agreement in &self.pending_agreements {
            if state.agreements.iter().any(|a| a.invoice_id == agreement.invoice_id) {
                return Err(StoreError::Conflict(format!(
                    "invoice {} already has a financing agreement",
                    agreement.invoice_id
                )));
            }
        }

        for update in &self.pending_updates {
            if let Some(invoice) = state.invoices.get_mut(&update.invoice_id) {
                invoice.financed = update.financed;
                invoice.early_payment_amount_in_cents = Some(update.early_payment_amount_in_cents);
                invoice.discounted_amount_in_cents = Some(update.discounted_amount_in_cents);
            }
        }
        state.agreements.extend(self.pending_agreements.iter().cloned());

        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

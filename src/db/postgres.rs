use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;

use crate::db::queries;
use crate::db::store::{FinancingStore, FinancingTx};
use crate::error::StoreError;
use crate::models::{Creditor, Invoice, MatchResult, Offer};

/// 每条批量语句的最大行数
const CHUNK_SIZE: usize = 1000;

/// PostgreSQL 存储
///
/// 一个批次对应一个数据库事务。批次互斥依赖 `pg_try_advisory_xact_lock`，
/// 未融资发票在事务内加行锁，更新语句再以 `financed = FALSE` 作为乐观校验。
#[derive(Debug, Clone)]
pub struct PgFinancingStore {
    pool: PgPool,
    run_lock_key: i64,
}

impl PgFinancingStore {
    pub fn new(pool: PgPool, run_lock_key: i64) -> Self {
        Self { pool, run_lock_key }
    }
}

#[async_trait]
impl FinancingStore for PgFinancingStore {
    type Tx = PgFinancingTx;

    async fn begin(&self) -> Result<PgFinancingTx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgFinancingTx {
            tx,
            run_lock_key: self.run_lock_key,
        })
    }
}

pub struct PgFinancingTx {
    tx: Transaction<'static, Postgres>,
    run_lock_key: i64,
}

#[async_trait]
impl FinancingTx for PgFinancingTx {
    async fn try_lock_run(&mut self) -> Result<bool, StoreError> {
        Ok(queries::try_advisory_xact_lock(&mut self.tx, self.run_lock_key).await?)
    }

    async fn list_unfinanced_invoices(&mut self) -> Result<Vec<Invoice>, StoreError> {
        Ok(queries::list_unfinanced_invoices(&mut self.tx).await?)
    }

    async fn list_creditors(&mut self, creditor_ids: &[i64]) -> Result<Vec<Creditor>, StoreError> {
        Ok(queries::list_creditors(&mut self.tx, creditor_ids).await?)
    }

    async fn list_offers_for_creditors(
        &mut self,
        creditor_ids: &[i64],
    ) -> Result<Vec<Offer>, StoreError> {
        let rows = queries::list_offers_for_creditors(&mut self.tx, creditor_ids).await?;
        Ok(rows.into_iter().map(Offer::from).collect())
    }

    async fn update_invoice_financing_outcome(
        &mut self,
        invoice_id: i64,
        financed: bool,
        early_payment_amount_in_cents: i64,
        discounted_amount_in_cents: i64,
    ) -> Result<(), StoreError> {
        let affected = queries::update_invoice_financing_outcome(
            &mut self.tx,
            invoice_id,
            financed,
            early_payment_amount_in_cents,
            discounted_amount_in_cents,
        )
        .await?;

        if affected != 1 {
            return Err(StoreError::Conflict(format!(
                "invoice {invoice_id} is missing or already financed"
            )));
        }
        Ok(())
    }

    async fn create_financing_agreement(
        &mut self,
        invoice_id: i64,
        purchaser_id: i64,
    ) -> Result<i64, StoreError> {
        Ok(queries::insert_financing_agreement(&mut self.tx, invoice_id, purchaser_id).await?)
    }

    async fn update_invoice_financing_outcomes(
        &mut self,
        results: &[MatchResult],
    ) -> Result<(), StoreError> {
        for chunk in results.chunks(CHUNK_SIZE) {
            let affected = queries::update_invoice_financing_outcomes(&mut self.tx, chunk).await?;
            if affected != chunk.len() as u64 {
                return Err(StoreError::Conflict(format!(
                    "expected to finance {} invoices, updated {}",
                    chunk.len(),
                    affected
                )));
            }
        }
        Ok(())
    }

    async fn create_financing_agreements(
        &mut self,
        results: &[MatchResult],
    ) -> Result<Vec<i64>, StoreError> {
        let mut by_invoice: HashMap<i64, i64> = HashMap::with_capacity(results.len());
        for chunk in results.chunks(CHUNK_SIZE) {
            let rows = queries::insert_financing_agreements(&mut self.tx, chunk).await?;
            for (agreement_id, invoice_id) in rows {
                by_invoice.insert(invoice_id, agreement_id);
            }
        }

        results
            .iter()
            .map(|r| {
                by_invoice.get(&r.invoice_id).copied().ok_or_else(|| {
                    StoreError::Conflict(format!("no agreement returned for invoice {}", r.invoice_id))
                })
            })
            .collect()
    }

    async fn commit(self) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(self.tx.rollback().await?)
    }
}

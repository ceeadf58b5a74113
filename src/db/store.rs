use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Creditor, Invoice, MatchResult, Offer};

/// 融资批次的存储边界
///
/// 每次批次通过 [`FinancingStore::begin`] 打开一个工作单元，所有读写都在其中完成，
/// 最后整体 commit 或 rollback。
#[async_trait]
pub trait FinancingStore: Send + Sync {
    type Tx: FinancingTx + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// 一个批次的工作单元 (事务)
#[async_trait]
pub trait FinancingTx: Send {
    /// 尝试获取批次互斥锁; 已有批次在运行时返回 false
    async fn try_lock_run(&mut self) -> Result<bool, StoreError>;

    /// 全部 financed = false 的发票，按 id 升序
    async fn list_unfinanced_invoices(&mut self) -> Result<Vec<Invoice>, StoreError>;

    async fn list_creditors(&mut self, creditor_ids: &[i64]) -> Result<Vec<Creditor>, StoreError>;

    /// 一次性加载这些债权人的全部报价
    async fn list_offers_for_creditors(
        &mut self,
        creditor_ids: &[i64],
    ) -> Result<Vec<Offer>, StoreError>;

    async fn update_invoice_financing_outcome(
        &mut self,
        invoice_id: i64,
        financed: bool,
        early_payment_amount_in_cents: i64,
        discounted_amount_in_cents: i64,
    ) -> Result<(), StoreError>;

    /// 返回新协议 id
    async fn create_financing_agreement(
        &mut self,
        invoice_id: i64,
        purchaser_id: i64,
    ) -> Result<i64, StoreError>;

    async fn update_invoice_financing_outcomes(
        &mut self,
        results: &[MatchResult],
    ) -> Result<(), StoreError> {
        for r in results {
            self.update_invoice_financing_outcome(
                r.invoice_id,
                true,
                r.early_payment_amount_in_cents,
                r.discount_amount_in_cents,
            )
            .await?;
        }
        Ok(())
    }

    /// 返回的 id 与 `results` 顺序一致
    async fn create_financing_agreements(
        &mut self,
        results: &[MatchResult],
    ) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::with_capacity(results.len());
        for r in results {
            ids.push(self.create_financing_agreement(r.invoice_id, r.purchaser_id).await?);
        }
        Ok(ids)
    }

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

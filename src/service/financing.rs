use chrono::{Local, NaiveDate};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::FinancingConfig;
use crate::db::{FinancingStore, FinancingTx};
use crate::error::FinancingError;
use crate::models::{AgreementRef, BatchSummary, Finding, FindingKind, MatchResult};
use crate::service::matcher::{InvoiceOutcome, MatchingEngine};

/// 融资批次编排: 读取 → 匹配 → 在一个工作单元内写回
pub struct FinancingService<S> {
    store: S,
    config: FinancingConfig,
}

impl<S: FinancingStore> FinancingService<S> {
    pub fn new(store: S, config: FinancingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 以本地日期为评估日执行一次融资批次
    pub async fn run_financing_cycle(&self) -> Result<BatchSummary, FinancingError> {
        self.run_financing_cycle_on(Local::now().date_naive()).await
    }

    /// 执行一次融资批次; 可重试的持久化失败会整批重跑
    pub async fn run_financing_cycle_on(
        &self,
        evaluation_date: NaiveDate,
    ) -> Result<BatchSummary, FinancingError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.run_once(evaluation_date).await {
                Err(FinancingError::Persistence(e))
                    if e.is_retryable() && attempt < max_attempts =>
                {
                    tracing::warn!(
                        "融资批次第 {}/{} 次写入失败, {}ms 后整批重试: {}",
                        attempt, max_attempts, self.config.retry_backoff_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn run_once(&self, evaluation_date: NaiveDate) -> Result<BatchSummary, FinancingError> {
        let mut tx = self.store.begin().await?;

        match process(&mut tx, evaluation_date).await {
            Ok(summary) => {
                tx.commit().await?;
                tracing::info!(
                    "融资批次完成: 扫描 {}, 匹配 {}, 未匹配 {}, 数据异常 {}",
                    summary.scanned, summary.matched, summary.unmatched, summary.inconsistent
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("融资批次回滚失败: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

async fn process<T: FinancingTx>(
    tx: &mut T,
    evaluation_date: NaiveDate,
) -> Result<BatchSummary, FinancingError> {
    if !tx.try_lock_run().await? {
        tracing::warn!("已有融资批次在运行, 本次跳过");
        return Err(FinancingError::RunInProgress);
    }

    tracing::info!("融资批次开始, 评估日 {}", evaluation_date);

    // Phase 1: 批量读取
    let invoices = tx.list_unfinanced_invoices().await?;
    let mut summary = BatchSummary::empty(evaluation_date);
    if invoices.is_empty() {
        tracing::info!("没有未融资发票");
        return Ok(summary);
    }

    let creditor_ids: Vec<i64> = invoices
        .iter()
        .map(|i| i.creditor_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let creditors = tx.list_creditors(&creditor_ids).await?;
    let offers = tx.list_offers_for_creditors(&creditor_ids).await?;

    tracing::info!(
        "加载 {} 张未融资发票, {} 个债权人, {} 条报价",
        invoices.len(), creditors.len(), offers.len()
    );

    // Phase 2: 逐张发票独立匹配 (纯计算, 并行; 结果保持发票顺序)
    let engine = MatchingEngine::new(evaluation_date, creditors, offers);
    let outcomes: Vec<(i64, InvoiceOutcome)> = invoices
        .par_iter()
        .map(|invoice| (invoice.id, engine.evaluate(invoice)))
        .collect();

    summary.scanned = invoices.len();
    summary.ignored_offers = engine.book().ignored_offers();

    let mut matched: Vec<MatchResult> = Vec::new();
    for (invoice_id, outcome) in outcomes {
        match outcome {
            InvoiceOutcome::Matched(result) => {
                tracing::debug!(
                    "发票 {} 由购买方 {} 融资, 利率 {}bps, 贴现 {}",
                    invoice_id,
                    result.purchaser_id,
                    result.effective_rate_in_bps,
                    result.discount_amount_in_cents
                );
                matched.push(result);
            }
            InvoiceOutcome::NoEligibleOffer => {
                tracing::warn!("发票 {} 没有符合条件的购买方报价", invoice_id);
                summary.unmatched += 1;
                summary.findings.push(Finding {
                    invoice_id,
                    kind: FindingKind::NoEligibleOffer,
                });
            }
            InvoiceOutcome::Inconsistent(problem) => {
                tracing::warn!("发票 {} 数据异常: {}", invoice_id, problem);
                summary.inconsistent += 1;
                summary.findings.push(Finding {
                    invoice_id,
                    kind: FindingKind::DataInconsistency {
                        reason: problem.to_string(),
                    },
                });
            }
        }
    }

    // Phase 3: 写回 (与读取同一事务)
    tx.update_invoice_financing_outcomes(&matched).await?;
    let agreement_ids = tx.create_financing_agreements(&matched).await?;

    summary.matched = matched.len();
    summary.total_discount_in_cents = matched.iter().map(|r| r.discount_amount_in_cents).sum();
    summary.agreements = matched
        .iter()
        .zip(agreement_ids)
        .map(|(r, agreement_id)| AgreementRef {
            agreement_id,
            invoice_id: r.invoice_id,
            purchaser_id: r.purchaser_id,
        })
        .collect();

    tracing::info!("已融资 {} 张发票, 创建 {} 条融资协议", summary.matched, summary.agreements.len());
    Ok(summary)
}

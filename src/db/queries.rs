use crate::error::StoreError;
use crate::models::{Creditor, Invoice, MatchResult, OfferRow};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::time::{Duration, Instant};

/// 批量写入语句的超时
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// 事务级 advisory lock，事务结束时自动释放
pub async fn try_advisory_xact_lock(
    conn: &mut PgConnection,
    key: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_xact_lock($1)")
        .bind(key)
        .fetch_one(&mut *conn)
        .await
}

/// 查询未融资发票 (行锁，按 id 升序)
pub async fn list_unfinanced_invoices(
    conn: &mut PgConnection,
) -> Result<Vec<Invoice>, sqlx::Error> {
    sqlx::query_as::<_, Invoice>(
        r#"
        SELECT id, creditor_id, debtor_id, maturity_date, value_in_cents, financed,
               early_payment_amount_in_cents, discounted_amount_in_cents
        FROM invoice
        WHERE financed = FALSE
        ORDER BY id
        FOR UPDATE
        "#
    )
    .fetch_all(&mut *conn)
    .await
}

/// 查询债权人
pub async fn list_creditors(
    conn: &mut PgConnection,
    creditor_ids: &[i64],
) -> Result<Vec<Creditor>, sqlx::Error> {
    sqlx::query_as::<_, Creditor>(
        r#"
        SELECT id, name, max_financing_rate_in_bps
        FROM creditor
        WHERE id = ANY($1)
        "#
    )
    .bind(creditor_ids)
    .fetch_all(&mut *conn)
    .await
}

/// 一次性查询这些债权人的全部购买方报价
pub async fn list_offers_for_creditors(
    conn: &mut PgConnection,
    creditor_ids: &[i64],
) -> Result<Vec<OfferRow>, sqlx::Error> {
    sqlx::query_as::<_, OfferRow>(
        r#"
        SELECT pfs.id as settings_id,
               p.id as purchaser_id,
               p.name as purchaser_name,
               p.minimum_financing_term_in_days,
               pfs.creditor_id,
               pfs.annual_rate_in_bps
        FROM purchaser_financing_settings pfs
        INNER JOIN purchaser p ON p.id = pfs.purchaser_id
        WHERE pfs.creditor_id = ANY($1)
        ORDER BY p.id, pfs.id
        "#
    )
    .bind(creditor_ids)
    .fetch_all(&mut *conn)
    .await
}

/// 更新单张发票的融资结果，返回影响行数 (已融资的发票不会被改写)
pub async fn update_invoice_financing_outcome(
    conn: &mut PgConnection,
    invoice_id: i64,
    financed: bool,
    early_payment_amount_in_cents: i64,
    discounted_amount_in_cents: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE invoice
        SET financed = $2,
            early_payment_amount_in_cents = $3,
            discounted_amount_in_cents = $4
        WHERE id = $1
          AND financed = FALSE
        "#
    )
    .bind(invoice_id)
    .bind(financed)
    .bind(early_payment_amount_in_cents)
    .bind(discounted_amount_in_cents)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// 批量更新发票融资结果 (单条 UPDATE ... FROM VALUES)，返回影响行数
pub async fn update_invoice_financing_outcomes(
    conn: &mut PgConnection,
    results: &[MatchResult],
) -> Result<u64, StoreError> {
    if results.is_empty() {
        return Ok(0);
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "UPDATE invoice AS i
         SET financed = TRUE,
             early_payment_amount_in_cents = v.early_payment,
             discounted_amount_in_cents = v.discounted
         FROM ("
    );

    query_builder.push_values(results, |mut b, r| {
        b.push_bind(r.invoice_id)
            .push_bind(r.early_payment_amount_in_cents)
            .push_bind(r.discount_amount_in_cents);
    });

    query_builder.push(
        ") AS v(id, early_payment, discounted)
         WHERE i.id = v.id AND i.financed = FALSE"
    );

    let start_time = Instant::now();
    let execute_result = tokio::time::timeout(
        WRITE_TIMEOUT,
        query_builder.build().execute(&mut *conn)
    ).await;

    match execute_result {
        Ok(Ok(result)) => {
            tracing::debug!("UPDATE invoice 影响 {} 行, 耗时: {:?}", result.rows_affected(), start_time.elapsed());
            Ok(result.rows_affected())
        },
        Ok(Err(e)) => {
            tracing::error!("UPDATE invoice 执行失败, 耗时: {:?}, 错误: {:?}", start_time.elapsed(), e);
            Err(e.into())
        },
        Err(_) => {
            tracing::error!("UPDATE invoice 超时 (>{:?})", WRITE_TIMEOUT);
            Err(StoreError::Unavailable(format!(
                "UPDATE invoice statement timed out after {:?}",
                WRITE_TIMEOUT
            )))
        }
    }
}

/// 插入单条融资协议，返回 id
pub async fn insert_financing_agreement(
    conn: &mut PgConnection,
    invoice_id: i64,
    purchaser_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO financing_agreement (invoice_id, purchaser_id)
        VALUES ($1, $2)
        RETURNING id
        "#
    )
    .bind(invoice_id)
    .bind(purchaser_id)
    .fetch_one(&mut *conn)
    .await
}

/// 批量插入融资协议，返回 (agreement_id, invoice_id)
pub async fn insert_financing_agreements(
    conn: &mut PgConnection,
    results: &[MatchResult],
) -> Result<Vec<(i64, i64)>, StoreError> {
    if results.is_empty() {
        return Ok(Vec::new());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO financing_agreement (invoice_id, purchaser_id) ");

    query_builder.push_values(results, |mut b, r| {
        b.push_bind(r.invoice_id).push_bind(r.purchaser_id);
    });
    query_builder.push(" RETURNING id, invoice_id");

    let start_time = Instant::now();
    let execute_result = tokio::time::timeout(
        WRITE_TIMEOUT,
        query_builder.build_query_as::<(i64, i64)>().fetch_all(&mut *conn)
    ).await;

    match execute_result {
        Ok(Ok(rows)) => {
            tracing::debug!("INSERT financing_agreement {} 行, 耗时: {:?}", rows.len(), start_time.elapsed());
            Ok(rows)
        },
        Ok(Err(e)) => {
            tracing::error!("INSERT financing_agreement 执行失败, 耗时: {:?}, 错误: {:?}", start_time.elapsed(), e);
            Err(e.into())
        },
        Err(_) => {
            tracing::error!("INSERT financing_agreement 超时 (>{:?})", WRITE_TIMEOUT);
            Err(StoreError::Unavailable(format!(
                "INSERT financing_agreement statement timed out after {:?}",
                WRITE_TIMEOUT
            )))
        }
    }
}

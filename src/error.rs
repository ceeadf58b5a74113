use thiserror::Error;

/// 存储边界错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 写入时发现数据已被其他批次修改
    #[error("write conflict: {0}")]
    Conflict(String),

    /// 连接或语句不可用 (含语句超时); 事务回滚后可整批重试
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// 是否可以整批重试
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict(_) | StoreError::Unavailable(_) => true,
            StoreError::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                // 40001 serialization_failure, 40P01 deadlock_detected
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
        }
    }
}

/// 融资批次错误 (只有这些会传播到调用方)
#[derive(Debug, Error)]
pub enum FinancingError {
    #[error("a financing run is already in progress")]
    RunInProgress,

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// 单张发票的数据不一致: 仅影响该发票
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataInconsistency {
    #[error("creditor {creditor_id} was not loaded")]
    UnknownCreditor { creditor_id: i64 },

    #[error("purchaser {purchaser_id} has more than one financing setting for creditor {creditor_id}")]
    DuplicateCreditorSetting { purchaser_id: i64, creditor_id: i64 },

    #[error("invoice value {value_in_cents} is not positive")]
    NonPositiveValue { value_in_cents: i64 },

    #[error("invoice is already financed")]
    AlreadyFinanced,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_timeout_is_reported_as_unavailable_and_retryable() {
        let err = StoreError::Unavailable("UPDATE invoice statement timed out after 30s".to_string());
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "store unavailable: UPDATE invoice statement timed out after 30s"
        );
    }

    #[test]
    fn conflicts_and_pool_timeouts_are_retryable() {
        assert!(StoreError::Conflict("invoice 1 already financed".to_string()).is_retryable());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn other_database_errors_are_not_retryable() {
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!StoreError::Database(sqlx::Error::PoolClosed).is_retryable());
    }
}

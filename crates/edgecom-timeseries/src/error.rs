use thiserror::Error;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("failed to {operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("repository is closed")]
    Closed,

    #[error("{0}")]
    Unavailable(String),
}

impl StoreError {
    /// 为数据库错误附加操作名称
    pub fn operation(operation: &'static str, source: sea_orm::DbErr) -> Self {
        StoreError::Operation { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

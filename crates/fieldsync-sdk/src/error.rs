use serde::{Deserialize, Serialize};

/// SDK 统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum FieldSyncError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("Storage is full: {0}")]
    StorageFull(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("KV store error: {0}")]
    KvStore(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    IO(String),

    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Server error [{status}]: {message}")]
    Server { status: u16, message: String },
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Missing association: {0}")]
    MissingAssociation(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Platform error: {0}")]
    Platform(String),
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("Capacity reached: {0}")]
    CapacityReached(String),

    #[error("Config error: {0}")]
    Config(String),
    #[error("Shutting down: {0}")]
    ShuttingDown(String),
}

/// 失败分类，决定是否重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// 网络/超时 - 退避重试
    Transient,
    /// 校验/鉴权/缺少关联 - 立即上报，不重试
    Permanent,
    /// 本地存储失败 - 同步返回给调用方，不重试
    Storage,
    /// 达到容量上限 - 由淘汰/提前停止策略处理，只记日志
    ResourceExhausted,
}

impl FieldSyncError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FieldSyncError::Network(_)
            | FieldSyncError::Timeout(_)
            | FieldSyncError::RateLimited(_) => FailureKind::Transient,
            FieldSyncError::Server { status, .. } if *status >= 500 => FailureKind::Transient,
            FieldSyncError::Sqlite(_)
            | FieldSyncError::StorageFull(_)
            | FieldSyncError::Database(_)
            | FieldSyncError::KvStore(_)
            | FieldSyncError::Serialization(_)
            | FieldSyncError::IO(_) => FailureKind::Storage,
            FieldSyncError::CapacityReached(_) => FailureKind::ResourceExhausted,
            _ => FailureKind::Permanent,
        }
    }

    /// 是否属于可重试的瞬时失败
    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    /// 根据 HTTP 状态码构造错误
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 409 | 422 => FieldSyncError::Validation(message),
            401 | 403 => FieldSyncError::Auth(message),
            404 => FieldSyncError::NotFound(message),
            408 => FieldSyncError::Timeout(message),
            429 => FieldSyncError::RateLimited(message),
            _ => FieldSyncError::Server { status, message },
        }
    }
}

impl From<rusqlite::Error> for FieldSyncError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DiskFull) => FieldSyncError::StorageFull(error.to_string()),
            _ => FieldSyncError::Sqlite(error),
        }
    }
}

impl From<sled::Error> for FieldSyncError {
    fn from(error: sled::Error) -> Self {
        FieldSyncError::KvStore(error.to_string())
    }
}

impl From<serde_json::Error> for FieldSyncError {
    fn from(error: serde_json::Error) -> Self {
        FieldSyncError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for FieldSyncError {
    fn from(error: bincode::Error) -> Self {
        FieldSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for FieldSyncError {
    fn from(error: std::io::Error) -> Self {
        FieldSyncError::IO(error.to_string())
    }
}

impl From<reqwest::Error> for FieldSyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FieldSyncError::Timeout(error.to_string())
        } else if let Some(status) = error.status() {
            FieldSyncError::from_status(status.as_u16(), error.to_string())
        } else if error.is_decode() {
            FieldSyncError::Serialization(error.to_string())
        } else {
            FieldSyncError::Network(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, FieldSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        assert!(FieldSyncError::Network("offline".into()).is_transient());
        assert!(FieldSyncError::Timeout("30s".into()).is_transient());
        assert!(FieldSyncError::from_status(503, "down".into()).is_transient());
        assert!(FieldSyncError::from_status(429, "slow down".into()).is_transient());

        assert_eq!(FieldSyncError::from_status(422, "bad".into()).kind(), FailureKind::Permanent);
        assert_eq!(FieldSyncError::from_status(401, "token".into()).kind(), FailureKind::Permanent);
        assert_eq!(FieldSyncError::from_status(404, "gone".into()).kind(), FailureKind::Permanent);
        assert_eq!(
            FieldSyncError::MissingAssociation("project".into()).kind(),
            FailureKind::Permanent
        );
        assert_eq!(FieldSyncError::Database("locked".into()).kind(), FailureKind::Storage);
        assert_eq!(
            FieldSyncError::CapacityReached("20".into()).kind(),
            FailureKind::ResourceExhausted
        );
    }
}

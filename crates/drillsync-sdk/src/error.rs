//! 错误类型
//!
//! 每个变体对应一个用户可感知的错误类别：
//! - 配置 / 连接 / 远端部署 / 远端业务 —— 同步阶段的失败，记录仍保留在本地
//! - 存储 / 数据损坏 —— 本地持久化失败，通常被内存兜底吸收
//! - Unrecoverable —— 只能通过恢复出厂（清空本地数据）解决

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrillSyncError {
    /// 目标 URL 未配置或仍是占位符
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 无网络、DNS、超时、非 2xx 状态码
    #[error("Connection error: {0}")]
    Connectivity(String),

    /// 远端返回 HTML（登录页 / 错误页）而不是 JSON
    #[error("Permission error: {0}")]
    RemoteDeployment(String),

    /// 远端返回 `success: false`，消息原样透传
    #[error("{0}")]
    RemoteLogic(String),

    /// 响应既不是 HTML 也不是合法 JSON
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt local state under '{key}': {reason}")]
    CorruptState { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),
}

/// 错误类别（面向用户提示）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connectivity,
    RemoteDeployment,
    RemoteLogic,
    LocalStorage,
    CorruptLocalState,
    Unrecoverable,
}

impl ErrorCategory {
    /// 数据是否已安全保存在本地、稍后会重试
    ///
    /// 只有网络 / 远端失败属于这一类；本地持久化失败会被内存兜底屏蔽。
    pub fn saved_locally(self) -> bool {
        matches!(
            self,
            ErrorCategory::Connectivity | ErrorCategory::RemoteDeployment | ErrorCategory::RemoteLogic
        )
    }

    /// 是否需要用户修改设置（而不是简单地稍后重试）
    pub fn needs_user_action(self) -> bool {
        matches!(
            self,
            ErrorCategory::Configuration | ErrorCategory::RemoteDeployment | ErrorCategory::Unrecoverable
        )
    }
}

impl DrillSyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DrillSyncError::Configuration(_) => ErrorCategory::Configuration,
            DrillSyncError::Connectivity(_) => ErrorCategory::Connectivity,
            DrillSyncError::RemoteDeployment(_) => ErrorCategory::RemoteDeployment,
            // 无法解析的响应按远端业务失败处理：记录保留，下次重试
            DrillSyncError::RemoteLogic(_) | DrillSyncError::InvalidResponse(_) => ErrorCategory::RemoteLogic,
            DrillSyncError::Storage(_) | DrillSyncError::Serialization(_) => ErrorCategory::LocalStorage,
            DrillSyncError::CorruptState { .. } => ErrorCategory::CorruptLocalState,
            DrillSyncError::Unrecoverable(_) => ErrorCategory::Unrecoverable,
        }
    }

    /// 是否应当提示“恢复出厂”
    pub fn requires_reset(&self) -> bool {
        matches!(self, DrillSyncError::Unrecoverable(_))
    }
}

impl From<sled::Error> for DrillSyncError {
    fn from(error: sled::Error) -> Self {
        DrillSyncError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for DrillSyncError {
    fn from(error: serde_json::Error) -> Self {
        DrillSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for DrillSyncError {
    fn from(error: std::io::Error) -> Self {
        DrillSyncError::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DrillSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_remote_failures_are_saved_locally() {
        assert!(DrillSyncError::Connectivity("offline".into()).category().saved_locally());
        assert!(DrillSyncError::RemoteDeployment("login page".into()).category().saved_locally());
        assert!(DrillSyncError::RemoteLogic("sheet locked".into()).category().saved_locally());
        assert!(!DrillSyncError::Configuration("no url".into()).category().saved_locally());
        assert!(!DrillSyncError::Storage("quota".into()).category().saved_locally());
    }

    #[test]
    fn remote_logic_message_passes_through_verbatim() {
        let err = DrillSyncError::RemoteLogic("Hoja no encontrada".into());
        assert_eq!(err.to_string(), "Hoja no encontrada");
    }

    #[test]
    fn only_unrecoverable_requires_reset() {
        assert!(DrillSyncError::Unrecoverable("boom".into()).requires_reset());
        assert!(!DrillSyncError::CorruptState { key: "k".into(), reason: "r".into() }.requires_reset());
        assert!(DrillSyncError::Unrecoverable("boom".into()).category().needs_user_action());
    }
}

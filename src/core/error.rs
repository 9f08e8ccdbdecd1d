//! 错误处理模块
//!
//! 定义了帧同步器与各图形后端共用的错误类型，使用 `thiserror` 生成错误消息。
//!
//! # 错误分类
//!
//! - `Config`：配置文件读取、解析或校验失败
//! - `Graphics`：GPU / 驱动调用失败。此类错误不可恢复，不做任何重试
//! - `Sync`：帧槽位协议被违反（索引越界、非法状态转换等）
//! - `Log`：日志系统初始化失败

use thiserror::Error;

use crate::renderer::sync::FenceValue;

/// 引擎统一的 Result 类型
pub type Result<T> = std::result::Result<T, FrameSyncError>;

/// 帧同步引擎的错误类型
#[derive(Debug, Error)]
pub enum FrameSyncError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形 API 错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// 帧同步协议错误
    #[error("Synchronization error: {0}")]
    Sync(#[from] SyncError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 日志系统错误
    #[error("Log error: {0}")]
    Log(String),

    /// 初始化错误
    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
///
/// `DeviceFailure` 表示设备或驱动已处于无效状态，调用方只能终止程序。
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 设备创建失败
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// 交换链错误
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// GPU 调用失败（提交、signal、等待、present）
    #[error("Unrecoverable device failure: {0}")]
    DeviceFailure(String),
}

/// 帧槽位协议错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// 槽位索引超出范围
    #[error("Frame slot {index} out of range (buffer count {count})")]
    SlotOutOfRange { index: usize, count: usize },

    /// 非法的槽位状态转换
    #[error("Frame slot {index} cannot {action} while {state}")]
    InvalidTransition {
        index: usize,
        action: &'static str,
        state: String,
    },

    /// 在 GPU 工作未完成时重置槽位
    #[error("Cannot reset frame slots while slot {index} is in flight (target {target})")]
    ResetWhileInFlight { index: usize, target: FenceValue },

    /// 缓冲数量无效
    #[error("Unsupported buffer count {0}")]
    InvalidBufferCount(usize),
}

impl GraphicsError {
    /// 用调用名和底层错误构造 `DeviceFailure`
    pub fn device_failure(call: &str, err: impl std::fmt::Display) -> Self {
        GraphicsError::DeviceFailure(format!("{} failed: {}", call, err))
    }
}

impl FrameSyncError {
    /// 是否为不可恢复的设备错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameSyncError::Graphics(GraphicsError::DeviceFailure(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_failure_message() {
        let err: FrameSyncError = GraphicsError::device_failure("Signal", "E_FAIL").into();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Graphics error: Unrecoverable device failure: Signal failed: E_FAIL"
        );
    }

    #[test]
    fn test_sync_error_is_not_fatal() {
        let err: FrameSyncError = SyncError::SlotOutOfRange { index: 4, count: 3 }.into();
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Synchronization error: Frame slot 4 out of range (buffer count 3)"
        );
    }
}

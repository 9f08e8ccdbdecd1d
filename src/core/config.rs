//! 配置管理模块
//!
//! 提供引擎配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "FrameSync"
//! resizable = true
//!
//! [graphics]
//! backend = "simulated"   # 或 "dx12"
//! buffer_count = 3        # 2 或 3
//! strategy = "pipelined"  # 或 "serial"
//! vsync = true
//! use_warp = false
//!
//! [simulation]
//! frames = 120
//! cpu_frame_ms = 2
//! gpu_frame_ms = 6
//! refresh_hz = 60
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, FrameSyncError, Result};
use crate::renderer::sync::SyncStrategy;

/// 支持的最少后缓冲数量
pub const MIN_BUFFER_COUNT: u32 = 2;
/// 支持的最多后缓冲数量
pub const MAX_BUFFER_COUNT: u32 = 3;

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 模拟 GPU 配置
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 是否可调整大小
    #[serde(default = "default_resizable")]
    pub resizable: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 后缓冲（帧槽位）数量
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// CPU/GPU 同步策略
    #[serde(default = "default_strategy")]
    pub strategy: SyncStrategy,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 使用 WARP 软件适配器
    #[serde(default)]
    pub use_warp: bool,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// 工作线程模拟的 GPU，全平台可用
    Simulated,
    /// DirectX 12 后端（仅 Windows）
    Dx12,
}

/// 模拟 GPU 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// 运行的帧数
    #[serde(default = "default_frames")]
    pub frames: u64,

    /// 每帧 CPU 录制耗时（毫秒）
    #[serde(default = "default_cpu_frame_ms")]
    pub cpu_frame_ms: u64,

    /// 每帧 GPU 执行耗时（毫秒）
    #[serde(default = "default_gpu_frame_ms")]
    pub gpu_frame_ms: u64,

    /// 模拟显示器刷新率
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "FrameSync".to_string() }
fn default_resizable() -> bool { true }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Simulated }
fn default_buffer_count() -> u32 { 3 }
fn default_strategy() -> SyncStrategy { SyncStrategy::Pipelined }
fn default_vsync() -> bool { true }
fn default_frames() -> u64 { 120 }
fn default_cpu_frame_ms() -> u64 { 2 }
fn default_gpu_frame_ms() -> u64 { 6 }
fn default_refresh_hz() -> u32 { 60 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "framesync.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            resizable: default_resizable(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            buffer_count: default_buffer_count(),
            strategy: default_strategy(),
            vsync: default_vsync(),
            use_warp: false,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            cpu_frame_ms: default_cpu_frame_ms(),
            gpu_frame_ms: default_gpu_frame_ms(),
            refresh_hz: default_refresh_hz(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use frame_sync::core::Config;
    ///
    /// let config = Config::from_file("config.toml")?;
    /// # Ok::<(), frame_sync::core::FrameSyncError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FrameSyncError::from(ConfigError::FileNotFound(path_str.clone())),
            _ => FrameSyncError::from(e),
        })?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，文件不存在时使用默认配置
    ///
    /// 文件存在但无法读取或解析时返回错误。
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::from_file(path) {
            Err(FrameSyncError::Config(ConfigError::FileNotFound(_))) => Ok(Self::default()),
            result => result,
        }
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--dx12` / `--sim`: 选择后端
    /// - `--serial` / `--pipelined`: 选择同步策略
    /// - `--no-vsync`: 关闭垂直同步
    /// - `--warp`: 使用 WARP 适配器
    /// - `--buffers <n>`: 后缓冲数量
    /// - `--frames <n>`: 模拟运行的帧数
    /// - `--width <value>` / `--height <value>`: 窗口尺寸
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.graphics.backend = GraphicsBackend::Dx12;
        }
        if args.iter().any(|a| a == "--sim") {
            self.graphics.backend = GraphicsBackend::Simulated;
        }

        if args.iter().any(|a| a == "--serial") {
            self.graphics.strategy = SyncStrategy::Serial;
        }
        if args.iter().any(|a| a == "--pipelined") {
            self.graphics.strategy = SyncStrategy::Pipelined;
        }

        if args.iter().any(|a| a == "--no-vsync") {
            self.graphics.vsync = false;
        }
        if args.iter().any(|a| a == "--warp") {
            self.graphics.use_warp = true;
        }

        if let Some(value) = arg_value(&args, "--buffers") {
            self.graphics.buffer_count = value;
        }
        if let Some(value) = arg_value(&args, "--frames") {
            self.simulation.frames = value;
        }
        if let Some(value) = arg_value(&args, "--width") {
            self.window.width = value;
        }
        if let Some(value) = arg_value(&args, "--height") {
            self.window.height = value;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }.into());
        }

        if !(MIN_BUFFER_COUNT..=MAX_BUFFER_COUNT).contains(&self.graphics.buffer_count) {
            return Err(ConfigError::InvalidValue {
                field: "graphics.buffer_count".to_string(),
                reason: format!(
                    "Buffer count must be between {} and {}",
                    MIN_BUFFER_COUNT, MAX_BUFFER_COUNT
                ),
            }.into());
        }

        if self.simulation.refresh_hz == 0 {
            return Err(ConfigError::InvalidValue {
                field: "simulation.refresh_hz".to_string(),
                reason: "Refresh rate must be greater than 0".to_string(),
            }.into());
        }

        Ok(())
    }
}

impl SimulationConfig {
    pub fn cpu_frame_time(&self) -> Duration {
        Duration::from_millis(self.cpu_frame_ms)
    }

    pub fn gpu_frame_time(&self) -> Duration {
        Duration::from_millis(self.gpu_frame_ms)
    }

    /// 一次垂直同步的时长
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_hz.max(1) as f64)
    }
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Simulated => "Simulated GPU",
            GraphicsBackend::Dx12 => "DirectX 12",
        }
    }
}

fn arg_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.backend, GraphicsBackend::Simulated);
        assert_eq!(config.graphics.buffer_count, 3);
        assert_eq!(config.graphics.strategy, SyncStrategy::Pipelined);
        assert!(config.graphics.vsync);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.buffer_count = 4;
        assert!(config.validate().is_err());
        config.graphics.buffer_count = 1;
        assert!(config.validate().is_err());
        config.graphics.buffer_count = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            strategy = "serial"
            vsync = false
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.strategy, SyncStrategy::Serial);
        assert!(!config.graphics.vsync);
        assert_eq!(config.graphics.buffer_count, 3);
        assert_eq!(config.window.title, "FrameSync");
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::from_toml_str("[graphics]\nbuffer_count = \"three\"").unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::FrameSyncError::Config(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("framesync_missing_{}.toml", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let config = Config::from_file_or_default(&path).unwrap();
        assert_eq!(config.graphics.buffer_count, 3);
        assert_eq!(config.graphics.strategy, SyncStrategy::Pipelined);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let path = std::env::temp_dir().join(format!("framesync_malformed_{}.toml", std::process::id()));
        std::fs::write(&path, "[graphics]\nbuffer_count = \"two\"\nstrategy = \"serial\"\n").unwrap();

        let result = Config::from_file_or_default(&path);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            result,
            Err(FrameSyncError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_unreadable_path_is_io_error() {
        // 目录存在但不能作为文件读取
        let result = Config::from_file_or_default(std::env::temp_dir());
        assert!(matches!(result, Err(FrameSyncError::Io(_))));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "frame_sync", "--serial", "--no-vsync", "--buffers", "2", "--frames", "10", "--width", "640",
        ]);

        assert_eq!(config.graphics.strategy, SyncStrategy::Serial);
        assert!(!config.graphics.vsync);
        assert_eq!(config.graphics.buffer_count, 2);
        assert_eq!(config.simulation.frames, 10);
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_apply_args_ignores_bad_numbers() {
        let mut config = Config::default();
        config.apply_args(["--buffers", "many", "--height"]);
        assert_eq!(config.graphics.buffer_count, 3);
        assert_eq!(config.window.height, 720);
    }
}

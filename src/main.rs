//! FrameSync - 帧同步演示程序
//!
//! 默认使用模拟 GPU 在无窗口模式下运行指定帧数；
//! Windows 上可以通过 `--dx12` 打开一个清屏窗口。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 串行策略，双缓冲，运行 300 帧
//! cargo run -- --serial --buffers 2 --frames 300
//!
//! # 使用 DirectX 12（仅 Windows）
//! cargo run -- --dx12 --no-vsync
//! ```

use anyhow::Context;
use frame_sync::core::{log, Config};
use frame_sync::{app_error, app_info};

/// 应用程序入口点
///
/// 1. 加载配置文件（config.toml）
/// 2. 应用命令行参数覆盖
/// 3. 验证配置
/// 4. 初始化日志系统
/// 5. 运行帧循环
///
/// 任何错误都以退出码 1 结束进程。
fn main() {
    if let Err(e) = try_main() {
        app_error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("config.toml").context("Invalid configuration")?;
    config.apply_args(std::env::args().skip(1));
    config.validate().context("Invalid configuration")?;

    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file)
        .context("Failed to initialize logger")?;

    app_info!("FrameSync starting...");
    app_info!(version = env!("CARGO_PKG_VERSION"), "Application initialized");
    app_info!(
        backend = config.graphics.backend.name(),
        buffers = config.graphics.buffer_count,
        strategy = ?config.graphics.strategy,
        vsync = config.graphics.vsync,
        "Graphics configuration"
    );

    let stats = frame_sync::renderer::run(&config).context("Frame loop failed")?;

    app_info!(
        frames = stats.frames_submitted,
        signals = stats.signals,
        blocking_waits = stats.blocking_waits,
        fast_path_hits = stats.fast_path_hits,
        drains = stats.drains,
        "Shutdown complete"
    );
    Ok(())
}

// apps/fb_cli/src/main.rs

//! Fluxbound 命令行界面
//!
//! 在内置算例上运行 MULES / CMULES 输运，验证控制文件。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 5: Application**：
//! - 控制参数来自 JSON 文件或默认值
//! - 库内部的 `log` 记录经 `tracing-log` 桥接到同一订阅器

mod cases;
mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;

/// Fluxbound 有界输运命令行工具
#[derive(Parser)]
#[command(name = "fb_cli")]
#[command(author = "Fluxbound Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded flux-corrected transport (MULES / CMULES) driver", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行输运算例
    Run(commands::run::RunArgs),
    /// 显示默认控制参数
    Info(commands::info::InfoArgs),
    /// 验证控制文件
    Validate(commands::validate::ValidateArgs),
}

fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志，同时接管 log 宏
    tracing_subscriber::fmt()
        .with_max_level(parse_level(&cli.log_level))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("日志初始化失败: {}", e))?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}

// apps/fb_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 以 JSON 输出控制参数，缺省字段已填入默认值。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

/// 信息显示参数
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// 控制文件，省略时显示默认值
    #[arg(long)]
    pub controls: Option<PathBuf>,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("Fluxbound CLI 版本: {}", env!("CARGO_PKG_VERSION"));
    println!("{}", render(&args)?);
    Ok(())
}

fn render(args: &InfoArgs) -> Result<String> {
    let controls = super::load_controls(args.controls.as_deref())?;
    serde_json::to_string_pretty(&controls).context("序列化控制参数失败")
}

// apps/fb_cli/src/commands/mod.rs

//! 子命令

pub mod info;
pub mod run;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use fb_config::MulesControls;

/// 读取控制文件，未给出时使用默认值
pub fn load_controls(path: Option<&Path>) -> Result<MulesControls> {
    match path {
        Some(path) => MulesControls::from_file(path)
            .with_context(|| format!("无法加载控制文件 {}", path.display())),
        None => Ok(MulesControls::default()),
    }
}

// crates/fb_config/src/lib.rs

//! Fluxbound Config Layer
//!
//! 配置层，提供 MULES / CMULES 的控制参数。
//! 所有控制参数集中在显式的 [`MulesControls`] 结构体中，
//! 随每次调用传入，不存在全局可变的求解器设置。
//!
//! # 模块概览
//!
//! - [`controls`]: `MulesControls` 及其子配置
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: fb_cli        ─> 读取 JSON 控制文件
//! Layer 3: fb_mules      ─> 消费 MulesControls
//! Layer 2: fb_config     ─> MulesControls (本层)
//! Layer 1: fb_foundation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controls;
pub mod error;

// 重导出核心类型
pub use controls::{LinearSolverControls, MulesControls, PredictorKind};
pub use error::ConfigError;

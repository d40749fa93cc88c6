// crates/fb_foundation/src/lib.rs

//! Fluxbound Foundation Layer
//!
//! 基础层，提供整个项目共用的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `FbError` / `FbResult`
//! - [`validation`]: 运行时验证报告
//! - [`kahan`]: Kahan 补偿求和
//! - [`float`]: 数值保护常量和安全除法
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 thiserror
//! 2. **局部恢复**: 数值退化（零分母等）在本地吸收，不传播 NaN/Inf
//! 3. **致命错误显式化**: 配置错误和通信错误通过 `FbError` 向上传播
//!
//! # 示例
//!
//! ```
//! use fb_foundation::{FbError, FbResult, KahanSum};
//!
//! fn total(values: &[f64]) -> FbResult<f64> {
//!     if values.is_empty() {
//!         return Err(FbError::invalid_input("空数组"));
//!     }
//!     Ok(KahanSum::sum_iter(values.iter().copied()))
//! }
//!
//! assert_eq!(total(&[1.0, 2.0]).unwrap(), 3.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod float;
pub mod kahan;
pub mod validation;

// 重导出常用类型
pub use error::{FbError, FbResult};
pub use float::{safe_div, SMALL, VSMALL};
pub use kahan::KahanSum;
pub use validation::{ValidationError, ValidationReport, ValidationWarning};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{FbError, FbResult};
    pub use crate::float::{safe_div, SMALL, VSMALL};
    pub use crate::kahan::KahanSum;
    pub use crate::validation::{ValidationError, ValidationReport, ValidationWarning};
    pub use crate::ensure;
}

// crates/fb_mules/src/field/mod.rs

//! 场数据
//!
//! - [`FaceField`]: 面场（通量、修正通量、限制系数）
//! - [`CellScalar`]: 场或常量的统一访问
//! - [`MulesTerms`] / [`PsiBounds`]: 方程系数与物理边界
//! - [`BoundaryConditions`]: 单元场的边界条件与边界值求值

pub mod boundary;
pub mod cell_scalar;
pub mod face_field;
pub mod terms;

pub use boundary::{BoundaryCondition, BoundaryConditions, PatchValues};
pub use cell_scalar::{CellScalar, Zero};
pub use face_field::FaceField;
pub use terms::{MulesTerms, PsiBounds};

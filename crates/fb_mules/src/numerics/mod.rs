// crates/fb_mules/src/numerics/mod.rs

//! 数值方法
//!
//! - [`interpolation`]: 对流通量插值格式
//! - [`linear_algebra`]: 稀疏矩阵与迭代求解器

pub mod interpolation;
pub mod linear_algebra;

pub use interpolation::{face_flux, upwind_flux, FluxScheme};

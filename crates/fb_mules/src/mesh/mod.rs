// crates/fb_mules/src/mesh/mod.rs

//! 网格模块
//!
//! 提供只读的有限体积网格连接关系：
//!
//! - [`FvMesh`]: owner/neighbour 面寻址、单元体积、边界 patch
//! - [`structured`]: 一维线网格与二维矩形网格生成器

pub mod fv_mesh;
pub mod structured;

pub use fv_mesh::{FvMesh, Patch, PatchKind};
pub use structured::{line_1d, line_flux, StructuredGrid};

// crates/fb_mules/src/lib.rs

//! Fluxbound MULES
//!
//! 非结构有限体积网格上的有界通量修正输运（MULES / CMULES）。
//!
//! # 模块概览
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ mules      极值包络 / 限制器 / 显式 / CMULES   │
//! ├──────────────────────────────────────────────┤
//! │ numerics   插值格式 / CSR / BiCGStab          │
//! ├──────────────────────────────────────────────┤
//! │ field      面场 / 系数 / 边界条件             │
//! ├──────────────────────────────────────────────┤
//! │ mesh       FvMesh / 结构网格生成   parallel   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! - [`mesh`]: owner/neighbour 面寻址的只读网格
//! - [`field`]: 面场、场或常量抽象、边界条件
//! - [`numerics`]: 对流插值与线性代数
//! - [`mules`]: 有界修正算法
//! - [`parallel`]: 光环交换与区域分解
//!
//! # 符号约定
//!
//! - 内部面通量 > 0 表示从 owner 流向 neighbour
//! - 边界面通量 > 0 表示流出计算域
//! - 进程边界面上本地单元总是 owner
//!
//! # 示例
//!
//! ```
//! use fb_mules::prelude::*;
//!
//! let mesh = line_1d(5, 1.0).unwrap();
//! let bcs = BoundaryConditions::zero_gradient(&mesh);
//! let controls = MulesControls::default();
//! let ctx = MulesContext::serial(&mesh, &bcs, &controls).unwrap();
//!
//! let phi = line_flux(&mesh, 0.5);
//! let mut psi = vec![1.0, 0.0, 0.0, 0.0, 0.0];
//! let boundary = ctx.boundary_values(&psi).unwrap();
//! let high = face_flux(&mesh, &phi, &psi, &boundary, FluxScheme::Linear).unwrap();
//! let low = upwind_flux(&mesh, &phi, &psi, &boundary).unwrap();
//! let mut phi_corr = high.sub(&low);
//!
//! let report = MulesCorrector::new(ctx)
//!     .solve(1.0, &mut psi, &phi, &mut phi_corr, &MulesTerms::unit(), &PsiBounds::unit())
//!     .unwrap();
//! assert!(psi.iter().all(|&v| (-1e-10..=1.0 + 1e-10).contains(&v)));
//! assert!(report.passes <= 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod field;
pub mod mesh;
pub mod mules;
pub mod numerics;
pub mod parallel;

pub use field::{
    BoundaryCondition, BoundaryConditions, CellScalar, FaceField, MulesTerms, PatchValues,
    PsiBounds, Zero,
};
pub use mesh::{FvMesh, Patch, PatchKind};
pub use mules::{
    correct, limit, limit_corr, limit_sum, limiter, local_extrema, psi_low, AntidiffusiveCapacity,
    BoundednessReport, CorrectorReport, LimiterStats, MulesContext, MulesCorrector, Predictor,
};
pub use parallel::{ChannelHalo, HaloExchange, SerialHalo};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::field::{
        BoundaryCondition, BoundaryConditions, CellScalar, FaceField, MulesTerms, PsiBounds, Zero,
    };
    pub use crate::mesh::{line_1d, line_flux, FvMesh, Patch, PatchKind, StructuredGrid};
    pub use crate::mules::{
        advance_explicit, boundary_flux_integral, correct, limit, limit_corr, limit_sum,
        solve_explicit, volume_integral, BoundednessReport, CorrectorReport, LimitOutput,
        LimiterStats, MulesContext, MulesCorrector, Predictor,
    };
    pub use crate::numerics::{face_flux, upwind_flux, FluxScheme};
    pub use crate::parallel::{
        decompose, decompose_blocks, gather_cells, gather_faces, run_decomposed, ChannelHalo,
        HaloExchange, SerialHalo, SubDomain,
    };
    pub use fb_config::MulesControls;
    pub use fb_foundation::{FbError, FbResult};
}

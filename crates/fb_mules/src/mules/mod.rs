// crates/fb_mules/src/mules/mod.rs

//! MULES / CMULES 有界输运修正
//!
//! 基于通量修正输运（FCT）的有界修正：低阶迎风通量保证有界，
//! 高阶与低阶之差（修正通量 `phiCorr`）乘以逐面限制系数 `λ ∈ [0, 1]`
//! 后再加入，使更新后的单元值不越出局部极值包络。
//!
//! # 模块
//!
//! - [`extrema`]: 局部极值包络、低阶参考值与反扩散容量
//! - [`limiter`]: Zalesak 限制器及迭代 FCT、显式 `limit` 与 CMULES `limit_corr`
//! - [`limit_sum`]: 多相修正通量之和归零
//! - [`explicit`]: 显式 MULES 求解与时间子循环
//! - [`predictor`]: 隐式/显式迎风预测步
//! - [`corrector`]: CMULES 修正状态机
//! - [`diagnostics`]: 有界性、守恒性与限制器统计
//!
//! # 调用流程（CMULES）
//!
//! ```text
//! 预测 (A) ──> 包络 (B) ──> 限制 (C) ──> 修正 (D)
//!                 ^                           │
//!                 └──── 剩余修正通量 ──────────┘  × n_correctors
//! ```

pub mod corrector;
pub mod diagnostics;
pub mod explicit;
pub mod extrema;
pub mod limit_sum;
pub mod limiter;
pub mod predictor;

pub use corrector::{correct, CorrectorReport, MulesCorrector};
pub use diagnostics::{boundary_flux_integral, volume_integral, BoundednessReport, LimiterStats};
pub use explicit::{advance_explicit, explicit_solve, solve_explicit, surface_integrate, ExplicitReport};
pub use extrema::{local_extrema, psi_low, AntidiffusiveCapacity, Envelope};
pub use limit_sum::limit_sum;
pub use limiter::{limit, limit_corr, limiter, LimitOutput};
pub use predictor::{Predictor, PredictorReport};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use fb_config::MulesControls;
use fb_foundation::{FbError, FbResult};

use crate::field::{BoundaryConditions, CellScalar, FaceField, MulesTerms, PatchValues, PsiBounds};
use crate::mesh::FvMesh;
use crate::parallel::{HaloExchange, SerialHalo};

/// 一次 MULES 调用所需的只读上下文
///
/// 网格、边界条件、控制参数与光环均为借用，可在多个场的修正之间共享。
pub struct MulesContext<'a, H: HaloExchange + ?Sized = SerialHalo> {
    /// 网格
    pub mesh: &'a FvMesh,
    /// 输运量的边界条件
    pub boundary: &'a BoundaryConditions,
    /// 控制参数
    pub controls: &'a MulesControls,
    /// 光环交换
    pub halo: &'a H,
}

impl<H: HaloExchange + ?Sized> Clone for MulesContext<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: HaloExchange + ?Sized> Copy for MulesContext<'_, H> {}

impl<'a> MulesContext<'a, SerialHalo> {
    /// 单进程上下文
    pub fn serial(
        mesh: &'a FvMesh,
        boundary: &'a BoundaryConditions,
        controls: &'a MulesControls,
    ) -> FbResult<Self> {
        Self::new(mesh, boundary, controls, &SerialHalo)
    }
}

impl<'a, H: HaloExchange + ?Sized> MulesContext<'a, H> {
    /// 创建并检查边界条件与控制参数
    pub fn new(
        mesh: &'a FvMesh,
        boundary: &'a BoundaryConditions,
        controls: &'a MulesControls,
        halo: &'a H,
    ) -> FbResult<Self> {
        boundary.validate(mesh)?;
        controls.validate()?;
        Ok(Self {
            mesh,
            boundary,
            controls,
            halo,
        })
    }

    /// 当前单元值对应的边界面值
    pub fn boundary_values(&self, psi: &[f64]) -> FbResult<PatchValues> {
        self.boundary.evaluate(self.mesh, psi, self.halo)
    }

    /// 调用前的统一检查
    pub(crate) fn check_inputs<R, Sp, Su, Max, Min>(
        &self,
        dt: f64,
        psi: &[f64],
        terms: &MulesTerms<R, Sp, Su>,
        bounds: &PsiBounds<Max, Min>,
    ) -> FbResult<()>
    where
        R: CellScalar,
        Sp: CellScalar,
        Su: CellScalar,
        Max: CellScalar,
        Min: CellScalar,
    {
        FbError::check_time_step(dt)?;
        FbError::check_size("psi", self.mesh.n_cells(), psi.len())?;
        terms.validate(self.mesh.n_cells())?;
        if self.controls.validate_bounds {
            bounds.validate(self.mesh.n_cells())?;
        }
        Ok(())
    }

    /// 全局最大的剩余修正量 max_c Δt·Σ|corr|/(V·rho)
    pub(crate) fn correction_measure<R: CellScalar>(
        &self,
        dt: f64,
        phi_corr: &FaceField,
        rho: &R,
    ) -> FbResult<f64> {
        let mesh = self.mesh;
        let mut sum_abs = vec![0.0; mesh.n_cells()];
        for ((&o, &n), &v) in mesh.owner().iter().zip(mesh.neighbour()).zip(&phi_corr.internal) {
            sum_abs[o] += v.abs();
            sum_abs[n] += v.abs();
        }
        for (patch, values) in mesh.patches().iter().zip(&phi_corr.patches) {
            for (&c, &v) in patch.face_cells().iter().zip(values) {
                sum_abs[c] += v.abs();
            }
        }
        let local = sum_abs
            .iter()
            .zip(mesh.volumes())
            .enumerate()
            .fold(0.0, |m: f64, (c, (&s, &v))| m.max(dt * s / (v * rho.value(c))));
        self.halo.all_reduce_max(local)
    }
}

/// 逐单元计算 `out[c] = f(c)`，`parallel` 特性下并行
pub(crate) fn cell_kernel(out: &mut [f64], f: impl Fn(usize) -> f64 + Sync + Send) {
    #[cfg(feature = "parallel")]
    out.par_iter_mut().enumerate().for_each(|(c, v)| *v = f(c));

    #[cfg(not(feature = "parallel"))]
    out.iter_mut().enumerate().for_each(|(c, v)| *v = f(c));
}

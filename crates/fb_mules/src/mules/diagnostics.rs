// crates/fb_mules/src/mules/diagnostics.rs

//! 诊断：有界性、守恒量与限制器统计
//!
//! 所有全局量都经 [`HaloExchange`] 归约，单进程与多进程调用方式一致。

use std::fmt;

use fb_foundation::{FbError, FbResult, KahanSum};

use crate::field::{CellScalar, FaceField, PsiBounds};
use crate::mesh::FvMesh;
use crate::parallel::HaloExchange;

/// 视为"受限"的阈值
const LIMITED_THRESHOLD: f64 = 1.0 - 1e-12;

/// 限制器统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterStats {
    /// 非零修正面上的最小 λ
    pub min_lambda: f64,
    /// λ < 1 且修正非零的面数（全局，跨进程面计一次）
    pub limited_faces: usize,
}

impl Default for LimiterStats {
    fn default() -> Self {
        Self {
            min_lambda: 1.0,
            limited_faces: 0,
        }
    }
}

impl LimiterStats {
    /// 由 λ 与对应的（未限制）修正通量统计
    pub fn compute<H: HaloExchange + ?Sized>(
        mesh: &FvMesh,
        lambda: &FaceField,
        phi_corr: &FaceField,
        halo: &H,
    ) -> FbResult<Self> {
        lambda.check_layout(mesh, "lambda")?;
        phi_corr.check_layout(mesh, "phi_corr")?;

        let mut min_lambda: f64 = 1.0;
        let mut limited = 0usize;
        let mut visit = |l: f64, corr: f64, counted: bool| {
            if corr != 0.0 {
                min_lambda = min_lambda.min(l);
                if counted && l < LIMITED_THRESHOLD {
                    limited += 1;
                }
            }
        };

        for (&l, &corr) in lambda.internal.iter().zip(&phi_corr.internal) {
            visit(l, corr, true);
        }
        for ((patch, ls), corrs) in mesh.patches().iter().zip(&lambda.patches).zip(&phi_corr.patches) {
            // 跨进程面只由编号较小的一侧计数
            let counted = patch.neighbour_rank().map_or(true, |nbr| halo.rank() < nbr);
            for (&l, &corr) in ls.iter().zip(corrs) {
                visit(l, corr, counted);
            }
        }

        Ok(Self {
            min_lambda: halo.all_reduce_min(min_lambda)?,
            limited_faces: halo.all_reduce_sum(limited as f64)?.round() as usize,
        })
    }

    /// 合并两次统计
    pub fn merge(&mut self, other: &LimiterStats) {
        self.min_lambda = self.min_lambda.min(other.min_lambda);
        self.limited_faces += other.limited_faces;
    }
}

/// 有界性检查结果
#[derive(Debug, Clone, PartialEq)]
pub struct BoundednessReport {
    /// 场最小值
    pub min: f64,
    /// 场最大值
    pub max: f64,
    /// 越界单元数
    pub n_violations: usize,
    /// 最大上冲量 max(psi - psi_max, 0)
    pub worst_overshoot: f64,
    /// 最大下冲量 max(psi_min - psi, 0)
    pub worst_undershoot: f64,
    /// 首个越界单元（局部编号）
    pub first_violation: Option<usize>,
}

impl BoundednessReport {
    /// 检查 `psi_min - tol <= psi <= psi_max + tol`
    pub fn check<Max: CellScalar, Min: CellScalar>(
        psi: &[f64],
        bounds: &PsiBounds<Max, Min>,
        tol: f64,
    ) -> Self {
        let mut report = Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            n_violations: 0,
            worst_overshoot: 0.0,
            worst_undershoot: 0.0,
            first_violation: None,
        };
        for (c, &v) in psi.iter().enumerate() {
            report.min = report.min.min(v);
            report.max = report.max.max(v);
            let over = v - bounds.max(c);
            let under = bounds.min(c) - v;
            report.worst_overshoot = report.worst_overshoot.max(over);
            report.worst_undershoot = report.worst_undershoot.max(under);
            if over > tol || under > tol || !v.is_finite() {
                report.n_violations += 1;
                report.first_violation.get_or_insert(c);
            }
        }
        report
    }

    /// 跨进程归约
    ///
    /// `first_violation` 为局部编号，归约后仅保留本进程的结果。
    pub fn reduce<H: HaloExchange + ?Sized>(mut self, halo: &H) -> FbResult<Self> {
        self.min = halo.all_reduce_min(self.min)?;
        self.max = halo.all_reduce_max(self.max)?;
        self.worst_overshoot = halo.all_reduce_max(self.worst_overshoot)?;
        self.worst_undershoot = halo.all_reduce_max(self.worst_undershoot)?;
        self.n_violations = halo.all_reduce_sum(self.n_violations as f64)?.round() as usize;
        Ok(self)
    }

    /// 是否有界
    pub fn is_bounded(&self) -> bool {
        self.n_violations == 0
    }
}

impl fmt::Display for BoundednessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "范围 [{:.6e}, {:.6e}], 越界单元 {}, 上冲 {:.3e}, 下冲 {:.3e}",
            self.min, self.max, self.n_violations, self.worst_overshoot, self.worst_undershoot
        )
    }
}

/// 全局体积分 `Σ V·rho·psi`（补偿求和）
pub fn volume_integral<H, R>(mesh: &FvMesh, psi: &[f64], rho: &R, halo: &H) -> FbResult<f64>
where
    H: HaloExchange + ?Sized,
    R: CellScalar + ?Sized,
{
    FbError::check_size("psi", mesh.n_cells(), psi.len())?;
    rho.check_len("rho", mesh.n_cells())?;
    let local = KahanSum::sum_iter(
        mesh.volumes()
            .iter()
            .zip(psi)
            .enumerate()
            .map(|(c, (&v, &p))| v * rho.value(c) * p),
    );
    halo.all_reduce_sum(local)
}

/// 物理边界净流出 `Σ_f φ_f`（不含进程边界）
pub fn boundary_flux_integral<H: HaloExchange + ?Sized>(
    mesh: &FvMesh,
    flux: &FaceField,
    halo: &H,
) -> FbResult<f64> {
    flux.check_layout(mesh, "flux")?;
    let local = KahanSum::sum_iter(
        mesh.patches()
            .iter()
            .zip(&flux.patches)
            .filter(|(patch, _)| !patch.is_coupled())
            .flat_map(|(_, values)| values.iter().copied()),
    );
    halo.all_reduce_sum(local)
}

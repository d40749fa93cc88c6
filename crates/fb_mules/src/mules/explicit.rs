// crates/fb_mules/src/mules/explicit.rs

//! 显式 MULES
//!
//! 限制后的通量 `phiPsi = phiBD + λ·phiCorr` 代入显式更新：
//!
//! ```text
//! psi = (rho·psi0/Δt + Su - div(phiPsi)) / (rho/Δt + Sp)
//! ```
//!
//! `div` 为面通量的体积平均散度 `Σ_f φ_f / V`，面通量符号按单元外法向计。

use fb_foundation::{FbError, FbResult};

use super::diagnostics::LimiterStats;
use super::limiter::{limit, LimitOutput};
use super::{cell_kernel, MulesContext};
use crate::field::{CellScalar, FaceField, MulesTerms, PsiBounds};
use crate::mesh::FvMesh;
use crate::numerics::{face_flux, FluxScheme};
use crate::parallel::HaloExchange;

/// 面通量的体积平均散度 `Σ_f φ_f / V`
///
/// 内部面对 owner 记为流出、对 neighbour 记为流入；
/// 边界面（含进程边界）对所属单元记为流出。
pub fn surface_integrate(mesh: &FvMesh, flux: &FaceField) -> Vec<f64> {
    let mut sum = vec![0.0; mesh.n_cells()];
    for ((&o, &n), &f) in mesh.owner().iter().zip(mesh.neighbour()).zip(&flux.internal) {
        sum[o] += f;
        sum[n] -= f;
    }
    for (patch, values) in mesh.patches().iter().zip(&flux.patches) {
        for (&c, &f) in patch.face_cells().iter().zip(values) {
            sum[c] += f;
        }
    }

    let volumes = mesh.volumes();
    let mut div = vec![0.0; mesh.n_cells()];
    cell_kernel(&mut div, |c| sum[c] / volumes[c]);
    div
}

/// 显式更新
///
/// `psi0` 为旧时间层的值，结果写入 `psi`。
pub fn explicit_solve<R, Sp, Su>(
    mesh: &FvMesh,
    dt: f64,
    psi: &mut [f64],
    psi0: &[f64],
    phi_psi: &FaceField,
    terms: &MulesTerms<R, Sp, Su>,
) -> FbResult<()>
where
    R: CellScalar,
    Sp: CellScalar,
    Su: CellScalar,
{
    FbError::check_time_step(dt)?;
    FbError::check_size("psi", mesh.n_cells(), psi.len())?;
    FbError::check_size("psi0", mesh.n_cells(), psi0.len())?;
    phi_psi.check_layout(mesh, "phi_psi")?;

    let r_dt = 1.0 / dt;
    let div = surface_integrate(mesh, phi_psi);
    cell_kernel(psi, |c| {
        (terms.rho.value(c) * psi0[c] * r_dt + terms.su.value(c) - div[c]) / terms.diag(c, r_dt)
    });
    Ok(())
}

/// 显式 MULES：限制 `phi_psi` 后更新 `psi`
///
/// 进入时 `phi_psi` 为高阶通量，返回时为限制后的通量 `phiBD + λ·phiCorr`。
pub fn solve_explicit<H, R, Sp, Su, Max, Min>(
    ctx: &MulesContext<'_, H>,
    dt: f64,
    psi: &mut [f64],
    phi: &FaceField,
    phi_psi: &mut FaceField,
    terms: &MulesTerms<R, Sp, Su>,
    bounds: &PsiBounds<Max, Min>,
) -> FbResult<LimiterStats>
where
    H: HaloExchange + ?Sized,
    R: CellScalar,
    Sp: CellScalar,
    Su: CellScalar,
    Max: CellScalar,
    Min: CellScalar,
{
    let stats = limit(ctx, dt, psi, phi, phi_psi, terms, bounds, LimitOutput::Flux)?;
    let psi0 = psi.to_vec();
    explicit_solve(ctx.mesh, dt, psi, &psi0, phi_psi, terms)?;
    Ok(stats)
}

/// 显式推进结果
#[derive(Debug, Clone)]
pub struct ExplicitReport {
    /// 子循环次数
    pub sub_cycles: usize,
    /// 各子循环中最小的限制系数
    pub min_lambda: f64,
    /// 各子循环受限面数之和
    pub limited_faces: usize,
    /// 子循环时间平均的限制后通量
    pub flux: FaceField,
}

/// 以 `n_sub_cycles` 个等长子步推进一个时间步
///
/// 每个子步按当前 `psi` 以 `scheme` 重新构造高阶通量。
pub fn advance_explicit<H, R, Sp, Su, Max, Min>(
    ctx: &MulesContext<'_, H>,
    dt: f64,
    psi: &mut [f64],
    phi: &FaceField,
    scheme: FluxScheme,
    terms: &MulesTerms<R, Sp, Su>,
    bounds: &PsiBounds<Max, Min>,
) -> FbResult<ExplicitReport>
where
    H: HaloExchange + ?Sized,
    R: CellScalar,
    Sp: CellScalar,
    Su: CellScalar,
    Max: CellScalar,
    Min: CellScalar,
{
    FbError::check_time_step(dt)?;
    let n_sub = ctx.controls.n_sub_cycles.max(1);
    let sub_dt = dt / n_sub as f64;

    let mut report = ExplicitReport {
        sub_cycles: n_sub,
        min_lambda: 1.0,
        limited_faces: 0,
        flux: FaceField::zeros(ctx.mesh),
    };

    for cycle in 0..n_sub {
        let boundary = ctx.boundary_values(psi)?;
        let mut phi_psi = face_flux(ctx.mesh, phi, psi, &boundary, scheme)?;
        let stats = solve_explicit(ctx, sub_dt, psi, phi, &mut phi_psi, terms, bounds)?;

        log::trace!(
            "显式子循环 {}/{}: min λ = {:.4}, 受限面 {}",
            cycle + 1,
            n_sub,
            stats.min_lambda,
            stats.limited_faces
        );

        report.min_lambda = report.min_lambda.min(stats.min_lambda);
        report.limited_faces += stats.limited_faces;
        report.flux.axpy(1.0 / n_sub as f64, &phi_psi);
    }

    Ok(report)
}

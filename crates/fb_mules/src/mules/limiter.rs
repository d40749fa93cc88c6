// crates/fb_mules/src/mules/limiter.rs

//! Zalesak 限制器
//!
//! # 记号
//!
//! 对单元 c，`P+` 为流入的修正通量之和，`P-` 为流出之和：
//!
//! ```text
//! R+ = min(1, Q+ / P+)    作用于流入 c 的面（c 为接收方）
//! R- = min(1, Q- / P-)    作用于流出 c 的面（c 为提供方）
//! ```
//!
//! 面的限制系数取提供方 `R-` 与接收方 `R+` 的较小者。
//! 物理边界面只有所属单元一侧；进程边界面两侧各算一次，取两侧最小值，
//! 保证两个进程得到相同的 `λ`。
//!
//! # 迭代
//!
//! 初值 `λ = 0`。每次迭代只处理尚未接受的剩余修正 `(1 - λ)·phiCorr`，
//! 容量扣除已接受的净流入：
//!
//! ```text
//! Q+_k = max(Q+ - A, 0),  Q-_k = max(Q- + A, 0),  λ ← λ + δ·(1 - λ)
//! ```
//!
//! `A` 为单元已接受的净流入。每一步各自满足容量约束，
//! 因此迭代次数只影响接受的修正量，不影响有界性。

use fb_foundation::{safe_div, FbError, FbResult};

use super::diagnostics::LimiterStats;
use super::extrema::{local_extrema, psi_low, AntidiffusiveCapacity};
use super::MulesContext;
use crate::field::{CellScalar, FaceField, MulesTerms, PsiBounds};
use crate::mesh::FvMesh;
use crate::numerics::upwind_flux;
use crate::parallel::HaloExchange;

/// 显式 `limit` 的输出形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOutput {
    /// 返回限制后的修正通量 `λ·phiCorr`
    Correction,
    /// 返回完整通量 `phiBD + λ·phiCorr`
    Flux,
}

/// 容量比 `min(1, Q/P)`，`P = 0` 时为 1
#[inline]
fn ratio(q: f64, p: f64) -> f64 {
    if p <= 0.0 {
        return 1.0;
    }
    safe_div(q.max(0.0), p, 1.0).min(1.0)
}

/// 逐面限制系数
///
/// 返回的 `λ` 与 `phi_corr` 布局相同，取值 [0, 1]；修正为零的面 `λ = 1`。
/// 多进程时必须在所有 rank 上以相同的 `n_iter` 调用。
pub fn limiter<H: HaloExchange + ?Sized>(
    mesh: &FvMesh,
    phi_corr: &FaceField,
    capacity: &AntidiffusiveCapacity,
    n_iter: usize,
    halo: &H,
) -> FbResult<FaceField> {
    let n_cells = mesh.n_cells();
    phi_corr.check_layout(mesh, "phi_corr")?;
    FbError::check_size("q_plus", n_cells, capacity.q_plus.len())?;
    FbError::check_size("q_minus", n_cells, capacity.q_minus.len())?;

    let owner = mesh.owner();
    let neighbour = mesh.neighbour();
    let patches = mesh.patches();

    let mut lambda = phi_corr.map(|v| if v == 0.0 { 1.0 } else { 0.0 });
    let mut accepted = vec![0.0; n_cells];
    let mut p_plus = vec![0.0; n_cells];
    let mut p_minus = vec![0.0; n_cells];
    let mut r_plus = vec![0.0; n_cells];
    let mut r_minus = vec![0.0; n_cells];

    for iter in 0..n_iter.max(1) {
        p_plus.iter_mut().for_each(|v| *v = 0.0);
        p_minus.iter_mut().for_each(|v| *v = 0.0);

        // 剩余修正
        let residual = phi_corr.zip_map(&lambda, |corr, l| (1.0 - l) * corr);

        for (f, &r) in residual.internal.iter().enumerate() {
            let (o, n) = (owner[f], neighbour[f]);
            if r > 0.0 {
                p_minus[o] += r;
                p_plus[n] += r;
            } else {
                p_plus[o] -= r;
                p_minus[n] -= r;
            }
        }
        for (patch, values) in patches.iter().zip(&residual.patches) {
            for (&c, &r) in patch.face_cells().iter().zip(values) {
                if r > 0.0 {
                    p_minus[c] += r;
                } else {
                    p_plus[c] -= r;
                }
            }
        }

        for c in 0..n_cells {
            r_plus[c] = ratio(capacity.q_plus[c] - accepted[c], p_plus[c]);
            r_minus[c] = ratio(capacity.q_minus[c] + accepted[c], p_minus[c]);
        }

        // 本次迭代的逐面增量 δ
        let mut delta = FaceField::new(
            residual
                .internal
                .iter()
                .enumerate()
                .map(|(f, &r)| {
                    let (o, n) = (owner[f], neighbour[f]);
                    if r > 0.0 {
                        r_minus[o].min(r_plus[n])
                    } else if r < 0.0 {
                        r_plus[o].min(r_minus[n])
                    } else {
                        0.0
                    }
                })
                .collect(),
            patches
                .iter()
                .zip(&residual.patches)
                .map(|(patch, values)| {
                    patch
                        .face_cells()
                        .iter()
                        .zip(values)
                        .map(|(&c, &r)| {
                            if r > 0.0 {
                                r_minus[c]
                            } else if r < 0.0 {
                                r_plus[c]
                            } else {
                                0.0
                            }
                        })
                        .collect()
                })
                .collect(),
        );

        if mesh.is_parallel() {
            let remote = halo.exchange_faces(mesh, &delta)?;
            for ((patch, local), remote) in patches.iter().zip(&mut delta.patches).zip(remote) {
                if patch.is_coupled() {
                    for (d, r) in local.iter_mut().zip(remote) {
                        *d = d.min(r);
                    }
                }
            }
        }

        // 累加 λ 与已接受的净流入
        for (f, (&r, &d)) in residual.internal.iter().zip(&delta.internal).enumerate() {
            if r == 0.0 {
                continue;
            }
            lambda.internal[f] += d * (1.0 - lambda.internal[f]);
            accepted[owner[f]] -= d * r;
            accepted[neighbour[f]] += d * r;
        }
        for (p, patch) in patches.iter().enumerate() {
            for (i, &c) in patch.face_cells().iter().enumerate() {
                let r = residual.patches[p][i];
                if r == 0.0 {
                    continue;
                }
                let d = delta.patches[p][i];
                lambda.patches[p][i] += d * (1.0 - lambda.patches[p][i]);
                accepted[c] -= d * r;
            }
        }

        log::trace!("限制器迭代 {}: 完成", iter + 1);
    }

    lambda.iter_mut().for_each(|l| *l = l.clamp(0.0, 1.0));
    Ok(lambda)
}

/// 显式 MULES 限制
///
/// 进入时 `phi_psi` 为高阶通量。以 `psi` 为旧时间层值，低阶通量取迎风；
/// 物理边界面的修正置零。返回时 `phi_psi` 按 `output` 写入限制后的修正或完整通量。
#[allow(clippy::too_many_arguments)]
pub fn limit<H, R, Sp, Su, Max, Min>(
    ctx: &MulesContext<'_, H>,
    dt: f64,
    psi: &[f64],
    phi: &FaceField,
    phi_psi: &mut FaceField,
    terms: &MulesTerms<R, Sp, Su>,
    bounds: &PsiBounds<Max, Min>,
    output: LimitOutput,
) -> FbResult<LimiterStats>
where
    H: HaloExchange + ?Sized,
    R: CellScalar,
    Sp: CellScalar,
    Su: CellScalar,
    Max: CellScalar,
    Min: CellScalar,
{
    let mesh = ctx.mesh;
    ctx.check_inputs(dt, psi, terms, bounds)?;
    phi.check_layout(mesh, "phi")?;
    phi_psi.check_layout(mesh, "phi_psi")?;

    let boundary = ctx.boundary_values(psi)?;
    let phi_bd = upwind_flux(mesh, phi, psi, &boundary)?;
    let mut phi_corr = phi_psi.sub(&phi_bd);
    phi_corr.zero_physical_boundaries(mesh);

    let low = psi_low(mesh, dt, psi, &phi_bd, terms)?;
    let envelope = local_extrema(ctx, psi, &boundary, bounds)?;
    let capacity = AntidiffusiveCapacity::new(mesh, dt, &low, &envelope, terms)?;
    let lambda = limiter(mesh, &phi_corr, &capacity, ctx.controls.n_limiter_iter, ctx.halo)?;
    let stats = LimiterStats::compute(mesh, &lambda, &phi_corr, ctx.halo)?;

    let limited = phi_corr.mul(&lambda);
    *phi_psi = match output {
        LimitOutput::Correction => limited,
        LimitOutput::Flux => phi_bd.zip_map(&limited, |bd, corr| bd + corr),
    };

    log::debug!(
        "MULES 限制: min λ = {:.4}, 受限面 {}",
        stats.min_lambda,
        stats.limited_faces
    );
    Ok(stats)
}

/// CMULES 修正通量限制（原地）
///
/// 包络与容量都以当前 `psi` 为参考值，`phi_corr` 原地乘以 `λ`。
pub fn limit_corr<H, R, Sp, Su, Max, Min>(
    ctx: &MulesContext<'_, H>,
    dt: f64,
    psi: &[f64],
    phi_corr: &mut FaceField,
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
    ctx.check_inputs(dt, psi, terms, bounds)?;
    phi_corr.check_layout(ctx.mesh, "phi_corr")?;
    limit_corr_unchecked(ctx, dt, psi, phi_corr, terms, bounds)
}

/// 不做输入检查的 `limit_corr`，供修正子循环重复调用
pub(crate) fn limit_corr_unchecked<H, R, Sp, Su, Max, Min>(
    ctx: &MulesContext<'_, H>,
    dt: f64,
    psi: &[f64],
    phi_corr: &mut FaceField,
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
    let mesh = ctx.mesh;
    let boundary = ctx.boundary_values(psi)?;
    let envelope = local_extrema(ctx, psi, &boundary, bounds)?;
    let capacity = AntidiffusiveCapacity::new(mesh, dt, psi, &envelope, terms)?;
    let lambda = limiter(mesh, phi_corr, &capacity, ctx.controls.n_limiter_iter, ctx.halo)?;
    let stats = LimiterStats::compute(mesh, &lambda, phi_corr, ctx.halo)?;
    *phi_corr = phi_corr.mul(&lambda);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::BoundaryConditions;
    use crate::mesh::line_1d;
    use crate::mules::explicit::surface_integrate;
    use crate::parallel::SerialHalo;
    use fb_config::MulesControls;

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(1.0, 0.0), 1.0);
        assert_eq!(ratio(1.0, 4.0), 0.25);
        assert_eq!(ratio(8.0, 4.0), 1.0);
        assert_eq!(ratio(-1.0, 4.0), 0.0);
    }

    #[test]
    fn test_zero_correction_gives_unit_lambda() {
        let mesh = line_1d(3, 1.0).unwrap();
        let corr = FaceField::zeros(&mesh);
        let cap = AntidiffusiveCapacity::from_parts(vec![0.0; 3], vec![0.0; 3]);
        let lambda = limiter(&mesh, &corr, &cap, 3, &SerialHalo).unwrap();
        assert!(lambda.iter().all(|l| l == 1.0));
    }

    #[test]
    fn test_no_capacity_blocks_flux() {
        let mesh = line_1d(2, 1.0).unwrap();
        let mut corr = FaceField::zeros(&mesh);
        corr.internal[0] = 1.0;
        // 接收方无容量
        let cap = AntidiffusiveCapacity::from_parts(vec![1.0, 0.0], vec![1.0, 1.0]);
        let lambda = limiter(&mesh, &corr, &cap, 3, &SerialHalo).unwrap();
        assert_eq!(lambda.internal[0], 0.0);
    }

    #[test]
    fn test_partial_capacity() {
        let mesh = line_1d(2, 1.0).unwrap();
        let mut corr = FaceField::zeros(&mesh);
        corr.internal[0] = -2.0;
        // 由 1 流向 0：提供方 1 可释放 0.5
        let cap = AntidiffusiveCapacity::from_parts(vec![10.0, 10.0], vec![10.0, 0.5]);
        let lambda = limiter(&mesh, &corr, &cap, 1, &SerialHalo).unwrap();
        assert!((lambda.internal[0] - 0.25).abs() < 1e-14);
    }

    #[test]
    fn test_iterations_accept_more_without_violating_capacity() {
        // 单元 1 同时接收两侧修正，容量只够一半
        let mesh = line_1d(3, 1.0).unwrap();
        let mut corr = FaceField::zeros(&mesh);
        corr.internal[0] = 1.0;
        corr.internal[1] = -1.0;
        let cap = AntidiffusiveCapacity::from_parts(vec![0.0, 1.0, 0.0], vec![0.2, 0.0, 1.0]);

        let one = limiter(&mesh, &corr, &cap, 1, &SerialHalo).unwrap();
        let many = limiter(&mesh, &corr, &cap, 5, &SerialHalo).unwrap();
        assert!((one.internal[0] - 0.2).abs() < 1e-14);
        assert!((one.internal[1] - 0.5).abs() < 1e-14);
        assert!(many.internal[1] >= one.internal[1]);

        for lambda in [&one, &many] {
            let inflow = lambda.internal[0] * 1.0 + lambda.internal[1] * 1.0;
            assert!(inflow <= 1.0 + 1e-14);
            assert!(lambda.internal[0] <= 0.2 + 1e-14);
        }
    }

    #[test]
    fn test_limit_corr_keeps_psi_in_envelope() {
        let mesh = line_1d(4, 1.0).unwrap();
        let bcs = BoundaryConditions::zero_gradient(&mesh);
        let controls = MulesControls::default();
        let ctx = MulesContext::serial(&mesh, &bcs, &controls).unwrap();

        let psi = vec![1.0, 1.0, 0.0, 0.0];
        let mut corr = FaceField::zeros(&mesh);
        corr.internal = vec![0.7, -0.4, 0.9];
        let dt = 1.0;
        limit_corr(&ctx, dt, &psi, &mut corr, &MulesTerms::unit(), &PsiBounds::unit()).unwrap();

        let div = surface_integrate(&mesh, &corr);
        for c in 0..4 {
            let updated = psi[c] - dt * div[c];
            assert!((-1e-12..=1.0 + 1e-12).contains(&updated), "单元 {}: {}", c, updated);
        }
    }

    #[test]
    fn test_limit_returns_flux_or_correction() {
        let mesh = line_1d(3, 1.0).unwrap();
        let bcs = BoundaryConditions::zero_gradient(&mesh);
        let controls = MulesControls::default();
        let ctx = MulesContext::serial(&mesh, &bcs, &controls).unwrap();
        let phi = crate::mesh::line_flux(&mesh, 0.5);
        let psi = vec![0.2, 0.2, 0.2];
        let terms = MulesTerms::unit();
        let bounds = PsiBounds::unit();

        // 均匀场：高阶与低阶通量一致
        let high = crate::numerics::face_flux(
            &mesh,
            &phi,
            &psi,
            &ctx.boundary_values(&psi).unwrap(),
            crate::numerics::FluxScheme::Linear,
        )
        .unwrap();

        let mut as_flux = high.clone();
        limit(&ctx, 0.5, &psi, &phi, &mut as_flux, &terms, &bounds, LimitOutput::Flux).unwrap();
        assert!(as_flux.zip_map(&high, |a, b| (a - b).abs()).max_abs() < 1e-14);

        let mut as_corr = high;
        limit(&ctx, 0.5, &psi, &phi, &mut as_corr, &terms, &bounds, LimitOutput::Correction)
            .unwrap();
        assert!(as_corr.max_abs() < 1e-14);
    }

    #[test]
    fn test_limit_corr_rejects_inverted_bounds() {
        let mesh = line_1d(2, 1.0).unwrap();
        let bcs = BoundaryConditions::zero_gradient(&mesh);
        let controls = MulesControls::default();
        let ctx = MulesContext::serial(&mesh, &bcs, &controls).unwrap();
        let mut corr = FaceField::zeros(&mesh);
        let bounds = PsiBounds::new(1.0, 0.0);
        let err = limit_corr(&ctx, 1.0, &[0.5, 0.5], &mut corr, &MulesTerms::unit(), &bounds);
        assert!(matches!(err, Err(FbError::InvalidBounds { .. })));
    }
}

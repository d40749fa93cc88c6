// crates/fb_mules/src/mules/corrector.rs

//! CMULES 修正
//!
//! # 状态机
//!
//! ```text
//! A 预测: 隐式迎风（或显式迎风）得到有界的 psi
//! B 包络: 以当前 psi 计算局部极值包络与容量
//! C 限制: 剩余修正通量乘以 λ
//! D 修正: psi += -div(λ·corr) / (rho/Δt + Sp)
//! ```
//!
//! B-D 重复 `n_correctors` 次。每次只处理尚未接受的修正，
//! 剩余量小于 `tolerance` 时提前结束。相邻两次的单元增量全局反向时
//! 视为振荡，本次增量按 `relaxation` 缩小。
//!
//! 所有分支判断都基于全局归约量，多进程下各 rank 走相同的路径。

use fb_foundation::{FbError, FbResult};

use super::diagnostics::LimiterStats;
use super::explicit::surface_integrate;
use super::limiter::limit_corr_unchecked;
use super::predictor::{Predictor, PredictorReport};
use super::{cell_kernel, MulesContext};
use crate::field::{CellScalar, FaceField, MulesTerms, PsiBounds};
use crate::mesh::FvMesh;
use crate::parallel::HaloExchange;

/// 以限制后的修正通量更新 `psi`
///
/// `psi ← psi - div(phi_corr) / (rho/Δt + Sp)`，源项已在预测步计入。
pub fn correct<R, Sp, Su>(
    mesh: &FvMesh,
    dt: f64,
    psi: &mut [f64],
    phi_corr: &FaceField,
    terms: &MulesTerms<R, Sp, Su>,
) -> FbResult<()>
where
    R: CellScalar,
    Sp: CellScalar,
    Su: CellScalar,
{
    FbError::check_time_step(dt)?;
    FbError::check_size("psi", mesh.n_cells(), psi.len())?;
    phi_corr.check_layout(mesh, "phi_corr")?;

    let r_dt = 1.0 / dt;
    let div = surface_integrate(mesh, phi_corr);
    let old = psi.to_vec();
    cell_kernel(psi, |c| old[c] - div[c] / terms.diag(c, r_dt));
    Ok(())
}

/// CMULES 修正结果
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectorReport {
    /// 实际执行的修正次数
    pub passes: usize,
    /// 剩余修正低于容差或已全部接受
    pub converged: bool,
    /// 因振荡而亚松弛的次数
    pub relaxed_passes: usize,
    /// 各次修正中最小的 λ
    pub min_lambda: f64,
    /// 最后一次修正的受限面数
    pub limited_faces: usize,
    /// 预测步结果（`correct_predicted` 为 None）
    pub predictor: Option<PredictorReport>,
}

/// CMULES 修正器
pub struct MulesCorrector<'a, H: HaloExchange + ?Sized> {
    ctx: MulesContext<'a, H>,
    predictor: Predictor,
}

impl<'a, H: HaloExchange + ?Sized> MulesCorrector<'a, H> {
    /// 创建，预测步取自控制参数
    pub fn new(ctx: MulesContext<'a, H>) -> Self {
        let predictor = Predictor::from(ctx.controls.predictor);
        Self { ctx, predictor }
    }

    /// 指定预测步
    pub fn with_predictor(mut self, predictor: Predictor) -> Self {
        self.predictor = predictor;
        self
    }

    /// 上下文
    pub fn context(&self) -> &MulesContext<'a, H> {
        &self.ctx
    }

    /// 预测步
    pub fn predictor(&self) -> Predictor {
        self.predictor
    }

    /// 完整的一步：预测后修正
    ///
    /// 进入时 `psi` 为旧时间层值，`phi_corr` 为未限制的修正通量（高阶减低阶）；
    /// 返回时 `psi` 为新值，`phi_corr` 为实际接受的修正通量。
    pub fn solve<R, Sp, Su, Max, Min>(
        &self,
        dt: f64,
        psi: &mut [f64],
        phi: &FaceField,
        phi_corr: &mut FaceField,
        terms: &MulesTerms<R, Sp, Su>,
        bounds: &PsiBounds<Max, Min>,
    ) -> FbResult<CorrectorReport>
    where
        R: CellScalar,
        Sp: CellScalar,
        Su: CellScalar,
        Max: CellScalar,
        Min: CellScalar,
    {
        self.ctx.check_inputs(dt, psi, terms, bounds)?;
        phi_corr.check_layout(self.ctx.mesh, "phi_corr")?;
        let prediction = self.predictor.predict(&self.ctx, dt, psi, phi, terms)?;
        let mut report = self.correct_passes(dt, psi, phi_corr, terms, bounds)?;
        report.predictor = Some(prediction);
        Ok(report)
    }

    /// 只做修正，`psi` 已由调用方预测
    pub fn correct_predicted<R, Sp, Su, Max, Min>(
        &self,
        dt: f64,
        psi: &mut [f64],
        phi_corr: &mut FaceField,
        terms: &MulesTerms<R, Sp, Su>,
        bounds: &PsiBounds<Max, Min>,
    ) -> FbResult<CorrectorReport>
    where
        R: CellScalar,
        Sp: CellScalar,
        Su: CellScalar,
        Max: CellScalar,
        Min: CellScalar,
    {
        self.ctx.check_inputs(dt, psi, terms, bounds)?;
        phi_corr.check_layout(self.ctx.mesh, "phi_corr")?;
        self.correct_passes(dt, psi, phi_corr, terms, bounds)
    }

    fn correct_passes<R, Sp, Su, Max, Min>(
        &self,
        dt: f64,
        psi: &mut [f64],
        phi_corr: &mut FaceField,
        terms: &MulesTerms<R, Sp, Su>,
        bounds: &PsiBounds<Max, Min>,
    ) -> FbResult<CorrectorReport>
    where
        R: CellScalar,
        Sp: CellScalar,
        Su: CellScalar,
        Max: CellScalar,
        Min: CellScalar,
    {
        let ctx = &self.ctx;
        let mesh = ctx.mesh;
        let controls = ctx.controls;
        let volumes = mesh.volumes();

        let mut remaining = phi_corr.clone();
        let mut accepted = FaceField::zeros(mesh);
        let mut previous: Option<Vec<f64>> = None;
        let mut stats = LimiterStats::default();
        let mut report = CorrectorReport {
            passes: 0,
            converged: false,
            relaxed_passes: 0,
            min_lambda: 1.0,
            limited_faces: 0,
            predictor: None,
        };

        for pass in 0..controls.n_correctors {
            let measure = ctx.correction_measure(dt, &remaining, &terms.rho)?;
            if measure == 0.0 || measure < controls.tolerance {
                report.converged = true;
                break;
            }

            let mut corr = remaining.clone();
            stats = limit_corr_unchecked(ctx, dt, psi, &mut corr, terms, bounds)?;
            report.min_lambda = report.min_lambda.min(stats.min_lambda);

            let before = psi.to_vec();
            correct(mesh, dt, psi, &corr, terms)?;
            let mut increment: Vec<f64> = psi.iter().zip(&before).map(|(a, b)| a - b).collect();

            if let Some(prev) = &previous {
                let local: f64 = increment
                    .iter()
                    .zip(prev)
                    .zip(volumes)
                    .map(|((a, b), v)| a * b * v)
                    .sum();
                let alignment = ctx.halo.all_reduce_sum(local)?;
                if alignment < 0.0 && controls.relaxation < 1.0 {
                    let r = controls.relaxation;
                    corr.scale(r);
                    for ((p, b), inc) in psi.iter_mut().zip(&before).zip(increment.iter_mut()) {
                        *inc *= r;
                        *p = b + *inc;
                    }
                    report.relaxed_passes += 1;
                    log::debug!("CMULES 修正 {}: 检测到振荡，松弛 {}", pass + 1, r);
                }
            }

            accepted.axpy(1.0, &corr);
            remaining.axpy(-1.0, &corr);
            previous = Some(increment);
            report.passes += 1;

            log::debug!(
                "CMULES 修正 {}: min λ = {:.4}, 受限面 {}",
                pass + 1,
                stats.min_lambda,
                stats.limited_faces
            );
        }

        if !report.converged {
            let measure = ctx.correction_measure(dt, &remaining, &terms.rho)?;
            report.converged = measure == 0.0 || measure < controls.tolerance;
        }
        report.limited_faces = stats.limited_faces;
        *phi_corr = accepted;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{BoundaryCondition, BoundaryConditions};
    use crate::mesh::{line_1d, line_flux};
    use crate::mules::diagnostics::BoundednessReport;
    use crate::numerics::{face_flux, upwind_flux, FluxScheme};
    use fb_config::{MulesControls, PredictorKind};

    fn step_case(controls: MulesControls, scheme: FluxScheme) -> (Vec<f64>, CorrectorReport) {
        let mesh = line_1d(20, 0.05).unwrap();
        let mut bcs = BoundaryConditions::zero_gradient(&mesh);
        bcs.set(0, BoundaryCondition::Uniform(1.0)).unwrap();
        let ctx = MulesContext::serial(&mesh, &bcs, &controls).unwrap();
        let phi = line_flux(&mesh, 1.0);
        let dt = 0.02;

        let mut psi: Vec<f64> = (0..20).map(|i| if i < 8 { 1.0 } else { 0.0 }).collect();
        let boundary = ctx.boundary_values(&psi).unwrap();
        let high = face_flux(&mesh, &phi, &psi, &boundary, scheme).unwrap();
        let low = upwind_flux(&mesh, &phi, &psi, &boundary).unwrap();
        let mut corr = high.sub(&low);

        let report = MulesCorrector::new(ctx)
            .solve(dt, &mut psi, &phi, &mut corr, &MulesTerms::unit(), &PsiBounds::unit())
            .unwrap();
        (psi, report)
    }

    #[test]
    fn test_correct_updates_by_divergence() {
        let mesh = line_1d(2, 1.0).unwrap();
        let mut corr = FaceField::zeros(&mesh);
        corr.internal[0] = 0.25;
        let mut psi = vec![0.5, 0.5];
        correct(&mesh, 0.5, &mut psi, &corr, &MulesTerms::unit()).unwrap();
        assert!((psi[0] - 0.375).abs() < 1e-14);
        assert!((psi[1] - 0.625).abs() < 1e-14);
    }

    #[test]
    fn test_zero_correction_is_predictor_only() {
        let mesh = line_1d(5, 0.2).unwrap();
        let bcs = BoundaryConditions::zero_gradient(&mesh);
        let controls = MulesControls::default().with_correctors(3);
        let ctx = MulesContext::serial(&mesh, &bcs, &controls).unwrap();
        let phi = line_flux(&mesh, 0.5);
        let mut psi = vec![0.0, 1.0, 0.5, 0.0, 0.0];
        let mut predicted = psi.clone();
        Predictor::ImplicitUpwind
            .predict(&ctx, 0.1, &mut predicted, &phi, &MulesTerms::unit())
            .unwrap();

        let mut corr = FaceField::zeros(&mesh);
        let report = MulesCorrector::new(ctx)
            .solve(0.1, &mut psi, &phi, &mut corr, &MulesTerms::unit(), &PsiBounds::unit())
            .unwrap();
        assert_eq!(psi, predicted);
        assert_eq!(report.passes, 0);
        assert!(report.converged);
        assert!(report.predictor.is_some());
    }

    #[test]
    fn test_downwind_correction_bounded() {
        for predictor in [PredictorKind::ImplicitUpwind, PredictorKind::ExplicitUpwind] {
            let controls = MulesControls::default()
                .with_correctors(3)
                .with_predictor(predictor);
            let (psi, report) = step_case(controls, FluxScheme::Downwind);
            let check = BoundednessReport::check(&psi, &PsiBounds::unit(), 1e-10);
            assert!(check.is_bounded(), "{:?}: {}", predictor, check);
            assert!(report.passes >= 1);
            assert!(report.min_lambda < 1.0);
        }
    }

    #[test]
    fn test_tolerance_skips_passes() {
        let controls = MulesControls::default()
            .with_correctors(5)
            .with_tolerance(1e6);
        let (_, report) = step_case(controls, FluxScheme::Linear);
        assert_eq!(report.passes, 0);
        assert!(report.converged);
    }

    #[test]
    fn test_accepted_correction_returned() {
        let mesh = line_1d(4, 1.0).unwrap();
        let bcs = BoundaryConditions::zero_gradient(&mesh);
        let controls = MulesControls::default().with_correctors(2);
        let ctx = MulesContext::serial(&mesh, &bcs, &controls).unwrap();

        let mut psi = vec![0.5; 4];
        let mut corr = FaceField::zeros(&mesh);
        corr.internal = vec![0.1, -0.05, 0.0];
        let original = corr.clone();
        let report = MulesCorrector::new(ctx)
            .correct_predicted(1.0, &mut psi, &mut corr, &MulesTerms::unit(), &PsiBounds::unit())
            .unwrap();

        // 均匀场的局部包络为零宽度，修正全部被拒绝
        assert_eq!(corr.max_abs(), 0.0);
        assert_eq!(psi, vec![0.5; 4]);
        assert_eq!(report.min_lambda, 0.0);
        assert!(!report.converged);
        assert_ne!(original, corr);
    }
}

// apps/fb_cli/src/commands/run.rs

//! 运行输运算例
//!
//! 每步记录 psi 的全局范围与相对守恒误差，出现越界单元时以非零状态退出。
//! `--ranks R` 大于 1 时按块分区，每个 rank 一个线程，经通道交换光环。

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use fb_config::MulesControls;
use fb_foundation::{FbResult, KahanSum};
use fb_mules::mules::{advance_explicit, boundary_flux_integral, volume_integral, CorrectorReport};
use fb_mules::numerics::{face_flux, upwind_flux, FluxScheme};
use fb_mules::parallel::{decompose_blocks, run_decomposed};
use fb_mules::{
    BoundaryConditions, BoundednessReport, FaceField, FvMesh, HaloExchange, MulesContext,
    MulesCorrector, MulesTerms, Predictor, PsiBounds, SerialHalo,
};
use tracing::{debug, info, warn};

use crate::cases::{Case, CaseKind};

/// 有界性检查容差
const BOUND_TOL: f64 = 1e-10;

/// 高阶通量格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemeArg {
    /// 线性（中心）
    Linear,
    /// 下风
    Downwind,
}

impl From<SchemeArg> for FluxScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Linear => FluxScheme::Linear,
            SchemeArg::Downwind => FluxScheme::Downwind,
        }
    }
}

/// 推进方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// 预测 + 限制修正
    Cmules,
    /// 显式 MULES
    Explicit,
}

/// 运行参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// 算例
    #[arg(long, value_enum, default_value = "step1d")]
    pub case: CaseKind,

    /// 每个方向的单元数
    #[arg(long, default_value = "64")]
    pub cells: usize,

    /// 时间步数
    #[arg(long, default_value = "20")]
    pub steps: usize,

    /// Courant 数
    #[arg(long, default_value = "0.5")]
    pub courant: f64,

    /// 高阶通量格式
    #[arg(long, value_enum, default_value = "linear")]
    pub scheme: SchemeArg,

    /// 推进方式
    #[arg(long, value_enum, default_value = "cmules")]
    pub mode: Mode,

    /// 分区数
    #[arg(long, default_value = "1")]
    pub ranks: usize,

    /// JSON 控制文件
    #[arg(long)]
    pub controls: Option<PathBuf>,
}

/// 单个 rank 的运行设置
struct StepPlan<'a> {
    controls: &'a MulesControls,
    scheme: FluxScheme,
    mode: Mode,
    dt: f64,
    steps: usize,
}

/// 运行汇总（全局归约后）
#[derive(Debug, Clone)]
struct RunSummary {
    min: f64,
    max: f64,
    worst_violations: usize,
    conservation_error: f64,
    corrector_passes: usize,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== Fluxbound 输运算例 ===");

    let controls = super::load_controls(args.controls.as_deref())?;
    let case = Case::build(args.case, args.cells).context("构建算例失败")?;
    let dt = case.time_step(args.courant)?;
    if args.ranks == 0 {
        bail!("分区数必须为正");
    }

    info!(
        "算例 {}: {} 单元, {} 面, Δt = {:.4e}, 格式 {}, 方式 {:?}, 预测步 {}",
        case.kind.name(),
        case.mesh.n_cells(),
        case.mesh.n_faces(),
        dt,
        FluxScheme::from(args.scheme).name(),
        args.mode,
        controls.predictor.name()
    );

    let plan = StepPlan {
        controls: &controls,
        scheme: args.scheme.into(),
        mode: args.mode,
        dt,
        steps: args.steps,
    };

    let start = Instant::now();
    let summary = if args.ranks == 1 {
        simulate(&case.mesh, &case.boundary, &case.phi, case.psi0.clone(), &SerialHalo, &plan)?
    } else {
        let subdomains = decompose_blocks(&case.mesh, args.ranks).context("区域分解失败")?;
        info!("分区: {} 个 rank", subdomains.len());
        let summaries = run_decomposed(&subdomains, |sd, halo| {
            let boundary = sd.scatter_boundary_conditions(&case.boundary)?;
            let phi = sd.scatter_faces(&case.phi);
            let psi = sd.scatter_cells(&case.psi0);
            simulate(sd.mesh(), &boundary, &phi, psi, &halo, &plan)
        })?;
        summaries
            .into_iter()
            .next()
            .context("分解后没有子域")?
    };

    info!("=== 运行完成 ===");
    info!("耗时: {:.3} s", start.elapsed().as_secs_f64());
    info!("最终范围: [{:.6e}, {:.6e}]", summary.min, summary.max);
    info!("最大相对守恒误差: {:.3e}", summary.conservation_error);
    if args.mode == Mode::Cmules {
        info!("修正次数: {}", summary.corrector_passes);
    }

    if summary.worst_violations > 0 {
        bail!("有界性被破坏: 最多 {} 个单元越界", summary.worst_violations);
    }
    Ok(())
}

/// 在单个 rank 上推进全部时间步
///
/// 所有归约都在各 rank 上以相同顺序执行，只有 rank 0 输出日志。
fn simulate<H: HaloExchange + ?Sized>(
    mesh: &FvMesh,
    boundary: &BoundaryConditions,
    phi: &FaceField,
    mut psi: Vec<f64>,
    halo: &H,
    plan: &StepPlan<'_>,
) -> FbResult<RunSummary> {
    let ctx = MulesContext::new(mesh, boundary, plan.controls, halo)?;
    let terms = MulesTerms::unit();
    let bounds = PsiBounds::unit();
    let root = halo.rank() == 0;

    let initial = volume_integral(mesh, &psi, &1.0, halo)?;
    let scale = initial.abs().max(f64::MIN_POSITIVE);
    let mut outflow = KahanSum::new();
    let mut summary = RunSummary {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        worst_violations: 0,
        conservation_error: 0.0,
        corrector_passes: 0,
    };

    for step in 1..=plan.steps {
        let step_outflow = match plan.mode {
            Mode::Explicit => {
                let report = advance_explicit(&ctx, plan.dt, &mut psi, phi, plan.scheme, &terms, &bounds)?;
                if root {
                    debug!(
                        "步 {}: min λ = {:.4}, 受限面 {}",
                        step, report.min_lambda, report.limited_faces
                    );
                }
                boundary_flux_integral(mesh, &report.flux, halo)?
            }
            Mode::Cmules => {
                let (out, report) = cmules_step(&ctx, plan.dt, &mut psi, phi, plan.scheme)?;
                if root {
                    debug!(
                        "步 {}: 修正 {} 次, 收敛 {}, 松弛 {}, min λ = {:.4}",
                        step, report.passes, report.converged, report.relaxed_passes, report.min_lambda
                    );
                }
                summary.corrector_passes += report.passes;
                out
            }
        };
        outflow.add(plan.dt * step_outflow);

        let mass = volume_integral(mesh, &psi, &1.0, halo)?;
        let error = (mass - (initial - outflow.value())).abs() / scale;
        let check = BoundednessReport::check(&psi, &bounds, BOUND_TOL).reduce(halo)?;

        if root {
            info!(
                "步 {}/{}: psi ∈ [{:.6}, {:.6}], 相对守恒误差 {:.3e}",
                step, plan.steps, check.min, check.max, error
            );
            if !check.is_bounded() {
                warn!("步 {}: {}", step, check);
            }
        }

        summary.min = check.min;
        summary.max = check.max;
        summary.worst_violations = summary.worst_violations.max(check.n_violations);
        summary.conservation_error = summary.conservation_error.max(error);
    }

    Ok(summary)
}

/// 一步 CMULES，返回本步经边界流出的总量与修正结果
///
/// 预测步与修正分开执行，以便取得预测步的边界通量：
/// 显式预测步取旧值迎风，隐式预测步取新值迎风。
fn cmules_step<H: HaloExchange + ?Sized>(
    ctx: &MulesContext<'_, H>,
    dt: f64,
    psi: &mut [f64],
    phi: &FaceField,
    scheme: FluxScheme,
) -> FbResult<(f64, CorrectorReport)> {
    let terms = MulesTerms::unit();
    let boundary = ctx.boundary_values(psi)?;
    let high = face_flux(ctx.mesh, phi, psi, &boundary, scheme)?;
    let low = upwind_flux(ctx.mesh, phi, psi, &boundary)?;
    let mut phi_corr = high.sub(&low);

    let predictor = Predictor::from(ctx.controls.predictor);
    let predicted = predictor.predict(ctx, dt, psi, phi, &terms)?;
    let predictor_flux = match predictor {
        Predictor::ExplicitUpwind => low,
        Predictor::ImplicitUpwind => {
            let boundary = ctx.boundary_values(psi)?;
            upwind_flux(ctx.mesh, phi, psi, &boundary)?
        }
    };

    let mut report = MulesCorrector::new(*ctx).correct_predicted(
        dt,
        psi,
        &mut phi_corr,
        &terms,
        &PsiBounds::unit(),
    )?;
    report.predictor = Some(predicted);

    let out = boundary_flux_integral(ctx.mesh, &predictor_flux, ctx.halo)?
        + boundary_flux_integral(ctx.mesh, &phi_corr, ctx.halo)?;
    Ok((out, report))
}

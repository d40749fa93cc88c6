// crates/fb_mules/tests/parallel_consistency.rs

//! 单进程与分区并行的一致性
//!
//! 同一网格按 1 个和多个 rank 运行相同的步骤，汇总后的结果应在舍入误差内一致。

use fb_config::PredictorKind;
use fb_mules::prelude::*;

// ============================================================================
// 算例
// ============================================================================

struct Case {
    grid: StructuredGrid,
    phi: FaceField,
    bcs: BoundaryConditions,
    psi0: Vec<f64>,
    dt: f64,
}

/// 8×6 网格上的旋转流，左侧定值入流
fn rotation_case() -> Case {
    let grid = StructuredGrid::new(8, 6, 0.125, 1.0 / 6.0).unwrap();
    let phi = grid.stream_function_flux(|x, y| 0.5 * ((x - 0.5).powi(2) + (y - 0.5).powi(2)));
    let mut bcs = BoundaryConditions::zero_gradient(grid.mesh());
    bcs.set_by_name(grid.mesh(), "left", BoundaryCondition::Uniform(1.0)).unwrap();
    let psi0 = (0..grid.mesh().n_cells())
        .map(|c| {
            let (x, y) = grid.cell_centre(c);
            if (x - 0.35).powi(2) + (y - 0.5).powi(2) < 0.06 {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    Case {
        grid,
        phi,
        bcs,
        psi0,
        dt: 0.05,
    }
}

/// 以 CMULES 推进若干步
#[allow(clippy::too_many_arguments)]
fn run_cmules<H: HaloExchange + ?Sized>(
    mesh: &FvMesh,
    bcs: &BoundaryConditions,
    controls: &MulesControls,
    halo: &H,
    phi: &FaceField,
    psi: &mut [f64],
    dt: f64,
    steps: usize,
) -> FbResult<()> {
    for _ in 0..steps {
        let ctx = MulesContext::new(mesh, bcs, controls, halo)?;
        let boundary = ctx.boundary_values(psi)?;
        let high = face_flux(mesh, phi, psi, &boundary, FluxScheme::Linear)?;
        let low = upwind_flux(mesh, phi, psi, &boundary)?;
        let mut phi_corr = high.sub(&low);
        MulesCorrector::new(ctx).solve(
            dt,
            psi,
            phi,
            &mut phi_corr,
            &MulesTerms::unit(),
            &PsiBounds::unit(),
        )?;
    }
    Ok(())
}

fn serial(case: &Case, controls: &MulesControls, steps: usize) -> Vec<f64> {
    let mut psi = case.psi0.clone();
    run_cmules(
        case.grid.mesh(),
        &case.bcs,
        controls,
        &SerialHalo,
        &case.phi,
        &mut psi,
        case.dt,
        steps,
    )
    .unwrap();
    psi
}

fn decomposed(case: &Case, controls: &MulesControls, subs: &[SubDomain], steps: usize) -> Vec<f64> {
    let parts = run_decomposed(subs, |sd, halo| {
        let bcs = sd.scatter_boundary_conditions(&case.bcs)?;
        let phi = sd.scatter_faces(&case.phi);
        let mut psi = sd.scatter_cells(&case.psi0);
        run_cmules(sd.mesh(), &bcs, controls, &halo, &phi, &mut psi, case.dt, steps)?;
        Ok(psi)
    })
    .unwrap();
    gather_cells(subs, &parts, case.grid.mesh().n_cells()).unwrap()
}

fn max_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).fold(0.0, |m, (x, y)| m.max((x - y).abs()))
}

// ============================================================================
// 测试
// ============================================================================

#[test]
fn test_two_ranks_match_serial_explicit_predictor() {
    let case = rotation_case();
    let controls = MulesControls::default()
        .with_predictor(PredictorKind::ExplicitUpwind)
        .with_correctors(2);
    let reference = serial(&case, &controls, 3);
    let subs = decompose_blocks(case.grid.mesh(), 2).unwrap();
    let parallel = decomposed(&case, &controls, &subs, 3);

    assert!(max_diff(&reference, &parallel) < 1e-12, "差异 {:e}", max_diff(&reference, &parallel));
    assert!(BoundednessReport::check(&parallel, &PsiBounds::unit(), 1e-12).is_bounded());
}

#[test]
fn test_two_ranks_match_serial_implicit_predictor() {
    let case = rotation_case();
    let controls = MulesControls::default().with_correctors(2);
    let reference = serial(&case, &controls, 3);
    let subs = decompose_blocks(case.grid.mesh(), 2).unwrap();
    let parallel = decomposed(&case, &controls, &subs, 3);

    // 块 Jacobi 外迭代收敛到 outer_tol，线性求解到 rtol
    assert!(max_diff(&reference, &parallel) < 1e-9, "差异 {:e}", max_diff(&reference, &parallel));
}

#[test]
fn test_irregular_partition_matches_serial() {
    let case = rotation_case();
    let controls = MulesControls::default()
        .with_predictor(PredictorKind::ExplicitUpwind)
        .with_limiter_iter(2);
    let n = case.grid.mesh().n_cells();
    // 棋盘式三分区，每个单元的大部分面都是进程边界
    let cell_rank: Vec<usize> = (0..n).map(|c| (c % 8 + c / 8) % 3).collect();
    let subs = decompose(case.grid.mesh(), &cell_rank).unwrap();
    let reference = serial(&case, &controls, 2);
    let parallel = decomposed(&case, &controls, &subs, 2);

    assert!(max_diff(&reference, &parallel) < 1e-12, "差异 {:e}", max_diff(&reference, &parallel));
}

#[test]
fn test_explicit_mules_matches_serial() {
    let case = rotation_case();
    let controls = MulesControls {
        n_sub_cycles: 2,
        ..MulesControls::default()
    };

    let mut reference = case.psi0.clone();
    let ctx = MulesContext::serial(case.grid.mesh(), &case.bcs, &controls).unwrap();
    advance_explicit(
        &ctx,
        case.dt,
        &mut reference,
        &case.phi,
        FluxScheme::Downwind,
        &MulesTerms::unit(),
        &PsiBounds::unit(),
    )
    .unwrap();

    let subs = decompose_blocks(case.grid.mesh(), 3).unwrap();
    let parts = run_decomposed(&subs, |sd, halo| {
        let bcs = sd.scatter_boundary_conditions(&case.bcs)?;
        let phi = sd.scatter_faces(&case.phi);
        let mut psi = sd.scatter_cells(&case.psi0);
        let ctx = MulesContext::new(sd.mesh(), &bcs, &controls, &halo)?;
        advance_explicit(
            &ctx,
            case.dt,
            &mut psi,
            &phi,
            FluxScheme::Downwind,
            &MulesTerms::unit(),
            &PsiBounds::unit(),
        )?;
        Ok(psi)
    })
    .unwrap();
    let parallel = gather_cells(&subs, &parts, case.grid.mesh().n_cells()).unwrap();

    assert!(max_diff(&reference, &parallel) < 1e-12);
}

#[test]
fn test_global_diagnostics_agree() {
    let case = rotation_case();
    let mesh = case.grid.mesh();
    let serial_total = volume_integral(mesh, &case.psi0, &1.0, &SerialHalo).unwrap();
    let serial_out = boundary_flux_integral(mesh, &case.phi, &SerialHalo).unwrap();

    let subs = decompose_blocks(mesh, 2).unwrap();
    let totals = run_decomposed(&subs, |sd, halo| {
        let psi = sd.scatter_cells(&case.psi0);
        let phi = sd.scatter_faces(&case.phi);
        Ok((
            volume_integral(sd.mesh(), &psi, &1.0, &halo)?,
            boundary_flux_integral(sd.mesh(), &phi, &halo)?,
        ))
    })
    .unwrap();

    for (total, out) in totals {
        assert!((total - serial_total).abs() < 1e-14);
        assert!((out - serial_out).abs() < 1e-14);
    }
}

#[test]
fn test_failing_rank_reported_before_communication_errors() {
    let case = rotation_case();
    let controls = MulesControls::default();
    let subs = decompose_blocks(case.grid.mesh(), 2).unwrap();

    let result = run_decomposed(&subs, |sd, halo| {
        if sd.rank() == 1 {
            return Err(FbError::invalid_input("rank 1 拒绝输入"));
        }
        let bcs = sd.scatter_boundary_conditions(&case.bcs)?;
        let phi = sd.scatter_faces(&case.phi);
        let mut psi = sd.scatter_cells(&case.psi0);
        run_cmules(sd.mesh(), &bcs, &controls, &halo, &phi, &mut psi, case.dt, 1)?;
        Ok(psi)
    });

    assert!(matches!(result, Err(FbError::InvalidInput { .. })));
}

// crates/fb_mules/src/mules/extrema.rs

//! 局部极值包络与反扩散容量
//!
//! 包络 `[psiMinn, psiMaxn]` 取单元自身、面相邻单元、进程边界对端单元
//! 以及定值边界面值的极值，再按控制参数放宽或收缩，最后夹紧到物理边界。
//!
//! 容量 `Q±` 是单元在不越出包络的前提下可净吸收/净释放的修正通量：
//!
//! ```text
//! Q+ = V·(rho/Δt + Sp)·(psiMaxn - psi_ref)
//! Q- = V·(rho/Δt + Sp)·(psi_ref - psiMinn)
//! ```

use fb_foundation::{FbError, FbResult, SMALL};

use super::explicit::surface_integrate;
use super::{cell_kernel, MulesContext};
use crate::field::{CellScalar, FaceField, MulesTerms, PatchValues, PsiBounds};
use crate::mesh::FvMesh;
use crate::numerics::interpolation::check_boundary_values;
use crate::parallel::HaloExchange;

/// 局部极值包络
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// 单元下界 psiMinn
    pub min: Vec<f64>,
    /// 单元上界 psiMaxn
    pub max: Vec<f64>,
}

/// 计算局部极值包络
///
/// `boundary` 为当前 `psi` 的边界面值（进程边界 patch 为对端单元值）。
pub fn local_extrema<H, Max, Min>(
    ctx: &MulesContext<'_, H>,
    psi: &[f64],
    boundary: &PatchValues,
    bounds: &PsiBounds<Max, Min>,
) -> FbResult<Envelope>
where
    H: HaloExchange + ?Sized,
    Max: CellScalar,
    Min: CellScalar,
{
    let mesh = ctx.mesh;
    let controls = ctx.controls;
    FbError::check_size("psi", mesh.n_cells(), psi.len())?;
    check_boundary_values(mesh, boundary)?;

    let mut max = psi.to_vec();
    let mut min = psi.to_vec();

    for (&o, &n) in mesh.owner().iter().zip(mesh.neighbour()) {
        max[o] = max[o].max(psi[n]);
        min[o] = min[o].min(psi[n]);
        max[n] = max[n].max(psi[o]);
        min[n] = min[n].min(psi[o]);
    }

    for (p, (patch, bv)) in mesh.patches().iter().zip(boundary).enumerate() {
        if patch.is_coupled() || ctx.boundary.fixes_value(p) {
            for (&c, &b) in patch.face_cells().iter().zip(bv) {
                max[c] = max[c].max(b);
                min[c] = min[c].min(b);
            }
        }
    }

    // 非定值物理边界按局部幅度放宽
    let boundary_coeff = controls.effective_boundary_extrema_coeff();
    if boundary_coeff > 0.0 {
        let mut widen = vec![0.0; mesh.n_cells()];
        for (p, patch) in mesh.patches().iter().enumerate() {
            if patch.is_coupled() || ctx.boundary.fixes_value(p) {
                continue;
            }
            for &c in patch.face_cells() {
                widen[c] += boundary_coeff * (max[c] - min[c]);
            }
        }
        for c in 0..mesh.n_cells() {
            max[c] += widen[c];
            min[c] -= widen[c];
        }
    }

    if controls.extrema_coeff > 0.0 {
        for c in 0..mesh.n_cells() {
            let widen = controls.extrema_coeff * bounds.range(c);
            max[c] += widen;
            min[c] -= widen;
        }
    }

    let smooth = controls.smooth_limiter;
    for c in 0..mesh.n_cells() {
        let (lo, hi) = (bounds.min(c), bounds.max(c));
        if smooth > SMALL {
            max[c] = smooth * psi[c] + (1.0 - smooth) * max[c];
            min[c] = smooth * psi[c] + (1.0 - smooth) * min[c];
        }
        max[c] = max[c].min(hi);
        min[c] = min[c].max(lo);
    }

    Ok(Envelope { min, max })
}

/// 低阶（迎风）显式解
///
/// `psi_low = (rho·psi0/Δt + Su - div(phiBD)) / (rho/Δt + Sp)`
pub fn psi_low<R, Sp, Su>(
    mesh: &FvMesh,
    dt: f64,
    psi0: &[f64],
    phi_bd: &FaceField,
    terms: &MulesTerms<R, Sp, Su>,
) -> FbResult<Vec<f64>>
where
    R: CellScalar,
    Sp: CellScalar,
    Su: CellScalar,
{
    FbError::check_time_step(dt)?;
    FbError::check_size("psi0", mesh.n_cells(), psi0.len())?;
    phi_bd.check_layout(mesh, "phi_bd")?;

    let r_dt = 1.0 / dt;
    let div = surface_integrate(mesh, phi_bd);
    let mut low = vec![0.0; mesh.n_cells()];
    cell_kernel(&mut low, |c| {
        (terms.rho.value(c) * psi0[c] * r_dt + terms.su.value(c) - div[c]) / terms.diag(c, r_dt)
    });
    Ok(low)
}

/// 单元反扩散容量 `Q+`、`Q-`
#[derive(Debug, Clone, PartialEq)]
pub struct AntidiffusiveCapacity {
    /// 可净流入量
    pub q_plus: Vec<f64>,
    /// 可净流出量
    pub q_minus: Vec<f64>,
}

impl AntidiffusiveCapacity {
    /// 由参考值与包络计算，结果非负
    pub fn new<R, Sp, Su>(
        mesh: &FvMesh,
        dt: f64,
        psi_ref: &[f64],
        envelope: &Envelope,
        terms: &MulesTerms<R, Sp, Su>,
    ) -> FbResult<Self>
    where
        R: CellScalar,
        Sp: CellScalar,
        Su: CellScalar,
    {
        FbError::check_time_step(dt)?;
        let n = mesh.n_cells();
        FbError::check_size("psi_ref", n, psi_ref.len())?;
        FbError::check_size("envelope", n, envelope.max.len())?;
        FbError::check_size("envelope", n, envelope.min.len())?;

        let r_dt = 1.0 / dt;
        let volumes = mesh.volumes();
        let mut q_plus = vec![0.0; n];
        let mut q_minus = vec![0.0; n];
        cell_kernel(&mut q_plus, |c| {
            (volumes[c] * terms.diag(c, r_dt) * (envelope.max[c] - psi_ref[c])).max(0.0)
        });
        cell_kernel(&mut q_minus, |c| {
            (volumes[c] * terms.diag(c, r_dt) * (psi_ref[c] - envelope.min[c])).max(0.0)
        });
        Ok(Self { q_plus, q_minus })
    }

    /// 直接给定容量（测试与外部限制器使用）
    pub fn from_parts(q_plus: Vec<f64>, q_minus: Vec<f64>) -> Self {
        Self { q_plus, q_minus }
    }
}

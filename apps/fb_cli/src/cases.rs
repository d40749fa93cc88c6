// apps/fb_cli/src/cases.rs

//! 内置输运算例
//!
//! - `step1d`: 一维均匀流中的台阶，左侧定值入流
//! - `rotation2d`: 单位方形封闭区域内的涡旋输运圆盘

use std::f64::consts::PI;

use anyhow::{bail, Result};
use clap::ValueEnum;
use fb_mules::mesh::{line_1d, line_flux, StructuredGrid};
use fb_mules::{BoundaryCondition, BoundaryConditions, FaceField, FvMesh};

/// 算例类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaseKind {
    /// 一维台阶
    Step1d,
    /// 二维涡旋
    Rotation2d,
}

impl CaseKind {
    /// 名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Step1d => "step1d",
            Self::Rotation2d => "rotation2d",
        }
    }
}

/// 输运算例：网格、体积通量、边界条件与初值
pub struct Case {
    pub kind: CaseKind,
    pub mesh: FvMesh,
    pub phi: FaceField,
    pub boundary: BoundaryConditions,
    pub psi0: Vec<f64>,
}

impl Case {
    /// 构造 `kind` 算例，`cells` 为每个方向的单元数
    pub fn build(kind: CaseKind, cells: usize) -> Result<Self> {
        if cells < 2 {
            bail!("单元数至少为 2: {}", cells);
        }
        match kind {
            CaseKind::Step1d => Self::step1d(cells),
            CaseKind::Rotation2d => Self::rotation2d(cells),
        }
    }

    fn step1d(cells: usize) -> Result<Self> {
        let dx = 1.0 / cells as f64;
        let mesh = line_1d(cells, dx)?;
        let phi = line_flux(&mesh, 1.0);
        let mut boundary = BoundaryConditions::zero_gradient(&mesh);
        boundary.set_by_name(&mesh, "left", BoundaryCondition::Uniform(1.0))?;

        let psi0 = (0..cells)
            .map(|c| if (c as f64 + 0.5) * dx < 0.25 { 1.0 } else { 0.0 })
            .collect();

        Ok(Self {
            kind: CaseKind::Step1d,
            mesh,
            phi,
            boundary,
            psi0,
        })
    }

    fn rotation2d(cells: usize) -> Result<Self> {
        let h = 1.0 / cells as f64;
        let grid = StructuredGrid::new(cells, cells, h, h)?;
        // 流函数在边界上为零，通过外边界的通量为零
        let phi = grid.stream_function_flux(|x, y| (PI * x).sin() * (PI * y).sin() / PI);
        let boundary = BoundaryConditions::zero_gradient(grid.mesh());

        let psi0 = (0..grid.mesh().n_cells())
            .map(|c| {
                let (x, y) = grid.cell_centre(c);
                if (x - 0.5).powi(2) + (y - 0.75).powi(2) < 0.15 * 0.15 {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();

        Ok(Self {
            kind: CaseKind::Rotation2d,
            mesh: grid.into_mesh(),
            phi,
            boundary,
            psi0,
        })
    }

    /// Courant 数为 `courant` 的时间步
    ///
    /// 单元 Courant 数取 `Δt·Σ流出通量 / V`。
    pub fn time_step(&self, courant: f64) -> Result<f64> {
        if !(courant > 0.0 && courant.is_finite()) {
            bail!("Courant 数必须为正: {}", courant);
        }

        let mut outflow = vec![0.0; self.mesh.n_cells()];
        for ((&o, &n), &f) in self
            .mesh
            .owner()
            .iter()
            .zip(self.mesh.neighbour())
            .zip(&self.phi.internal)
        {
            if f > 0.0 {
                outflow[o] += f;
            } else {
                outflow[n] -= f;
            }
        }
        for (patch, values) in self.mesh.patches().iter().zip(&self.phi.patches) {
            for (&c, &f) in patch.face_cells().iter().zip(values) {
                outflow[c] += f.max(0.0);
            }
        }

        let dt = self
            .mesh
            .volumes()
            .iter()
            .zip(&outflow)
            .filter(|(_, &o)| o > 0.0)
            .map(|(&v, &o)| courant * v / o)
            .fold(f64::INFINITY, f64::min);
        if !dt.is_finite() {
            bail!("算例 {} 无流动", self.kind.name());
        }
        Ok(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step1d_layout() {
        let case = Case::build(CaseKind::Step1d, 8).unwrap();
        assert_eq!(case.mesh.n_cells(), 8);
        assert_eq!(case.psi0[..2], [1.0, 1.0]);
        assert!(case.psi0[2..].iter().all(|&v| v == 0.0));
        assert!(case.boundary.fixes_value(0));
        assert!(!case.boundary.fixes_value(1));
    }

    #[test]
    fn test_step1d_time_step() {
        let case = Case::build(CaseKind::Step1d, 10).unwrap();
        let dt = case.time_step(0.5).unwrap();
        assert!((dt - 0.05).abs() < 1e-14);
    }

    #[test]
    fn test_rotation2d_closed_boundary() {
        let case = Case::build(CaseKind::Rotation2d, 16).unwrap();
        for values in &case.phi.patches {
            assert!(values.iter().all(|f| f.abs() < 1e-15));
        }
        assert!(case.psi0.iter().any(|&v| v == 1.0));
        assert!(case.time_step(0.4).unwrap() > 0.0);
    }

    #[test]
    fn test_too_few_cells_rejected() {
        assert!(Case::build(CaseKind::Rotation2d, 1).is_err());
        let case = Case::build(CaseKind::Step1d, 4).unwrap();
        assert!(case.time_step(-1.0).is_err());
    }
}

// crates/fb_mules/src/numerics/interpolation.rs

//! 对流通量插值格式
//!
//! 计算输运量的面通量 `phi·psi_f`，`psi_f` 为面值：
//!
//! | 格式 | 内部面 | 说明 |
//! |------|--------|------|
//! | Upwind | 上游单元值 | 一阶、有界，作为低阶通量 `phiBD` |
//! | Linear | 两侧平均 | 二阶中心格式，越界振荡 |
//! | Downwind | 下游单元值 | 反扩散，用于检验限制器 |
//!
//! 边界面的"对侧值"取边界值：物理 patch 由边界条件给出，
//! 进程边界 patch 为相邻进程的单元值。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use fb_foundation::{FbError, FbResult};

use crate::field::{FaceField, PatchValues};
use crate::mesh::FvMesh;

/// 插值格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxScheme {
    /// 一阶迎风
    #[default]
    Upwind,
    /// 线性（等权中心）
    Linear,
    /// 下风
    Downwind,
}

impl FluxScheme {
    /// 名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upwind => "upwind",
            Self::Linear => "linear",
            Self::Downwind => "downwind",
        }
    }

    /// 是否有界
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Upwind)
    }

    #[inline]
    fn internal_value(&self, phi: f64, own: f64, nei: f64) -> f64 {
        match self {
            Self::Upwind => {
                if phi >= 0.0 {
                    own
                } else {
                    nei
                }
            }
            Self::Linear => 0.5 * (own + nei),
            Self::Downwind => {
                if phi >= 0.0 {
                    nei
                } else {
                    own
                }
            }
        }
    }
}

impl fmt::Display for FluxScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FluxScheme {
    type Err = FbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upwind" => Ok(Self::Upwind),
            "linear" => Ok(Self::Linear),
            "downwind" => Ok(Self::Downwind),
            other => Err(FbError::invalid_input(format!("未知插值格式: {}", other))),
        }
    }
}

/// 检查边界值布局
pub fn check_boundary_values(mesh: &FvMesh, boundary: &PatchValues) -> FbResult<()> {
    FbError::check_size("boundary_values", mesh.patches().len(), boundary.len())?;
    for (patch, values) in mesh.patches().iter().zip(boundary) {
        FbError::check_size("boundary_values", patch.size(), values.len())?;
    }
    Ok(())
}

/// 计算面通量 `phi·psi_f`
pub fn face_flux(
    mesh: &FvMesh,
    phi: &FaceField,
    psi: &[f64],
    boundary: &PatchValues,
    scheme: FluxScheme,
) -> FbResult<FaceField> {
    phi.check_layout(mesh, "phi")?;
    FbError::check_size("psi", mesh.n_cells(), psi.len())?;
    check_boundary_values(mesh, boundary)?;

    let internal = mesh
        .owner()
        .iter()
        .zip(mesh.neighbour())
        .zip(&phi.internal)
        .map(|((&o, &n), &f)| f * scheme.internal_value(f, psi[o], psi[n]))
        .collect();

    let patches = mesh
        .patches()
        .iter()
        .zip(&phi.patches)
        .zip(boundary)
        .map(|((patch, phi_p), bv)| {
            patch
                .face_cells()
                .iter()
                .zip(phi_p)
                .zip(bv)
                .map(|((&c, &f), &b)| {
                    let value = match scheme {
                        FluxScheme::Linear if !patch.is_coupled() => b,
                        _ => scheme.internal_value(f, psi[c], b),
                    };
                    f * value
                })
                .collect()
        })
        .collect();

    Ok(FaceField::new(internal, patches))
}

/// 一阶迎风通量
pub fn upwind_flux(
    mesh: &FvMesh,
    phi: &FaceField,
    psi: &[f64],
    boundary: &PatchValues,
) -> FbResult<FaceField> {
    face_flux(mesh, phi, psi, boundary, FluxScheme::Upwind)
}

// crates/fb_mules/src/field/face_field.rs

//! 面场
//!
//! 每个面一个标量，布局与 [`FvMesh`] 相同：内部面在前，
//! 其后按 patch 顺序存放边界面。用于面通量 `phi`、
//! 修正通量 `phiCorr` 以及限制系数 `λ`。

use fb_foundation::{FbError, FbResult};

use crate::mesh::FvMesh;

/// 面标量场
#[derive(Debug, Clone, PartialEq)]
pub struct FaceField {
    /// 内部面值
    pub internal: Vec<f64>,
    /// 每个 patch 的边界面值
    pub patches: Vec<Vec<f64>>,
}

impl FaceField {
    /// 从各部分直接构造
    pub fn new(internal: Vec<f64>, patches: Vec<Vec<f64>>) -> Self {
        Self { internal, patches }
    }

    /// 全零面场
    pub fn zeros(mesh: &FvMesh) -> Self {
        Self::uniform(mesh, 0.0)
    }

    /// 常值面场
    pub fn uniform(mesh: &FvMesh, value: f64) -> Self {
        Self {
            internal: vec![value; mesh.n_internal_faces()],
            patches: mesh
                .patches()
                .iter()
                .map(|p| vec![value; p.size()])
                .collect(),
        }
    }

    /// 按全局面索引逐面构造
    pub fn from_fn(mesh: &FvMesh, mut f: impl FnMut(usize) -> f64) -> Self {
        let internal = (0..mesh.n_internal_faces()).map(&mut f).collect();
        let patches = mesh
            .patches()
            .iter()
            .map(|p| (p.start()..p.start() + p.size()).map(&mut f).collect())
            .collect();
        Self { internal, patches }
    }

    /// 检查布局与网格一致
    pub fn check_layout(&self, mesh: &FvMesh, name: &'static str) -> FbResult<()> {
        FbError::check_size(name, mesh.n_internal_faces(), self.internal.len())?;
        FbError::check_size(name, mesh.patches().len(), self.patches.len())?;
        for (values, patch) in self.patches.iter().zip(mesh.patches()) {
            FbError::check_size(name, patch.size(), values.len())?;
        }
        Ok(())
    }

    /// 总面数
    pub fn len(&self) -> usize {
        self.internal.len() + self.patches.iter().map(Vec::len).sum::<usize>()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 遍历全部面值
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.internal
            .iter()
            .chain(self.patches.iter().flatten())
            .copied()
    }

    /// 可变遍历全部面值
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f64> + '_ {
        self.internal
            .iter_mut()
            .chain(self.patches.iter_mut().flatten())
    }

    /// 逐面变换
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            internal: self.internal.iter().map(|&v| f(v)).collect(),
            patches: self
                .patches
                .iter()
                .map(|p| p.iter().map(|&v| f(v)).collect())
                .collect(),
        }
    }

    /// 两个面场逐面组合
    pub fn zip_map(&self, other: &FaceField, f: impl Fn(f64, f64) -> f64) -> Self {
        debug_assert_eq!(self.internal.len(), other.internal.len());
        debug_assert_eq!(self.patches.len(), other.patches.len());
        Self {
            internal: self
                .internal
                .iter()
                .zip(&other.internal)
                .map(|(&a, &b)| f(a, b))
                .collect(),
            patches: self
                .patches
                .iter()
                .zip(&other.patches)
                .map(|(pa, pb)| pa.iter().zip(pb).map(|(&a, &b)| f(a, b)).collect())
                .collect(),
        }
    }

    /// self *= alpha
    pub fn scale(&mut self, alpha: f64) {
        self.iter_mut().for_each(|v| *v *= alpha);
    }

    /// self += alpha * x
    pub fn axpy(&mut self, alpha: f64, x: &FaceField) {
        debug_assert_eq!(self.len(), x.len());
        for (y, xv) in self.iter_mut().zip(x.iter()) {
            *y += alpha * xv;
        }
    }

    /// 逐面乘积
    pub fn mul(&self, other: &FaceField) -> Self {
        self.zip_map(other, |a, b| a * b)
    }

    /// 逐面差
    pub fn sub(&self, other: &FaceField) -> Self {
        self.zip_map(other, |a, b| a - b)
    }

    /// 最大绝对值
    pub fn max_abs(&self) -> f64 {
        self.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    /// 将物理边界面置零，保留进程边界面
    pub fn zero_physical_boundaries(&mut self, mesh: &FvMesh) {
        for (values, patch) in self.patches.iter_mut().zip(mesh.patches()) {
            if !patch.is_coupled() {
                values.iter_mut().for_each(|v| *v = 0.0);
            }
        }
    }
}

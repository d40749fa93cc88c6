// crates/fb_mules/src/numerics/linear_algebra/preconditioner.rs

//! 预条件器
//!
//! 核心操作 `apply`: z = M⁻¹ r。

use super::csr::CsrMatrix;

/// 预条件器接口
pub trait Preconditioner: Send + Sync {
    /// z = M⁻¹ r
    fn apply(&self, r: &[f64], z: &mut [f64]);

    /// 名称
    fn name(&self) -> &'static str;
}

/// 恒等预条件（无预条件）
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }

    fn name(&self) -> &'static str {
        "Identity"
    }
}

/// Jacobi（对角）预条件
///
/// 迎风隐式矩阵严格对角占优，对角预条件已足够。
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    /// 从矩阵对角线构造，零对角行退化为恒等
    pub fn from_matrix(matrix: &CsrMatrix) -> Self {
        Self::from_diagonal(&matrix.extract_diagonal())
    }

    /// 从对角向量构造
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let inv_diag = diag
            .iter()
            .map(|&d| if d.abs() > 1e-300 { 1.0 / d } else { 1.0 })
            .collect();
        Self { inv_diag }
    }

    /// 对角元倒数
    pub fn inv_diagonal(&self) -> &[f64] {
        &self.inv_diag
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        debug_assert_eq!(r.len(), self.inv_diag.len());
        for ((zi, &ri), &inv) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * inv;
        }
    }

    fn name(&self) -> &'static str {
        "Jacobi"
    }
}

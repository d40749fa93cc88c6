// crates/fb_mules/src/field/cell_scalar.rs

//! 单元标量抽象（场或常量）
//!
//! 密度 `rho`、源项 `Sp`/`Su` 以及物理边界 `psi_max`/`psi_min`
//! 既可以是常量也可以是逐单元场。这里用泛型 trait 统一访问方式，
//! 调用时单态化，热循环中不存在运行时分派。
//!
//! | 实现者 | 含义 |
//! |--------|------|
//! | [`Zero`] | 恒为 0 的项（缺省源项） |
//! | `f64` | 全场常量 |
//! | `[f64]` / `Vec<f64>` | 逐单元场 |
//! | `&T` | 借用 |

use fb_foundation::{FbError, FbResult};

/// 场或常量
pub trait CellScalar: Sync {
    /// 第 `cell` 个单元的值
    fn value(&self, cell: usize) -> f64;

    /// 检查长度，常量恒通过
    fn check_len(&self, _name: &'static str, _n_cells: usize) -> FbResult<()> {
        Ok(())
    }

    /// 是否恒为零
    fn is_zero(&self) -> bool {
        false
    }
}

/// 恒为零的项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zero;

impl CellScalar for Zero {
    #[inline(always)]
    fn value(&self, _cell: usize) -> f64 {
        0.0
    }

    fn is_zero(&self) -> bool {
        true
    }
}

impl CellScalar for f64 {
    #[inline(always)]
    fn value(&self, _cell: usize) -> f64 {
        *self
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }
}

impl CellScalar for [f64] {
    #[inline(always)]
    fn value(&self, cell: usize) -> f64 {
        self[cell]
    }

    fn check_len(&self, name: &'static str, n_cells: usize) -> FbResult<()> {
        FbError::check_size(name, n_cells, self.len())
    }
}

impl CellScalar for Vec<f64> {
    #[inline(always)]
    fn value(&self, cell: usize) -> f64 {
        self[cell]
    }

    fn check_len(&self, name: &'static str, n_cells: usize) -> FbResult<()> {
        self.as_slice().check_len(name, n_cells)
    }
}

impl<T: CellScalar + ?Sized> CellScalar for &T {
    #[inline(always)]
    fn value(&self, cell: usize) -> f64 {
        (**self).value(cell)
    }

    fn check_len(&self, name: &'static str, n_cells: usize) -> FbResult<()> {
        (**self).check_len(name, n_cells)
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

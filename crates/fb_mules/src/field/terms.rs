// crates/fb_mules/src/field/terms.rs

//! 输运方程系数与物理边界
//!
//! 半离散方程（单元 c）：
//!
//! ```text
//! rho (psi - psi0)/Δt + div(phi psi) = Su - Sp psi
//! ```
//!
//! `Sp` 为非负的隐式汇项系数，因此对角系数为 `rho/Δt + Sp`。

use fb_foundation::{FbError, FbResult};

use super::cell_scalar::{CellScalar, Zero};

/// 方程系数 `rho`、`Sp`、`Su`
#[derive(Debug, Clone, Copy)]
pub struct MulesTerms<R = f64, Sp = Zero, Su = Zero> {
    /// 时间导数项系数（密度类）
    pub rho: R,
    /// 隐式汇项系数，非负
    pub sp: Sp,
    /// 显式源项
    pub su: Su,
}

impl Default for MulesTerms {
    fn default() -> Self {
        Self::unit()
    }
}

impl MulesTerms {
    /// rho = 1，无源项
    pub fn unit() -> Self {
        Self {
            rho: 1.0,
            sp: Zero,
            su: Zero,
        }
    }
}

impl<R: CellScalar, Sp: CellScalar, Su: CellScalar> MulesTerms<R, Sp, Su> {
    /// 全参数构造
    pub fn new(rho: R, sp: Sp, su: Su) -> Self {
        Self { rho, sp, su }
    }

    /// 替换 rho
    pub fn with_rho<R2: CellScalar>(self, rho: R2) -> MulesTerms<R2, Sp, Su> {
        MulesTerms {
            rho,
            sp: self.sp,
            su: self.su,
        }
    }

    /// 替换隐式汇项
    pub fn with_sp<Sp2: CellScalar>(self, sp: Sp2) -> MulesTerms<R, Sp2, Su> {
        MulesTerms {
            rho: self.rho,
            sp,
            su: self.su,
        }
    }

    /// 替换显式源项
    pub fn with_su<Su2: CellScalar>(self, su: Su2) -> MulesTerms<R, Sp, Su2> {
        MulesTerms {
            rho: self.rho,
            sp: self.sp,
            su,
        }
    }

    /// 对角系数 `rho/Δt + Sp`
    #[inline(always)]
    pub fn diag(&self, cell: usize, r_dt: f64) -> f64 {
        self.rho.value(cell) * r_dt + self.sp.value(cell)
    }

    /// 检查长度与符号
    pub fn validate(&self, n_cells: usize) -> FbResult<()> {
        self.rho.check_len("rho", n_cells)?;
        self.sp.check_len("sp", n_cells)?;
        self.su.check_len("su", n_cells)?;
        for c in 0..n_cells {
            let rho = self.rho.value(c);
            if !(rho > 0.0 && rho.is_finite()) {
                return Err(FbError::invalid_input(format!(
                    "单元 {} 的 rho 必须为正的有限值: {}",
                    c, rho
                )));
            }
            let sp = self.sp.value(c);
            if !(sp >= 0.0 && sp.is_finite()) {
                return Err(FbError::invalid_input(format!(
                    "单元 {} 的隐式汇项 Sp 必须非负: {}",
                    c, sp
                )));
            }
            if !self.su.value(c).is_finite() {
                return Err(FbError::invalid_input(format!("单元 {} 的 Su 非有限", c)));
            }
        }
        Ok(())
    }
}

/// 物理边界 `[psi_min, psi_max]`
#[derive(Debug, Clone, Copy)]
pub struct PsiBounds<Max = f64, Min = f64> {
    /// 上界
    pub max: Max,
    /// 下界
    pub min: Min,
}

impl PsiBounds {
    /// [0, 1]，体积分数的物理边界
    pub fn unit() -> Self {
        Self { max: 1.0, min: 0.0 }
    }
}

impl<Max: CellScalar, Min: CellScalar> PsiBounds<Max, Min> {
    /// 构造
    pub fn new(min: Min, max: Max) -> Self {
        Self { max, min }
    }

    /// 单元上界
    #[inline(always)]
    pub fn max(&self, cell: usize) -> f64 {
        self.max.value(cell)
    }

    /// 单元下界
    #[inline(always)]
    pub fn min(&self, cell: usize) -> f64 {
        self.min.value(cell)
    }

    /// 单元物理区间宽度
    #[inline(always)]
    pub fn range(&self, cell: usize) -> f64 {
        self.max(cell) - self.min(cell)
    }

    /// 检查 `psi_min <= psi_max`
    ///
    /// # 错误
    /// - 长度不匹配返回 `SizeMismatch`
    /// - 第一个 `min > max` 的单元返回 `InvalidBounds`
    pub fn validate(&self, n_cells: usize) -> FbResult<()> {
        self.max.check_len("psi_max", n_cells)?;
        self.min.check_len("psi_min", n_cells)?;
        for c in 0..n_cells {
            let (lo, hi) = (self.min(c), self.max(c));
            if !(lo <= hi) {
                return Err(FbError::invalid_bounds(c, lo, hi));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_terms() {
        let terms = MulesTerms::unit();
        assert_eq!(terms.diag(0, 10.0), 10.0);
        assert!(terms.validate(5).is_ok());
    }

    #[test]
    fn test_terms_builders() {
        let sp = vec![1.0, 2.0];
        let terms = MulesTerms::unit().with_rho(2.0).with_sp(&sp);
        assert_eq!(terms.diag(1, 1.0), 4.0);
        assert!(terms.validate(2).is_ok());
        assert!(terms.validate(3).is_err());
    }

    #[test]
    fn test_negative_sp_rejected() {
        let terms = MulesTerms::unit().with_sp(-1.0);
        assert!(matches!(terms.validate(1), Err(FbError::InvalidInput { .. })));
    }

    #[test]
    fn test_bounds_validation() {
        assert!(PsiBounds::unit().validate(10).is_ok());

        let max = vec![1.0, 0.2, 1.0];
        let bounds = PsiBounds::new(0.5, &max);
        match bounds.validate(3) {
            Err(FbError::InvalidBounds { cell, min, max }) => {
                assert_eq!(cell, 1);
                assert_eq!(min, 0.5);
                assert_eq!(max, 0.2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_nan_bound_rejected() {
        let bounds = PsiBounds::new(f64::NAN, 1.0);
        assert!(bounds.validate(1).is_err());
    }
}

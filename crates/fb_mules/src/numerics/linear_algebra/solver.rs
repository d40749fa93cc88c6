// crates/fb_mules/src/numerics/linear_algebra/solver.rs

//! 迭代线性求解器
//!
//! 隐式迎风预测步的矩阵非对称，使用预条件 BiCGStab 求解；
//! BiCGStab 未收敛时退回对称 Gauss-Seidel。
//!
//! ```ignore
//! let precond = JacobiPreconditioner::from_matrix(&matrix);
//! let mut solver = BiCgStabSolver::new(SolverConfig::new(1e-12, 500));
//! let result = solver.solve(&matrix, &b, &mut x, &precond);
//! result.into_fb_result("BiCGStab")?;
//! ```

use fb_config::LinearSolverControls;
use fb_foundation::{FbError, FbResult};

use super::csr::CsrMatrix;
use super::preconditioner::Preconditioner;
use super::vector_ops::{axpy, dot, norm2};

/// 求解器配置
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// 相对收敛容差
    pub rtol: f64,
    /// 绝对收敛容差
    pub atol: f64,
    /// 最大迭代次数
    pub max_iter: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-12,
            atol: 1e-15,
            max_iter: 1000,
        }
    }
}

impl SolverConfig {
    /// 创建配置
    pub fn new(rtol: f64, max_iter: usize) -> Self {
        Self {
            rtol,
            max_iter,
            ..Default::default()
        }
    }

    /// 设置绝对容差
    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }
}

impl From<&LinearSolverControls> for SolverConfig {
    fn from(c: &LinearSolverControls) -> Self {
        Self {
            rtol: c.rtol,
            atol: c.atol,
            max_iter: c.max_iter,
        }
    }
}

/// 求解器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// 收敛
    Converged,
    /// 达到最大迭代次数
    MaxIterationsReached,
    /// 发散
    Diverged,
    /// 停滞（内积退化）
    Stagnated,
}

/// 求解结果
#[derive(Debug, Clone, Copy)]
pub struct SolverResult {
    /// 状态
    pub status: SolverStatus,
    /// 迭代次数
    pub iterations: usize,
    /// 最终残差二范数
    pub residual_norm: f64,
    /// 初始残差二范数
    pub initial_residual_norm: f64,
}

impl SolverResult {
    fn new(status: SolverStatus, iterations: usize, residual_norm: f64, initial: f64) -> Self {
        Self {
            status,
            iterations,
            residual_norm,
            initial_residual_norm: initial,
        }
    }

    /// 是否收敛
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }

    /// 相对残差
    pub fn relative_residual(&self) -> f64 {
        fb_foundation::safe_div(self.residual_norm, self.initial_residual_norm, 0.0)
    }

    /// 未收敛时转换为 `FbError::LinearSolver`
    pub fn into_fb_result(self, solver: &'static str) -> FbResult<Self> {
        if self.is_converged() {
            Ok(self)
        } else {
            Err(FbError::LinearSolver {
                solver,
                status: format!("{:?}", self.status),
                iterations: self.iterations,
                residual: self.residual_norm,
            })
        }
    }
}

/// 迭代求解器接口
pub trait IterativeSolver {
    /// 求解 A x = b，`x` 输入初值、输出解
    fn solve<P: Preconditioner + ?Sized>(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &P,
    ) -> SolverResult;

    /// 名称
    fn name(&self) -> &'static str;
}

/// 预条件 BiCGStab
pub struct BiCgStabSolver {
    config: SolverConfig,
    r: Vec<f64>,
    r0: Vec<f64>,
    p: Vec<f64>,
    v: Vec<f64>,
    s: Vec<f64>,
    t: Vec<f64>,
    z: Vec<f64>,
}

impl BiCgStabSolver {
    /// 创建求解器
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            r0: Vec::new(),
            p: Vec::new(),
            v: Vec::new(),
            s: Vec::new(),
            t: Vec::new(),
            z: Vec::new(),
        }
    }

    fn ensure_workspace(&mut self, n: usize) {
        if self.r.len() != n {
            for w in [
                &mut self.r,
                &mut self.r0,
                &mut self.p,
                &mut self.v,
                &mut self.s,
                &mut self.t,
                &mut self.z,
            ] {
                *w = vec![0.0; n];
            }
        }
    }
}

impl IterativeSolver for BiCgStabSolver {
    fn solve<P: Preconditioner + ?Sized>(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &P,
    ) -> SolverResult {
        const BREAKDOWN: f64 = 1e-300;
        let n = b.len();
        self.ensure_workspace(n);
        let SolverConfig {
            rtol,
            atol,
            max_iter,
        } = self.config;

        matrix.residual(b, x, &mut self.r);
        let initial = norm2(&self.r);
        if initial <= atol {
            return SolverResult::new(SolverStatus::Converged, 0, initial, initial);
        }

        let converged = |res: f64| res <= atol || res <= rtol * initial;
        let mut restarts = 0usize;
        let (mut rho_old, mut alpha, mut omega) = (1.0, 1.0, 1.0);
        let mut fresh = true;

        for iter in 0..max_iter {
            if fresh {
                // 影子残差取当前残差，rho = |r|² > 0
                self.r0.copy_from_slice(&self.r);
                self.p.fill(0.0);
                self.v.fill(0.0);
            }

            let rho = dot(&self.r0, &self.r);
            if rho.abs() < BREAKDOWN {
                // 影子残差与残差正交：重启
                let res = norm2(&self.r);
                if converged(res) {
                    return SolverResult::new(SolverStatus::Converged, iter, res, initial);
                }
                if fresh {
                    return SolverResult::new(SolverStatus::Stagnated, iter, res, initial);
                }
                restarts += 1;
                fresh = true;
                continue;
            }

            let beta = if fresh {
                0.0
            } else {
                (rho / rho_old) * (alpha / omega)
            };
            fresh = false;
            rho_old = rho;

            for i in 0..n {
                self.p[i] = self.r[i] + beta * (self.p[i] - omega * self.v[i]);
            }

            // v = A M⁻¹ p
            precond.apply(&self.p, &mut self.z);
            matrix.mul_vec(&self.z, &mut self.v);

            let r0v = dot(&self.r0, &self.v);
            if r0v.abs() < BREAKDOWN {
                let res = norm2(&self.r);
                return SolverResult::new(SolverStatus::Stagnated, iter, res, initial);
            }
            alpha = rho / r0v;

            // x += α M⁻¹ p
            axpy(alpha, &self.z, x);
            for i in 0..n {
                self.s[i] = self.r[i] - alpha * self.v[i];
            }

            let s_norm = norm2(&self.s);
            if converged(s_norm) {
                return SolverResult::new(SolverStatus::Converged, iter + 1, s_norm, initial);
            }

            // t = A M⁻¹ s
            precond.apply(&self.s, &mut self.z);
            matrix.mul_vec(&self.z, &mut self.t);

            let tt = dot(&self.t, &self.t);
            omega = if tt < BREAKDOWN {
                0.0
            } else {
                dot(&self.t, &self.s) / tt
            };
            if omega.abs() < BREAKDOWN {
                // 稳定化步退化：保留 x，以 s 为新残差重启
                self.r.copy_from_slice(&self.s);
                restarts += 1;
                fresh = true;
                continue;
            }

            axpy(omega, &self.z, x);
            for i in 0..n {
                self.r[i] = self.s[i] - omega * self.t[i];
            }

            let res = norm2(&self.r);
            log::trace!("BiCGStab 迭代 {}: 残差 = {:.6e}", iter + 1, res);

            if converged(res) {
                if restarts > 0 {
                    log::trace!("BiCGStab 重启 {} 次后收敛", restarts);
                }
                return SolverResult::new(SolverStatus::Converged, iter + 1, res, initial);
            }
            if !res.is_finite() || res > initial * 1e6 {
                return SolverResult::new(SolverStatus::Diverged, iter + 1, res, initial);
            }
        }

        let res = norm2(&self.r);
        SolverResult::new(SolverStatus::MaxIterationsReached, max_iter, res, initial)
    }

    fn name(&self) -> &'static str {
        "BiCGStab"
    }
}

/// 对称 Gauss-Seidel 迭代
///
/// 每次迭代先正向、再反向扫描一遍。对严格对角占优矩阵必收敛；
/// 迎风矩阵在单元按流向排序时为三角阵，一次扫描即得精确解。
pub struct GaussSeidelSolver {
    config: SolverConfig,
    r: Vec<f64>,
}

impl GaussSeidelSolver {
    /// 创建求解器
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
        }
    }

    fn sweep(matrix: &CsrMatrix, b: &[f64], x: &mut [f64], row: usize) -> bool {
        let mut diag = 0.0;
        let mut sum = b[row];
        for (col, a) in matrix.row(row) {
            if col == row {
                diag += a;
            } else {
                sum -= a * x[col];
            }
        }
        if diag == 0.0 {
            return false;
        }
        x[row] = sum / diag;
        true
    }
}

impl IterativeSolver for GaussSeidelSolver {
    fn solve<P: Preconditioner + ?Sized>(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        _precond: &P,
    ) -> SolverResult {
        let n = b.len();
        if self.r.len() != n {
            self.r = vec![0.0; n];
        }
        let SolverConfig {
            rtol,
            atol,
            max_iter,
        } = self.config;

        matrix.residual(b, x, &mut self.r);
        let initial = norm2(&self.r);
        if initial <= atol {
            return SolverResult::new(SolverStatus::Converged, 0, initial, initial);
        }

        for iter in 0..max_iter {
            let forward = (0..n).all(|i| Self::sweep(matrix, b, x, i));
            let backward = forward && (0..n).rev().all(|i| Self::sweep(matrix, b, x, i));
            matrix.residual(b, x, &mut self.r);
            let res = norm2(&self.r);
            if !backward {
                return SolverResult::new(SolverStatus::Stagnated, iter + 1, res, initial);
            }
            if res <= atol || res <= rtol * initial {
                return SolverResult::new(SolverStatus::Converged, iter + 1, res, initial);
            }
            if !res.is_finite() {
                return SolverResult::new(SolverStatus::Diverged, iter + 1, res, initial);
            }
        }

        let res = norm2(&self.r);
        SolverResult::new(SolverStatus::MaxIterationsReached, max_iter, res, initial)
    }

    fn name(&self) -> &'static str {
        "Gauss-Seidel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::linear_algebra::csr::CsrBuilder;
    use crate::numerics::linear_algebra::preconditioner::{
        IdentityPreconditioner, JacobiPreconditioner,
    };

    /// 非对称迎风型矩阵
    fn upwind_matrix(n: usize) -> CsrMatrix {
        let mut b = CsrBuilder::new_square(n);
        for i in 0..n {
            b.set(i, i, 3.0).unwrap();
            if i > 0 {
                b.set(i, i - 1, -2.0).unwrap();
            }
        }
        b.build()
    }

    #[test]
    fn test_bicgstab_nonsymmetric() {
        let a = upwind_matrix(20);
        let expected: Vec<f64> = (0..20).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut b = vec![0.0; 20];
        a.mul_vec(&expected, &mut b);

        let mut x = vec![0.0; 20];
        let precond = JacobiPreconditioner::from_matrix(&a);
        let mut solver = BiCgStabSolver::new(SolverConfig::new(1e-13, 200));
        let result = solver.solve(&a, &b, &mut x, &precond);
        assert!(result.is_converged(), "{:?}", result);
        for (xi, ei) in x.iter().zip(&expected) {
            assert!((xi - ei).abs() < 1e-10);
        }
    }

    /// 单点残差在迎风矩阵中逐格平移，影子残差很快与残差正交
    #[test]
    fn test_bicgstab_recovers_from_breakdown() {
        let n = 40;
        let a = upwind_matrix(n);
        let mut x = vec![0.0; n];
        for xi in x.iter_mut().take(n / 2) {
            *xi = 1.0;
        }
        // 台阶前沿处的残差为单点
        let mut b = vec![0.0; n];
        a.mul_vec(&x, &mut b);
        b[n / 2] += 1.0;
        let mut expected = vec![0.0; n];
        let mut gs = GaussSeidelSolver::new(SolverConfig::new(1e-14, 10));
        assert!(gs.solve(&a, &b, &mut expected, &IdentityPreconditioner).is_converged());

        let precond = JacobiPreconditioner::from_matrix(&a);
        let mut solver = BiCgStabSolver::new(SolverConfig::new(1e-12, 500));
        let result = solver.solve(&a, &b, &mut x, &precond);
        assert!(result.is_converged(), "{:?}", result);
        for (xi, ei) in x.iter().zip(&expected) {
            assert!((xi - ei).abs() < 1e-9);
        }
    }

    #[test]
    fn test_gauss_seidel_exact_on_triangular() {
        let a = upwind_matrix(25);
        let expected: Vec<f64> = (0..25).map(|i| 1.0 / (1.0 + i as f64)).collect();
        let mut b = vec![0.0; 25];
        a.mul_vec(&expected, &mut b);
        let mut x = vec![0.0; 25];
        let mut solver = GaussSeidelSolver::new(SolverConfig::new(1e-12, 50));
        let result = solver.solve(&a, &b, &mut x, &IdentityPreconditioner);
        assert!(result.is_converged());
        assert_eq!(result.iterations, 1);
        for (xi, ei) in x.iter().zip(&expected) {
            assert!((xi - ei).abs() < 1e-13);
        }
    }

    #[test]
    fn test_gauss_seidel_zero_diagonal_stagnates() {
        let mut builder = CsrBuilder::new_square(2);
        builder.set(0, 1, 1.0).unwrap();
        builder.set(1, 0, 1.0).unwrap();
        let a = builder.build();
        let mut x = vec![0.0; 2];
        let mut solver = GaussSeidelSolver::new(SolverConfig::default());
        let result = solver.solve(&a, &[1.0, 1.0], &mut x, &IdentityPreconditioner);
        assert_eq!(result.status, SolverStatus::Stagnated);
    }

    #[test]
    fn test_already_converged() {
        let a = upwind_matrix(4);
        let mut x = vec![0.0; 4];
        let mut solver = BiCgStabSolver::new(SolverConfig::default());
        let result = solver.solve(&a, &[0.0; 4], &mut x, &IdentityPreconditioner);
        assert!(result.is_converged());
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_max_iterations_is_error() {
        let a = upwind_matrix(30);
        let mut x = vec![0.0; 30];
        let mut solver = BiCgStabSolver::new(SolverConfig::new(1e-30, 1).with_atol(0.0));
        let result = solver.solve(&a, &[1.0; 30], &mut x, &IdentityPreconditioner);
        assert!(!result.is_converged());
        assert!(matches!(
            result.into_fb_result("BiCGStab"),
            Err(FbError::LinearSolver { .. })
        ));
    }

    #[test]
    fn test_config_from_controls() {
        let controls = LinearSolverControls::default();
        let config = SolverConfig::from(&controls);
        assert_eq!(config.max_iter, controls.max_iter);
        assert_eq!(config.rtol, controls.rtol);
    }
}

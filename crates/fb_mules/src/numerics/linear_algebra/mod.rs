// crates/fb_mules/src/numerics/linear_algebra/mod.rs

//! 线性代数
//!
//! 隐式预测步使用的稀疏矩阵、预条件器与 Krylov 求解器。
//!
//! - [`csr`]: CSR 矩阵与构建器
//! - [`preconditioner`]: 恒等与 Jacobi 预条件
//! - [`solver`]: 预条件 BiCGStab 与对称 Gauss-Seidel
//! - [`vector_ops`]: 向量运算

pub mod csr;
pub mod preconditioner;
pub mod solver;
pub mod vector_ops;

pub use csr::{CsrBuilder, CsrMatrix};
pub use preconditioner::{IdentityPreconditioner, JacobiPreconditioner, Preconditioner};
pub use solver::{
    BiCgStabSolver, GaussSeidelSolver, IterativeSolver, SolverConfig, SolverResult, SolverStatus,
};

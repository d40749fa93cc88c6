// crates/fb_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `FbError` 枚举和 `FbResult` 类型别名。
//!
//! # 错误分类
//!
//! 1. **配置错误**: 边界不一致、时间步非法等调用方前置条件，调用前即可检测
//! 2. **网格错误**: 拓扑或几何不满足有限体积网格不变量
//! 3. **通信错误**: 光环交换失败，致命且不可恢复，本层不重试
//!
//! 数值退化（零通量和、零体积）不在此列，它们在限制器内部就地吸收。
//!
//! # 示例
//!
//! ```
//! use fb_foundation::error::{FbError, FbResult};
//!
//! fn check_dt(dt: f64) -> FbResult<()> {
//!     if !(dt > 0.0) {
//!         return Err(FbError::invalid_input(format!("时间步必须为正: {}", dt)));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_dt(-1.0).is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type FbResult<T> = Result<T, FbError>;

/// Fluxbound 错误类型
#[derive(Error, Debug)]
pub enum FbError {
    /// 无效网格拓扑或几何
    #[error("无效的网格: {message}")]
    InvalidMesh {
        /// 具体错误信息
        message: String,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 物理边界不一致 (psi_min > psi_max)
    #[error("单元 {cell} 的物理边界不一致: psi_min={min} > psi_max={max}")]
    InvalidBounds {
        /// 单元索引
        cell: usize,
        /// 下界
        min: f64,
        /// 上界
        max: f64,
    },

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 光环交换 / 归约通信失败
    #[error("进程 {rank} 通信失败: {message}")]
    Communication {
        /// 出错的进程号
        rank: usize,
        /// 错误描述
        message: String,
    },

    /// 线性求解器未收敛
    #[error("线性求解器 {solver} 失败: 状态={status}, 迭代={iterations}, 残差={residual:.3e}")]
    LinearSolver {
        /// 求解器名称
        solver: &'static str,
        /// 终止状态描述
        status: String,
        /// 已执行迭代次数
        iterations: usize,
        /// 最终残差
        residual: f64,
    },

    /// 验证失败
    #[error("验证失败: {0}")]
    Validation(String),

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl FbError {
    /// 无效网格
    pub fn invalid_mesh(message: impl Into<String>) -> Self {
        Self::InvalidMesh {
            message: message.into(),
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 边界不一致
    pub fn invalid_bounds(cell: usize, min: f64, max: f64) -> Self {
        Self::InvalidBounds { cell, min, max }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 通信错误
    pub fn communication(rank: usize, message: impl Into<String>) -> Self {
        Self::Communication {
            rank,
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 是否为致命通信错误
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication { .. })
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl FbError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> FbResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查时间步是否为正的有限值
    #[inline]
    pub fn check_time_step(dt: f64) -> FbResult<()> {
        if dt.is_finite() && dt > 0.0 {
            Ok(())
        } else {
            Err(Self::invalid_input(format!("时间步必须为正的有限值: {}", dt)))
        }
    }
}

/// 条件不满足时提前返回错误
///
/// ```
/// use fb_foundation::{ensure, FbError, FbResult};
///
/// fn positive(v: f64) -> FbResult<f64> {
///     ensure!(v > 0.0, FbError::invalid_input("必须为正"));
///     Ok(v)
/// }
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

impl<T> From<std::sync::mpsc::SendError<T>> for FbError {
    fn from(_: std::sync::mpsc::SendError<T>) -> Self {
        Self::Communication {
            rank: usize::MAX,
            message: "通道发送失败: 对端已断开".into(),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================

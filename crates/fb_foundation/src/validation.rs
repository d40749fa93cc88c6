// crates/fb_foundation/src/validation.rs

//! 运行时验证工具
//!
//! 提供验证报告和错误/警告类型，用于网格、边界场和配置的批量检查。
//!
//! # 示例
//!
//! ```
//! use fb_foundation::validation::{ValidationReport, ValidationError};
//!
//! let volume = -1.0f64;
//! let mut report = ValidationReport::new();
//! if volume <= 0.0 {
//!     report.add_error(ValidationError::OutOfRange {
//!         field: "volume",
//!         cell_id: 0,
//!         value: volume,
//!         min: 0.0,
//!         max: f64::MAX,
//!     });
//! }
//! assert!(report.has_errors());
//! ```

use std::fmt;

use crate::error::FbError;

/// 验证报告
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// 错误列表
    pub errors: Vec<ValidationError>,
    /// 警告列表
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// 创建空的验证报告
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加错误
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// 是否有错误
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 是否有警告
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 错误数量
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// 警告数量
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// 是否通过（无错误）
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// 合并另一个报告
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// 有错误时转换为 `FbError::Validation`
    pub fn into_result(self) -> Result<(), FbError> {
        if self.has_errors() {
            Err(FbError::Validation(self.to_string()))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "验证报告:")?;
        writeln!(f, "  错误: {} 个", self.error_count())?;
        writeln!(f, "  警告: {} 个", self.warning_count())?;

        if self.has_errors() {
            writeln!(f, "\n错误详情:")?;
            for (i, err) in self.errors.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, err)?;
            }
        }

        if self.has_warnings() {
            writeln!(f, "\n警告详情:")?;
            for (i, warn) in self.warnings.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, warn)?;
            }
        }

        Ok(())
    }
}

/// 验证错误类型
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// 非有限值
    NonFinite {
        /// 字段名称
        field: &'static str,
        /// 所在单元 ID
        cell_id: usize,
        /// 非有限的数值
        value: f64,
    },
    /// 数据超出范围
    OutOfRange {
        /// 字段名称
        field: &'static str,
        /// 所在单元 ID
        cell_id: usize,
        /// 实际值
        value: f64,
        /// 下界
        min: f64,
        /// 上界
        max: f64,
    },
    /// 拓扑错误
    TopologyError {
        /// 错误描述
        message: String,
        /// 可选的元素 ID
        element_id: Option<usize>,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite {
                field,
                cell_id,
                value,
            } => {
                write!(f, "单元{}: 字段{}={} (非有限值)", cell_id, field, value)
            }
            Self::OutOfRange {
                field,
                cell_id,
                value,
                min,
                max,
            } => {
                write!(
                    f,
                    "单元{}: 字段{}={} 超出范围[{}, {}]",
                    cell_id, field, value, min, max
                )
            }
            Self::TopologyError { message, element_id } => {
                if let Some(id) = element_id {
                    write!(f, "元素{}: 拓扑错误: {}", id, message)
                } else {
                    write!(f, "拓扑错误: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// 验证警告类型
#[derive(Debug, Clone)]
pub enum ValidationWarning {
    /// 质量警告
    QualityWarning {
        /// 警告描述
        message: String,
        /// 可选的元素 ID
        element_id: Option<usize>,
    },
    /// 自定义警告
    Custom {
        /// 自定义消息
        message: String,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QualityWarning {
                message,
                element_id,
            } => {
                if let Some(id) = element_id {
                    write!(f, "元素{}: {}", id, message)
                } else {
                    write!(f, "{}", message)
                }
            }
            Self::Custom { message } => write!(f, "{}", message),
        }
    }
}

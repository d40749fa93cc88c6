// crates/fb_config/src/controls.rs

//! MulesControls - 有界输运修正控制参数
//!
//! 定义 MULES 限制器和 CMULES 修正器的全部控制参数，
//! 使用 JSON 序列化，缺省字段取默认值。
//!
//! # JSON 示例
//!
//! ```json
//! {
//!   "n_correctors": 2,
//!   "n_limiter_iter": 3,
//!   "tolerance": 1e-10,
//!   "predictor": "implicit_upwind"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// 预测步类型（状态 A）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    /// 隐式 Euler + 一阶迎风，无条件有界
    #[default]
    ImplicitUpwind,
    /// 显式迎风，受 Courant 数约束
    ExplicitUpwind,
}

impl PredictorKind {
    /// 获取名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::ImplicitUpwind => "implicit-upwind",
            Self::ExplicitUpwind => "explicit-upwind",
        }
    }
}

/// 隐式预测步线性求解控制
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSolverControls {
    /// 相对收敛容差
    #[serde(default = "default_rtol")]
    pub rtol: f64,

    /// 绝对收敛容差
    #[serde(default = "default_atol")]
    pub atol: f64,

    /// BiCGStab 最大迭代次数
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    /// 分区并行时块 Jacobi 外迭代最大次数
    #[serde(default = "default_max_outer_iter")]
    pub max_outer_iter: usize,

    /// 外迭代收敛容差（全局最大变化量）
    #[serde(default = "default_outer_tol")]
    pub outer_tol: f64,
}

fn default_rtol() -> f64 { 1e-12 }
fn default_atol() -> f64 { 1e-15 }
fn default_max_iter() -> usize { 1000 }
fn default_max_outer_iter() -> usize { 200 }
fn default_outer_tol() -> f64 { 1e-13 }

impl Default for LinearSolverControls {
    fn default() -> Self {
        Self {
            rtol: default_rtol(),
            atol: default_atol(),
            max_iter: default_max_iter(),
            max_outer_iter: default_max_outer_iter(),
            outer_tol: default_outer_tol(),
        }
    }
}

/// MULES / CMULES 控制参数
///
/// 取代求解器字典中的全局控制项，每次调用显式传入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulesControls {
    /// CMULES 修正子循环次数（nCorrectors）
    #[serde(default = "default_n_correctors")]
    pub n_correctors: usize,

    /// 单次修正内的限制器迭代次数（nLimiterIter）
    #[serde(default = "default_n_limiter_iter")]
    pub n_limiter_iter: usize,

    /// 可忽略修正的判定容差
    ///
    /// 若 max_c Δt·Σ|corr|/(V·rho) 小于此值，跳过后续修正子循环。
    #[serde(default)]
    pub tolerance: f64,

    /// 检测到子循环间振荡时的亚松弛因子
    #[serde(default = "default_relaxation")]
    pub relaxation: f64,

    /// 局部极值包络的放宽系数
    #[serde(default)]
    pub extrema_coeff: f64,

    /// 非定值物理边界单元的附加放宽系数，缺省等于 `extrema_coeff`
    #[serde(default)]
    pub boundary_extrema_coeff: Option<f64>,

    /// 包络向单元值收缩的平滑系数，取值 [0, 1)
    #[serde(default)]
    pub smooth_limiter: f64,

    /// 显式 MULES 时间子循环次数
    #[serde(default = "default_n_sub_cycles")]
    pub n_sub_cycles: usize,

    /// 预测步类型
    #[serde(default)]
    pub predictor: PredictorKind,

    /// 线性求解控制
    #[serde(default)]
    pub linear_solver: LinearSolverControls,

    /// 调用前检查 psi_min <= psi_max
    #[serde(default = "default_validate_bounds")]
    pub validate_bounds: bool,
}

fn default_n_correctors() -> usize { 1 }
fn default_n_limiter_iter() -> usize { 3 }
fn default_relaxation() -> f64 { 1.0 }
fn default_n_sub_cycles() -> usize { 1 }
fn default_validate_bounds() -> bool { true }

impl Default for MulesControls {
    fn default() -> Self {
        Self {
            n_correctors: default_n_correctors(),
            n_limiter_iter: default_n_limiter_iter(),
            tolerance: 0.0,
            relaxation: default_relaxation(),
            extrema_coeff: 0.0,
            boundary_extrema_coeff: None,
            smooth_limiter: 0.0,
            n_sub_cycles: default_n_sub_cycles(),
            predictor: PredictorKind::default(),
            linear_solver: LinearSolverControls::default(),
            validate_bounds: default_validate_bounds(),
        }
    }
}

impl MulesControls {
    /// 设置修正子循环次数
    pub fn with_correctors(mut self, n: usize) -> Self {
        self.n_correctors = n;
        self
    }

    /// 设置限制器迭代次数
    pub fn with_limiter_iter(mut self, n: usize) -> Self {
        self.n_limiter_iter = n;
        self
    }

    /// 设置预测步类型
    pub fn with_predictor(mut self, predictor: PredictorKind) -> Self {
        self.predictor = predictor;
        self
    }

    /// 设置可忽略修正容差
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// 设置亚松弛因子
    pub fn with_relaxation(mut self, relaxation: f64) -> Self {
        self.relaxation = relaxation;
        self
    }

    /// 边界放宽系数的实际取值
    pub fn effective_boundary_extrema_coeff(&self) -> f64 {
        self.boundary_extrema_coeff.unwrap_or(self.extrema_coeff)
    }

    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// 从 JSON 字符串解析配置
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let controls: MulesControls =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        controls.validate()?;
        Ok(controls)
    }

    /// 保存配置到 JSON 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_correctors == 0 {
            return Err(ConfigError::invalid("n_correctors", 0, "至少需要一次修正"));
        }
        if self.n_limiter_iter == 0 {
            return Err(ConfigError::invalid("n_limiter_iter", 0, "至少需要一次限制器迭代"));
        }
        if self.n_sub_cycles == 0 {
            return Err(ConfigError::invalid("n_sub_cycles", 0, "至少需要一个子循环"));
        }
        if !(self.tolerance >= 0.0) {
            return Err(ConfigError::invalid("tolerance", self.tolerance, "不能为负"));
        }
        if !(self.relaxation > 0.0 && self.relaxation <= 1.0) {
            return Err(ConfigError::invalid(
                "relaxation",
                self.relaxation,
                "必须在 (0, 1] 范围内",
            ));
        }
        if !(self.extrema_coeff >= 0.0) {
            return Err(ConfigError::invalid("extrema_coeff", self.extrema_coeff, "不能为负"));
        }
        if let Some(coeff) = self.boundary_extrema_coeff {
            if !(coeff >= 0.0) {
                return Err(ConfigError::invalid("boundary_extrema_coeff", coeff, "不能为负"));
            }
        }
        if !(self.smooth_limiter >= 0.0 && self.smooth_limiter < 1.0) {
            return Err(ConfigError::invalid(
                "smooth_limiter",
                self.smooth_limiter,
                "必须在 [0, 1) 范围内",
            ));
        }

        let ls = &self.linear_solver;
        if !(ls.rtol > 0.0) {
            return Err(ConfigError::invalid("linear_solver.rtol", ls.rtol, "必须为正"));
        }
        if !(ls.atol > 0.0) {
            return Err(ConfigError::invalid("linear_solver.atol", ls.atol, "必须为正"));
        }
        if !(ls.outer_tol > 0.0) {
            return Err(ConfigError::invalid("linear_solver.outer_tol", ls.outer_tol, "必须为正"));
        }
        if ls.max_iter == 0 || ls.max_outer_iter == 0 {
            return Err(ConfigError::invalid("linear_solver.max_iter", 0, "必须为正"));
        }

        Ok(())
    }
}

// apps/fb_cli/src/commands/validate.rs

//! 控制文件验证命令
//!
//! 先检查 JSON 结构与未知字段，再做取值范围检查。

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use fb_config::{MulesControls, PredictorKind};
use serde_json::Value;
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// 控制文件路径
    #[arg(long)]
    pub controls: PathBuf,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 验证结果
#[derive(Default, Debug)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn is_ok(&self, strict: bool) -> bool {
        self.errors.is_empty() && (!strict || self.warnings.is_empty())
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== 控制文件验证: {} ===", args.controls.display());

    let result = validate_file(&args.controls)?;

    for err in &result.errors {
        error!("✗ {}", err);
    }
    for warning in &result.warnings {
        warn!("⚠ {}", warning);
    }

    if !result.is_ok(args.strict) {
        bail!(
            "验证失败: {} 个错误, {} 个警告",
            result.errors.len(),
            result.warnings.len()
        );
    }
    info!("✓ 验证通过");
    Ok(())
}

fn validate_file(path: &Path) -> Result<ValidationResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取控制文件 {}", path.display()))?;
    Ok(validate_content(&content))
}

fn validate_content(content: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    let json: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            result.add_error(format!("JSON 解析错误: {}", e));
            return result;
        }
    };
    check_unknown_keys(&json, &mut result);

    match MulesControls::from_json(content) {
        Ok(controls) => check_advisories(&controls, &mut result),
        Err(e) => result.add_error(e.to_string()),
    }
    result
}

/// 未识别的字段会被静默忽略，这里报告为警告
fn check_unknown_keys(json: &Value, result: &mut ValidationResult) {
    let Value::Object(map) = json else {
        result.add_error("控制文件顶层必须是对象");
        return;
    };
    let Ok(Value::Object(known)) = serde_json::to_value(MulesControls::default()) else {
        return;
    };

    for (key, value) in map {
        match known.get(key) {
            None => result.add_warning(format!("未知字段 '{}'", key)),
            Some(Value::Object(known_sub)) => {
                if let Value::Object(sub) = value {
                    for sub_key in sub.keys().filter(|k| !known_sub.contains_key(*k)) {
                        result.add_warning(format!("未知字段 '{}.{}'", key, sub_key));
                    }
                }
            }
            Some(_) => {}
        }
    }
}

fn check_advisories(controls: &MulesControls, result: &mut ValidationResult) {
    if controls.n_correctors > 1 && controls.tolerance == 0.0 {
        result.add_warning("n_correctors > 1 且 tolerance = 0，每个子循环都会执行");
    }
    if controls.n_limiter_iter > 10 {
        result.add_warning(format!(
            "n_limiter_iter = {} 较大，限制器开销随迭代次数线性增长",
            controls.n_limiter_iter
        ));
    }
    if controls.predictor == PredictorKind::ExplicitUpwind {
        result.add_warning("显式预测步仅在 Courant 数 ≤ 1 时有界");
    }
    if !controls.validate_bounds {
        result.add_warning("validate_bounds = false，不检查 psi_min <= psi_max");
    }
}

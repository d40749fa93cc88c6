// crates/fb_foundation/src/float.rs

//! 数值保护常量和安全运算

/// 小量，用于判断"有效非零"
pub const SMALL: f64 = 1.0e-15;

/// 极小量，用于除零保护
pub const VSMALL: f64 = 1.0e-300;

/// 安全除法
///
/// 当 `|b| <= VSMALL` 或结果非有限时返回 `fallback`。
#[inline]
pub fn safe_div(a: f64, b: f64, fallback: f64) -> f64 {
    if b.abs() <= VSMALL {
        return fallback;
    }
    let r = a / b;
    if r.is_finite() {
        r
    } else {
        fallback
    }
}

/// 夹紧到 [0, 1]，NaN 视为 0
#[inline]
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

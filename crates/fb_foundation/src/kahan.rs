// crates/fb_foundation/src/kahan.rs

//! Kahan 求和算法
//!
//! 守恒性检查需要对全场体积积分，长数组直接累加的舍入误差
//! 会掩盖真实的守恒误差，因此使用补偿求和。

/// Kahan 补偿求和器
///
/// # 示例
///
/// ```rust
/// use fb_foundation::KahanSum;
///
/// let data = vec![0.1f64; 1000];
/// let sum = KahanSum::sum_iter(data.iter().copied());
/// assert!((sum - 100.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    /// 创建新的求和器
    pub fn new() -> Self {
        Self {
            sum: 0.0,
            compensation: 0.0,
        }
    }

    /// 添加一个值
    #[inline]
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// 获取当前求和值
    #[inline]
    pub fn value(&self) -> f64 {
        self.sum
    }

    /// 重置求和器
    #[inline]
    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.compensation = 0.0;
    }

    /// 从迭代器求和
    pub fn sum_iter<I: IntoIterator<Item = f64>>(iter: I) -> f64 {
        let mut kahan = Self::new();
        for v in iter {
            kahan.add(v);
        }
        kahan.value()
    }
}

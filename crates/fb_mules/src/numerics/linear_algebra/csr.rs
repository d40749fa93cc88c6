// crates/fb_mules/src/numerics/linear_algebra/csr.rs

//! 压缩稀疏行（CSR）矩阵
//!
//! 有限体积离散得到的矩阵每行非零元为单元自身及其面邻居，
//! CSR 格式下矩阵-向量乘法按行连续访问。
//!
//! - `row_ptr`: 长度 n_rows + 1，`row_ptr[i]` 为第 i 行首个非零元位置
//! - `col_idx`: 列索引，每行内升序
//! - `values`: 非零元值
//!
//! # 特性开关
//!
//! - `parallel`: 矩阵-向量乘法按行并行

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::collections::BTreeMap;

use fb_foundation::{FbError, FbResult};

/// CSR 稀疏矩阵（f64）
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// 列数
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 行指针
    #[inline]
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// 列索引
    #[inline]
    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    /// 非零元值
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn find_index(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_idx[start..end]
            .binary_search(&col)
            .ok()
            .map(|k| start + k)
    }

    /// (row, col) 处的值，不存在时为 0
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.find_index(row, col).map_or(0.0, |k| self.values[k])
    }

    /// 第 row 行的对角元
    #[inline]
    pub fn diagonal_value(&self, row: usize) -> Option<f64> {
        self.find_index(row, row).map(|k| self.values[k])
    }

    /// 对角线向量
    pub fn extract_diagonal(&self) -> Vec<f64> {
        (0..self.n_rows)
            .map(|i| self.diagonal_value(i).unwrap_or(0.0))
            .collect()
    }

    /// 遍历第 row 行的 (列, 值)
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    #[inline]
    fn row_dot(&self, row: usize, x: &[f64]) -> f64 {
        let mut sum = 0.0;
        for k in self.row_ptr[row]..self.row_ptr[row + 1] {
            sum += self.values[k] * x[self.col_idx[k]];
        }
        sum
    }

    /// y = A x
    ///
    /// # Panics
    /// `x`/`y` 长度与矩阵不匹配
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.n_cols, "x 长度必须等于矩阵列数");
        assert_eq!(y.len(), self.n_rows, "y 长度必须等于矩阵行数");

        #[cfg(feature = "parallel")]
        y.par_iter_mut()
            .enumerate()
            .for_each(|(row, out)| *out = self.row_dot(row, x));

        #[cfg(not(feature = "parallel"))]
        for (row, out) in y.iter_mut().enumerate() {
            *out = self.row_dot(row, x);
        }
    }

    /// 残差 r = b - A x
    pub fn residual(&self, b: &[f64], x: &[f64], r: &mut [f64]) {
        self.mul_vec(x, r);
        for (ri, &bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
        }
    }

    /// 是否为 M 矩阵（对角为正、非对角非正、行对角占优）
    ///
    /// 迎风隐式离散矩阵满足此性质，其解因此满足离散极值原理。
    pub fn is_m_matrix(&self) -> bool {
        (0..self.n_rows).all(|row| {
            let mut diag = 0.0;
            let mut off = 0.0;
            for (col, v) in self.row(row) {
                if col == row {
                    diag = v;
                } else if v > 0.0 {
                    return false;
                } else {
                    off -= v;
                }
            }
            diag > 0.0 && diag >= off * (1.0 - 1e-12)
        })
    }
}

/// CSR 矩阵构建器
///
/// 用 BTreeMap 按行暂存，列索引天然有序，构建时一次性压缩。
pub struct CsrBuilder {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<BTreeMap<usize, f64>>,
}

impl CsrBuilder {
    /// 方阵构建器
    pub fn new_square(n: usize) -> Self {
        Self::new(n, n)
    }

    /// 构建器
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: vec![BTreeMap::new(); n_rows],
        }
    }

    fn check(&self, row: usize, col: usize) -> FbResult<()> {
        if row >= self.n_rows || col >= self.n_cols {
            return Err(FbError::internal(format!(
                "矩阵索引 ({}, {}) 越界 ({}×{})",
                row, col, self.n_rows, self.n_cols
            )));
        }
        Ok(())
    }

    /// 设置 (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> FbResult<()> {
        self.check(row, col)?;
        self.rows[row].insert(col, value);
        Ok(())
    }

    /// 累加到 (row, col)
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> FbResult<()> {
        self.check(row, col)?;
        *self.rows[row].entry(col).or_insert(0.0) += value;
        Ok(())
    }

    /// 当前非零元数
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(BTreeMap::len).sum()
    }

    /// 压缩为 CSR
    pub fn build(self) -> CsrMatrix {
        let nnz = self.nnz();
        let mut row_ptr = Vec::with_capacity(self.n_rows + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        row_ptr.push(0);
        for row in self.rows {
            for (col, v) in row {
                col_idx.push(col);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }
        CsrMatrix {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            row_ptr,
            col_idx,
            values,
        }
    }
}

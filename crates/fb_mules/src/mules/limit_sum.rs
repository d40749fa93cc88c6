// crates/fb_mules/src/mules/limit_sum.rs

//! 多相修正通量之和归零
//!
//! 各相体积分数之和恒为 1，因此各相的修正通量在每个面上之和必须为零。
//! 逐面处理：若正修正之和大于负修正之和的绝对值，则按比例缩小正修正，
//! 反之缩小负修正。缩放只减小修正的幅度，不改变符号，已有的有界性得以保持。

use fb_foundation::{FbError, FbResult};

use crate::field::FaceField;

/// 逐面缩放各相修正通量，使其和为零
///
/// 所有面场布局必须一致。
pub fn limit_sum(phi_corrs: &mut [FaceField]) -> FbResult<()> {
    let Some(first) = phi_corrs.first() else {
        return Ok(());
    };
    let n_internal = first.internal.len();
    let patch_sizes: Vec<usize> = first.patches.iter().map(Vec::len).collect();

    for corr in phi_corrs.iter() {
        FbError::check_size("phi_corr", n_internal, corr.internal.len())?;
        FbError::check_size("phi_corr", patch_sizes.len(), corr.patches.len())?;
        for (values, &size) in corr.patches.iter().zip(&patch_sizes) {
            FbError::check_size("phi_corr", size, values.len())?;
        }
    }

    for f in 0..n_internal {
        limit_face(phi_corrs, |corr| &mut corr.internal[f]);
    }
    for (p, &size) in patch_sizes.iter().enumerate() {
        for i in 0..size {
            limit_face(phi_corrs, |corr| &mut corr.patches[p][i]);
        }
    }
    Ok(())
}

fn limit_face(phi_corrs: &mut [FaceField], slot: impl Fn(&mut FaceField) -> &mut f64) {
    let mut sum_pos = 0.0;
    let mut sum_neg = 0.0;
    for corr in phi_corrs.iter_mut() {
        let v = *slot(corr);
        if v > 0.0 {
            sum_pos += v;
        } else {
            sum_neg += v;
        }
    }

    let sum = sum_pos + sum_neg;
    if sum > 0.0 && sum_pos > 0.0 {
        let scale = -sum_neg / sum_pos;
        for corr in phi_corrs.iter_mut() {
            let v = slot(corr);
            if *v > 0.0 {
                *v *= scale;
            }
        }
    } else if sum < 0.0 && sum_neg < 0.0 {
        let scale = -sum_pos / sum_neg;
        for corr in phi_corrs.iter_mut() {
            let v = slot(corr);
            if *v < 0.0 {
                *v *= scale;
            }
        }
    }
}

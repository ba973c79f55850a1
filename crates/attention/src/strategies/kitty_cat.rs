//! KittyCat attention: single-width smoothed queries and keys.
//!
//! Queries and keys are replaced by their trailing moving average before the
//! scaled dot product, so each score compares short local trends instead of
//! single time steps. Values are left untouched.

use candle_core::Tensor;

use super::{causal_moving_average, scaled_scores, softmax_attend, validate_inputs};
use crate::core::{AttentionError, AttentionKind, AttentionOutput, AttentionStrategy};
use crate::masks::fill_masked;

#[derive(Debug, Clone)]
pub struct KittyCat {
    kernel: usize,
    mask_fill: f64,
}

impl KittyCat {
    pub fn new(kernel: usize, mask_fill: f64) -> Self {
        Self { kernel, mask_fill }
    }
}

impl AttentionStrategy for KittyCat {
    fn kind(&self) -> AttentionKind {
        AttentionKind::KittyCat
    }

    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput, AttentionError> {
        let dims = validate_inputs(q, k, v, mask)?;
        let q_smooth = causal_moving_average(q, self.kernel)?;
        let k_smooth = causal_moving_average(k, self.kernel)?;
        let scores = scaled_scores(&q_smooth, &k_smooth, dims.head_dim)?;
        let scores = fill_masked(&scores, mask, self.mask_fill)?;
        Ok(softmax_attend(&scores, v)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::scaled_dot::ScaledDotProduct;
    use crate::strategies::test_support::{max_abs_diff, qkv, row_sums};
    use candle_core::Result as CandleResult;

    #[test]
    fn unit_kernel_reduces_to_scaled_dot_product() -> CandleResult<()> {
        let (q, k, v) = qkv(1, 2, 5, 5, 4)?;
        let kitty = KittyCat::new(1, -1e9).attend(&q, &k, &v, None).unwrap();
        let basic = ScaledDotProduct::new(-1e9).attend(&q, &k, &v, None).unwrap();
        assert!(max_abs_diff(&kitty.context, &basic.context)? < 1e-6);
        Ok(())
    }

    #[test]
    fn smoothing_changes_scores_but_not_shapes() -> CandleResult<()> {
        let (q, k, v) = qkv(2, 2, 6, 6, 4)?;
        let kitty = KittyCat::new(3, -1e9).attend(&q, &k, &v, None).unwrap();
        let basic = ScaledDotProduct::new(-1e9).attend(&q, &k, &v, None).unwrap();
        assert_eq!(kitty.context.dims(), basic.context.dims());
        assert!(max_abs_diff(&kitty.weights, &basic.weights)? > 1e-4);
        assert!(row_sums(&kitty.weights)?.iter().all(|s| (s - 1.0).abs() < 1e-5));
        Ok(())
    }
}

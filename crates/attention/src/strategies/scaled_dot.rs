//! Softmax over scaled dot products.

use candle_core::Tensor;

use super::{scaled_scores, softmax_attend, validate_inputs};
use crate::core::{AttentionError, AttentionKind, AttentionOutput, AttentionStrategy};
use crate::masks::fill_masked;

#[derive(Debug, Clone)]
pub struct ScaledDotProduct {
    mask_fill: f64,
}

impl ScaledDotProduct {
    pub fn new(mask_fill: f64) -> Self {
        Self { mask_fill }
    }
}

impl AttentionStrategy for ScaledDotProduct {
    fn kind(&self) -> AttentionKind {
        AttentionKind::ScaledDotProduct
    }

    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput, AttentionError> {
        let dims = validate_inputs(q, k, v, mask)?;
        let scores = scaled_scores(q, k, dims.head_dim)?;
        let scores = fill_masked(&scores, mask, self.mask_fill)?;
        Ok(softmax_attend(&scores, v)?)
    }
}

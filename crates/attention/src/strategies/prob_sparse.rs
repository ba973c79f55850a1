//! ProbSparse attention (Informer).
//!
//! Each query is scored against a random subset of keys with the sparsity
//! measure `max(s) - sum(s) / k_len`. Only the top `u = factor * ceil(ln q_len)`
//! queries per head ("active" queries) receive full softmax attention; the
//! remaining "lazy" queries attend uniformly over the keys their mask allows.
//! Key sampling is driven by the strategy seed, so repeated calls on the same
//! inputs pick the same keys.

use candle_core::{DType, Device, Tensor, D};
use layers::TensorRng;

use super::{scaled_scores, validate_inputs, CallDims};
use crate::core::{AttentionError, AttentionKind, AttentionOutput, AttentionStrategy};
use crate::masks::fill_masked;

#[derive(Debug, Clone)]
pub struct ProbSparse {
    factor: usize,
    seed: u64,
    mask_fill: f64,
}

impl ProbSparse {
    pub fn new(factor: usize, seed: u64, mask_fill: f64) -> Self {
        Self {
            factor,
            seed,
            mask_fill,
        }
    }

    /// `min(len, factor * ceil(ln len))`, never below one.
    fn budget(&self, len: usize) -> usize {
        let log = (len as f64).ln().ceil().max(0.0) as usize;
        (self.factor * log).clamp(1, len)
    }

    /// Sparsity measure `(batch, heads, q_len)` from randomly sampled keys.
    fn sparsity_measure(
        &self,
        scores: &Tensor,
        dims: &CallDims,
    ) -> Result<Tensor, AttentionError> {
        let sample_k = self.budget(dims.k_len);
        let mut rng = TensorRng::seeded(self.seed);
        let picks: Vec<u32> = rng
            .indices(dims.k_len, dims.q_len * sample_k)?
            .into_iter()
            .map(|i| i as u32)
            .collect();
        let index = Tensor::from_vec(picks, (1, 1, dims.q_len, sample_k), scores.device())?
            .broadcast_as((dims.batch, dims.heads, dims.q_len, sample_k))?
            .contiguous()?;
        let sampled = scores.contiguous()?.gather(&index, 3)?;
        let peak = sampled.max(D::Minus1)?;
        let mean = sampled.sum(D::Minus1)?.affine(1.0 / dims.k_len as f64, 0.0)?;
        Ok((peak - mean)?)
    }

    /// `(batch, heads, q_len, 1)` selector holding `1.0` for active queries.
    fn select_active(
        &self,
        measure: &Tensor,
        dims: &CallDims,
        device: &Device,
    ) -> Result<Tensor, AttentionError> {
        let top = self.budget(dims.q_len);
        let measure = measure.to_dtype(DType::F32)?.to_vec3::<f32>()?;
        let mut selector = vec![0f32; dims.batch * dims.heads * dims.q_len];
        for (b, heads) in measure.iter().enumerate() {
            for (h, row) in heads.iter().enumerate() {
                let mut order: Vec<usize> = (0..row.len()).collect();
                order.sort_by(|&a, &c| row[c].total_cmp(&row[a]));
                let base = (b * dims.heads + h) * dims.q_len;
                for &q in order.iter().take(top) {
                    selector[base + q] = 1.0;
                }
            }
        }
        Ok(Tensor::from_vec(
            selector,
            (dims.batch, dims.heads, dims.q_len, 1),
            device,
        )?)
    }
}

impl AttentionStrategy for ProbSparse {
    fn kind(&self) -> AttentionKind {
        AttentionKind::ProbSparse
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

        let measure = self.sparsity_measure(&scores, &dims)?;
        let selector = self
            .select_active(&measure, &dims, q.device())?
            .to_dtype(scores.dtype())?;

        let active = candle_nn::ops::softmax_last_dim(
            &fill_masked(&scores, mask, self.mask_fill)?.contiguous()?,
        )?;
        let lazy = candle_nn::ops::softmax_last_dim(
            &fill_masked(&scores.zeros_like()?, mask, self.mask_fill)?.contiguous()?,
        )?;
        let weights = (active.broadcast_mul(&selector)?
            + lazy.broadcast_mul(&selector.affine(-1.0, 1.0)?)?)?;
        let context = weights.matmul(&v.contiguous()?)?;

        log::trace!(
            "prob_sparse: {} of {} queries active per head",
            self.budget(dims.q_len),
            dims.q_len
        );
        Ok(AttentionOutput { context, weights })
    }
}

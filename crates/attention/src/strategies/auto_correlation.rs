//! Auto-correlation attention (Autoformer).
//!
//! Instead of pointwise query/key scores, the strategy measures the circular
//! cross-correlation between queries and keys at every time lag. The strongest
//! lags (averaged over heads and channels, shared across the batch) are
//! softmax-weighted per batch element and used to aggregate time-rolled
//! values. The mask is ignored: the lag aggregation has no per-pair scores to
//! block.

use candle_core::{DType, Result as CandleResult, Tensor, D};

use super::validate_inputs;
use crate::core::{AttentionError, AttentionKind, AttentionOutput, AttentionStrategy};

#[derive(Debug, Clone)]
pub struct AutoCorrelation {
    factor: f64,
}

impl AutoCorrelation {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// `max(1, floor(factor * ln len))`, capped at `len`.
    fn top_k(&self, len: usize) -> usize {
        let k = (self.factor * (len as f64).ln()).floor();
        (k.max(1.0) as usize).min(len)
    }
}

impl AttentionStrategy for AutoCorrelation {
    fn kind(&self) -> AttentionKind {
        AttentionKind::AutoCorrelation
    }

    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput, AttentionError> {
        let dims = validate_inputs(q, k, v, mask)?;
        let len = dims.q_len;
        let k = align_length(k, len)?;
        let v = align_length(v, len)?;
        let q = q.contiguous()?;

        // corr[tau] = sum_t q[(t + tau) % len] * k[t]
        let mut lags = Vec::with_capacity(len);
        for tau in 0..len {
            lags.push(roll(&q, tau)?.mul(&k)?.sum_keepdim(2)?);
        }
        let correlation = Tensor::cat(&lags, 2)?;

        let mean_value = correlation.mean(D::Minus1)?.mean(1)?;
        let shared = mean_value.mean(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| shared[b].total_cmp(&shared[a]));
        let top: Vec<usize> = order.into_iter().take(self.top_k(len)).collect();

        let index = Tensor::from_vec(
            top.iter().map(|&lag| lag as u32).collect::<Vec<_>>(),
            top.len(),
            q.device(),
        )?;
        let lag_weights =
            candle_nn::ops::softmax_last_dim(&mean_value.index_select(&index, 1)?.contiguous()?)?;

        let mut context = v.zeros_like()?;
        for (i, &lag) in top.iter().enumerate() {
            let weight = lag_weights.narrow(1, i, 1)?.reshape((dims.batch, 1, 1, 1))?;
            context = (context + roll(&v, lag)?.broadcast_mul(&weight)?)?;
        }
        log::trace!("auto_correlation: lags {top:?} over length {len}");

        Ok(AttentionOutput {
            context,
            weights: correlation,
        })
    }
}

/// Zero-pads or truncates the time axis to `len`.
fn align_length(input: &Tensor, len: usize) -> CandleResult<Tensor> {
    let (batch, heads, current, dim) = input.dims4()?;
    if current == len {
        input.contiguous()
    } else if current > len {
        input.narrow(2, 0, len)?.contiguous()
    } else {
        let pad = Tensor::zeros((batch, heads, len - current, dim), input.dtype(), input.device())?;
        Tensor::cat(&[input, &pad], 2)
    }
}

/// `out[t] = input[(t + shift) % len]` along the time axis.
fn roll(input: &Tensor, shift: usize) -> CandleResult<Tensor> {
    let len = input.dim(2)?;
    let shift = shift % len;
    if shift == 0 {
        return Ok(input.clone());
    }
    let head = input.narrow(2, shift, len - shift)?;
    let tail = input.narrow(2, 0, shift)?;
    Tensor::cat(&[&head, &tail], 2)
}

//! Attention strategy implementations and the tag-driven factory.
//!
//! Each strategy lives in its own module and implements
//! [`AttentionStrategy`]. [`build_strategy`] is the single dispatch point: it
//! validates the construction parameters once and returns the boxed strategy
//! so that forward calls never re-inspect the tag.

pub mod acat;
pub mod auto_correlation;
pub mod kitty_cat;
pub mod log_sparse;
pub mod prob_sparse;
pub mod scaled_dot;

use candle_core::{Result as CandleResult, Tensor};

use crate::core::{AttentionError, AttentionKind, AttentionOutput, AttentionStrategy, StrategyParams};
use crate::masks::MASK_DTYPE;

pub use acat::Acat;
pub use auto_correlation::AutoCorrelation;
pub use kitty_cat::KittyCat;
pub use log_sparse::LogSparse;
pub use prob_sparse::ProbSparse;
pub use scaled_dot::ScaledDotProduct;

/// Builds the strategy selected by `kind`.
pub fn build_strategy(
    kind: AttentionKind,
    params: &StrategyParams,
) -> Result<Box<dyn AttentionStrategy>, AttentionError> {
    if params.heads == 0 || params.head_dim == 0 {
        return Err(AttentionError::InvalidConfig(format!(
            "heads ({}) and head_dim ({}) must be greater than zero",
            params.heads, params.head_dim
        )));
    }
    params.config.validate()?;

    let mask_fill = params.config.mask_fill;
    let strategy: Box<dyn AttentionStrategy> = match kind {
        AttentionKind::ScaledDotProduct => Box::new(ScaledDotProduct::new(mask_fill)),
        AttentionKind::AutoCorrelation => {
            Box::new(AutoCorrelation::new(params.config.autocorrelation_factor))
        }
        AttentionKind::ProbSparse => Box::new(ProbSparse::new(
            params.config.prob_sparse_factor,
            params.seed,
            mask_fill,
        )),
        AttentionKind::LogSparse => Box::new(LogSparse::new(mask_fill)),
        AttentionKind::Acat => Box::new(Acat::new(
            params.config.acat_kernel_sizes.clone(),
            mask_fill,
        )),
        AttentionKind::KittyCat => {
            Box::new(KittyCat::new(params.config.kitty_cat_kernel, mask_fill))
        }
    };
    log::debug!(
        "attention strategy built: kind={kind} heads={} head_dim={} device={:?}",
        params.heads,
        params.head_dim,
        params.device.location()
    );
    Ok(strategy)
}

/// Dimensions shared by one strategy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallDims {
    pub batch: usize,
    pub heads: usize,
    pub q_len: usize,
    pub k_len: usize,
    pub head_dim: usize,
    pub v_dim: usize,
}

/// Checks the `q`/`k`/`v`/`mask` layout contract of [`AttentionStrategy`].
pub(crate) fn validate_inputs(
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    mask: Option<&Tensor>,
) -> Result<CallDims, AttentionError> {
    let (batch, heads, q_len, head_dim) = q.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("q must be [batch, heads, q_len, head_dim], got {:?}", q.dims()),
    })?;
    let (kb, kh, k_len, kd) = k.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("k must be [batch, heads, k_len, head_dim], got {:?}", k.dims()),
    })?;
    let (vb, vh, vk, v_dim) = v.dims4().map_err(|_| AttentionError::InvalidShape {
        context: format!("v must be [batch, heads, k_len, v_dim], got {:?}", v.dims()),
    })?;

    if kb != batch || kh != heads || kd != head_dim {
        return Err(AttentionError::InvalidShape {
            context: format!(
                "k shape mismatch: expected [{batch}, {heads}, ?, {head_dim}] got [{kb}, {kh}, {k_len}, {kd}]"
            ),
        });
    }
    if vb != batch || vh != heads || vk != k_len {
        return Err(AttentionError::InvalidShape {
            context: format!(
                "v shape mismatch: expected [{batch}, {heads}, {k_len}, ?] got [{vb}, {vh}, {vk}, {v_dim}]"
            ),
        });
    }
    if q_len == 0 || k_len == 0 {
        return Err(AttentionError::InvalidShape {
            context: "sequence lengths must be non-zero".to_string(),
        });
    }
    if let Some(mask) = mask {
        if mask.dims() != [batch, heads, q_len, k_len] {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "mask shape mismatch: expected [{batch}, {heads}, {q_len}, {k_len}] got {:?}",
                    mask.dims()
                ),
            });
        }
        if mask.dtype() != MASK_DTYPE {
            return Err(AttentionError::InvalidShape {
                context: format!("mask must be {MASK_DTYPE:?}, got {:?}", mask.dtype()),
            });
        }
    }

    Ok(CallDims {
        batch,
        heads,
        q_len,
        k_len,
        head_dim,
        v_dim,
    })
}

/// `q k^T / sqrt(head_dim)` shaped `[batch, heads, q_len, k_len]`.
pub(crate) fn scaled_scores(q: &Tensor, k: &Tensor, head_dim: usize) -> CandleResult<Tensor> {
    let k_t = k.transpose(2, 3)?.contiguous()?;
    let scores = q.contiguous()?.matmul(&k_t)?;
    scores.affine(1.0 / (head_dim as f64).sqrt(), 0.0)
}

/// Softmax over keys followed by the weighted sum of values.
pub(crate) fn softmax_attend(scores: &Tensor, v: &Tensor) -> CandleResult<AttentionOutput> {
    let weights = candle_nn::ops::softmax_last_dim(&scores.contiguous()?)?;
    let context = weights.matmul(&v.contiguous()?)?;
    Ok(AttentionOutput { context, weights })
}

/// Trailing moving average along the time axis of a `[batch, heads, len, dim]`
/// tensor: position `t` averages `t + 1 - kernel ..= t`, clipped at zero.
pub(crate) fn causal_moving_average(input: &Tensor, kernel: usize) -> CandleResult<Tensor> {
    if kernel <= 1 {
        return Ok(input.clone());
    }
    let (batch, heads, len, dim) = input.dims4()?;
    let pad = Tensor::zeros((batch, heads, kernel - 1, dim), input.dtype(), input.device())?;
    let padded = Tensor::cat(&[&pad, input], 2)?;

    let mut acc = padded.narrow(2, 0, len)?;
    for offset in 1..kernel {
        acc = (acc + padded.narrow(2, offset, len)?)?;
    }
    let inv_counts: Vec<f32> = (0..len)
        .map(|t| 1.0 / (t + 1).min(kernel) as f32)
        .collect();
    let inv_counts = Tensor::from_vec(inv_counts, (1, 1, len, 1), input.device())?;
    acc.broadcast_mul(&inv_counts)
}

#[cfg(test)]
pub(crate) mod test_support {
    use candle_core::{Device, Result, Tensor};
    use layers::TensorRng;

    /// Deterministic `(q, k, v)` triple shaped `[batch, heads, len, dim]`.
    pub fn qkv(
        batch: usize,
        heads: usize,
        q_len: usize,
        k_len: usize,
        dim: usize,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(1234);
        let q = rng.randn((batch, heads, q_len, dim), &device)?;
        let k = rng.randn((batch, heads, k_len, dim), &device)?;
        let v = rng.randn((batch, heads, k_len, dim), &device)?;
        Ok((q, k, v))
    }

    pub fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        a.sub(b)?.abs()?.max_all()?.to_scalar::<f32>()
    }

    pub fn row_sums(weights: &Tensor) -> Result<Vec<f32>> {
        weights.sum(candle_core::D::Minus1)?.flatten_all()?.to_vec1::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn moving_average_clips_at_sequence_start() -> CandleResult<()> {
        let input = Tensor::from_vec(vec![1f32, 2., 3., 4.], (1, 1, 4, 1), &Device::Cpu)?;
        let out = causal_moving_average(&input, 3)?.flatten_all()?.to_vec1::<f32>()?;
        let expected = [1.0, 1.5, 2.0, 3.0];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn factory_rejects_zero_heads() {
        let params = StrategyParams {
            heads: 0,
            head_dim: 4,
            device: Device::Cpu,
            seed: 0,
            config: Default::default(),
        };
        let err = build_strategy(AttentionKind::ScaledDotProduct, &params).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidConfig(_)));
    }

    #[test]
    fn factory_builds_every_kind() -> std::result::Result<(), AttentionError> {
        let params = StrategyParams {
            heads: 2,
            head_dim: 4,
            device: Device::Cpu,
            seed: 0,
            config: Default::default(),
        };
        for kind in AttentionKind::ALL {
            assert_eq!(build_strategy(kind, &params)?.kind(), kind);
        }
        Ok(())
    }
}

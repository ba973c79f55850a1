//! Multi-head attention wrapper around a pluggable [`AttentionStrategy`].
//!
//! Inputs are `(batch, seq, d_model)`. Queries, keys and values are projected
//! with independent bias-free maps, split into heads, handed to exactly one
//! strategy and merged back through the output projection `fc`.

use std::fmt;

use candle_core::{bail, Device, Result as CandleResult, Tensor, Var};
use layers::{checks, Linear, LinearConfig, LinearInit, TensorRng};
use serde::{Deserialize, Serialize};

use crate::core::{
    AttentionError, AttentionKind, AttentionOutput, AttentionStrategy, Config, StrategyParams,
};
use crate::masks::{broadcast_to_heads, MASK_DTYPE};
use crate::strategies::build_strategy;

/// Shape and strategy selection for one attention block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiHeadConfig {
    pub d_model: usize,
    pub d_k: usize,
    pub d_v: usize,
    pub heads: usize,
    pub kind: AttentionKind,
    /// Seed handed to strategies that sample internally.
    pub seed: u64,
    #[serde(default)]
    pub strategy: Config,
}

impl MultiHeadConfig {
    pub fn validate(&self) -> Result<(), AttentionError> {
        if self.d_model == 0 || self.d_k == 0 || self.d_v == 0 || self.heads == 0 {
            return Err(AttentionError::InvalidConfig(format!(
                "d_model ({}), d_k ({}), d_v ({}) and heads ({}) must all be non-zero",
                self.d_model, self.d_k, self.d_v, self.heads
            )));
        }
        self.strategy.validate()
    }
}

pub struct MultiHeadAttention {
    config: MultiHeadConfig,
    w_q: Linear,
    w_k: Linear,
    w_v: Linear,
    fc: Linear,
    strategy: Box<dyn AttentionStrategy>,
}

impl fmt::Debug for MultiHeadAttention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiHeadAttention")
            .field("d_model", &self.config.d_model)
            .field("heads", &self.config.heads)
            .field("d_k", &self.config.d_k)
            .field("d_v", &self.config.d_v)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl MultiHeadAttention {
    pub fn new(
        config: MultiHeadConfig,
        rng: &mut TensorRng,
        device: &Device,
    ) -> Result<Self, AttentionError> {
        config.validate()?;
        let qk_width = config.heads * config.d_k;
        let v_width = config.heads * config.d_v;
        let init = LinearInit::Default;

        let w_q = Linear::with_init(
            LinearConfig::without_bias(config.d_model, qk_width),
            &init,
            rng,
            device,
        )?;
        let w_k = Linear::with_init(
            LinearConfig::without_bias(config.d_model, qk_width),
            &init,
            rng,
            device,
        )?;
        let w_v = Linear::with_init(
            LinearConfig::without_bias(config.d_model, v_width),
            &init,
            rng,
            device,
        )?;
        let fc = Linear::with_init(
            LinearConfig::without_bias(v_width, config.d_model),
            &init,
            rng,
            device,
        )?;

        let strategy = build_strategy(
            config.kind,
            &StrategyParams {
                heads: config.heads,
                head_dim: config.d_k,
                device: device.clone(),
                seed: config.seed,
                config: config.strategy.clone(),
            },
        )?;

        Ok(Self {
            config,
            w_q,
            w_k,
            w_v,
            fc,
            strategy,
        })
    }

    pub fn config(&self) -> &MultiHeadConfig {
        &self.config
    }

    pub fn kind(&self) -> AttentionKind {
        self.strategy.kind()
    }

    pub fn parameters(&self) -> Vec<Var> {
        [&self.w_q, &self.w_k, &self.w_v, &self.fc]
            .into_iter()
            .flat_map(Linear::parameters)
            .collect()
    }

    /// Runs attention of `query` over `key`/`value`.
    ///
    /// `mask`, when present, is a `u8` tensor `(batch, q_len, k_len)`. The
    /// returned context has the query's shape; weights are per head.
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput, AttentionError> {
        let d_model = self.config.d_model;
        checks::expect_batch_seq_hidden("attention.query", query, d_model)?;
        checks::expect_batch_seq_hidden("attention.key", key, d_model)?;
        checks::expect_batch_seq_hidden("attention.value", value, d_model)?;
        let (batch, q_len, _) = query.dims3()?;
        let (_, k_len, _) = key.dims3()?;
        if key.dims() != value.dims() || key.dim(0)? != batch {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "key {:?} and value {:?} must match and share the query batch {batch}",
                    key.dims(),
                    value.dims()
                ),
            });
        }

        let mask = match mask {
            Some(mask) => {
                if mask.dims() != [batch, q_len, k_len] || mask.dtype() != MASK_DTYPE {
                    return Err(AttentionError::InvalidShape {
                        context: format!(
                            "mask must be {MASK_DTYPE:?} [{batch}, {q_len}, {k_len}], got {:?} {:?}",
                            mask.dtype(),
                            mask.dims()
                        ),
                    });
                }
                Some(broadcast_to_heads(mask, self.config.heads)?)
            }
            None => None,
        };

        let q = self.expand_to_heads(&self.w_q.forward(query)?, self.config.d_k)?;
        let k = self.expand_to_heads(&self.w_k.forward(key)?, self.config.d_k)?;
        let v = self.expand_to_heads(&self.w_v.forward(value)?, self.config.d_v)?;

        let AttentionOutput { context, weights } = self.strategy.attend(&q, &k, &v, mask.as_ref())?;
        let merged = self.merge_from_heads(&context)?;
        let context = self.fc.forward(&merged)?;
        log::trace!(
            "multi_head[{}]: query {:?} key {:?} -> context {:?}",
            self.strategy.kind(),
            query.dims(),
            key.dims(),
            context.dims()
        );
        Ok(AttentionOutput { context, weights })
    }

    fn expand_to_heads(&self, tensor: &Tensor, head_dim: usize) -> CandleResult<Tensor> {
        let (batch, seq, _) = tensor.dims3()?;
        tensor
            .reshape((batch, seq, self.config.heads, head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn merge_from_heads(&self, tensor: &Tensor) -> CandleResult<Tensor> {
        let (batch, heads, seq, head_dim) = tensor.dims4()?;
        if heads != self.config.heads {
            bail!(
                "attention.context expected {} heads, got {heads}",
                self.config.heads
            );
        }
        tensor
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq, heads * head_dim))
    }
}

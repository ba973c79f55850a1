//! Decoder stack with masked self-attention and encoder cross-attention.

use std::{fmt, sync::Arc};

use attention::masks::build_subsequent_mask;
use attention::{MultiHeadAttention, MultiHeadConfig};
use candle_core::{Device, Tensor, Var};
use embedding::PositionalEncoding;
use layers::{
    FeedForwardConfig, LayerNorm, NormConfig, NormalizationLayer, PoswiseFeedForward, TensorRng,
};

use crate::error::ModelError;

/// Attention weights collected by one decoder layer.
#[derive(Debug, Clone)]
pub struct DecoderLayerWeights {
    pub self_attention: Tensor,
    pub cross_attention: Tensor,
}

/// Masked self-attention, cross-attention over the encoder output and a
/// feed-forward block. One layer norm instance closes all three sub-layers.
pub struct DecoderLayer {
    self_attention: MultiHeadAttention,
    cross_attention: MultiHeadAttention,
    feed_forward: PoswiseFeedForward,
    norm: Arc<dyn NormalizationLayer>,
}

impl fmt::Debug for DecoderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderLayer")
            .field("self_attention", &self.self_attention)
            .field("cross_attention", &self.cross_attention)
            .field("feed_forward", &self.feed_forward)
            .field("norm", &self.norm.config())
            .finish()
    }
}

impl DecoderLayer {
    pub fn new(
        attention: MultiHeadConfig,
        d_ff: usize,
        rng: &mut TensorRng,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let d_model = attention.d_model;
        let self_attention = MultiHeadAttention::new(attention.clone(), rng, device)?;
        let cross_attention = MultiHeadAttention::new(attention, rng, device)?;
        let feed_forward =
            PoswiseFeedForward::new(FeedForwardConfig::new(d_model, d_ff), rng, device)?;
        Ok(Self {
            self_attention,
            cross_attention,
            feed_forward,
            norm: Arc::new(LayerNorm::without_affine(NormConfig::new(d_model))),
        })
    }

    /// `mask` is the `(batch, tgt_len, tgt_len)` causal mask; cross-attention
    /// is unmasked.
    pub fn forward(
        &self,
        input: &Tensor,
        memory: &Tensor,
        mask: &Tensor,
    ) -> Result<(Tensor, DecoderLayerWeights), ModelError> {
        let attended = self.self_attention.forward(input, input, input, Some(mask))?;
        let hidden = self.norm.forward(&(attended.context + input)?)?;

        let crossed = self.cross_attention.forward(&hidden, memory, memory, None)?;
        let hidden = self.norm.forward(&(crossed.context + &hidden)?)?;

        let projected = self.feed_forward.forward(&hidden)?;
        let output = self.norm.forward(&(projected + &hidden)?)?;
        Ok((
            output,
            DecoderLayerWeights {
                self_attention: attended.weights,
                cross_attention: crossed.weights,
            },
        ))
    }

    pub fn parameters(&self) -> Vec<Var> {
        let mut params = self.self_attention.parameters();
        params.extend(self.cross_attention.parameters());
        params.extend(self.feed_forward.parameters());
        params.extend(self.norm.parameters());
        params
    }
}

#[derive(Debug)]
pub struct Decoder {
    positional: PositionalEncoding,
    layers: Vec<DecoderLayer>,
}

impl Decoder {
    pub fn new(
        attention: MultiHeadConfig,
        d_ff: usize,
        n_layers: usize,
        max_len: usize,
        rng: &mut TensorRng,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let positional = PositionalEncoding::with_max_len(attention.d_model, max_len, device)?;
        let layers = (0..n_layers)
            .map(|_| DecoderLayer::new(attention.clone(), d_ff, rng, device))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { positional, layers })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Decodes `(batch, tgt_len, d_model)` embeddings against the encoder
    /// output. The causal mask is built once from `tgt_len` and shared by
    /// every layer.
    pub fn forward(
        &self,
        embedded: &Tensor,
        memory: &Tensor,
    ) -> Result<(Tensor, Vec<DecoderLayerWeights>), ModelError> {
        let (batch, tgt_len, _) = embedded.dims3()?;
        let mask = build_subsequent_mask(embedded.device(), batch, tgt_len, tgt_len)?;

        let mut hidden = self.positional.forward(embedded)?;
        let mut weights = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, layer_weights) = layer.forward(&hidden, memory, &mask)?;
            hidden = next;
            weights.push(layer_weights);
        }
        Ok((hidden, weights))
    }

    pub fn parameters(&self) -> Vec<Var> {
        self.layers.iter().flat_map(DecoderLayer::parameters).collect()
    }
}

//! Encoder stack: positional encoding followed by post-norm attention layers.

use attention::{MultiHeadAttention, MultiHeadConfig};
use candle_core::{Device, Tensor, Var};
use embedding::PositionalEncoding;
use layers::{
    FeedForwardConfig, LayerNorm, NormConfig, NormalizationLayer, PoswiseFeedForward, TensorRng,
};

use crate::error::ModelError;

/// Self-attention and feed-forward sub-layers, each closed by
/// `norm(sublayer + residual)` with a non-affine layer norm.
#[derive(Debug)]
pub struct EncoderLayer {
    self_attention: MultiHeadAttention,
    feed_forward: PoswiseFeedForward,
    norm: LayerNorm,
}

impl EncoderLayer {
    pub fn new(
        attention: MultiHeadConfig,
        d_ff: usize,
        rng: &mut TensorRng,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let d_model = attention.d_model;
        let self_attention = MultiHeadAttention::new(attention, rng, device)?;
        let feed_forward =
            PoswiseFeedForward::new(FeedForwardConfig::new(d_model, d_ff), rng, device)?;
        Ok(Self {
            self_attention,
            feed_forward,
            norm: LayerNorm::without_affine(NormConfig::new(d_model)),
        })
    }

    /// Returns the updated hidden state and the self-attention weights.
    pub fn forward(&self, input: &Tensor) -> Result<(Tensor, Tensor), ModelError> {
        let attended = self.self_attention.forward(input, input, input, None)?;
        let hidden = self.norm.forward(&(attended.context + input)?)?;
        let projected = self.feed_forward.forward(&hidden)?;
        let output = self.norm.forward(&(projected + &hidden)?)?;
        Ok((output, attended.weights))
    }

    pub fn parameters(&self) -> Vec<Var> {
        let mut params = self.self_attention.parameters();
        params.extend(self.feed_forward.parameters());
        params
    }
}

#[derive(Debug)]
pub struct Encoder {
    positional: PositionalEncoding,
    layers: Vec<EncoderLayer>,
}

impl Encoder {
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
            .map(|_| EncoderLayer::new(attention.clone(), d_ff, rng, device))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { positional, layers })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Encodes `(batch, src_len, d_model)` embeddings; returns the final
    /// hidden state and one attention tensor per layer, in order.
    pub fn forward(&self, embedded: &Tensor) -> Result<(Tensor, Vec<Tensor>), ModelError> {
        let mut hidden = self.positional.forward(embedded)?;
        let mut attentions = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, weights) = layer.forward(&hidden)?;
            hidden = next;
            attentions.push(weights);
        }
        Ok((hidden, attentions))
    }

    pub fn parameters(&self) -> Vec<Var> {
        self.layers.iter().flat_map(EncoderLayer::parameters).collect()
    }
}

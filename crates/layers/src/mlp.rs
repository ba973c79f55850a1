//! Position-wise feed-forward block.
//!
//! Operates on hidden states shaped `(batch, seq, hidden)` and returns the
//! same layout: the hidden dimension is expanded to
//! `config.intermediate_size`, passed through ReLU, then contracted back.

use candle_core::{Device, Result, Tensor, Var};

use crate::{
    activations::ActivationKind,
    checks,
    linear::{Linear, LinearConfig, LinearInit},
    rng::TensorRng,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub hidden_size: usize,
    /// Width of the activation space.
    pub intermediate_size: usize,
}

impl FeedForwardConfig {
    pub fn new(hidden_size: usize, intermediate_size: usize) -> Self {
        Self {
            hidden_size,
            intermediate_size,
        }
    }
}

/// `w_2(relu(w_1(x)))`.
///
/// Both weight matrices are drawn from `U(-1/sqrt(hidden), 1/sqrt(hidden))`
/// regardless of their fan-in; the biases keep the default dense init.
#[derive(Debug, Clone)]
pub struct PoswiseFeedForward {
    config: FeedForwardConfig,
    w_1: Linear,
    w_2: Linear,
    activation: ActivationKind,
}

impl PoswiseFeedForward {
    pub fn new(config: FeedForwardConfig, rng: &mut TensorRng, device: &Device) -> Result<Self> {
        let init = LinearInit::Uniform {
            bound: 1.0 / (config.hidden_size as f64).sqrt(),
        };
        let w_1 = Linear::with_init(
            LinearConfig::new(config.hidden_size, config.intermediate_size),
            &init,
            rng,
            device,
        )?;
        let w_2 = Linear::with_init(
            LinearConfig::new(config.intermediate_size, config.hidden_size),
            &init,
            rng,
            device,
        )?;
        Ok(Self {
            config,
            w_1,
            w_2,
            activation: ActivationKind::Relu,
        })
    }

    pub fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    pub fn parameters(&self) -> Vec<Var> {
        let mut params = self.w_1.parameters();
        params.extend(self.w_2.parameters());
        params
    }

    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("ffn.input", hidden, self.config.hidden_size)?;
        let expanded = self.activation.forward(&self.w_1.forward(hidden)?)?;
        self.w_2.forward(&expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_shape_and_bounds_weights() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(5);
        let ffn = PoswiseFeedForward::new(FeedForwardConfig::new(16, 64), &mut rng, &device)?;
        let input = rng.randn((2, 7, 16), &device)?;
        assert_eq!(ffn.forward(&input)?.dims(), &[2, 7, 16]);

        let bound = 1.0 / 4.0;
        for weight in [ffn.w_1.weight(), ffn.w_2.weight()] {
            let max = weight.abs()?.max_all()?.to_scalar::<f32>()?;
            assert!(max <= bound);
        }
        assert_eq!(ffn.parameters().len(), 4);
        Ok(())
    }
}

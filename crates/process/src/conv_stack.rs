//! Two same-padded convolutions, batch normalisation and a feature softmax.
//!
//! Accepts and returns `(batch, seq, d)`; the convolutions run on the
//! channel-first transpose. The softmax normalises over features (channels),
//! not over time, so every output step is a distribution over the `d`
//! features.

use candle_core::{Device, Result, Tensor, Var};
use layers::{checks, ActivationKind, BatchNorm1d, Conv1d, Conv1dConfig, NormConfig, TensorRng};

const KERNEL_SIZE: usize = 3;

#[derive(Debug)]
pub struct ConvStack {
    width: usize,
    first: Conv1d,
    second: Conv1d,
    norm: BatchNorm1d,
    activation: ActivationKind,
}

impl ConvStack {
    pub fn new(width: usize, rng: &mut TensorRng, device: &Device) -> Result<Self> {
        let conv = Conv1dConfig::same(width, width, KERNEL_SIZE);
        Ok(Self {
            width,
            first: Conv1d::new(conv.clone(), rng, device)?,
            second: Conv1d::new(conv, rng, device)?,
            norm: BatchNorm1d::new(NormConfig::new(width), device)?,
            // dim 1 is the feature axis in channel-first layout
            activation: ActivationKind::Softmax { dim: 1 },
        })
    }

    pub fn set_training(&self, training: bool) {
        self.norm.set_training(training);
    }

    pub fn is_training(&self) -> bool {
        self.norm.is_training()
    }

    pub fn parameters(&self) -> Vec<Var> {
        let mut params = self.first.parameters();
        params.extend(self.second.parameters());
        params.extend(self.norm.parameters());
        params
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("conv_stack.input", input, self.width)?;
        let channels_first = input.transpose(1, 2)?.contiguous()?;
        let hidden = self.first.forward(&channels_first)?;
        let hidden = self.second.forward(&hidden)?;
        let hidden = self.norm.forward(&hidden)?;
        let hidden = self.activation.forward(&hidden)?;
        hidden.transpose(1, 2)?.contiguous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::D;

    #[test]
    fn output_is_a_distribution_over_features() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(17);
        let stack = ConvStack::new(6, &mut rng, &device)?;
        let input = rng.randn((2, 5, 6), &device)?;
        let out = stack.forward(&input)?;
        assert_eq!(out.dims(), &[2, 5, 6]);
        let sums = out.sum(D::Minus1)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
        assert_eq!(stack.parameters().len(), 6);
        Ok(())
    }

    #[test]
    fn training_flag_reaches_batch_norm() -> Result<()> {
        let mut rng = TensorRng::seeded(1);
        let stack = ConvStack::new(2, &mut rng, &Device::Cpu)?;
        assert!(stack.is_training());
        stack.set_training(false);
        assert!(!stack.is_training());
        Ok(())
    }
}

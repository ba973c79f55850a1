//! Non-linearities used by the feed-forward and convolutional stacks.
//!
//! * **ReLU** zeroes negative values and keeps the input layout.
//! * **Softmax** normalises along one explicit axis through Candle's fused
//!   kernel (`candle_nn::ops::softmax`).

use candle_core::{Result, Tensor};

/// Identifies which non-linearity is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Rectified linear unit.
    Relu,
    /// Softmax normalisation over the given axis.
    Softmax { dim: usize },
}

impl ActivationKind {
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        match self {
            ActivationKind::Relu => input.relu(),
            ActivationKind::Softmax { dim } => candle_nn::ops::softmax(&input.contiguous()?, *dim),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn relu_clamps_negatives() -> Result<()> {
        let input = Tensor::from_vec(vec![-1f32, 0.0, 2.5], 3, &Device::Cpu)?;
        let out = ActivationKind::Relu.forward(&input)?.to_vec1::<f32>()?;
        assert_eq!(out, vec![0.0, 0.0, 2.5]);
        Ok(())
    }

    #[test]
    fn softmax_sums_to_one_along_axis() -> Result<()> {
        let input = Tensor::from_vec(vec![1f32, 2., 3., 4., 5., 6.], (1, 3, 2), &Device::Cpu)?;
        let out = ActivationKind::Softmax { dim: 1 }.forward(&input)?;
        let sums = out.sum(1)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
        Ok(())
    }
}

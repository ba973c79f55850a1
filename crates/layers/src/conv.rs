//! One-dimensional convolution over channel-first sequences.
//!
//! Inputs are shaped `(batch, in_channels, seq)`; outputs are
//! `(batch, out_channels, seq_out)` where
//! `seq_out = (seq + 2 * padding - kernel_size) / stride + 1`.

use candle_core::{Device, Error, Result, Tensor, Var};

use crate::{checks, rng::TensorRng};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv1dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub padding: usize,
    pub stride: usize,
    pub bias: bool,
}

impl Conv1dConfig {
    /// Stride-one convolution whose padding keeps the sequence length for odd kernels.
    pub fn same(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding: (kernel_size - 1) / 2,
            stride: 1,
            bias: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conv1d {
    config: Conv1dConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Conv1d {
    /// Samples weight and bias from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` with
    /// `fan_in = in_channels * kernel_size`.
    pub fn new(config: Conv1dConfig, rng: &mut TensorRng, device: &Device) -> Result<Self> {
        if config.in_channels == 0 || config.out_channels == 0 || config.kernel_size == 0 {
            return Err(Error::Msg(format!("invalid conv1d configuration {config:?}")));
        }
        if config.stride == 0 {
            return Err(Error::Msg("conv1d stride must be non-zero".into()));
        }
        let fan_in = config.in_channels * config.kernel_size;
        let bound = 1.0 / (fan_in as f32).sqrt();
        let weight = rng.symmetric_uniform(
            bound,
            (config.out_channels, config.in_channels, config.kernel_size),
            device,
        )?;
        let bias = if config.bias {
            Some(Var::from_tensor(&rng.symmetric_uniform(
                bound,
                config.out_channels,
                device,
            )?)?)
        } else {
            None
        };
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
            bias,
        })
    }

    pub fn config(&self) -> &Conv1dConfig {
        &self.config
    }

    pub fn parameters(&self) -> Vec<Var> {
        let mut params = vec![self.weight.clone()];
        params.extend(self.bias.iter().cloned());
        params
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        checks::expect_batch_channels_seq("conv1d.input", input, self.config.in_channels)?;
        let output = input.contiguous()?.conv1d(
            self.weight.as_tensor(),
            self.config.padding,
            self.config.stride,
            1,
            1,
        )?;
        match &self.bias {
            Some(bias) => {
                let bias = bias.as_tensor().reshape((1, self.config.out_channels, 1))?;
                output.broadcast_add(&bias)
            }
            None => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn same_padding_preserves_length() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(11);
        let conv = Conv1d::new(Conv1dConfig::same(4, 6, 3), &mut rng, &device)?;
        let input = rng.randn((2, 4, 9), &device)?;
        let out = conv.forward(&input)?;
        assert_eq!(out.dims(), &[2, 6, 9]);
        assert_eq!(conv.parameters().len(), 2);
        Ok(())
    }

    #[test]
    fn zero_input_yields_bias() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(2);
        let conv = Conv1d::new(Conv1dConfig::same(2, 2, 3), &mut rng, &device)?;
        let input = Tensor::zeros((1, 2, 5), DType::F32, &device)?;
        let out = conv.forward(&input)?;
        let bias = conv.parameters()[1].as_tensor().to_vec1::<f32>()?;
        let rows = out.squeeze(0)?.to_vec2::<f32>()?;
        for (row, b) in rows.iter().zip(bias) {
            assert!(row.iter().all(|v| (v - b).abs() < 1e-6));
        }
        Ok(())
    }
}

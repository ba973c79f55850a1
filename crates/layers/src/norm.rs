//! Normalisation layers.
//!
//! [`LayerNorm`] normalises `(batch, seq, hidden)` tensors along the last axis
//! and optionally applies a learnable affine transform. [`BatchNorm1d`]
//! normalises channel-first `(batch, channels, seq)` tensors per channel and
//! tracks running statistics for evaluation.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use candle_core::{Device, Error, Result, Tensor, Var, D};

use crate::checks;

/// Configuration shared by normalisation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct NormConfig {
    /// Size of the dimension being normalised.
    pub hidden_size: usize,
    /// Numeric stabiliser added to the variance.
    pub epsilon: f64,
    /// Whether post-normalisation affine parameters are learned.
    pub elementwise_affine: bool,
}

impl NormConfig {
    pub fn new(hidden_size: usize) -> Self {
        Self {
            hidden_size,
            epsilon: 1e-5,
            elementwise_affine: true,
        }
    }
}

/// Shared interface for sequence normalisation layers.
pub trait NormalizationLayer: Send + Sync {
    /// Returns the configuration so callers can check shape compatibility.
    fn config(&self) -> &NormConfig;

    /// Applies the normalisation to a hidden state tensor.
    fn forward(&self, hidden: &Tensor) -> Result<Tensor>;

    /// Learnable parameters (empty for non-affine norms).
    fn parameters(&self) -> Vec<Var>;
}

/// Standard LayerNorm with optional affine parameters.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    config: NormConfig,
    weight: Option<Var>,
    bias: Option<Var>,
}

impl LayerNorm {
    /// Constructs a LayerNorm with scale initialised to one and bias to zero.
    pub fn new(mut config: NormConfig, device: &Device) -> Result<Self> {
        config.elementwise_affine = true;
        let weight = Var::ones(config.hidden_size, candle_core::DType::F32, device)?;
        let bias = Var::zeros(config.hidden_size, candle_core::DType::F32, device)?;
        Ok(Self {
            config,
            weight: Some(weight),
            bias: Some(bias),
        })
    }

    /// Constructs a LayerNorm without affine parameters (scale = 1, bias = 0).
    pub fn without_affine(mut config: NormConfig) -> Self {
        config.elementwise_affine = false;
        Self {
            config,
            weight: None,
            bias: None,
        }
    }
}

impl NormalizationLayer for LayerNorm {
    fn config(&self) -> &NormConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("norm.input", hidden, self.config.hidden_size)?;

        let mean = hidden.mean_keepdim(D::Minus1)?;
        let centered = hidden.broadcast_sub(&mean)?;
        let variance = centered.sqr()?.mean_keepdim(D::Minus1)?;
        let denom = (variance + self.config.epsilon)?.sqrt()?;
        let mut normalized = centered.broadcast_div(&denom)?;

        if let Some(weight) = &self.weight {
            normalized = normalized.broadcast_mul(weight.as_tensor())?;
        }
        if let Some(bias) = &self.bias {
            normalized = normalized.broadcast_add(bias.as_tensor())?;
        }
        Ok(normalized)
    }

    fn parameters(&self) -> Vec<Var> {
        self.weight.iter().chain(self.bias.iter()).cloned().collect()
    }
}

/// Per-channel batch normalisation over `(batch, channels, seq)` inputs.
#[derive(Debug)]
pub struct BatchNorm1d {
    config: NormConfig,
    momentum: f64,
    weight: Var,
    bias: Var,
    running_mean: Mutex<Tensor>,
    running_var: Mutex<Tensor>,
    training: AtomicBool,
}

impl BatchNorm1d {
    /// Creates a layer in training mode with unit scale, zero shift and
    /// running statistics `(mean = 0, var = 1)`.
    pub fn new(config: NormConfig, device: &Device) -> Result<Self> {
        let channels = config.hidden_size;
        Ok(Self {
            weight: Var::ones(channels, candle_core::DType::F32, device)?,
            bias: Var::zeros(channels, candle_core::DType::F32, device)?,
            running_mean: Mutex::new(Tensor::zeros(channels, candle_core::DType::F32, device)?),
            running_var: Mutex::new(Tensor::ones(channels, candle_core::DType::F32, device)?),
            momentum: 0.1,
            training: AtomicBool::new(true),
            config,
        })
    }

    pub fn config(&self) -> &NormConfig {
        &self.config
    }

    /// Switches between batch statistics (`true`) and running statistics.
    pub fn set_training(&self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    /// Snapshot of the `(running_mean, running_var)` buffers.
    pub fn running_stats(&self) -> Result<(Tensor, Tensor)> {
        let mean = lock(&self.running_mean)?.clone();
        let var = lock(&self.running_var)?.clone();
        Ok((mean, var))
    }

    pub fn parameters(&self) -> Vec<Var> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let channels = self.config.hidden_size;
        checks::expect_batch_channels_seq("batch_norm.input", input, channels)?;
        let (batch, _, seq) = input.dims3()?;

        let (mean, var) = if self.is_training() {
            let mean = input.mean_keepdim(2)?.mean_keepdim(0)?;
            let var = input
                .broadcast_sub(&mean)?
                .sqr()?
                .mean_keepdim(2)?
                .mean_keepdim(0)?;
            self.update_running_stats(&mean, &var, batch * seq)?;
            (mean, var)
        } else {
            let mean = lock(&self.running_mean)?.reshape((1, channels, 1))?;
            let var = lock(&self.running_var)?.reshape((1, channels, 1))?;
            (mean, var)
        };

        let denom = (var + self.config.epsilon)?.sqrt()?;
        let normalized = input.broadcast_sub(&mean)?.broadcast_div(&denom)?;
        let weight = self.weight.as_tensor().reshape((1, channels, 1))?;
        let bias = self.bias.as_tensor().reshape((1, channels, 1))?;
        normalized.broadcast_mul(&weight)?.broadcast_add(&bias)
    }

    fn update_running_stats(&self, mean: &Tensor, var: &Tensor, count: usize) -> Result<()> {
        let channels = self.config.hidden_size;
        let unbiased = if count > 1 {
            (var * (count as f64 / (count - 1) as f64))?
        } else {
            var.clone()
        };
        let keep = 1.0 - self.momentum;

        let mut running_mean = lock(&self.running_mean)?;
        let mean = mean.detach().reshape(channels)?;
        *running_mean = (running_mean.affine(keep, 0.0)? + mean.affine(self.momentum, 0.0)?)?;

        let mut running_var = lock(&self.running_var)?;
        let unbiased = unbiased.detach().reshape(channels)?;
        *running_var = (running_var.affine(keep, 0.0)? + unbiased.affine(self.momentum, 0.0)?)?;
        log::trace!("batch_norm running stats updated over {count} samples per channel");
        Ok(())
    }
}

fn lock(buffer: &Mutex<Tensor>) -> Result<std::sync::MutexGuard<'_, Tensor>> {
    buffer
        .lock()
        .map_err(|_| Error::Msg("batch norm statistics mutex poisoned".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn layer_norm_zero_mean_unit_variance() -> Result<()> {
        let device = Device::Cpu;
        let norm = LayerNorm::without_affine(NormConfig::new(4));
        let input = Tensor::from_vec(vec![1f32, 2., 3., 4., -2., 0., 2., 4.], (1, 2, 4), &device)?;
        let out = norm.forward(&input)?;

        let mean = out.mean_keepdim(D::Minus1)?.flatten_all()?.to_vec1::<f32>()?;
        let var = out.sqr()?.mean_keepdim(D::Minus1)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(mean.iter().all(|m| m.abs() < 1e-5));
        assert!(var.iter().all(|v| (v - 1.0).abs() < 1e-3));
        assert!(norm.parameters().is_empty());
        Ok(())
    }

    #[test]
    fn affine_layer_norm_exposes_parameters() -> Result<()> {
        let norm = LayerNorm::new(NormConfig::new(3), &Device::Cpu)?;
        assert_eq!(norm.parameters().len(), 2);
        assert!(norm.config().elementwise_affine);
        Ok(())
    }

    #[test]
    fn batch_norm_training_normalises_and_tracks_stats() -> Result<()> {
        let device = Device::Cpu;
        let bn = BatchNorm1d::new(NormConfig::new(2), &device)?;
        // channel 0 is constant 2.0, channel 1 alternates 0/4
        let input = Tensor::from_vec(vec![2f32, 2., 0., 4., 2., 2., 4., 0.], (2, 2, 2), &device)?;
        let out = bn.forward(&input)?;
        let values = out.flatten_all()?.to_vec1::<f32>()?;
        assert!(values[0].abs() < 1e-3 && values[1].abs() < 1e-3);
        assert!((values[2] + 1.0).abs() < 1e-3 && (values[3] - 1.0).abs() < 1e-3);

        let (mean, var) = bn.running_stats()?;
        let mean = mean.to_vec1::<f32>()?;
        let var = var.to_vec1::<f32>()?;
        assert!((mean[0] - 0.2).abs() < 1e-5);
        assert!((mean[1] - 0.2).abs() < 1e-5);
        assert!((var[0] - 0.9).abs() < 1e-5);
        // biased var 4, unbiased 16/3
        assert!((var[1] - (0.9 + 0.1 * 16.0 / 3.0)).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn batch_norm_eval_uses_running_stats() -> Result<()> {
        let device = Device::Cpu;
        let bn = BatchNorm1d::new(NormConfig::new(1), &device)?;
        bn.set_training(false);
        let input = Tensor::from_vec(vec![3f32, -3.], (1, 1, 2), &device)?;
        let out = bn.forward(&input)?.flatten_all()?.to_vec1::<f32>()?;
        assert!((out[0] - 3.0).abs() < 1e-3);
        assert!((out[1] + 3.0).abs() < 1e-3);
        Ok(())
    }
}

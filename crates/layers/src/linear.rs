//! Linear and affine projection helpers.
//!
//! Linear layers expect inputs shaped `(batch, seq, in_dim)` or `(rows, in_dim)`
//! and return the same leading layout with `out_dim` features. Weights are
//! stored `(out_dim, in_dim)` like the usual dense layer convention.

use candle_core::{Device, Error, Result, Tensor, Var};

use crate::{checks, rng::TensorRng};

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a projection with bias.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }

    /// Creates a configuration for a bias-free projection.
    pub fn without_bias(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: false,
        }
    }
}

/// Weight initialisation policies.
#[derive(Debug, Clone, PartialEq)]
pub enum LinearInit {
    /// `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`, the conventional dense default.
    Default,
    /// `U(-bound, bound)` with an explicit bound.
    Uniform { bound: f64 },
}

impl LinearInit {
    fn bound(&self, fan_in: usize) -> f32 {
        match self {
            LinearInit::Default => 1.0 / (fan_in as f32).sqrt(),
            LinearInit::Uniform { bound } => *bound as f32,
        }
    }
}

/// Dense affine projection with optional bias.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        if config.input_dim == 0 || config.output_dim == 0 {
            return Err(Error::Msg(format!(
                "linear dimensions must be non-zero, got {} -> {}",
                config.input_dim, config.output_dim
            )));
        }
        checks::expect_shape("linear.weight", &weight, &[config.output_dim, config.input_dim])?;
        let bias = match (config.bias, bias) {
            (true, Some(bias)) => {
                checks::expect_shape("linear.bias", &bias, &[config.output_dim])?;
                Some(Var::from_tensor(&bias)?)
            }
            (false, None) => None,
            (false, Some(_)) => {
                return Err(Error::Msg("bias provided but config disables bias".into()))
            }
            (true, None) => return Err(Error::Msg("config expects bias but none supplied".into())),
        };
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
            bias,
        })
    }

    /// Builds a layer whose weight follows `init`; the bias, when present,
    /// always uses [`LinearInit::Default`].
    pub fn with_init(
        config: LinearConfig,
        init: &LinearInit,
        rng: &mut TensorRng,
        device: &Device,
    ) -> Result<Self> {
        let weight = rng.symmetric_uniform(
            init.bound(config.input_dim),
            (config.output_dim, config.input_dim),
            device,
        )?;
        let bias = if config.bias {
            Some(rng.symmetric_uniform(
                LinearInit::Default.bound(config.input_dim),
                config.output_dim,
                device,
            )?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor {
        self.weight.as_tensor()
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref().map(Var::as_tensor)
    }

    /// Learnable parameters, weight first.
    pub fn parameters(&self) -> Vec<Var> {
        let mut params = vec![self.weight.clone()];
        params.extend(self.bias.iter().cloned());
        params
    }

    /// Applies `x W^T + b` over the last axis.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let weight_t = self.weight.as_tensor().t()?;
        let mut output = match input.dims() {
            &[batch, seq, hidden] if hidden == self.config.input_dim => input
                .reshape((batch * seq, hidden))?
                .matmul(&weight_t)?
                .reshape((batch, seq, self.config.output_dim))?,
            &[_, hidden] if hidden == self.config.input_dim => {
                input.contiguous()?.matmul(&weight_t)?
            }
            dims => {
                return Err(Error::Msg(format!(
                    "linear expects input shaped [B, T, {in_dim}] or [T, {in_dim}], got {dims:?}",
                    in_dim = self.config.input_dim
                )))
            }
        };
        if let Some(bias) = &self.bias {
            output = output.broadcast_add(bias.as_tensor())?;
        }
        Ok(output)
    }
}

//! Stochastic latent process injected between the decoder and the output head.
//!
//! [`ProcessModel`] perturbs decoder states with (optionally Gaussian-process
//! modulated) noise, encodes them into a diagonal Gaussian latent, samples it
//! with the reparameterization trick and decodes the sample back to the model
//! width. When a target sequence is available it also reports a KL term
//! between a GP prior fitted on the target and the latent distribution.

pub mod conv_stack;
pub mod gp;
pub mod kl;
pub mod model;

pub use conv_stack::ConvStack;
pub use gp::{ConstantMean, GaussianProcess, GpDistribution, Kernel, MeanFunction, ScaledRbfKernel};
pub use kl::normal_kl;
pub use model::{ProcessModel, ProcessOutput};

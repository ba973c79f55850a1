//! Tuning knobs shared by the attention strategies.
//!
//! The defaults mirror the values the strategies are usually published with.
//! The struct deserialises with every field optional so model configuration
//! files only need to mention what they override.

use serde::{Deserialize, Serialize};

use super::AttentionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ProbSparse sampling factor `c`: `c * ceil(ln L)` keys are sampled and
    /// as many queries kept active.
    pub prob_sparse_factor: usize,
    /// Auto-correlation keeps `floor(factor * ln L)` lags.
    pub autocorrelation_factor: f64,
    /// Moving-average widths compared by the ACAT strategy.
    pub acat_kernel_sizes: Vec<usize>,
    /// Moving-average width used by the KittyCat strategy.
    pub kitty_cat_kernel: usize,
    /// Score written into masked positions before the softmax.
    pub mask_fill: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prob_sparse_factor: 5,
            autocorrelation_factor: 1.0,
            acat_kernel_sizes: vec![1, 3, 5],
            kitty_cat_kernel: 3,
            mask_fill: -1e9,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), AttentionError> {
        if self.prob_sparse_factor == 0 {
            return Err(AttentionError::InvalidConfig(
                "prob_sparse_factor must be greater than zero".into(),
            ));
        }
        if !(self.autocorrelation_factor > 0.0) {
            return Err(AttentionError::InvalidConfig(
                "autocorrelation_factor must be positive".into(),
            ));
        }
        if self.acat_kernel_sizes.is_empty() || self.acat_kernel_sizes.contains(&0) {
            return Err(AttentionError::InvalidConfig(
                "acat_kernel_sizes must be a non-empty list of positive widths".into(),
            ));
        }
        if self.kitty_cat_kernel == 0 {
            return Err(AttentionError::InvalidConfig(
                "kitty_cat_kernel must be greater than zero".into(),
            ));
        }
        if !self.mask_fill.is_finite() {
            return Err(AttentionError::InvalidConfig(
                "mask_fill must be finite".into(),
            ));
        }
        Ok(())
    }
}

use std::{fs, path::Path};

use attention::{AttentionKind, Config as AttentionConfig, MultiHeadConfig};
use embedding::DEFAULT_MAX_LEN;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Hyper-parameters of the forecasting transformer.
///
/// Deserialises from TOML or JSON; `attn_type` takes the strategy tags
/// (`basic_attn`, `autoformer`, `informer`, `LogTrans`, `ACAT`, `KittyCat`)
/// and unknown tags fail while parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    pub src_input_size: usize,
    pub tgt_input_size: usize,
    pub pred_len: usize,
    pub d_model: usize,
    pub d_ff: usize,
    pub d_k: usize,
    pub d_v: usize,
    pub n_heads: usize,
    /// Encoder depth.
    pub n_layers: usize,
    /// Decoder depth, independent of `n_layers`.
    #[serde(default = "default_decoder_layers")]
    pub decoder_layers: usize,
    pub attn_type: AttentionKind,
    #[serde(default)]
    pub seed: u64,
    /// Enables the stochastic process model and its KL term.
    #[serde(default)]
    pub process_model: bool,
    /// GP-modulated noise inside the process model.
    #[serde(default)]
    pub gp: bool,
    #[serde(default)]
    pub attention: AttentionConfig,
    /// Longest sequence the positional table covers.
    #[serde(default = "default_max_len")]
    pub max_len: usize,
}

fn default_decoder_layers() -> usize {
    1
}

fn default_max_len() -> usize {
    DEFAULT_MAX_LEN
}

impl TransformerConfig {
    /// Config with the usual defaults for the optional fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        src_input_size: usize,
        tgt_input_size: usize,
        pred_len: usize,
        d_model: usize,
        d_ff: usize,
        d_k: usize,
        d_v: usize,
        n_heads: usize,
        n_layers: usize,
        attn_type: AttentionKind,
    ) -> Self {
        Self {
            src_input_size,
            tgt_input_size,
            pred_len,
            d_model,
            d_ff,
            d_k,
            d_v,
            n_heads,
            n_layers,
            decoder_layers: default_decoder_layers(),
            attn_type,
            seed: 0,
            process_model: false,
            gp: false,
            attention: AttentionConfig::default(),
            max_len: default_max_len(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: TransformerConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(ModelError::ConfigFormat(format!(
                    "unsupported configuration extension '{other}'"
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Collects every violated constraint instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("src_input_size", self.src_input_size),
            ("tgt_input_size", self.tgt_input_size),
            ("pred_len", self.pred_len),
            ("d_model", self.d_model),
            ("d_ff", self.d_ff),
            ("d_k", self.d_k),
            ("d_v", self.d_v),
            ("n_heads", self.n_heads),
            ("n_layers", self.n_layers),
            ("decoder_layers", self.decoder_layers),
            ("max_len", self.max_len),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            }
        }

        if self.gp && !self.process_model {
            errors.push("gp requires process_model to be enabled".to_string());
        }

        if self.pred_len > self.max_len {
            errors.push(format!(
                "pred_len ({}) cannot exceed max_len ({})",
                self.pred_len, self.max_len
            ));
        }

        if let Err(err) = self.attention.validate() {
            errors.push(err.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Validation(errors))
        }
    }

    /// Attention block settings derived from the model dimensions.
    pub fn attention_block(&self) -> MultiHeadConfig {
        MultiHeadConfig {
            d_model: self.d_model,
            d_k: self.d_k,
            d_v: self.d_v,
            heads: self.n_heads,
            kind: self.attn_type,
            seed: self.seed,
            strategy: self.attention.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TransformerConfig {
        TransformerConfig::new(3, 1, 5, 16, 32, 4, 4, 4, 2, AttentionKind::Acat)
    }

    #[test]
    fn validate_collects_every_error() {
        let mut config = base();
        config.d_model = 0;
        config.n_heads = 0;
        config.gp = true;
        match config.validate() {
            Err(ModelError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn optional_fields_take_defaults() {
        let toml = r#"
            src_input_size = 3
            tgt_input_size = 1
            pred_len = 5
            d_model = 16
            d_ff = 32
            d_k = 4
            d_v = 4
            n_heads = 4
            n_layers = 2
            attn_type = "LogTrans"
        "#;
        let config: TransformerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.decoder_layers, 1);
        assert_eq!(config.max_len, DEFAULT_MAX_LEN);
        assert_eq!(config.attn_type, AttentionKind::LogSparse);
        assert!(!config.process_model);
        assert_eq!(config.attention, AttentionConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn attention_block_mirrors_model_dimensions() {
        let block = base().attention_block();
        assert_eq!((block.d_model, block.heads, block.d_k), (16, 4, 4));
        assert_eq!(block.kind, AttentionKind::Acat);
    }
}

//! Top-level encoder-decoder forecaster.

use candle_core::{Device, Error, Tensor, Var};
use layers::{Linear, LinearConfig, LinearInit, TensorRng};
use process::ProcessModel;

use crate::config::TransformerConfig;
use crate::decoder::{Decoder, DecoderLayerWeights};
use crate::encoder::Encoder;
use crate::error::ModelError;

/// Attention weights gathered during one forward pass, one entry per layer.
#[derive(Debug, Clone, Default)]
pub struct AttentionTrace {
    pub encoder: Vec<Tensor>,
    pub decoder: Vec<DecoderLayerWeights>,
}

/// Result of [`Transformer::forward`].
#[derive(Debug, Clone)]
pub struct Forecast {
    /// `(batch, pred_len, 1)`
    pub output: Tensor,
    /// Scalar KL term, `Some` exactly when the process model is enabled.
    pub kl_loss: Option<Tensor>,
    pub attention: AttentionTrace,
}

#[derive(Debug)]
pub struct Transformer {
    config: TransformerConfig,
    enc_embedding: Linear,
    dec_embedding: Linear,
    encoder: Encoder,
    decoder: Decoder,
    process: Option<ProcessModel>,
    projection: Linear,
}

impl Transformer {
    /// Builds every sub-module, drawing all initial weights from `rng`.
    ///
    /// `config.seed` and `rng` are independent: the seed only drives
    /// strategies that sample internally (ProbSparse key sampling), while
    /// `rng` alone determines the weights. Reproducing a model needs both.
    pub fn new(
        config: &TransformerConfig,
        device: &Device,
        rng: &mut TensorRng,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        let init = LinearInit::Default;
        let block = config.attention_block();

        let enc_embedding = Linear::with_init(
            LinearConfig::new(config.src_input_size, config.d_model),
            &init,
            rng,
            device,
        )?;
        let dec_embedding = Linear::with_init(
            LinearConfig::new(config.tgt_input_size, config.d_model),
            &init,
            rng,
            device,
        )?;
        let encoder = Encoder::new(
            block.clone(),
            config.d_ff,
            config.n_layers,
            config.max_len,
            rng,
            device,
        )?;
        let decoder = Decoder::new(
            block,
            config.d_ff,
            config.decoder_layers,
            config.max_len,
            rng,
            device,
        )?;
        let process = if config.process_model {
            Some(ProcessModel::new(config.d_model, config.gp, rng, device)?)
        } else {
            None
        };
        let projection = Linear::with_init(
            LinearConfig::without_bias(config.d_model, 1),
            &init,
            rng,
            device,
        )?;

        log::info!(
            "transformer built: attn={} d_model={} heads={} encoder_layers={} decoder_layers={} process_model={} gp={} strategy_seed={} init_seed={}",
            config.attn_type,
            config.d_model,
            config.n_heads,
            encoder.depth(),
            decoder.depth(),
            config.process_model,
            config.gp,
            config.seed,
            rng.seed()
        );

        Ok(Self {
            config: config.clone(),
            enc_embedding,
            dec_embedding,
            encoder,
            decoder,
            process,
            projection,
        })
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Batch-norm layers use batch statistics (the initial mode).
    pub fn train(&self) {
        self.set_training(true);
    }

    /// Batch-norm layers use their running statistics.
    pub fn eval(&self) {
        self.set_training(false);
    }

    fn set_training(&self, training: bool) {
        if let Some(process) = &self.process {
            process.set_training(training);
        }
        log::debug!("transformer mode: training={training}");
    }

    /// Every learned parameter, in construction order.
    pub fn parameters(&self) -> Vec<Var> {
        let mut params = self.enc_embedding.parameters();
        params.extend(self.dec_embedding.parameters());
        params.extend(self.encoder.parameters());
        params.extend(self.decoder.parameters());
        if let Some(process) = &self.process {
            params.extend(process.parameters());
        }
        params.extend(self.projection.parameters());
        params
    }

    /// Forecasts the last `pred_len` decoder steps.
    ///
    /// * `enc_inputs`: `(batch, src_len, src_input_size)`
    /// * `dec_inputs`: `(batch, tgt_len, tgt_input_size)` with `tgt_len >= pred_len`
    /// * `target`: optional `(batch, target_len, features)` conditioning the KL term
    ///
    /// `rng` supplies the process-model noise.
    pub fn forward(
        &self,
        enc_inputs: &Tensor,
        dec_inputs: &Tensor,
        target: Option<&Tensor>,
        rng: &mut TensorRng,
    ) -> Result<Forecast, ModelError> {
        let (enc_batch, _, _) = enc_inputs.dims3()?;
        let (dec_batch, tgt_len, _) = dec_inputs.dims3()?;
        if enc_batch != dec_batch {
            return Err(Error::Msg(format!(
                "encoder batch {enc_batch} does not match decoder batch {dec_batch}"
            ))
            .into());
        }
        if tgt_len < self.config.pred_len {
            return Err(Error::Msg(format!(
                "decoder length {tgt_len} is shorter than pred_len {}",
                self.config.pred_len
            ))
            .into());
        }

        let (memory, encoder_weights) =
            self.encoder.forward(&self.enc_embedding.forward(enc_inputs)?)?;
        let (mut hidden, decoder_weights) = self
            .decoder
            .forward(&self.dec_embedding.forward(dec_inputs)?, &memory)?;

        let kl_loss = match &self.process {
            Some(process) => {
                let out = process.forward(&hidden, target, rng)?;
                hidden = out.output;
                Some(out.kl_loss)
            }
            None => None,
        };

        let start = tgt_len - self.config.pred_len;
        let tail = hidden.narrow(1, start, self.config.pred_len)?;
        let output = self.projection.forward(&tail)?;
        log::debug!(
            "forecast: enc {:?} dec {:?} -> {:?}",
            enc_inputs.dims(),
            dec_inputs.dims(),
            output.dims()
        );

        Ok(Forecast {
            output,
            kl_loss,
            attention: AttentionTrace {
                encoder: encoder_weights,
                decoder: decoder_weights,
            },
        })
    }
}

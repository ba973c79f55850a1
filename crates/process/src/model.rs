//! Latent noise process with an optional GP-conditioned KL term.

use candle_core::{bail, DType, Device, Result, Tensor, Var, D};
use layers::{
    checks, LayerNorm, Linear, LinearConfig, LinearInit, NormConfig, NormalizationLayer, TensorRng,
};

use crate::conv_stack::ConvStack;
use crate::gp::GaussianProcess;
use crate::kl::normal_kl;

/// Scale applied to the injected noise.
const NOISE_SCALE: f64 = 0.1;

/// Result of one [`ProcessModel::forward`] call.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `(batch, seq, d)`, same shape as the input.
    pub output: Tensor,
    /// Scalar KL term; exactly zero when no target was supplied.
    pub kl_loss: Tensor,
}

/// GP-driven noise projections, present only in GP mode.
#[derive(Debug)]
struct GpNoise {
    prior: GaussianProcess,
    proj_mean: Linear,
    proj_var: Linear,
}

#[derive(Debug)]
pub struct ProcessModel {
    width: usize,
    encoder: ConvStack,
    musig: Linear,
    decoder: ConvStack,
    norm: LayerNorm,
    target_prior: GaussianProcess,
    gp_noise: Option<GpNoise>,
}

impl ProcessModel {
    /// Builds the process model for hidden width `width`; `gp` enables the
    /// GP-modulated noise injection.
    pub fn new(width: usize, gp: bool, rng: &mut TensorRng, device: &Device) -> Result<Self> {
        if width == 0 {
            bail!("process model width must be non-zero");
        }
        let encoder = ConvStack::new(width, rng, device)?;
        let musig = Linear::with_init(
            LinearConfig::new(width, 2 * width),
            &LinearInit::Default,
            rng,
            device,
        )?;
        let decoder = ConvStack::new(width, rng, device)?;
        let norm = LayerNorm::new(NormConfig::new(width), device)?;
        let target_prior = GaussianProcess::rbf(device)?;
        let gp_noise = if gp {
            Some(GpNoise {
                prior: GaussianProcess::rbf(device)?,
                proj_mean: Linear::with_init(
                    LinearConfig::new(1, width),
                    &LinearInit::Default,
                    rng,
                    device,
                )?,
                proj_var: Linear::with_init(
                    LinearConfig::new(1, width),
                    &LinearInit::Default,
                    rng,
                    device,
                )?,
            })
        } else {
            None
        };
        log::debug!("process model built: width={width} gp={gp}");
        Ok(Self {
            width,
            encoder,
            musig,
            decoder,
            norm,
            target_prior,
            gp_noise,
        })
    }

    pub fn uses_gp(&self) -> bool {
        self.gp_noise.is_some()
    }

    /// Switches both convolution stacks between batch and running statistics.
    pub fn set_training(&self, training: bool) {
        self.encoder.set_training(training);
        self.decoder.set_training(training);
    }

    pub fn parameters(&self) -> Vec<Var> {
        let mut params = self.encoder.parameters();
        params.extend(self.musig.parameters());
        params.extend(self.decoder.parameters());
        params.extend(self.norm.parameters());
        params.extend(self.target_prior.parameters());
        if let Some(noise) = &self.gp_noise {
            params.extend(noise.prior.parameters());
            params.extend(noise.proj_mean.parameters());
            params.extend(noise.proj_var.parameters());
        }
        params
    }

    /// Runs the process on `x: (batch, seq, d)`.
    ///
    /// Draws two standard-normal tensors from `rng`, in order: the input
    /// noise `eps` (shaped like `x`) and the latent sample `eps'`. The output
    /// is `LayerNorm(decoder(z) + x_noisy)`.
    ///
    /// `target: (batch, target_len, features)` with `target_len <= seq`
    /// enables the KL term against the last `target_len` latent steps.
    pub fn forward(
        &self,
        x: &Tensor,
        target: Option<&Tensor>,
        rng: &mut TensorRng,
    ) -> Result<ProcessOutput> {
        checks::expect_batch_seq_hidden("process.input", x, self.width)?;
        let eps = rng.randn_like(x)?;

        let noise = match &self.gp_noise {
            Some(gp) => {
                let dist = gp.prior.evaluate(x)?;
                let mean = gp.proj_mean.forward(&dist.mean().unsqueeze(2)?)?;
                let var = gp.proj_var.forward(&dist.variance()?.unsqueeze(2)?)?;
                (mean + var.mul(&eps)?.affine(NOISE_SCALE, 0.0)?)?
            }
            None => eps.affine(NOISE_SCALE, 0.0)?,
        };
        let x_noisy = (x + noise)?;

        let musig = self.musig.forward(&self.encoder.forward(&x_noisy)?)?;
        let mu = musig.narrow(D::Minus1, 0, self.width)?;
        let logvar = musig.narrow(D::Minus1, self.width, self.width)?;

        let std = logvar.affine(0.5, 0.0)?.exp()?;
        let z = (&mu + std.mul(&rng.randn_like(&std)?)?)?;

        // residual carries the noised input; `x` itself stays untouched
        let y = self.decoder.forward(&z)?;
        let output = self.norm.forward(&(y + &x_noisy)?)?;

        let kl_loss = match target {
            Some(target) => self.kl_term(target, &mu, &logvar)?,
            None => Tensor::zeros((), DType::F32, x.device())?,
        };
        log::trace!("process forward: input {:?} target {:?}", x.dims(), target.map(Tensor::dims));
        Ok(ProcessOutput { output, kl_loss })
    }

    fn kl_term(&self, target: &Tensor, mu: &Tensor, logvar: &Tensor) -> Result<Tensor> {
        checks::expect_rank("process.target", target, 3)?;
        let (batch, seq, _) = mu.dims3()?;
        let (target_batch, target_len, _) = target.dims3()?;
        if target_batch != batch {
            bail!("process.target batch {target_batch} does not match input batch {batch}");
        }
        if target_len == 0 || target_len > seq {
            bail!("process.target length {target_len} must be in 1..={seq}");
        }

        let prior = self.target_prior.evaluate(target)?;
        let mean_t = prior.mean().clone();
        // the prior variance fills the log-variance slot of the first Gaussian
        let var_t = prior.variance()?;

        let start = seq - target_len;
        let mu = mu.narrow(1, start, target_len)?.mean(D::Minus1)?;
        let logvar = logvar.narrow(1, start, target_len)?.mean(D::Minus1)?;
        normal_kl(&mean_t, &var_t, &mu, &logvar)?.mean_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Intermediate tensors rebuilt by hand from a replayed generator.
    struct Replay {
        mu: Tensor,
        logvar: Tensor,
        noisy_residual: Tensor,
        clean_residual: Tensor,
    }

    fn replay(model: &ProcessModel, x: &Tensor, rng: &mut TensorRng) -> Result<Replay> {
        let eps = rng.randn_like(x)?;
        let x_noisy = match &model.gp_noise {
            Some(gp) => {
                let dist = gp.prior.evaluate(x)?;
                let (batch, seq, _) = x.dims3()?;
                let mean = gp.proj_mean.forward(&dist.mean().reshape((batch, seq, 1))?)?;
                let var = gp.proj_var.forward(&dist.variance()?.reshape((batch, seq, 1))?)?;
                (x + (mean + ((var * &eps)? * 0.1)?)?)?
            }
            None => (x + (&eps * 0.1)?)?,
        };
        let musig = model.musig.forward(&model.encoder.forward(&x_noisy)?)?;
        let mu = musig.narrow(2, 0, model.width)?;
        let logvar = musig.narrow(2, model.width, model.width)?;
        let latent_eps = rng.randn_like(&mu)?;
        let z = (&mu + ((&logvar * 0.5)?.exp()? * latent_eps)?)?;
        let y = model.decoder.forward(&z)?;
        Ok(Replay {
            noisy_residual: model.norm.forward(&(&y + &x_noisy)?)?,
            clean_residual: model.norm.forward(&(&y + x)?)?,
            mu,
            logvar,
        })
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        (a - b)?.abs()?.max_all()?.to_scalar::<f32>()
    }

    #[test]
    fn residual_adds_the_noised_input() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(41);
        let model = ProcessModel::new(4, false, &mut rng, &device)?;
        model.set_training(false);
        let x = rng.randn((2, 6, 4), &device)?;

        let expected = replay(&model, &x, &mut rng.clone())?;
        let out = model.forward(&x, None, &mut rng)?;
        assert!(max_abs_diff(&out.output, &expected.noisy_residual)? < 1e-6);
        assert!(max_abs_diff(&out.output, &expected.clean_residual)? > 1e-3);
        Ok(())
    }

    #[test]
    fn gp_noise_projects_prior_moments() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(42);
        let model = ProcessModel::new(4, true, &mut rng, &device)?;
        model.set_training(false);
        let x = rng.randn((2, 5, 4), &device)?;

        let expected = replay(&model, &x, &mut rng.clone())?;
        let out = model.forward(&x, None, &mut rng)?;
        assert!(max_abs_diff(&out.output, &expected.noisy_residual)? < 1e-6);
        Ok(())
    }

    #[test]
    fn kl_uses_feature_mean_of_the_last_target_steps() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(43);
        let model = ProcessModel::new(4, false, &mut rng, &device)?;
        model.set_training(false);
        let x = rng.randn((2, 6, 4), &device)?;
        let target = rng.randn((2, 3, 1), &device)?;

        let expected = replay(&model, &x, &mut rng.clone())?;
        let kl = model.forward(&x, Some(&target), &mut rng)?.kl_loss.to_scalar::<f32>()?;

        let prior = model.target_prior.evaluate(&target)?;
        let window_kl = |start: usize| -> Result<f32> {
            let mu = expected.mu.narrow(1, start, 3)?.mean(2)?;
            let logvar = expected.logvar.narrow(1, start, 3)?.mean(2)?;
            normal_kl(prior.mean(), &prior.variance()?, &mu, &logvar)?
                .mean_all()?
                .to_scalar::<f32>()
        };
        let last = window_kl(3)?;
        assert!((kl - last).abs() < 1e-6);
        assert!((kl - window_kl(0)?).abs() > 1e-6);
        Ok(())
    }

    #[test]
    fn forward_preserves_shape_and_leaves_input_untouched() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(8);
        let model = ProcessModel::new(4, true, &mut rng, &device)?;
        let x = rng.randn((2, 6, 4), &device)?;
        let before = x.flatten_all()?.to_vec1::<f32>()?;
        let out = model.forward(&x, None, &mut rng)?;
        assert_eq!(out.output.dims(), &[2, 6, 4]);
        assert_eq!(x.flatten_all()?.to_vec1::<f32>()?, before);
        Ok(())
    }

    #[test]
    fn target_longer_than_input_is_rejected() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(8);
        let model = ProcessModel::new(4, false, &mut rng, &device)?;
        let x = rng.randn((1, 3, 4), &device)?;
        let target = rng.randn((1, 5, 1), &device)?;
        assert!(model.forward(&x, Some(&target), &mut rng).is_err());
        Ok(())
    }

    #[test]
    fn parameter_count_depends_on_gp_mode() -> Result<()> {
        let device = Device::Cpu;
        let mut rng = TensorRng::seeded(0);
        let plain = ProcessModel::new(4, false, &mut rng, &device)?;
        let gp = ProcessModel::new(4, true, &mut rng, &device)?;
        // extra GP prior (3) plus two biased projections (4)
        assert_eq!(gp.parameters().len(), plain.parameters().len() + 7);
        assert!(gp.uses_gp() && !plain.uses_gp());
        Ok(())
    }
}

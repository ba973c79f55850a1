//! Deterministic random source for parameter initialisation and noise.
//!
//! Candle's own `Tensor::rand`/`Tensor::randn` draw from thread-local state on
//! the CPU backend, which makes two models built from the same seed diverge.
//! [`TensorRng`] samples on the host from a seeded [`StdRng`] and uploads the
//! values, so the whole computation graph is reproducible from one seed and
//! independent models never share generator state.

use candle_core::{Device, Error, Result, Shape, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{StandardNormal, Uniform};

/// Seeded generator producing `f32` tensors.
#[derive(Debug, Clone)]
pub struct TensorRng {
    seed: u64,
    rng: StdRng,
}

impl TensorRng {
    /// Creates a generator whose stream is fully determined by `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed the generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Samples `U(low, high)` values shaped as `shape`.
    pub fn uniform<S: Into<Shape>>(
        &mut self,
        low: f32,
        high: f32,
        shape: S,
        device: &Device,
    ) -> Result<Tensor> {
        if !(low < high) || !low.is_finite() || !high.is_finite() {
            return Err(Error::Msg(format!(
                "uniform sampling requires finite low < high, got [{low}, {high})"
            )));
        }
        let shape = shape.into();
        let dist = Uniform::new(low, high);
        let data: Vec<f32> = (0..shape.elem_count())
            .map(|_| self.rng.sample(dist))
            .collect();
        Tensor::from_vec(data, shape, device)
    }

    /// Samples `U(-bound, bound)` values shaped as `shape`.
    pub fn symmetric_uniform<S: Into<Shape>>(
        &mut self,
        bound: f32,
        shape: S,
        device: &Device,
    ) -> Result<Tensor> {
        self.uniform(-bound, bound, shape, device)
    }

    /// Samples standard normal values shaped as `shape`.
    pub fn randn<S: Into<Shape>>(&mut self, shape: S, device: &Device) -> Result<Tensor> {
        let shape = shape.into();
        let data: Vec<f32> = (0..shape.elem_count())
            .map(|_| self.rng.sample::<f32, _>(StandardNormal))
            .collect();
        Tensor::from_vec(data, shape, device)
    }

    /// Samples standard normal values with the shape and device of `like`.
    pub fn randn_like(&mut self, like: &Tensor) -> Result<Tensor> {
        self.randn(like.shape().clone(), like.device())
    }

    /// Draws `count` indices uniformly from `0..upper` (with replacement).
    pub fn indices(&mut self, upper: usize, count: usize) -> Result<Vec<usize>> {
        if upper == 0 {
            return Err(Error::Msg("cannot sample indices from an empty range".into()));
        }
        Ok((0..count).map(|_| self.rng.gen_range(0..upper)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_produces_identical_streams() -> Result<()> {
        let device = Device::Cpu;
        let mut a = TensorRng::seeded(7);
        let mut b = TensorRng::seeded(7);
        let xa = a.randn((3, 4), &device)?.flatten_all()?.to_vec1::<f32>()?;
        let xb = b.randn((3, 4), &device)?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(xa, xb);

        let mut c = TensorRng::seeded(8);
        let xc = c.randn((3, 4), &device)?.flatten_all()?.to_vec1::<f32>()?;
        assert_ne!(xa, xc);
        Ok(())
    }

    #[test]
    fn uniform_respects_bounds() -> Result<()> {
        let mut rng = TensorRng::seeded(1);
        let values = rng
            .symmetric_uniform(0.25, 512, &Device::Cpu)?
            .to_vec1::<f32>()?;
        assert!(values.iter().all(|v| (-0.25..0.25).contains(v)));
        assert!(rng.uniform(1.0, 1.0, 4, &Device::Cpu).is_err());
        Ok(())
    }

    #[test]
    fn indices_stay_in_range() -> Result<()> {
        let mut rng = TensorRng::seeded(3);
        let picks = rng.indices(5, 64)?;
        assert_eq!(picks.len(), 64);
        assert!(picks.iter().all(|&i| i < 5));
        assert!(rng.indices(0, 1).is_err());
        Ok(())
    }
}

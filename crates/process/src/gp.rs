//! Exact Gaussian-process prior evaluated on batches of point sets.
//!
//! Every batch element is an independent set of `n` points of dimension `f`,
//! shaped `(batch, n, f)`. Evaluating the prior yields the mean vector and the
//! full covariance matrix for each set.

use candle_core::{DType, Device, Result, Tensor, Var, D};
use layers::checks;

/// Prior mean over a point set.
pub trait MeanFunction: Send + Sync {
    /// `(batch, n, f)` points to `(batch, n)` means.
    fn mean(&self, points: &Tensor) -> Result<Tensor>;

    fn parameters(&self) -> Vec<Var>;
}

/// Positive semi-definite covariance function.
pub trait Kernel: Send + Sync {
    /// `(batch, n, f)` and `(batch, m, f)` points to a `(batch, n, m)` matrix.
    fn covariance(&self, left: &Tensor, right: &Tensor) -> Result<Tensor>;

    fn parameters(&self) -> Vec<Var>;
}

/// Learnable constant mean, initialised at zero.
#[derive(Debug, Clone)]
pub struct ConstantMean {
    constant: Var,
}

impl ConstantMean {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            constant: Var::zeros(1, DType::F32, device)?,
        })
    }
}

impl MeanFunction for ConstantMean {
    fn mean(&self, points: &Tensor) -> Result<Tensor> {
        checks::expect_rank("gp.points", points, 3)?;
        let (batch, n, _) = points.dims3()?;
        Tensor::ones((batch, n), points.dtype(), points.device())?
            .broadcast_mul(self.constant.as_tensor())
    }

    fn parameters(&self) -> Vec<Var> {
        vec![self.constant.clone()]
    }
}

/// `k(a, b) = s * exp(-|a - b|^2 / (2 l^2))` with `s = softplus(raw_outputscale)`
/// and `l = softplus(raw_lengthscale)`. Raw parameters start at zero.
#[derive(Debug, Clone)]
pub struct ScaledRbfKernel {
    raw_outputscale: Var,
    raw_lengthscale: Var,
}

impl ScaledRbfKernel {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            raw_outputscale: Var::zeros(1, DType::F32, device)?,
            raw_lengthscale: Var::zeros(1, DType::F32, device)?,
        })
    }

    pub fn outputscale(&self) -> Result<Tensor> {
        softplus(self.raw_outputscale.as_tensor())
    }

    pub fn lengthscale(&self) -> Result<Tensor> {
        softplus(self.raw_lengthscale.as_tensor())
    }
}

impl Kernel for ScaledRbfKernel {
    fn covariance(&self, left: &Tensor, right: &Tensor) -> Result<Tensor> {
        checks::expect_rank("kernel.left", left, 3)?;
        checks::expect_rank("kernel.right", right, 3)?;
        let left_sq = left.sqr()?.sum_keepdim(D::Minus1)?;
        let right_sq = right.sqr()?.sum_keepdim(D::Minus1)?.transpose(1, 2)?;
        let cross = left.contiguous()?.matmul(&right.transpose(1, 2)?.contiguous()?)?;
        let distance = left_sq
            .broadcast_add(&right_sq)?
            .sub(&cross.affine(2.0, 0.0)?)?
            .maximum(0f32)?;

        let two_l_sq = self.lengthscale()?.sqr()?.affine(2.0, 0.0)?;
        distance
            .broadcast_div(&two_l_sq)?
            .neg()?
            .exp()?
            .broadcast_mul(&self.outputscale()?)
    }

    fn parameters(&self) -> Vec<Var> {
        vec![self.raw_outputscale.clone(), self.raw_lengthscale.clone()]
    }
}

/// Mean and covariance of the prior on one batch of point sets.
#[derive(Debug, Clone)]
pub struct GpDistribution {
    mean: Tensor,
    covariance: Tensor,
}

impl GpDistribution {
    /// `(batch, n)`
    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    /// `(batch, n, n)`
    pub fn covariance(&self) -> &Tensor {
        &self.covariance
    }

    /// Marginal variances, the covariance diagonal `(batch, n)`.
    pub fn variance(&self) -> Result<Tensor> {
        let (batch, n, _) = self.covariance.dims3()?;
        let diagonal: Vec<u32> = (0..n).map(|i| (i * (n + 1)) as u32).collect();
        let diagonal = Tensor::from_vec(diagonal, n, self.covariance.device())?;
        self.covariance
            .reshape((batch, n * n))?
            .index_select(&diagonal, 1)
    }
}

/// Exact GP prior combining a mean function and a kernel.
pub struct GaussianProcess {
    mean: Box<dyn MeanFunction>,
    kernel: Box<dyn Kernel>,
}

impl std::fmt::Debug for GaussianProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianProcess").finish_non_exhaustive()
    }
}

impl GaussianProcess {
    pub fn new(mean: Box<dyn MeanFunction>, kernel: Box<dyn Kernel>) -> Self {
        Self { mean, kernel }
    }

    /// Constant mean with a scaled RBF kernel.
    pub fn rbf(device: &Device) -> Result<Self> {
        Ok(Self::new(
            Box::new(ConstantMean::new(device)?),
            Box::new(ScaledRbfKernel::new(device)?),
        ))
    }

    pub fn evaluate(&self, points: &Tensor) -> Result<GpDistribution> {
        Ok(GpDistribution {
            mean: self.mean.mean(points)?,
            covariance: self.kernel.covariance(points, points)?,
        })
    }

    pub fn parameters(&self) -> Vec<Var> {
        let mut params = self.mean.parameters();
        params.extend(self.kernel.parameters());
        params
    }
}

/// `ln(1 + e^x)`
fn softplus(raw: &Tensor) -> Result<Tensor> {
    raw.exp()?.affine(1.0, 1.0)?.log()
}

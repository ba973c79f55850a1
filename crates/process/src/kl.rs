use candle_core::{Result, Tensor};

/// Elementwise KL divergence `KL(N(m1, e^lv1) || N(m2, e^lv2))`:
///
/// `0.5 * (-1 + lv2 - lv1 + exp(lv1 - lv2) + (m1 - m2)^2 * exp(-lv2))`.
///
/// All four tensors must share one shape.
pub fn normal_kl(mean1: &Tensor, logvar1: &Tensor, mean2: &Tensor, logvar2: &Tensor) -> Result<Tensor> {
    let log_ratio = (logvar1 - logvar2)?;
    let squared = (mean1 - mean2)?.sqr()?;
    let scaled = (squared * logvar2.neg()?.exp()?)?;
    let sum = ((log_ratio.exp()? - &log_ratio)? + scaled)?;
    sum.affine(0.5, -0.5)
}

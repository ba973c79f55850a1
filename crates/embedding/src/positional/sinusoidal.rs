//! Fixed sinusoidal positional encoding.
//!
//! The table is computed once for `max_len` positions. Entry `(pos, i)` is
//! `sin(pos / 10000^(2 * floor(i / 2) / hidden))` for even feature indices and
//! the matching cosine for odd ones.

use candle_core::{bail, Device, Result, Tensor};

/// Number of positions precomputed when no explicit length is requested.
pub const DEFAULT_MAX_LEN: usize = 1000;

const BASE: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct PositionalEncoding {
    hidden_dim: usize,
    max_len: usize,
    /// `(1, max_len, hidden_dim)`
    table: Tensor,
}

impl PositionalEncoding {
    /// Builds the table with [`DEFAULT_MAX_LEN`] positions.
    pub fn new(hidden_dim: usize, device: &Device) -> Result<Self> {
        Self::with_max_len(hidden_dim, DEFAULT_MAX_LEN, device)
    }

    pub fn with_max_len(hidden_dim: usize, max_len: usize, device: &Device) -> Result<Self> {
        if hidden_dim == 0 {
            bail!("positional encoding requires hidden_dim > 0");
        }
        if max_len == 0 {
            bail!("positional encoding requires max_len > 0");
        }

        let mut data = Vec::with_capacity(max_len * hidden_dim);
        for pos in 0..max_len {
            for i in 0..hidden_dim {
                let exponent = (i - i % 2) as f64 / hidden_dim as f64;
                let angle = pos as f64 / BASE.powf(exponent);
                let value = if i % 2 == 0 { angle.sin() } else { angle.cos() };
                data.push(value as f32);
            }
        }
        let table = Tensor::from_vec(data, (1, max_len, hidden_dim), device)?;
        log::debug!("positional encoding table built: max_len={max_len} hidden={hidden_dim}");

        Ok(Self {
            hidden_dim,
            max_len,
            table,
        })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// The first `seq_len` rows of the table, shaped `(1, seq_len, hidden)`.
    pub fn slice(&self, seq_len: usize) -> Result<Tensor> {
        if seq_len > self.max_len {
            bail!(
                "sequence length {seq_len} exceeds positional encoding max_len {}",
                self.max_len
            );
        }
        self.table.narrow(1, 0, seq_len)
    }

    /// Returns `input + table[:, :seq, :]` for `input` shaped `(batch, seq, hidden)`.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (_, seq_len, hidden) = input.dims3()?;
        if hidden != self.hidden_dim {
            bail!(
                "positional encoding expects hidden {} but input has {hidden}",
                self.hidden_dim
            );
        }
        let signal = self.slice(seq_len)?.to_device(input.device())?;
        input.broadcast_add(&signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn first_rows_match_closed_form() -> Result<()> {
        let pe = PositionalEncoding::with_max_len(4, 8, &Device::Cpu)?;
        let rows = pe.slice(2)?.squeeze(0)?.to_vec2::<f32>()?;
        assert_eq!(rows[0], vec![0.0, 1.0, 0.0, 1.0]);

        let expected = [
            1f64.sin(),
            1f64.cos(),
            (1.0 / 100.0f64).sin(),
            (1.0 / 100.0f64).cos(),
        ];
        for (got, want) in rows[1].iter().zip(expected) {
            assert!((*got as f64 - want).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn odd_hidden_sizes_are_supported() -> Result<()> {
        let pe = PositionalEncoding::with_max_len(5, 3, &Device::Cpu)?;
        let x = Tensor::zeros((1, 3, 5), DType::F32, &Device::Cpu)?;
        assert_eq!(pe.forward(&x)?.dims(), &[1, 3, 5]);
        Ok(())
    }

    #[test]
    fn overflowing_max_len_fails() -> Result<()> {
        let pe = PositionalEncoding::with_max_len(4, 3, &Device::Cpu)?;
        let x = Tensor::zeros((1, 4, 4), DType::F32, &Device::Cpu)?;
        assert!(pe.forward(&x).is_err());
        Ok(())
    }
}

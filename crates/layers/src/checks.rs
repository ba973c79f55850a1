//! Lightweight validation helpers shared across layer components.
//!
//! These routines provide concise shape assertions that can be wired into
//! constructors or forward paths. They return `candle_core::Result<()>` so call
//! sites can propagate errors without panicking.

use candle_core::{Error, Result, Tensor};

/// Ensures a tensor has exactly `rank` dimensions.
pub fn expect_rank(name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let dims = tensor.dims();
    if dims.len() == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected rank {rank}, got shape {dims:?}"
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name}: expected shape {expected:?}, got {actual:?}"
        )))
    }
}

/// Validates the `(batch, seq, hidden)` convention with a known hidden size.
pub fn expect_batch_seq_hidden(name: &str, tensor: &Tensor, hidden: usize) -> Result<()> {
    match tensor.dims() {
        [_, _, actual_hidden] if *actual_hidden == hidden => Ok(()),
        dims => Err(Error::Msg(format!(
            "{name}: expected (batch, seq, {hidden}) layout, got {dims:?}"
        ))),
    }
}

/// Validates the channel-first `(batch, channels, seq)` convention.
pub fn expect_batch_channels_seq(name: &str, tensor: &Tensor, channels: usize) -> Result<()> {
    match tensor.dims() {
        [_, actual, _] if *actual == channels => Ok(()),
        dims => Err(Error::Msg(format!(
            "{name}: expected (batch, {channels}, seq) layout, got {dims:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn shape_helpers_report_mismatches() -> Result<()> {
        let tensor = Tensor::zeros((2, 3, 4), DType::F32, &Device::Cpu)?;
        expect_rank("t", &tensor, 3)?;
        expect_shape("t", &tensor, &[2, 3, 4])?;
        expect_batch_seq_hidden("t", &tensor, 4)?;
        expect_batch_channels_seq("t", &tensor, 3)?;

        assert!(expect_rank("t", &tensor, 2).is_err());
        assert!(expect_batch_seq_hidden("t", &tensor, 3).is_err());
        let err = expect_shape("probe", &tensor, &[2, 3]).unwrap_err();
        assert!(err.to_string().contains("probe"));
        Ok(())
    }
}

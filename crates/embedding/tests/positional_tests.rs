use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use embedding::{PositionalEncoding, DEFAULT_MAX_LEN};

#[test]
fn zero_input_is_deterministic() -> Result<()> {
    let device = Device::Cpu;
    let pe = PositionalEncoding::new(16, &device)?;
    assert_eq!(pe.max_len(), DEFAULT_MAX_LEN);

    let zeros = Tensor::zeros((2, 12, 16), DType::F32, &device)?;
    let first = pe.forward(&zeros)?.flatten_all()?.to_vec1::<f32>()?;
    let second = pe.forward(&zeros)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn shorter_lengths_are_prefixes_of_longer_ones() -> Result<()> {
    let device = Device::Cpu;
    let pe = PositionalEncoding::new(8, &device)?;

    let short = pe.forward(&Tensor::zeros((1, 5, 8), DType::F32, &device)?)?;
    let long = pe.forward(&Tensor::zeros((1, 9, 8), DType::F32, &device)?)?;
    assert_ne!(short.dims(), long.dims());

    let prefix = long.narrow(1, 0, 5)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(short.flatten_all()?.to_vec1::<f32>()?, prefix);

    let tail = long.narrow(1, 5, 4)?.flatten_all()?.to_vec1::<f32>()?;
    let head = long.narrow(1, 0, 4)?.flatten_all()?.to_vec1::<f32>()?;
    assert_ne!(tail, head);
    Ok(())
}

#[test]
fn signal_is_added_to_input() -> Result<()> {
    let device = Device::Cpu;
    let pe = PositionalEncoding::with_max_len(4, 4, &device)?;
    let ones = Tensor::ones((1, 1, 4), DType::F32, &device)?;
    let out = pe.forward(&ones)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(out, vec![1.0, 2.0, 1.0, 2.0]);
    Ok(())
}

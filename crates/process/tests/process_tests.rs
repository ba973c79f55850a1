use candle_core::Device;
use layers::TensorRng;
use process::ProcessModel;

#[test]
fn kl_is_exactly_zero_without_target() -> anyhow::Result<()> {
    let device = Device::Cpu;
    for gp in [false, true] {
        let mut rng = TensorRng::seeded(12);
        let model = ProcessModel::new(8, gp, &mut rng, &device)?;
        let x = rng.randn((2, 5, 8), &device)?;
        let out = model.forward(&x, None, &mut rng)?;
        assert_eq!(out.kl_loss.to_scalar::<f32>()?, 0.0, "gp={gp}");
        assert_eq!(out.output.dims(), &[2, 5, 8]);
    }
    Ok(())
}

#[test]
fn kl_with_target_is_finite_and_non_negative() -> anyhow::Result<()> {
    let device = Device::Cpu;
    let mut rng = TensorRng::seeded(30);
    let model = ProcessModel::new(8, false, &mut rng, &device)?;
    let x = rng.randn((2, 5, 8), &device)?;
    let target = rng.randn((2, 5, 1), &device)?;
    let kl = model.forward(&x, Some(&target), &mut rng)?.kl_loss.to_scalar::<f32>()?;
    assert!(kl.is_finite());
    assert!(kl >= -1e-5);
    Ok(())
}

#[test]
fn gp_mode_accepts_shorter_targets() -> anyhow::Result<()> {
    let device = Device::Cpu;
    let mut rng = TensorRng::seeded(31);
    let model = ProcessModel::new(4, true, &mut rng, &device)?;
    let x = rng.randn((3, 7, 4), &device)?;
    let target = rng.randn((3, 2, 1), &device)?;
    let out = model.forward(&x, Some(&target), &mut rng)?;
    assert!(out.kl_loss.to_scalar::<f32>()?.is_finite());
    Ok(())
}

#[test]
fn seeded_runs_are_reproducible() -> anyhow::Result<()> {
    let device = Device::Cpu;
    let run = || -> anyhow::Result<Vec<f32>> {
        let mut rng = TensorRng::seeded(99);
        let model = ProcessModel::new(4, true, &mut rng, &device)?;
        let x = rng.randn((1, 4, 4), &device)?;
        Ok(model.forward(&x, None, &mut rng)?.output.flatten_all()?.to_vec1::<f32>()?)
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn eval_mode_switches_to_running_statistics() -> anyhow::Result<()> {
    let device = Device::Cpu;
    let mut rng = TensorRng::seeded(5);
    let model = ProcessModel::new(4, false, &mut rng, &device)?;
    let x = rng.randn((1, 6, 4), &device)?;
    let mut train_rng = TensorRng::seeded(1);
    let train = model.forward(&x, None, &mut train_rng)?.output;
    model.set_training(false);
    let mut eval_rng = TensorRng::seeded(1);
    let eval = model.forward(&x, None, &mut eval_rng)?.output;
    let diff = (train - eval)?.abs()?.max_all()?.to_scalar::<f32>()?;
    assert!(diff > 0.0);
    Ok(())
}

//! Builds the `[∇; I]` operator of a TV-L2 denoising problem, prepares it on
//! the GPU and checks the device result against the host path.

use pdhg_linop::{
    BlockGradient3D, BlockIdentity, DeviceOptions, DiagonalPreconditioner, GpuDevice,
    LinearOperator, PdhgCoreError,
};
use std::time::Instant;

fn main() -> Result<(), PdhgCoreError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu", log::LevelFilter::Off)
        .filter_module("naga", log::LevelFilter::Off)
        .init();

    let (nx, ny, nl) = (256, 256, 4);
    let n = nx * ny * nl;
    log::info!("Building TV operator over {}x{}x{} (label_first)", nx, ny, nl);

    let op = LinearOperator::<f32>::new(vec![
        Box::new(BlockGradient3D::new(0, 0, nx, ny, nl, true)?),
        Box::new(BlockIdentity::new(3 * n, 0, n)?),
    ])?;
    log::info!("Operator dims: {}x{}", op.nrows(), op.ncols());
    log::info!("Estimated norm: {}", op.normest_host(1e-4, 100)?);

    let precond = DiagonalPreconditioner::compute(&op, 1.0)?;
    let min_tau = precond.right.iter().cloned().fold(f32::INFINITY, f32::min);
    log::info!("Smallest primal step size: {}", min_tau);

    let device = GpuDevice::new_blocking(&DeviceOptions::default())?;
    op.prepare(&device)?;

    // A smooth ramp per label.
    let x: Vec<f32> = (0..n).map(|i| ((i % 97) as f32) / 97.0).collect();
    let x_gpu = device.create_vector("x", &x)?;
    let mut y_gpu = device.create_zeroed_vector::<f32>("y", op.nrows())?;
    let mut xt_gpu = device.create_zeroed_vector::<f32>("xt", op.ncols())?;

    let start_time = Instant::now();
    let iterations = 50;
    for _ in 0..iterations {
        op.eval(&device, &mut y_gpu, &x_gpu)?;
        op.eval_adjoint(&device, &mut xt_gpu, &y_gpu)?;
    }
    let xt = xt_gpu.read_contents_blocking()?;
    let elapsed = start_time.elapsed();
    log::info!(
        "{} forward/adjoint pairs in {:.2?} ({:.2?} per pair)",
        iterations,
        elapsed,
        elapsed / iterations
    );

    let mut y = vec![0.0; op.nrows()];
    op.eval_host(&mut y, &x)?;
    let mut expected = vec![0.0; op.ncols()];
    op.eval_adjoint_host(&mut expected, &y)?;
    let max_diff = xt
        .iter()
        .zip(&expected)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    log::info!("Max |device - host| of AᵗA x: {:e}", max_diff);

    let stats = device.get_transfer_stats();
    log::info!(
        "Transfers: {} bytes to GPU, {} bytes from GPU",
        stats.bytes_to_gpu,
        stats.bytes_from_gpu
    );
    Ok(())
}

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn};
use nalgebra::SymmetricEigen;
use ndarray::{Array1, Array2};

use geokernels::backend::array_to_dmatrix;
use geokernels::{RandomState, RunConfig, SpaceConfig};

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

fn parse_args() -> Result<Option<PathBuf>> {
    let mut args = env::args().skip(1);
    let path = args.next().map(PathBuf::from);
    if let Some(extra) = args.next() {
        anyhow::bail!("Unexpected extra argument: {extra}");
    }
    Ok(path)
}

fn demo_config() -> RunConfig {
    RunConfig {
        space: SpaceConfig::Circle,
        kernel: Default::default(),
        params: None,
        options: Default::default(),
        num_points: 64,
        seed: 0,
    }
}

fn main() -> Result<()> {
    init_logging();
    let config = match parse_args()? {
        Some(path) => RunConfig::from_path(&path)?,
        None => {
            info!("No run config given, using the circle demo");
            demo_config()
        }
    };

    let start = Instant::now();
    let space = config.space_handle()?;
    let kernel = config.kernel(&space)?;
    let (initial, state) = kernel
        .init_params_and_state()
        .with_context(|| format!("initialize kernel state on {}", space.name()))?;
    let params = config.params.clone().unwrap_or(initial);
    info!(
        "Space {} (dimension {}): {} state ready in {:?}",
        space.name(),
        space.dimension(),
        state.variant_name(),
        start.elapsed()
    );

    let (_, x) = config
        .space
        .sample_points(&space, RandomState::new(config.seed), config.num_points)
        .with_context(|| format!("sample {} points on {}", config.num_points, space.name()))?;

    let start = Instant::now();
    let k = kernel
        .k(&params, &state, &x, None)
        .with_context(|| format!("evaluate K on {} points", x.nrows()))?;
    let k_diag = kernel
        .k_diag(&params, &state, &x)
        .with_context(|| format!("evaluate K_diag on {} points", x.nrows()))?;
    info!("Kernel evaluation on {} points took {:?}", x.nrows(), start.elapsed());

    report(&k, &k_diag);
    Ok(())
}

fn report(k: &Array2<f64>, k_diag: &Array1<f64>) {
    let diag_gap = k
        .diag()
        .iter()
        .zip(k_diag.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    let asymmetry = (k - &k.t()).mapv(f64::abs).fold(0.0, |acc: f64, v| acc.max(*v));
    let min_eigenvalue = SymmetricEigen::new(array_to_dmatrix(k))
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);

    info!(
        "K: mean variance {:.6}, max |diag(K) - K_diag| {:.3e}, max asymmetry {:.3e}",
        k_diag.mean().unwrap_or(f64::NAN),
        diag_gap,
        asymmetry
    );
    info!("K: smallest eigenvalue {:.3e}", min_eigenvalue);
    if min_eigenvalue < -1e-6 {
        warn!("K is not positive semi-definite within tolerance");
    }
}

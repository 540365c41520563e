//! OBD-II gateway entry point

use std::path::PathBuf;

use anyhow::Context;
use gateway::{init_logging, run, GatewayConfig};
use tracing::info;

/// `--config <path>` from the command line
fn config_path() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config needs a path")?;
                path = Some(PathBuf::from(value));
            }
            other => anyhow::bail!("unknown argument '{}'", other),
        }
    }
    Ok(path)
}

fn main() -> anyhow::Result<()> {
    let path = config_path()?;
    let config = GatewayConfig::load(path.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log)?;

    info!("=== OBD-II Gateway v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Profile {:?}, data source {:?}",
        config.session.profile, config.simulation.source
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(run(config))
}

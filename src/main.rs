// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use structopt::StructOpt;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[macro_use]
mod frame;
mod camera;
mod fusion;
mod pipeline;
mod render;
mod settings;
mod slot;
mod stream;
mod temperature;
mod util;

use crate::pipeline::Pipeline;
use crate::settings::{Args, Settings};

fn init_logging(args: &Args) {
    // RUST_LOG wins over the -v flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("thermal_fusion={}", args.log_level())));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Settings::from_path(&args.config_path)?;
    debug!(?config, "loaded configuration");
    let app = Pipeline::new(config).context("Unable to start")?;
    app.run().await
}

#[tokio::main]
async fn main() {
    let args = Args::from_args();
    init_logging(&args);
    if let Err(err) = run(args).await {
        error!("{:?}", err);
        std::process::exit(1);
    }
}

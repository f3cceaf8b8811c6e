use std::path::PathBuf;

use clap::Parser;
use tracing::Subscriber;
use tracing_log::AsTrace;
use tracing_subscriber::{fmt, EnvFilter};

use crate::commands::Commands;

#[derive(Parser)]
#[command(name = "prism", author, version, about = "Deployment orchestration for the prism platform", long_about = None)]
#[command(propagate_version = true)]
pub struct PrismArgs {
    #[arg(long)]
    #[arg(global = true)]
    #[arg(default_value = ".")]
    #[arg(help = "Base directory holding deployments/, manifests/, artifacts/ and reports/.")]
    pub base_dir: PathBuf,

    #[clap(help = "Logging verbosity.")]
    #[command(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

impl PrismArgs {
    pub fn init_logging(&self) -> Result<(), Box<dyn std::error::Error>> {
        let default_directive = self.verbose.log_level_filter().as_trace().to_string();

        let builder = fmt::Subscriber::builder().with_env_filter(
            EnvFilter::try_from_default_env().or(EnvFilter::try_new(default_directive))?,
        );

        let subscriber: Box<dyn Subscriber + Send + Sync> = Box::new(builder.finish());

        Ok(tracing::subscriber::set_global_default(subscriber)?)
    }
}

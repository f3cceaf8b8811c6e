#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::process::ExitCode;

use args::PrismArgs;
use clap::Parser;

mod args;
mod commands;

#[tokio::main]
async fn main() -> ExitCode {
    let args = PrismArgs::parse();
    let _ = args.init_logging();

    match commands::run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

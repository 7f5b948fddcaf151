use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cnc_controller::{
    cnc::dispatch::Dispatcher,
    config::ControllerConfig,
    link::connection::{open_serial, run_link, LoggingDriver},
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version = "0.1.0",
    about = "Serve the framed G-code protocol on a serial port.",
    long_about = None
)]
struct Args {
    /// Serial device to listen on
    #[arg(short, long)]
    port: String,
    #[arg(short, long, default_value_t = 115200)]
    baud: u32,
    /// JSON configuration file; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("Starting CNC controller with configuration: {:?}", args);
    tracing_subscriber::fmt::init();

    let config = ControllerConfig::load(args.config.as_deref()).await?;
    info!(?config, "configuration loaded");
    println!("Opening port...");
    let (reader, writer) = open_serial(&args.port, args.baud)?;
    let dispatcher = run_link(
        reader,
        writer,
        Dispatcher::new(&config),
        &LoggingDriver,
        &config.link,
    )
    .await
    .context("Link failed")?;
    let machine = serde_json::to_string(dispatcher.machine())?;
    info!(%machine, "link closed");
    Ok(())
}

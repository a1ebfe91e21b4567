#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use posta::{
    Controller, Posta,
    config::{CONFIG_ENV, DEFAULT_PATHS, find_config_file},
};

/// Accept mail over SMTP and hand it to a pool of delivery workers
#[derive(Parser, Debug)]
#[command(name = "posta")]
#[command(version)]
struct Cli {
    /// Configuration file (otherwise `$POSTA_CONFIG`, `./posta.config.ron`
    /// or `/etc/posta/posta.config.ron`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let defaults = DEFAULT_PATHS.map(PathBuf::from);
    let path = find_config_file(cli.config, std::env::var(CONFIG_ENV).ok(), &defaults)?;
    let mut config = match path {
        Some(path) => Posta::load(&path)?,
        None => Posta::default(),
    };

    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    Controller::new(config)?.run().await
}

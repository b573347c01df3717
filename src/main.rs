use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

mod models;
mod repositories;
pub mod services;
pub mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "clientbook.toml")]
    config: String,
    /// Overrides `server.listen` from the config file.
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log4rs)?;

    let mut settings =
        settings::Settings::load(&args.config).context("Could not load config file.")?;
    if let Some(listen) = args.listen {
        settings.server.listen = listen;
    }

    log::info!("Starting clientbook services.");
    services::start_services(settings)
        .await
        .context("Could not start services.")
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}

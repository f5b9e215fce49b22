use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use uplink::ValidatorNode;
use uplink::config::{ConfigFile, ValidatorConfig};
use uplink::crypto::{KeyPair, generate_keypair, load_keypair, parse_secret_key, save_keypair};

/// Takes precedence over `identity.keypair_path`
const SECRET_KEY_ENV: &str = "UPLINK_SECRET_KEY";

#[derive(Parser)]
#[command(name = "uplink-validator", version, about = "Runs uptime checks for an uplink hub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the hub and serve check requests (default)
    Run {
        /// Path to validator.toml, created with defaults when missing
        #[arg(long, env = "UPLINK_VALIDATOR_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Write a fresh secret key and print its public key
    Keygen {
        #[arg(long, default_value = "validator.key")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    match Cli::parse().command.unwrap_or(Command::Run { config: None }) {
        Command::Run { config } => run(config).await,
        Command::Keygen { out } => keygen(&out),
    }
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = ValidatorConfig::from_config(config_path.as_ref())?;
    info!("{config}");

    let keypair = load_identity(&config)?;
    let node = ValidatorNode::new(&config, keypair)?;

    tokio::select! {
        result = node.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down validator");
            Ok(())
        }
    }
}

fn load_identity(config: &ValidatorConfig) -> Result<KeyPair> {
    match env::var(SECRET_KEY_ENV) {
        Ok(secret) => parse_secret_key(secret.as_bytes())
            .with_context(|| format!("{SECRET_KEY_ENV} does not hold a valid secret key")),
        Err(_) => load_keypair(Path::new(&config.identity.keypair_path)),
    }
}

fn keygen(out: &Path) -> Result<()> {
    if out.exists() {
        anyhow::bail!("Refusing to overwrite existing key at {}", out.display());
    }
    let keypair = generate_keypair();
    save_keypair(&keypair, out)?;
    println!("{}", keypair.public_key_hex());
    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sitecraft::config::AppConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "sitecraft")]
#[command(version, about = "Multi-tenant website builder with digital business cards")]
pub struct Cli {
    /// Path to a config file. Defaults to ./sitecraft.toml when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server and editor shell
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (permissive CORS for a separately served editor)
        #[arg(long)]
        dev: bool,

        /// Open the editor in a browser once the server is up
        #[arg(long)]
        open: bool,
    },
    /// Create or migrate the database, then exit
    InitDb,
    /// Print the effective configuration as TOML
    Config,
    /// Create an account from the shell
    CreateUser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Commands::Serve { port, host, dev, .. } = &cli.command {
        if let Some(port) = port {
            config.server.port = *port;
        }
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if *dev {
            config.server.dev_mode = true;
        }
    }

    let _log_guard = sitecraft::logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve { open, .. } => cmd::cmd_serve(config, open).await?,
        Commands::InitDb => cmd::cmd_init_db(&config)?,
        Commands::Config => cmd::cmd_config(&config)?,
        Commands::CreateUser {
            email,
            password,
            name,
        } => cmd::cmd_create_user(&config, &email, &password, name.as_deref())?,
    }

    Ok(())
}

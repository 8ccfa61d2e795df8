use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "watchpost", about = "Watchpost camera surveillance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start surveillance
    Start,
    /// Stop surveillance
    Stop,
    /// Add a known identity from the current camera frame or an image file
    Add {
        /// Name for the new identity (e.g., "john")
        name: String,
        /// Import this image instead of capturing from the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Remove a known identity
    Remove {
        /// Name the identity was added under
        name: String,
    },
    /// List known identities
    List,
    /// Show daemon status
    Status,
    /// Print the intruder snapshot folder
    Intruders {
        /// Open the folder in the desktop file manager
        #[arg(long)]
        open: bool,
    },
}

// `#[zbus::proxy]` generates `WatchpostProxy` (async) and `WatchpostProxyBlocking`.
#[zbus::proxy(
    interface = "org.watchpost.Watchpost1",
    default_service = "org.watchpost.Watchpost1",
    default_path = "/org/watchpost/Watchpost1"
)]
trait Watchpost {
    async fn start(&self) -> zbus::Result<bool>;
    async fn stop(&self) -> zbus::Result<bool>;
    async fn add_identity(&self, name: &str, image_path: &str) -> zbus::Result<String>;
    async fn remove_identity(&self, name: &str) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn intruder_folder(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    let proxy = WatchpostProxy::new(&connection)
        .await
        .context("watchpostd is not reachable")?;
    tracing::debug!("connected to watchpostd");

    match cli.command {
        Commands::Start => {
            if proxy.start().await? {
                println!("Surveillance started");
            } else {
                println!("Surveillance is already running");
            }
        }
        Commands::Stop => {
            if proxy.stop().await? {
                println!("Surveillance stopped");
            } else {
                println!("Surveillance is not running");
            }
        }
        Commands::Add { name, image } => {
            let image_path = match image {
                Some(path) => path
                    .canonicalize()
                    .with_context(|| format!("cannot read {}", path.display()))?
                    .display()
                    .to_string(),
                None => String::new(),
            };
            let reply = proxy.add_identity(&name, &image_path).await?;
            let enrolled: serde_json::Value = serde_json::from_str(&reply)?;
            println!(
                "Added {} ({})",
                enrolled["label"].as_str().unwrap_or(&name),
                enrolled["path"].as_str().unwrap_or_default()
            );
            if enrolled["encoded"] == serde_json::Value::Bool(false) {
                eprintln!("warning: no face found in the image; it will not be recognized");
            }
        }
        Commands::Remove { name } => {
            let path = proxy.remove_identity(&name).await?;
            println!("Removed {path}");
        }
        Commands::List => {
            let names: Vec<String> = serde_json::from_str(&proxy.list_identities().await?)?;
            if names.is_empty() {
                println!("No known identities");
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Intruders { open } => {
            let folder = proxy.intruder_folder().await?;
            println!("{folder}");
            if open {
                let status = std::process::Command::new("xdg-open")
                    .arg(&folder)
                    .status()
                    .context("failed to run xdg-open")?;
                if !status.success() {
                    bail!("xdg-open exited with {status}");
                }
            }
        }
    }

    Ok(())
}

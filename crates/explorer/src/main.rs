//! Virtual folder explorer
//!
//! Command line front end over a local folder store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use explorer::config::Config;
use explorer::events::{ExplorerEvent, NotificationKind};
use explorer::files::{LocalFile, UploadStatus};
use explorer::panel::DataPanel;
use explorer::protocol::{split_path, DirEntry, HostList};
use explorer::service::LocalFolderService;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Virtual folder explorer - browse and manage virtual folders.
#[derive(Parser, Debug)]
#[command(name = "vfolder-explorer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage virtual folders
    #[command(subcommand)]
    Folders(FoldersCommands),

    /// List a directory inside a folder
    Ls {
        /// Folder ID
        folder: String,

        /// Directory inside the folder, e.g. docs/2024
        #[arg(long = "in", value_name = "PATH")]
        dir: Option<String>,
    },

    /// Create a directory inside a folder
    Mkdir {
        /// Folder ID
        folder: String,

        /// Name of the new directory
        name: String,

        /// Parent directory inside the folder
        #[arg(long = "in", value_name = "PATH")]
        dir: Option<String>,
    },

    /// Upload local files into a folder
    Upload {
        /// Folder ID
        folder: String,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target directory inside the folder
        #[arg(long = "in", value_name = "PATH")]
        dir: Option<String>,

        /// Treat files as dropped (oversized files are skipped)
        #[arg(long)]
        drop: bool,
    },

    /// Download a file from a folder
    Download {
        /// Folder ID
        folder: String,

        /// File name inside the directory
        filename: String,

        /// Directory inside the folder
        #[arg(long = "in", value_name = "PATH")]
        dir: Option<String>,

        /// Local destination directory (defaults to the configured download_dir)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Subcommands for folder management.
#[derive(Subcommand, Debug, Clone)]
pub enum FoldersCommands {
    /// List all folders
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List hosts new folders can be created on
    Hosts,

    /// Create a folder
    Create {
        /// Folder name (letters, numbers, - and _)
        name: String,

        /// Storage host (defaults to the service's default host)
        #[arg(long)]
        host: Option<String>,
    },

    /// Delete a folder
    Delete {
        /// Folder ID to delete
        id: String,

        /// Retype the folder ID to confirm
        #[arg(long, value_name = "ID")]
        confirm: String,
    },

    /// Show folder details
    Info {
        /// Folder ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.explorer.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if matches!(cli.command, Commands::Upload { .. }) {
        // Nothing renders the queue here, so finished uploads need not linger.
        config.upload.linger_ms = 0;
    }

    let hosts = HostList {
        default: config.storage.default_host.clone(),
        allowed: config.storage.allowed_hosts.clone(),
    };
    let service = Arc::new(LocalFolderService::open(&config.storage.root, hosts).await?);
    tracing::debug!("Using storage root: {:?}", service.root());
    let panel = DataPanel::new(service, &config);
    let mut events = panel.subscribe();

    let ok = match cli.command {
        Commands::Folders(command) => run_folders(&panel, &mut events, command).await?,
        Commands::Ls { folder, dir } => {
            enter(&panel, &folder, dir.as_deref()).await?;
            if let Some(state) = panel.explorer().state().await {
                println!("{}:", state.breadcrumb.join());
                print_entries(&state.entries);
            }
            true
        }
        Commands::Mkdir { folder, name, dir } => {
            enter(&panel, &folder, dir.as_deref()).await?;
            let created = panel.make_directory(&name).await;
            let ok = print_notifications(&mut events);
            created?;
            ok
        }
        Commands::Upload {
            folder,
            files,
            dir,
            drop,
        } => {
            enter(&panel, &folder, dir.as_deref()).await?;

            let mut local = Vec::with_capacity(files.len());
            for path in &files {
                local.push(LocalFile::read(path).await?);
            }

            let handles = if drop {
                panel.upload_dropped(local).await?
            } else {
                panel.upload_selected(local).await?
            };
            let accepted = handles.len();
            for handle in handles {
                handle.await?;
            }

            let failed: Vec<_> = panel
                .uploads()
                .tasks()
                .await
                .into_iter()
                .filter(|t| t.error())
                .collect();
            for task in &failed {
                if let UploadStatus::Failed(message) = &task.status {
                    eprintln!("Failed to upload {}: {}", task.filename, message);
                }
            }
            println!("Uploaded {} of {} file(s)", accepted - failed.len(), files.len());
            print_notifications(&mut events);
            failed.is_empty()
        }
        Commands::Download {
            folder,
            filename,
            dir,
            output,
        } => {
            enter(&panel, &folder, dir.as_deref()).await?;
            let saved = panel.download(&filename, output.as_deref()).await;
            let ok = print_notifications(&mut events);
            println!("Saved to: {}", saved?.display());
            ok
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_folders(
    panel: &DataPanel<LocalFolderService>,
    events: &mut broadcast::Receiver<ExplorerEvent>,
    command: FoldersCommands,
) -> anyhow::Result<bool> {
    match command {
        FoldersCommands::List { json } => {
            let folders = panel.folders().list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&folders)?);
            } else if folders.is_empty() {
                println!("No folders.");
            } else {
                let name_width = folders.iter().map(|f| f.name.len()).max().unwrap_or(4).max(4);
                println!("{:<name_width$}  {:<10}  PERMISSION", "NAME", "HOST");
                for folder in &folders {
                    println!(
                        "{:<name_width$}  {:<10}  {}",
                        folder.name, folder.host, folder.permission
                    );
                }
            }
            Ok(true)
        }
        FoldersCommands::Hosts => {
            let hosts = panel.folders().list_allowed_hosts().await?;
            for host in &hosts.allowed {
                let marker = if *host == hosts.default { " (default)" } else { "" };
                println!("{}{}", host, marker);
            }
            Ok(true)
        }
        FoldersCommands::Create { name, host } => {
            let host = match host {
                Some(host) => host,
                None => panel.folders().list_allowed_hosts().await?.default,
            };
            let handle = panel.folders().create(&name, &host);
            let ok = match handle {
                Ok(handle) => {
                    handle.await?;
                    print_notifications(events)
                }
                Err(_) => {
                    print_notifications(events);
                    false
                }
            };
            Ok(ok)
        }
        FoldersCommands::Delete { id, confirm } => {
            let handle = panel.delete_folder(&id, &confirm).await;
            let ok = match handle {
                Ok(handle) => {
                    handle.await?;
                    print_notifications(events)
                }
                Err(e) => {
                    // Permission failures are not notified.
                    let notified = !print_notifications(events);
                    if !notified {
                        eprintln!("Error: {}", e);
                    }
                    false
                }
            };
            Ok(ok)
        }
        FoldersCommands::Info { id } => {
            let info = panel.folders().info(&id).await?;
            println!("Folder {}", info.id);
            println!("  Host:       {}", info.host);
            println!("  Files:      {}", info.num_files);
            println!("  Owner:      {}", if info.is_owner { "yes" } else { "no" });
            println!("  Permission: {}", info.permission);
            Ok(true)
        }
    }
}

/// Open `folder` and walk down to `dir`.
async fn enter(
    panel: &DataPanel<LocalFolderService>,
    folder: &str,
    dir: Option<&str>,
) -> anyhow::Result<()> {
    panel.open_folder(folder).await?;
    if let Some(dir) = dir {
        for segment in split_path(dir)? {
            panel.explorer().descend(segment).await?;
        }
    }
    Ok(())
}

/// Print pending notifications. Returns `false` if any of them was an error.
fn print_notifications(events: &mut broadcast::Receiver<ExplorerEvent>) -> bool {
    let mut ok = true;
    loop {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event receiver lagged, some notifications were lost");
                continue;
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        };
        if let ExplorerEvent::Notification(notification) = event {
            match notification.kind {
                NotificationKind::Success => println!("{}", notification.message),
                NotificationKind::Error => {
                    eprintln!("Error: {}", notification.message);
                    ok = false;
                }
            }
        }
    }
    ok
}

fn print_entries(entries: &[DirEntry]) {
    if entries.is_empty() {
        println!("(empty)");
        return;
    }
    let size_width = entries
        .iter()
        .map(|e| e.size.to_string().len())
        .max()
        .unwrap_or(1);
    for entry in entries {
        let name = if entry.is_directory() {
            format!("{}/", entry.filename)
        } else {
            entry.filename.clone()
        };
        println!(
            "{}  {:>size_width$}  {}",
            entry.mode, entry.size, name
        );
    }
}

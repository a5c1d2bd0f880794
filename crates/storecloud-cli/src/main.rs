//! storecloud: command-line access to a configured store.
//!
//! Reads STORAGE_BACKEND and FILESYSTEM_STORAGE_ROOT (see `StoreConfig`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use storecloud_cli::{format_listing_row, init_tracing, listing_key, parse_property};
use storecloud_core::{Metadata, StorageObject, StoragePropertyNames, StoreConfig};
use storecloud_services::StoreService;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "storecloud", about = "Backend-agnostic object store CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a folder unless it already exists
    Mkdir {
        /// Parent folder path ("/" for the root)
        parent: String,
        /// Folder name
        name: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Upload a local file as a document
    Put {
        /// Local file to upload
        file: PathBuf,
        /// Destination folder path; missing folders are created
        path: String,
        /// Document name (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
        /// Replace the document if it already exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Write the content of a document to stdout or a file
    Get {
        key: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List the direct children of a folder
    Ls {
        /// Folder key (defaults to the repository root)
        key: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a node and its metadata
    Stat {
        key: String,
        /// Resolve the argument as a path instead of a key
        #[arg(long)]
        by_path: bool,
    },
    /// Delete a node (recursively for folders)
    Rm { key: String },
    /// Copy a node into a destination folder
    Cp {
        source_key: String,
        target_folder: String,
    },
    /// Set properties on a node; use cmis:name=<new> to rename
    SetProp {
        key: String,
        /// Properties as name=value
        #[arg(required = true)]
        properties: Vec<String>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn require(svc: &StoreService, key: &str) -> anyhow::Result<StorageObject> {
    svc.get_storage_object_by_key(key)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No node with key {}", key))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config = StoreConfig::from_env().context("Invalid storage configuration")?;
    let svc = StoreService::from_config(&config)
        .await
        .context("Failed to initialize storage driver")?;

    match cli.command {
        Commands::Mkdir {
            parent,
            name,
            title,
            description,
        } => {
            let key = svc
                .create_folder_if_not_present(Some(&parent), &name, &title, &description)
                .await?;
            print_json(&serde_json::json!({ "key": key }))?;
        }
        Commands::Put {
            file,
            path,
            name,
            content_type,
            overwrite,
        } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow::anyhow!("Cannot derive a name from {}", file.display()))?,
            };
            let local = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;

            let so = if overwrite {
                let descriptor = storecloud_core::StorageFile::new(name.clone(), content_type.clone());
                svc.restore_simple_document(
                    &descriptor,
                    Box::pin(local),
                    &content_type,
                    &name,
                    &path,
                    true,
                )
                .await?
            } else {
                let mut metadata = Metadata::new();
                metadata.insert(StoragePropertyNames::Name.value().to_string(), name.into());
                svc.store_simple_document(Box::pin(local), &content_type, &path, metadata)
                    .await?
            };
            print_json(&so)?;
        }
        Commands::Get { key, output } => {
            let mut stream = svc.get_resource(&key).await?;
            match output {
                Some(output) => {
                    let mut file = tokio::fs::File::create(&output)
                        .await
                        .with_context(|| format!("Failed to create {}", output.display()))?;
                    while let Some(chunk) = stream.next().await {
                        file.write_all(&chunk?).await?;
                    }
                    file.flush().await?;
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    while let Some(chunk) = stream.next().await {
                        stdout.write_all(&chunk?).await?;
                    }
                    stdout.flush().await?;
                }
            }
        }
        Commands::Ls { key, json } => {
            let key = listing_key(&svc, key).await?;
            let children = svc.get_children(&key).await?;
            if json {
                print_json(&children)?;
            } else {
                for child in &children {
                    println!("{}", format_listing_row(child, 80));
                }
            }
        }
        Commands::Stat { key, by_path } => {
            let so = if by_path {
                svc.get_storage_object_by_path(&key).await?
            } else {
                svc.get_storage_object_by_key(&key).await?
            };
            match so {
                Some(so) => print_json(&so)?,
                None => anyhow::bail!("{} does not resolve", key),
            }
        }
        Commands::Rm { key } => {
            let deleted = svc.delete(&key).await?;
            print_json(&serde_json::json!({ "deleted": deleted, "key": key }))?;
        }
        Commands::Cp {
            source_key,
            target_folder,
        } => {
            let source = require(&svc, &source_key).await?;
            let target = StorageObject::new(target_folder.clone(), target_folder, None);
            let copy = svc.copy_node(&source, &target).await?;
            print_json(&copy)?;
        }
        Commands::SetProp { key, properties } => {
            let target = require(&svc, &key).await?;
            let mut update = Metadata::new();
            for raw in &properties {
                let (name, value) = parse_property(raw)?;
                update.insert(name, value);
            }
            let updated = svc.update_properties(update, &target).await?;
            print_json(&updated)?;
        }
    }

    Ok(())
}

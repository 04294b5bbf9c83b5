//! Blobgate CLI - Command line interface for blob storage and image serving.
//!
//! Uploads, downloads and inspects blobs in Azure Blob Storage (or the
//! local/memory backends), and serves stored images over HTTP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use blobgate_common::BlobName;
use blobgate_imaging::{image_router, ImageProvider, ImageProviderOptions};
use blobgate_storage::{create_default_registry, AzureStorageConfig, RemoteStorage};

#[derive(Parser)]
#[command(name = "blobgate")]
#[command(about = "Blobgate - Blob storage access and image serving")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Storage backend: "azure", "local", or "memory".
    #[arg(short, long, global = true, default_value = "azure")]
    backend: String,

    /// Root directory of the local backend.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Azure storage connection string.
    #[arg(long, global = true, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    connection_string: Option<String>,

    /// Azure storage account name.
    #[arg(long, global = true)]
    account: Option<String>,

    /// Azure storage account key (base64).
    #[arg(long, global = true)]
    key: Option<String>,

    /// Container holding the blobs. Empty selects the root container.
    #[arg(short, long, global = true, env = "AZURE_STORAGE_CONTAINER")]
    container: Option<String>,

    /// Cache-Control recorded on uploaded blobs.
    #[arg(long, global = true)]
    cache_control: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file.
    Put {
        /// Local file to upload.
        file: PathBuf,

        /// Blob name. A trailing `/` appends the file name.
        name: String,

        /// MIME type (default: guessed from the file extension).
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Download a blob.
    Get {
        /// Blob name.
        name: String,

        /// Destination file (default: stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a blob. Missing blobs are not an error.
    Rm {
        /// Blob name.
        name: String,
    },

    /// Check whether a blob exists.
    Exists {
        /// Blob name.
        name: String,
    },

    /// Show blob properties as JSON.
    Stat {
        /// Blob name.
        name: String,
    },

    /// Print the container-relative path of a blob.
    Path {
        /// Blob name.
        name: String,
    },

    /// Serve stored images over HTTP.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,

        /// App-relative URL prefix served from storage.
        #[arg(short, long, default_value = "~/")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let storage = open_storage(&cli)?;

    match cli.command {
        Commands::Put {
            file,
            name,
            content_type,
        } => cmd_put(storage, &file, &name, content_type.as_deref()).await,

        Commands::Get { name, out } => cmd_get(storage, &name, out.as_deref()).await,

        Commands::Rm { name } => cmd_rm(storage, &name).await,

        Commands::Exists { name } => cmd_exists(storage, &name).await,

        Commands::Stat { name } => cmd_stat(storage, &name).await,

        Commands::Path { name } => cmd_path(storage, &name),

        Commands::Serve { bind, prefix } => cmd_serve(storage, &bind, &prefix).await,
    }
}

/// Build the registry configuration for the selected backend.
fn backend_config(cli: &Cli) -> Result<Value> {
    let mut config = match cli.backend.as_str() {
        "memory" => json!({}),
        "local" => {
            let root = cli
                .root
                .as_ref()
                .context("The local backend requires --root")?;
            json!({ "root": root.to_string_lossy() })
        }
        "azure" => azure_config(cli)?,
        other => anyhow::bail!("Invalid backend '{}'. Use: azure, local, or memory", other),
    };

    if let Some(map) = config.as_object_mut() {
        if let Some(container) = &cli.container {
            if cli.backend != "local" {
                map.insert("container".to_string(), json!(container));
            }
        }
        if let Some(cache_control) = &cli.cache_control {
            map.insert("default_cache_control".to_string(), json!(cache_control));
        }
    }

    Ok(config)
}

fn azure_config(cli: &Cli) -> Result<Value> {
    if let Some(conn_str) = &cli.connection_string {
        return Ok(json!({ "connection_string": conn_str }));
    }

    let config = match (&cli.account, &cli.key) {
        (Some(account), Some(key)) => AzureStorageConfig::new(account, key, None),
        (None, None) => AzureStorageConfig::from_env()
            .context("No Azure credentials: use --connection-string or --account and --key")?,
        _ => anyhow::bail!("--account and --key must be given together"),
    };

    Ok(serde_json::to_value(config)?)
}

fn open_storage(cli: &Cli) -> Result<Arc<dyn RemoteStorage>> {
    let config = backend_config(cli)?;
    let registry = create_default_registry();
    let storage = registry
        .resolve(&cli.backend, config)
        .with_context(|| format!("Failed to open {} storage", cli.backend))?;

    info!("Using {} storage", storage.name());
    Ok(storage)
}

fn parse_name(name: &str) -> Result<BlobName> {
    BlobName::parse(name).with_context(|| format!("Invalid blob name '{}'", name))
}

/// Blob name for an upload; a trailing `/` names a directory for `file`.
fn upload_name(file: &Path, name: &str) -> Result<BlobName> {
    if !name.ends_with('/') {
        return parse_name(name);
    }

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("Source file has no usable file name")?;
    parse_name(name.trim_end_matches('/'))?
        .join(file_name)
        .context("Invalid blob name")
}

/// Upload a file.
async fn cmd_put(
    storage: Arc<dyn RemoteStorage>,
    file: &Path,
    name: &str,
    content_type: Option<&str>,
) -> Result<()> {
    let blob = upload_name(file, name)?;
    let guessed = mime_guess::from_path(file).first_raw();
    let content_type = content_type.or(guessed);

    info!("Uploading {} as {}", file.display(), blob);

    let data = tokio::fs::read(file)
        .await
        .context("Failed to read source file")?;
    let size = data.len();

    storage
        .save(&blob, bytes::Bytes::from(data), content_type)
        .await
        .context("Failed to upload blob")?;

    println!("Uploaded {} ({} bytes)", storage.partial_file_path(&blob), size);
    if let Some(content_type) = content_type {
        println!("  Content-Type: {}", content_type);
    }

    Ok(())
}

/// Download a blob.
async fn cmd_get(storage: Arc<dyn RemoteStorage>, name: &str, out: Option<&Path>) -> Result<()> {
    let blob = parse_name(name)?;
    let mut response = storage
        .get_content(&blob)
        .await
        .context("Failed to download blob")?;

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin> = match out {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .context("Failed to create destination file")?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut written = 0u64;
    while let Some(chunk) = response.stream.next().await {
        let chunk = chunk.context("Failed to read blob content")?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;

    if let Some(path) = out {
        println!("Downloaded {} to {} ({} bytes)", blob, path.display(), written);
    }

    Ok(())
}

/// Delete a blob.
async fn cmd_rm(storage: Arc<dyn RemoteStorage>, name: &str) -> Result<()> {
    let blob = parse_name(name)?;
    storage
        .delete(&blob)
        .await
        .context("Failed to delete blob")?;

    println!("Deleted {}", blob);
    Ok(())
}

/// Check blob existence.
async fn cmd_exists(storage: Arc<dyn RemoteStorage>, name: &str) -> Result<()> {
    let blob = parse_name(name)?;
    let exists = storage
        .exists(&blob)
        .await
        .context("Failed to check blob")?;

    println!("{}", exists);
    Ok(())
}

/// Show blob properties.
async fn cmd_stat(storage: Arc<dyn RemoteStorage>, name: &str) -> Result<()> {
    let blob = parse_name(name)?;
    let properties = storage
        .metadata(&blob)
        .await
        .context("Failed to read blob properties")?
        .with_context(|| format!("Blob not found: {}", blob))?;

    println!("{}", serde_json::to_string_pretty(&properties)?);
    Ok(())
}

/// Print the partial path of a blob.
fn cmd_path(storage: Arc<dyn RemoteStorage>, name: &str) -> Result<()> {
    let blob = parse_name(name)?;
    println!("{}", storage.partial_file_path(&blob));
    Ok(())
}

/// Serve images from storage.
async fn cmd_serve(storage: Arc<dyn RemoteStorage>, bind: &str, prefix: &str) -> Result<()> {
    let options = ImageProviderOptions {
        url_prefix: prefix.to_string(),
    };
    let provider = ImageProvider::new(storage, &options).context("Invalid URL prefix")?;
    let app = image_router(Arc::new(provider));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!("Serving images on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Parse arguments, ignoring values the developer's shell supplies
    /// through `AZURE_STORAGE_*` variables.
    fn parse(args: &[&str]) -> Cli {
        let mut cli =
            Cli::try_parse_from(std::iter::once("blobgate").chain(args.iter().copied())).unwrap();
        if !args.contains(&"--connection-string") {
            cli.connection_string = None;
        }
        if !args.contains(&"--container") {
            cli.container = None;
        }
        cli
    }

    fn arg_env(id: &str) -> Option<String> {
        Cli::command()
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .and_then(|arg| arg.get_env())
            .map(|env| env.to_string_lossy().into_owned())
    }

    #[test]
    fn test_azure_settings_read_environment() {
        assert_eq!(
            arg_env("connection_string").as_deref(),
            Some("AZURE_STORAGE_CONNECTION_STRING")
        );
        assert_eq!(arg_env("container").as_deref(), Some("AZURE_STORAGE_CONTAINER"));
    }

    #[test]
    fn test_container_applies_to_connection_string() {
        let mut cli = parse(&["--connection-string", "UseDevelopmentStorage=true", "path", "a.png"]);
        assert!(backend_config(&cli).unwrap().get("container").is_none());

        cli.container = Some("images".to_string());
        let storage = open_storage(&cli).unwrap();
        assert_eq!(
            storage.partial_file_path(&BlobName::parse("a.png").unwrap()),
            "images/a.png"
        );
    }

    #[test]
    fn test_local_backend_requires_root() {
        let cli = parse(&["--backend", "local", "exists", "a.png"]);
        assert!(backend_config(&cli).is_err());

        let cli = parse(&["--backend", "local", "--root", "/tmp/blobs", "exists", "a.png"]);
        assert_eq!(backend_config(&cli).unwrap()["root"], "/tmp/blobs");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let cli = parse(&["--backend", "s3", "exists", "a.png"]);
        assert!(backend_config(&cli).is_err());
    }

    #[test]
    fn test_azure_config_from_connection_string() {
        let cli = parse(&[
            "--connection-string",
            "UseDevelopmentStorage=true",
            "--container",
            "images",
            "--cache-control",
            "max-age=60",
            "stat",
            "a.png",
        ]);
        let config = backend_config(&cli).unwrap();

        assert_eq!(config["connection_string"], "UseDevelopmentStorage=true");
        assert_eq!(config["container"], "images");
        assert_eq!(config["default_cache_control"], "max-age=60");
    }

    #[test]
    fn test_azure_account_and_key_go_together() {
        let cli = parse(&["--account", "acc", "path", "a.png"]);
        assert!(backend_config(&cli).is_err());

        let cli = parse(&["--account", "acc", "--key", "a2V5", "path", "a.png"]);
        let config = backend_config(&cli).unwrap();
        assert_eq!(config["account_name"], "acc");
    }

    #[test]
    fn test_upload_name() {
        let file = Path::new("/home/me/cat.png");
        assert_eq!(upload_name(file, "pets/").unwrap().as_str(), "pets/cat.png");
        assert_eq!(upload_name(file, "pets/tom.png").unwrap().as_str(), "pets/tom.png");
        assert!(upload_name(file, "/").is_err());
    }

    #[tokio::test]
    async fn test_put_and_get_through_local_backend() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let source = temp_dir.path().join("cat.png");
        tokio::fs::write(&source, b"png-bytes").await.unwrap();
        let store = temp_dir.path().join("store");
        let root = store.to_str().unwrap();

        let cli = parse(&["--backend", "local", "--root", root, "exists", "x"]);
        let storage = open_storage(&cli).unwrap();

        cmd_put(storage.clone(), &source, "pets/", None).await.unwrap();

        let blob = BlobName::parse("pets/cat.png").unwrap();
        let properties = storage.metadata(&blob).await.unwrap().unwrap();
        assert_eq!(properties.content_type.as_deref(), Some("image/png"));

        let out = temp_dir.path().join("out.png");
        cmd_get(storage, "pets/cat.png", Some(&out)).await.unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"png-bytes");
    }
}

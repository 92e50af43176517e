//! FileBridge Daemon
//!
//! Serves one directory tree over a local socket, or runs single file
//! operations directly from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::ipc::{get_socket_path, IpcClient, IpcServer};
use daemon::protocol::messages::{
    CopyRequest, DirectoryCreateRequest, DirectoryDeleteRequest, FileDeleteRequest,
    FileDownloadRequest, FileListRequest, FileReadRequest, FileUploadRequest, FileWriteRequest,
    Message, MoveRequest, RenameRequest, SearchRequest, TreeRequest, UploadItem,
};
use daemon::protocol::Envelope;
use daemon::router::MessageRouter;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

/// FileBridge - controlled access to a single directory tree.
#[derive(Parser, Debug)]
#[command(name = "filebridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Root directory (overrides config and FILEBRIDGE_ROOT)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Send the operation to a running daemon instead of running it locally
    #[arg(long, global = true)]
    pub remote: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the daemon and serve requests on the local socket
    Serve,

    /// List a directory
    Ls {
        /// Directory relative to the root
        #[arg(default_value = "")]
        path: String,
    },

    /// Print a text file
    Cat {
        /// File relative to the root
        path: String,
    },

    /// Create or overwrite a file
    Write {
        /// File relative to the root
        path: String,

        /// Content to write (read from stdin when omitted)
        content: Option<String>,

        /// Create missing parent directories
        #[arg(short, long)]
        parents: bool,
    },

    /// Delete a file
    Rm {
        /// File relative to the root
        path: String,
    },

    /// Create a directory
    Mkdir {
        /// Directory relative to the root
        path: String,

        /// Fail if the parent is missing or the directory exists
        #[arg(long)]
        no_parents: bool,
    },

    /// Delete a directory
    Rmdir {
        /// Directory relative to the root
        path: String,

        /// Remove the directory and everything below it
        #[arg(short, long)]
        recursive: bool,
    },

    /// Rename an entry within its directory
    Rename {
        /// Entry relative to the root
        path: String,

        /// New name (a single path segment)
        new_name: String,
    },

    /// Copy a file or directory
    Cp {
        /// Source relative to the root
        source: String,

        /// Destination relative to the root
        destination: String,
    },

    /// Move a file or directory
    Mv {
        /// Source relative to the root
        source: String,

        /// Destination relative to the root
        destination: String,
    },

    /// Search file names and contents with a regular expression
    Search {
        /// Regular expression
        query: String,

        /// Directory to search, relative to the root
        #[arg(long, default_value = "")]
        path: String,

        /// Only search files with these language tags (comma separated)
        #[arg(long = "type", value_delimiter = ',')]
        types: Vec<String>,

        /// Match case exactly
        #[arg(short = 's', long)]
        case_sensitive: bool,
    },

    /// Show a directory tree
    Tree {
        /// Directory relative to the root
        #[arg(default_value = "")]
        path: String,

        /// Maximum depth (default from config)
        #[arg(short, long)]
        depth: Option<u32>,
    },

    /// Upload local files into a directory under the root
    Upload {
        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target directory relative to the root
        #[arg(long, default_value = "")]
        dest: String,
    },

    /// Download a file from the root
    Download {
        /// File relative to the root
        path: String,

        /// Local output path (defaults to the file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show supported operations and limits
    Capabilities,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration (file, environment and flags combined)
    Show,
}

/// Where requests are executed.
enum Backend {
    /// In this process.
    Local(MessageRouter),
    /// In a running daemon.
    Remote(IpcClient),
}

impl Backend {
    async fn call(&mut self, request: Message) -> anyhow::Result<Message> {
        let response = match self {
            Backend::Local(router) => router.handle(Envelope::new(0, request)).await.payload,
            Backend::Remote(client) => client.send(request).await?,
        };

        match response {
            Message::Error(err) => anyhow::bail!("{:?}: {}", err.code, err.message),
            other => Ok(other),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // Init must work even when the existing file does not parse
    if let Commands::Config {
        command: ConfigCommands::Init { force },
    } = cli.command
    {
        return init_config(&config_path, force);
    }

    // Load configuration
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides, then the command line
    config.apply_env_overrides();
    if let Some(root) = &cli.root {
        config.files.root = root.clone();
    }

    // Validate configuration
    config.validate()?;

    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let socket_path = config
        .ipc
        .socket_path()
        .map(Path::to_path_buf)
        .unwrap_or_else(get_socket_path);

    if let Commands::Config { .. } = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if let Commands::Serve = cli.command {
        if cli.remote {
            anyhow::bail!("--remote cannot be used with serve");
        }
        return serve(&config, &socket_path).await;
    }

    let mut backend = if cli.remote {
        let client = IpcClient::connect(&socket_path).await.with_context(|| {
            format!(
                "Failed to connect to daemon at {} (is `filebridge serve` running?)",
                socket_path.display()
            )
        })?;
        Backend::Remote(client)
    } else {
        let router = MessageRouter::from_config(&config.files)
            .with_context(|| format!("Invalid root directory: {}", config.files.root.display()))?;
        Backend::Local(router)
    };

    run_command(cli.command, &mut backend).await
}

/// Run the daemon until SIGTERM or SIGINT.
async fn serve(config: &Config, socket_path: &Path) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let router = MessageRouter::from_config(&config.files)
        .with_context(|| format!("Invalid root directory: {}", config.files.root.display()))?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    let server = IpcServer::bind(socket_path)
        .await
        .with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;

    tracing::info!(
        "FileBridge daemon serving {} on {}",
        config.files.root.display(),
        socket_path.display()
    );

    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    };

    server.serve(Arc::new(router), shutdown).await?;
    Ok(())
}

/// Execute one client command and print its result.
async fn run_command(command: Commands, backend: &mut Backend) -> anyhow::Result<()> {
    let request = match command {
        Commands::Serve | Commands::Config { .. } => {
            anyhow::bail!("this command does not run against a backend")
        }
        Commands::Ls { path } => Message::FileListRequest(FileListRequest { path }),
        Commands::Cat { path } => {
            return match backend
                .call(Message::FileReadRequest(FileReadRequest { path: path.clone() }))
                .await?
            {
                Message::FileReadResponse(record) => match record.content {
                    Some(content) => {
                        print!("{}", content);
                        Ok(())
                    }
                    None => anyhow::bail!("{} is a binary file; use `download` instead", path),
                },
                other => print_json(&other),
            };
        }
        Commands::Write {
            path,
            content,
            parents,
        } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut buffer = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buffer)
                        .await
                        .context("Failed to read content from stdin")?;
                    buffer
                }
            };
            Message::FileWriteRequest(FileWriteRequest {
                path,
                content,
                create_directories: parents,
            })
        }
        Commands::Rm { path } => Message::FileDeleteRequest(FileDeleteRequest { path }),
        Commands::Mkdir { path, no_parents } => {
            Message::DirectoryCreateRequest(DirectoryCreateRequest {
                path,
                recursive: !no_parents,
            })
        }
        Commands::Rmdir { path, recursive } => {
            Message::DirectoryDeleteRequest(DirectoryDeleteRequest { path, recursive })
        }
        Commands::Rename { path, new_name } => Message::RenameRequest(RenameRequest {
            old_path: path,
            new_name,
        }),
        Commands::Cp {
            source,
            destination,
        } => Message::CopyRequest(CopyRequest {
            source_path: source,
            destination_path: destination,
        }),
        Commands::Mv {
            source,
            destination,
        } => Message::MoveRequest(MoveRequest {
            source_path: source,
            destination_path: destination,
        }),
        Commands::Search {
            query,
            path,
            types,
            case_sensitive,
        } => Message::SearchRequest(SearchRequest {
            query,
            path,
            file_types: types,
            case_sensitive,
        }),
        Commands::Tree { path, depth } => Message::TreeRequest(TreeRequest {
            path,
            max_depth: depth,
        }),
        Commands::Upload { files, dest } => {
            Message::FileUploadRequest(FileUploadRequest {
                path: dest,
                files: read_upload_items(&files).await?,
            })
        }
        Commands::Download { path, output } => return download(backend, &path, output).await,
        Commands::Capabilities => Message::CapabilitiesRequest,
    };

    let response = backend.call(request).await?;
    print_json(&response)
}

/// Write the default configuration to `path`.
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    eprintln!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Read local files and attach a SHA-256 checksum to each.
async fn read_upload_items(files: &[PathBuf]) -> anyhow::Result<Vec<UploadItem>> {
    let mut items = Vec::with_capacity(files.len());

    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Not a file path: {}", file.display()))?;
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let checksum = Sha256::digest(&data).to_vec();

        items.push(UploadItem {
            name,
            data,
            checksum: Some(checksum),
        });
    }

    Ok(items)
}

/// Fetch a file chunk by chunk into a local file.
async fn download(
    backend: &mut Backend,
    path: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let output = match output {
        Some(output) => output,
        None => Path::new(path)
            .file_name()
            .map(PathBuf::from)
            .with_context(|| format!("Cannot derive an output name from {}", path))?,
    };

    let mut file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut offset = 0u64;

    loop {
        let request = Message::FileDownloadRequest(FileDownloadRequest {
            path: path.to_string(),
            offset,
            chunk_size: 0,
        });

        let chunk = match backend.call(request).await? {
            Message::FileDownloadChunk(chunk) => chunk,
            other => anyhow::bail!("Unexpected response: {}", other.kind()),
        };

        file.write_all(&chunk.data).await?;
        offset += chunk.data.len() as u64;

        if chunk.is_last {
            break;
        }
    }

    file.flush().await?;
    eprintln!("Downloaded {} bytes to {}", offset, output.display());
    Ok(())
}

/// Print a response payload as pretty JSON.
fn print_json(message: &Message) -> anyhow::Result<()> {
    let value = serde_json::to_value(message)?;
    let data = value.get("data").unwrap_or(&value);
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["filebridge", "--root", "/srv", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve));
        assert_eq!(cli.root, Some(PathBuf::from("/srv")));
        assert!(!cli.remote);
    }

    #[test]
    fn test_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["filebridge", "ls"]).unwrap();
        match cli.command {
            Commands::Ls { path } => assert_eq!(path, ""),
            _ => panic!("Expected Ls command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["filebridge", "cat", "a.txt", "--remote", "-v"]).unwrap();
        assert!(cli.remote);
        assert!(cli.verbose);
    }

    #[test]
    fn test_mkdir_is_recursive_by_default() {
        let cli = Cli::try_parse_from(["filebridge", "mkdir", "a/b"]).unwrap();
        match cli.command {
            Commands::Mkdir { path, no_parents } => {
                assert_eq!(path, "a/b");
                assert!(!no_parents);
            }
            _ => panic!("Expected Mkdir command"),
        }
    }

    #[test]
    fn test_search_types() {
        let cli = Cli::try_parse_from([
            "filebridge",
            "search",
            "fn main",
            "--type",
            "rust,python",
            "-s",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                query,
                types,
                case_sensitive,
                ..
            } => {
                assert_eq!(query, "fn main");
                assert_eq!(types, vec!["rust", "python"]);
                assert!(case_sensitive);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_tree_depth() {
        let cli = Cli::try_parse_from(["filebridge", "tree", "src", "--depth", "2"]).unwrap();
        match cli.command {
            Commands::Tree { path, depth } => {
                assert_eq!(path, "src");
                assert_eq!(depth, Some(2));
            }
            _ => panic!("Expected Tree command"),
        }
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::try_parse_from(["filebridge", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Init { force: true }
            }
        ));

        let cli = Cli::try_parse_from(["filebridge", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Show
            }
        ));
    }

    #[test]
    fn test_init_config_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        init_config(&path, false).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        // Refuses to clobber without --force
        std::fs::write(&path, "[daemon]\nlog_level = \"debug\"\n").unwrap();
        assert!(init_config(&path, false).is_err());
        assert_eq!(Config::load(&path).unwrap().daemon.log_level, "debug");

        init_config(&path, true).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_upload_requires_files() {
        assert!(Cli::try_parse_from(["filebridge", "upload"]).is_err());
    }

    #[tokio::test]
    async fn test_local_backend_reports_errors() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.files.root = temp_dir.path().to_path_buf();
        let mut backend = Backend::Local(MessageRouter::from_config(&config.files).unwrap());

        let result = backend
            .call(Message::FileReadRequest(FileReadRequest {
                path: "missing.txt".to_string(),
            }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_to_local_file() {
        let root = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(root.path().join("data.bin"), vec![7u8; 100_000]).unwrap();

        let mut config = Config::default();
        config.files.root = root.path().to_path_buf();
        let mut backend = Backend::Local(MessageRouter::from_config(&config.files).unwrap());

        let output = out.path().join("copy.bin");
        download(&mut backend, "data.bin", Some(output.clone()))
            .await
            .unwrap();
        assert_eq!(std::fs::read(output).unwrap(), vec![7u8; 100_000]);
    }

    #[tokio::test]
    async fn test_read_upload_items_checksums() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "abc").unwrap();

        let items = read_upload_items(&[file]).await.unwrap();
        assert_eq!(items[0].name, "a.txt");
        assert_eq!(items[0].checksum.as_deref(), Some(&Sha256::digest(b"abc")[..]));
    }
}

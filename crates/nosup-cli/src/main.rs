//! nosup — resumable NOS upload client.
//!
//! Set NOSUP_HOST and NOSUP_SIGN_URL (or pass --host/--sign-url). Interrupted
//! uploads resume from the server's acknowledged offset on the next run.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use nosup_cli::{format_bytes, init_tracing};
use nosup_client::{UploadEvent, UploadSession};
use nosup_core::config::ExtensionFilter;
use nosup_core::UploadConfig;
use nosup_store::{LocalResumeStore, ResumeStore};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "nosup", about = "Resumable chunked uploads to NOS object storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file over the resumable chunked path
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Storage service base URL
        #[arg(long)]
        host: Option<String>,
        /// Signing endpoint URL
        #[arg(long)]
        sign_url: Option<String>,
        /// Transfer chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
        /// Maximum accepted file size in bytes
        #[arg(long)]
        limit_size: Option<u64>,
        /// Comma-separated extension whitelist, or "*"
        #[arg(long)]
        extensions: Option<String>,
        /// Directory for resume bookkeeping
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },
    /// Upload a file in a single pre-signed multipart form
    Form {
        /// Path to the file to upload
        file: PathBuf,
        /// Form endpoint URL
        #[arg(long)]
        host: Option<String>,
        /// Pre-signed form field as key=value (repeatable)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn store_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("NOSUP_STORE_DIR").map(PathBuf::from))
        .unwrap_or_else(|| std::env::temp_dir().join("nosup"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = UploadConfig::from_env();

    match cli.command {
        Commands::Upload {
            file,
            host,
            sign_url,
            chunk_size,
            limit_size,
            extensions,
            store_dir: dir,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(url) = sign_url {
                config.sign_url = url;
            }
            if let Some(n) = chunk_size {
                config.chunk_size = n;
            }
            if let Some(n) = limit_size {
                config.limit_size = n;
            }
            if let Some(exts) = extensions {
                config.allowed_extensions = ExtensionFilter::parse(&exts);
            }
            if config.host.is_empty() || config.sign_url.is_empty() {
                bail!("Set NOSUP_HOST and NOSUP_SIGN_URL (or pass --host and --sign-url)");
            }

            let store = LocalResumeStore::new(store_dir(dir))
                .await
                .context("Failed to open resume store")?;
            run_session(file, config, Arc::new(store)).await
        }
        Commands::Form { file, host, fields } => {
            if let Some(host) = host {
                config.host = host;
            }
            if config.host.is_empty() {
                bail!("Set NOSUP_HOST (or pass --host)");
            }
            config.form_params = Some(fields.into_iter().collect::<HashMap<_, _>>());

            let store = LocalResumeStore::new(store_dir(None))
                .await
                .context("Failed to open resume store")?;
            run_session(file, config, Arc::new(store)).await
        }
    }
}

async fn run_session(
    file: PathBuf,
    config: UploadConfig,
    store: Arc<dyn ResumeStore>,
) -> anyhow::Result<()> {
    let (handle, mut events) = UploadSession::spawn(file, config, store);

    let mut interrupted = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("Failed to listen for interrupt")?;
                interrupted = true;
                eprintln!("\nInterrupting; resume state is kept for the next run");
                handle.abort().await;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    UploadEvent::HashProgress(fraction) => {
                        print_progress("hashing", fraction);
                    }
                    UploadEvent::Progress(fraction) => {
                        print_progress("uploading", fraction);
                    }
                    UploadEvent::Completed(receipt) => {
                        println!();
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&serde_json::json!({
                                "bucket": receipt.bucket,
                                "object": receipt.object,
                                "size": receipt.size,
                                "sizeHuman": format_bytes(receipt.size),
                                "digest": receipt.digest.map(|d| d.to_string()),
                            }))?
                        );
                    }
                    UploadEvent::Failed { code, message } => {
                        println!();
                        bail!("Upload failed ({code}): {message}");
                    }
                    UploadEvent::Aborted => {
                        println!();
                        bail!("Upload aborted");
                    }
                }
            }
        }
    }

    handle.wait().await;
    Ok(())
}

fn print_progress(phase: &str, fraction: f64) {
    print!("\r{phase} {:>5.1}%", fraction * 100.0);
    let _ = std::io::stdout().flush();
}

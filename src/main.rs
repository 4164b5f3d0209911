use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use upload_resilience::error::{user_friendly_message, ClassifiedError, Failure, NoopHooks};
use upload_resilience::ui::ProgressBar;
use upload_resilience::upload::{
    validate_file, SpoolTransfer, UploadCallbacks, UploadFile, UploadStatus,
};
use upload_resilience::{ClientConfig, ClientError, ResilienceContext};

#[derive(Parser)]
#[command(name = "upload-resilience")]
#[command(about = "Resilient file upload client with classified, logged and recoverable errors")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true, env = "UPLOAD_RESILIENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file into a spool directory
    Upload {
        /// File to upload
        file: PathBuf,

        /// Directory receiving the uploaded file
        #[arg(short, long, default_value = "./spool")]
        spool: PathBuf,

        /// Fail the first N transfers to exercise retries
        #[arg(long, default_value = "0")]
        fail_first: u32,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Run the pre-upload checks on a file
    Validate {
        file: PathBuf,
    },

    /// Classify an error message the way the client would
    Classify {
        message: String,

        /// Treat the message as the body of an HTTP response with this status
        #[arg(long)]
        status: Option<u16>,
    },

    /// Inspect the persisted error log
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
}

#[derive(Subcommand)]
enum LogAction {
    /// Print the logged errors, oldest first
    Show {
        /// Print raw JSON entries
        #[arg(long)]
        json: bool,
    },

    /// Remove every logged error
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug, cli.json_logs);

    let config = ClientConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let context = ResilienceContext::install_global(ResilienceContext::persistent(
        config,
        Arc::new(NoopHooks),
    ))
    .unwrap_or_else(|existing| existing);

    match cli.command {
        Commands::Upload {
            file,
            spool,
            fail_first,
            no_progress,
        } => upload(&context, file, spool, fail_first, no_progress).await,
        Commands::Validate { file } => validate(&context, file).await,
        Commands::Classify { message, status } => {
            classify(&context, message, status);
            Ok(())
        }
        Commands::Log { action } => {
            show_or_clear_log(&context, action)?;
            Ok(())
        }
    }
}

fn init_tracing(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn upload(
    context: &ResilienceContext,
    path: PathBuf,
    spool: PathBuf,
    fail_first: u32,
    no_progress: bool,
) -> Result<()> {
    let file = UploadFile::from_path(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let total_bytes = file.size();

    let transfer = SpoolTransfer::new(spool).with_injected_failures(fail_first);
    let callbacks = UploadCallbacks::new()
        .on_success(|response| {
            tracing::info!(order_id = %response.order_id, "Order created");
        })
        .on_error(|message| {
            tracing::debug!(user_message = %message, "Upload error surfaced to user");
        });
    let controller = context.upload_controller(Arc::new(transfer), callbacks);

    println!("Uploading {} ({} bytes)", file.name, total_bytes);

    let mut bar = ProgressBar::new(40);
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let finished = controller.upload_file(file).wait();
    tokio::pin!(finished);

    let session = loop {
        tokio::select! {
            session = &mut finished => break session,
            _ = ticker.tick() => {
                if !no_progress {
                    let snapshot = controller.session();
                    bar.render(snapshot.status, snapshot.progress_percent, total_bytes);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel_upload();
            }
        }
    };

    if !no_progress {
        bar.render(session.status, session.progress_percent, total_bytes);
        bar.finish();
    }

    match (session.status, session.response, session.last_error) {
        (UploadStatus::Succeeded, Some(response), _) => {
            println!("✓ Uploaded {} as order {}", response.filename, response.order_id);
            Ok(())
        }
        (UploadStatus::Cancelled, _, _) => bail!("Upload cancelled"),
        (_, _, Some(error)) => {
            report_failure(context, &error);
            bail!("Upload did not complete ({})", error.kind());
        }
        (status, _, None) => bail!("Upload ended in unexpected state: {}", status),
    }
}

async fn validate(context: &ResilienceContext, path: PathBuf) -> Result<()> {
    let file = UploadFile::from_path(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match validate_file(&file, &context.config().upload) {
        Ok(()) => {
            println!("✓ {} ({}, {} bytes) is ready to upload", file.name, file.mime_type, file.size());
            Ok(())
        }
        Err(invalid) => bail!("{}", invalid),
    }
}

fn classify(context: &ResilienceContext, message: String, status: Option<u16>) {
    let failure: Failure = match status {
        Some(status) => ClientError::Http { status, message }.into(),
        None => message.into(),
    };
    let error = context.classifier().classify(failure);

    println!("Kind:       {} ({})", error.kind(), error.kind().description());
    println!("Severity:   {}", error.severity());
    println!("Retryable:  {}", if error.is_retryable() { "yes" } else { "no" });
    println!("Message:    {}", error.message());
    report_failure(context, &error);
}

fn report_failure(context: &ResilienceContext, error: &ClassifiedError) {
    println!("User sees:  {}", user_friendly_message(error));

    let options = context.registry().recovery_options(error);
    if !options.is_empty() {
        println!("Recovery options:");
        for option in options {
            println!("  - {}", option.description());
        }
    }
}

fn show_or_clear_log(context: &ResilienceContext, action: LogAction) -> Result<()> {
    match action {
        LogAction::Show { json } => {
            let entries = context.logger().entries();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("No errors logged");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}  {:<14} {:<8} [{}] {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind,
                    entry.severity,
                    entry.context,
                    entry.message
                );
            }
        }
        LogAction::Clear => {
            context.logger().clear();
            println!("Error log cleared");
        }
    }
    Ok(())
}

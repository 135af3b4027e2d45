//! CLI binary for edgequake-intake.
//!
//! `intake serve` runs the HTTP service; `intake process FILE` runs one
//! document through the pipeline and prints the reconciled JSON. Both map
//! flags (or `INTAKE_*` environment variables, optionally from `.env`) onto
//! `IntakeConfig`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_intake::{server, BackendKind, Intake, IntakeConfig, ShapePolicy};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the upload API on port 5000
  intake serve

  # Process one document and print the template-shaped JSON
  intake process application.pdf

  # Use a different template and keep the model's JSON as returned
  intake process --template forms/cyber.json --shape preserve scan.png

  # Route through an edgequake-llm provider instead of raw chat-completions
  intake serve --backend provider --provider anthropic --model claude-sonnet-4-20250514

HTTP ROUTES:
  GET  /                  liveness check
  POST /upload            store the multipart `file` part
  POST /api/process_doc   store and process the multipart `file` part

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Key for the chat-completions backend
  INTAKE_BASE_URL         OpenAI-compatible base URL (default https://api.openai.com/v1)
  INTAKE_TEMPLATE         Template JSON path
  INTAKE_UPLOADS_DIR      Uploaded originals root (default uploads)
  INTAKE_OUTPUT_DIR       Extracted/reconciled artifacts root (default output)
  EDGEQUAKE_LLM_PROVIDER  Provider for --backend provider when --provider is unset
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  RUST_LOG                Log filter (overrides -v / -q)

A `.env` file in the working directory is loaded before flags are parsed.
"#;

/// Extract template-shaped data from uploaded documents with vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "intake",
    version,
    about = "Extract template-shaped data from uploaded documents with vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INTAKE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "INTAKE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to bind.
        #[arg(long, env = "INTAKE_HOST", default_value = "0.0.0.0")]
        host: std::net::IpAddr,

        /// Port to bind.
        #[arg(long, env = "INTAKE_PORT", default_value_t = 5000)]
        port: u16,
    },
    /// Process a single local document and print the result.
    Process {
        /// PDF, image or text file.
        input: PathBuf,

        /// Print the full output (extraction, stats) instead of only the
        /// reconciled fields.
        #[arg(long)]
        full: bool,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Template JSON file the output is shaped after.
    #[arg(
        long,
        global = true,
        env = "INTAKE_TEMPLATE",
        default_value = "sample/template/template.json"
    )]
    template: PathBuf,

    /// Root directory for uploaded originals.
    #[arg(long, global = true, env = "INTAKE_UPLOADS_DIR", default_value = "uploads")]
    uploads_dir: PathBuf,

    /// Root directory for extracted and reconciled artifacts.
    #[arg(long, global = true, env = "INTAKE_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Completion backend.
    #[arg(
        long,
        global = true,
        env = "INTAKE_BACKEND",
        value_enum,
        default_value = "chat-completions"
    )]
    backend: BackendArg,

    /// OpenAI-compatible base URL (chat-completions backend).
    #[arg(
        long,
        global = true,
        env = "INTAKE_BASE_URL",
        default_value = edgequake_intake::config::DEFAULT_CHAT_COMPLETIONS_URL
    )]
    base_url: String,

    /// API key (chat-completions backend). Falls back to OPENAI_API_KEY.
    #[arg(long, global = true, env = "INTAKE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// edgequake-llm provider name: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "INTAKE_PROVIDER")]
    provider: Option<String>,

    /// Model for both calls.
    #[arg(long, global = true, env = "INTAKE_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Model for the reconciliation call only.
    #[arg(long, global = true, env = "INTAKE_RECONCILE_MODEL")]
    reconcile_model: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, global = true, env = "INTAKE_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Path to a text file with a custom extraction instruction.
    #[arg(long, global = true, env = "INTAKE_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// How strictly the output follows the template shape.
    #[arg(long, global = true, env = "INTAKE_SHAPE", value_enum, default_value = "repair")]
    shape: ShapeArg,

    /// Per-call model timeout in seconds.
    #[arg(long, global = true, env = "INTAKE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Maximum upload size in MiB.
    #[arg(long, global = true, env = "INTAKE_MAX_UPLOAD_MB", default_value_t = 25)]
    max_upload_mb: usize,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackendArg {
    ChatCompletions,
    Provider,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ShapeArg {
    Repair,
    Preserve,
}

impl From<ShapeArg> for ShapePolicy {
    fn from(v: ShapeArg) -> Self {
        match v {
            ShapeArg::Repair => ShapePolicy::Repair,
            ShapeArg::Preserve => ShapePolicy::Preserve,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap's env fallbacks see it
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && matches!(cli.command, Command::Process { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let config = build_config(&cli.pipeline).await?;

    match cli.command {
        Command::Serve { host, port } => {
            ensure_pdfium(cli.quiet)?;
            let intake = Intake::new(config).context("Failed to initialise the pipeline")?;
            let addr = SocketAddr::new(host, port);
            server::serve(intake, addr).await.context("Server failed")?;
        }
        Command::Process { input, full } => {
            ensure_pdfium(cli.quiet)?;
            let intake = Intake::new(config).context("Failed to initialise the pipeline")?;

            let spinner = show_progress.then(|| {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
                );
                bar.set_prefix("Processing");
                bar.set_message(input.display().to_string());
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            });

            let result = intake.process_file(&input).await;
            if let Some(bar) = spinner {
                bar.finish_and_clear();
            }

            let output = match result {
                Ok(o) => o,
                Err(e) => {
                    if !cli.quiet {
                        eprintln!("{} {}", red("✘"), e);
                    }
                    return Err(e).context("Processing failed");
                }
            };

            let json = if full {
                serde_json::to_string_pretty(&output)
            } else {
                serde_json::to_string_pretty(&output.reconciled)
            }
            .context("Failed to serialise output")?;
            println!("{json}");

            if !cli.quiet {
                eprintln!(
                    "{} submission {}  {} pages  {}ms",
                    green("✔"),
                    output.submission_id,
                    output.stats.pages,
                    output.stats.total_duration_ms
                );
                eprintln!(
                    "   {} tokens in  /  {} tokens out",
                    dim(&output.stats.total_input_tokens.to_string()),
                    dim(&output.stats.total_output_tokens.to_string()),
                );
                if !output.stats.missing_fields.is_empty() {
                    eprintln!(
                        "   {} template fields missing from the model reply",
                        output.stats.missing_fields.len()
                    );
                }
            }
        }
    }

    Ok(())
}

/// Download pdfium on first run so the first request does not pay for it.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready");
    Ok(())
}

/// Map CLI args to `IntakeConfig`.
async fn build_config(args: &PipelineArgs) -> Result<IntakeConfig> {
    let extraction_prompt = match args.extraction_prompt {
        Some(ref path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?,
        ),
        None => None,
    };

    let backend = match args.backend {
        BackendArg::ChatCompletions => BackendKind::ChatCompletions {
            base_url: args.base_url.clone(),
        },
        BackendArg::Provider => BackendKind::Provider {
            name: args.provider.clone(),
        },
    };

    let mut builder = IntakeConfig::builder()
        .template_path(&args.template)
        .uploads_root(&args.uploads_dir)
        .output_root(&args.output_dir)
        .backend(backend)
        .model(args.model.clone())
        .dpi(args.dpi)
        .shape_policy(args.shape.clone().into())
        .api_timeout_secs(args.api_timeout)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(ref m) = args.reconcile_model {
        builder = builder.reconciliation_model(m.clone());
    }
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(prompt) = extraction_prompt {
        builder = builder.extraction_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

//! Noxtools CLI - list, inspect and manage backend jobs, or watch them live

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use noxtools_core::application::{JobStore, JobView, ViewOptions};
use noxtools_core::domain::{JobStatus, JobTool};
use noxtools_core::port::{JobTransport, ListJobsParams};
use noxtools_infra_http::{
    ClientConfig, HttpJobTransport, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS,
    ENV_API_URL, ENV_STREAM_MAX_RETRIES, ENV_TIMEOUT_SECS,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "noxtools=info";

#[derive(Parser)]
#[command(name = "noxtools")]
#[command(about = "Noxtools jobs CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend API base URL
    #[arg(long, env = ENV_API_URL, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Request timeout in seconds
    #[arg(long, env = ENV_TIMEOUT_SECS, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Reconnect attempts for the event stream, or "unlimited"
    #[arg(long, env = ENV_STREAM_MAX_RETRIES)]
    stream_max_retries: Option<String>,
}

impl Cli {
    /// Client settings from flags; clap already applied the env fallbacks,
    /// so a flag wins over a bad value in the environment
    fn client_config(&self) -> noxtools_core::Result<ClientConfig> {
        let timeout = self.timeout_secs.to_string();
        ClientConfig::from_lookup(|key| match key {
            ENV_API_URL => Some(self.api_url.clone()),
            ENV_TIMEOUT_SECS => Some(timeout.clone()),
            ENV_STREAM_MAX_RETRIES => self.stream_max_retries.clone(),
            _ => None,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List jobs
    List {
        /// Only jobs of this tool
        #[arg(short, long, value_parser = parse_tool)]
        tool: Option<JobTool>,

        /// Only jobs in this status
        #[arg(short, long, value_parser = parse_status)]
        status: Option<JobStatus>,

        /// Page size requested from the backend
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Offset into the backend's job list
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// Show one job
    Get {
        /// Job ID
        job_id: String,
    },

    /// Delete a job
    Delete {
        /// Job ID
        job_id: String,
    },

    /// Cancel a running job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// Retry a failed or aborted job
    Retry {
        /// Job ID
        job_id: String,
    },

    /// Live job table, updated from the backend's event stream
    Watch {
        /// Only jobs of this tool
        #[arg(short, long, value_parser = parse_tool)]
        tool: Option<JobTool>,

        /// Rows per page
        #[arg(long, default_value = "10")]
        page_size: usize,

        /// Page to show (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,
    },
}

fn parse_tool(raw: &str) -> std::result::Result<JobTool, String> {
    raw.parse().map_err(|e: noxtools_core::domain::DomainError| e.to_string())
}

fn parse_status(raw: &str) -> std::result::Result<JobStatus, String> {
    raw.parse().map_err(|e: noxtools_core::domain::DomainError| e.to_string())
}

fn init_logging() {
    let log_format = std::env::var("NOXTOOLS_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // stdout carries tables; logs go to stderr
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = cli.client_config().context("Invalid configuration")?;

    info!(version = VERSION, api_url = %config.api_url, "Noxtools CLI");

    let transport = Arc::new(HttpJobTransport::new(config).context("Failed to create HTTP client")?);

    match cli.command {
        Commands::List {
            tool,
            status,
            limit,
            offset,
        } => {
            let params = ListJobsParams {
                tool,
                status,
                limit: Some(limit),
                offset: Some(offset),
            };
            let page = transport
                .list_jobs(&params)
                .await
                .context("Failed to list jobs")?;

            if page.items.is_empty() {
                println!("{}", "No jobs found".yellow());
            } else {
                println!("{}", render::job_table(&page.items));
                println!();
                println!(
                    "Showing {}-{} of {}",
                    page.offset + 1,
                    page.offset as usize + page.items.len(),
                    page.total
                );
            }
        }

        Commands::Get { job_id } => {
            let job = transport
                .get_job(&job_id)
                .await
                .with_context(|| format!("Failed to load job {}", job_id))?;
            render::print_job(&job, &transport);
        }

        Commands::Delete { job_id } => {
            let store = JobStore::new(transport.clone());
            store
                .delete_job(&job_id)
                .await
                .with_context(|| format!("Failed to delete job {}", job_id))?;
            println!("{}", format!("✓ Job {} deleted", job_id).green().bold());
        }

        Commands::Cancel { job_id } => {
            let store = JobStore::new(transport.clone());
            let job = store
                .cancel_job(&job_id)
                .await
                .with_context(|| format!("Failed to cancel job {}", job_id))?;
            println!(
                "{} ({})",
                format!("✓ Job {} cancelled", job_id).green().bold(),
                render::status_label(job.status)
            );
        }

        Commands::Retry { job_id } => {
            let store = JobStore::new(transport.clone());
            let job = store
                .retry_job(&job_id)
                .await
                .with_context(|| format!("Failed to retry job {}", job_id))?;
            println!(
                "{} (attempt {}/{})",
                format!("✓ Job {} queued again", job_id).green().bold(),
                job.attempt,
                job.max_attempts
            );
        }

        Commands::Watch {
            tool,
            page_size,
            page,
        } => {
            let store = JobStore::new(transport.clone());
            watch(&store, tool, page_size, page).await;
            store.dispose();
        }
    }

    Ok(())
}

async fn watch(store: &Arc<JobStore>, tool: Option<JobTool>, page_size: usize, page: usize) {
    let options = ViewOptions {
        tool,
        ..ViewOptions::default()
    }
    .with_page_size(page_size);
    let mut view = JobView::new(store.clone(), options);
    view.set_page(page);

    let title = match tool {
        Some(tool) => format!("Noxtools jobs · {}", tool),
        None => "Noxtools jobs".to_string(),
    };

    render::print_view(&title, &view.state());
    loop {
        tokio::select! {
            changed = view.changed() => {
                if !changed {
                    break;
                }
                render::print_view(&title, &view.state());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing job stream");
                break;
            }
        }
    }
}

use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Run security scanners and deliver their reports to a findings backend
#[derive(Parser)]
#[command(name = "vulnrelay", version)]
pub struct Cli {
    /// Path to the pipeline definition (YAML)
    #[arg(short, long, env = "VULNRELAY_PIPELINE")]
    pub pipeline: PathBuf,

    /// Working directory that stages run in and artifacts resolve against
    #[arg(short = 'C', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Findings backend API base URL, e.g. https://dojo.example.com/api/v2
    #[arg(long, env = "DEFECTDOJO_URL")]
    pub backend_url: String,

    /// API key for the findings backend
    #[arg(long, env = "DEFECTDOJO_API_KEY", hide_env_values = true)]
    pub backend_token: String,

    #[arg(long, env = "DEFECTDOJO_PRODUCT")]
    pub product_name: String,

    #[arg(long, env = "DEFECTDOJO_ENGAGEMENT")]
    pub engagement_name: String,

    /// Tags attached to every uploaded report
    #[arg(long, env = "DEFECTDOJO_TAGS")]
    pub tags: String,

    /// Existing test to import into
    #[arg(long, env = "DEFECTDOJO_TEST_ID")]
    pub test_id: Option<String>,

    /// Timeout in seconds for script downloads and report uploads
    #[arg(long, default_value_t = 60, env = "VULNRELAY_HTTP_TIMEOUT")]
    pub http_timeout: u64,

    /// Extra attempts for uploads that could not reach the backend
    #[arg(long, default_value_t = 2)]
    pub upload_retries: u32,

    /// Validate the definition and print the planned stages without running them
    #[arg(long)]
    pub check: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "doctree",
    version,
    about = "Hierarchical tree index generation for long documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Index(IndexArgs),
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long)]
    pub doc_path: PathBuf,

    #[arg(long, default_value = "results")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, default_value = "gpt-4o-mini")]
    pub model: String,

    #[arg(long, default_value_t = 20)]
    pub toc_check_units: usize,

    #[arg(long)]
    pub max_units: Option<usize>,

    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, default_value_t = 500)]
    pub retry_base_delay_ms: u64,

    #[arg(long, default_value_t = 2)]
    pub max_repair_rounds: u32,

    #[arg(long)]
    pub oracle_call_budget: Option<u32>,

    #[arg(long, default_value_t = 4)]
    pub oracle_concurrency: usize,

    #[arg(long, default_value_t = 30)]
    pub oracle_timeout_secs: u64,

    #[arg(long, default_value_t = 64)]
    pub min_section_chars: usize,

    #[arg(long, default_value_t = false)]
    pub offline: bool,

    #[arg(long, default_value_t = false)]
    pub skip_summaries: bool,

    #[arg(long, default_value_t = false)]
    pub with_doc_description: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long)]
    pub tree_path: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

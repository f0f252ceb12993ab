//! Runtime configuration for the harvester binary.
//!
//! Values come from an optional RON file and are then overridden by
//! command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use engine_logging::LogDestination;
use log::LevelFilter;
use serde::Deserialize;
use thread_core::Cursor;
use thread_engine::{FetchSettings, SchedulerConfig, WireFormat, DEFAULT_MAX_CONCURRENT_WORKERS};

/// Harvest every item and reply of one or more comment threads
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "thread-harvest",
    version,
    about = "Harvest every item and reply of one or more comment threads",
    after_help = "EXAMPLES:\n    \
        thread-harvest dQw4w9WgXcQ\n    \
        thread-harvest 'https://www.youtube.com/watch?v=dQw4w9WgXcQ',9bZkp7q19f0 -w 6\n    \
        thread-harvest --config harvest.ron --no-html"
)]
pub struct CliArgs {
    /// Thread ids or URLs, comma separated
    #[arg(value_name = "THREADS", value_delimiter = ',')]
    pub threads: Vec<String>,

    /// RON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL of the comment source
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Maximum number of reply pages fetched at once
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Resume the top-level stream at this cursor
    #[arg(long, value_name = "CURSOR")]
    pub start_cursor: Option<String>,

    /// Directory receiving comments-<thread>.json and .html
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Body layout spoken by the source
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Retry attempts for transient failures
    #[arg(long, value_name = "NUM")]
    pub retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Subtracted from every like counter
    #[arg(long, value_name = "NUM")]
    pub like_baseline: Option<u64>,

    /// Skip the HTML rendering
    #[arg(long)]
    pub no_html: bool,

    /// Also write the log to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    HtmlFragment,
}

impl From<FormatArg> for WireFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => WireFormat::Json,
            FormatArg::HtmlFragment => WireFormat::HtmlFragment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub base_url: String,
    pub threads: Vec<String>,
    pub max_concurrent_workers: usize,
    pub start_cursor: Option<String>,
    pub output_dir: PathBuf,
    pub wire_format: WireFormat,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub like_count_baseline: u64,
    pub render_html: bool,
    pub log_file: Option<PathBuf>,
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            base_url: fetch.base_url,
            threads: Vec::new(),
            max_concurrent_workers: DEFAULT_MAX_CONCURRENT_WORKERS,
            start_cursor: None,
            output_dir: PathBuf::from("."),
            wire_format: WireFormat::default(),
            max_retries: fetch.max_retries,
            request_timeout_secs: fetch.request_timeout.as_secs(),
            like_count_baseline: 0,
            render_html: true,
            log_file: None,
            verbose: false,
        }
    }
}

impl AppConfig {
    /// File values (if a file was given) with flags applied on top.
    pub fn resolve(args: &CliArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_ron(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    fn apply(&mut self, args: &CliArgs) {
        if !args.threads.is_empty() {
            self.threads = args.threads.clone();
        }
        if let Some(base_url) = &args.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(workers) = args.workers {
            self.max_concurrent_workers = workers;
        }
        if let Some(cursor) = &args.start_cursor {
            self.start_cursor = Some(cursor.clone());
        }
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(format) = args.format {
            self.wire_format = format.into();
        }
        if let Some(retries) = args.retries {
            self.max_retries = retries;
        }
        if let Some(timeout) = args.timeout {
            self.request_timeout_secs = timeout;
        }
        if let Some(baseline) = args.like_baseline {
            self.like_count_baseline = baseline;
        }
        if args.no_html {
            self.render_html = false;
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = Some(log_file.clone());
        }
        self.verbose |= args.verbose;
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.threads.iter().all(|thread| thread.trim().is_empty()) {
            bail!("no thread given; pass ids or URLs, or list them under `threads` in the config file");
        }
        if self.max_concurrent_workers == 0 {
            bail!("max_concurrent_workers must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn threads(&self) -> impl Iterator<Item = &str> {
        self.threads
            .iter()
            .map(|thread| thread.trim())
            .filter(|thread| !thread.is_empty())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_workers: self.max_concurrent_workers,
            start_cursor: self.start_cursor.clone().map(Cursor::new),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            ..FetchSettings::default()
        }
    }

    pub fn log_destination(&self) -> LogDestination {
        match &self.log_file {
            Some(path) => LogDestination::Both(path.clone()),
            None => LogDestination::Terminal,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

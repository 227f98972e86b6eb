use std::path::PathBuf;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::parser::extract::quota::QuotaLayout;
use crate::parser::outline::SharedPagePolicy;

/// Runtime settings: defaults, then `merit.toml` (if present), then
/// `MERIT_*` environment variables (`MERIT_LAYOUT__GENDER=4` for nested keys).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Worker threads for section processing; 0 picks available parallelism.
    pub workers: usize,
    /// Sections handed to the pool per progress step.
    pub chunk_size: usize,
    pub shared_pages: SharedPagePolicy,
    pub layout: QuotaLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/merit.sqlite"),
            workers: 0,
            chunk_size: 500,
            shared_pages: SharedPagePolicy::default(),
            layout: QuotaLayout::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Settings> {
        let builder = Config::builder()
            .add_source(File::with_name("merit").required(false))
            .add_source(
                Environment::with_prefix("MERIT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        from_builder(builder)
    }

    /// Thread count for `jobs` independent work items.
    pub fn worker_count(&self, jobs: usize) -> usize {
        let wanted = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        };
        wanted.min(jobs).max(1)
    }
}

fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    builder
        .build()
        .context("failed to read settings")?
        .try_deserialize()
        .context("invalid settings")
}

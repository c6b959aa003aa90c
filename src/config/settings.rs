use crate::common::{Error, Result};
use crate::config::config::{
    DEFAULT_NODE_ID, DEFAULT_PAGE_SIZE, DEFAULT_SEARCH_THREADS, ENV_PREFIX, PAGE_OVERHEAD_FACTOR,
};
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Node level settings of the execution core.
///
/// Loaded from compiled defaults, then an optional TOML file, then
/// `RUSTYEXEC_*` environment variables (nested keys joined with `__`,
/// e.g. `RUSTYEXEC_PAGING__PAGE_SIZE`).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Settings {
    /// Id of the local node, used as default coordinator and for shard routing.
    pub node_id: String,
    /// Number of threads of the search executor.
    pub search_threads: usize,
    pub paging: Paging,
}

/// Row budget heuristic for shard level collection.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct Paging {
    pub page_size: usize,
    pub overhead_factor: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID.to_string(),
            search_threads: DEFAULT_SEARCH_THREADS,
            paging: Paging::default(),
        }
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            overhead_factor: PAGE_OVERHEAD_FACTOR,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("node_id", DEFAULT_NODE_ID)?
            .set_default("search_threads", DEFAULT_SEARCH_THREADS as i64)?
            .set_default("paging.page_size", DEFAULT_PAGE_SIZE as i64)?
            .set_default("paging.overhead_factor", PAGE_OVERHEAD_FACTOR)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(Error::Config("`node_id` must not be empty".to_string()));
        }
        if self.search_threads == 0 {
            return Err(Error::Config("`search_threads` must be at least 1".to_string()));
        }
        if self.paging.page_size == 0 {
            return Err(Error::Config("`paging.page_size` must be at least 1".to_string()));
        }
        if self.paging.overhead_factor.is_nan() || self.paging.overhead_factor <= 0.0 {
            return Err(Error::Config(
                "`paging.overhead_factor` must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Paging {
    /// Number of rows to request from one shard, given the rows wanted from the
    /// node (`limit`, falling back to the page size) and the shard's share of the
    /// node's shards (`weight`). Over-fetches by the overhead factor, but never
    /// beyond `limit`.
    pub fn weighted_page_size(&self, limit: Option<usize>, weight: f64) -> usize {
        let limit_or_page_size = limit.unwrap_or(self.page_size);
        if 1.0 / weight > limit_or_page_size as f64 {
            return limit_or_page_size;
        }
        let dynamic = ((limit_or_page_size as f64 * weight * self.overhead_factor) as usize).max(1);
        match limit {
            Some(limit) => dynamic.min(limit),
            None => dynamic,
        }
    }
}

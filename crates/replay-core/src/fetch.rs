//! Collaborator boundary for historical data acquisition.
//!
//! Actual vendor clients live outside the core; the replayer only needs one
//! call that yields a full day package.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::package::DataPackage;

/// Supplies the raw data package a replay session is built from.
pub trait HistoricalDataFetcher {
    fn fetch_day(&self, date: NaiveDate) -> Result<DataPackage>;
}

impl<F: HistoricalDataFetcher + ?Sized> HistoricalDataFetcher for &F {
    fn fetch_day(&self, date: NaiveDate) -> Result<DataPackage> {
        (**self).fetch_day(date)
    }
}

/// Read-through JSON file cache around an inner fetcher. With caching
/// disabled it is a transparent passthrough.
pub struct FileCacheFetcher<F> {
    inner: F,
    cache_dir: PathBuf,
    enabled: bool,
}

impl<F: HistoricalDataFetcher> FileCacheFetcher<F> {
    pub fn new(inner: F, cache_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            inner,
            cache_dir: cache_dir.into(),
            enabled,
        }
    }

    fn cache_path(&self, date: NaiveDate) -> PathBuf {
        self.cache_dir.join(format!("{date}.json"))
    }
}

impl<F: HistoricalDataFetcher> HistoricalDataFetcher for FileCacheFetcher<F> {
    fn fetch_day(&self, date: NaiveDate) -> Result<DataPackage> {
        let path = self.cache_path(date);

        if self.enabled && path.exists() {
            match fs::read_to_string(&path)
                .context("read cached package")
                .and_then(|raw| serde_json::from_str(&raw).context("parse cached package"))
            {
                Ok(package) => {
                    tracing::debug!(path = %path.display(), "Loaded day package from cache");
                    return Ok(package);
                }
                Err(err) => {
                    // Corrupt cache entry: refetch rather than fail the run.
                    tracing::warn!(path = %path.display(), %err, "Ignoring unreadable cache entry");
                }
            }
        }

        let package = self.inner.fetch_day(date)?;

        if self.enabled {
            if let Err(err) = fs::create_dir_all(&self.cache_dir)
                .map_err(anyhow::Error::from)
                .and_then(|_| Ok(serde_json::to_string(&package)?))
                .and_then(|raw| Ok(fs::write(&path, raw)?))
            {
                tracing::warn!(path = %path.display(), %err, "Failed to write day package cache");
            }
        }

        Ok(package)
    }
}

//! Durable per-ticker store of daily closes.
//!
//! The whole cache is one JSON document, `{ticker: {"YYYY-MM-DD": close}}`,
//! rewritten atomically (temp file + fsync + rename) on every effective merge.
//! Readers get `Arc` snapshots of a ticker's series, so a concurrent merge is
//! seen either entirely or not at all.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use portfolio_core::{PortfolioError, PriceSeries};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What a single `merge` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
    /// Entries dated before the latest cached date
    pub ignored: usize,
    /// Non-finite or non-positive prices
    pub rejected: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.replaced > 0
    }
}

pub struct PriceCache {
    path: PathBuf,
    series: DashMap<String, Arc<PriceSeries>>,
    write_lock: Mutex<()>,
}

impl PriceCache {
    /// Open the cache at `path`, degrading to an empty cache when the file is
    /// missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::try_open(&path) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("{} ({}); starting with an empty price cache", e, path.display());
                Self::empty(path)
            }
        }
    }

    /// Open the cache at `path`, reporting a corrupt file as `CacheCorrupt`.
    /// A missing file is an empty cache, not an error.
    pub fn try_open(path: &Path) -> Result<Self, PortfolioError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No price cache at {}, starting empty", path.display());
                return Ok(Self::empty(path.to_path_buf()));
            }
            Err(e) => return Err(PortfolioError::CacheCorrupt(e.to_string())),
        };

        let raw: BTreeMap<String, BTreeMap<String, f64>> = serde_json::from_slice(&bytes)
            .map_err(|e| PortfolioError::CacheCorrupt(e.to_string()))?;

        // Closes dated after today can only come from a damaged file
        let today = Utc::now().date_naive();
        let cache = Self::empty(path.to_path_buf());
        let mut dropped = 0usize;
        for (ticker, entries) in raw {
            let mut series = PriceSeries::new();
            for (date, price) in entries {
                match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                    Ok(date) if date <= today => {
                        series.insert(date, price);
                    }
                    _ => dropped += 1,
                }
            }
            dropped += series.retain_valid();
            if !series.is_empty() {
                cache.series.insert(ticker, Arc::new(series));
            }
        }

        if dropped > 0 {
            tracing::warn!("Dropped {} invalid entries while loading {}", dropped, path.display());
        }
        tracing::info!("Loaded price cache with {} tickers from {}", cache.len(), path.display());

        Ok(cache)
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            series: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, ticker: &str) -> Option<Arc<PriceSeries>> {
        self.series.get(ticker).map(|s| Arc::clone(s.value()))
    }

    pub fn last_cached_date(&self, ticker: &str) -> Option<NaiveDate> {
        self.series.get(ticker).and_then(|s| s.latest_date())
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.series.contains_key(ticker)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        tickers.sort();
        tickers
    }

    /// Point-in-time copy of every series, for one consistent valuation pass.
    pub fn snapshot(&self) -> HashMap<String, Arc<PriceSeries>> {
        self.series
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Merge freshly fetched closes for `ticker`.
    ///
    /// Only entries dated on or after the latest cached date are applied, so
    /// history is never rewritten while the newest close can still be
    /// corrected. The file is flushed before returning; if the flush fails the
    /// ticker's previous series is restored.
    pub fn merge(&self, ticker: &str, entries: &PriceSeries) -> Result<MergeStats, PortfolioError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = self.get(ticker);
        let floor = previous.as_ref().and_then(|s| s.latest_date());
        let mut next = previous.as_deref().cloned().unwrap_or_default();
        let mut stats = MergeStats::default();

        for (date, price) in entries.iter() {
            if !(price.is_finite() && price > 0.0) {
                stats.rejected += 1;
                continue;
            }
            if floor.is_some_and(|floor| date < floor) {
                stats.ignored += 1;
                continue;
            }
            match next.insert(date, price) {
                None => stats.inserted += 1,
                Some(old) if old != price => stats.replaced += 1,
                Some(_) => {}
            }
        }

        if !stats.changed() {
            return Ok(stats);
        }

        self.series.insert(ticker.to_string(), Arc::new(next));

        if let Err(e) = self.flush_locked() {
            match previous {
                Some(prev) => {
                    self.series.insert(ticker.to_string(), prev);
                }
                None => {
                    self.series.remove(ticker);
                }
            }
            return Err(e);
        }

        Ok(stats)
    }

    /// Write the whole cache. Caller holds `write_lock`.
    fn flush_locked(&self) -> Result<(), PortfolioError> {
        let ordered: BTreeMap<String, Arc<PriceSeries>> = self
            .series
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let document: BTreeMap<&str, &PriceSeries> =
            ordered.iter().map(|(ticker, series)| (ticker.as_str(), series.as_ref())).collect();
        let bytes = serde_json::to_vec(&document)
            .map_err(|e| PortfolioError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Benchmark, PortfolioError, Universe};

/// Market data provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub rate_limit_per_minute: usize,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.polygon.io".to_string(),
            rate_limit_per_minute: 5,
            timeout_secs: 30,
        }
    }
}

/// When and how the daily refresh runs.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub update_time: NaiveTime,
    pub timezone: Tz,
    pub timeout_secs: u64,
    pub fetch_concurrency: usize,
    pub lookback_days: i64,
    pub on_startup: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            update_time: NaiveTime::from_hms_opt(17, 30, 0).unwrap_or_default(),
            timezone: chrono_tz::America::New_York,
            timeout_secs: 7200,
            fetch_concurrency: 4,
            lookback_days: 7,
            on_startup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortfolioConfig {
    pub universe: Universe,
    pub initial_capital: f64,
    pub inception_date: NaiveDate,
    /// Fraction of capital allocated to each position
    pub position_size: f64,
    pub benchmarks: Vec<Benchmark>,
    pub cache_dir: PathBuf,
    pub provider: ProviderConfig,
    pub update: UpdateConfig,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            universe: Universe::default(),
            initial_capital: 100_000.0,
            inception_date: NaiveDate::from_ymd_opt(2025, 10, 28).unwrap_or_default(),
            position_size: 0.01,
            benchmarks: default_benchmarks(),
            cache_dir: PathBuf::from("data"),
            provider: ProviderConfig::default(),
            update: UpdateConfig::default(),
        }
    }
}

fn default_benchmarks() -> Vec<Benchmark> {
    vec![
        Benchmark { symbol: "^GSPC".to_string(), label: "S&P 500".to_string() },
        Benchmark { symbol: "^RUA".to_string(), label: "Russell 3000".to_string() },
    ]
}

impl PortfolioConfig {
    pub fn from_env() -> Result<Self, PortfolioError> {
        let defaults = Self::default();

        let universe = match env::var("UNIVERSE_CSV") {
            Ok(path) if !path.trim().is_empty() => {
                let size = parse_env("UNIVERSE_SIZE", 100usize)?;
                Universe::from_scores_csv(&PathBuf::from(path.trim()), size)?
            }
            _ => defaults.universe,
        };

        let api_key = env::var("MASSIVE_API_KEY")
            .or_else(|_| env::var("POLYGON_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());

        let update_time = match env::var("UPDATE_TIME") {
            Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|e| PortfolioError::Config(format!("UPDATE_TIME={}: {}", raw, e)))?,
            Err(_) => defaults.update.update_time,
        };

        let timezone = match env::var("UPDATE_TIMEZONE") {
            Ok(raw) => raw
                .trim()
                .parse::<Tz>()
                .map_err(|e| PortfolioError::Config(format!("UPDATE_TIMEZONE={}: {}", raw, e)))?,
            Err(_) => defaults.update.timezone,
        };

        let benchmarks = match env::var("BENCHMARKS") {
            Ok(raw) => parse_benchmarks(&raw),
            Err(_) => defaults.benchmarks,
        };

        let config = Self {
            universe,
            initial_capital: parse_env("INITIAL_CAPITAL", defaults.initial_capital)?,
            inception_date: parse_env("INCEPTION_DATE", defaults.inception_date)?,
            position_size: parse_env("POSITION_SIZE", defaults.position_size)?,
            benchmarks,
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            provider: ProviderConfig {
                api_key,
                base_url: env::var("MARKET_DATA_BASE_URL")
                    .unwrap_or(defaults.provider.base_url),
                rate_limit_per_minute: parse_env(
                    "MARKET_DATA_RATE_LIMIT",
                    defaults.provider.rate_limit_per_minute,
                )?,
                timeout_secs: parse_env("MARKET_DATA_TIMEOUT_SECS", defaults.provider.timeout_secs)?,
            },
            update: UpdateConfig {
                update_time,
                timezone,
                timeout_secs: parse_env("UPDATE_TIMEOUT_SECS", defaults.update.timeout_secs)?,
                fetch_concurrency: parse_env("FETCH_CONCURRENCY", defaults.update.fetch_concurrency)?,
                lookback_days: parse_env("LOOKBACK_DAYS", defaults.update.lookback_days)?,
                on_startup: parse_env("UPDATE_ON_STARTUP", defaults.update.on_startup)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PortfolioError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(PortfolioError::Config("INITIAL_CAPITAL must be positive".to_string()));
        }
        if !(self.position_size.is_finite() && self.position_size > 0.0) {
            return Err(PortfolioError::Config("POSITION_SIZE must be positive".to_string()));
        }
        if self.update.fetch_concurrency == 0 {
            return Err(PortfolioError::Config("FETCH_CONCURRENCY must be at least 1".to_string()));
        }
        if self.provider.rate_limit_per_minute == 0 {
            return Err(PortfolioError::Config(
                "MARKET_DATA_RATE_LIMIT must be at least 1".to_string(),
            ));
        }
        if self.update.lookback_days < 0 {
            return Err(PortfolioError::Config("LOOKBACK_DAYS must not be negative".to_string()));
        }
        Ok(())
    }

    /// Dollar slice allocated to each position.
    pub fn position_dollars(&self) -> f64 {
        self.initial_capital * self.position_size
    }

    /// Every ticker an update has to fetch: the universe plus benchmarks.
    pub fn all_tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.universe.members().map(|(t, _)| t.to_string()).collect();
        for benchmark in &self.benchmarks {
            if !tickers.contains(&benchmark.symbol) {
                tickers.push(benchmark.symbol.clone());
            }
        }
        tickers
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join("price_cache.json")
    }
}

/// `SYMBOL:Label,SYMBOL:Label`; a missing label falls back to the symbol.
fn parse_benchmarks(raw: &str) -> Vec<Benchmark> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((symbol, label)) => Benchmark {
                symbol: symbol.trim().to_string(),
                label: label.trim().to_string(),
            },
            None => Benchmark { symbol: entry.to_string(), label: entry.to_string() },
        })
        .collect()
}

fn parse_env<T>(key: &str, default: T) -> Result<T, PortfolioError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PortfolioError::Config(format!("{}={}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::{PortfolioError, Side};

/// Default long basket: top 100 names by composite score.
const DEFAULT_LONG: &[&str] = &[
    "AREN", "AZO", "ORLY", "NXXT", "EPSN", "NJR", "FRPH", "ASC", "JOUT", "LPG",
    "RYI", "MKTX", "RSVR", "MTN", "CHH", "PTEN", "CCRD", "MAMA", "AGNC", "AMCX",
    "EFC", "CSV", "GRMN", "SWKH", "ELA", "KINS", "LUCD", "AIP", "VRSN", "AVNT",
    "SPR", "KREF", "VLGEA", "ESNT", "CACI", "PRKS", "BL", "MPX", "LVWR", "SPSC",
    "SFBC", "CCBG", "ALG", "OMC", "SAFT", "JAKK", "PANW", "LQDT", "ALKT", "VGAS",
    "TILE", "III", "BJRI", "CCB", "NVEC", "PDEX", "WD", "TRAK", "AVA", "SNCY",
    "NATR", "AOS", "SBFG", "CSPI", "FELE", "INVA", "PLAY", "COST", "SNOW", "OVBC",
    "CZWI", "MAS", "YORW", "ESI", "PVLA", "NABL", "CRUS", "GHC", "JKHY", "DHT",
    "PLOW", "PKE", "EML", "USPH", "FUBO", "NVST", "CELC", "HSHP", "AEHR", "XYL",
    "ADP", "HY", "VICI", "TUSK", "HG", "BNTC", "AXS", "STXS", "ATLO", "IMAX",
];

/// Default short basket: bottom 100 names by composite score.
const DEFAULT_SHORT: &[&str] = &[
    "TFC", "CAPR", "LYFT", "JPM", "FNKO", "DAVE", "CART", "HIMS", "KRUS", "LEU",
    "HIPO", "SLQT", "AMTB", "DASH", "ABCB", "OLPX", "CVNA", "BAC", "WWW", "TROX",
    "HYLN", "ACDC", "CDTX", "EU", "SOUN", "CZFS", "SKIL", "APLD", "CC", "ASB",
    "HUMA", "RH", "KOD", "BAND", "SEI", "SNV", "LMND", "SPWR", "NU", "CEG",
    "CRML", "TSLA", "PRME", "CUBI", "ASPI", "ENVX", "PL", "ACHR", "FWRD", "EBS",
    "BEPC", "RDW", "WULF", "RYAM", "BE", "GEO", "COIN", "REAL", "LPRO", "NGNE",
    "RXRX", "KEY", "CIFR", "AFRM", "HBNC", "NRG", "DUOL", "KFS", "TRUP", "CLNE",
    "HOOD", "TE", "BBAI", "EDIT", "FLYW", "LUNR", "AAOI", "EVLV", "PTON", "SMMT",
    "GEVO", "APP", "ELF", "CDZI", "AIRS", "SEZL", "SMHI", "LNSR", "SMCI", "INOD",
    "ISPR", "PCT", "UPST", "DRUG", "RNAC", "ETON", "BKKT", "AXON", "UAMY", "FFAI",
];

/// The two disjoint baskets of the portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    long: Vec<String>,
    short: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Composite Score")]
    composite_score: f64,
}

impl Universe {
    /// Build a universe, rejecting empty baskets, duplicates and overlap.
    pub fn new(long: Vec<String>, short: Vec<String>) -> Result<Self, PortfolioError> {
        if long.is_empty() || short.is_empty() {
            return Err(PortfolioError::Config(
                "long and short baskets must both be non-empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for ticker in long.iter().chain(short.iter()) {
            if !seen.insert(ticker.as_str()) {
                return Err(PortfolioError::Config(format!(
                    "ticker {} appears more than once in the universe",
                    ticker
                )));
            }
        }

        Ok(Self { long, short })
    }

    /// Rank a `Ticker,Composite Score` CSV and take the top `size` names as
    /// longs and the bottom `size` as shorts.
    pub fn from_scores_csv(path: &Path, size: usize) -> Result<Self, PortfolioError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PortfolioError::Config(format!("{}: {}", path.display(), e)))?;

        let mut rows = Vec::new();
        for record in reader.deserialize::<ScoreRow>() {
            let row = record
                .map_err(|e| PortfolioError::Config(format!("{}: {}", path.display(), e)))?;
            rows.push(row);
        }

        if rows.len() < size * 2 {
            return Err(PortfolioError::Config(format!(
                "{} has {} scored tickers, need at least {}",
                path.display(),
                rows.len(),
                size * 2
            )));
        }

        rows.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let long = rows[..size].iter().map(|r| r.ticker.trim().to_string()).collect();
        let short = rows[rows.len() - size..]
            .iter()
            .map(|r| r.ticker.trim().to_string())
            .collect();

        Self::new(long, short)
    }

    pub fn long(&self) -> &[String] {
        &self.long
    }

    pub fn short(&self) -> &[String] {
        &self.short
    }

    /// Every ticker with its side, longs first.
    pub fn members(&self) -> impl Iterator<Item = (&str, Side)> + '_ {
        self.long
            .iter()
            .map(|t| (t.as_str(), Side::Long))
            .chain(self.short.iter().map(|t| (t.as_str(), Side::Short)))
    }

    pub fn side_of(&self, ticker: &str) -> Option<Side> {
        if self.long.iter().any(|t| t == ticker) {
            Some(Side::Long)
        } else if self.short.iter().any(|t| t == ticker) {
            Some(Side::Short)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.long.len() + self.short.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long.is_empty() && self.short.is_empty()
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self {
            long: DEFAULT_LONG.iter().map(|s| s.to_string()).collect(),
            short: DEFAULT_SHORT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

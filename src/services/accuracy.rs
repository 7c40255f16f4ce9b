//! Rolling hit-rate tracking for fused signals and external predictions.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PredictionConfig;
use crate::error::{EngineError, Result};

/// Hit rate assumed before any outcome is recorded.
const DEFAULT_HIT_RATE: f64 = 0.5;

/// Trade ids remembered for deduplication, per slot of the rolling window.
const SEEN_TRADES_PER_SLOT: usize = 10;

/// Persisted state of an [`AccuracyTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySnapshot {
    /// Most recent outcomes, oldest first.
    pub outcomes: Vec<bool>,
    /// Most recently recorded trade ids, oldest first.
    #[serde(default)]
    pub seen_trades: Vec<String>,
    pub hit_rate: f64,
    pub weight: f64,
    pub trade_count: u64,
    pub correct_count: u64,
    pub updated_at: DateTime<Utc>,
}

/// Rolling accuracy over the last `window` resolved trades.
///
/// Recording is idempotent by trade id over the last `10 x window` ids.
/// The fusion weight given to an external prediction is recomputed every
/// `reweight_every` outcomes.
#[derive(Debug, Clone)]
pub struct AccuracyTracker {
    config: PredictionConfig,
    outcomes: VecDeque<bool>,
    seen_trades: HashSet<String>,
    seen_order: VecDeque<String>,
    weight: f64,
    trade_count: u64,
    correct_count: u64,
}

impl Default for AccuracyTracker {
    fn default() -> Self {
        Self::new(PredictionConfig::default())
    }
}

impl AccuracyTracker {
    pub fn new(config: PredictionConfig) -> Self {
        let weight = config.base_weight;
        Self {
            outcomes: VecDeque::with_capacity(config.window),
            seen_trades: HashSet::new(),
            seen_order: VecDeque::new(),
            weight,
            trade_count: 0,
            correct_count: 0,
            config,
        }
    }

    /// Record a resolved trade. Returns false if the trade id was already seen.
    pub fn record(&mut self, trade_id: &str, correct: bool) -> bool {
        if !self.seen_trades.insert(trade_id.to_string()) {
            debug!(trade_id, "Outcome already recorded");
            return false;
        }
        self.remember(trade_id.to_string());

        self.outcomes.push_back(correct);
        while self.outcomes.len() > self.config.window.max(1) {
            self.outcomes.pop_front();
        }
        self.trade_count += 1;
        if correct {
            self.correct_count += 1;
        }

        if self.config.reweight_every > 0 && self.trade_count % self.config.reweight_every as u64 == 0 {
            self.recompute_weight();
        }

        debug!(
            trade_id,
            correct,
            hit_rate = self.hit_rate(),
            samples = self.outcomes.len(),
            "Outcome recorded"
        );
        true
    }

    /// Share of correct outcomes in the window (0.5 when empty).
    pub fn hit_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return DEFAULT_HIT_RATE;
        }
        self.outcomes.iter().filter(|c| **c).count() as f64 / self.outcomes.len() as f64
    }

    /// Conviction multiplier applied around the neutral score: 0.5 + 0.5 x hit rate.
    pub fn confidence_factor(&self) -> f64 {
        0.5 + 0.5 * self.hit_rate()
    }

    /// Scale a raw probability by historical reliability, clamped to [0, 1].
    pub fn adjust_confidence(&self, raw: f64) -> f64 {
        let rate = self.hit_rate();
        let factor = if rate > self.config.high_accuracy {
            1.2
        } else if rate < self.config.low_accuracy {
            0.8
        } else {
            1.0
        };
        (raw * factor).clamp(0.0, 1.0)
    }

    /// Current fusion weight of the external prediction.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn samples(&self) -> usize {
        self.outcomes.len()
    }

    pub fn trade_count(&self) -> u64 {
        self.trade_count
    }

    pub fn correct_count(&self) -> u64 {
        self.correct_count
    }

    fn recompute_weight(&mut self) {
        let c = &self.config;
        let rate = self.hit_rate();
        self.weight = if rate > c.high_accuracy {
            f64::min(c.max_weight, c.base_weight + (rate - c.high_accuracy) * 0.5)
        } else if rate < c.low_accuracy {
            f64::max(c.min_weight, c.base_weight - (c.low_accuracy - rate) * 0.5)
        } else {
            c.base_weight
        };
        info!(
            weight = self.weight,
            hit_rate = rate,
            "Prediction weight recomputed"
        );
    }

    fn seen_capacity(&self) -> usize {
        self.config.window.max(1) * SEEN_TRADES_PER_SLOT
    }

    /// Track an id already in `seen_trades`, forgetting the oldest past capacity.
    fn remember(&mut self, trade_id: String) {
        self.seen_order.push_back(trade_id);
        while self.seen_order.len() > self.seen_capacity() {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen_trades.remove(&oldest);
            }
        }
    }

    /// Number of trade ids remembered for deduplication.
    pub fn seen_count(&self) -> usize {
        self.seen_order.len()
    }

    pub fn snapshot(&self) -> AccuracySnapshot {
        AccuracySnapshot {
            outcomes: self.outcomes.iter().copied().collect(),
            seen_trades: self.seen_order.iter().cloned().collect(),
            hit_rate: self.hit_rate(),
            weight: self.weight,
            trade_count: self.trade_count,
            correct_count: self.correct_count,
            updated_at: Utc::now(),
        }
    }

    /// Replace the in-memory state with a persisted snapshot.
    pub fn restore(&mut self, snapshot: AccuracySnapshot) {
        let window = self.config.window.max(1);
        let skip = snapshot.outcomes.len().saturating_sub(window);
        self.outcomes = snapshot.outcomes.into_iter().skip(skip).collect();
        self.seen_trades.clear();
        self.seen_order.clear();
        for trade_id in snapshot.seen_trades {
            if self.seen_trades.insert(trade_id.clone()) {
                self.remember(trade_id);
            }
        }
        self.weight = snapshot
            .weight
            .clamp(self.config.min_weight, self.config.max_weight);
        self.trade_count = snapshot.trade_count;
        self.correct_count = snapshot.correct_count;
        info!(
            hit_rate = self.hit_rate(),
            weight = self.weight,
            samples = self.outcomes.len(),
            "Accuracy state restored"
        );
    }
}

/// Persistence for tracker snapshots, keyed by tracker name.
pub trait AccuracyStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<AccuracySnapshot>>;
    fn save(&self, name: &str, snapshot: &AccuracySnapshot) -> Result<()>;

    /// Append a resolved trade to the outcome archive. Returns false if it
    /// was already archived or the store keeps no archive.
    fn archive(&self, _tracker: &str, _trade_id: &str, _correct: bool) -> Result<bool> {
        Ok(false)
    }
}

/// Stores one `<name>.json` file per tracker under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(EngineError::Persistence(format!("invalid tracker name: {:?}", name)));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

impl AccuracyStore for JsonFileStore {
    fn load(&self, name: &str) -> Result<Option<AccuracySnapshot>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        match serde_json::from_str(&contents) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Ignoring unreadable accuracy file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, name: &str, snapshot: &AccuracySnapshot) -> Result<()> {
        let path = self.path_for(name)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved accuracy snapshot to {}", path.display());
        Ok(())
    }
}

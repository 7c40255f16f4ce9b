pub mod accuracy;
pub mod cache;
pub mod entry;
pub mod exit;
pub mod features;
pub mod fusion;
pub mod layers;
pub mod prediction;
pub mod signals;
pub mod sqlite_store;

pub use accuracy::{AccuracySnapshot, AccuracyStore, AccuracyTracker, JsonFileStore};
pub use cache::{fingerprint, Cache, CacheStats, DetectorCache};
pub use entry::{EntryPlanner, TargetLadder};
pub use exit::ExitEvaluator;
pub use features::{FeatureExtractor, FEATURE_NAMES};
pub use fusion::{decide, FusionInputs, SignalEngine};
pub use layers::{LayerContext, LayerScorer, MacroLayer, MesoLayer, MicroLayer};
pub use prediction::{PredictionAdapter, Predictor};
pub use signals::{
    Detector, LevelDetector, PatternDetector, PowerSignals, VolumeDistributionAnalyzer,
};
pub use sqlite_store::SqliteStore;

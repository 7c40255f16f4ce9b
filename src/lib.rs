//! Apex - multi-layer signal fusion engine for short-horizon trading decisions

pub mod config;
pub mod error;
pub mod services;
pub mod types;

pub use config::{EngineConfig, RiskProfile};
pub use error::{EngineError, Result};
pub use services::{
    AccuracyStore, AccuracyTracker, DetectorCache, EntryPlanner, ExitEvaluator, JsonFileStore,
    PredictionAdapter, Predictor, SignalEngine, SqliteStore, TargetLadder,
};
pub use types::*;

//! Replay one analysis cycle over a JSON window file.
//!
//! Usage: `apex <window.json>`
//!
//! The file holds `bars`, optional aligned `indicators`, an optional
//! open `position` and resolved trade `outcomes` to feed the accuracy
//! trackers. Accuracy state is restored from `APEX_DB_PATH` (SQLite) or
//! `APEX_ACCURACY_DIR` (JSON files) when set.

use std::env;
use std::fs;

use anyhow::{bail, Context};
use apex::{
    AccuracyStore, Bar, EngineConfig, EntryPlanner, ExitEvaluator, IndicatorSnapshot,
    JsonFileStore, MarketWindow, Position, SignalEngine, SqliteStore,
};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize)]
struct ReplayInput {
    bars: Vec<Bar>,
    #[serde(default)]
    indicators: Vec<IndicatorSnapshot>,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    outcomes: Vec<TradeOutcome>,
}

#[derive(Debug, Deserialize)]
struct TradeOutcome {
    trade_id: String,
    correct: bool,
    /// Outcome of the external prediction rather than the fused signal.
    #[serde(default)]
    prediction: bool,
}

fn open_store() -> anyhow::Result<Option<Box<dyn AccuracyStore>>> {
    if let Ok(path) = env::var("APEX_DB_PATH") {
        let store = SqliteStore::new(&path).with_context(|| format!("opening {}", path))?;
        return Ok(Some(Box::new(store)));
    }
    if let Ok(dir) = env::var("APEX_ACCURACY_DIR") {
        let store = JsonFileStore::new(&dir).with_context(|| format!("opening {}", dir))?;
        return Ok(Some(Box::new(store)));
    }
    Ok(None)
}

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(path) = env::args().nth(1) else {
        bail!("usage: apex <window.json>");
    };

    let config = EngineConfig::from_env();
    let mut engine = SignalEngine::new(config.clone())?;

    let store = open_store()?;
    if let Some(store) = &store {
        engine.load_accuracy(store.as_ref())?;
    }

    let contents = fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let input: ReplayInput =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path))?;
    info!("Loaded {} bars from {}", input.bars.len(), path);

    for outcome in &input.outcomes {
        let (id, correct) = (outcome.trade_id.as_str(), outcome.correct);
        let recorded = match (&store, outcome.prediction) {
            (Some(store), false) => engine.archive_outcome(store.as_ref(), id, correct)?,
            (Some(store), true) => engine.archive_prediction_outcome(store.as_ref(), id, correct)?,
            (None, false) => engine.record_outcome(id, correct),
            (None, true) => engine.record_prediction_outcome(id, correct),
        };
        if !recorded {
            warn!("Outcome {} already recorded", id);
        }
    }

    let window = if input.indicators.is_empty() {
        MarketWindow::from_bars(input.bars)
    } else {
        MarketWindow::new(input.bars, input.indicators)?
    };

    let Some(analysis) = engine.analyze(&window) else {
        warn!("Window too short for analysis ({} bars)", window.len());
        return Ok(());
    };

    for reason in analysis.reasons() {
        info!("  {}", reason);
    }
    info!(
        action = analysis.decision.action.label(),
        score = analysis.score.total,
        regime = analysis.macro_layer.regime.name(),
        "Analysis complete"
    );

    if let Some(plan) = EntryPlanner::new(config.entry.clone()).plan_for(&window) {
        info!(
            stop = plan.stop_loss,
            target = plan.take_profit,
            risk_reward = plan.risk_reward,
            accepted = plan.accepted,
            "Entry plan"
        );
    }

    if let Some(position) = &input.position {
        let exit = ExitEvaluator::new(config.exit.clone()).evaluate(
            &window,
            position,
            analysis.score.total,
            Some(analysis.macro_layer.regime),
        );
        info!(
            should_exit = exit.should_exit,
            fraction = exit.exit_fraction,
            urgency = ?exit.urgency,
            "Exit evaluation"
        );
        println!("{}", serde_json::to_string_pretty(&exit)?);
    }

    println!("{}", serde_json::to_string_pretty(&analysis)?);

    if let Some(store) = &store {
        engine.save_accuracy(store.as_ref())?;
    }

    Ok(())
}

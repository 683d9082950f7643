//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::adapters::csv_adapter::CsvBarAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_alert_adapter::JsonAlertAdapter;
use crate::adapters::json_lines_notifier::JsonLinesNotifier;
use crate::adapters::json_snapshot_adapter::JsonSnapshotAdapter;
use crate::domain::alert::Alert;
use crate::domain::error::AlertEngineError;
use crate::domain::settings::EngineSettings;
use crate::domain::snapshot::MarketSnapshot;
use crate::domain::trigger_manager::TriggerManager;
use crate::ports::alert_port::AlertRepository;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::notification_port::NotificationPort;

#[derive(Parser, Debug)]
#[command(name = "alertengine", about = "Market alert expression and trigger engine")]
pub struct Cli {
    /// Engine configuration (INI with [engine] and [logging] sections)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Statically validate an alert expression
    Validate {
        #[arg(short, long)]
        expr: String,
    },
    /// Evaluate an expression against a snapshot
    Eval {
        #[arg(short, long)]
        expr: String,
        /// JSON object file; an empty snapshot when omitted
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
    /// Replay market data through the alerts' triggers
    Run {
        #[arg(short, long)]
        alerts: PathBuf,
        /// JSON-lines snapshot file
        #[arg(long, required_unless_present = "bars", conflicts_with = "bars")]
        snapshots: Option<PathBuf>,
        /// OHLCV CSV file
        #[arg(long, requires = "symbol")]
        bars: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// List expression functions and operators
    Functions,
    /// List trigger types and their parameters
    TriggerTypes,
}

pub fn run(cli: Cli) -> ExitCode {
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    init_logging(&settings.log_level);

    let result = match cli.command {
        Command::Validate { expr } => run_validate(&settings, &expr),
        Command::Eval { expr, snapshot } => run_eval(&settings, &expr, snapshot.as_deref()),
        Command::Run {
            alerts,
            snapshots,
            bars,
            symbol,
        } => {
            let source: Box<dyn MarketDataPort> = match (snapshots, bars, symbol) {
                (Some(path), _, _) => Box::new(JsonSnapshotAdapter::new(path)),
                (None, Some(path), Some(symbol)) => Box::new(CsvBarAdapter::new(path, &symbol)),
                _ => {
                    eprintln!("error: either --snapshots or --bars with --symbol is required");
                    return ExitCode::from(2);
                }
            };
            let repository = JsonAlertAdapter::new(alerts);
            let mut notifier = JsonLinesNotifier::new(io::stdout().lock());
            run_alerts(&settings, &repository, source.as_ref(), &mut notifier).map(|summary| {
                if summary.rejected > 0 {
                    ExitCode::from(5)
                } else {
                    ExitCode::SUCCESS
                }
            })
        }
        Command::Functions => run_functions(&settings),
        Command::TriggerTypes => run_trigger_types(&settings),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_settings(path: Option<&Path>) -> Result<EngineSettings, AlertEngineError> {
    match path {
        Some(path) => EngineSettings::from_config(&FileConfigAdapter::from_file(path)?),
        None => Ok(EngineSettings::default()),
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so stdout
/// carries only command output.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .try_init()
        .ok();
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AlertEngineError> {
    let rendered = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{rendered}");
    Ok(())
}

fn run_validate(settings: &EngineSettings, expr: &str) -> Result<ExitCode, AlertEngineError> {
    let evaluator = settings.evaluator();
    let validation = evaluator.validate_expression(expr);
    print_json(&validation)?;
    if validation.valid {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(4))
    }
}

fn run_eval(
    settings: &EngineSettings,
    expr: &str,
    snapshot_path: Option<&Path>,
) -> Result<ExitCode, AlertEngineError> {
    let snapshot = match snapshot_path {
        Some(path) => read_snapshot(path)?,
        None => MarketSnapshot::new(),
    };
    let evaluator = settings.evaluator();
    let tree = match evaluator.compile(expr) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("{}", e.display_with_context(expr));
            return Ok(ExitCode::from(4));
        }
    };
    let ctx = evaluator.build_context(&snapshot);
    let value = evaluator.evaluate(&tree, &ctx)?;
    print_json(&json!({
        "expression": tree.to_string(),
        "value": value.to_json(),
        "truthy": value.is_truthy(),
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn read_snapshot(path: &Path) -> Result<MarketSnapshot, AlertEngineError> {
    let content = fs::read_to_string(path).map_err(|e| AlertEngineError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    serde_json::from_str(&content).map_err(|e| AlertEngineError::Data {
        reason: format!("invalid snapshot in {}: {}", path.display(), e),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub snapshots: usize,
    pub delivered: usize,
    pub suppressed: usize,
    pub rejected: usize,
}

/// Replay `source` through one trigger manager per symbol and dispatch the
/// firings that pass each alert's delivery gate.
///
/// Alerts that fail validation are logged and left out of the replay.
pub fn run_alerts(
    settings: &EngineSettings,
    repository: &dyn AlertRepository,
    source: &dyn MarketDataPort,
    notifier: &mut dyn NotificationPort,
) -> Result<ReplaySummary, AlertEngineError> {
    let mut alerts: HashMap<String, Alert> = HashMap::new();
    let mut managers: BTreeMap<String, TriggerManager> = BTreeMap::new();
    let factory = settings.trigger_factory();
    let mut rejected = 0usize;

    for alert in repository.load_alerts()? {
        let trigger = match alert.validate(&factory) {
            Ok(trigger) => trigger,
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "alert rejected");
                rejected += 1;
                continue;
            }
        };
        let manager = managers.entry(alert.symbol.clone()).or_insert_with(|| {
            TriggerManager::new(factory.clone()).with_history_capacity(settings.history_capacity)
        });
        manager.insert(&alert.id, trigger);
        alerts.insert(alert.id.clone(), alert);
    }
    info!(alerts = alerts.len(), rejected, "alerts loaded");

    let snapshots = source.snapshots()?;
    let mut delivered = 0usize;
    let mut suppressed = 0usize;
    for snapshot in &snapshots {
        let Some(manager) = managers.get_mut(snapshot.symbol()) else {
            debug!(symbol = snapshot.symbol(), "no alerts for symbol");
            continue;
        };
        let now = snapshot_time(snapshot);
        for event in manager.check_all_at(snapshot, now) {
            let Some(alert) = alerts.get_mut(&event.trigger_id) else {
                continue;
            };
            if alert.is_active_at(now) {
                alert.record_trigger(now);
                notifier.dispatch(&event)?;
                delivered += 1;
            } else {
                debug!(alert_id = %alert.id, "firing suppressed by alert gate");
                suppressed += 1;
            }
        }
    }
    info!(
        snapshots = snapshots.len(),
        delivered, suppressed, "replay finished"
    );

    let stats: BTreeMap<&str, _> = managers
        .iter()
        .map(|(symbol, manager)| (symbol.as_str(), manager.stats()))
        .collect();
    let rendered = serde_json::to_string_pretty(&stats).map_err(io::Error::other)?;
    eprintln!("{rendered}");

    if rejected > 0 {
        warn!(rejected, "some alerts were not registered");
    }
    Ok(ReplaySummary {
        snapshots: snapshots.len(),
        delivered,
        suppressed,
        rejected,
    })
}

/// The snapshot's own `timestamp` when it carries an RFC 3339 one, so
/// replayed data drives scheduled triggers and cooldowns.
fn snapshot_time(snapshot: &MarketSnapshot) -> DateTime<Utc> {
    snapshot
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn run_functions(settings: &EngineSettings) -> Result<ExitCode, AlertEngineError> {
    let evaluator = settings.evaluator();
    println!("Functions:");
    for (name, description) in evaluator.supported_functions() {
        println!("  {:<14} {}", name, description);
    }
    println!("\nOperators:");
    println!("  {}", evaluator.supported_operators().join(" "));
    Ok(ExitCode::SUCCESS)
}

fn run_trigger_types(settings: &EngineSettings) -> Result<ExitCode, AlertEngineError> {
    print_json(&settings.trigger_factory().supported_trigger_types())?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trigger::TriggerConfig;
    use crate::domain::trigger_manager::FiredEvent;

    struct Alerts(Vec<Alert>);

    impl AlertRepository for Alerts {
        fn load_alerts(&self) -> Result<Vec<Alert>, AlertEngineError> {
            Ok(self.0.clone())
        }
    }

    struct Feed(Vec<MarketSnapshot>);

    impl MarketDataPort for Feed {
        fn snapshots(&self) -> Result<Vec<MarketSnapshot>, AlertEngineError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Collect(Vec<FiredEvent>);

    impl NotificationPort for Collect {
        fn dispatch(&mut self, event: &FiredEvent) -> Result<(), AlertEngineError> {
            self.0.push(event.clone());
            Ok(())
        }
    }

    fn tick(symbol: &str, minute: u32, price: f64) -> MarketSnapshot {
        MarketSnapshot::new()
            .with("symbol", symbol)
            .with("price", price)
            .with("timestamp", format!("2024-03-01T10:{minute:02}:00Z"))
    }

    fn above(id: &str, symbol: &str, threshold: f64) -> Alert {
        Alert::new(
            id,
            id,
            symbol,
            TriggerConfig::new("price_above", json!({ "threshold": threshold })),
        )
    }

    #[test]
    fn cooldown_gates_delivery() {
        let alerts = Alerts(vec![above("btc", "BTC", 100.0)]);
        let feed = Feed((0..10).map(|m| tick("BTC", m, 150.0)).collect());
        let mut sink = Collect::default();
        let summary = run_alerts(&EngineSettings::default(), &alerts, &feed, &mut sink).unwrap();
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.suppressed, 8);
        let minutes: Vec<String> = sink.0.iter().map(|e| e.timestamp.format("%M").to_string()).collect();
        assert_eq!(minutes, vec!["00", "05"]);
    }

    #[test]
    fn snapshots_route_by_symbol() {
        let alerts = Alerts(vec![above("btc", "BTC", 100.0), above("eth", "ETH", 100.0)]);
        let feed = Feed(vec![tick("ETH", 0, 150.0), tick("SOL", 1, 500.0)]);
        let mut sink = Collect::default();
        let summary = run_alerts(&EngineSettings::default(), &alerts, &feed, &mut sink).unwrap();
        assert_eq!(summary.snapshots, 2);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].trigger_id, "eth");
    }

    #[test]
    fn invalid_alert_is_skipped_with_exit_code() {
        let mut bad = above("bad", "BTC", 1.0);
        bad.trigger = TriggerConfig::new("custom_dsl", json!({"dsl_expression": "launch(1)"}));
        let alerts = Alerts(vec![bad, above("ok", "BTC", 1.0)]);
        let feed = Feed(vec![tick("BTC", 0, 2.0)]);
        let mut sink = Collect::default();
        let summary = run_alerts(&EngineSettings::default(), &alerts, &feed, &mut sink).unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(sink.0.len(), 1);
    }

    #[test]
    fn snapshot_time_falls_back_to_now() {
        let before = Utc::now();
        let t = snapshot_time(&MarketSnapshot::new().with("timestamp", "yesterday"));
        assert!(t >= before);
        let t = snapshot_time(&tick("X", 7, 1.0));
        assert_eq!(t.to_rfc3339(), "2024-03-01T10:07:00+00:00");
    }
}

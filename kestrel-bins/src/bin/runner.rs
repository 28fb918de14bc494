//! Kestrel runner
//!
//! Loads the engine configuration, wires action policy, data manager,
//! trader channels and strategies together, runs the HFT engine and drains
//! on SIGINT/SIGTERM. Exit code 0 on orderly shutdown, non-zero on
//! configuration errors.

use anyhow::{Context, Result};
use clap::Parser;
use kestrel_bins::common::{init_logging, setup_performance, CommonArgs};
use kestrel_bins::sim::SimBroker;
use kestrel_core::config::{EngineConfig, SessionTable};
use kestrel_core::data::DataManager;
use kestrel_core::engine::{HftContext, HftEngine, StrategyRegistry};
use kestrel_core::notifier::{EventNotifier, LogNotifier};
use kestrel_core::policy::ActionPolicy;
use kestrel_core::trader::{RiskMonitor, TraderAdapter, TraderAdapterMgr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let args = CommonArgs::parse();
    if let Err(e) = init_logging(&args.log_level, args.json_logs) {
        eprintln!("logger init failed: {}", e);
        std::process::exit(2);
    }

    match run(args) {
        Ok(()) => {
            tracing::info!("orderly shutdown");
        }
        Err(e) => {
            tracing::error!("startup failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: CommonArgs) -> Result<()> {
    setup_performance(args.cpu_core)?;

    let config = EngineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config))?;

    let policy = match args.actions.as_deref().or(config.env.filters.as_deref()) {
        Some(path) => Arc::new(ActionPolicy::load(path).context("loading action policy")?),
        None => {
            tracing::warn!("no action policy configured, every intent opens");
            let mut p = ActionPolicy::default();
            p.insert_group(
                "default",
                vec![kestrel_core::policy::ActionRule {
                    action: kestrel_core::policy::ActionType::Open,
                    limit: 0,
                    limit_long: 0,
                    limit_short: 0,
                    pure: false,
                }],
                &[],
            );
            Arc::new(p)
        }
    };

    let notifier: Arc<dyn EventNotifier> = Arc::new(LogNotifier);
    let data_mgr = Arc::new(DataManager::new());

    // Trader channels. Broker modules are resolved by name; this runner
    // ships only the paper channel.
    let adapters = Arc::new(TraderAdapterMgr::new());
    for trader_cfg in &config.traders {
        let mut risk = RiskMonitor::new(config.riskmon.active, config.riskmon.base);
        for (scope, params) in &config.riskmon.overrides {
            risk.set_override(scope, *params);
        }
        let adapter = TraderAdapter::with_risk(
            &trader_cfg.id,
            policy.clone(),
            risk,
            trader_cfg.ignore_self_match,
        );
        adapter.set_notifier(notifier.clone());
        match trader_cfg.module.as_str() {
            "sim" | "paper" => adapter.set_broker(SimBroker::new()),
            other => {
                tracing::error!(
                    "trader {} uses unknown broker module '{}', channel skipped",
                    trader_cfg.id,
                    other
                );
                continue;
            }
        }
        adapters.add(adapter);
    }

    for parser_cfg in &config.parsers {
        // Feed modules live outside this runner; their ticks enter through
        // HftEngine::handle_push_quote.
        tracing::info!(
            "parser {} (module {}) declared for {} codes, expecting external feed",
            parser_cfg.id,
            parser_cfg.module,
            parser_cfg.codes.len()
        );
    }

    let sessions = SessionTable::default();
    let session = sessions.resolve(&config.env.product.session);

    let engine = HftEngine::new(
        session,
        data_mgr,
        adapters.clone(),
        Some(notifier),
        PathBuf::from(&config.env.base_dir),
    );

    // Strategy instances from config.
    let mut registry = StrategyRegistry::new();
    kestrel_strategies::register_builtins(&mut registry);
    for (index, stra_cfg) in config.strategies.iter().enumerate() {
        let strategy = match registry.create(&stra_cfg.name, &stra_cfg.id) {
            Ok(s) => s,
            Err(e) => {
                // A broken module skips only itself.
                tracing::error!("strategy {} skipped: {}", stra_cfg.id, e);
                continue;
            }
        };
        let Some(trader) = adapters.get(&stra_cfg.trader) else {
            tracing::error!(
                "strategy {} routes to missing channel {}, skipped",
                stra_cfg.id,
                stra_cfg.trader
            );
            continue;
        };
        let ctx = HftContext::new(index as u32 + 1, &stra_cfg.id, &engine, trader.clone(), strategy);
        trader.add_sink(ctx.clone());
        engine.add_context(ctx);
    }

    adapters.run();
    engine.run();
    tracing::info!("engine running, strategies live");

    // Orderly drain on SIGINT/SIGTERM.
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::SeqCst);
    })
    .context("installing signal handler")?;

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!("signal received, ending session");
    engine.on_session_end();
    engine.stop();
    Ok(())
}

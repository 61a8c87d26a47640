use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use der_monitor::config::Config;
use der_monitor::domain::Category;
use der_monitor::engine::{spawn_engine, EngineEvent, EngineHandle, EngineState};
use der_monitor::generator::MeasurementGenerator;
use der_monitor::measurement::{FileMeasurementLog, HISTORY_POINTS};
use der_monitor::telemetry::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    init_tracing(&cfg.telemetry);

    let log = Arc::new(FileMeasurementLog::open(&cfg.log.path)?);
    info!(path = %log.path().display(), "measurement log ready");

    let state = EngineState::new(log, cfg.engine.event_capacity);
    let (engine, engine_task) = spawn_engine(state, cfg.engine.queue_capacity);

    if cfg.engine.seed_demo_entities {
        engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await?;
        engine.add(27, "Wind-IB-07", Category::Wind, 5.7).await?;
    }

    let reporter = tokio::spawn(report_events(engine.clone()));

    let generator = MeasurementGenerator::new(engine.clone(), &cfg.generator);
    if cfg.generator.autostart {
        generator.start().await;
    }

    info!(entities = engine.snapshot().entities.len(), "DER monitor running");
    shutdown_signal().await;

    generator.stop().await;
    reporter.abort();
    let _ = reporter.await;
    drop(generator);
    drop(engine);
    if let Err(e) = engine_task.await {
        warn!(error = %e, "engine task ended abnormally");
    }
    info!("shutdown complete");
    Ok(())
}

/// Logs every engine event together with the state it refers to.
async fn report_events(engine: EngineHandle) {
    let mut events = engine.subscribe();
    loop {
        match events.recv().await {
            Ok(EngineEvent::MeasurementArrived { entity_id }) => {
                let snapshot = engine.snapshot();
                let Some(entity) = snapshot.get(entity_id) else {
                    continue;
                };
                let recent: Vec<f64> = engine
                    .recent_history(entity_id, HISTORY_POINTS)
                    .iter()
                    .map(|r| r.value)
                    .collect();
                info!(
                    entity_id,
                    name = entity.name(),
                    value = entity.last_value(),
                    valid = entity.is_valid(),
                    recent = ?recent,
                    "measurement"
                );
            }
            Ok(EngineEvent::EntityStoreChanged) => {
                let snapshot = engine.snapshot();
                let solar: Vec<&str> = snapshot.solar.iter().map(|e| e.name.as_str()).collect();
                let wind: Vec<&str> = snapshot.wind.iter().map(|e| e.name.as_str()).collect();
                info!(entities = snapshot.entities.len(), ?solar, ?wind, "entity store changed");
            }
            Ok(EngineEvent::TopologyChanged) => {
                let snapshot = engine.snapshot();
                match serde_json::to_string(&snapshot.links) {
                    Ok(links) => info!(%links, "topology changed"),
                    Err(e) => warn!(error = %e, "topology changed"),
                }
            }
            Err(RecvError::Lagged(missed)) => warn!(missed, "event reporter lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

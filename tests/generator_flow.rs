mod common;

use std::time::Duration;

use common::{spawn_with_file_log, TempLog};
use der_monitor::config::GeneratorConfig;
use der_monitor::domain::{is_valid_value, Category};
use der_monitor::engine::EngineEvent;
use der_monitor::generator::MeasurementGenerator;

#[tokio::test(start_paused = true)]
async fn generated_values_flow_through_the_gate() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);
    engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await.unwrap();
    engine.add(27, "Wind-IB-07", Category::Wind, 5.7).await.unwrap();
    let mut events = engine.subscribe();

    let generator = MeasurementGenerator::new(
        engine.clone(),
        &GeneratorConfig {
            interval_ms: 100,
            invalid_probability: 0.5,
            seed: Some(2024),
            autostart: true,
        },
    );
    generator.start().await;

    let mut arrived = 0;
    while arrived < 20 {
        if let EngineEvent::MeasurementArrived { .. } = events.recv().await.unwrap() {
            arrived += 1;
            for entity in &engine.snapshot().entities {
                assert_eq!(entity.is_valid(), is_valid_value(entity.last_value()));
            }
        }
    }
    generator.stop().await;

    let logged = engine.recent_history(12, 100).len() + engine.recent_history(27, 100).len();
    // two initial values plus every generated one
    assert!(logged >= 22, "logged {logged}");
}

#[tokio::test(start_paused = true)]
async fn removing_an_entity_mid_run_is_harmless() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);
    engine.add(1, "a", Category::Solar, 2.0).await.unwrap();
    engine.add(2, "b", Category::Wind, 2.0).await.unwrap();

    let generator = MeasurementGenerator::new(
        engine.clone(),
        &GeneratorConfig {
            interval_ms: 10,
            seed: Some(5),
            ..Default::default()
        },
    );
    generator.start().await;
    tokio::time::sleep(Duration::from_millis(105)).await;
    engine.remove(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(105)).await;
    generator.restart().await;
    tokio::time::sleep(Duration::from_millis(55)).await;
    generator.stop().await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.entities.len(), 1);
    assert_eq!(snapshot.wind.len(), 1);
    assert!(snapshot.solar.is_empty());
}

mod common;

use common::{spawn_with_file_log, TempLog};
use der_monitor::domain::{Category, EntityPatch};
use der_monitor::engine::{EngineEvent, SearchField};
use der_monitor::measurement::{LOG_HEADER, HISTORY_POINTS};
use der_monitor::topology::ConnectOutcome;
use der_monitor::CoreError;

#[tokio::test]
async fn demo_entities_land_in_their_category_views() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);

    engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await.unwrap();
    engine.add(27, "Wind-IB-07", Category::Wind, 5.7).await.unwrap();

    let snapshot = engine.snapshot();
    let solar: Vec<_> = snapshot.sorted(Category::Solar).iter().map(|e| e.name().to_string()).collect();
    let wind: Vec<_> = snapshot.sorted(Category::Wind).iter().map(|e| e.name().to_string()).collect();
    assert_eq!(solar, vec!["Solar-NS-01"]);
    assert_eq!(wind, vec!["Wind-IB-07"]);
    assert!(!snapshot.get(27).unwrap().is_valid());
    assert_eq!(snapshot.next_id(), 28);
    assert_eq!(snapshot.search(SearchField::Category, "wind").len(), 1);
}

#[tokio::test]
async fn log_file_uses_the_documented_format() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);
    engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await.unwrap();
    engine.submit_measurement(12, 5.8).await.unwrap();

    let contents = std::fs::read_to_string(&temp.path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines[0], LOG_HEADER);
    assert!(lines[1].ends_with(";12;3.400;True"), "{}", lines[1]);
    assert!(lines[2].ends_with(";12;5.800;False"), "{}", lines[2]);
}

#[tokio::test]
async fn edit_then_undo_restores_value_but_not_log() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);
    engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await.unwrap();

    engine.edit(12, EntityPatch::default().value(0.5)).await.unwrap();
    assert!(!engine.snapshot().get(12).unwrap().is_valid());

    engine.undo().await.unwrap();
    let entity = engine.snapshot().get(12).unwrap().clone();
    assert_eq!(entity.last_value(), 3.4);
    assert!(entity.is_valid());

    let history = engine.recent_history(12, HISTORY_POINTS);
    let values: Vec<_> = history.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![3.4, 0.5]);
    assert!(!history[1].is_valid);
}

#[tokio::test]
async fn slot_links_cascade_on_vacate_and_remove() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);
    engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await.unwrap();
    engine.add(27, "Wind-IB-07", Category::Wind, 5.7).await.unwrap();
    engine.add(30, "Wind-B", Category::Wind, 2.2).await.unwrap();
    let mut events = engine.subscribe();

    engine.assign_to_slot(3, 12).await.unwrap();
    engine.assign_to_slot(5, 27).await.unwrap();
    engine.assign_to_slot(6, 30).await.unwrap();
    assert_eq!(
        engine.assign_to_slot(5, 30).await,
        Err(CoreError::SlotOccupied { slot: 5, occupant: 27 })
    );

    engine.toggle_connect(12).await.unwrap();
    engine.toggle_connect(27).await.unwrap();
    engine.toggle_connect(27).await.unwrap();
    engine.toggle_connect(30).await.unwrap();
    assert_eq!(engine.snapshot().links.len(), 2);

    engine.vacate_slot(3).await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.links.len(), 1);
    assert_eq!(snapshot.slots[2].occupant, None);

    engine.remove(30).await.unwrap();
    let snapshot = engine.snapshot();
    assert!(snapshot.links.is_empty());
    assert_eq!(snapshot.slot_of(30), None);
    assert_eq!(snapshot.slot_of(27), Some(5));

    let mut topology_events = 0;
    while let Ok(event) = events.try_recv() {
        if event == EngineEvent::TopologyChanged {
            topology_events += 1;
        }
    }
    // three assigns, two links, one vacate, one eviction
    assert_eq!(topology_events, 7);
}

#[tokio::test]
async fn double_toggle_cancels() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);
    engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await.unwrap();
    engine.assign_to_slot(1, 12).await.unwrap();

    assert_eq!(engine.toggle_connect(12).await.unwrap(), ConnectOutcome::Pending(12));
    assert_eq!(engine.snapshot().pending_connect, Some(12));
    assert_eq!(engine.toggle_connect(12).await.unwrap(), ConnectOutcome::Cancelled);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.pending_connect, None);
    assert!(snapshot.links.is_empty());
}

#[tokio::test]
async fn undo_every_mutation_returns_to_empty_store() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);

    engine.add(1, "beta", Category::Solar, 2.0).await.unwrap();
    engine.add(2, "Alpha", Category::Solar, 4.0).await.unwrap();
    engine.add(3, "gamma", Category::Wind, 0.2).await.unwrap();
    engine
        .edit(1, EntityPatch::default().name("zeta").category(Category::Wind))
        .await
        .unwrap();
    engine.remove(2).await.unwrap();
    engine.edit(3, EntityPatch::default().value(4.4)).await.unwrap();
    assert_eq!(engine.snapshot().undo_depth, 6);

    for _ in 0..6 {
        engine.undo().await.unwrap();
    }
    let snapshot = engine.snapshot();
    assert!(snapshot.entities.is_empty());
    assert!(snapshot.solar.is_empty() && snapshot.wind.is_empty());
    assert_eq!(engine.undo().await, Err(CoreError::EmptyStack));
}

#[tokio::test]
async fn reset_and_clear_log() {
    let temp = TempLog::new();
    let (engine, _task) = spawn_with_file_log(&temp);
    engine.add(12, "Solar-NS-01", Category::Solar, 3.4).await.unwrap();
    engine.clear_log().await.unwrap();
    assert!(engine.recent_history(12, 10).is_empty());
    assert_eq!(std::fs::read_to_string(&temp.path).unwrap().trim_end(), LOG_HEADER);

    engine.reset(Vec::new()).await.unwrap();
    let snapshot = engine.snapshot();
    assert!(snapshot.entities.is_empty());
    assert_eq!(snapshot.undo_depth, 0);
}

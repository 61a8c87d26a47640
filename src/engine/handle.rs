use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EngineEvent, EngineState, Snapshot};
use crate::domain::{Category, Entity, EntityId, EntityPatch};
use crate::error::{CoreError, CoreResult};
use crate::measurement::{MeasurementLog, MeasurementRecord};
use crate::topology::ConnectOutcome;
use crate::undo::UndoEntry;

type Reply<T> = oneshot::Sender<CoreResult<T>>;

/// One queued operation. The mutation task consumes these strictly in
/// arrival order.
enum Command {
    Add {
        id: EntityId,
        name: String,
        category: Category,
        value: f64,
        reply: Reply<Entity>,
    },
    Edit {
        id: EntityId,
        patch: EntityPatch,
        reply: Reply<Entity>,
    },
    Remove {
        id: EntityId,
        reply: Reply<Entity>,
    },
    Measurement {
        id: EntityId,
        value: f64,
        reply: Option<Reply<Entity>>,
    },
    AssignToSlot {
        slot: usize,
        id: EntityId,
        reply: Reply<()>,
    },
    VacateSlot {
        slot: usize,
        reply: Reply<Option<EntityId>>,
    },
    ToggleConnect {
        id: EntityId,
        reply: Reply<ConnectOutcome>,
    },
    ToggleConnectMode {
        reply: Reply<bool>,
    },
    Undo {
        reply: Reply<UndoEntry>,
    },
    Reset {
        entities: Vec<Entity>,
        reply: Reply<()>,
    },
    ClearLog {
        reply: Reply<()>,
    },
}

/// Moves `state` into a dedicated mutation task and returns a cloneable
/// handle to it. The task ends once every handle is dropped and the queue
/// has drained.
pub fn spawn_engine(state: EngineState, queue_capacity: usize) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(state.snapshot()));
    let handle = EngineHandle {
        tx,
        snapshots: snapshot_rx,
        events: state.event_sender(),
        log: state.log(),
    };
    let task = tokio::spawn(run(state, rx, snapshot_tx));
    (handle, task)
}

async fn run(
    mut state: EngineState,
    mut rx: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Arc<Snapshot>>,
) {
    info!("engine task started");
    while let Some(command) = rx.recv().await {
        dispatch(&mut state, &snapshots, command);
    }
    info!("engine task stopped");
}

fn dispatch(state: &mut EngineState, snapshots: &watch::Sender<Arc<Snapshot>>, command: Command) {
    match command {
        Command::Add {
            id,
            name,
            category,
            value,
            reply,
        } => commit(state, snapshots, reply, |s| s.add(id, &name, category, value)),
        Command::Edit { id, patch, reply } => commit(state, snapshots, reply, |s| s.edit(id, patch)),
        Command::Remove { id, reply } => commit(state, snapshots, reply, |s| s.remove(id)),
        Command::Measurement {
            id,
            value,
            reply: Some(reply),
        } => commit(state, snapshots, reply, |s| s.apply_measurement(id, value)),
        Command::Measurement {
            id,
            value,
            reply: None,
        } => {
            state.hold_events();
            let result = state.apply_measurement(id, value);
            publish(state, snapshots);
            state.release_events();
            match result {
                Ok(_) => {}
                // entity removed between the tick and now
                Err(CoreError::NotFound(id)) => {
                    debug!(entity_id = id, "dropping measurement for removed entity")
                }
                Err(e) => warn!(entity_id = id, error = %e, "generated measurement rejected"),
            }
        }
        Command::AssignToSlot { slot, id, reply } => {
            commit(state, snapshots, reply, |s| s.assign_to_slot(slot, id))
        }
        Command::VacateSlot { slot, reply } => {
            commit(state, snapshots, reply, |s| s.vacate_slot(slot))
        }
        Command::ToggleConnect { id, reply } => {
            commit(state, snapshots, reply, |s| s.toggle_connect(id))
        }
        Command::ToggleConnectMode { reply } => {
            commit(state, snapshots, reply, |s| Ok(s.toggle_connect_mode()))
        }
        Command::Undo { reply } => commit(state, snapshots, reply, |s| s.undo()),
        Command::Reset { entities, reply } => {
            commit(state, snapshots, reply, |s| s.reset(entities))
        }
        Command::ClearLog { reply } => commit(state, snapshots, reply, |s| s.clear_log()),
    }
}

/// Runs one operation, publishes the resulting snapshot, then releases its
/// events and answers the caller. Anyone reacting to an event or a reply
/// reads a snapshot that already includes the mutation.
fn commit<T>(
    state: &mut EngineState,
    snapshots: &watch::Sender<Arc<Snapshot>>,
    reply: Reply<T>,
    op: impl FnOnce(&mut EngineState) -> CoreResult<T>,
) {
    state.hold_events();
    let result = op(state);
    publish(state, snapshots);
    state.release_events();
    // the caller may have given up waiting; the mutation stands either way
    let _ = reply.send(result);
}

fn publish(state: &EngineState, snapshots: &watch::Sender<Arc<Snapshot>>) {
    snapshots.send_replace(Arc::new(state.snapshot()));
}

/// Cloneable front door to the mutation task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    events: broadcast::Sender<EngineEvent>,
    log: Arc<dyn MeasurementLog>,
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> CoreResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| CoreError::EngineClosed)?;
        response.await.map_err(|_| CoreError::EngineClosed)?
    }

    pub async fn add(
        &self,
        id: EntityId,
        name: impl Into<String>,
        category: Category,
        value: f64,
    ) -> CoreResult<Entity> {
        let name = name.into();
        self.request(|reply| Command::Add {
            id,
            name,
            category,
            value,
            reply,
        })
        .await
    }

    pub async fn edit(&self, id: EntityId, patch: EntityPatch) -> CoreResult<Entity> {
        self.request(|reply| Command::Edit { id, patch, reply }).await
    }

    pub async fn remove(&self, id: EntityId) -> CoreResult<Entity> {
        self.request(|reply| Command::Remove { id, reply }).await
    }

    /// Queues a value update and waits for it to be committed.
    pub async fn submit_measurement(&self, id: EntityId, value: f64) -> CoreResult<Entity> {
        self.request(|reply| Command::Measurement {
            id,
            value,
            reply: Some(reply),
        })
        .await
    }

    /// Queues a value update without waiting for the outcome.
    pub async fn push_measurement(&self, id: EntityId, value: f64) -> CoreResult<()> {
        self.tx
            .send(Command::Measurement {
                id,
                value,
                reply: None,
            })
            .await
            .map_err(|_| CoreError::EngineClosed)
    }

    pub async fn assign_to_slot(&self, slot: usize, id: EntityId) -> CoreResult<()> {
        self.request(|reply| Command::AssignToSlot { slot, id, reply })
            .await
    }

    pub async fn vacate_slot(&self, slot: usize) -> CoreResult<Option<EntityId>> {
        self.request(|reply| Command::VacateSlot { slot, reply }).await
    }

    pub async fn toggle_connect(&self, id: EntityId) -> CoreResult<ConnectOutcome> {
        self.request(|reply| Command::ToggleConnect { id, reply }).await
    }

    pub async fn toggle_connect_mode(&self) -> CoreResult<bool> {
        self.request(|reply| Command::ToggleConnectMode { reply }).await
    }

    pub async fn undo(&self) -> CoreResult<UndoEntry> {
        self.request(|reply| Command::Undo { reply }).await
    }

    pub async fn reset(&self, entities: Vec<Entity>) -> CoreResult<()> {
        self.request(|reply| Command::Reset { entities, reply }).await
    }

    pub async fn clear_log(&self) -> CoreResult<()> {
        self.request(|reply| Command::ClearLog { reply }).await
    }

    /// Latest committed state. Never observes a half-applied mutation.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Receiver that is notified after every committed command
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Raw log query; read failures are returned.
    pub fn query(&self, id: EntityId, limit: usize) -> CoreResult<Vec<MeasurementRecord>> {
        self.log.query(id, limit)
    }

    /// Recent points for presentation. Read failures degrade to an empty
    /// history.
    pub fn recent_history(&self, id: EntityId, limit: usize) -> Vec<MeasurementRecord> {
        self.log.query(id, limit).unwrap_or_else(|e| {
            warn!(entity_id = id, error = %e, "history unavailable");
            Vec::new()
        })
    }
}

//! Client-side state loop. The document is loaded once, mutated locally,
//! and written back by a background saver after a quiet period. A burst of
//! edits inside the debounce window costs one save of the newest document.

use log::{ debug, info, warn };
use serde_json::{ json, Value };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{ mpsc, oneshot };
use tokio::task::JoinHandle;

use super::StateBackend;
use crate::models::state::default_state;

enum SaveCommand {
    Changed(Value),
    Flush(oneshot::Sender<bool>),
}

pub struct StateSession {
    current: Value,
    tx: mpsc::UnboundedSender<SaveCommand>,
    saver: JoinHandle<()>,
}

impl StateSession {
    /// Loads the stored document, falling back to the default document when
    /// nothing was saved yet or the server could not be read.
    pub async fn load(backend: Arc<dyn StateBackend>, debounce: Duration) -> Self {
        info!("Loading simulation state...");
        let current = match backend.load_state().await {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!("No saved state, starting from defaults");
                default_state()
            }
            Err(e) => {
                warn!("Error loading simulation state: {}", e);
                default_state()
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let saver = tokio::spawn(run_saver(backend, rx, debounce));
        Self { current, tx, saver }
    }

    pub fn state(&self) -> &Value {
        &self.current
    }

    /// Applies `edit` to the local document and schedules a save if it
    /// changed anything.
    pub fn update<F: FnOnce(&mut Value)>(&mut self, edit: F) {
        let before = self.current.clone();
        edit(&mut self.current);
        if self.current != before {
            let _ = self.tx.send(SaveCommand::Changed(self.current.clone()));
        }
    }

    /// Adds one to `counter` and returns the new value. A missing or
    /// non-numeric counter counts from zero.
    pub fn increment_counter(&mut self) -> Value {
        let mut next = Value::Null;
        self.update(|state| {
            let fields = ensure_object(state);
            next = incremented(fields.get("counter"));
            fields.insert("counter".to_string(), next.clone());
        });
        next
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.update(|state| {
            ensure_object(state).insert("notes".to_string(), json!(notes));
        });
    }

    /// Writes any pending change now. Returns false if that save failed.
    pub async fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SaveCommand::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    /// Flushes and stops the background saver.
    pub async fn close(self) -> bool {
        let saved = self.flush().await;
        drop(self.tx);
        let _ = self.saver.await;
        saved
    }
}

fn ensure_object(state: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !state.is_object() {
        *state = json!({});
    }
    match state {
        Value::Object(fields) => fields,
        _ => unreachable!("state was just replaced with an object"),
    }
}

/// Integers stay integers while they fit in `i64` or `u64`; beyond that,
/// and for fractional counters, the value carries on as a float.
fn incremented(counter: Option<&Value>) -> Value {
    let Some(Value::Number(n)) = counter else {
        return json!(1);
    };
    if let Some(next) = n.as_i64().and_then(|v| v.checked_add(1)) {
        return json!(next);
    }
    if let Some(next) = n.as_u64().and_then(|v| v.checked_add(1)) {
        return json!(next);
    }
    json!(n.as_f64().unwrap_or(0.0) + 1.0)
}

async fn run_saver(
    backend: Arc<dyn StateBackend>,
    mut rx: mpsc::UnboundedReceiver<SaveCommand>,
    debounce: Duration
) {
    let mut pending: Option<Value> = None;

    loop {
        let command = if pending.is_some() {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    if let Some(doc) = pending.take() {
                        save(backend.as_ref(), &doc).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(SaveCommand::Changed(doc)) => {
                pending = Some(doc);
            }
            Some(SaveCommand::Flush(ack)) => {
                let ok = match pending.take() {
                    Some(doc) => save(backend.as_ref(), &doc).await,
                    None => true,
                };
                let _ = ack.send(ok);
            }
            None => {
                if let Some(doc) = pending.take() {
                    save(backend.as_ref(), &doc).await;
                }
                break;
            }
        }
    }
}

async fn save(backend: &dyn StateBackend, doc: &Value) -> bool {
    match backend.save_state(doc).await {
        Ok(true) => {
            debug!("Simulation state saved");
            true
        }
        Ok(false) => {
            warn!("Server did not acknowledge the state save");
            false
        }
        Err(e) => {
            warn!("Error saving simulation state: {}", e);
            false
        }
    }
}

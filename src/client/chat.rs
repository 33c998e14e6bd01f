use log::warn;
use serde_json::Value;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };

use super::{ ChatBackend, ClientError };
use crate::models::chat::ChatMessage;

/// Session-local conversation. History is append-only and never persisted;
/// at most one request is in flight at a time.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    history: Mutex<Vec<ChatMessage>>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            history: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock_history().clone()
    }

    /// Sends `text` with the full history. Fails with [`ClientError::Busy`],
    /// leaving history untouched, while another submission is pending.
    /// Upstream failures become an assistant message rather than an error.
    pub async fn submit(&self, text: &str) -> Result<ChatMessage, ClientError> {
        if self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ClientError::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        let outgoing = {
            let mut history = self.lock_history();
            history.push(ChatMessage::user(text));
            history.clone()
        };

        let reply = match self.backend.send_chat(&outgoing).await {
            Ok(response) => match assistant_text(&response) {
                Some(content) => ChatMessage::assistant(content),
                None => {
                    warn!("Chat response carried no assistant content");
                    ChatMessage::assistant("(no reply)")
                }
            },
            Err(e) => {
                warn!("Failed to send message: {}", e);
                ChatMessage::assistant(format!("Sorry, the assistant is unreachable right now ({}).", e))
            }
        };

        self.lock_history().push(reply.clone());
        Ok(reply)
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<ChatMessage>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion response.
pub fn assistant_text(response: &Value) -> Option<&str> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use super::types::ChatMessage;

pub type SharedCheckpointer = Arc<dyn Checkpointer>;

/// Append-only conversation history, keyed by thread id.
pub trait Checkpointer: Send + Sync {
    fn append(&self, thread_id: &str, message: ChatMessage) -> anyhow::Result<()>;
    fn history(&self, thread_id: &str) -> anyhow::Result<Vec<ChatMessage>>;
}

/// Process-local checkpointer; history is lost when the process exits.
#[derive(Default)]
pub struct MemoryCheckpointer {
    threads: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryCheckpointer {
    pub fn shared() -> SharedCheckpointer {
        Arc::new(Self::default())
    }
}

impl Checkpointer for MemoryCheckpointer {
    fn append(&self, thread_id: &str, message: ChatMessage) -> anyhow::Result<()> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| anyhow!("checkpointer lock poisoned"))?;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    fn history(&self, thread_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
        let threads = self
            .threads
            .lock()
            .map_err(|_| anyhow!("checkpointer lock poisoned"))?;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }
}

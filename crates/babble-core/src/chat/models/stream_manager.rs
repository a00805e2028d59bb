use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Tracks which conversations have a send in flight.
///
/// At most one stream per conversation. Registration hands back a
/// [`StreamGuard`] that releases the slot when dropped, so every exit path of
/// a send (completion, failure, early return) frees it.
#[derive(Debug, Default)]
pub struct StreamManager {
    streams: Mutex<HashSet<String>>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the stream slot for `conv_id`.
    /// Returns None when a stream is already active for it.
    pub fn try_register(self: &Arc<Self>, conv_id: &str) -> Option<StreamGuard> {
        let mut streams = self.streams.lock();
        if !streams.insert(conv_id.to_string()) {
            debug!(conv_id = %conv_id, "Stream already active, refusing registration");
            return None;
        }
        debug!(conv_id = %conv_id, "Stream registered");
        Some(StreamGuard {
            manager: Arc::clone(self),
            conv_id: conv_id.to_string(),
        })
    }

    pub fn is_streaming(&self, conv_id: &str) -> bool {
        self.streams.lock().contains(conv_id)
    }

    pub fn has_active_streams(&self) -> bool {
        !self.streams.lock().is_empty()
    }

    fn release(&self, conv_id: &str) {
        if self.streams.lock().remove(conv_id) {
            debug!(conv_id = %conv_id, "Stream released");
        }
    }
}

/// Holds a conversation's stream slot until dropped
#[derive(Debug)]
pub struct StreamGuard {
    manager: Arc<StreamManager>,
    conv_id: String,
}

impl StreamGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conv_id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.manager.release(&self.conv_id);
    }
}

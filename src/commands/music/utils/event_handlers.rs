//! Songbird event plumbing for stream completion.

use serenity::async_trait;
use songbird::{Event, EventContext};

use super::music_manager::{StreamEndHook, StreamOutcome};

/// Fires the queue's end-of-stream hook when a track finishes or errors.
pub struct StreamEndNotifier {
    outcome: StreamOutcome,
    hook: StreamEndHook,
}

impl StreamEndNotifier {
    pub fn new(outcome: StreamOutcome, hook: StreamEndHook) -> Self {
        Self { outcome, hook }
    }
}

#[async_trait]
impl songbird::EventHandler for StreamEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(_) = ctx {
            (self.hook)(self.outcome).await;
        }
        None
    }
}

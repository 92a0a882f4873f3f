//! Gateway event handling: wraps each incoming message as a [`MessageEvent`]
//! and runs it through pending questions first, then the command routes.

use serenity::all::{Context, EventHandler, Message, Ready};
use serenity::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::commands;
use crate::dispatcher::{HandlerResult, Sequence, boxed};
use crate::state::BotState;

/// One incoming message plus everything a handler needs to act on it.
/// Cloned once per dispatch step.
#[derive(Clone)]
pub struct MessageEvent {
    pub ctx: Context,
    pub msg: Message,
    pub state: Arc<BotState>,
}

pub struct Handler {
    state: Arc<BotState>,
    routes: Sequence<MessageEvent>,
}

impl Handler {
    pub fn new(state: Arc<BotState>) -> Self {
        let routes = Sequence::new(vec![boxed(answer_questions), commands::music::handler()]);
        Self { state, routes }
    }
}

/// Pending questions get first refusal on every message.
async fn answer_questions(event: MessageEvent) -> HandlerResult {
    Ok(event.state.questions.dispatch(&event).await)
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Logged in as {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let event = MessageEvent {
            ctx: ctx.clone(),
            msg: msg.clone(),
            state: Arc::clone(&self.state),
        };
        if let Err(e) = self.routes.run(event).await {
            error!(error = %e, content = %msg.content, "message handler failed");
            let _ = msg
                .channel_id
                .say(&ctx, "An unknown error occurred. Check the error logs.")
                .await;
        }
    }
}

//! Ordered "first handler that claims the event wins" dispatch.
//!
//! Handlers receive a cheaply cloneable event and report whether they handled
//! it. A sequence can itself be boxed back into a handler, so the music
//! command set composes into the top-level message route unchanged.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub type HandlerResult = Result<bool, crate::Error>;

/// A boxed async event handler. Returns `Ok(true)` when the event was handled.
pub type Handler<E> = Box<dyn Fn(E) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Boxes a plain async fn into a [`Handler`].
pub fn boxed<E, F, Fut>(f: F) -> Handler<E>
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Box::new(move |event| Box::pin(f(event)))
}

/// Tries handlers in registration order, stopping at the first that reports
/// the event handled. Errors abort the chain and propagate.
pub struct Sequence<E> {
    steps: Vec<Handler<E>>,
}

impl<E: Clone> Sequence<E> {
    pub fn new(steps: Vec<Handler<E>>) -> Self {
        Self { steps }
    }

    pub async fn run(&self, event: E) -> HandlerResult {
        for step in &self.steps {
            if step(event.clone()).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<E: Clone + Send + Sync + 'static> Sequence<E> {
    /// Re-boxes the whole sequence as a single handler, for nesting.
    pub fn into_handler(self) -> Handler<E> {
        let sequence = Arc::new(self);
        Box::new(move |event| {
            let sequence = Arc::clone(&sequence);
            Box::pin(async move { sequence.run(event).await })
        })
    }
}

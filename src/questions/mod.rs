//! Pending multi-turn questions, consulted before ordinary command routing.
//!
//! A question is a small tagged record interpreted by one evaluator, rather
//! than a nest of closures, so the registry stays introspectable. Registration
//! order is priority order; a question is dropped only when a dispatch pass
//! observes `should_remove`.

use futures::future::BoxFuture;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// What one question reported for one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub should_remove: bool,
    pub responded: bool,
}

/// The answer probe: inspects a message, returns whether it answered.
pub type AnswerFn<E> = Box<dyn Fn(E) -> BoxFuture<'static, bool> + Send + Sync>;

/// Boxes a plain async fn into an [`AnswerFn`].
pub fn answer<E, F, Fut>(f: F) -> AnswerFn<E>
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Box::new(move |event| Box::pin(f(event)))
}

pub enum Question<E> {
    /// Never auto-removes.
    Forever(AnswerFn<E>),
    /// Answering removes it.
    UntilAnswered(AnswerFn<E>),
    /// Once past `expires_at`, removes itself without consulting the inner
    /// question.
    WithExpiration {
        expires_at: Instant,
        inner: Box<Question<E>>,
    },
}

impl<E: Send + 'static> Question<E> {
    pub fn forever(probe: AnswerFn<E>) -> Self {
        Self::Forever(probe)
    }

    pub fn until_answered(probe: AnswerFn<E>) -> Self {
        Self::UntilAnswered(probe)
    }

    pub fn with_expiration(time_to_expiry: Duration, inner: Question<E>) -> Self {
        Self::WithExpiration {
            expires_at: Instant::now() + time_to_expiry,
            inner: Box::new(inner),
        }
    }

    pub fn until_expired_or_answered(time_to_expiry: Duration, probe: AnswerFn<E>) -> Self {
        Self::with_expiration(time_to_expiry, Self::until_answered(probe))
    }

    pub fn until_expired(time_to_expiry: Duration, probe: AnswerFn<E>) -> Self {
        Self::with_expiration(time_to_expiry, Self::forever(probe))
    }

    pub fn ask<'a>(&'a self, event: E) -> BoxFuture<'a, QuestionOutcome> {
        Box::pin(async move {
            match self {
                Self::Forever(probe) => QuestionOutcome {
                    should_remove: false,
                    responded: probe(event).await,
                },
                Self::UntilAnswered(probe) => {
                    let answered = probe(event).await;
                    QuestionOutcome {
                        should_remove: answered,
                        responded: answered,
                    }
                }
                Self::WithExpiration { expires_at, inner } => {
                    if Instant::now() > *expires_at {
                        QuestionOutcome {
                            should_remove: true,
                            responded: false,
                        }
                    } else {
                        inner.ask(event).await
                    }
                }
            }
        })
    }
}

/// Ordered registry of the questions currently awaiting an answer.
pub struct QuestionRegistry<E> {
    active: Mutex<Vec<Question<E>>>,
}

impl<E: Clone + Send + 'static> QuestionRegistry<E> {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(Vec::new()),
        }
    }

    /// Appends to the end of the registry; earlier questions keep priority.
    pub async fn add(&self, question: Question<E>) {
        self.active.lock().await.push(question);
    }

    pub async fn len(&self) -> usize {
        self.active.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.active.lock().await.is_empty()
    }

    /// Runs one dispatch pass. Stops at the first question that responded;
    /// questions reporting `should_remove` are dropped along the way.
    pub async fn dispatch(&self, event: &E) -> bool {
        let mut active = self.active.lock().await;
        let mut i = 0;
        while i < active.len() {
            let outcome = active[i].ask(event.clone()).await;
            if outcome.should_remove {
                active.remove(i);
            } else {
                i += 1;
            }
            if outcome.responded {
                return true;
            }
        }
        false
    }
}

impl<E: Clone + Send + 'static> Default for QuestionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_probe(counter: Arc<AtomicUsize>, answers: bool) -> AnswerFn<String> {
        answer(move |_event: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                answers
            }
        })
    }

    #[tokio::test]
    async fn until_answered_is_removed_once_answered() {
        let registry = QuestionRegistry::new();
        registry
            .add(Question::until_answered(answer(|event: String| async move {
                event == "yes"
            })))
            .await;

        assert!(!registry.dispatch(&"no".to_string()).await);
        assert_eq!(registry.len().await, 1);

        assert!(registry.dispatch(&"yes".to_string()).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn forever_persists_after_answering() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = QuestionRegistry::new();
        registry
            .add(Question::forever(counting_probe(Arc::clone(&calls), true)))
            .await;

        assert!(registry.dispatch(&"hi".to_string()).await);
        assert!(registry.dispatch(&"hi".to_string()).await);
        assert_eq!(registry.len().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_question_is_dropped_without_being_asked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = QuestionRegistry::new();
        registry
            .add(Question::until_expired_or_answered(
                Duration::from_millis(5),
                counting_probe(Arc::clone(&calls), true),
            ))
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!registry.dispatch(&"late".to_string()).await);
        assert!(registry.is_empty().await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unexpired_wrapper_delegates_to_inner() {
        let registry = QuestionRegistry::new();
        registry
            .add(Question::until_expired_or_answered(
                Duration::from_secs(60),
                answer(|event: String| async move { event == "answer" }),
            ))
            .await;

        assert!(!registry.dispatch(&"not it".to_string()).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.dispatch(&"answer".to_string()).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn until_expired_repeats_until_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = QuestionRegistry::new();
        registry
            .add(Question::until_expired(
                Duration::from_secs(60),
                counting_probe(Arc::clone(&calls), false),
            ))
            .await;

        assert!(!registry.dispatch(&"a".to_string()).await);
        assert!(!registry.dispatch(&"b".to_string()).await);
        assert_eq!(registry.len().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dispatch_stops_at_first_responder_in_insertion_order() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let registry = QuestionRegistry::new();
        registry
            .add(Question::forever(counting_probe(Arc::clone(&first), true)))
            .await;
        registry
            .add(Question::forever(counting_probe(Arc::clone(&second), true)))
            .await;

        assert!(registry.dispatch(&"hello".to_string()).await);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }
}

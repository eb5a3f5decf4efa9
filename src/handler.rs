//! The application-supplied handler interface: a closure matched against a
//! query, producing records (spec §3 "handler"). Handlers are referenced
//! (not owned) by the server; they must be `Send + Sync` and callable for
//! the server's lifetime.

use crate::error::HandlerError;
use crate::query::Query;
use crate::response::HandlerOutcome;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<HandlerOutcome, HandlerError>>;
}

pub type HandlerRef = Arc<dyn Handler>;

/// Blanket impl so any `async fn(&Query) -> Result<impl Into<HandlerOutcome>, HandlerError>`-shaped
/// closure can be registered directly, matching the ergonomics of
/// `server.rule(pattern, types, handler)` in spec §6.
impl<F, Fut, T> Handler for F
where
    F: Fn(&Query) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, HandlerError>> + Send,
    T: Into<HandlerOutcome>,
{
    fn call<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<HandlerOutcome, HandlerError>> {
        Box::pin(async move { (self)(query).await.map(Into::into) })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn noop_handler() -> impl Handler {
        |_query: &Query| async { Ok::<HandlerOutcome, HandlerError>(HandlerOutcome::Nothing) }
    }
}

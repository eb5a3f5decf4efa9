//! The query middleware stack (C4, spec §4.4): `Query → Response`,
//! headed by a built-in exception-handler middleware and, just above the
//! rule-dispatch sink, the built-in hook middleware.

use crate::error::{ErrorClass, HandlerError};
use crate::exception::ExceptionTable;
use crate::handler::BoxFuture;
use crate::hooks::Hooks;
use crate::query::Query;
use crate::response::Response;
use log::warn;
use std::sync::Arc;

/// A container's own rule-tree lookup can legitimately produce "no rule
/// matched" rather than an error — distinct from any DNS rcode, and
/// handled by the caller (fall-through to a sibling rule, or NXDOMAIN at
/// the root). See spec §4.3.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Matched(Response),
    NotMatched,
}

pub type QueryResult = Result<ResolveOutcome, HandlerError>;

/// `(value, call_next) -> value`, specialized to this stack's types.
/// Implementations may short-circuit by not calling `next.run(..)`, and
/// may transform the query before the call or the outcome after.
pub trait QueryMiddleware: Send + Sync {
    fn call(&self, query: Query, next: QueryNext) -> BoxFuture<'static, QueryResult>;
}

pub trait QuerySink: Send + Sync {
    fn call(&self, query: Query) -> BoxFuture<'static, QueryResult>;
}

/// The as-yet-uncalled remainder of the stack, handed to each middleware
/// so it controls whether (and when) to continue.
pub struct QueryNext {
    stack: Arc<QueryStack>,
    index: usize,
}

impl QueryNext {
    pub fn run(self, query: Query) -> BoxFuture<'static, QueryResult> {
        QueryStack::dispatch(self.stack, self.index, query)
    }
}

/// A frozen, composed middleware chain plus its terminal sink. Built once
/// at freeze time (spec §4.4/§9: "compose at freeze time into a single
/// callable chain; avoid recomputing the chain per request").
pub struct QueryStack {
    chain: Vec<Arc<dyn QueryMiddleware>>,
    sink: Arc<dyn QuerySink>,
}

impl QueryStack {
    /// Builds the default assembled stack: `ExceptionHandler -> user
    /// middlewares (registration order) -> Hooks -> sink`.
    pub fn compose(
        user_middlewares: Vec<Arc<dyn QueryMiddleware>>,
        exception_handlers: Arc<ExceptionTable<dyn QueryExceptionHandler>>,
        hooks: Arc<Hooks>,
        sink: Arc<dyn QuerySink>,
    ) -> Arc<Self> {
        let mut chain: Vec<Arc<dyn QueryMiddleware>> = Vec::with_capacity(user_middlewares.len() + 2);
        chain.push(Arc::new(ExceptionHandlerMiddleware { table: exception_handlers }));
        chain.extend(user_middlewares);
        chain.push(Arc::new(HookMiddleware { hooks }));
        Arc::new(Self { chain, sink })
    }

    pub fn run(self: Arc<Self>, query: Query) -> BoxFuture<'static, QueryResult> {
        Self::dispatch(self, 0, query)
    }

    fn dispatch(stack: Arc<QueryStack>, index: usize, query: Query) -> BoxFuture<'static, QueryResult> {
        Box::pin(async move {
            if index >= stack.chain.len() {
                return stack.sink.call(query).await;
            }
            let middleware = Arc::clone(&stack.chain[index]);
            let next = QueryNext {
                stack: Arc::clone(&stack),
                index: index + 1,
            };
            middleware.call(query, next).await
        })
    }
}

/// A handler for a specific [`ErrorClass`] ancestor, producing the value
/// the query stack ultimately returns to its caller (spec §4.5).
pub trait QueryExceptionHandler: Send + Sync {
    fn call(&self, error: HandlerError, query: Query) -> BoxFuture<'static, Response>;
}

impl<F> QueryExceptionHandler for F
where
    F: Fn(HandlerError, Query) -> BoxFuture<'static, Response> + Send + Sync,
{
    fn call(&self, error: HandlerError, query: Query) -> BoxFuture<'static, Response> {
        (self)(error, query)
    }
}

/// Terminal fallback: produces `SERVFAIL` (spec §7), overridable by
/// registering a handler for [`ErrorClass::Error`].
pub struct DefaultQueryExceptionHandler;

impl QueryExceptionHandler for DefaultQueryExceptionHandler {
    fn call(&self, error: HandlerError, query: Query) -> BoxFuture<'static, Response> {
        Box::pin(async move {
            warn!("unhandled error for query {}: {}", query.name, error);
            Response::servfail()
        })
    }
}

/// Always the outermost middleware of a composed query stack. Catches any
/// [`HandlerError`] raised downstream and dispatches it to the most
/// specific registered handler for its class.
struct ExceptionHandlerMiddleware {
    table: Arc<ExceptionTable<dyn QueryExceptionHandler>>,
}

impl QueryMiddleware for ExceptionHandlerMiddleware {
    fn call(&self, query: Query, next: QueryNext) -> BoxFuture<'static, QueryResult> {
        let table = Arc::clone(&self.table);
        Box::pin(async move {
            let query_for_handler = query.clone();
            match next.run(query).await {
                Ok(outcome) => Ok(outcome),
                Err(error) => {
                    let handler = table.resolve(error.class);
                    let response = handler.call(error, query_for_handler).await;
                    Ok(ResolveOutcome::Matched(response))
                }
            }
        })
    }
}

/// Always inserted just above the rule-dispatch sink. Runs
/// `before_first_middleware` and `before_dispatch` query hooks, then the
/// sink, then `after_dispatch` response hooks when the sink produced a
/// match.
struct HookMiddleware {
    hooks: Arc<Hooks>,
}

impl QueryMiddleware for HookMiddleware {
    fn call(&self, query: Query, next: QueryNext) -> BoxFuture<'static, QueryResult> {
        let hooks = Arc::clone(&self.hooks);
        Box::pin(async move {
            let query = hooks.run_before_first_middleware(query).await;
            let query = hooks.run_before_dispatch(query).await;
            let outcome = next.run(query).await?;
            match outcome {
                ResolveOutcome::Matched(response) => {
                    let response = hooks.run_after_dispatch(response).await;
                    Ok(ResolveOutcome::Matched(response))
                }
                ResolveOutcome::NotMatched => Ok(ResolveOutcome::NotMatched),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::qtype::QType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSink;
    impl QuerySink for RecordingSink {
        fn call(&self, _query: Query) -> BoxFuture<'static, QueryResult> {
            Box::pin(async { Ok(ResolveOutcome::NotMatched) })
        }
    }

    struct FailingSink;
    impl QuerySink for FailingSink {
        fn call(&self, _query: Query) -> BoxFuture<'static, QueryResult> {
            Box::pin(async { Err(HandlerError::not_implemented("nope")) })
        }
    }

    fn test_query() -> Query {
        Query::new(Name::parse("example.com").unwrap(), QType::A)
    }

    #[tokio::test]
    async fn middleware_runs_outermost_to_innermost_and_back() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct Tracer(Arc<std::sync::Mutex<Vec<&'static str>>>, &'static str);
        impl QueryMiddleware for Tracer {
            fn call(&self, query: Query, next: QueryNext) -> BoxFuture<'static, QueryResult> {
                let order = Arc::clone(&self.0);
                let label = self.1;
                Box::pin(async move {
                    order.lock().unwrap().push(label);
                    let result = next.run(query).await;
                    order.lock().unwrap().push(label);
                    result
                })
            }
        }

        let stack = QueryStack::compose(
            vec![
                Arc::new(Tracer(Arc::clone(&order), "m1")),
                Arc::new(Tracer(Arc::clone(&order), "m2")),
            ],
            Arc::new(ExceptionTable::new(Arc::new(DefaultQueryExceptionHandler))),
            Arc::new(Hooks::new()),
            Arc::new(RecordingSink),
        );

        stack.run(test_query()).await.unwrap();

        let recorded = order.lock().unwrap().clone();
        assert_eq!(recorded, vec!["m1", "m2", "m2", "m1"]);
    }

    #[tokio::test]
    async fn exception_handler_catches_errors_from_the_sink() {
        let exception_table = Arc::new(ExceptionTable::new(Arc::new(DefaultQueryExceptionHandler)));
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        exception_table.register(
            ErrorClass::NotImplemented,
            Arc::new(move |_e: HandlerError, _q: Query| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Response::with_rcode(crate::response::Rcode::NotImp) })
                    as BoxFuture<'static, Response>
            }),
        );

        let stack = QueryStack::compose(
            vec![],
            exception_table,
            Arc::new(Hooks::new()),
            Arc::new(FailingSink),
        );

        let outcome = stack.run(test_query()).await.unwrap();
        match outcome {
            ResolveOutcome::Matched(response) => {
                assert_eq!(response.rcode, crate::response::Rcode::NotImp);
            }
            ResolveOutcome::NotMatched => panic!("expected a matched response"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn default_exception_handler_produces_servfail() {
        let stack = QueryStack::compose(
            vec![],
            Arc::new(ExceptionTable::new(Arc::new(DefaultQueryExceptionHandler))),
            Arc::new(Hooks::new()),
            Arc::new(FailingSink),
        );

        let outcome = stack.run(test_query()).await.unwrap();
        match outcome {
            ResolveOutcome::Matched(response) => {
                assert_eq!(response.rcode, crate::response::Rcode::ServFail);
            }
            ResolveOutcome::NotMatched => panic!("expected a matched response"),
        }
    }
}

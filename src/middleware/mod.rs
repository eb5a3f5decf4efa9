//! Two nested middleware stacks (C4, spec §4.4): one over raw wire
//! records, one over decoded queries, each headed by a built-in
//! exception-handler middleware.

pub mod query;
pub mod raw;

pub use query::{
    DefaultQueryExceptionHandler, QueryExceptionHandler, QueryMiddleware, QueryNext, QueryResult,
    QuerySink, QueryStack, ResolveOutcome,
};
pub use raw::{
    DefaultRawExceptionHandler, RawExceptionHandler, RawMiddleware, RawNext, RawResult, RawSink,
    RawStack,
};

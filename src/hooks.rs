//! The built-in hook middleware (spec §4.4): registered hooks run in
//! phases `before_first_middleware`, `before_dispatch`, and
//! `after_dispatch`, each may replace the current `Query` or `Response`.
//! The hook middleware itself sits just above the rule-dispatch sink in a
//! container's composed query stack (see [`crate::middleware::query`]).

use crate::handler::BoxFuture;
use crate::query::Query;
use crate::response::Response;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    BeforeFirstMiddleware,
    BeforeDispatch,
    AfterDispatch,
}

pub type QueryHookRef = Arc<dyn Fn(Query) -> BoxFuture<'static, Query> + Send + Sync>;
pub type ResponseHookRef = Arc<dyn Fn(Response) -> BoxFuture<'static, Response> + Send + Sync>;

/// A container's registered hooks, grouped by phase. `before_*` hooks see
/// and may rewrite the `Query` before dispatch; `after_dispatch` hooks see
/// and may rewrite the `Response` once dispatch has produced one.
#[derive(Default)]
pub struct Hooks {
    before_first_middleware: RwLock<Vec<QueryHookRef>>,
    before_dispatch: RwLock<Vec<QueryHookRef>>,
    after_dispatch: RwLock<Vec<ResponseHookRef>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_query_hook(&self, phase: HookPhase, hook: QueryHookRef) {
        let list = match phase {
            HookPhase::BeforeFirstMiddleware => &self.before_first_middleware,
            HookPhase::BeforeDispatch => &self.before_dispatch,
            HookPhase::AfterDispatch => {
                panic!("after_dispatch hooks operate on Response, use add_response_hook")
            }
        };
        list.write().expect("hooks lock poisoned").push(hook);
    }

    pub fn add_response_hook(&self, hook: ResponseHookRef) {
        self.after_dispatch
            .write()
            .expect("hooks lock poisoned")
            .push(hook);
    }

    pub async fn run_before_first_middleware(&self, query: Query) -> Query {
        Self::fold_query(&self.before_first_middleware, query).await
    }

    pub async fn run_before_dispatch(&self, query: Query) -> Query {
        Self::fold_query(&self.before_dispatch, query).await
    }

    pub async fn run_after_dispatch(&self, response: Response) -> Response {
        let hooks = self
            .after_dispatch
            .read()
            .expect("hooks lock poisoned")
            .clone();
        let mut response = response;
        for hook in hooks {
            response = hook(response).await;
        }
        response
    }

    async fn fold_query(list: &RwLock<Vec<QueryHookRef>>, query: Query) -> Query {
        let hooks = list.read().expect("hooks lock poisoned").clone();
        let mut query = query;
        for hook in hooks {
            query = hook(query).await;
        }
        query
    }
}

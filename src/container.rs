//! The rule container ("Scaffold", C3, spec §4.3): an ordered list of
//! rules with its own middleware stack, dispatching to the first
//! matching rule, falling through past a nested container that itself
//! reports no match. Mutable during configuration, frozen at server
//! start.

use crate::error::{ConfigurationError, HandlerError};
use crate::exception::ExceptionTable;
use crate::handler::{BoxFuture, HandlerRef};
use crate::hooks::{HookPhase, Hooks, QueryHookRef, ResponseHookRef};
use crate::middleware::query::{
    DefaultQueryExceptionHandler, QueryExceptionHandler, QueryMiddleware, QueryResult, QuerySink,
    QueryStack, ResolveOutcome,
};
use crate::name::SuffixResolver;
use crate::qtype::TypeSet;
use crate::query::Query;
use crate::rule::{Matcher, Rule, RuleBody};
use log::debug;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub struct Container {
    pub name: String,
    rules: RwLock<Vec<Rule>>,
    user_middlewares: RwLock<Vec<Arc<dyn QueryMiddleware>>>,
    hooks: Arc<Hooks>,
    exception_handlers: Arc<ExceptionTable<dyn QueryExceptionHandler>>,
    frozen: AtomicBool,
    composed: RwLock<Option<Arc<QueryStack>>>,
    /// Default `case_sensitive` for rules registered through [`Container::rule`]
    /// (spec §6's `case_sensitive_default` setting).
    case_sensitive_default: bool,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_case_sensitive_default(name, false)
    }

    /// Like [`Container::new`], but rules registered through
    /// [`Container::rule`] default to `case_sensitive` instead of `false`.
    /// `Server::with_settings` uses this to apply `Settings::case_sensitive_default`
    /// to the root container.
    pub fn with_case_sensitive_default(name: impl Into<String>, case_sensitive_default: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            rules: RwLock::new(Vec::new()),
            user_middlewares: RwLock::new(Vec::new()),
            hooks: Arc::new(Hooks::new()),
            exception_handlers: Arc::new(ExceptionTable::new(Arc::new(DefaultQueryExceptionHandler))),
            frozen: AtomicBool::new(false),
            composed: RwLock::new(None),
            case_sensitive_default,
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    fn check_not_frozen(&self) -> Result<(), ConfigurationError> {
        if self.is_frozen() {
            Err(ConfigurationError::AlreadyFrozen)
        } else {
            Ok(())
        }
    }

    /// Registers a rule that dispatches straight to `handler` when its
    /// pattern matches. `pattern` is interpreted by the `smart_make_rule`
    /// heuristic (spec §6).
    pub fn rule(
        &self,
        pattern: &str,
        types: TypeSet,
        handler: HandlerRef,
    ) -> Result<HandlerRef, ConfigurationError> {
        self.check_not_frozen()?;
        let matcher = Matcher::smart(pattern)?;
        self.add_rule(Rule::handler(
            matcher,
            types,
            self.case_sensitive_default,
            Arc::clone(&handler),
        ))?;
        Ok(handler)
    }

    pub fn rule_case_sensitive(
        &self,
        pattern: &str,
        types: TypeSet,
        handler: HandlerRef,
        case_sensitive: bool,
    ) -> Result<HandlerRef, ConfigurationError> {
        self.check_not_frozen()?;
        let matcher = Matcher::smart(pattern)?;
        self.add_rule(Rule::handler(matcher, types, case_sensitive, Arc::clone(&handler)))?;
        Ok(handler)
    }

    /// Registers an already-built rule (or sub-container rule built via
    /// [`Rule::container`]).
    pub fn register_rule(&self, rule: Rule) -> Result<(), ConfigurationError> {
        self.add_rule(rule)
    }

    fn add_rule(&self, rule: Rule) -> Result<(), ConfigurationError> {
        self.check_not_frozen()?;
        self.rules
            .write()
            .expect("container rules lock poisoned")
            .push(rule);
        Ok(())
    }

    /// Wraps `child` as a `Container` rule whose outer match condition is
    /// `matcher` (spec §4.3). Rejects the mount if `self` is transitively
    /// reachable from `child` (a cycle).
    pub fn mount(
        &self,
        child: Arc<Container>,
        matcher: Matcher,
        types: TypeSet,
        case_sensitive: bool,
    ) -> Result<(), ConfigurationError> {
        self.check_not_frozen()?;

        let target = self as *const Container;
        let mut visited = HashSet::new();
        if reachable_from(&child, target, &mut visited) {
            return Err(ConfigurationError::MountCycle);
        }

        self.add_rule(Rule::container(matcher, types, case_sensitive, child))
    }

    pub fn register_middleware(&self, middleware: Arc<dyn QueryMiddleware>) -> Result<(), ConfigurationError> {
        self.check_not_frozen()?;
        self.user_middlewares
            .write()
            .expect("container middlewares lock poisoned")
            .push(middleware);
        Ok(())
    }

    pub fn exception_handler(&self, class: crate::error::ErrorClass, handler: Arc<dyn QueryExceptionHandler>) {
        self.exception_handlers.register(class, handler);
    }

    pub fn add_query_hook(&self, phase: HookPhase, hook: QueryHookRef) {
        self.hooks.add_query_hook(phase, hook);
    }

    pub fn add_response_hook(&self, hook: ResponseHookRef) {
        self.hooks.add_response_hook(hook);
    }

    /// Snapshots the middleware stack and recursively freezes every
    /// mounted child container. Idempotent, since a container reachable
    /// through several mount points must only be frozen once.
    pub fn freeze(self: &Arc<Self>, suffix: Arc<dyn SuffixResolver>) -> Result<(), ConfigurationError> {
        if self.is_frozen() {
            return Ok(());
        }
        self.frozen.store(true, Ordering::SeqCst);

        let user_middlewares = self
            .user_middlewares
            .read()
            .expect("container middlewares lock poisoned")
            .clone();

        let sink: Arc<dyn QuerySink> = Arc::new(RuleDispatchSink {
            container: Arc::clone(self),
            suffix: Arc::clone(&suffix),
        });

        let stack = QueryStack::compose(
            user_middlewares,
            Arc::clone(&self.exception_handlers),
            Arc::clone(&self.hooks),
            sink,
        );

        *self.composed.write().expect("container composed lock poisoned") = Some(stack);

        let children: Vec<Arc<Container>> = self
            .rules
            .read()
            .expect("container rules lock poisoned")
            .iter()
            .filter_map(|rule| match &rule.body {
                RuleBody::Container(child) => Some(Arc::clone(child)),
                RuleBody::Handler(_) => None,
            })
            .collect();

        for child in children {
            child.freeze(Arc::clone(&suffix))?;
        }

        Ok(())
    }

    /// Runs this container's composed query stack: `ExceptionHandler ->
    /// user middlewares -> Hooks -> rule dispatch`. Panics if called
    /// before the server has frozen the configuration — a programmer
    /// error, not a runtime condition callers need to handle.
    pub async fn resolve(self: Arc<Self>, query: Query) -> QueryResult {
        let stack = self
            .composed
            .read()
            .expect("container composed lock poisoned")
            .clone()
            .expect("container.resolve() called before freeze()");
        stack.run(query).await
    }
}

fn reachable_from(container: &Arc<Container>, target: *const Container, visited: &mut HashSet<*const Container>) -> bool {
    let ptr = Arc::as_ptr(container);
    if ptr == target {
        return true;
    }
    if !visited.insert(ptr) {
        return false;
    }
    let rules = container.rules.read().expect("container rules lock poisoned");
    rules.iter().any(|rule| match &rule.body {
        RuleBody::Container(child) => reachable_from(child, target, visited),
        RuleBody::Handler(_) => false,
    })
}

/// The terminal sink of a container's composed query stack: iterates
/// rules in registration order, recursing into matched nested containers
/// and falling through past a `NotMatched` child (spec §4.3 step 2).
struct RuleDispatchSink {
    container: Arc<Container>,
    suffix: Arc<dyn SuffixResolver>,
}

enum MatchedBody {
    Handler(HandlerRef),
    Container(Arc<Container>),
}

impl QuerySink for RuleDispatchSink {
    fn call(&self, query: Query) -> BoxFuture<'static, QueryResult> {
        let container = Arc::clone(&self.container);
        let suffix = Arc::clone(&self.suffix);
        Box::pin(async move { dispatch(container, suffix, query).await })
    }
}

async fn dispatch(
    container: Arc<Container>,
    suffix: Arc<dyn SuffixResolver>,
    query: Query,
) -> QueryResult {
    let candidates: Vec<MatchedBody> = {
        let rules = container.rules.read().expect("container rules lock poisoned");
        rules
            .iter()
            .filter(|rule| rule.matches(&query, suffix.as_ref()))
            .map(|rule| match &rule.body {
                RuleBody::Handler(handler) => MatchedBody::Handler(Arc::clone(handler)),
                RuleBody::Container(child) => MatchedBody::Container(Arc::clone(child)),
            })
            .collect()
    };

    for candidate in candidates {
        match candidate {
            MatchedBody::Handler(handler) => {
                debug!("{}: dispatching {} {:?} to handler", container.name, query.name, query.qtype);
                let outcome = handler.call(&query).await.map_err(|e: HandlerError| e)?;
                return Ok(ResolveOutcome::Matched(outcome.normalize()));
            }
            MatchedBody::Container(child) => {
                debug!("{}: falling through into child container {}", container.name, child.name);
                match Container::resolve(child, query.clone()).await? {
                    ResolveOutcome::Matched(response) => return Ok(ResolveOutcome::Matched(response)),
                    ResolveOutcome::NotMatched => continue,
                }
            }
        }
    }

    Ok(ResolveOutcome::NotMatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::name::Name;
    use crate::qtype::QType;
    use crate::response::{HandlerOutcome, Record};
    use crate::suffix::PslSuffixResolver;
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::RData;
    use std::net::Ipv4Addr;

    fn a_handler(ip: Ipv4Addr) -> HandlerRef {
        Arc::new(move |q: &Query| {
            let name = q.name.clone();
            Box::pin(async move {
                Ok::<HandlerOutcome, HandlerError>(HandlerOutcome::One(Record::new(
                    name,
                    60,
                    RData::A(A(ip)),
                )))
            }) as crate::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        })
    }

    fn empty_handler() -> HandlerRef {
        Arc::new(|_q: &Query| {
            Box::pin(async { Ok::<HandlerOutcome, HandlerError>(HandlerOutcome::Nothing) })
                as crate::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        })
    }

    fn query(name: &str, qtype: QType) -> Query {
        Query::new(Name::parse(name).unwrap(), qtype)
    }

    #[tokio::test]
    async fn static_rule_resolves_to_its_handler() {
        let container = Container::new("root");
        container
            .rule("example.com", TypeSet::of([QType::A]), a_handler(Ipv4Addr::new(1, 2, 3, 4)))
            .unwrap();
        container.freeze(Arc::new(PslSuffixResolver::new())).unwrap();

        let outcome = container.resolve(query("example.com", QType::A)).await.unwrap();
        match outcome {
            ResolveOutcome::Matched(response) => assert_eq!(response.answers.len(), 1),
            ResolveOutcome::NotMatched => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn first_matching_rule_in_registration_order_wins() {
        let container = Container::new("root");
        container
            .rule("www.*.com.au", TypeSet::of([QType::A]), a_handler(Ipv4Addr::new(5, 6, 7, 8)))
            .unwrap();
        container
            .rule(
                "**.com.au",
                TypeSet::of([QType::A, QType::AAAA, QType::ANY]),
                empty_handler(),
            )
            .unwrap();
        container.freeze(Arc::new(PslSuffixResolver::new())).unwrap();

        let matched = container
            .clone()
            .resolve(query("www.foo.com.au", QType::A))
            .await
            .unwrap();
        match matched {
            ResolveOutcome::Matched(response) => assert_eq!(response.answers.len(), 1),
            ResolveOutcome::NotMatched => panic!("expected www rule to match"),
        }

        let fallthrough = container
            .clone()
            .resolve(query("foo.com.au", QType::A))
            .await
            .unwrap();
        match fallthrough {
            ResolveOutcome::Matched(response) => assert!(response.answers.is_empty()),
            ResolveOutcome::NotMatched => panic!("expected ** rule to match"),
        }

        let unmatched_type = container.resolve(query("foo.com.au", QType::TXT)).await.unwrap();
        assert!(matches!(unmatched_type, ResolveOutcome::NotMatched));
    }

    #[tokio::test]
    async fn nested_container_falls_through_to_sibling_rule() {
        let child = Container::new("child");
        child
            .rule("www.example.com", TypeSet::of([QType::A]), a_handler(Ipv4Addr::new(9, 9, 9, 9)))
            .unwrap();

        let root = Container::new("root");
        root.mount(
            child,
            Matcher::parse_zone("example.com").unwrap(),
            TypeSet::all(),
            false,
        )
        .unwrap();
        root.rule("example.com", TypeSet::of([QType::NS]), empty_handler())
            .unwrap();

        root.freeze(Arc::new(PslSuffixResolver::new())).unwrap();

        let ns = root.clone().resolve(query("example.com", QType::NS)).await.unwrap();
        assert!(matches!(ns, ResolveOutcome::Matched(_)));

        let www = root.resolve(query("www.example.com", QType::A)).await.unwrap();
        match www {
            ResolveOutcome::Matched(response) => assert_eq!(response.answers.len(), 1),
            ResolveOutcome::NotMatched => panic!("expected child container to match"),
        }
    }

    #[tokio::test]
    async fn mount_rejects_a_cycle() {
        let a = Container::new("a");
        let b = Container::new("b");
        a.mount(Arc::clone(&b), Matcher::parse_zone("b.example").unwrap(), TypeSet::all(), false)
            .unwrap();

        let err = b.mount(Arc::clone(&a), Matcher::parse_zone("a.example").unwrap(), TypeSet::all(), false);
        assert!(matches!(err, Err(ConfigurationError::MountCycle)));
    }

    #[tokio::test]
    async fn registration_after_freeze_fails() {
        let container = Container::new("root");
        container.freeze(Arc::new(PslSuffixResolver::new())).unwrap();
        let err = container.rule("example.com", TypeSet::all(), empty_handler());
        assert!(matches!(err, Err(ConfigurationError::AlreadyFrozen)));
    }

    #[tokio::test]
    async fn rule_uses_the_container_configured_case_sensitive_default() {
        let container = Container::with_case_sensitive_default("root", true);
        container
            .rule("Example.com", TypeSet::of([QType::A]), a_handler(Ipv4Addr::new(1, 2, 3, 4)))
            .unwrap();
        container.freeze(Arc::new(PslSuffixResolver::new())).unwrap();

        let differently_cased = container
            .clone()
            .resolve(query("example.com", QType::A))
            .await
            .unwrap();
        assert!(matches!(differently_cased, ResolveOutcome::NotMatched));

        let exact_case = container.resolve(query("Example.com", QType::A)).await.unwrap();
        assert!(matches!(exact_case, ResolveOutcome::Matched(_)));
    }
}

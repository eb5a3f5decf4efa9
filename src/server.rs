//! The orchestrator (C6, spec §6): owns the root rule container, the two
//! middleware stacks, the wire codec and suffix resolver collaborators,
//! and binds the transport(s) once frozen. Mirrors the shape of the
//! teacher's `DnsServer`, generalized from a single Docker-backed resolver
//! to the full composable pipeline.

use crate::codec::{HickoryCodec, WireCodec};
use crate::container::Container;
use crate::error::{ConfigurationError, ErrorClass, RawHandlerError};
use crate::exception::ExceptionTable;
use crate::handler::{BoxFuture, HandlerRef};
use crate::hooks::{HookPhase, QueryHookRef, ResponseHookRef};
use crate::middleware::query::{QueryExceptionHandler, QueryMiddleware};
use crate::middleware::raw::{DefaultRawExceptionHandler, RawExceptionHandler, RawMiddleware, RawResult, RawSink, RawStack};
use crate::name::SuffixResolver;
use crate::qtype::TypeSet;
use crate::response::Response;
use crate::rule::Matcher;
use crate::settings::{Settings, Transport};
use crate::suffix::PslSuffixResolver;
use crate::transport;
use anyhow::Result;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A programmable DNS name server: register rules and middleware against
/// the root container, then call [`Server::run`].
pub struct Server {
    pub name: String,
    root: Arc<Container>,
    raw_middlewares: RwLock<Vec<Arc<dyn RawMiddleware>>>,
    raw_exception_handlers: Arc<ExceptionTable<dyn RawExceptionHandler>>,
    codec: Arc<dyn WireCodec>,
    suffix: RwLock<Arc<dyn SuffixResolver>>,
    settings: Settings,
    raw_stack: RwLock<Option<Arc<RawStack>>>,
    frozen: AtomicBool,
}

impl Server {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_settings(name, Settings::default())
    }

    pub fn with_settings(name: impl Into<String>, settings: Settings) -> Arc<Self> {
        let codec: Arc<dyn WireCodec> = Arc::new(HickoryCodec::new());
        let root = Container::with_case_sensitive_default("root", settings.case_sensitive_default);
        Arc::new(Self {
            name: name.into(),
            root,
            raw_middlewares: RwLock::new(Vec::new()),
            raw_exception_handlers: Arc::new(ExceptionTable::new(Arc::new(
                DefaultRawExceptionHandler::new(Arc::clone(&codec)),
            ))),
            codec,
            suffix: RwLock::new(Arc::new(PslSuffixResolver::new())),
            settings,
            raw_stack: RwLock::new(None),
            frozen: AtomicBool::new(false),
        })
    }

    /// Swaps in a different `SuffixResolver` or `WireCodec` before `run()`.
    /// Only meaningful during configuration.
    pub fn with_suffix_resolver(&self, suffix: Arc<dyn SuffixResolver>) -> Result<(), ConfigurationError> {
        self.check_not_frozen()?;
        *self.suffix.write().expect("suffix resolver lock poisoned") = suffix;
        Ok(())
    }

    fn check_not_frozen(&self) -> Result<(), ConfigurationError> {
        if self.frozen.load(Ordering::SeqCst) {
            Err(ConfigurationError::AlreadyFrozen)
        } else {
            Ok(())
        }
    }

    pub fn root(&self) -> &Arc<Container> {
        &self.root
    }

    pub fn rule(&self, pattern: &str, types: TypeSet, handler: HandlerRef) -> Result<HandlerRef, ConfigurationError> {
        Ok(self.root.rule(pattern, types, handler)?)
    }

    pub fn mount(
        &self,
        child: Arc<Container>,
        matcher: Matcher,
        types: TypeSet,
        case_sensitive: bool,
    ) -> Result<(), ConfigurationError> {
        self.root.mount(child, matcher, types, case_sensitive)
    }

    pub fn register_middleware(&self, middleware: Arc<dyn QueryMiddleware>) -> Result<(), ConfigurationError> {
        self.root.register_middleware(middleware)
    }

    pub fn register_raw_middleware(&self, middleware: Arc<dyn RawMiddleware>) -> Result<(), ConfigurationError> {
        self.check_not_frozen()?;
        self.raw_middlewares
            .write()
            .expect("raw middlewares lock poisoned")
            .push(middleware);
        Ok(())
    }

    pub fn exception_handler(&self, class: ErrorClass, handler: Arc<dyn QueryExceptionHandler>) {
        self.root.exception_handler(class, handler);
    }

    pub fn raw_exception_handler(&self, class: ErrorClass, handler: Arc<dyn RawExceptionHandler>) {
        self.raw_exception_handlers.register(class, handler);
    }

    pub fn add_query_hook(&self, phase: HookPhase, hook: QueryHookRef) {
        self.root.add_query_hook(phase, hook);
    }

    pub fn add_response_hook(&self, hook: ResponseHookRef) {
        self.root.add_response_hook(hook);
    }

    /// Freezes the rule tree and both middleware stacks. Idempotent.
    fn freeze(self: &Arc<Self>) -> Result<(), ConfigurationError> {
        if self.frozen.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let suffix = self.suffix.read().expect("suffix resolver lock poisoned").clone();
        self.root.freeze(suffix)?;

        let raw_middlewares = self
            .raw_middlewares
            .read()
            .expect("raw middlewares lock poisoned")
            .clone();
        let sink: Arc<dyn RawSink> = Arc::new(QueryAdapter {
            root: Arc::clone(&self.root),
            codec: Arc::clone(&self.codec),
        });
        let stack = RawStack::compose(raw_middlewares, Arc::clone(&self.raw_exception_handlers), sink);
        *self.raw_stack.write().expect("raw stack lock poisoned") = Some(stack);

        Ok(())
    }

    /// Freezes the configuration and serves until a transport error occurs
    /// or the returned future is dropped/cancelled by the caller (typically
    /// raced against `tokio::signal::ctrl_c()`, as in `nserver-demo`).
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.freeze()?;

        let addr = self.settings.socket_addr()?;
        let raw_stack = self
            .raw_stack
            .read()
            .expect("raw stack lock poisoned")
            .clone()
            .expect("frozen above");

        info!("{}: serving on {} ({:?})", self.name, addr, self.settings.transport);

        match self.settings.transport {
            Transport::Udp => transport::udp::serve(addr, Arc::clone(&self.codec), raw_stack, &self.settings).await,
            Transport::Tcp => transport::tcp::serve(addr, raw_stack, &self.settings).await,
            Transport::Both => {
                let udp = transport::udp::serve(addr, Arc::clone(&self.codec), Arc::clone(&raw_stack), &self.settings);
                let tcp = transport::tcp::serve(addr, raw_stack, &self.settings);
                tokio::try_join!(udp, tcp)?;
                Ok(())
            }
        }
    }
}

/// The tail of the raw-record stack: decode the first question into a
/// `Query`, run the query-stack's resolve, convert the bubbled-up
/// `NotMatched` into `NXDOMAIN` (spec §4.3: "converted to NXDOMAIN only at
/// the server root"), and encode the result back onto the wire.
struct QueryAdapter {
    root: Arc<Container>,
    codec: Arc<dyn WireCodec>,
}

impl RawSink for QueryAdapter {
    fn call(&self, record: crate::codec::RawRecord) -> BoxFuture<'static, RawResult> {
        let root = Arc::clone(&self.root);
        let codec = Arc::clone(&self.codec);
        Box::pin(async move {
            // This framework handles OPCODE=QUERY only (spec §1); every
            // other opcode gets NOTIMPL without ever reaching the rule
            // tree.
            if record.opcode() != hickory_proto::op::OpCode::Query {
                return Ok(codec.error_reply(&record, crate::response::Rcode::NotImp));
            }

            let query = codec
                .decode_query(&record)
                .map_err(|e| RawHandlerError::new(ErrorClass::Decode, e.to_string()))?;

            let response = match root.resolve(query).await {
                Ok(crate::middleware::query::ResolveOutcome::Matched(response)) => response,
                Ok(crate::middleware::query::ResolveOutcome::NotMatched) => Response::nxdomain(),
                Err(error) => return Err(RawHandlerError::new(error.class, error.message)),
            };

            Ok(codec.encode_response(&record, &response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::qtype::QType;
    use crate::query::Query;
    use crate::response::{HandlerOutcome, Record};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::RData;
    use std::net::Ipv4Addr;

    fn a_handler(ip: Ipv4Addr) -> HandlerRef {
        Arc::new(move |q: &Query| {
            let name = q.name.clone();
            Box::pin(async move {
                Ok::<HandlerOutcome, crate::error::HandlerError>(HandlerOutcome::One(Record::new(
                    name,
                    60,
                    RData::A(A(ip)),
                )))
            }) as BoxFuture<'static, Result<HandlerOutcome, crate::error::HandlerError>>
        })
    }

    #[tokio::test]
    async fn unmatched_root_query_becomes_nxdomain() {
        let server = Server::new("test");
        server.rule("example.com", TypeSet::of([QType::A]), a_handler(Ipv4Addr::new(1, 2, 3, 4))).unwrap();
        server.clone().freeze().unwrap();

        let codec = HickoryCodec::new();
        let mut message = hickory_proto::op::Message::new();
        message.set_message_type(hickory_proto::op::MessageType::Query);
        let mut wire_query = hickory_proto::op::Query::new();
        wire_query.set_name("nowhere.example.net.".parse().unwrap());
        wire_query.set_query_type(hickory_proto::rr::RecordType::A);
        message.add_query(wire_query);
        let request = crate::codec::RawRecord::new(message);

        let stack = server.raw_stack.read().unwrap().clone().unwrap();
        let reply = stack.run(request).await.unwrap();
        assert_eq!(reply.message.header().response_code(), crate::response::Rcode::NXDomain);
        let _ = codec;
    }

    #[tokio::test]
    async fn matched_root_query_returns_its_answer() {
        let server = Server::new("test");
        server.rule("example.com", TypeSet::of([QType::A]), a_handler(Ipv4Addr::new(9, 9, 9, 9))).unwrap();
        server.clone().freeze().unwrap();

        let mut message = hickory_proto::op::Message::new();
        message.set_message_type(hickory_proto::op::MessageType::Query);
        let mut wire_query = hickory_proto::op::Query::new();
        wire_query.set_name("example.com.".parse().unwrap());
        wire_query.set_query_type(hickory_proto::rr::RecordType::A);
        message.add_query(wire_query);
        let request = crate::codec::RawRecord::new(message);

        let stack = server.raw_stack.read().unwrap().clone().unwrap();
        let reply = stack.run(request).await.unwrap();
        assert_eq!(reply.message.header().response_code(), crate::response::Rcode::NoError);
        assert_eq!(reply.message.answers().len(), 1);
    }

    #[tokio::test]
    async fn non_query_opcode_is_notimp_without_touching_the_rule_tree() {
        let server = Server::new("test");
        server.clone().freeze().unwrap();

        let mut message = hickory_proto::op::Message::new();
        message.set_message_type(hickory_proto::op::MessageType::Query);
        message.set_op_code(hickory_proto::op::OpCode::Update);
        let request = crate::codec::RawRecord::new(message);

        let stack = server.raw_stack.read().unwrap().clone().unwrap();
        let reply = stack.run(request).await.unwrap();
        assert_eq!(reply.message.header().response_code(), crate::response::Rcode::NotImp);
    }

    #[tokio::test]
    async fn settings_case_sensitive_default_applies_to_root_rules() {
        let settings = Settings {
            case_sensitive_default: true,
            ..Settings::default()
        };
        let server = Server::with_settings("test", settings);
        server
            .rule("Example.com", TypeSet::of([QType::A]), a_handler(Ipv4Addr::new(1, 2, 3, 4)))
            .unwrap();
        server.clone().freeze().unwrap();

        let mut message = hickory_proto::op::Message::new();
        message.set_message_type(hickory_proto::op::MessageType::Query);
        let mut wire_query = hickory_proto::op::Query::new();
        wire_query.set_name("example.com.".parse().unwrap());
        wire_query.set_query_type(hickory_proto::rr::RecordType::A);
        message.add_query(wire_query);
        let request = crate::codec::RawRecord::new(message);

        let stack = server.raw_stack.read().unwrap().clone().unwrap();
        let reply = stack.run(request).await.unwrap();
        assert_eq!(reply.message.header().response_code(), crate::response::Rcode::NXDomain);
    }
}

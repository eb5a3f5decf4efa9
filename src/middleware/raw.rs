//! The raw-record middleware stack (C4, spec §4.4): `RawRecord →
//! RawRecord`, headed by a built-in exception-handler middleware. Its
//! tail is the `QueryAdapter` sink (decode → run the query stack →
//! encode), assembled by [`crate::server::Server`].

use crate::codec::RawRecord;
use crate::error::{ErrorClass, RawHandlerError};
use crate::exception::ExceptionTable;
use crate::handler::BoxFuture;
use log::warn;
use std::sync::Arc;

pub type RawResult = Result<RawRecord, RawHandlerError>;

pub trait RawMiddleware: Send + Sync {
    fn call(&self, record: RawRecord, next: RawNext) -> BoxFuture<'static, RawResult>;
}

pub trait RawSink: Send + Sync {
    fn call(&self, record: RawRecord) -> BoxFuture<'static, RawResult>;
}

pub struct RawNext {
    stack: Arc<RawStack>,
    index: usize,
}

impl RawNext {
    pub fn run(self, record: RawRecord) -> BoxFuture<'static, RawResult> {
        RawStack::dispatch(self.stack, self.index, record)
    }
}

pub struct RawStack {
    chain: Vec<Arc<dyn RawMiddleware>>,
    sink: Arc<dyn RawSink>,
}

impl RawStack {
    pub fn compose(
        user_middlewares: Vec<Arc<dyn RawMiddleware>>,
        exception_handlers: Arc<ExceptionTable<dyn RawExceptionHandler>>,
        sink: Arc<dyn RawSink>,
    ) -> Arc<Self> {
        let mut chain: Vec<Arc<dyn RawMiddleware>> = Vec::with_capacity(user_middlewares.len() + 1);
        chain.push(Arc::new(RawExceptionHandlerMiddleware { table: exception_handlers }));
        chain.extend(user_middlewares);
        Arc::new(Self { chain, sink })
    }

    pub fn run(self: Arc<Self>, record: RawRecord) -> BoxFuture<'static, RawResult> {
        Self::dispatch(self, 0, record)
    }

    fn dispatch(stack: Arc<RawStack>, index: usize, record: RawRecord) -> BoxFuture<'static, RawResult> {
        Box::pin(async move {
            if index >= stack.chain.len() {
                return stack.sink.call(record).await;
            }
            let middleware = Arc::clone(&stack.chain[index]);
            let next = RawNext {
                stack: Arc::clone(&stack),
                index: index + 1,
            };
            middleware.call(record, next).await
        })
    }
}

pub trait RawExceptionHandler: Send + Sync {
    fn call(&self, error: RawHandlerError, request: RawRecord) -> BoxFuture<'static, RawRecord>;
}

impl<F> RawExceptionHandler for F
where
    F: Fn(RawHandlerError, RawRecord) -> BoxFuture<'static, RawRecord> + Send + Sync,
{
    fn call(&self, error: RawHandlerError, request: RawRecord) -> BoxFuture<'static, RawRecord> {
        (self)(error, request)
    }
}

/// `FORMERR` for [`ErrorClass::Decode`], `SERVFAIL` for everything else
/// (spec §7). Always able to build a reply here since, by the time the
/// raw stack runs, the request bytes have already been parsed into a
/// `RawRecord`; total parse failure (no `RawRecord` at all) is handled by
/// the transport layer itself, which discards the datagram/frame.
pub struct DefaultRawExceptionHandler {
    codec: Arc<dyn crate::codec::WireCodec>,
}

impl DefaultRawExceptionHandler {
    pub fn new(codec: Arc<dyn crate::codec::WireCodec>) -> Self {
        Self { codec }
    }
}

impl RawExceptionHandler for DefaultRawExceptionHandler {
    fn call(&self, error: RawHandlerError, request: RawRecord) -> BoxFuture<'static, RawRecord> {
        let codec = Arc::clone(&self.codec);
        Box::pin(async move {
            warn!("unhandled raw error: {error}");
            let rcode = match error.class {
                ErrorClass::Decode => crate::response::Rcode::FormErr,
                _ => crate::response::Rcode::ServFail,
            };
            codec.error_reply(&request, rcode)
        })
    }
}

struct RawExceptionHandlerMiddleware {
    table: Arc<ExceptionTable<dyn RawExceptionHandler>>,
}

impl RawMiddleware for RawExceptionHandlerMiddleware {
    fn call(&self, record: RawRecord, next: RawNext) -> BoxFuture<'static, RawResult> {
        let table = Arc::clone(&self.table);
        Box::pin(async move {
            let original = record.clone();
            match next.run(record).await {
                Ok(reply) => Ok(reply),
                Err(error) => {
                    let handler = table.resolve(error.class);
                    Ok(handler.call(error, original).await)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HickoryCodec;
    use hickory_proto::op::{Message, MessageType, Query as WireQuery};
    use hickory_proto::rr::{Name as HName, RecordType};

    fn sample_request() -> RawRecord {
        let mut message = Message::new();
        message.set_message_type(MessageType::Query);
        let mut query = WireQuery::new();
        query.set_name("example.com.".parse::<HName>().unwrap());
        query.set_query_type(RecordType::A);
        message.add_query(query);
        RawRecord::new(message)
    }

    struct FailingSink(ErrorClass);
    impl RawSink for FailingSink {
        fn call(&self, _record: RawRecord) -> BoxFuture<'static, RawResult> {
            let class = self.0;
            Box::pin(async move { Err(RawHandlerError::new(class, "boom")) })
        }
    }

    #[tokio::test]
    async fn decode_error_class_maps_to_formerr() {
        let codec: Arc<dyn crate::codec::WireCodec> = Arc::new(HickoryCodec::new());
        let exception_table = Arc::new(ExceptionTable::new(
            Arc::new(DefaultRawExceptionHandler::new(codec)) as Arc<dyn RawExceptionHandler>,
        ));
        let stack = RawStack::compose(vec![], exception_table, Arc::new(FailingSink(ErrorClass::Decode)));
        let reply = stack.run(sample_request()).await.unwrap();
        assert_eq!(reply.message.header().response_code(), crate::response::Rcode::FormErr);
    }

    #[tokio::test]
    async fn other_errors_map_to_servfail() {
        let codec: Arc<dyn crate::codec::WireCodec> = Arc::new(HickoryCodec::new());
        let exception_table = Arc::new(ExceptionTable::new(
            Arc::new(DefaultRawExceptionHandler::new(codec)) as Arc<dyn RawExceptionHandler>,
        ));
        let stack = RawStack::compose(vec![], exception_table, Arc::new(FailingSink(ErrorClass::Handler)));
        let reply = stack.run(sample_request()).await.unwrap();
        assert_eq!(reply.message.header().response_code(), crate::response::Rcode::ServFail);
    }
}

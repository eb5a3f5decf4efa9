//! The `WireCodec` collaborator (spec §1, §6): deliberately out of the
//! rule-matching/middleware core, injected so that core logic never
//! touches wire bytes or rdata directly. `RawRecord` is the opaque
//! wire-level value the raw middleware stack passes around.
//!
//! [`HickoryCodec`] is the shipped default, built on `hickory-proto` — the
//! same wire-format crate underneath the teacher's `hickory-server`
//! dependency, used directly here since this crate builds its own
//! transport and pipeline instead of `hickory-server`'s `ServerFuture`.
//! See `other_examples/67991620_hyperpolymath-hesiod-dns-map__crates-hesiod-lib-src-server.rs.rs`
//! for the same `Message`/`Header`/`Record` construction pattern this
//! follows.

use crate::error::DecodeError;
use crate::name::Name;
use crate::query::Query;
use crate::response::{Rcode, Record, Response};
use hickory_proto::op::{Header, Message, MessageType, OpCode};
use hickory_proto::rr::Name as WireName;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

/// The wire-level value the raw middleware stack operates on: opaque to
/// the core, carrying the full request (on the way in) or the
/// in-progress reply (on the way out).
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub message: Message,
}

impl RawRecord {
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    pub fn opcode(&self) -> OpCode {
        self.message.header().op_code()
    }
}

/// Parse bytes → `RawRecord`; serialize `RawRecord` → bytes; construct
/// empty/error replies from a request record; decode the first question
/// into a [`Query`]; encode a [`Response`] back onto a request's
/// `RawRecord`. A faithful port can substitute any DNS wire library here
/// (spec §1).
pub trait WireCodec: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<RawRecord, DecodeError>;
    fn serialize(&self, record: &RawRecord) -> Result<Vec<u8>, DecodeError>;
    fn empty_reply(&self, request: &RawRecord) -> RawRecord;
    fn error_reply(&self, request: &RawRecord, rcode: Rcode) -> RawRecord;
    fn decode_query(&self, request: &RawRecord) -> Result<Query, DecodeError>;
    fn encode_response(&self, request: &RawRecord, response: &Response) -> RawRecord;
    /// Produces the minimal truncated form of `reply` (header and question
    /// only, `TC` bit set) for a UDP transport whose serialized reply would
    /// exceed the negotiated message size (spec §7).
    fn mark_truncated(&self, reply: &RawRecord) -> RawRecord;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HickoryCodec;

impl HickoryCodec {
    pub fn new() -> Self {
        Self
    }
}

impl WireCodec for HickoryCodec {
    fn parse(&self, bytes: &[u8]) -> Result<RawRecord, DecodeError> {
        Message::from_bytes(bytes)
            .map(RawRecord::new)
            .map_err(|e| DecodeError(e.to_string()))
    }

    fn serialize(&self, record: &RawRecord) -> Result<Vec<u8>, DecodeError> {
        record
            .message
            .to_bytes()
            .map_err(|e| DecodeError(e.to_string()))
    }

    fn empty_reply(&self, request: &RawRecord) -> RawRecord {
        self.error_reply(request, Rcode::NoError)
    }

    fn error_reply(&self, request: &RawRecord, rcode: Rcode) -> RawRecord {
        let mut header = Header::response_from_request(request.message.header());
        header.set_response_code(rcode);

        let mut reply = Message::new();
        reply.set_header(header);
        for query in request.message.queries() {
            reply.add_query(query.clone());
        }

        RawRecord::new(reply)
    }

    fn decode_query(&self, request: &RawRecord) -> Result<Query, DecodeError> {
        let query = request
            .message
            .queries()
            .first()
            .ok_or_else(|| DecodeError("request carries no question".to_string()))?;

        let name = wire_name_to_name(query.name());
        Ok(Query::new(name, query.query_type()))
    }

    fn encode_response(&self, request: &RawRecord, response: &Response) -> RawRecord {
        let mut header = Header::response_from_request(request.message.header());
        header.set_response_code(response.rcode);
        header.set_message_type(MessageType::Response);
        header.set_authoritative(true);

        let mut reply = Message::new();
        reply.set_header(header);
        for query in request.message.queries() {
            reply.add_query(query.clone());
        }

        for record in &response.answers {
            reply.add_answer(record_to_wire(record));
        }
        for record in &response.authority {
            reply.add_name_server(record_to_wire(record));
        }
        for record in &response.additional {
            reply.add_additional(record_to_wire(record));
        }

        RawRecord::new(reply)
    }

    fn mark_truncated(&self, reply: &RawRecord) -> RawRecord {
        let mut header = *reply.message.header();
        header.set_truncated(true);

        let mut truncated = Message::new();
        truncated.set_header(header);
        for query in reply.message.queries() {
            truncated.add_query(query.clone());
        }

        RawRecord::new(truncated)
    }
}

fn wire_name_to_name(name: &WireName) -> Name {
    let labels = name
        .iter()
        .map(|label| String::from_utf8_lossy(label).into_owned());
    Name::from_labels(labels)
}

fn name_to_wire_name(name: &Name) -> WireName {
    name.to_string()
        .parse()
        .unwrap_or_else(|_| WireName::root())
}

fn record_to_wire(record: &Record) -> hickory_proto::rr::Record {
    hickory_proto::rr::Record::from_rdata(
        name_to_wire_name(&record.name),
        record.ttl,
        record.rdata.clone(),
    )
}

//! Response construction (C9, spec §3, §4.6): records, rcodes, and the
//! normalization of a handler's return value into a `Response`.
//!
//! `Rcode` and a record's `rdata` are the wire codec's vocabulary
//! (spec §1 calls rdata "opaque to the core; the codec handles it") —
//! re-exported from `hickory_proto` rather than re-invented, since the
//! core never inspects either, only carries them through the pipeline.

use crate::name::Name;
use crate::qtype::QType;

pub use hickory_proto::op::ResponseCode as Rcode;
pub use hickory_proto::rr::RData;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: Name,
    pub qtype: QType,
    pub ttl: u32,
    pub rdata: RData,
}

impl Record {
    pub fn new(name: Name, ttl: u32, rdata: RData) -> Self {
        let qtype = rdata.record_type();
        Self {
            name,
            qtype,
            ttl,
            rdata,
        }
    }
}

/// `{rcode, answers, authority, additional}` (spec §3). Invariant: a
/// `Response` with `rcode = NoError` and empty `answers` is an explicit
/// empty answer, distinct from `NXDomain`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub rcode: Rcode,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Response {
    pub fn empty() -> Self {
        Self {
            rcode: Rcode::NoError,
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn with_rcode(rcode: Rcode) -> Self {
        Self {
            rcode,
            ..Self::empty()
        }
    }

    pub fn nxdomain() -> Self {
        Self::with_rcode(Rcode::NXDomain)
    }

    pub fn servfail() -> Self {
        Self::with_rcode(Rcode::ServFail)
    }

    pub fn single_answer(record: Record) -> Self {
        Self {
            answers: vec![record],
            ..Self::empty()
        }
    }

    pub fn answers(records: Vec<Record>) -> Self {
        Self {
            answers: records,
            ..Self::empty()
        }
    }
}

/// The normalization rules of spec §4.6, expressed as a closed set of
/// handler return shapes instead of dynamically-typed return values.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Nothing,
    One(Record),
    Many(Vec<Record>),
    Full(Response),
}

impl HandlerOutcome {
    pub fn normalize(self) -> Response {
        match self {
            HandlerOutcome::Nothing => Response::empty(),
            HandlerOutcome::One(record) => Response::single_answer(record),
            HandlerOutcome::Many(records) => Response::answers(records),
            HandlerOutcome::Full(response) => response,
        }
    }
}

impl From<Record> for HandlerOutcome {
    fn from(record: Record) -> Self {
        HandlerOutcome::One(record)
    }
}

impl From<Vec<Record>> for HandlerOutcome {
    fn from(records: Vec<Record>) -> Self {
        HandlerOutcome::Many(records)
    }
}

impl From<Response> for HandlerOutcome {
    fn from(response: Response) -> Self {
        HandlerOutcome::Full(response)
    }
}

impl From<()> for HandlerOutcome {
    fn from(_: ()) -> Self {
        HandlerOutcome::Nothing
    }
}

//! `nserver`: a programmable DNS name-server framework. Application
//! authors register rules (name pattern + type set + handler) against a
//! [`Container`], mount sub-containers for reuse, layer middleware over
//! raw wire records and decoded queries, and hand the whole thing to a
//! [`Server`] to serve over UDP and/or TCP.
//!
//! This crate handles `OPCODE=QUERY` only: it is not a recursive
//! resolver, a zone-file engine, or a general-purpose DNS library. Wire
//! encode/decode and public-suffix resolution are injected collaborators
//! ([`codec::WireCodec`], [`name::SuffixResolver`]) with production-grade
//! defaults ([`codec::HickoryCodec`], [`suffix::PslSuffixResolver`]).

pub mod codec;
pub mod container;
pub mod error;
pub mod exception;
pub mod glob;
pub mod handler;
pub mod hooks;
pub mod middleware;
pub mod name;
pub mod qtype;
pub mod query;
pub mod response;
pub mod rule;
pub mod server;
pub mod settings;
pub mod suffix;
pub mod transport;

pub use container::Container;
pub use error::{ConfigurationError, ErrorClass, HandlerError, RawHandlerError};
pub use handler::{Handler, HandlerRef};
pub use name::Name;
pub use qtype::{QType, TypeSet};
pub use query::Query;
pub use response::{HandlerOutcome, Rcode, Record, Response};
pub use rule::Matcher;
pub use server::Server;
pub use settings::{Settings, Transport};

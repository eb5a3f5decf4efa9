//! Transport layer (C7/C8, spec §7): binds the frozen raw middleware stack
//! to UDP and/or TCP sockets. Kept out of `server.rs` itself so the
//! framing/pooling concerns of each transport don't leak into the
//! orchestrator.

pub mod tcp;
pub mod udp;

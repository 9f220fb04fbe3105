//! Wire-level protocol types.
//!
//! `ClientEvent` covers every outbound command verb; `ServerEvent` is a
//! closed enum over the inbound frame kinds the client reacts to, with an
//! `Unknown` fallback that preserves unrecognized frames verbatim.

pub mod client_events;
pub mod models;
pub mod server_events;

//! Wire types for the interactive execution protocol.
//!
//! This crate contains the serde-serializable messages exchanged with the
//! execution backend over its WebSocket endpoint, plus the codec that turns
//! them into text frames and back.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with the wire: field names match the JSON the backend speaks
//! * Forward-compatible: unknown inbound event types decode, they never fail
//!
//! Session semantics (which command is legal when) live in `coderun`.

pub mod codec;
pub mod command;
pub mod event;
pub mod language;

pub use codec::*;
pub use command::*;
pub use event::*;
pub use language::*;

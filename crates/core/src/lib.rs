//! Client sessions for interactive remote code execution.
//!
//! A [`Session`] holds one persistent connection to an execution backend.
//! Over it the caller starts a run, streams its stdout, feeds it stdin
//! mid-run and stops it:
//!
//! * [`Session`] is the public facade and owns the connection
//! * [`SessionMachine`] enforces the `Idle`/`Running` protocol
//! * [`OutputBuffer`] accumulates streamed output per run
//! * [`SessionConfig`] carries the endpoint, languages and timeouts
//!
//! Wire types live in `coderun-protocol`; connection handling in
//! `coderun-runtime`.

pub mod config;
pub mod error;
pub mod machine;
pub mod output;
pub mod session;

pub use coderun_protocol::{Command, Event, Language};
pub use coderun_runtime::ConnectionState;
pub use config::SessionConfig;
pub use error::{Error, Misuse, Result};
pub use machine::{CommandSink, RunRequest, RunState, SessionMachine};
pub use output::OutputBuffer;
pub use session::{Session, SessionUpdate, SessionUpdates};

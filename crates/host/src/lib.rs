#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Host/worker plumbing for osforge
//!
//! The host talks to each worker over a private `SOCK_SEQPACKET` socket
//! pair. A call is one `Call` frame answered by any number of `Signal`
//! frames followed by exactly one `Reply` or `Error` frame. Descriptors can
//! be attached to any frame.
//!
//! - [`ServiceManager`] starts and tracks workers by service key
//! - [`ServiceClient`] issues calls to one worker
//! - [`Service`] and [`serve`] implement the worker side
//! - [`Isolation`] decides how a worker is hosted: a child process
//!   ([`ProcessIsolation`]) or an in-process task ([`LocalIsolation`])

pub mod channel;
pub mod client;
pub mod fdset;
pub mod isolation;
pub mod manager;
pub mod payload;
pub mod protocol;
pub mod service;

pub use channel::Channel;
pub use client::{CallOutput, ServiceClient};
pub use fdset::FdSet;
pub use isolation::{
    Isolation, LocalIsolation, ProcessIsolation, WorkerHandle, WorkerProcess, WorkerSpec,
};
pub use manager::ServiceManager;
pub use payload::{read_payload, write_payload};
pub use protocol::{Frame, FrameKind, INLINE_LIMIT, MAX_FDS, MAX_PACKET};
pub use service::{serve, Reply, Service, ServiceArgs, SignalSink, IDENTIFY_METHOD};

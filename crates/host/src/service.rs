//! Worker side of the protocol
//!
//! A worker implements [`Service`] and hands it to [`serve`], which answers
//! calls until the host closes the channel.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd, RawFd};

use async_trait::async_trait;
use clap::Parser;
use osforge_errors::{Error, ProtocolError};
use serde_json::{json, Value};

use crate::channel::Channel;
use crate::fdset::FdSet;
use crate::protocol::Frame;

/// Method every worker answers without involving the service
pub const IDENTIFY_METHOD: &str = "identify";

/// Result of a successful dispatch
#[derive(Debug, Default)]
pub struct Reply {
    pub result: Value,
    pub fds: Vec<OwnedFd>,
}

impl Reply {
    #[must_use]
    pub fn new(result: Value) -> Self {
        Self {
            result,
            fds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_fd(mut self, fd: OwnedFd) -> Self {
        self.fds.push(fd);
        self
    }
}

impl From<Value> for Reply {
    fn from(result: Value) -> Self {
        Self::new(result)
    }
}

/// Emits signals back to the caller while a call is in flight
pub struct SignalSink<'a> {
    channel: &'a Channel,
}

impl<'a> SignalSink<'a> {
    #[must_use]
    pub fn new(channel: &'a Channel) -> Self {
        Self { channel }
    }

    /// # Errors
    /// Fails if the host is gone.
    pub async fn emit(&self, payload: Value, fds: &[BorrowedFd<'_>]) -> Result<(), Error> {
        self.channel
            .send(&Frame::Signal { payload }, fds)
            .await
            .map_err(Into::into)
    }

    /// Report an error as a signal without ending the call.
    ///
    /// # Errors
    /// Fails if the host is gone.
    pub async fn emit_error(&self, error: &Error) -> Result<(), Error> {
        self.emit(json!({ "error": error.envelope() }), &[]).await
    }
}

/// A role a worker process can play
#[async_trait]
pub trait Service: Send + Sync {
    /// Handle one call.
    ///
    /// Unrecognized methods should return
    /// [`ProtocolError::UnknownMethod`].
    ///
    /// # Errors
    /// Any error is sent back to the host as an error reply.
    async fn dispatch(
        &self,
        method: &str,
        args: Value,
        fds: FdSet,
        signals: &SignalSink<'_>,
    ) -> Result<Reply, Error>;
}

/// Answer calls on `channel` until the host closes it.
///
/// # Errors
/// Returns transport failures; errors raised by the service are replied,
/// not returned.
pub async fn serve(channel: Channel, key: &str, service: &dyn Service) -> Result<(), Error> {
    loop {
        let Some((frame, fds)) = channel.recv().await? else {
            tracing::debug!(service = key, "host closed channel");
            return Ok(());
        };

        let Frame::Call { method, args } = frame else {
            let actual = frame.kind().as_str();
            return Err(ProtocolError::UnexpectedFrame {
                expected: "call".to_string(),
                actual: actual.to_string(),
            }
            .into());
        };

        let outcome = if method == IDENTIFY_METHOD {
            Ok(Reply::new(Value::String(key.to_string())))
        } else {
            let signals = SignalSink::new(&channel);
            service.dispatch(&method, args, fds, &signals).await
        };

        match outcome {
            Ok(reply) => {
                let borrowed: Vec<BorrowedFd<'_>> = reply.fds.iter().map(AsFd::as_fd).collect();
                channel
                    .send(&Frame::Reply { result: reply.result }, &borrowed)
                    .await?;
            }
            Err(err) => {
                tracing::debug!(service = key, method = %method, error = %err, "call failed");
                channel
                    .send(&Frame::Error { error: err.envelope() }, &[])
                    .await?;
            }
        }
    }
}

/// Command line every worker process is started with
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "osforge-worker", about = "osforge worker process")]
pub struct ServiceArgs {
    /// Service key this process serves, e.g. `stage/org.osforge.noop`
    #[arg(long = "service-id")]
    pub service_id: String,

    /// Inherited descriptor of the host channel
    #[arg(long)]
    pub fd: RawFd,
}

impl ServiceArgs {
    #[must_use]
    pub fn new(service_id: impl Into<String>, fd: RawFd) -> Self {
        Self {
            service_id: service_id.into(),
            fd,
        }
    }

    /// Parse from a full argument list including the program name.
    ///
    /// # Errors
    /// Fails if the arguments are missing or malformed.
    pub fn from_args<I, T>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| {
            ProtocolError::Malformed {
                message: format!("worker arguments: {e}"),
            }
            .into()
        })
    }

    /// Arguments to append after the worker executable
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--service-id".to_string(),
            self.service_id.clone(),
            "--fd".to_string(),
            self.fd.to_string(),
        ]
    }

    /// Adopt the inherited host channel.
    ///
    /// # Errors
    /// Fails if the descriptor is not usable.
    pub fn into_channel(self) -> Result<Channel, Error> {
        Channel::from_inherited_fd(self.fd, &self.service_id).map_err(Into::into)
    }
}

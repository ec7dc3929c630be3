//! Host side of a single worker connection

use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use osforge_errors::{Error, ProtocolError};
use osforge_events::{EventEmitter, EventSender, HostEvent};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::channel::Channel;
use crate::fdset::FdSet;
use crate::isolation::{WorkerHandle, WorkerProcess};
use crate::protocol::Frame;

struct ClientState {
    channel: Channel,
    worker: Box<dyn WorkerProcess>,
}

/// Connection to one running worker.
///
/// Calls are serialized: a second call waits until the first has seen its
/// terminal frame.
pub struct ServiceClient {
    key: String,
    pid: Option<u32>,
    state: Mutex<ClientState>,
    alive: AtomicBool,
    events: Option<EventSender>,
}

impl EventEmitter for ServiceClient {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("key", &self.key)
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Result handed back by a call: reply value and attached descriptors
pub type CallOutput = (Value, FdSet);

impl ServiceClient {
    #[must_use]
    pub fn new(key: impl Into<String>, handle: WorkerHandle, events: Option<EventSender>) -> Self {
        let WorkerHandle { channel, process } = handle;
        Self {
            key: key.into(),
            pid: process.id(),
            state: Mutex::new(ClientState {
                channel,
                worker: process,
            }),
            alive: AtomicBool::new(true),
            events,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the worker is still usable for calls
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Call `method` and return its reply value.
    ///
    /// # Errors
    /// See [`ServiceClient::call_with_fds`].
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, Error> {
        let (result, _fds) = self
            .call_with_fds(method, args, &[], None, |_, _| Ok(()))
            .await?;
        Ok(result)
    }

    /// Call `method`, passing `fds` and delivering every signal to
    /// `on_signal` in the order the worker emitted them.
    ///
    /// # Errors
    /// - `ProtocolError::UnknownMethod` if the worker does not implement it
    /// - `ProtocolError::Timeout` if `timeout` expires; the worker is killed
    /// - `ProtocolError::ChannelClosed` if the worker went away
    /// - `Error::Remote` for any error the worker replied with
    /// - the first error returned by `on_signal`, after the call completed
    pub async fn call_with_fds<F>(
        &self,
        method: &str,
        args: Value,
        fds: &[BorrowedFd<'_>],
        timeout: Option<Duration>,
        on_signal: F,
    ) -> Result<CallOutput, Error>
    where
        F: FnMut(Value, FdSet) -> Result<(), Error> + Send,
    {
        if !self.is_alive() {
            return Err(ProtocolError::NotRunning {
                service: self.key.clone(),
            }
            .into());
        }

        let mut state = self.state.lock().await;
        let ClientState { channel, worker } = &mut *state;

        let exchange = self.exchange(channel, method, args, fds, on_signal);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    self.mark_dead();
                    worker.kill().await;
                    self.emit_host(HostEvent::WorkerKilled {
                        service: self.key.clone(),
                        reason: format!("{method} timed out"),
                    });
                    return Err(ProtocolError::Timeout {
                        service: self.key.clone(),
                        limit,
                    }
                    .into());
                }
            },
            None => exchange.await,
        };

        if let Err(Error::Protocol(ProtocolError::ChannelClosed { .. } | ProtocolError::Transport { .. })) =
            &outcome
        {
            self.mark_dead();
        }
        outcome
    }

    async fn exchange<F>(
        &self,
        channel: &Channel,
        method: &str,
        args: Value,
        fds: &[BorrowedFd<'_>],
        mut on_signal: F,
    ) -> Result<CallOutput, Error>
    where
        F: FnMut(Value, FdSet) -> Result<(), Error> + Send,
    {
        channel
            .send(
                &Frame::Call {
                    method: method.to_string(),
                    args,
                },
                fds,
            )
            .await?;

        let mut handler_error = None;
        loop {
            let Some((frame, received)) = channel.recv().await? else {
                return Err(ProtocolError::ChannelClosed {
                    service: self.key.clone(),
                }
                .into());
            };

            match frame {
                Frame::Signal { payload } => {
                    self.emit_host(HostEvent::SignalReceived {
                        service: self.key.clone(),
                        method: method.to_string(),
                    });
                    // Keep draining after a handler failure so the channel
                    // is ready for the next call.
                    if handler_error.is_none() {
                        if let Err(e) = on_signal(payload, received) {
                            handler_error = Some(e);
                        }
                    }
                }
                Frame::Reply { result } => {
                    return match handler_error {
                        Some(e) => Err(e),
                        None => Ok((result, received)),
                    };
                }
                Frame::Error { error } => {
                    if let Some(e) = handler_error {
                        return Err(e);
                    }
                    if error.code == ProtocolError::UNKNOWN_METHOD_CODE {
                        return Err(ProtocolError::UnknownMethod {
                            method: method.to_string(),
                        }
                        .into());
                    }
                    return Err(Error::Remote(error));
                }
                Frame::Call { .. } => {
                    return Err(ProtocolError::UnexpectedFrame {
                        expected: "reply".to_string(),
                        actual: "call".to_string(),
                    }
                    .into());
                }
            }
        }
    }

    /// Close the channel and give the worker `grace` to exit before it is
    /// killed.
    pub async fn stop(&self, grace: Duration) {
        self.mark_dead();
        let mut state = self.state.lock().await;
        let ClientState { channel, worker } = &mut *state;
        channel.shutdown();

        if worker.wait_timeout(grace).await {
            self.emit_host(HostEvent::WorkerStopped {
                service: self.key.clone(),
            });
        } else {
            worker.kill().await;
            self.emit_host(HostEvent::WorkerKilled {
                service: self.key.clone(),
                reason: "shutdown grace expired".to_string(),
            });
        }
    }

    /// Kill without waiting; usable from `Drop`.
    pub(crate) fn force_kill(&self) {
        self.mark_dead();
        if let Ok(mut state) = self.state.try_lock() {
            state.worker.start_kill();
        }
    }
}

//! Ways of starting a worker for a service key

use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use osforge_errors::{Error, ProtocolError};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::service::{serve, Service, ServiceArgs};

/// What to start
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// Service key, e.g. `source/org.osforge.curl`
    pub key: String,
    /// Executable implementing the service
    pub executable: PathBuf,
}

impl WorkerSpec {
    #[must_use]
    pub fn new(key: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            executable: executable.into(),
        }
    }
}

/// A running worker, however it is hosted
#[async_trait]
pub trait WorkerProcess: Send + Sync {
    /// OS process id, when there is one
    fn id(&self) -> Option<u32>;

    /// Request termination without waiting.
    fn start_kill(&mut self);

    /// Terminate and reap.
    async fn kill(&mut self);

    /// Wait up to `grace` for the worker to exit on its own.
    async fn wait_timeout(&mut self, grace: Duration) -> bool;
}

/// A freshly started worker and the host end of its channel
pub struct WorkerHandle {
    pub channel: Channel,
    pub process: Box<dyn WorkerProcess>,
}

/// Strategy for starting workers
#[async_trait]
pub trait Isolation: Send + Sync {
    /// # Errors
    /// Returns `ProtocolError::SpawnFailed` if the worker cannot be started.
    async fn spawn(&self, spec: &WorkerSpec) -> Result<WorkerHandle, Error>;
}

/// Runs each worker as a child process, optionally under a wrapper command
/// such as a sandbox launcher.
#[derive(Debug, Clone, Default)]
pub struct ProcessIsolation {
    wrapper: Vec<String>,
}

impl ProcessIsolation {
    #[must_use]
    pub fn new(wrapper: Vec<String>) -> Self {
        Self { wrapper }
    }

    /// Full command line for `spec` when the child channel is `fd`
    #[must_use]
    pub fn command_line(&self, spec: &WorkerSpec, fd: i32) -> Vec<String> {
        let mut argv = self.wrapper.clone();
        argv.push(spec.executable.display().to_string());
        argv.extend(ServiceArgs::new(spec.key.clone(), fd).to_args());
        argv
    }
}

fn spawn_failed(spec: &WorkerSpec, message: impl std::fmt::Display) -> Error {
    ProtocolError::SpawnFailed {
        service: spec.key.clone(),
        message: message.to_string(),
    }
    .into()
}

#[async_trait]
impl Isolation for ProcessIsolation {
    async fn spawn(&self, spec: &WorkerSpec) -> Result<WorkerHandle, Error> {
        let (host, worker) = Channel::pair(&spec.key)?;
        let worker_fd = worker.into_owned_fd();
        let raw = worker_fd.as_raw_fd();

        let argv = self.command_line(spec, raw);
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| spawn_failed(spec, "empty command line"))?;

        // Worker stdout is not part of the protocol; fold it into our stderr.
        let stdout = std::io::stderr()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| spawn_failed(spec, e))?;

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .kill_on_drop(true);

        // SAFETY: the closure runs between fork and exec and only calls
        // fcntl, which is async-signal-safe.
        #[allow(unsafe_code)]
        unsafe {
            command.pre_exec(move || {
                fcntl(raw, FcntlArg::F_SETFD(FdFlag::empty()))
                    .map(drop)
                    .map_err(std::io::Error::from)
            });
        }

        let child = command.spawn().map_err(|e| spawn_failed(spec, e))?;
        drop(worker_fd);

        tracing::debug!(service = %spec.key, pid = ?child.id(), "spawned worker process");
        Ok(WorkerHandle {
            channel: host,
            process: Box::new(ChildProcess { child }),
        })
    }
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn start_kill(&mut self) {
        let _ = self.child.start_kill();
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }

    async fn wait_timeout(&mut self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.child.wait()).await.is_ok()
    }
}

/// Serves workers as tasks inside the current process.
///
/// Services are registered by exact key or by a `/`-terminated prefix; the
/// longest matching prefix wins.
#[derive(Default, Clone)]
pub struct LocalIsolation {
    services: HashMap<String, Arc<dyn Service>>,
}

impl LocalIsolation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_service(mut self, key: impl Into<String>, service: Arc<dyn Service>) -> Self {
        self.register(key, service);
        self
    }

    pub fn register(&mut self, key: impl Into<String>, service: Arc<dyn Service>) {
        self.services.insert(key.into(), service);
    }

    fn lookup(&self, key: &str) -> Option<Arc<dyn Service>> {
        if let Some(service) = self.services.get(key) {
            return Some(Arc::clone(service));
        }
        self.services
            .iter()
            .filter(|(prefix, _)| prefix.ends_with('/') && key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, service)| Arc::clone(service))
    }
}

#[async_trait]
impl Isolation for LocalIsolation {
    async fn spawn(&self, spec: &WorkerSpec) -> Result<WorkerHandle, Error> {
        let service = self
            .lookup(&spec.key)
            .ok_or_else(|| spawn_failed(spec, "no service registered for this key"))?;

        let (host, worker) = Channel::pair(&spec.key)?;
        let key = spec.key.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = serve(worker, &key, service.as_ref()).await {
                tracing::debug!(service = %key, error = %e, "local worker stopped with error");
            }
        });

        Ok(WorkerHandle {
            channel: host,
            process: Box::new(TaskProcess {
                task,
                finished: false,
            }),
        })
    }
}

struct TaskProcess {
    task: JoinHandle<()>,
    finished: bool,
}

#[async_trait]
impl WorkerProcess for TaskProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn start_kill(&mut self) {
        self.task.abort();
    }

    async fn kill(&mut self) {
        self.task.abort();
        if !self.finished {
            let _ = (&mut self.task).await;
            self.finished = true;
        }
    }

    async fn wait_timeout(&mut self, grace: Duration) -> bool {
        if !self.finished {
            self.finished = tokio::time::timeout(grace, &mut self.task).await.is_ok();
        }
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_with_wrapper() {
        let isolation = ProcessIsolation::new(vec!["bwrap".into(), "--unshare-net".into()]);
        let spec = WorkerSpec::new("stage/org.osforge.noop", "/usr/lib/osforge/stages/noop");
        assert_eq!(
            isolation.command_line(&spec, 7),
            [
                "bwrap",
                "--unshare-net",
                "/usr/lib/osforge/stages/noop",
                "--service-id",
                "stage/org.osforge.noop",
                "--fd",
                "7"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_executable_fails_to_spawn() {
        let spec = WorkerSpec::new("stage/x", "/nonexistent/osforge-worker");
        let err = ProcessIsolation::default().spawn(&spec).await.err().unwrap();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::SpawnFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregistered_local_key() {
        let spec = WorkerSpec::new("stage/x", "unused");
        assert!(LocalIsolation::new().spawn(&spec).await.is_err());
    }
}

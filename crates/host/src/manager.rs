//! Registry of running workers keyed by service key

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use osforge_errors::{Error, ProtocolError};
use osforge_events::{EventEmitter, EventSender, HostEvent};
use tokio::sync::Mutex;

use crate::client::ServiceClient;
use crate::isolation::{Isolation, WorkerSpec};

const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Starts, reuses and stops workers.
///
/// At most one worker runs per service key. Dropping the manager kills every
/// worker it still owns.
pub struct ServiceManager {
    isolation: Arc<dyn Isolation>,
    services: Mutex<HashMap<String, Arc<ServiceClient>>>,
    grace: Duration,
    events: Option<EventSender>,
}

impl EventEmitter for ServiceManager {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl ServiceManager {
    #[must_use]
    pub fn new(isolation: Arc<dyn Isolation>) -> Self {
        Self {
            isolation,
            services: Mutex::new(HashMap::new()),
            grace: DEFAULT_GRACE,
            events: None,
        }
    }

    /// Time a worker gets to exit after its channel closes
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Start a worker for `key` running `executable`.
    ///
    /// # Errors
    /// `ProtocolError::AlreadyRunning` if a live worker already serves
    /// `key`; `ProtocolError::SpawnFailed` if it cannot be started.
    pub async fn start(
        &self,
        key: &str,
        executable: impl Into<PathBuf>,
    ) -> Result<Arc<ServiceClient>, Error> {
        let mut services = self.services.lock().await;
        if services.get(key).is_some_and(|client| client.is_alive()) {
            return Err(ProtocolError::AlreadyRunning {
                service: key.to_string(),
            }
            .into());
        }
        self.spawn_locked(&mut services, key, executable.into()).await
    }

    /// Return the live worker for `key`, starting one if needed.
    ///
    /// # Errors
    /// `ProtocolError::SpawnFailed` if a new worker cannot be started.
    pub async fn get_or_start(
        &self,
        key: &str,
        executable: impl Into<PathBuf>,
    ) -> Result<Arc<ServiceClient>, Error> {
        let mut services = self.services.lock().await;
        if let Some(client) = services.get(key).filter(|client| client.is_alive()) {
            return Ok(Arc::clone(client));
        }
        self.spawn_locked(&mut services, key, executable.into()).await
    }

    async fn spawn_locked(
        &self,
        services: &mut HashMap<String, Arc<ServiceClient>>,
        key: &str,
        executable: PathBuf,
    ) -> Result<Arc<ServiceClient>, Error> {
        if let Some(stale) = services.remove(key) {
            stale.stop(Duration::ZERO).await;
        }

        let handle = self
            .isolation
            .spawn(&WorkerSpec::new(key, executable))
            .await?;
        let client = Arc::new(ServiceClient::new(key, handle, self.events.clone()));
        self.emit_host(HostEvent::WorkerStarted {
            service: key.to_string(),
            pid: client.pid(),
        });
        services.insert(key.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Look up a live worker.
    pub async fn get(&self, key: &str) -> Option<Arc<ServiceClient>> {
        self.services
            .lock()
            .await
            .get(key)
            .filter(|client| client.is_alive())
            .cloned()
    }

    /// Stop the worker for `key`.
    ///
    /// # Errors
    /// `ProtocolError::NotRunning` if no worker is registered for `key`.
    pub async fn stop(&self, key: &str) -> Result<(), Error> {
        let client = self.services.lock().await.remove(key).ok_or_else(|| {
            ProtocolError::NotRunning {
                service: key.to_string(),
            }
        })?;
        client.stop(self.grace).await;
        Ok(())
    }

    /// Stop every worker.
    pub async fn shutdown(&self) {
        let clients: Vec<_> = self.services.lock().await.drain().map(|(_, c)| c).collect();
        futures::future::join_all(clients.iter().map(|client| client.stop(self.grace))).await;
    }

    /// Keys of the workers currently registered
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.services.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Drop for ServiceManager {
    fn drop(&mut self) {
        for client in self.services.get_mut().values() {
            client.force_kill();
        }
    }
}

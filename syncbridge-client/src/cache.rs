//! Cache of transports keyed by connection settings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use syncbridge_core::BridgeError;

use crate::options::TransportOptionKey;
use crate::transport::Transport;

/// Builds a transport for a key the cache has not seen yet.
pub type TransportFactory =
    Arc<dyn Fn(&TransportOptionKey) -> Result<Arc<dyn Transport>, BridgeError> + Send + Sync>;

/// Default transport plus one lazily built transport per distinct key.
///
/// Entries live as long as the cache.
pub struct ClientCache {
    default: Arc<dyn Transport>,
    factory: TransportFactory,
    clients: Mutex<HashMap<TransportOptionKey, Arc<dyn Transport>>>,
}

impl ClientCache {
    pub fn new(default: Arc<dyn Transport>, factory: TransportFactory) -> Self {
        Self {
            default,
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Transport for `key`; `None` selects the default transport.
    ///
    /// Construction runs outside the lock. When two callers race on a new
    /// key, the first insert wins and both get that transport.
    pub fn resolve(
        &self,
        key: Option<&TransportOptionKey>,
    ) -> Result<Arc<dyn Transport>, BridgeError> {
        let Some(key) = key else {
            return Ok(self.default.clone());
        };

        if let Some(client) = self.lock().get(key) {
            #[cfg(feature = "tracing")]
            tracing::debug!(?key, "transport cache hit");
            return Ok(client.clone());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(?key, "transport cache miss");
        let client = (self.factory)(key)?;
        Ok(self.lock().entry(key.clone()).or_insert(client).clone())
    }

    /// Number of cached (non-default) transports.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TransportOptionKey, Arc<dyn Transport>>> {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}

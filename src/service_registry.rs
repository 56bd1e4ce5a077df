use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Readiness of the long-lived parts of the process, reported by `/healthz`.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<Mutex<BTreeMap<String, Arc<AtomicBool>>>>,
}

impl ServiceRegistry {
    pub fn register(&self, name: &str) -> ServiceSignal {
        let ready = Arc::new(AtomicBool::new(false));
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&ready));
        debug!(%name, "Service registered");

        ServiceSignal {
            name: name.to_string(),
            ready,
        }
    }

    pub fn get_not_ready_services(&self) -> Vec<String> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, ready)| !ready.load(Ordering::SeqCst))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

pub struct ServiceSignal {
    name: String,
    ready: Arc<AtomicBool>,
}

impl ServiceSignal {
    pub fn ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        debug!(name = %self.name, "Service ready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_be_ready_after_all_registered_service_ready() {
        let registry = ServiceRegistry::default();
        let watcher = registry.register("crd-watcher");
        let server = registry.register("server");

        assert_eq!(registry.get_not_ready_services(), vec!["crd-watcher", "server"]);
        watcher.ready();
        assert_eq!(registry.get_not_ready_services(), vec!["server"]);
        server.ready();
        assert!(registry.get_not_ready_services().is_empty());
    }
}

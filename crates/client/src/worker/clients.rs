//! Open client contexts and the version controlling each of them.

use shellcache_core::CacheVersion;
use std::collections::HashMap;

/// Registry of client contexts. A client without a controller is not
/// routed through the proxy until it is claimed.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: u64,
    clients: HashMap<u64, Option<CacheVersion>>,
}

impl ClientRegistry {
    /// Register a client, controlled by `controller` if given.
    pub fn open(&mut self, controller: Option<CacheVersion>) -> u64 {
        self.next_id += 1;
        self.clients.insert(self.next_id, controller);
        self.next_id
    }

    pub fn close(&mut self, id: u64) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Version controlling `id`. `None` for unknown or uncontrolled clients.
    pub fn controller(&self, id: u64) -> Option<&CacheVersion> {
        self.clients.get(&id).and_then(Option::as_ref)
    }

    pub fn is_controlled(&self, id: u64) -> bool {
        self.controller(id).is_some()
    }

    /// Put every open client under `version`. Returns how many changed hands.
    pub fn claim(&mut self, version: &CacheVersion) -> usize {
        let mut claimed = 0;
        for controller in self.clients.values_mut() {
            if controller.as_ref() != Some(version) {
                *controller = Some(version.clone());
                claimed += 1;
            }
        }
        claimed
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

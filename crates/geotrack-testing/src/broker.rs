use anyhow::{bail, Result};
use async_trait::async_trait;
use geotrack_core::{AlertBroker, GeofenceAlert};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Broker that records every publish. Can be switched to fail.
#[derive(Default)]
pub struct RecordingBroker {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Published payloads decoded as alerts; anything else is skipped.
    pub fn alerts(&self) -> Vec<GeofenceAlert> {
        self.published()
            .iter()
            .filter_map(|(_, body)| serde_json::from_slice(body).ok())
            .collect()
    }
}

#[async_trait]
impl AlertBroker for RecordingBroker {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("channel closed");
        }

        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

//! Shared in-memory state.
//! Three maps keyed by device/session id, all whole-value overwrites, so
//! last-writer-wins under concurrent requests is acceptable. No durable
//! storage; everything resets on restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::vision::VisionBackend;

/// A device unseen for longer than this is reported offline.
pub const STALENESS_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Status is derived lazily on read; nothing flips it in the store.
    pub fn status_at(&self, now: DateTime<Utc>) -> &'static str {
        if now - self.last_seen > Duration::seconds(STALENESS_SECS) {
            "offline"
        } else {
            "online"
        }
    }
}

pub struct AppState {
    pub devices: RwLock<HashMap<String, DeviceRecord>>,
    pub images: RwLock<HashMap<String, Vec<u8>>>,
    pub sessions: RwLock<HashMap<String, Value>>,
    pub vision: Arc<dyn VisionBackend>,
}

impl AppState {
    pub fn new(vision: Arc<dyn VisionBackend>) -> Arc<Self> {
        Arc::new(Self {
            devices: RwLock::new(HashMap::new()),
            images: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            vision,
        })
    }

    /// Records a frame from `device_id`: stamps last-seen and overwrites
    /// the cached image.
    pub async fn record_frame(&self, device_id: &str, bytes: Vec<u8>) {
        self.devices.write().await.insert(
            device_id.to_string(),
            DeviceRecord {
                last_seen: Utc::now(),
            },
        );
        self.images.write().await.insert(device_id.to_string(), bytes);
    }

    pub async fn latest_image(&self, device_id: &str) -> Option<Vec<u8>> {
        self.images.read().await.get(device_id).cloned()
    }

    pub async fn store_session(&self, session_id: &str, state: Value) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::VisionError;
    use async_trait::async_trait;

    struct NoVision;

    #[async_trait]
    impl VisionBackend for NoVision {
        async fn generate(&self, _: &str, _: &[Vec<u8>]) -> Result<String, VisionError> {
            Err(VisionError::EmptyResponse)
        }
    }

    #[test]
    fn test_fresh_device_is_online() {
        let record = DeviceRecord {
            last_seen: Utc::now(),
        };
        assert_eq!(record.status_at(Utc::now()), "online");
    }

    #[test]
    fn test_stale_device_is_offline() {
        let now = Utc::now();
        let record = DeviceRecord {
            last_seen: now - Duration::seconds(STALENESS_SECS + 1),
        };
        assert_eq!(record.status_at(now), "offline");
    }

    #[test]
    fn test_device_at_threshold_is_still_online() {
        let now = Utc::now();
        let record = DeviceRecord {
            last_seen: now - Duration::seconds(STALENESS_SECS),
        };
        assert_eq!(record.status_at(now), "online");
    }

    #[tokio::test]
    async fn test_record_frame_overwrites_image() {
        let state = AppState::new(Arc::new(NoVision));
        state.record_frame("cam-1", vec![1, 2, 3]).await;
        state.record_frame("cam-1", vec![4, 5]).await;
        assert_eq!(state.latest_image("cam-1").await.unwrap(), vec![4, 5]);
        assert!(state.latest_image("cam-2").await.is_none());
    }

    #[tokio::test]
    async fn test_store_session_overwrites() {
        let state = AppState::new(Arc::new(NoVision));
        state
            .store_session("s1", serde_json::json!({"piece_position": "A1"}))
            .await;
        state
            .store_session("s1", serde_json::json!({"piece_position": "B2"}))
            .await;
        let sessions = state.sessions.read().await;
        assert_eq!(sessions["s1"]["piece_position"], "B2");
    }
}

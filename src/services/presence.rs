use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::websocket::events::ServerEvent;
use crate::websocket::ConnectionRegistry;

/// Announces presence edges. Callers only invoke this on an actual
/// 0-to-1 or 1-to-0 transition; extra connections stay silent.
#[derive(Clone)]
pub struct PresenceService {
    registry: ConnectionRegistry,
}

impl PresenceService {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub async fn broadcast_online(&self, user_id: Uuid) {
        debug!(%user_id, "user came online");
        self.registry
            .broadcast_others(
                user_id,
                &ServerEvent::UserOnline {
                    user_id,
                    timestamp: Utc::now(),
                },
            )
            .await;
    }

    pub async fn broadcast_offline(&self, user_id: Uuid) {
        debug!(%user_id, "user went offline");
        self.registry
            .broadcast_others(
                user_id,
                &ServerEvent::UserOffline {
                    user_id,
                    last_seen_at: Utc::now(),
                },
            )
            .await;
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::websocket::events::ServerEvent;
use crate::websocket::message_types::SessionDescription;
use crate::websocket::ConnectionRegistry;

struct PendingCall {
    id: u64,
    caller: Uuid,
    callee: Uuid,
    timer: JoinHandle<()>,
}

type PendingTable = Arc<Mutex<HashMap<(Uuid, Uuid), PendingCall>>>;

/// Coordinates one-to-one call signaling. The pending table is keyed by
/// the ordered (caller, callee) pair, so crossed calls between the same
/// two users ring independently. It is the single source of truth for
/// ringing calls; whoever removes an entry under the lock wins, so a
/// late timer and an accept cannot both fire.
pub struct CallService {
    registry: ConnectionRegistry,
    pending: PendingTable,
    ring_timeout: Duration,
    next_id: AtomicU64,
}

impl CallService {
    pub fn new(registry: ConnectionRegistry, ring_timeout: Duration) -> Self {
        Self {
            registry,
            pending: Arc::new(Mutex::new(HashMap::new())),
            ring_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Ring the callee. If they have no live connection the caller is
    /// told immediately and no timer starts.
    pub async fn initiate(&self, caller: Uuid, callee: Uuid, call_type: String) -> AppResult<()> {
        if !self.registry.is_present(callee).await {
            self.registry
                .send_to_user(
                    caller,
                    &ServerEvent::CallUnavailable {
                        target_user_id: callee,
                    },
                )
                .await;
            return Ok(());
        }

        let key = (caller, callee);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Anchor the deadline now; the spawned task may not be polled
        // until well after initiate returns.
        let deadline = tokio::time::Instant::now() + self.ring_timeout;

        let timer = {
            let pending = Arc::clone(&self.pending);
            let registry = self.registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                // The id check guards against a newer call for the same
                // pair that replaced this entry while we slept.
                let fired = {
                    let mut table = pending.lock().await;
                    match table.get(&key) {
                        Some(entry) if entry.id == id => table.remove(&key),
                        _ => None,
                    }
                };
                if let Some(call) = fired {
                    debug!(caller = %call.caller, callee = %call.callee, "call ring timeout");
                    registry
                        .send_to_user(
                            call.caller,
                            &ServerEvent::CallTimeout {
                                peer_user_id: call.callee,
                            },
                        )
                        .await;
                    registry
                        .send_to_user(
                            call.callee,
                            &ServerEvent::CallTimeout {
                                peer_user_id: call.caller,
                            },
                        )
                        .await;
                }
            })
        };

        // The entry must be visible before the callee hears the ring,
        // or an immediate accept finds nothing to clear.
        {
            let mut table = self.pending.lock().await;
            if let Some(old) = table.insert(
                key,
                PendingCall {
                    id,
                    caller,
                    callee,
                    timer,
                },
            ) {
                old.timer.abort();
            }
        }

        self.registry
            .send_to_user(
                callee,
                &ServerEvent::CallInitiate {
                    from_user_id: caller,
                    call_type,
                },
            )
            .await;
        Ok(())
    }

    pub async fn accept(&self, from_user: Uuid, target_user: Uuid) -> AppResult<()> {
        self.clear_pending(target_user, from_user).await;
        self.registry
            .send_to_user(
                target_user,
                &ServerEvent::CallAccept {
                    from_user_id: from_user,
                },
            )
            .await;
        Ok(())
    }

    pub async fn reject(&self, from_user: Uuid, target_user: Uuid) -> AppResult<()> {
        self.clear_pending(target_user, from_user).await;
        self.registry
            .send_to_user(
                target_user,
                &ServerEvent::CallReject {
                    from_user_id: from_user,
                },
            )
            .await;
        Ok(())
    }

    /// Hang up. Ending clears the pair in both orientations; a crossed
    /// call that is still wanted must be re-initiated.
    pub async fn end(&self, from_user: Uuid, target_user: Uuid) -> AppResult<()> {
        self.clear_pending(from_user, target_user).await;
        self.clear_pending(target_user, from_user).await;
        self.registry
            .send_to_user(
                target_user,
                &ServerEvent::CallEnd {
                    from_user_id: from_user,
                },
            )
            .await;
        Ok(())
    }

    pub async fn relay_offer(
        &self,
        from_user: Uuid,
        target_user: Uuid,
        offer: SessionDescription,
    ) -> AppResult<()> {
        validate_description(&offer)?;
        self.registry
            .send_to_user(
                target_user,
                &ServerEvent::CallOffer {
                    from_user_id: from_user,
                    offer: serde_json::to_value(offer)
                        .map_err(|e| AppError::Validation(e.to_string()))?,
                },
            )
            .await;
        Ok(())
    }

    pub async fn relay_answer(
        &self,
        from_user: Uuid,
        target_user: Uuid,
        answer: SessionDescription,
    ) -> AppResult<()> {
        validate_description(&answer)?;
        self.registry
            .send_to_user(
                target_user,
                &ServerEvent::CallAnswer {
                    from_user_id: from_user,
                    answer: serde_json::to_value(answer)
                        .map_err(|e| AppError::Validation(e.to_string()))?,
                },
            )
            .await;
        Ok(())
    }

    pub async fn relay_ice_candidate(
        &self,
        from_user: Uuid,
        target_user: Uuid,
        candidate: serde_json::Value,
    ) -> AppResult<()> {
        self.registry
            .send_to_user(
                target_user,
                &ServerEvent::CallIceCandidate {
                    from_user_id: from_user,
                    candidate,
                },
            )
            .await;
        Ok(())
    }

    /// Cancels every ringing call the user is part of. Called when the
    /// user's last connection drops.
    pub async fn cleanup_user(&self, user_id: Uuid) {
        let mut table = self.pending.lock().await;
        let keys: Vec<_> = table
            .keys()
            .filter(|(a, b)| *a == user_id || *b == user_id)
            .copied()
            .collect();
        for key in keys {
            if let Some(call) = table.remove(&key) {
                call.timer.abort();
                debug!(caller = %call.caller, callee = %call.callee, "pending call cleared on disconnect");
            }
        }
    }

    /// True while caller's call to callee is still ringing. Test
    /// observation point.
    pub async fn has_pending(&self, caller: Uuid, callee: Uuid) -> bool {
        self.pending.lock().await.contains_key(&(caller, callee))
    }

    async fn clear_pending(&self, caller: Uuid, callee: Uuid) {
        let mut table = self.pending.lock().await;
        if let Some(call) = table.remove(&(caller, callee)) {
            call.timer.abort();
        }
    }
}

fn validate_description(desc: &SessionDescription) -> AppResult<()> {
    if desc.sdp_type.trim().is_empty() {
        return Err(AppError::Validation("session description type is empty".into()));
    }
    Ok(())
}

//! Redis pub/sub invalidation bus.
//!
//! Events are published as JSON on a single channel and bridged into an
//! in-process [`broadcast`] channel, so local subscribers use the same
//! receiver type regardless of transport. The subscription task reconnects
//! with a fixed backoff when the pub/sub connection drops; events missed
//! while disconnected are gone, which is acceptable because cache TTLs
//! bound the resulting staleness.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use warden_registry::{InvalidationBus, RegistryResult, TicketEvent};

use crate::store::{KEY_PREFIX, store_err};

/// Capacity of the in-process bridge channel.
const BRIDGE_CAPACITY: usize = 1024;

/// Delay before reconnecting a dropped pub/sub connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

fn default_channel() -> String {
    format!("{KEY_PREFIX}:events")
}

/// Stops the subscription task when the last bus clone drops.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Cluster invalidation bus over a Redis pub/sub channel.
///
/// Cheaply cloneable; clones share the connection and the bridge channel.
#[derive(Clone)]
pub struct RedisBus {
    conn: MultiplexedConnection,
    channel: String,
    sender: broadcast::Sender<TicketEvent>,
    _shutdown_guard: std::sync::Arc<ShutdownGuard>,
}

impl RedisBus {
    /// Connects the bus on the default `warden:events` channel.
    ///
    /// # Errors
    ///
    /// [`RegistryError`](warden_registry::RegistryError) `StoreUnavailable`
    /// when the connection cannot be established.
    pub async fn connect(client: &Client) -> RegistryResult<Self> {
        Self::connect_on(client, default_channel()).await
    }

    /// Connects the bus on a custom channel. All nodes of one cluster must
    /// agree on the channel name.
    pub async fn connect_on(client: &Client, channel: impl Into<String>) -> RegistryResult<Self> {
        let channel = channel.into();
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_err("redis connection failed", e))?;
        let (sender, _) = broadcast::channel(BRIDGE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        tokio::spawn(subscription_loop(
            client.clone(),
            channel.clone(),
            sender.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            conn,
            channel,
            sender,
            _shutdown_guard: std::sync::Arc::new(ShutdownGuard { shutdown_tx }),
        })
    }
}

/// Receives channel messages and forwards them to the bridge, reconnecting
/// on failure until shut down.
async fn subscription_loop(
    client: Client,
    channel: String,
    sender: broadcast::Sender<TicketEvent>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        let pubsub = match client.get_async_pubsub().await {
            Ok(mut pubsub) => match pubsub.subscribe(&channel).await {
                Ok(()) => Some(pubsub),
                Err(e) => {
                    warn!(channel, error = %e, "invalidation subscribe failed");
                    None
                },
            },
            Err(e) => {
                warn!(channel, error = %e, "invalidation pubsub connection failed");
                None
            },
        };

        if let Some(pubsub) = pubsub {
            debug!(channel, "invalidation subscription established");
            let mut messages = pubsub.into_on_message();
            loop {
                tokio::select! {
                    message = messages.next() => {
                        let Some(message) = message else {
                            warn!(channel, "invalidation subscription lost");
                            break;
                        };
                        forward(&message, &sender);
                    }
                    _ = shutdown_rx.changed() => return,
                }
            }
        }

        tokio::select! {
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown_rx.changed() => return,
        }
    }
}

fn forward(message: &redis::Msg, sender: &broadcast::Sender<TicketEvent>) {
    let payload: String = match message.get_payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "non-text invalidation message dropped");
            return;
        },
    };
    match serde_json::from_str::<TicketEvent>(&payload) {
        Ok(event) => {
            // A send error only means no local subscribers right now.
            let _ = sender.send(event);
        },
        Err(e) => warn!(error = %e, "malformed invalidation event dropped"),
    }
}

#[async_trait]
impl InvalidationBus for RedisBus {
    async fn publish(&self, event: TicketEvent) -> RegistryResult<()> {
        let json = serde_json::to_string(&event).map_err(|e| {
            warden_registry::RegistryError::internal(format!("event serialization failed: {e}"))
        })?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(&self.channel, json)
            .await
            .map_err(|e| store_err("redis publish failed", e))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.sender.subscribe()
    }
}

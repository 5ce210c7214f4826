//! Redis-backed ticket store.
//!
//! # Key layout
//!
//! | Key | Type | Contents |
//! |-----|------|----------|
//! | `warden:ticket:{kind}:{id}` | string | JSON-encoded record, TTL from `expire_at` |
//! | `warden:kind:{kind}` | set | ids in the kind's partition |
//! | `warden:principal:{principal_id}` | set | ids owned by the principal |
//! | `warden:children:{parent_id}` | set | ids parented to the ticket |
//!
//! Record writes and their index updates go through one `MULTI` pipeline,
//! so a reader never sees an index entry without its record. Index sets
//! cannot expire per-member, so members whose record TTL has fired linger
//! until a lookup notices and prunes them.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, warn};
use warden_registry::{
    HealthMetadata, HealthProbe, HealthStatus, RegistryError, RegistryRecord, RegistryResult,
    TicketStore,
};
use warden_tickets::TicketKind;

pub(crate) const KEY_PREFIX: &str = "warden";

fn ticket_key(kind: TicketKind, ticket_id: &str) -> String {
    format!("{KEY_PREFIX}:ticket:{kind}:{ticket_id}")
}

fn kind_set_key(kind: TicketKind) -> String {
    format!("{KEY_PREFIX}:kind:{kind}")
}

fn principal_key(principal_id: &str) -> String {
    format!("{KEY_PREFIX}:principal:{principal_id}")
}

fn children_key(parent_id: &str) -> String {
    format!("{KEY_PREFIX}:children:{parent_id}")
}

pub(crate) fn store_err(context: &'static str, e: redis::RedisError) -> RegistryError {
    RegistryError::store_unavailable_with_source(context, e)
}

/// Ticket store over a shared Redis instance.
///
/// Cheaply cloneable; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisTicketStore {
    conn: MultiplexedConnection,
}

impl RedisTicketStore {
    /// Connects to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    ///
    /// [`RegistryError::StoreUnavailable`] when the URL is invalid or the
    /// connection cannot be established.
    pub async fn connect(url: &str) -> RegistryResult<Self> {
        let client =
            Client::open(url).map_err(|e| store_err("invalid redis connection url", e))?;
        Self::with_client(&client).await
    }

    /// Opens a store over an existing client.
    pub async fn with_client(client: &Client) -> RegistryResult<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_err("redis connection failed", e))?;
        Ok(Self { conn })
    }

    /// Loads the ids in a set, pruning members whose record is gone.
    async fn load_indexed(&self, set_key: &str) -> RegistryResult<Vec<RegistryRecord>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> =
            conn.smembers(set_key).await.map_err(|e| store_err("redis smembers failed", e))?;

        let mut records = Vec::with_capacity(ids.len());
        let mut stale = Vec::new();
        for id in ids {
            match self.load(&id).await? {
                Some(record) => records.push(record),
                None => stale.push(id),
            }
        }
        if !stale.is_empty() {
            debug!(set_key, pruned = stale.len(), "pruning stale index members");
            let _: () = conn
                .srem(set_key, &stale)
                .await
                .map_err(|e| store_err("redis srem failed", e))?;
        }
        Ok(records)
    }

    async fn count_kind(&self, kind: TicketKind) -> RegistryResult<u64> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(kind_set_key(kind))
            .await
            .map_err(|e| store_err("redis smembers failed", e))?;
        if ids.is_empty() {
            return Ok(0);
        }

        // Set members outlive their record's TTL; count only live records.
        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.exists(ticket_key(kind, id));
        }
        let alive: Vec<bool> =
            pipe.query_async(&mut conn).await.map_err(|e| store_err("redis exists failed", e))?;
        Ok(alive.into_iter().filter(|alive| *alive).count() as u64)
    }
}

#[async_trait]
impl TicketStore for RedisTicketStore {
    async fn save(&self, record: RegistryRecord) -> RegistryResult<()> {
        let json = serde_json::to_string(&record).map_err(|e| {
            RegistryError::internal(format!("record serialization failed: {e}"))
        })?;
        let key = ticket_key(record.kind, &record.id);

        // An upsert may move the record to another principal or parent;
        // the stale index entries go in the same pipeline as the write.
        let previous = self.load(&record.id).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(previous) = previous {
            if previous.principal_id != record.principal_id {
                pipe.srem(principal_key(&previous.principal_id), &record.id).ignore();
            }
            if previous.parent_id != record.parent_id
                && let Some(parent) = &previous.parent_id
            {
                pipe.srem(children_key(parent), &record.id).ignore();
            }
        }
        match record.ttl_from(Utc::now()) {
            Some(ttl) => {
                pipe.set_ex(&key, &json, ttl.as_secs().max(1)).ignore();
            },
            None => {
                pipe.set(&key, &json).ignore();
            },
        }
        pipe.sadd(kind_set_key(record.kind), &record.id).ignore();
        pipe.sadd(principal_key(&record.principal_id), &record.id).ignore();
        if let Some(parent) = &record.parent_id {
            pipe.sadd(children_key(parent), &record.id).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () =
            pipe.query_async(&mut conn).await.map_err(|e| store_err("redis save failed", e))?;
        Ok(())
    }

    async fn load(&self, ticket_id: &str) -> RegistryResult<Option<RegistryRecord>> {
        let Some(kind) = TicketKind::from_id(ticket_id) else {
            return Ok(None);
        };
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .get(ticket_key(kind, ticket_id))
            .await
            .map_err(|e| store_err("redis get failed", e))?;
        let Some(json) = json else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(ticket_id, error = %e, "unparseable record in redis, treating as absent");
                Ok(None)
            },
        }
    }

    async fn load_by_principal(
        &self,
        principal_id: &str,
        kind: Option<TicketKind>,
    ) -> RegistryResult<Vec<RegistryRecord>> {
        let mut records = self.load_indexed(&principal_key(principal_id)).await?;
        if let Some(kind) = kind {
            records.retain(|record| record.kind == kind);
        }
        Ok(records)
    }

    async fn load_children(&self, parent_id: &str) -> RegistryResult<Vec<RegistryRecord>> {
        self.load_indexed(&children_key(parent_id)).await
    }

    async fn delete(&self, ticket_id: &str) -> RegistryResult<bool> {
        let Some(kind) = TicketKind::from_id(ticket_id) else {
            return Ok(false);
        };
        let key = ticket_key(kind, ticket_id);
        let mut conn = self.conn.clone();

        // The record names its own index keys; read it before deleting.
        let json: Option<String> =
            conn.get(&key).await.map_err(|e| store_err("redis get failed", e))?;
        let Some(json) = json else {
            let _: () = conn
                .srem(kind_set_key(kind), ticket_id)
                .await
                .map_err(|e| store_err("redis srem failed", e))?;
            return Ok(false);
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(&key).ignore();
        pipe.srem(kind_set_key(kind), ticket_id).ignore();
        if let Ok(record) = serde_json::from_str::<RegistryRecord>(&json) {
            pipe.srem(principal_key(&record.principal_id), ticket_id).ignore();
            if let Some(parent) = &record.parent_id {
                pipe.srem(children_key(parent), ticket_id).ignore();
            }
        }
        let _: () =
            pipe.query_async(&mut conn).await.map_err(|e| store_err("redis delete failed", e))?;
        Ok(true)
    }

    async fn delete_all(&self, kind: Option<TicketKind>) -> RegistryResult<u64> {
        // A kind-scoped purge goes through per-record deletes so the
        // principal and children index sets stay consistent.
        if let Some(kind) = kind {
            let mut conn = self.conn.clone();
            let ids: Vec<String> = conn
                .smembers(kind_set_key(kind))
                .await
                .map_err(|e| store_err("redis smembers failed", e))?;
            let mut removed = 0;
            for id in ids {
                if self.delete(&id).await? {
                    removed += 1;
                }
            }
            return Ok(removed);
        }

        // Sweep only the ticket-data prefixes; lock keys live in the same
        // namespace and must survive a purge.
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        for prefix in ["ticket", "kind", "principal", "children"] {
            let mut iter = conn
                .scan_match(format!("{KEY_PREFIX}:{prefix}:*"))
                .await
                .map_err(|e| store_err("redis scan failed", e))?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let ticket_prefix = format!("{KEY_PREFIX}:ticket:");
        let removed = keys.iter().filter(|key| key.starts_with(&ticket_prefix)).count() as u64;
        if !keys.is_empty() {
            let mut conn = self.conn.clone();
            let _: () =
                conn.del(&keys).await.map_err(|e| store_err("redis del failed", e))?;
        }
        Ok(removed)
    }

    async fn count(&self, kind: Option<TicketKind>) -> RegistryResult<u64> {
        match kind {
            Some(kind) => self.count_kind(kind).await,
            None => {
                let mut total = 0;
                for kind in TicketKind::ALL {
                    total += self.count_kind(kind).await?;
                }
                Ok(total)
            },
        }
    }

    async fn health_check(&self, _probe: HealthProbe) -> RegistryResult<HealthStatus> {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        let pong: Result<String, redis::RedisError> =
            redis::cmd("PING").query_async(&mut conn).await;
        let metadata = HealthMetadata::new(started.elapsed(), "redis");
        Ok(match pong {
            Ok(_) => HealthStatus::healthy(metadata.with_detail(
                "connection_latency_ms",
                started.elapsed().as_millis().to_string(),
            )),
            Err(e) => HealthStatus::unhealthy(metadata, e.to_string()),
        })
    }
}

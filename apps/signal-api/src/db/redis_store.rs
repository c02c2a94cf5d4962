//! Redis-backed room store.
//!
//! Layout per room (hash-tagged so both keys share a cluster slot):
//!   `signal:room:{<id>}:members` list of participant blobs, join order
//!   `signal:room:{<id>}`         hash with `version` and `remove_from_room_at`
//! Both keys carry the same `EXPIREAT`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::db::rooms::{decode_members, removal_order, RemovalOutcome, RoomSnapshot, RoomStore};
use crate::error::ApiError;
use crate::models::Participant;

/// Written over target positions before a single `LREM` sweeps them out.
/// Never valid JSON, so it cannot collide with a stored participant.
const TOMBSTONE: &str = "\u{0}removed";

/// KEYS: members, meta. ARGV: expected version, tombstone, positions...
/// Returns the remaining member count, or -1 when the version guard fails.
const REMOVE_BY_INDICES: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 0 then
  return -1
end
local current = redis.call('HGET', KEYS[2], 'version')
if current and tonumber(current) ~= tonumber(ARGV[1]) then
  return -1
end
local len = redis.call('LLEN', KEYS[1])
for i = 3, #ARGV do
  local idx = tonumber(ARGV[i])
  if idx < len then
    redis.call('LSET', KEYS[1], idx, ARGV[2])
  end
end
redis.call('LREM', KEYS[1], 0, ARGV[2])
redis.call('HINCRBY', KEYS[2], 'version', 1)
return redis.call('LLEN', KEYS[1])
"#;

/// KEYS: members, meta. Returns the number of keys deleted.
const DELETE_IF_EMPTY: &str = r#"
if redis.call('LLEN', KEYS[1]) == 0 then
  return redis.call('DEL', KEYS[1], KEYS[2])
end
return 0
"#;

pub struct RedisRoomStore {
    conn: ConnectionManager,
    ttl: Duration,
    remove_script: Script,
    delete_script: Script,
}

impl RedisRoomStore {
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self, ApiError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("redis room store connected");

        Ok(Self {
            conn,
            ttl,
            remove_script: Script::new(REMOVE_BY_INDICES),
            delete_script: Script::new(DELETE_IF_EMPTY),
        })
    }
}

fn members_key(room_id: &str) -> String {
    format!("signal:room:{{{room_id}}}:members")
}

fn meta_key(room_id: &str) -> String {
    format!("signal:room:{{{room_id}}}")
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn append(&self, room_id: &str, participant: &Participant) -> Result<(), ApiError> {
        let blob = participant.to_blob()?;
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl);
        let members = members_key(room_id);
        let meta = meta_key(room_id);

        let mut conn = self.conn.clone();
        let (): () = redis::pipe()
            .atomic()
            .rpush(&members, &blob)
            .ignore()
            .hset(&meta, "remove_from_room_at", expires_at)
            .ignore()
            .expire_at(&members, expires_at)
            .ignore()
            .expire_at(&meta, expires_at)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn read(&self, room_id: &str) -> Result<RoomSnapshot, ApiError> {
        let mut conn = self.conn.clone();
        let (blobs, version): (Vec<String>, Option<String>) = redis::pipe()
            .atomic()
            .lrange(members_key(room_id), 0, -1)
            .hget(meta_key(room_id), "version")
            .query_async(&mut conn)
            .await?;

        let version = match version.as_deref().map(str::parse::<u64>) {
            None => 0,
            Some(Ok(v)) => v,
            Some(Err(_)) => {
                tracing::warn!(%room_id, "malformed room version; treating room as empty");
                return Ok(RoomSnapshot::default());
            }
        };

        Ok(match decode_members(room_id, &blobs) {
            Some(members) => RoomSnapshot { members, version },
            None => RoomSnapshot::default(),
        })
    }

    async fn remove_by_indices(
        &self,
        room_id: &str,
        indices: &[usize],
        expected_version: u64,
    ) -> Result<RemovalOutcome, ApiError> {
        let mut conn = self.conn.clone();
        let remaining: i64 = self
            .remove_script
            .key(members_key(room_id))
            .key(meta_key(room_id))
            .arg(expected_version)
            .arg(TOMBSTONE)
            .arg(removal_order(indices))
            .invoke_async(&mut conn)
            .await?;

        Ok(match usize::try_from(remaining) {
            Ok(remaining) => RemovalOutcome::Applied { remaining },
            Err(_) => RemovalOutcome::Stale,
        })
    }

    async fn delete_if_empty(&self, room_id: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .delete_script
            .key(members_key(room_id))
            .key(meta_key(room_id))
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::models::Participant;

/// A point-in-time view of a room.
///
/// `version` is the value removal positions must be checked against; member
/// indices are only meaningful relative to the snapshot they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub members: Vec<Participant>,
    pub version: u64,
}

/// Result of a conditional removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The version matched; the positions are gone and the version was bumped.
    Applied { remaining: usize },
    /// The room moved past the expected version (or no longer exists). Nothing changed.
    Stale,
}

/// Durable registry of room membership.
///
/// Implementations must make every method a single atomic operation on the
/// store: appends never lose entries under concurrency, and a removal either
/// sees the expected version and applies completely or changes nothing.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Append `participant` to the room's member list, creating the room if
    /// needed, and push its expiry to now + TTL. Never conditional.
    async fn append(&self, room_id: &str, participant: &Participant) -> Result<(), ApiError>;

    /// Current members and version. Missing, expired or unparsable rooms read
    /// as an empty snapshot at version 0.
    async fn read(&self, room_id: &str) -> Result<RoomSnapshot, ApiError>;

    /// Remove the members at `indices` (positions in the snapshot taken at
    /// `expected_version`) and increment the version, but only if the stored
    /// version still equals `expected_version` or has never been set.
    async fn remove_by_indices(
        &self,
        room_id: &str,
        indices: &[usize],
        expected_version: u64,
    ) -> Result<RemovalOutcome, ApiError>;

    /// Delete the room record if it currently has no members. Returns whether
    /// a record was deleted; calling it on an absent room is a no-op.
    async fn delete_if_empty(&self, room_id: &str) -> Result<bool, ApiError>;
}

/// Positions to remove, highest first, so earlier removals never shift later targets.
pub(crate) fn removal_order(indices: &[usize]) -> Vec<usize> {
    let unique: BTreeSet<usize> = indices.iter().copied().collect();
    unique.into_iter().rev().collect()
}

/// Decode stored blobs. One bad entry poisons the whole snapshot.
pub(crate) fn decode_members(room_id: &str, blobs: &[String]) -> Option<Vec<Participant>> {
    blobs
        .iter()
        .map(|blob| Participant::from_blob(blob))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            tracing::warn!(%room_id, ?err, "unparsable room member; treating room as empty");
        })
        .ok()
}

// ---------------------------------------------------------------------------
// In-memory implementation (single process / tests)
// ---------------------------------------------------------------------------

struct RoomRecord {
    /// Independently serialized participants, in join order.
    members: Vec<String>,
    version: Option<u64>,
    /// Epoch seconds.
    remove_from_room_at: i64,
}

/// Room store backed by a process-local map.
///
/// Each method holds the lock for its whole body, which gives the same
/// atomicity the Redis scripts give across processes.
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, RoomRecord>>,
    ttl: Duration,
}

impl MemoryRoomStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Drop every room whose expiry has passed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut rooms = self.rooms.lock();
        let before = rooms.len();
        rooms.retain(|_, room| room.remove_from_room_at > now);
        before - rooms.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }

    #[cfg(test)]
    fn push_raw(&self, room_id: &str, blob: &str) {
        let mut rooms = self.rooms.lock();
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomRecord {
                members: Vec::new(),
                version: None,
                remove_from_room_at: i64::MAX,
            })
            .members
            .push(blob.to_string());
    }
}

/// Look up a room, evicting it first if it has expired.
fn live_room<'a>(
    rooms: &'a mut HashMap<String, RoomRecord>,
    room_id: &str,
    now: i64,
) -> Option<&'a mut RoomRecord> {
    if rooms
        .get(room_id)
        .is_some_and(|room| room.remove_from_room_at <= now)
    {
        rooms.remove(room_id);
        return None;
    }
    rooms.get_mut(room_id)
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn append(&self, room_id: &str, participant: &Participant) -> Result<(), ApiError> {
        let blob = participant.to_blob()?;
        let now = Utc::now().timestamp();
        let expires_at = now.saturating_add(self.ttl_secs());

        let mut rooms = self.rooms.lock();
        match live_room(&mut rooms, room_id, now) {
            Some(room) => {
                room.members.push(blob);
                room.remove_from_room_at = expires_at;
            }
            None => {
                rooms.insert(
                    room_id.to_string(),
                    RoomRecord {
                        members: vec![blob],
                        version: None,
                        remove_from_room_at: expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn read(&self, room_id: &str) -> Result<RoomSnapshot, ApiError> {
        let now = Utc::now().timestamp();
        let mut rooms = self.rooms.lock();
        let Some(room) = live_room(&mut rooms, room_id, now) else {
            return Ok(RoomSnapshot::default());
        };
        Ok(match decode_members(room_id, &room.members) {
            Some(members) => RoomSnapshot {
                members,
                version: room.version.unwrap_or(0),
            },
            None => RoomSnapshot::default(),
        })
    }

    async fn remove_by_indices(
        &self,
        room_id: &str,
        indices: &[usize],
        expected_version: u64,
    ) -> Result<RemovalOutcome, ApiError> {
        let now = Utc::now().timestamp();
        let mut rooms = self.rooms.lock();
        let Some(room) = live_room(&mut rooms, room_id, now) else {
            return Ok(RemovalOutcome::Stale);
        };

        if room.version.is_some_and(|v| v != expected_version) {
            return Ok(RemovalOutcome::Stale);
        }

        for index in removal_order(indices) {
            if index < room.members.len() {
                room.members.remove(index);
            }
        }
        room.version = Some(room.version.map_or(1, |v| v + 1));

        Ok(RemovalOutcome::Applied {
            remaining: room.members.len(),
        })
    }

    async fn delete_if_empty(&self, room_id: &str) -> Result<bool, ApiError> {
        let mut rooms = self.rooms.lock();
        if rooms.get(room_id).is_some_and(|room| room.members.is_empty()) {
            rooms.remove(room_id);
            return Ok(true);
        }
        Ok(false)
    }
}

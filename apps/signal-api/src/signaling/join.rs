//! Room join: register the joiner, introduce them to everyone reachable, and
//! prune members whose connections turned out to be dead.

use futures_util::future::join_all;
use serde_json::Value;

use crate::db::rooms::{RemovalOutcome, RoomStore};
use crate::error::ApiError;
use crate::models::Participant;

use super::dispatcher::Dispatcher;
use super::events::{EventName, JoinRoomRequest, RequestContext, SignalEvent};

/// Most dead positions one join will try to prune. Failures past this are
/// only counted; a later join picks them up.
pub const MAX_DEAD_POSITIONS: usize = 150;

#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions {
    /// Delete the room record when a prune leaves it empty.
    pub delete_empty_rooms: bool,
}

/// What happened during one join. Only used for logging and tests; the
/// caller's acknowledgment does not depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    pub clients_notified: usize,
    /// Snapshot positions of members that could not be reached, capped.
    pub dead_positions: Vec<usize>,
    /// Unreachable members past the cap.
    pub skipped: usize,
    /// The joiner was told it is alone in the room.
    pub first_to_join: bool,
    /// `None` when there was nothing to prune or the prune itself failed.
    pub pruned: Option<RemovalOutcome>,
    pub room_deleted: bool,
}

/// Handle a `join-room` request.
///
/// The append happens before the read so that two concurrent joiners can never
/// both miss each other: whichever reads second sees the other.
///
/// Returns `Err` only when the request has no room id or the store fails
/// before the snapshot is taken. Unreachable peers and stale prunes are
/// absorbed.
pub async fn join_room(
    rooms: &dyn RoomStore,
    dispatcher: &dyn Dispatcher,
    ctx: &RequestContext,
    request: JoinRoomRequest,
    options: JoinOptions,
) -> Result<JoinOutcome, ApiError> {
    let room_id = request
        .room_id
        .ok_or_else(|| ApiError::bad_request("roomId is required"))?;

    let joiner = Participant {
        connection_id: ctx.connection_id.clone(),
        sdp: request.sdp,
        peer_id: request.peer_id,
        display_name: request.name,
    };

    rooms.append(&room_id, &joiner).await?;
    let snapshot = rooms.read(&room_id).await?;

    tracing::debug!(
        %room_id,
        connection_id = %joiner.connection_id,
        members = snapshot.members.len(),
        version = snapshot.version,
        "room snapshot taken"
    );

    let mut outcome = JoinOutcome::default();
    let joiner_record = serde_json::to_value(&joiner)?;

    let deliveries = snapshot
        .members
        .iter()
        .enumerate()
        .filter(|(_, member)| member.connection_id != joiner.connection_id)
        .map(|(position, member)| {
            let event = someone_joined(&joiner_record, &joiner, member);
            async move {
                let result = dispatcher
                    .send(&member.connection_id, &event, &ctx.domain_name)
                    .await;
                (position, member, result)
            }
        });

    // join_all yields results in snapshot order, so the cap always keeps the
    // earliest dead positions regardless of which sends finish first.
    for (position, member, result) in join_all(deliveries).await {
        match result {
            Ok(()) => outcome.clients_notified += 1,
            Err(err) => {
                tracing::debug!(
                    %room_id,
                    target = %member.connection_id,
                    position,
                    %err,
                    "peer unreachable"
                );
                if outcome.dead_positions.len() < MAX_DEAD_POSITIONS {
                    outcome.dead_positions.push(position);
                } else {
                    outcome.skipped += 1;
                }
            }
        }
    }

    if outcome.clients_notified == 0 {
        let event = SignalEvent::new(
            EventName::FIRST_TO_JOIN,
            serde_json::json!({ "roomId": room_id }),
        );
        if let Err(err) = dispatcher
            .send(&joiner.connection_id, &event, &ctx.domain_name)
            .await
        {
            tracing::warn!(%room_id, connection_id = %joiner.connection_id, %err, "could not tell joiner it is first");
        }
        outcome.first_to_join = true;
    }

    if !outcome.dead_positions.is_empty() {
        prune(rooms, &room_id, snapshot.version, options, &mut outcome).await;
    }

    tracing::info!(
        %room_id,
        connection_id = %joiner.connection_id,
        notified = outcome.clients_notified,
        dead = outcome.dead_positions.len(),
        skipped = outcome.skipped,
        first = outcome.first_to_join,
        "room join handled"
    );

    Ok(outcome)
}

/// Build the introduction sent to `recipient`: the joiner's record plus which
/// peer id is offering and which one is the recipient's own.
fn someone_joined(joiner_record: &Value, joiner: &Participant, recipient: &Participant) -> SignalEvent {
    let mut data = joiner_record.clone();
    if let Value::Object(fields) = &mut data {
        fields.insert("ownId".to_string(), recipient.peer_id.clone().into());
        fields.insert("offererId".to_string(), joiner.peer_id.clone().into());
    }
    SignalEvent::new(EventName::SOMEONE_JOINED, data)
}

/// Best-effort removal of dead members against the version the positions came from.
async fn prune(
    rooms: &dyn RoomStore,
    room_id: &str,
    version: u64,
    options: JoinOptions,
    outcome: &mut JoinOutcome,
) {
    let removal = match rooms
        .remove_by_indices(room_id, &outcome.dead_positions, version)
        .await
    {
        Ok(removal) => removal,
        Err(err) => {
            tracing::warn!(%room_id, %err, "prune failed; leaving dead members for a later join");
            return;
        }
    };
    outcome.pruned = Some(removal);

    match removal {
        RemovalOutcome::Stale => {
            tracing::debug!(%room_id, version, "prune skipped; room changed since snapshot");
        }
        RemovalOutcome::Applied { remaining } => {
            tracing::debug!(%room_id, removed = outcome.dead_positions.len(), remaining, "pruned dead members");
            if remaining == 0 && options.delete_empty_rooms {
                match rooms.delete_if_empty(room_id).await {
                    Ok(deleted) => outcome.room_deleted = deleted,
                    Err(err) => tracing::warn!(%room_id, %err, "empty room cleanup failed"),
                }
            }
        }
    }
}

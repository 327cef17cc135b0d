// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demo application: user presence and game rooms on top of the dispatcher.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dispatch::{DispatcherBuilder, EventContext};
use crate::error::HandlerError;
use crate::protocol::{EventName, Frame};
use crate::registry::{ConnectionId, Registry, RoomId};

pub mod events {
    use crate::protocol::EventName;

    pub const USER_STATUS: EventName = EventName::from_static("user:status");
    pub const GAME_JOIN: EventName = EventName::from_static("game:join");
    pub const GAME_LEAVE: EventName = EventName::from_static("game:leave");
    pub const GAME_STATE: EventName = EventName::from_static("game:state");
    pub const PLAYER_JOINED: EventName = EventName::from_static("game:player_joined");
    pub const PLAYER_LEFT: EventName = EventName::from_static("game:player_left");
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBroadcast<'a> {
    user_id: &'a str,
    status: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinGame {
    game_id: RoomId,
}

#[derive(Debug, Deserialize)]
struct GameState {
    state: serde_json::Value,
}

/// Register the demo handlers.
pub fn install(builder: DispatcherBuilder) -> DispatcherBuilder {
    builder
        .on(events::USER_STATUS, user_status)
        .on(events::GAME_JOIN, game_join)
        .on(events::GAME_LEAVE, game_leave)
        .on(events::GAME_STATE, game_state)
}

async fn user_status(ctx: Arc<EventContext>) -> Result<(), HandlerError> {
    let user = ctx.require_identity("Must be authenticated to set status")?;
    let update: StatusUpdate = ctx.payload()?;
    let frame = Frame::event_typed(
        events::USER_STATUS,
        &StatusBroadcast { user_id: user.as_str(), status: &update.status },
    )?;
    ctx.registry().broadcast(frame).await;
    Ok(())
}

async fn game_join(ctx: Arc<EventContext>) -> Result<(), HandlerError> {
    let user = ctx.require_identity("Must be authenticated to join games")?.clone();
    let JoinGame { game_id } = ctx.payload()?;
    if game_id.0.is_empty() {
        return Err(HandlerError::invalid("gameId must not be empty"));
    }

    let previous = ctx.connection().meta().current_game.replace(game_id.clone());
    let conn_id = ctx.connection().id();
    if let Some(old) = previous.filter(|old| *old != game_id) {
        let left = json!({"gameId": old, "userId": user.as_str()});
        to_room(ctx.registry(), &old, conn_id, events::PLAYER_LEFT, left).await;
    }

    tracing::debug!(conn_id = %conn_id, game_id = %game_id, "joined game");
    ctx.ack(json!({"gameId": game_id}));
    let joined = json!({"gameId": game_id, "userId": user.as_str()});
    to_room(ctx.registry(), &game_id, conn_id, events::PLAYER_JOINED, joined).await;
    Ok(())
}

async fn game_leave(ctx: Arc<EventContext>) -> Result<(), HandlerError> {
    let current = ctx.connection().meta().current_game.take();
    let Some(game_id) = current else {
        ctx.ack(json!({"gameId": null}));
        return Ok(());
    };
    ctx.ack(json!({"gameId": game_id}));
    let user_id = ctx.identity().map(|i| i.as_str().to_owned());
    let left = json!({"gameId": game_id, "userId": user_id});
    to_room(ctx.registry(), &game_id, ctx.connection().id(), events::PLAYER_LEFT, left).await;
    Ok(())
}

async fn game_state(ctx: Arc<EventContext>) -> Result<(), HandlerError> {
    let user = ctx.require_identity("Must be authenticated to update games")?;
    let GameState { state } = ctx.payload()?;
    let current = ctx.connection().meta().current_game.clone();
    let Some(game_id) = current else {
        return Err(HandlerError::invalid("Not in a game"));
    };
    let data = json!({"gameId": game_id, "userId": user.as_str(), "state": state});
    to_room(ctx.registry(), &game_id, ctx.connection().id(), events::GAME_STATE, data).await;
    Ok(())
}

/// Send to every other authenticated member of `room`.
async fn to_room(
    registry: &Registry,
    room: &RoomId,
    except: ConnectionId,
    event: EventName,
    data: serde_json::Value,
) -> usize {
    registry
        .broadcast_where(Frame::event(event, data), |c| {
            c.id() != except && c.meta().current_game.as_ref() == Some(room)
        })
        .await
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;

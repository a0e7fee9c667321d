//! Typed payloads for the remote methods the client issues

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{TransportError, TransportResult};
use crate::transport::Transport;
use crate::types::RequestId;

// ----------------------------------------------------------------------------
// Method Names
// ----------------------------------------------------------------------------

pub const PING: &str = "JSONRPC.Ping";
pub const APPLICATION_GET_PROPERTIES: &str = "Application.GetProperties";
pub const PLAYER_GET_ACTIVE_PLAYERS: &str = "Player.GetActivePlayers";
pub const PLAYER_GET_PROPERTIES: &str = "Player.GetProperties";
pub const PLAYER_GET_ITEM: &str = "Player.GetItem";

/// Player properties requested by default on refresh
pub const DEFAULT_PLAYER_PROPERTIES: &[&str] =
    &["speed", "percentage", "time", "totaltime", "repeat", "shuffled"];

/// Item fields requested by default on refresh
pub const DEFAULT_ITEM_PROPERTIES: &[&str] = &[
    "title",
    "artist",
    "album",
    "showtitle",
    "season",
    "episode",
    "duration",
    "file",
    "thumbnail",
];

// ----------------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------------

/// Result of `Application.GetProperties`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationProperties {
    pub volume: u32,
    pub muted: bool,
}

/// One entry of `Player.GetActivePlayers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePlayer {
    #[serde(rename = "playerid")]
    pub player_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Playback position or length
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaTime {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub milliseconds: u32,
}

impl MediaTime {
    pub fn total_millis(&self) -> u64 {
        ((u64::from(self.hours) * 60 + u64::from(self.minutes)) * 60 + u64::from(self.seconds)) * 1000
            + u64::from(self.milliseconds)
    }
}

/// Result of `Player.GetProperties`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerProperties {
    pub speed: i32,
    pub percentage: f64,
    pub time: MediaTime,
    #[serde(rename = "totaltime")]
    pub total_time: MediaTime,
    pub repeat: String,
    pub shuffled: bool,
}

impl PlayerProperties {
    /// Playing means any non-zero speed, including rewinding
    pub fn is_playing(&self) -> bool {
        self.speed != 0
    }
}

/// Currently playing item from `Player.GetItem`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemInfo {
    pub id: Option<i64>,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub artist: Vec<String>,
    pub album: String,
    #[serde(rename = "showtitle")]
    pub show_title: String,
    pub season: i32,
    pub episode: i32,
    pub duration: u64,
    pub file: String,
    pub thumbnail: String,
}

impl ItemInfo {
    /// Best human-readable name for the item
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.label
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetItemReply {
    item: ItemInfo,
}

// ----------------------------------------------------------------------------
// Parameter Builders
// ----------------------------------------------------------------------------

pub fn application_properties_params() -> Value {
    json!({ "properties": ["volume", "muted"] })
}

pub fn player_properties_params(player_id: i64, properties: &[String]) -> Value {
    json!({ "playerid": player_id, "properties": properties })
}

pub fn player_item_params(player_id: i64, properties: &[String]) -> Value {
    json!({ "playerid": player_id, "properties": properties })
}

// ----------------------------------------------------------------------------
// Typed Calls
// ----------------------------------------------------------------------------

/// Call a method and decode its result
pub async fn invoke<T: DeserializeOwned>(
    transport: &dyn Transport,
    method: &str,
    params: Value,
    id: RequestId,
) -> TransportResult<T> {
    let result = transport.call(method, params, id).await?;
    serde_json::from_value(result).map_err(|err| {
        TransportError::ProtocolViolation(format!("unexpected {} result: {}", method, err))
    })
}

/// Round-trip a `JSONRPC.Ping`; hosts answer with the string `"pong"`
pub async fn ping(transport: &dyn Transport, id: RequestId) -> TransportResult<()> {
    match transport.call(PING, Value::Null, id).await? {
        Value::String(reply) if reply == "pong" => Ok(()),
        other => Err(TransportError::ProtocolViolation(format!(
            "unexpected ping reply {}",
            other
        ))),
    }
}

/// Fetch the item a player is currently playing
pub async fn player_item(
    transport: &dyn Transport,
    player_id: i64,
    properties: &[String],
    id: RequestId,
) -> TransportResult<ItemInfo> {
    let reply: GetItemReply = invoke(
        transport,
        PLAYER_GET_ITEM,
        player_item_params(player_id, properties),
        id,
    )
    .await?;
    Ok(reply.item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_properties_decode_with_missing_fields() {
        let props: PlayerProperties = serde_json::from_value(json!({
            "speed": 1,
            "time": {"hours": 0, "minutes": 1, "seconds": 2, "milliseconds": 3},
            "totaltime": {"hours": 1, "minutes": 0, "seconds": 0, "milliseconds": 0}
        }))
        .unwrap();
        assert!(props.is_playing());
        assert_eq!(props.time.total_millis(), 62_003);
        assert_eq!(props.total_time.total_millis(), 3_600_000);
        assert_eq!(props.repeat, "");
    }

    #[test]
    fn test_paused_player_is_not_playing() {
        let props = PlayerProperties {
            speed: 0,
            ..Default::default()
        };
        assert!(!props.is_playing());
        let rewinding = PlayerProperties {
            speed: -2,
            ..Default::default()
        };
        assert!(rewinding.is_playing());
    }

    #[test]
    fn test_item_display_title_falls_back_to_label() {
        let item: ItemInfo =
            serde_json::from_value(json!({"label": "track01.flac", "type": "song"})).unwrap();
        assert_eq!(item.display_title(), "track01.flac");
        assert_eq!(item.kind, "song");
    }

    #[test]
    fn test_active_player_field_names() {
        let players: Vec<ActivePlayer> =
            serde_json::from_value(json!([{"playerid": 1, "type": "video"}])).unwrap();
        assert_eq!(players[0].player_id, 1);
        assert_eq!(players[0].kind, "video");
    }
}

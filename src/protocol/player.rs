//! Player endpoint types.
//!
//! Responses of `GET /me/player` and `GET /me/player/devices`, and the
//! request bodies of `PUT /me/player` (transfer) and `PUT /me/player/play`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// Currently playing context as reported by `GET /me/player`.
///
/// The endpoint answers `204 No Content` when nothing is playing anywhere,
/// which never reaches this type.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub device: Option<Device>,

    #[serde(default)]
    pub is_playing: bool,

    /// `null` while an advert or a not yet started item is loaded.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub progress_ms: Option<Duration>,

    /// Track or episode; `null` during private sessions.
    #[serde(default)]
    pub item: Option<Item>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub uri: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Device {
    /// Some restricted devices do not expose an identifier.
    pub id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_restricted: bool,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Body of `PUT /me/player`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transfer<'a> {
    pub device_ids: [&'a str; 1],
    /// `false` keeps the current playback state instead of forcing play.
    pub play: bool,
}

/// Body of `PUT /me/player/play`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Play<'a> {
    pub context_uri: &'a str,
    pub offset: Offset,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub position_ms: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Offset {
    /// Zero-based index into the context's tracks.
    pub position: usize,
}

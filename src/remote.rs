//! Seams to the playback service.
//!
//! [`Remote`] is the Web API as the engine needs it; [`LocalPlayer`] is an
//! optional in-process playback session (for example an embedded SDK) that
//! can resume and pause without a round trip through the service. The
//! engine only ever talks to these traits, so tests substitute recording
//! doubles.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::Result,
    model::{Album, PlaybackSnapshot},
    protocol::player::Device,
};

/// What to play when starting from a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayRequest {
    pub context_uri: String,
    /// Zero-based track index within the context.
    pub offset: usize,
    pub position: Duration,
}

#[async_trait]
pub trait Remote: Send + Sync {
    /// Current playback state, `None` when nothing is playing anywhere.
    async fn playback(&self) -> Result<Option<PlaybackSnapshot>>;

    /// Moves playback to `device` without forcing it to play.
    async fn transfer(&self, device: &str) -> Result<()>;

    async fn play_context(&self, device: &str, request: &PlayRequest) -> Result<()>;

    async fn pause(&self, device: &str) -> Result<()>;

    async fn next(&self, device: &str) -> Result<()>;

    async fn previous(&self, device: &str) -> Result<()>;

    async fn devices(&self) -> Result<Vec<Device>>;

    async fn album(&self, id: &str) -> Result<Album>;

    async fn search_albums(&self, query: &str, limit: usize) -> Result<Vec<Album>>;
}

#[async_trait]
pub trait LocalPlayer: Send + Sync {
    /// Primes audio output. Some platforms refuse to start output until
    /// this was called from a user gesture.
    async fn activate(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;
}

//! Events pushed by the playback device and its SDK.
//!
//! Producers (an embedded SDK, or [`discover`](crate::device::discover) on
//! hosts without one) send these over the session's event channel; the
//! [`Listener`](crate::listener::Listener) routes them into the engine.
//!
//! # Example
//!
//! ```rust
//! use discspin::events::Event;
//!
//! fn describe(event: &Event) -> &'static str {
//!     match event {
//!         Event::DeviceReady { .. } => "device ready",
//!         Event::PlaybackChanged(_) => "playback changed",
//!         Event::AccountError { .. } | Event::AuthenticationError { .. } => "error",
//!     }
//! }
//! ```

use crate::model::PlaybackSnapshot;

/// Events that can be emitted by the playback device.
///
/// Readiness and playback changes feed the engine; the two error events
/// are reported to the user, and an authentication error also ends the
/// credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A playback device is ready to receive commands.
    DeviceReady { device_id: String },

    /// The account cannot stream, for example without a premium plan.
    AccountError { message: String },

    /// The service rejected the credential.
    AuthenticationError { message: String },

    /// The device reports a new playback state.
    PlaybackChanged(PlaybackSnapshot),
}

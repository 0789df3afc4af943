//! The local belief about what is loaded and playing.
//!
//! The model is written from three directions: the push event stream, the
//! reconciliation poller and the command dispatcher. Every write is a short
//! non-async critical section that overwrites the affected fields, so the
//! last write wins. Readers never see the mutable state directly; they get a
//! cloned [`PlaybackView`] or a [`watch::Receiver`] that is notified after
//! every change.
//!
//! # State
//!
//! | Status      | album | stopped | playing |
//! |-------------|-------|---------|---------|
//! | `Empty`     | none  | true    | false   |
//! | `Stopped`   | some  | true    | false   |
//! | `Playing`   | some  | false   | true    |
//! | `Paused`    | some  | false   | false   |
//!
//! With an album loaded, the track index is always within the album's track
//! sequence.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::watch;

use crate::{
    error::{Error, PlaybackUnavailableError, Result},
    protocol,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    pub uri: String,
    /// One-based position on the album.
    pub number: u32,
    /// Whether the service allows this track to be played.
    pub playable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Album {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artist: String,
    /// Cover art URL, empty when the service has none.
    pub artwork: String,
    pub tracks: Vec<Track>,
}

impl Album {
    /// Index of the first track eligible for playback.
    #[must_use]
    pub fn first_playable(&self) -> Option<usize> {
        self.tracks.iter().position(|track| track.playable)
    }
}

impl From<protocol::catalog::Track> for Track {
    fn from(track: protocol::catalog::Track) -> Self {
        Self {
            id: track.id,
            name: track.name,
            uri: track.uri,
            number: track.track_number,
            playable: track.is_playable.unwrap_or(true),
        }
    }
}

impl From<protocol::catalog::Album> for Album {
    fn from(album: protocol::catalog::Album) -> Self {
        let artist = album.artist();
        let artwork = album.image().unwrap_or_default().to_owned();
        let tracks = album
            .tracks
            .map(|page| page.items.into_iter().map(Track::from).collect())
            .unwrap_or_default();

        Self {
            id: album.id,
            uri: album.uri,
            name: album.name,
            artist,
            artwork,
            tracks,
        }
    }
}

/// Remote playback state as observed at one instant.
///
/// Applied as an overwrite, never as a delta.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub track_uri: Option<String>,
    pub position: Duration,
    pub playing: bool,
}

impl From<protocol::player::PlaybackState> for PlaybackSnapshot {
    fn from(state: protocol::player::PlaybackState) -> Self {
        Self {
            track_uri: state.item.map(|item| item.uri),
            position: state.progress_ms.unwrap_or_default(),
            playing: state.is_playing,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Empty,
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Stopped => write!(f, "stopped"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Read-only copy of the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackView {
    pub album: Option<Arc<Album>>,
    pub index: usize,
    pub position: Duration,
    pub playing: bool,
    pub stopped: bool,
    pub busy: bool,
}

impl Default for PlaybackView {
    fn default() -> Self {
        Self {
            album: None,
            index: 0,
            position: Duration::ZERO,
            playing: false,
            stopped: true,
            busy: false,
        }
    }
}

impl PlaybackView {
    #[must_use]
    pub fn status(&self) -> Status {
        match (&self.album, self.stopped, self.playing) {
            (None, ..) => Status::Empty,
            (Some(_), true, _) => Status::Stopped,
            (Some(_), false, true) => Status::Playing,
            (Some(_), false, false) => Status::Paused,
        }
    }

    #[must_use]
    pub fn track(&self) -> Option<&Track> {
        self.album
            .as_ref()
            .and_then(|album| album.tracks.get(self.index))
    }
}

pub struct PlaybackStateModel {
    state: watch::Sender<PlaybackView>,
    busy: AtomicBool,
}

impl Default for PlaybackStateModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(PlaybackView::default()),
            busy: AtomicBool::new(false),
        }
    }

    /// Loads `album` at `start_index`, stopped at position zero.
    ///
    /// # Errors
    ///
    /// * [`PlaybackUnavailableError`] if no track of the album is playable
    /// * `InvalidArgument` if `start_index` is not a playable track
    pub fn load_album(&self, album: Album, start_index: usize) -> Result<()> {
        if album.first_playable().is_none() {
            return Err(PlaybackUnavailableError { album_id: album.id }.into());
        }

        if !album
            .tracks
            .get(start_index)
            .is_some_and(|track| track.playable)
        {
            return Err(Error::invalid_argument(format!(
                "track {start_index} of album {} is not playable",
                album.id
            )));
        }

        debug!(
            "loaded album {} by {} at track {}",
            album.name,
            album.artist,
            start_index + 1
        );

        self.state.send_modify(|state| {
            state.album = Some(Arc::new(album));
            state.index = start_index;
            state.position = Duration::ZERO;
            state.playing = false;
            state.stopped = true;
        });

        Ok(())
    }

    /// Merges a pushed device state into the model.
    ///
    /// Does nothing without an album. Otherwise the track index follows the
    /// snapshot's track if it belongs to the album, and position and playing
    /// are overwritten. A pushed state means the device has the album, so
    /// the model leaves the stopped state.
    pub fn apply_snapshot(&self, snapshot: &PlaybackSnapshot) {
        self.merge(snapshot, true);
    }

    /// Merges a polled service state into the model.
    ///
    /// Like [`apply_snapshot`](Self::apply_snapshot), but a stopped model
    /// stays stopped: the service may still report the account's previous
    /// context, which must not turn the next play into a resume.
    pub fn reconcile(&self, snapshot: &PlaybackSnapshot) {
        self.merge(snapshot, false);
    }

    fn merge(&self, snapshot: &PlaybackSnapshot, clears_stopped: bool) {
        self.state.send_if_modified(|state| {
            let Some(album) = state.album.as_ref() else {
                return false;
            };

            if let Some(uri) = snapshot.track_uri.as_deref() {
                if let Some(index) = album.tracks.iter().position(|track| track.uri == uri) {
                    state.index = index;
                }
            }

            state.position = snapshot.position;
            state.playing = snapshot.playing;
            if clears_stopped {
                state.stopped = false;
            }
            true
        });
    }

    /// Optimistic update after a successful play command.
    pub fn mark_playing(&self) {
        self.state.send_if_modified(|state| {
            if state.album.is_none() {
                return false;
            }
            state.playing = true;
            state.stopped = false;
            true
        });
    }

    /// Optimistic update after a successful pause command.
    pub fn mark_paused(&self) {
        self.state.send_if_modified(|state| {
            if state.album.is_none() {
                return false;
            }
            state.playing = false;
            true
        });
    }

    /// Resets to the empty state.
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            let busy = state.busy;
            *state = PlaybackView {
                busy,
                ..PlaybackView::default()
            };
        });
    }

    /// Claims the single command slot.
    ///
    /// Returns `false` if a command is already in flight. The flag must be
    /// released with [`release`](Self::release); prefer
    /// [`try_acquire`](Self::try_acquire).
    pub fn try_set_busy(&self) -> bool {
        let acquired = self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if acquired {
            self.state.send_modify(|state| state.busy = true);
        }
        acquired
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
        self.state.send_modify(|state| state.busy = false);
    }

    /// Claims the command slot for as long as the guard lives.
    #[must_use]
    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.try_set_busy().then_some(BusyGuard { model: self })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn view(&self) -> PlaybackView {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.state.borrow().status()
    }

    #[must_use]
    pub fn has_album(&self) -> bool {
        self.state.borrow().album.is_some()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackView> {
        self.state.subscribe()
    }
}

/// Releases the command slot when dropped.
#[must_use]
pub struct BusyGuard<'a> {
    model: &'a PlaybackStateModel,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.model.release();
    }
}

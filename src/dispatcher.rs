//! Transport commands.
//!
//! A [`Dispatcher`] turns user actions into calls on the local player and
//! the Web API. At most one command is in flight: an action issued while
//! another is running is dropped, not queued, and so is any action while no
//! album is loaded.
//!
//! Play prefers resuming the in-process player when playback was merely
//! paused. Otherwise it starts the album context on the device at the
//! current track and position, and if the service refuses (typically because
//! the device is not the active one), transfers playback once and retries.
//! Pause prefers the in-process player and falls back to the Web API.
//!
//! Model updates after a successful command are optimistic; the poller and
//! the event stream correct them.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use crate::{
    device::DeviceManager,
    error::{Error, Result},
    model::PlaybackStateModel,
    poller::Poller,
    remote::{PlayRequest, Remote},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Play,
    Pause,
    Next,
    Previous,
    Eject,
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            "next" => Ok(Self::Next),
            "prev" | "previous" => Ok(Self::Previous),
            "eject" => Ok(Self::Eject),
            other => Err(Error::invalid_argument(format!("unknown action {other:?}"))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => write!(f, "play"),
            Self::Pause => write!(f, "pause"),
            Self::Next => write!(f, "next"),
            Self::Previous => write!(f, "previous"),
            Self::Eject => write!(f, "eject"),
        }
    }
}

pub struct Dispatcher {
    remote: Arc<dyn Remote>,
    devices: Arc<DeviceManager>,
    model: Arc<PlaybackStateModel>,
    poller: Arc<Poller>,
}

impl Dispatcher {
    /// Wait for a device before starting playback.
    const PLAY_READY_TIMEOUT: Duration = Duration::from_millis(900);

    /// Wait for a device before other commands.
    const READY_TIMEOUT: Duration = Duration::from_millis(1200);

    /// Pause between a transfer and the retried play.
    const TRANSFER_SETTLE: Duration = Duration::from_millis(60);

    #[must_use]
    pub fn new(
        remote: Arc<dyn Remote>,
        devices: Arc<DeviceManager>,
        model: Arc<PlaybackStateModel>,
        poller: Arc<Poller>,
    ) -> Self {
        Self {
            remote,
            devices,
            model,
            poller,
        }
    }

    /// Runs `action` unless no album is loaded or another command is in
    /// flight.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed command; the model is unchanged.
    /// Eject never fails.
    pub async fn dispatch(&self, action: Action) -> Result<()> {
        if !self.model.has_album() {
            trace!("{action}: no album loaded");
            return Ok(());
        }

        let Some(_busy) = self.model.try_acquire() else {
            debug!("{action}: dropped while another command is in flight");
            return Ok(());
        };

        debug!("{action}");
        match action {
            Action::Play => self.play().await,
            Action::Pause => self.pause().await,
            Action::Next => {
                let device = self.devices.ensure_ready(Self::READY_TIMEOUT).await?;
                self.remote.next(&device).await
            }
            Action::Previous => {
                let device = self.devices.ensure_ready(Self::READY_TIMEOUT).await?;
                self.remote.previous(&device).await
            }
            Action::Eject => {
                self.eject().await;
                Ok(())
            }
        }
    }

    async fn play(&self) -> Result<()> {
        let view = self.model.view();
        if view.playing {
            return self.pause().await;
        }

        if !view.stopped {
            if let Some(local) = self.devices.local() {
                self.devices.activate().await;
                match local.resume().await {
                    Ok(()) => {
                        self.model.mark_playing();
                        return Ok(());
                    }
                    Err(e) => debug!("resuming local player: {e}"),
                }
            }
        }

        self.play_context().await
    }

    async fn play_context(&self) -> Result<()> {
        let device = self.devices.ensure_ready(Self::PLAY_READY_TIMEOUT).await?;
        self.devices.activate().await;

        let view = self.model.view();
        let Some(album) = view.album.as_ref() else {
            return Ok(());
        };
        let request = PlayRequest {
            context_uri: album.uri.clone(),
            offset: view.index,
            position: if view.stopped {
                Duration::ZERO
            } else {
                view.position
            },
        };

        if let Err(e) = self.remote.play_context(&device, &request).await {
            debug!("starting playback: {e}; transferring to {device}");
            if let Err(e) = self.remote.transfer(&device).await {
                debug!("transferring playback: {e}");
            }
            tokio::time::sleep(Self::TRANSFER_SETTLE).await;
            self.remote.play_context(&device, &request).await?;
        }

        self.model.mark_playing();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let paused_locally = match self.devices.local() {
            Some(local) => match local.pause().await {
                Ok(()) => true,
                Err(e) => {
                    debug!("pausing local player: {e}");
                    false
                }
            },
            None => false,
        };

        if !paused_locally {
            let device = self.devices.ensure_ready(Self::READY_TIMEOUT).await?;
            self.remote.pause(&device).await?;
        }

        self.model.mark_paused();
        Ok(())
    }

    /// Pauses remotely if possible, then unloads the album.
    async fn eject(&self) {
        match self.devices.ensure_ready(Self::READY_TIMEOUT).await {
            Ok(device) => {
                if let Err(e) = self.remote.pause(&device).await {
                    debug!("pausing before eject: {e}");
                }
            }
            Err(e) => debug!("ejecting without device: {e}"),
        }

        self.poller.stop();
        self.model.clear();
        info!("ejected");
    }
}

//! Periodic reconciliation of the model with the service.
//!
//! The push event stream can miss changes made elsewhere (another device,
//! the mobile app, the track simply ending), so while an album is loaded the
//! poller fetches the remote playback state on an interval and merges it
//! into the model. Failures are expected (the service answers `204` or
//! rate limits) and are only logged.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{error::Result, model::PlaybackStateModel, remote::Remote};

pub struct Poller {
    remote: Arc<dyn Remote>,
    model: Arc<PlaybackStateModel>,
    interval: Duration,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Poller {
    #[must_use]
    pub fn new(remote: Arc<dyn Remote>, model: Arc<PlaybackStateModel>, interval: Duration) -> Self {
        Self {
            remote,
            model,
            interval,
            task: Mutex::new(None),
        }
    }

    /// Starts polling, restarting if already running.
    ///
    /// The first poll happens one interval from now. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        let token = CancellationToken::new();
        let remote = Arc::clone(&self.remote);
        let model = Arc::clone(&self.model);
        let interval = self.interval;

        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    result = async {
                        ticker.tick().await;
                        poll_once(remote.as_ref(), &model).await
                    } => {
                        if let Err(e) = result {
                            debug!("reconciling playback state: {e}");
                        }
                    }
                }
            }

            trace!("poller stopped");
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((token, handle));
        if let Some((token, _)) = previous {
            token.cancel();
        }

        debug!("polling playback state every {}ms", interval.as_millis());
    }

    /// Stops polling. An in-flight fetch is abandoned and never applied.
    pub fn stop(&self) {
        if let Some((token, _)) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fetches the remote state once and reconciles the model with it, if an
/// album is loaded and the service reports a track.
///
/// # Errors
///
/// Returns the error of the remote fetch.
pub async fn poll_once(remote: &dyn Remote, model: &PlaybackStateModel) -> Result<()> {
    if !model.has_album() {
        return Ok(());
    }

    match remote.playback().await? {
        Some(snapshot) if snapshot.track_uri.is_some() => model.reconcile(&snapshot),
        // Adverts, episodes and gaps between tracks carry no item.
        Some(_) => trace!("playback state without a track"),
        None => {}
    }

    Ok(())
}

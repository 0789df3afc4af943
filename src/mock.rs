//! Recording doubles of the service seams for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    error::{ApiError, Error, Result},
    model::{Album, PlaybackSnapshot},
    protocol::player::Device,
    remote::{LocalPlayer, PlayRequest, Remote},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Playback,
    Transfer(String),
    Play(String, PlayRequest),
    Pause(String),
    Next(String),
    Previous(String),
    Devices,
    Album(String),
    Search(String, usize),
    LocalActivate,
    LocalResume,
    LocalPause,
}

fn not_active() -> Error {
    ApiError {
        status: reqwest::StatusCode::NOT_FOUND,
        body: r#"{"error":{"status":404,"message":"Device not found"}}"#.to_owned(),
    }
    .into()
}

#[derive(Default)]
pub(crate) struct MockRemote {
    pub log: Mutex<Vec<Call>>,

    /// Delay before every transport command completes.
    pub latency: Duration,

    /// Number of upcoming play calls that fail.
    pub play_failures: AtomicUsize,
    pub pause_fails: AtomicBool,
    /// Number of upcoming playback fetches that fail.
    pub playback_failures: AtomicUsize,

    pub snapshot: Mutex<Option<PlaybackSnapshot>>,
    pub devices: Mutex<Vec<Device>>,
    pub albums: Mutex<HashMap<String, Album>>,
}

impl MockRemote {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls other than playback fetches, which the poller issues on its own.
    pub(crate) fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::Playback)
            .collect()
    }

    fn record(&self, call: Call) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    async fn lag(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Consumes one pending failure from `counter`, if any.
    fn fail(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn playback(&self) -> Result<Option<PlaybackSnapshot>> {
        self.record(Call::Playback);
        if Self::fail(&self.playback_failures) {
            return Err(Error::unavailable("service unavailable"));
        }
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn transfer(&self, device: &str) -> Result<()> {
        self.record(Call::Transfer(device.to_owned()));
        self.lag().await;
        Ok(())
    }

    async fn play_context(&self, device: &str, request: &PlayRequest) -> Result<()> {
        self.record(Call::Play(device.to_owned(), request.clone()));
        self.lag().await;
        if Self::fail(&self.play_failures) {
            return Err(not_active());
        }
        Ok(())
    }

    async fn pause(&self, device: &str) -> Result<()> {
        self.record(Call::Pause(device.to_owned()));
        self.lag().await;
        if self.pause_fails.load(Ordering::SeqCst) {
            return Err(not_active());
        }
        Ok(())
    }

    async fn next(&self, device: &str) -> Result<()> {
        self.record(Call::Next(device.to_owned()));
        self.lag().await;
        Ok(())
    }

    async fn previous(&self, device: &str) -> Result<()> {
        self.record(Call::Previous(device.to_owned()));
        self.lag().await;
        Ok(())
    }

    async fn devices(&self) -> Result<Vec<Device>> {
        self.record(Call::Devices);
        Ok(self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn album(&self, id: &str) -> Result<Album> {
        self.record(Call::Album(id.to_owned()));
        self.albums
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("album {id} not found")))
    }

    async fn search_albums(&self, query: &str, limit: usize) -> Result<Vec<Album>> {
        self.record(Call::Search(query.to_owned(), limit));
        Ok(self
            .albums
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// In-process player that records into the remote's call log, so that tests
/// can assert on the order across both.
pub(crate) struct MockLocal {
    remote: Arc<MockRemote>,
    pub resume_fails: AtomicBool,
    pub pause_fails: AtomicBool,
}

impl MockLocal {
    pub(crate) fn new(remote: Arc<MockRemote>) -> Self {
        Self {
            remote,
            resume_fails: AtomicBool::new(false),
            pause_fails: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LocalPlayer for MockLocal {
    async fn activate(&self) -> Result<()> {
        self.remote.record(Call::LocalActivate);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.remote.record(Call::LocalResume);
        self.remote.lag().await;
        if self.resume_fails.load(Ordering::SeqCst) {
            return Err(Error::unavailable("player not connected"));
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.remote.record(Call::LocalPause);
        self.remote.lag().await;
        if self.pause_fails.load(Ordering::SeqCst) {
            return Err(Error::unavailable("player not connected"));
        }
        Ok(())
    }
}

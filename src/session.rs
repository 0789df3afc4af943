//! The playback session context.
//!
//! A [`Session`] owns the engine components and wires them together:
//!
//! * [`AuthSession`] supplies the bearer token for every remote call
//! * [`DeviceManager`] learns about the device through the event channel
//! * [`PlaybackStateModel`] is written by the [`Listener`], the [`Poller`]
//!   and the [`Dispatcher`]
//!
//! Front-ends drive the session through its public operations and observe
//! it through [`Session::subscribe`]. Device SDKs (or
//! [`device::discover`](crate::device::discover)) push into
//! [`Session::events`].
//!
//! # Example
//!
//! ```rust,no_run
//! use discspin::{config::Config, dispatcher::Action, session::Session, store::FileStore};
//!
//! # async fn example() -> discspin::error::Result<()> {
//! let config = Config::from_file("discspin.toml")?;
//! let session = Session::new(config, FileStore::new("session.toml"), None)?;
//!
//! session.insert_album("4aawyAB9vmqN3uQ7FjRGTy").await?;
//! session.dispatch(Action::Play).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    api::WebApi,
    auth::{AuthSession, AuthorizationRequest, CallbackOutcome},
    config::Config,
    device::DeviceManager,
    dispatcher::{Action, Dispatcher},
    error::{Error, PlaybackUnavailableError, Result},
    events::Event,
    listener::Listener,
    model::{Album, PlaybackStateModel, PlaybackView},
    poller::Poller,
    remote::{LocalPlayer, Remote},
    store::SessionStore,
};

pub struct Session {
    config: Config,
    auth: Arc<AuthSession>,
    remote: Arc<dyn Remote>,
    devices: Arc<DeviceManager>,
    model: Arc<PlaybackStateModel>,
    poller: Arc<Poller>,
    dispatcher: Dispatcher,
    events: mpsc::Sender<Event>,
    listener: JoinHandle<()>,
}

impl Session {
    /// Number of events that may queue up before producers wait.
    const EVENT_CAPACITY: usize = 32;

    /// Number of albums returned by a search.
    pub const SEARCH_LIMIT: usize = 8;

    /// Creates a session against the Spotify Web API.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the HTTP clients
    /// cannot be built.
    pub fn new<S>(config: Config, store: S, local: Option<Arc<dyn LocalPlayer>>) -> Result<Self>
    where
        S: SessionStore + 'static,
    {
        let auth = Arc::new(AuthSession::new(&config, store)?);
        let remote = Arc::new(WebApi::new(&config, Arc::clone(&auth))?);
        Ok(Self::with_remote(config, auth, remote, local))
    }

    /// Creates a session with a custom remote.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_remote(
        config: Config,
        auth: Arc<AuthSession>,
        remote: Arc<dyn Remote>,
        local: Option<Arc<dyn LocalPlayer>>,
    ) -> Self {
        let devices = Arc::new(DeviceManager::new(local));
        let model = Arc::new(PlaybackStateModel::new());
        let poller = Arc::new(Poller::new(
            Arc::clone(&remote),
            Arc::clone(&model),
            config.poll_interval,
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&remote),
            Arc::clone(&devices),
            Arc::clone(&model),
            Arc::clone(&poller),
        );

        let (events, rx) = mpsc::channel(Self::EVENT_CAPACITY);
        let listener = Listener::new(Arc::clone(&auth), Arc::clone(&devices), Arc::clone(&model));
        let listener = tokio::spawn(listener.run(rx));

        Self {
            config,
            auth,
            remote,
            devices,
            model,
            poller,
            dispatcher,
            events,
            listener,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the challenge cannot be persisted.
    pub fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        self.auth.begin_authorization()
    }

    /// # Errors
    ///
    /// See [`AuthSession::complete_authorization`].
    pub async fn complete_authorization(&self, callback: &str) -> Result<CallbackOutcome> {
        self.auth.complete_authorization(callback).await
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.auth.has_credential()
    }

    /// Fetches an album and loads it at its first playable track, then
    /// starts reconciling with the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the album cannot be fetched, or
    /// [`PlaybackUnavailableError`] if none of its tracks can be played.
    pub async fn insert_album(&self, id: &str) -> Result<Arc<Album>> {
        let album = self.remote.album(id).await?;
        let start = album
            .first_playable()
            .ok_or_else(|| PlaybackUnavailableError {
                album_id: album.id.clone(),
            })?;

        self.model.load_album(album, start)?;
        self.poller.start();

        let view = self.model.view();
        match view.album {
            Some(album) => {
                info!("inserted {} by {}", album.name, album.artist);
                Ok(album)
            }
            None => Err(Error::aborted("album was ejected while loading")),
        }
    }

    /// Searches albums by free text. An empty query finds nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the search request fails.
    pub async fn search_albums(&self, query: &str) -> Result<Vec<Album>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        self.remote.search_albums(query, Self::SEARCH_LIMIT).await
    }

    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn dispatch(&self, action: Action) -> Result<()> {
        self.dispatcher.dispatch(action).await
    }

    #[must_use]
    pub fn view(&self) -> PlaybackView {
        self.model.view()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackView> {
        self.model.subscribe()
    }

    /// Sender for device events.
    #[must_use]
    pub fn events(&self) -> mpsc::Sender<Event> {
        self.events.clone()
    }

    #[must_use]
    pub fn remote(&self) -> Arc<dyn Remote> {
        Arc::clone(&self.remote)
    }

    #[must_use]
    pub fn device(&self) -> Option<String> {
        self.devices.device()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stops polling and forgets the album and the device.
    pub fn teardown(&self) {
        self.poller.stop();
        self.model.clear();
        self.devices.clear();
        debug!("session torn down");
    }

    /// Tears down and forgets the credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn sign_out(&self) -> Result<()> {
        self.teardown();
        self.auth.sign_out()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

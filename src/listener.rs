//! Routing of device events into the engine.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    auth::AuthSession, device::DeviceManager, events::Event, model::PlaybackStateModel,
};

pub struct Listener {
    auth: Arc<AuthSession>,
    devices: Arc<DeviceManager>,
    model: Arc<PlaybackStateModel>,
}

impl Listener {
    #[must_use]
    pub fn new(
        auth: Arc<AuthSession>,
        devices: Arc<DeviceManager>,
        model: Arc<PlaybackStateModel>,
    ) -> Self {
        Self {
            auth,
            devices,
            model,
        }
    }

    pub fn handle(&self, event: Event) {
        match event {
            Event::DeviceReady { device_id } => self.devices.on_device_ready(device_id),
            Event::PlaybackChanged(snapshot) => self.model.apply_snapshot(&snapshot),
            Event::AccountError { message } => {
                error!("account error: {message}");
            }
            Event::AuthenticationError { message } => {
                error!("authentication error: {message}");
                self.auth.forget_token();
            }
        }
    }

    /// Handles events until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Event>) {
        while let Some(event) = rx.recv().await {
            trace!("event: {event:?}");
            self.handle(event);
        }

        debug!("event channel closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::{
        config::Config,
        model::{tests::loaded, PlaybackSnapshot, Status},
        store::{MemoryStore, Stored},
    };

    fn signed_in() -> Arc<AuthSession> {
        let store = MemoryStore::with(Stored {
            token: Some("bearer".to_owned()),
            token_expiry: Some(SystemTime::now() + Duration::from_secs(600)),
            ..Stored::default()
        });
        let config = Config::with_client_id("client").unwrap();
        Arc::new(AuthSession::new(&config, store).unwrap())
    }

    #[tokio::test]
    async fn routes_events_until_closed() {
        let auth = signed_in();
        let devices = Arc::new(DeviceManager::new(None));
        let model = Arc::new(loaded());
        let listener = Listener::new(auth.clone(), devices.clone(), model.clone());

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(listener.run(rx));

        tx.send(Event::DeviceReady {
            device_id: "d1".to_owned(),
        })
        .await
        .unwrap();
        tx.send(Event::PlaybackChanged(PlaybackSnapshot {
            track_uri: Some("spotify:track:t3".to_owned()),
            position: Duration::from_secs(3),
            playing: true,
        }))
        .await
        .unwrap();
        tx.send(Event::AccountError {
            message: "premium required".to_owned(),
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(devices.device().as_deref(), Some("d1"));
        assert_eq!(model.view().index, 2);
        assert_eq!(model.status(), Status::Playing);
        assert!(auth.has_credential());
    }

    #[test]
    fn authentication_error_drops_credential() {
        let auth = signed_in();
        let listener = Listener::new(
            auth.clone(),
            Arc::new(DeviceManager::new(None)),
            Arc::new(PlaybackStateModel::new()),
        );

        listener.handle(Event::AuthenticationError {
            message: "invalid token".to_owned(),
        });
        assert!(!auth.has_credential());
    }
}

//! Tracking of the single playback device.
//!
//! The device becomes known asynchronously through a
//! [`DeviceReady`](Event::DeviceReady) event. Commands that need a device
//! wait for it with a bound through [`DeviceManager::ensure_ready`].

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::mpsc;

use crate::{
    error::{DeviceTimeoutError, Error, ErrorKind, Result},
    events::Event,
    protocol::player::Device,
    remote::{LocalPlayer, Remote},
};

pub struct DeviceManager {
    device: Mutex<Option<String>>,
    local: Option<Arc<dyn LocalPlayer>>,
}

impl DeviceManager {
    /// How often [`ensure_ready`](Self::ensure_ready) checks for a device.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(120);

    #[must_use]
    pub fn new(local: Option<Arc<dyn LocalPlayer>>) -> Self {
        Self {
            device: Mutex::new(None),
            local,
        }
    }

    /// Records the device reported ready. A later report replaces it.
    pub fn on_device_ready(&self, device_id: impl Into<String>) {
        let device_id = device_id.into();
        info!("device {device_id} ready");
        *self.device.lock().unwrap_or_else(PoisonError::into_inner) = Some(device_id);
    }

    #[must_use]
    pub fn device(&self) -> Option<String> {
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[must_use]
    pub fn local(&self) -> Option<&Arc<dyn LocalPlayer>> {
        self.local.as_ref()
    }

    /// Primes the local player, if there is one.
    ///
    /// Best effort: a player that cannot be activated now may still work
    /// once the device is ready.
    pub async fn activate(&self) {
        if let Some(local) = &self.local {
            if let Err(e) = local.activate().await {
                trace!("activating local player: {e}");
            }
        }
    }

    /// Returns the device identifier, waiting at most `timeout` for one to
    /// become ready.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceTimeoutError`] if no device became ready in time.
    pub async fn ensure_ready(&self, timeout: Duration) -> Result<String> {
        if let Some(device_id) = self.device() {
            return Ok(device_id);
        }

        self.activate().await;

        let wait = async {
            let mut interval = tokio::time::interval(Self::POLL_INTERVAL);
            loop {
                interval.tick().await;
                if let Some(device_id) = self.device() {
                    break device_id;
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            debug!("no device after {}ms", timeout.as_millis());
            DeviceTimeoutError { timeout }.into()
        })
    }
}

/// Waits for a usable device on the service and announces it.
///
/// Polls the device list every `interval` until a device named `name` shows
/// up, or without a name, until any device is active. Then emits
/// [`Event::DeviceReady`] and returns. Transient failures are retried; a
/// rejected credential is reported as [`Event::AuthenticationError`] and
/// ends discovery.
///
/// # Errors
///
/// Returns the error that ended discovery.
pub async fn discover(
    remote: &dyn Remote,
    name: Option<&str>,
    events: mpsc::Sender<Event>,
    interval: Duration,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let devices = match remote.devices().await {
            Ok(devices) => devices,
            Err(e) if e.kind == ErrorKind::Unauthenticated => {
                let message = e.to_string();
                // The listener may already be gone during shutdown.
                let _ = events.send(Event::AuthenticationError { message }).await;
                return Err(e);
            }
            Err(e) => {
                debug!("listing devices: {e}");
                continue;
            }
        };

        if let Some(device_id) = select(&devices, name) {
            events
                .send(Event::DeviceReady { device_id })
                .await
                .map_err(|e| Error::cancelled(e.to_string()))?;
            return Ok(());
        }

        trace!("waiting for device {}", name.unwrap_or("(active)"));
    }
}

fn select(devices: &[Device], name: Option<&str>) -> Option<String> {
    devices
        .iter()
        .filter(|device| !device.is_restricted)
        .find(|device| match name {
            Some(name) => device.name.eq_ignore_ascii_case(name),
            None => device.is_active,
        })
        .and_then(|device| device.id.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::mock::MockRemote;

    #[derive(Default)]
    struct Activations(AtomicUsize);

    #[async_trait]
    impl LocalPlayer for Activations {
        async fn activate(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::unavailable("no audio output"))
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_device() {
        let devices = DeviceManager::new(None);
        let timeout = Duration::from_millis(300);

        let started = tokio::time::Instant::now();
        let err = devices.ensure_ready(timeout).await.unwrap_err();
        assert_eq!(
            err.downcast::<DeviceTimeoutError>(),
            Some(&DeviceTimeoutError { timeout })
        );
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
        assert!(started.elapsed() >= timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn known_device_returns_immediately() {
        let devices = DeviceManager::new(None);
        devices.on_device_ready("d1");

        let started = tokio::time::Instant::now();
        let device = devices.ensure_ready(Duration::from_millis(300)).await;
        assert_eq!(device.unwrap(), "d1");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_device_ready() {
        let devices = Arc::new(DeviceManager::new(None));

        let ready = Arc::clone(&devices);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ready.on_device_ready("d1");
        });

        let device = devices.ensure_ready(Duration::from_millis(900)).await;
        assert_eq!(device.unwrap(), "d1");
    }

    #[tokio::test(start_paused = true)]
    async fn activation_failure_is_ignored() {
        let local = Arc::new(Activations::default());
        let devices = DeviceManager::new(Some(local.clone() as Arc<dyn LocalPlayer>));

        assert!(devices.ensure_ready(Duration::from_millis(300)).await.is_err());
        assert_eq!(local.0.load(Ordering::SeqCst), 1);

        devices.on_device_ready("d1");
        devices.clear();
        assert_eq!(devices.device(), None);
    }

    fn device(id: &str, name: &str, is_active: bool) -> Device {
        Device {
            id: Some(id.to_owned()),
            is_active,
            is_restricted: false,
            name: name.to_owned(),
            kind: "Computer".to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn discovers_named_device() {
        let remote = MockRemote::default();
        *remote.devices.lock().unwrap() = vec![
            device("d1", "Phone", true),
            device("d2", "Kitchen", false),
        ];
        let (tx, mut rx) = mpsc::channel(4);

        discover(&remote, Some("kitchen"), tx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Event::DeviceReady {
                device_id: "d2".to_owned()
            })
        );
    }

    #[test]
    fn selects_active_device_without_name() {
        let devices = [device("d1", "Phone", false), device("d2", "Web", true)];
        assert_eq!(select(&devices, None).as_deref(), Some("d2"));
        assert_eq!(select(&devices, Some("TV")), None);
    }
}

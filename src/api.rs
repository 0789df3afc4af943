//! Spotify Web API client.
//!
//! Implements [`Remote`] over the player and catalog endpoints. Every request
//! asks the [`AuthSession`] for a token first, so an expired session fails
//! fast with `Unauthenticated` instead of sending a stale bearer.
//!
//! Responses are classified by status:
//! * `204 No Content` carries no body and reads as `None`
//! * other successes are parsed as JSON where a body is expected
//! * everything else becomes an [`ApiError`] with the response body

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    StatusCode,
};
use serde::Serialize;
use url::Url;

use crate::{
    auth::AuthSession,
    config::Config,
    error::{ApiError, Error, Result},
    http::Client as HttpClient,
    model::{Album, PlaybackSnapshot},
    protocol::{
        self,
        catalog::{self, Search},
        player::{Device, Devices, Offset, Play, PlaybackState, Transfer},
    },
    remote::{PlayRequest, Remote},
};

pub struct WebApi {
    auth: Arc<AuthSession>,
    http_client: HttpClient,
    api_url: Url,
}

impl WebApi {
    /// Market that lets the service decide playability from the account.
    const MARKET: &'static str = "from_token";

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, auth: Arc<AuthSession>) -> Result<Self> {
        Ok(Self {
            auth,
            http_client: HttpClient::new(config)?,
            api_url: config.api_url.clone(),
        })
    }

    /// Builds an endpoint URL from path segments, escaping each of them.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::invalid_argument(format!("{} cannot be a base", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn device_endpoint(&self, segments: &[&str], device: &str) -> Result<Url> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut().append_pair("device_id", device);
        Ok(url)
    }

    /// Sends `request` with the current bearer token.
    ///
    /// Returns the response body, or `None` for an empty or `204` response.
    async fn send(&self, mut request: reqwest::Request) -> Result<Option<String>> {
        let token = self
            .auth
            .current_token()
            .ok_or_else(|| Error::unauthenticated("not connected to Spotify"))?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))?;
        bearer.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let method = request.method().clone();
        let path = request.url().path().to_owned();
        let response = self.http_client.execute(request).await?;
        let status = response.status();
        trace!("{method} {path}: {status}");

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError { status, body }.into());
        }

        Ok((!body.is_empty()).then_some(body))
    }

    async fn get<T>(&self, url: Url, origin: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de> + std::fmt::Debug,
    {
        let request = self.http_client.get(url, "");
        match self.send(request).await? {
            Some(body) => protocol::json(&body, origin).map(Some),
            None => Ok(None),
        }
    }

    async fn put_json<T>(&self, url: Url, body: &T) -> Result<()>
    where
        T: Serialize,
    {
        let body = serde_json::to_string(body)?;
        let mut request = self.http_client.put(url, body);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.send(request).await.map(drop)
    }
}

#[async_trait]
impl Remote for WebApi {
    async fn playback(&self) -> Result<Option<PlaybackSnapshot>> {
        let url = self.endpoint(&["me", "player"])?;
        let state: Option<PlaybackState> = self.get(url, "playback state").await?;
        Ok(state.map(PlaybackSnapshot::from))
    }

    async fn transfer(&self, device: &str) -> Result<()> {
        let url = self.endpoint(&["me", "player"])?;
        let body = Transfer {
            device_ids: [device],
            play: false,
        };
        self.put_json(url, &body).await
    }

    async fn play_context(&self, device: &str, request: &PlayRequest) -> Result<()> {
        let url = self.device_endpoint(&["me", "player", "play"], device)?;
        let body = Play {
            context_uri: &request.context_uri,
            offset: Offset {
                position: request.offset,
            },
            position_ms: request.position,
        };
        self.put_json(url, &body).await
    }

    async fn pause(&self, device: &str) -> Result<()> {
        let url = self.device_endpoint(&["me", "player", "pause"], device)?;
        let request = self.http_client.put(url, "");
        self.send(request).await.map(drop)
    }

    async fn next(&self, device: &str) -> Result<()> {
        let url = self.device_endpoint(&["me", "player", "next"], device)?;
        let request = self.http_client.post(url, "");
        self.send(request).await.map(drop)
    }

    async fn previous(&self, device: &str) -> Result<()> {
        let url = self.device_endpoint(&["me", "player", "previous"], device)?;
        let request = self.http_client.post(url, "");
        self.send(request).await.map(drop)
    }

    async fn devices(&self) -> Result<Vec<Device>> {
        let url = self.endpoint(&["me", "player", "devices"])?;
        let devices: Option<Devices> = self.get(url, "devices").await?;
        Ok(devices.unwrap_or_default().devices)
    }

    async fn album(&self, id: &str) -> Result<Album> {
        let mut url = self.endpoint(&["albums", id])?;
        url.query_pairs_mut().append_pair("market", Self::MARKET);

        let album: Option<catalog::Album> = self.get(url, "album").await?;
        album
            .map(Album::from)
            .ok_or_else(|| Error::not_found(format!("album {id} not found")))
    }

    async fn search_albums(&self, query: &str, limit: usize) -> Result<Vec<Album>> {
        let mut url = self.endpoint(&["search"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("type", "album")
            .append_pair("limit", &limit.to_string());

        let search: Option<Search> = self.get(url, "search").await?;
        Ok(search
            .and_then(|search| search.albums)
            .map(|page| page.items.into_iter().map(Album::from).collect())
            .unwrap_or_default())
    }
}

//! Authorization code flow with PKCE.
//!
//! The flow has two halves separated by a browser redirect:
//!
//! 1. [`AuthSession::begin_authorization`] generates a [`PkceChallenge`],
//!    persists the verifier and state nonce, and returns the authorize URL
//!    the user agent must be sent to.
//! 2. [`AuthSession::complete_authorization`] takes the callback the
//!    service redirected to, checks the state nonce against the persisted
//!    one and exchanges the code and verifier for a bearer token.
//!
//! Afterwards [`AuthSession::current_token`] hands out the token until it
//! expires. There is no refresh: an expired session authorizes again.

use std::{
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use url::{form_urlencoded, Url};

use crate::{
    config::Config,
    error::{AuthError, Result},
    http::Client as HttpClient,
    pkce::PkceChallenge,
    protocol::{self, auth::TokenResponse},
    store::SessionStore,
    token::AuthToken,
};

/// Where to send the user agent to start authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Fully formed authorize URL.
    pub url: Url,
    pub scopes: Vec<String>,
    pub challenge: String,
    pub state: String,
}

/// Result of a successful callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub expires_at: SystemTime,

    /// The redirect target without the code and state. Anything that kept
    /// the callback URL around (history, logs, a browser tab) should be
    /// replaced by this.
    pub clean_url: Url,
}

/// Query parameters of the authorization callback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl Callback {
    /// Accepts the complete callback URL or just its query string.
    fn parse(callback: &str) -> Self {
        let query = match Url::parse(callback) {
            Ok(url) => url.query().unwrap_or_default().to_owned(),
            Err(_) => callback.trim_start_matches('?').to_owned(),
        };

        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }

        params
    }
}

pub struct AuthSession {
    client_id: String,
    redirect_uri: Url,
    scopes: Vec<String>,
    scope: String,
    accounts_url: Url,

    http_client: HttpClient,
    store: Box<dyn SessionStore>,
    token: Mutex<Option<AuthToken>>,
}

impl AuthSession {
    /// Creates a session, resuming a stored token if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the store
    /// cannot be read.
    pub fn new<S>(config: &Config, store: S) -> Result<Self>
    where
        S: SessionStore + 'static,
    {
        let stored = store.load()?;
        let token = match (stored.token, stored.token_expiry) {
            (Some(token), Some(expires_at)) => Some(AuthToken::new(token, expires_at)),
            _ => None,
        };
        if let Some(ref token) = token {
            debug!(
                "stored token has {}s to live",
                token.time_to_live().as_secs()
            );
        }

        Ok(Self {
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            scope: config.scope(),
            accounts_url: config.accounts_url.clone(),
            http_client: HttpClient::new(config)?,
            store: Box::new(store),
            token: Mutex::new(token),
        })
    }

    /// Starts authorization: generates and persists a fresh challenge, and
    /// returns the request to redirect the user agent to.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge cannot be persisted.
    pub fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        let pkce = PkceChallenge::generate();

        let mut stored = self.store.load()?;
        stored.pkce_verifier = Some(pkce.verifier().to_owned());
        stored.oauth_state = Some(pkce.state().to_owned());
        self.store.save(&stored)?;

        let mut url = self.accounts_url.join("authorize")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scope)
            .append_pair("code_challenge_method", PkceChallenge::METHOD)
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("state", pkce.state());

        debug!("authorization started");
        Ok(AuthorizationRequest {
            url,
            scopes: self.scopes.clone(),
            challenge: pkce.challenge().to_owned(),
            state: pkce.state().to_owned(),
        })
    }

    /// Completes authorization from the callback URL or its query string.
    ///
    /// The persisted verifier and nonce are consumed whatever the outcome.
    ///
    /// # Errors
    ///
    /// * [`AuthError::Denied`] if the service reported an error
    /// * [`AuthError::StateMismatch`] if nothing was persisted or the nonce
    ///   differs from the persisted one
    /// * [`AuthError::MissingCode`] if the callback carries no code
    /// * [`AuthError::ExchangeFailed`] if the token endpoint refuses
    pub async fn complete_authorization(&self, callback: &str) -> Result<CallbackOutcome> {
        let callback = Callback::parse(callback);

        let mut stored = self.store.load()?;
        let verifier = stored.pkce_verifier.take();
        let saved_state = stored.oauth_state.take();
        self.store.save(&stored)?;

        if let Some(error) = callback.error {
            return Err(AuthError::Denied {
                error,
                description: callback.error_description,
            }
            .into());
        }

        let verifier = match (verifier, saved_state, callback.state) {
            (Some(verifier), Some(saved), Some(incoming)) if saved == incoming => verifier,
            _ => return Err(AuthError::StateMismatch.into()),
        };

        let code = callback.code.ok_or(AuthError::MissingCode)?;
        let token = self.exchange(&code, &verifier).await?;
        let expires_at = token.expires_at();

        stored.token = Some(token.as_str().to_owned());
        stored.token_expiry = Some(expires_at);
        self.store.save(&stored)?;
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);

        info!("connected to Spotify");
        Ok(CallbackOutcome {
            expires_at,
            clean_url: self.redirect_uri.clone(),
        })
    }

    async fn exchange(&self, code: &str, verifier: &str) -> Result<AuthToken> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("code_verifier", verifier)
            .finish();

        let url = self.accounts_url.join("api/token")?;
        let mut request = self.http_client.post(url, body);
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!("token exchange refused with {status}");
            return Err(AuthError::ExchangeFailed { status, body }.into());
        }

        let issued_at = SystemTime::now();
        let response: TokenResponse = protocol::json(&body, "token")?;
        Ok(AuthToken::issued(
            response.access_token,
            issued_at,
            response.expires_in,
        ))
    }

    /// The bearer token, if there is one that has not expired.
    ///
    /// Check before every remote call rather than holding on to the result.
    #[must_use]
    pub fn current_token(&self) -> Option<AuthToken> {
        self.current_token_at(SystemTime::now())
    }

    /// The bearer token if it is still valid at `now`.
    #[must_use]
    pub fn current_token_at(&self, now: SystemTime) -> Option<AuthToken> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|token| token.is_valid_at(now))
            .cloned()
    }

    /// Whether a session can be resumed without authorizing again.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.current_token().is_some()
    }

    /// Drops the in-memory token, for example after the service rejected
    /// it. The stored copy is left for [`sign_out`](Self::sign_out).
    pub fn forget_token(&self) {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Forgets the token and any pending authorization.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn sign_out(&self) -> Result<()> {
        self.forget_token();
        self.store.save(&crate::store::Stored::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        error::Error,
        store::{MemoryStore, Stored},
    };

    fn config() -> Config {
        Config::with_client_id("client").unwrap()
    }

    fn auth_error(err: &Error) -> Option<&AuthError> {
        err.downcast::<AuthError>()
    }

    #[test]
    fn authorize_url_carries_challenge_and_state() {
        let session = AuthSession::new(&config(), MemoryStore::new()).unwrap();
        let request = session.begin_authorization().unwrap();

        assert_eq!(request.url.path(), "/authorize");
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("client_id"), Some("client"));
        assert_eq!(get("code_challenge_method"), Some("S256"));
        assert_eq!(get("code_challenge"), Some(request.challenge.as_str()));
        assert_eq!(get("state"), Some(request.state.as_str()));
        assert_eq!(get("redirect_uri"), Some(Config::DEFAULT_REDIRECT_URI));
        assert_eq!(get("scope"), Some(Config::SCOPES.join(" ").as_str()));
    }

    #[test]
    fn begin_persists_verifier_matching_the_challenge() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let session = AuthSession::new(&config(), SharedStore(store.clone())).unwrap();
        let request = session.begin_authorization().unwrap();

        let stored = store.load().unwrap();
        let verifier = stored.pkce_verifier.unwrap();
        assert_eq!(PkceChallenge::challenge_for(&verifier), request.challenge);
        assert_eq!(stored.oauth_state.as_deref(), Some(request.state.as_str()));
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected() {
        let session = AuthSession::new(&config(), MemoryStore::new()).unwrap();

        let forgeries: [fn(&str) -> String; 4] = [
            |_| String::new(),
            |_| "x".to_owned(),
            |state| state[1..].to_owned(),
            |state| format!("{state}x"),
        ];

        for forge in forgeries {
            let request = session.begin_authorization().unwrap();
            let forged = forge(&request.state);
            let err = session
                .complete_authorization(&format!("?code=abc&state={forged}"))
                .await
                .unwrap_err();
            assert_eq!(auth_error(&err), Some(&AuthError::StateMismatch));
        }
        assert!(!session.has_credential());
    }

    #[tokio::test]
    async fn callback_without_pending_authorization_is_rejected() {
        let session = AuthSession::new(&config(), MemoryStore::new()).unwrap();
        let err = session
            .complete_authorization("http://127.0.0.1:5500/?code=abc&state=abc")
            .await
            .unwrap_err();
        assert_eq!(auth_error(&err), Some(&AuthError::StateMismatch));
    }

    #[tokio::test]
    async fn challenge_is_consumed_by_first_callback() {
        let session = AuthSession::new(&config(), MemoryStore::new()).unwrap();
        let request = session.begin_authorization().unwrap();

        // A denied callback still consumes the pending challenge.
        let callback = format!("?error=access_denied&state={}", request.state);
        let err = session.complete_authorization(&callback).await.unwrap_err();
        assert!(matches!(auth_error(&err), Some(AuthError::Denied { .. })));

        let callback = format!("?code=abc&state={}", request.state);
        let err = session.complete_authorization(&callback).await.unwrap_err();
        assert_eq!(auth_error(&err), Some(&AuthError::StateMismatch));
    }

    #[test]
    fn stored_token_is_resumed_until_expiry() {
        let expires_at = SystemTime::now() + Duration::from_secs(600);
        let store = MemoryStore::with(Stored {
            token: Some("bearer".to_owned()),
            token_expiry: Some(expires_at),
            ..Stored::default()
        });
        let session = AuthSession::new(&config(), store).unwrap();

        assert!(session.has_credential());
        assert_eq!(
            session
                .current_token_at(expires_at - Duration::from_millis(1))
                .map(|token| token.to_string()),
            Some("bearer".to_owned())
        );
        assert!(session.current_token_at(expires_at).is_none());
        assert!(session
            .current_token_at(expires_at + Duration::from_secs(1))
            .is_none());
    }

    #[test]
    fn sign_out_forgets_everything() {
        let store = MemoryStore::with(Stored {
            token: Some("bearer".to_owned()),
            token_expiry: Some(SystemTime::now() + Duration::from_secs(600)),
            ..Stored::default()
        });
        let session = AuthSession::new(&config(), store).unwrap();
        session.sign_out().unwrap();
        assert!(!session.has_credential());
    }

    #[test]
    fn parses_full_urls_and_bare_queries() {
        let full = Callback::parse("http://127.0.0.1:5500/?code=a%20b&state=s");
        let bare = Callback::parse("code=a+b&state=s");
        assert_eq!(full, bare);
        assert_eq!(full.code.as_deref(), Some("a b"));
    }

    /// Lets a test keep a handle on the store it gave away.
    struct SharedStore(std::sync::Arc<MemoryStore>);

    impl SessionStore for SharedStore {
        fn load(&self) -> Result<Stored> {
            self.0.load()
        }

        fn save(&self, stored: &Stored) -> Result<()> {
            self.0.save(stored)
        }
    }
}

//! Configuration of the DiscSpin session.
//!
//! The configuration is read from a small TOML file:
//!
//! ```toml
//! client_id = "1fc2d3fa12034bb283fc7e8a72b5d9ba"
//! redirect_uri = "http://127.0.0.1:5500/"
//! device_name = "Living Room"
//! poll_interval_ms = 1000
//! ```
//!
//! Only `client_id` is required. Endpoints can be overridden with
//! `accounts_url` and `api_url`, which is how the tests point the client
//! at a local mock server.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    pub user_agent: String,

    /// OAuth client identifier registered with the streaming service.
    pub client_id: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,

    /// Base of the accounts service, hosting `/authorize` and `/api/token`.
    pub accounts_url: Url,

    /// Base of the Web API, including its version path.
    pub api_url: Url,

    /// How often the remote playback state is reconciled.
    pub poll_interval: Duration,

    /// Name of the playback device to control. `None` picks whatever device
    /// is active.
    pub device_name: Option<String>,
}

/// On-disk representation of [`Config`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct File {
    client_id: String,
    redirect_uri: Option<Url>,
    scopes: Option<Vec<String>>,
    accounts_url: Option<Url>,
    api_url: Option<Url>,
    poll_interval_ms: Option<u64>,
    device_name: Option<String>,
}

impl Config {
    pub const DEFAULT_REDIRECT_URI: &'static str = "http://127.0.0.1:5500/";
    pub const DEFAULT_ACCOUNTS_URL: &'static str = "https://accounts.spotify.com/";
    pub const DEFAULT_API_URL: &'static str = "https://api.spotify.com/v1/";
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Scopes needed to stream and to read and modify playback state.
    pub const SCOPES: [&'static str; 5] = [
        "streaming",
        "user-read-email",
        "user-read-private",
        "user-modify-playback-state",
        "user-read-playback-state",
    ];

    /// Placeholder shipped in the example configuration.
    const CLIENT_ID_PLACEHOLDER: &'static str = "YOUR_SPOTIFY_CLIENT_ID";

    /// Upper bound on the configuration file size.
    const MAX_FILE_SIZE: u64 = 4096;

    /// Creates a configuration with default endpoints for `client_id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the client id is empty or still the
    /// placeholder, or if no valid `User-Agent` can be built.
    pub fn with_client_id(client_id: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.is_empty() || client_id == Self::CLIENT_ID_PLACEHOLDER {
            return Err(Error::invalid_argument(
                "set your Spotify client id before connecting",
            ));
        }

        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let user_agent = user_agent(&app_name, &app_version)?;
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,
            user_agent,
            client_id,
            redirect_uri: Url::parse(Self::DEFAULT_REDIRECT_URI)?,
            scopes: Self::SCOPES.iter().map(ToString::to_string).collect(),
            accounts_url: Url::parse(Self::DEFAULT_ACCOUNTS_URL)?,
            api_url: Url::parse(Self::DEFAULT_API_URL)?,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            device_name: None,
        })
    }

    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is oversized, is not
    /// valid TOML or misses the client id.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: the file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    /// Scopes joined the way the authorize endpoint expects them.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

impl std::str::FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let file: File = toml::from_str(s)?;

        let mut config = Self::with_client_id(file.client_id)?;
        if let Some(redirect_uri) = file.redirect_uri {
            config.redirect_uri = redirect_uri;
        }
        if let Some(scopes) = file.scopes {
            config.scopes = scopes;
        }
        if let Some(url) = file.accounts_url {
            config.accounts_url = with_trailing_slash(url);
        }
        if let Some(url) = file.api_url {
            config.api_url = with_trailing_slash(url);
        }
        if let Some(millis) = file.poll_interval_ms {
            if millis == 0 {
                return Err(Error::invalid_argument("poll interval must not be zero"));
            }
            config.poll_interval = Duration::from_millis(millis);
        }
        config.device_name = file.device_name.filter(|name| !name.is_empty());

        Ok(config)
    }
}

/// Builds a `User-Agent` of the form `name/version (Rust; os/version)`.
fn user_agent(app_name: &str, app_version: &str) -> Result<String> {
    // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
    let illegal_chars = |chr| chr == '/' || chr == ';';
    if app_name.is_empty()
        || app_name.contains(illegal_chars)
        || app_version.is_empty()
        || app_version.contains(illegal_chars)
    {
        return Err(Error::invalid_argument(format!(
            "application name and/or version invalid (\"{app_name}\"; \"{app_version}\")"
        )));
    }

    let os_name = match std::env::consts::OS {
        "macos" => "osx",
        other => other,
    };
    let os_version = sysinfo::System::os_version()
        .filter(|version| !version.is_empty() && !version.contains(illegal_chars))
        .unwrap_or_else(|| String::from("0"));

    Ok(format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})"))
}

/// Relative joins drop the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_spotify() {
        let config = Config::with_client_id("abc").unwrap();
        assert_eq!(config.accounts_url.as_str(), "https://accounts.spotify.com/");
        assert_eq!(
            config.api_url.join("me/player").unwrap().as_str(),
            "https://api.spotify.com/v1/me/player"
        );
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.scope().starts_with("streaming user-read-email"));
        assert!(config.user_agent.starts_with("discspin/"));
    }

    #[test]
    fn rejects_placeholder_client_id() {
        assert!(Config::with_client_id("YOUR_SPOTIFY_CLIENT_ID").is_err());
        assert!(Config::with_client_id("").is_err());
    }

    #[test]
    fn parses_overrides() {
        let config: Config = r#"
            client_id = "abc"
            api_url = "http://127.0.0.1:9000/v1"
            poll_interval_ms = 250
            device_name = "Kitchen"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:9000/v1/");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.device_name.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let result = "client_id = \"abc\"\nclient_secret = \"nope\"".parse::<Config>();
        assert!(result.is_err());
    }
}

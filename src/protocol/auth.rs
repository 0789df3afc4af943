//! Token endpoint response types.
//!
//! # Example Response
//!
//! ```json
//! {
//!     "access_token": "BQD...",
//!     "token_type": "Bearer",
//!     "scope": "streaming user-read-email",
//!     "expires_in": 3600,
//!     "refresh_token": "AQC..."
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use veil::Redact;

/// Bearer credential granted by the token endpoint.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Redact, Hash)]
pub struct TokenResponse {
    /// Bearer token for API authentication
    #[redact]
    pub access_token: String,

    /// Usually `Bearer`
    #[serde(default)]
    pub token_type: String,

    /// Space separated scopes that were actually granted
    #[serde(default)]
    pub scope: String,

    /// How long the token remains valid from the moment it was issued
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub expires_in: Duration,

    /// Not used: expired sessions go through authorization again
    #[redact]
    #[serde(default)]
    pub refresh_token: Option<String>,
}

//! # discspin
//!
//! A compact-disc style remote for Spotify: insert an album, press play, and
//! the album plays on one of your Spotify Connect devices.
//!
//! The crate is the playback-control and state-reconciliation engine behind
//! that experience. It:
//!
//! * authorizes against the Spotify accounts service with PKCE
//!   ([`auth`], [`pkce`], [`token`], [`store`])
//! * tracks the readiness of a single playback device ([`device`])
//! * keeps a local model of what is loaded and playing ([`model`]),
//!   merged from a push event stream ([`events`], [`listener`]) and a
//!   periodic poll ([`poller`])
//! * dispatches transport commands with single-flight execution and
//!   fallbacks ([`dispatcher`])
//!
//! [`session::Session`] wires everything together; [`api::WebApi`] talks to
//! the Spotify Web API behind the [`remote::Remote`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use discspin::{config::Config, dispatcher::Action, session::Session, store::FileStore};
//!
//! # async fn example() -> discspin::error::Result<()> {
//! let config = Config::with_client_id("1fc2d3fa12034bb283fc7e8a72b5d9ba")?;
//! let session = Session::new(config, FileStore::new("session.toml"), None)?;
//!
//! if !session.has_credential() {
//!     let request = session.begin_authorization()?;
//!     println!("open {}", request.url);
//!     return Ok(());
//! }
//!
//! session.insert_album("4aawyAB9vmqN3uQ7FjRGTy").await?;
//! session.dispatch(Action::Play).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod api;
pub mod auth;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod http;
pub mod listener;
pub mod model;
pub mod pkce;
pub mod poller;
pub mod protocol;
pub mod remote;
pub mod session;
pub mod signal;
pub mod store;
pub mod token;

#[cfg(test)]
mod mock;

//! Pure API client for purelink.
//!
//! The only crate that speaks HTTP. Implements
//! [`purelink_recon::Registry`] against a Pure instance and stores the
//! credentials saved by `purelink login`.
//!
//! No retries: a failed call is reported once and re-running the batch is
//! the retry mechanism.

mod auth;
mod client;

pub use auth::{
    credentials_path, delete_credentials, load_credentials, load_credentials_from,
    save_credentials, save_credentials_to, CredentialsError, PureCredentials,
};
pub use client::{sanitize_api_key, PureClient, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT_SECS};

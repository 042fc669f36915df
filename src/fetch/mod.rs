//! HTTP fetching of realtime feeds behind a pluggable client.
//!
//! [`HttpClient`] is the seam: [`BasicClient`] talks to the network, and the
//! wrappers in [`auth`] decorate any client with an API key.

mod basic;
pub(crate) mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};

/// GETs `url` through `client` and returns the body.
///
/// Non-success statuses are errors.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse().with_context(|| format!("invalid feed URL '{url}'"))?,
    );

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

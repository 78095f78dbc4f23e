//! Unofficial [Autodesk Forge](https://forge.autodesk.com) SDK.
//!
//! This crate supplies typed clients for a subset of the Forge REST APIs:
//! the Authentication (OAuth2) service, the Data Management object storage
//! service (OSS), and the Model Derivative service.
//!
//! Every client takes a token provider that supplies access tokens for its
//! requests. Use [`OAuthTokenProvider`] if you have your app's client ID and
//! client secret available, [`StaticTokenProvider`] if you would like to use
//! an existing access token instead, or your own implementation of the
//! [`TokenProvider`] trait.
//!
//! [`OAuthTokenProvider`]: crate::auth::OAuthTokenProvider
//! [`StaticTokenProvider`]: crate::auth::StaticTokenProvider
//! [`TokenProvider`]: crate::auth::TokenProvider
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use forge_sdk::auth::OAuthTokenProvider;
//! use forge_sdk::oss::OssClient;
//!
//! let provider = Arc::new(OAuthTokenProvider::new(
//!     std::env::var("FORGE_CLIENT_ID").unwrap(),
//!     std::env::var("FORGE_CLIENT_SECRET").unwrap(),
//! ));
//! let client = OssClient::new(provider);
//!
//! for bucket in client.list_all_buckets(None).await.unwrap() {
//!     println!("{}", bucket.bucket_key);
//! }
//! ```
//!
//! Tokens are requested lazily and cached until shortly before they expire,
//! so a client can be reused across many calls without re-authenticating.

use once_cell::sync::Lazy;
use reqwest::{Client, Url};

use crate::error::{ForgeError, Result};

pub mod auth;
pub mod error;
pub mod md;
pub mod oss;

pub(crate) static HTTP_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// Joins a base URL with additional path segments, percent-encoding each
/// segment (bucket keys, object keys and URNs may contain characters that
/// are not valid in a URL path).
pub(crate) fn endpoint_url(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ForgeError::InvalidInput(format!("invalid base URL '{}': {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| ForgeError::InvalidInput(format!("base URL '{}' cannot be a base", base_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_and_encodes_segments() {
        let url = endpoint_url("https://developer.api.autodesk.com/oss/v2", &["buckets"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://developer.api.autodesk.com/oss/v2/buckets"
        );

        let url = endpoint_url(
            "https://developer.api.autodesk.com/oss/v2/",
            &["buckets", "my-bucket", "objects", "folder/design one.dwg"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://developer.api.autodesk.com/oss/v2/buckets/my-bucket/objects/folder%2Fdesign%20one.dwg"
        );
    }

    #[test]
    fn endpoint_url_rejects_malformed_base() {
        assert!(endpoint_url("not a url", &["buckets"]).is_err());
    }
}

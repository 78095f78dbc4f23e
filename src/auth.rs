//! Clients and token providers for the Forge Authentication (OAuth2) service.
use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reqwest::Url;
use serde::Deserialize;

use crate::error::{ForgeError, Result};
use crate::HTTP_CLIENT;

/// Default base URL of the Forge Authentication service.
pub const DEFAULT_AUTH_BASE_URL: &str = "https://developer.api.autodesk.com/authentication/v1";

/// Cached tokens are refreshed this many seconds before their reported expiry.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Authentication scopes.
///
/// Each token request names the scopes the generated token should support;
/// the remote service grants a token limited to those permissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Read the end user's profile data, not including associated products
    /// and services.
    UserProfileRead,
    /// Read the end user's profile data, including associated products
    /// and services.
    UserRead,
    /// Create, update, and delete the end user's profile data.
    UserWrite,
    /// Read the end user's viewable data (e.g. PNG and SVF files).
    ViewablesRead,
    /// Read all the end user's data, viewable and non-viewable.
    DataRead,
    /// Create, update, and delete data on behalf of the end user.
    DataWrite,
    /// Create data on behalf of the end user.
    DataCreate,
    /// Search the end user's data.
    DataSearch,
    /// Create an OSS bucket the application will own.
    BucketCreate,
    /// Read the metadata and list contents of accessible OSS buckets.
    BucketRead,
    /// Set permissions and entitlements on OSS buckets.
    BucketUpdate,
    /// Delete a bucket the application has permission to delete.
    BucketDelete,
    /// Author and execute code on behalf of the end user (e.g. scripts
    /// processed by the Design Automation API).
    CodeAll,
    /// Read the account data the end user has entitlements to.
    AccountRead,
    /// Update the account data the end user has entitlements to.
    AccountWrite,
}

impl Scope {
    /// The string form sent to the token endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::UserProfileRead => "user-profile:read",
            Scope::UserRead => "user:read",
            Scope::UserWrite => "user:write",
            Scope::ViewablesRead => "viewables:read",
            Scope::DataRead => "data:read",
            Scope::DataWrite => "data:write",
            Scope::DataCreate => "data:create",
            Scope::DataSearch => "data:search",
            Scope::BucketCreate => "bucket:create",
            Scope::BucketRead => "bucket:read",
            Scope::BucketUpdate => "bucket:update",
            Scope::BucketDelete => "bucket:delete",
            Scope::CodeAll => "code:all",
            Scope::AccountRead => "account:read",
            Scope::AccountWrite => "account:write",
        }
    }
}

pub(crate) fn join_scopes(scopes: &[Scope]) -> String {
    scopes
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Access token generated by the two-legged (client credentials) flow.
#[derive(Clone, Debug, Deserialize)]
pub struct AccessToken {
    /// The token to send in `Authorization: Bearer` headers.
    pub access_token: String,
    /// Token type, always `"Bearer"`.
    pub token_type: String,
    /// Lifetime of the token in seconds.
    pub expires_in: u64,
    /// Space-separated list of granted scopes, when reported by the server.
    pub scope: Option<String>,
}

/// Access token generated by the three-legged (authorization code) flow
/// or by refreshing a previously issued token.
#[derive(Clone, Debug, Deserialize)]
pub struct RefreshableToken {
    /// The token to send in `Authorization: Bearer` headers.
    pub access_token: String,
    /// Token type, always `"Bearer"`.
    pub token_type: String,
    /// Lifetime of the token in seconds.
    pub expires_in: u64,
    /// Token that can be exchanged for a new access token once this one
    /// expires.
    pub refresh_token: String,
}

/// Profile of the authorizing end user.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub user_name: String,
    pub email_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email_verified: Option<bool>,
    pub country_code: Option<String>,
    pub language: Option<String>,
    pub last_modified: Option<String>,
}

/// Client of the Forge Authentication service.
///
/// The client is stateless aside from its base URL and can be shared
/// freely across callers.
///
/// API reference: <https://forge.autodesk.com/en/docs/oauth/v2/reference/http>
#[derive(Clone, Debug)]
pub struct AuthenticationClient {
    base_url: String,
}

impl AuthenticationClient {
    /// Creates a new client for the public Forge authentication endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_AUTH_BASE_URL)
    }

    /// Creates a new client with a custom base URL, e.g. for testing.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Generates the URL to redirect an end user to in order to acquire
    /// their consent for the app to access the specified resources.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Client ID of the app
    /// * `response_type` - Either `"code"` for the authorization code grant
    ///   flow or `"token"` for the implicit grant flow
    /// * `redirect_uri` - Callback URL the end user will be redirected to
    ///   after completing the authorization flow
    /// * `scopes` - Required scopes
    /// * `state` - Arbitrary payload passed back verbatim in a `state`
    ///   query parameter to the callback URL
    pub fn authorization_url(
        &self,
        client_id: &str,
        response_type: &str,
        redirect_uri: &str,
        scopes: &[Scope],
        state: Option<&str>,
    ) -> Result<Url> {
        if client_id.is_empty() {
            return Err(ForgeError::required("client_id"));
        }
        if redirect_uri.is_empty() {
            return Err(ForgeError::required("redirect_uri"));
        }
        let scope = join_scopes(scopes);
        let mut params = vec![
            ("response_type", response_type),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }
        Url::parse_with_params(&format!("{}/authorize", self.base_url), &params)
            .map_err(|e| ForgeError::InvalidInput(format!("invalid authorization URL: {}", e)))
    }

    /// Generates a two-legged access token for a specific set of scopes.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Client ID of the app
    /// * `client_secret` - Client secret of the app
    /// * `scopes` - Scopes the generated token should support
    ///
    /// # Returns
    ///
    /// The parsed token endpoint response. The call fails with
    /// [`ForgeError::Authentication`] when the token endpoint returns a
    /// non-success status.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &[Scope],
    ) -> Result<AccessToken> {
        if client_id.is_empty() {
            return Err(ForgeError::required("client_id"));
        }
        if client_secret.is_empty() {
            return Err(ForgeError::required("client_secret"));
        }
        let scope = join_scopes(scopes);
        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
            ("scope", scope.as_str()),
        ];
        let response = HTTP_CLIENT
            .post(format!("{}/authenticate", self.base_url))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ForgeError::authentication(response).await);
        }
        Ok(response.json::<AccessToken>().await?)
    }

    /// Exchanges an authorization code captured from the
    /// [`authorization_url`](Self::authorization_url) callback for a
    /// three-legged access token.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<RefreshableToken> {
        if client_id.is_empty() {
            return Err(ForgeError::required("client_id"));
        }
        if client_secret.is_empty() {
            return Err(ForgeError::required("client_secret"));
        }
        if code.is_empty() {
            return Err(ForgeError::required("code"));
        }
        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let response = HTTP_CLIENT
            .post(format!("{}/gettoken", self.base_url))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ForgeError::authentication(response).await);
        }
        Ok(response.json::<RefreshableToken>().await?)
    }

    /// Acquires a new access token using the refresh token provided by
    /// [`exchange_code`](Self::exchange_code).
    pub async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        scopes: &[Scope],
    ) -> Result<RefreshableToken> {
        if client_id.is_empty() {
            return Err(ForgeError::required("client_id"));
        }
        if client_secret.is_empty() {
            return Err(ForgeError::required("client_secret"));
        }
        if refresh_token.is_empty() {
            return Err(ForgeError::required("refresh_token"));
        }
        let scope = join_scopes(scopes);
        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];
        let response = HTTP_CLIENT
            .post(format!("{}/refreshtoken", self.base_url))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ForgeError::authentication(response).await);
        }
        Ok(response.json::<RefreshableToken>().await?)
    }

    /// Gets the profile of the authorizing end user in a three-legged
    /// context.
    pub async fn get_user_profile(&self, access_token: &str) -> Result<UserProfile> {
        if access_token.is_empty() {
            return Err(ForgeError::required("access_token"));
        }
        let response = HTTP_CLIENT
            .get(format!("{}/users/@me", self.base_url))
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ForgeError::request(response).await);
        }
        Ok(response.json::<UserProfile>().await?)
    }
}

impl Default for AuthenticationClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A trait for supplying access tokens to the resource clients.
///
/// The requested scopes are provided so that implementations can generate
/// tokens limited to the permissions each call actually needs. Use
/// [`OAuthTokenProvider`] if you have your app's client ID and client
/// secret available, [`StaticTokenProvider`] if you already have an access
/// token, or your own implementation for anything else (e.g. fetching
/// short-lived tokens from a backend route of your application).
#[async_trait]
pub trait TokenProvider: fmt::Debug + Send + Sync {
    /// Returns an access token valid for the given scopes.
    async fn get_token(&self, scopes: &[Scope]) -> Result<String>;
}

/// Token provider that hands out a fixed, caller-supplied access token.
///
/// The provider does not know when the token expires and never refreshes
/// it; the caller asserts its validity. Make sure the token supports all
/// the scopes that may be needed.
pub struct StaticTokenProvider {
    access_token: String,
}

// Custom implementation of Debug to avoid printing the token
impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("access_token", &"**********")
            .finish()
    }
}

impl StaticTokenProvider {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _scopes: &[Scope]) -> Result<String> {
        Ok(self.access_token.clone())
    }
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Token provider that automatically generates (and caches) access tokens
/// using specific app credentials.
///
/// One token is cached per requested scope set. A cached token is reused
/// until shortly before its reported expiry; after that the next call
/// performs a fresh client credentials exchange. The cache lock is not held
/// across the exchange, so concurrent callers may occasionally each request
/// a new token, which is wasteful but harmless.
pub struct OAuthTokenProvider {
    client_id: String,
    client_secret: String,
    auth_client: AuthenticationClient,
    cache: Mutex<HashMap<String, CachedToken>>,
}

// Custom implementation of Debug to avoid printing the client secret
impl fmt::Debug for OAuthTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"**********")
            .finish()
    }
}

impl OAuthTokenProvider {
    /// Creates a new provider that authenticates against the public Forge
    /// authentication endpoint.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_auth_client(client_id, client_secret, AuthenticationClient::new())
    }

    /// Creates a new provider with a custom authentication client, e.g.
    /// one pointed at a different base URL.
    pub fn with_auth_client(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_client: AuthenticationClient,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_client,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn get_token(&self, scopes: &[Scope]) -> Result<String> {
        let cache_key = join_scopes(scopes);
        let now = Utc::now();
        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.get(&cache_key) {
                if cached.expires_at > now + Duration::seconds(EXPIRY_MARGIN_SECONDS) {
                    return Ok(cached.access_token.clone());
                }
            }
        }
        tracing::debug!(scopes = %cache_key, "requesting a new access token");
        let auth = self
            .auth_client
            .authenticate(&self.client_id, &self.client_secret, scopes)
            .await?;
        let token = auth.access_token.clone();
        self.cache.lock().insert(
            cache_key,
            CachedToken {
                access_token: auth.access_token,
                expires_at: now + Duration::seconds(auth.expires_in as i64),
            },
        );
        Ok(token)
    }
}

//! Login, registration and the stored bearer token.
//!
//! The backend issues an opaque access token on login or registration. It is
//! kept in the [`PreferenceStore`](crate::prefs::PreferenceStore) under the
//! `token` key and sent as `Authorization: Bearer` on every later request.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use tracing::{info, warn};

use super::{ApiClient, Endpoint};
use crate::models::{ErrorBody, RegisterRequest, TokenResponse};
use crate::offline::{Network, Request};

/// Shown when the backend rejects credentials without saying why.
const DEFAULT_AUTH_ERROR: &str = "Authentication failed";

impl<N: Network> ApiClient<N> {
    /// Logs in with a username (the account email) and password.
    ///
    /// On success the token is stored and returned, and cached reads made
    /// under the previous identity are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`HalalTradeError::Auth`](crate::HalalTradeError::Auth) with
    /// the server's detail message if the credentials are rejected.
    pub async fn login(&self, username: &str, password: &str) -> crate::Result<String> {
        let url = self.url(&Endpoint::Login.path(), &[])?;
        let body = form_body(&url, &[("username", username), ("password", password)]);
        let request = Request::new(Method::POST, url)
            .with_header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .with_body(body);

        self.authenticate(request).await
    }

    /// Creates an account and logs in as it.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn register(&self, email: &str, password: &str) -> crate::Result<String> {
        let url = self.url(&Endpoint::Register.path(), &[])?;
        let body = serde_json::to_vec(&RegisterRequest { email, password })?;
        let request = Request::new(Method::POST, url)
            .with_header(CONTENT_TYPE, "application/json")
            .with_body(body);

        self.authenticate(request).await
    }

    /// Forgets the stored token and everything read with it.
    pub fn logout(&self) {
        self.prefs.clear_auth_token();
        self.cache.clear();
        info!("logged out");
    }

    /// Whether a bearer token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.prefs.auth_token().is_some()
    }

    async fn authenticate(&self, request: Request) -> crate::Result<String> {
        let response = self.worker.fetch(&request).await?;

        if !response.is_success() {
            let detail = response
                .json_body::<ErrorBody>()
                .ok()
                .and_then(|body| body.message())
                .unwrap_or_else(|| DEFAULT_AUTH_ERROR.to_string());
            warn!(url = %request.url, status = response.status.as_u16(), "authentication rejected");
            return Err(crate::HalalTradeError::Auth(detail));
        }

        let token: TokenResponse = response.json_body()?;
        self.prefs.set_auth_token(&token.access_token);
        self.cache.clear();
        info!("authenticated");
        Ok(token.access_token)
    }
}

/// Encodes `pairs` as `application/x-www-form-urlencoded`.
fn form_body(url: &Url, pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut encoder = url.clone();
    encoder.query_pairs_mut().clear().extend_pairs(pairs);
    encoder.query().unwrap_or_default().as_bytes().to_vec()
}

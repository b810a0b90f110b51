//! Interactive authorization port.

use crate::error::OAuth2Error;

use super::BoxFuture;

/// Obtains an `OAuth2` authorization code, typically by opening a browser
/// and waiting for the redirect to the callback URL.
pub trait AuthorizationCodeFetcher: Send + Sync {
    /// Returns the authorization code for `authorize_url`.
    ///
    /// # Errors
    ///
    /// Returns an [`OAuth2Error`] when the user aborts, the provider reports
    /// an error, or the callback carries no code.
    fn fetch_authorization_code<'a>(
        &'a self,
        authorize_url: &'a str,
        callback_url: &'a str,
        collection_uid: &'a str,
    ) -> BoxFuture<'a, Result<String, OAuth2Error>>;
}

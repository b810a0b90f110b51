//! `OAuth2` token exchange.
//!
//! Each grant type turns the working request into a form-encoded POST
//! against the token endpoint. The token request then runs through the
//! same wire construction and transport as any other request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use courier_domain::auth::{AuthConfig, OAuth2Config, OAuth2GrantType};
use courier_domain::request::{HttpMethod, KeyValue, RequestBody};
use sha2::{Digest, Sha256};
use url::Url;

use crate::context::RequestContext;
use crate::error::{OAuth2Error, PipelineResult};
use crate::ports::AuthorizationCodeFetcher;

/// Content-Type for form-urlencoded data.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A PKCE verifier and its `S256` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    /// Sent with the token request.
    pub verifier: String,
    /// Sent with the authorize request.
    pub challenge: String,
}

impl Pkce {
    /// Generates a fresh pair: 22 random bytes as hex.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(crate::auth::random_hex(22))
    }

    /// Derives the challenge for a known verifier.
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Builds the authorize URL the user is sent to.
///
/// # Errors
///
/// Returns [`OAuth2Error::Authorization`] when the authorization URL is
/// not a valid absolute URL.
pub fn authorization_url(config: &OAuth2Config, pkce: Option<&Pkce>) -> Result<String, OAuth2Error> {
    let mut url = Url::parse(&config.authorization_url).map_err(|e| {
        OAuth2Error::Authorization(format!(
            "invalid authorization url '{}': {e}",
            config.authorization_url
        ))
    })?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.callback_url);
        if !config.scope.is_empty() {
            query.append_pair("scope", &config.scope);
        }
        if !config.state.is_empty() {
            query.append_pair("state", &config.state);
        }
        if let Some(pkce) = pkce {
            query
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
        }
    }
    Ok(url.into())
}

/// Extracts the authorization code from a provider callback URL.
///
/// # Errors
///
/// Every error embeds the offending URL: unparsable URL, provider
/// `error`/`error_description` parameters, or a missing `code`.
pub fn parse_callback_url(callback: &str) -> Result<String, OAuth2Error> {
    let url = Url::parse(callback).map_err(|_| OAuth2Error::InvalidCallback {
        url: callback.to_string(),
    })?;
    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    if let Some(error) = param("error") {
        return Err(OAuth2Error::Provider {
            url: callback.to_string(),
            error,
            description: param("error_description").unwrap_or_default(),
        });
    }
    param("code").ok_or_else(|| OAuth2Error::MissingCode {
        url: callback.to_string(),
    })
}

fn require<'a>(value: &'a str, name: &'static str) -> Result<&'a str, OAuth2Error> {
    if value.trim().is_empty() {
        Err(OAuth2Error::MissingConfig(name))
    } else {
        Ok(value)
    }
}

/// Token request form fields for `config`.
///
/// `scope` is omitted when empty.
///
/// # Errors
///
/// Fails when required configuration is missing or the authorization code
/// cannot be obtained.
pub async fn token_request_params(
    config: &OAuth2Config,
    collection_uid: &str,
    fetcher: Option<&dyn AuthorizationCodeFetcher>,
) -> Result<Vec<(String, String)>, OAuth2Error> {
    require(&config.access_token_url, "access token url")?;
    let mut params = vec![(
        "grant_type".to_string(),
        config.grant_type.as_str().to_string(),
    )];

    match config.grant_type {
        OAuth2GrantType::ClientCredentials => {}
        OAuth2GrantType::Password => {
            params.push(("username".to_string(), config.username.clone()));
            params.push(("password".to_string(), config.password.clone()));
        }
        OAuth2GrantType::AuthorizationCode => {
            require(&config.authorization_url, "authorization url")?;
            require(&config.callback_url, "callback url")?;
            let fetcher = fetcher.ok_or_else(|| {
                OAuth2Error::Authorization("no authorization code fetcher configured".to_string())
            })?;
            let pkce = config.pkce.then(Pkce::generate);
            let authorize = authorization_url(config, pkce.as_ref())?;
            let code = fetcher
                .fetch_authorization_code(&authorize, &config.callback_url, collection_uid)
                .await?;
            params.push(("code".to_string(), code));
            params.push(("redirect_uri".to_string(), config.callback_url.clone()));
            if let Some(pkce) = pkce {
                params.push(("code_verifier".to_string(), pkce.verifier));
            }
        }
    }

    params.push(("client_id".to_string(), config.client_id.clone()));
    params.push(("client_secret".to_string(), config.client_secret.clone()));
    if !config.scope.is_empty() {
        params.push(("scope".to_string(), config.scope.clone()));
    }
    Ok(params)
}

/// Replaces the working request with the token request when auth mode is
/// `oauth2`; any other mode is left alone.
///
/// # Errors
///
/// Propagates [`OAuth2Error`] from [`token_request_params`].
pub async fn apply_oauth2(
    ctx: &mut RequestContext,
    fetcher: Option<&dyn AuthorizationCodeFetcher>,
) -> PipelineResult<()> {
    let AuthConfig::Oauth2(config) = &ctx.request.auth else {
        return Ok(());
    };
    let config = config.clone();
    let params = token_request_params(&config, &ctx.collection.uid, fetcher).await?;

    let request = &mut ctx.request;
    request.url.clone_from(&config.access_token_url);
    request.method = HttpMethod::Post;
    request.params.clear();
    request
        .headers
        .retain(|h| !h.name.eq_ignore_ascii_case("content-type"));
    request
        .headers
        .push(KeyValue::new("content-type", FORM_CONTENT_TYPE));
    request.body = RequestBody::FormUrlEncoded {
        fields: params
            .into_iter()
            .map(|(name, value)| KeyValue::new(name, value))
            .collect(),
    };
    request.auth = AuthConfig::None;

    ctx.debug.log_with(
        "oauth2",
        "token request prepared",
        serde_json::json!({
            "grantType": config.grant_type.as_str(),
            "url": config.access_token_url,
        }),
    );
    Ok(())
}

//! Authentication configuration types

use serde::{Deserialize, Serialize};

/// Authentication configuration for a request, folder or collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AuthConfig {
    /// No authentication
    #[default]
    None,
    /// Use the nearest folder (or collection) auth.
    Inherit,
    /// Basic authentication
    Basic {
        /// Username (may contain variables)
        username: String,
        /// Password (may contain variables)
        #[serde(default)]
        password: String,
    },
    /// Bearer token authentication
    Bearer {
        /// The bearer token (may contain variables like `{{access_token}}`)
        token: String,
    },
    /// HTTP Digest authentication, answered after the first 401.
    Digest {
        /// Username
        username: String,
        /// Password
        #[serde(default)]
        password: String,
    },
    /// API Key authentication
    #[serde(rename = "apikey")]
    ApiKey {
        /// Header or query parameter name
        key: String,
        /// The API key value
        value: String,
        /// Where to add the key
        #[serde(default)]
        placement: ApiKeyLocation,
    },
    /// WS-Security `UsernameToken` header.
    Wsse {
        /// Username
        username: String,
        /// Password
        #[serde(default)]
        password: String,
    },
    /// AWS Signature Version 4.
    Awsv4(AwsV4Config),
    /// `OAuth2` token exchange; replaces the request with a token request.
    Oauth2(OAuth2Config),
}

/// Location for API key authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    /// Add to request headers
    #[default]
    Header,
    /// Add to query parameters
    #[serde(alias = "queryparams")]
    Query,
}

/// AWS `SigV4` credentials and scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AwsV4Config {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Optional session token, sent as `x-amz-security-token`.
    #[serde(default)]
    pub session_token: String,
    /// Service name, e.g. `execute-api`.
    pub service: String,
    /// Region, e.g. `us-east-1`.
    pub region: String,
    /// Named profile; informational only.
    #[serde(default)]
    pub profile_name: String,
}

/// `OAuth2` grant types supported by the token exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OAuth2GrantType {
    /// Client credentials grant.
    #[default]
    ClientCredentials,
    /// Resource owner password grant.
    Password,
    /// Authorization code grant, optionally with PKCE.
    AuthorizationCode,
}

impl OAuth2GrantType {
    /// Wire name of the grant type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::AuthorizationCode => "authorization_code",
        }
    }
}

/// `OAuth2` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OAuth2Config {
    /// Grant type.
    #[serde(default)]
    pub grant_type: OAuth2GrantType,
    /// Token endpoint.
    pub access_token_url: String,
    /// Authorization endpoint (authorization code only).
    #[serde(default)]
    pub authorization_url: String,
    /// Redirect URI registered with the provider.
    #[serde(default)]
    pub callback_url: String,
    /// Client id.
    #[serde(default)]
    pub client_id: String,
    /// Client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Resource owner username (password grant).
    #[serde(default)]
    pub username: String,
    /// Resource owner password (password grant).
    #[serde(default)]
    pub password: String,
    /// Space-separated scopes; omitted from the form when empty.
    #[serde(default)]
    pub scope: String,
    /// Opaque state for the authorize request.
    #[serde(default)]
    pub state: String,
    /// Whether to use PKCE with the authorization code grant.
    #[serde(default)]
    pub pkce: bool,
}

impl AuthConfig {
    /// Returns true if authentication is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        !matches!(self, Self::None | Self::Inherit)
    }

    /// Returns true when the request defers to its ancestors.
    #[must_use]
    pub const fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }

    /// Mode name as stored in collection files.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Inherit => "inherit",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::Digest { .. } => "digest",
            Self::ApiKey { .. } => "apikey",
            Self::Wsse { .. } => "wsse",
            Self::Awsv4(_) => "awsv4",
            Self::Oauth2(_) => "oauth2",
        }
    }

    /// Creates a bearer token authentication.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Creates a basic authentication.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates an API key authentication in header.
    #[must_use]
    pub fn api_key_header(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ApiKey {
            key: name.into(),
            value: key.into(),
            placement: ApiKeyLocation::Header,
        }
    }
}

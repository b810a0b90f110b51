//! Authentication domain types

mod types;

pub use types::{
    ApiKeyLocation, AuthConfig, AwsV4Config, OAuth2Config, OAuth2GrantType,
};

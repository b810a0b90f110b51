//! Courier Domain - request model and execution records
//!
//! Pure types shared by the pipeline: collections and requests as authored,
//! variable scopes, proxy and TLS settings, the wire-level request a
//! transport sends and the records an execution produces. Nothing here
//! performs I/O.

pub mod auth;
pub mod collection;
pub mod cookie;
pub mod debug;
pub mod environment;
pub mod error;
pub mod events;
pub mod id;
pub mod preferences;
pub mod preview;
pub mod proxy;
pub mod request;
pub mod scripting;
pub mod testing;
pub mod tls;
pub mod variables;
pub mod wire;

pub use auth::{ApiKeyLocation, AuthConfig, AwsV4Config, OAuth2Config, OAuth2GrantType};
pub use collection::{Collection, CollectionConfig, CollectionItem, FolderItem, RootRequest};
pub use cookie::{Cookie, CookieJar, SameSite, SharedCookieJar};
pub use debug::{DebugEntry, DebugLog};
pub use environment::{Environment, EnvironmentVariable};
pub use error::{DomainError, DomainResult};
pub use events::{EventEnvelope, EventReceiver, EventSink, RequestEvent, RunFolderEvent};
pub use id::generate_id;
pub use preferences::Preferences;
pub use preview::{PreviewMode, determine_preview_mode};
pub use proxy::{ProxyEndpoint, ProxyMode, ProxyPolicy, ProxySettings};
pub use request::{HttpMethod, HttpRequest, RequestBody, RequestItem};
pub use scripting::{ConsoleEntry, ConsoleLevel, ScriptPhase};
pub use testing::{AssertionOperator, AssertionResult, AssertionSpec, TestResult, TestStatus};
pub use tls::{CertificateInfo, ClientCertificate, TlsInfo, TlsOptions};
pub use variables::{InitialScopes, VariableMap, VariableScope, VariablesContext};
pub use wire::{HeaderList, HttpRequestInfo, RequestOptions, Response, WireBody};

//! Courier Infrastructure - Adapters and entry points
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer: the reqwest transport with its TLS
//! probe, the QuickJS script sandbox and the loopback `OAuth2` callback
//! receiver. It also exposes the request and folder runners and the
//! code generators built on top of them.

pub mod auth;
pub mod codegen;
pub mod http;
pub mod runner;
pub mod scripting;

pub use auth::{DEFAULT_CALLBACK_TIMEOUT, LoopbackAuthorizationFetcher};
pub use codegen::{CodeLanguage, CodeSnippet, HarRequest, generate_code, prepare_har};
pub use http::{Protocol, ReqwestTransport, build_client};
pub use runner::{
    FolderRun, RequestInput, default_services, folder_requests, request, request_with, run_folder,
};
pub use scripting::{FsModuleResolver, ModuleResolver, QuickJsRuntime, SandboxLimits};

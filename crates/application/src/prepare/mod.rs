//! Pre-request stages.
//!
//! Each stage takes the [`RequestContext`](crate::context::RequestContext)
//! and either mutates it or fails the request:
//!
//! 1. [`folder_data`]: ancestor folder contributions, outermost first
//! 2. [`settings`]: header and auth inheritance, proxy policy
//! 3. [`script`]: pre-request vars and script
//! 4. [`interpolate`]: `{{var}}` substitution, path and query params
//! 5. [`oauth2`]: token request synthesis
//! 6. [`wire`]: the wire request handed to the transport

pub mod folder_data;
pub mod interpolate;
pub mod oauth2;
pub mod script;
pub mod settings;
pub mod wire;

pub use folder_data::{FolderData, collect_folder_data};
pub use interpolate::interpolate_request;
pub use oauth2::{Pkce, apply_oauth2, parse_callback_url};
pub use script::{evaluate_pre_request_vars, run_pre_request_script};
pub use settings::{merge_collection_settings, resolve_proxy_policy};
pub use wire::build_request_options;

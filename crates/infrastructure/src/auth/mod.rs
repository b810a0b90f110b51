//! Interactive authorization.

mod callback;

pub use callback::{DEFAULT_CALLBACK_TIMEOUT, LoopbackAuthorizationFetcher};

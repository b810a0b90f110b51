//! Request definitions as authored in a collection.

mod body;
mod item;
mod method;

pub use body::{MultipartField, RequestBody};
pub use item::{
    DEFAULT_MAX_REDIRECTS, HttpRequest, KeyValue, ParamKind, RequestItem, RequestParam,
    RequestSettings,
};
pub use method::HttpMethod;

//! Collection item types

use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;
use crate::request::{KeyValue, RequestItem};
use crate::scripting::{RequestScripts, RequestVars};

/// Inheritable settings attached to a folder or the collection root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RootRequest {
    /// Headers prepended to every descendant request.
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    /// Auth used by descendants whose mode is `inherit`.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Scripts wrapped around descendant scripts.
    #[serde(default)]
    pub script: RequestScripts,
    /// Variables contributed to descendants.
    #[serde(default)]
    pub vars: RequestVars,
    /// Tests run after descendant tests.
    #[serde(default)]
    pub tests: String,
}

/// A folder containing requests and other folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderItem {
    /// Unique identifier
    pub uid: String,
    /// Folder name
    pub name: String,
    /// Settings cascaded into descendants.
    #[serde(default)]
    pub root: RootRequest,
    /// Items in this folder
    #[serde(default)]
    pub items: Vec<CollectionItem>,
}

impl FolderItem {
    /// Creates a new empty folder.
    #[must_use]
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            root: RootRequest::default(),
            items: Vec::new(),
        }
    }

    /// Adds a child item.
    #[must_use]
    pub fn with_item(mut self, item: CollectionItem) -> Self {
        self.items.push(item);
        self
    }
}

/// An item in a collection (either a folder or a request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CollectionItem {
    /// A folder containing other items
    #[serde(rename = "folder")]
    Folder(FolderItem),
    /// An HTTP request
    #[serde(rename = "http-request")]
    Http(RequestItem),
    /// A GraphQL request
    #[serde(rename = "graphql-request")]
    Graphql(RequestItem),
}

impl CollectionItem {
    /// Returns the uid of this item.
    #[must_use]
    pub fn uid(&self) -> &str {
        match self {
            Self::Folder(f) => &f.uid,
            Self::Http(r) | Self::Graphql(r) => &r.uid,
        }
    }

    /// Returns the name of this item.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(f) => &f.name,
            Self::Http(r) | Self::Graphql(r) => &r.name,
        }
    }

    /// The request, if this item is one.
    #[must_use]
    pub const fn as_request(&self) -> Option<&RequestItem> {
        match self {
            Self::Http(r) | Self::Graphql(r) => Some(r),
            Self::Folder(_) => None,
        }
    }

    /// The folder, if this item is one.
    #[must_use]
    pub const fn as_folder(&self) -> Option<&FolderItem> {
        match self {
            Self::Folder(f) => Some(f),
            _ => None,
        }
    }

    /// Child items (empty for requests).
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Folder(f) => &f.items,
            _ => &[],
        }
    }
}

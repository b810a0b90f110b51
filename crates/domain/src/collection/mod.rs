//! Collections: the tree of folders and requests plus collection-wide config.

mod item;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use item::{CollectionItem, FolderItem, RootRequest};

use crate::proxy::CollectionProxy;
use crate::request::RequestItem;
use crate::tls::ClientCertificates;
use crate::variables::VariableMap;

/// Filesystem access for scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FilesystemAccess {
    /// Whether `require("fs")` is allowed.
    #[serde(default)]
    pub allow: bool,
}

/// Script sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScriptSettings {
    /// Extra module names resolvable from `node_modules`.
    #[serde(default)]
    pub module_whitelist: Vec<String>,
    /// Filesystem access.
    #[serde(default)]
    pub filesystem_access: FilesystemAccess,
    /// Directories searched for local modules, relative to the collection.
    #[serde(default)]
    pub additional_context_roots: Vec<String>,
}

/// Collection-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CollectionConfig {
    /// Proxy override.
    #[serde(default)]
    pub proxy: CollectionProxy,
    /// Client certificates for mTLS.
    #[serde(default)]
    pub client_certificates: ClientCertificates,
    /// Script sandbox settings.
    #[serde(default)]
    pub scripts: ScriptSettings,
}

/// A collection: root settings, config and the item tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier.
    pub uid: String,
    /// Display name.
    pub name: String,
    /// Directory the collection lives in; scripts and files resolve here.
    #[serde(default)]
    pub path: PathBuf,
    /// Collection root settings.
    #[serde(default)]
    pub root: RootRequest,
    /// Collection configuration.
    #[serde(default)]
    pub config: CollectionConfig,
    /// Collection-scope variables.
    #[serde(default)]
    pub collection_variables: VariableMap,
    /// Runtime variables carried between requests.
    #[serde(default)]
    pub runtime_variables: VariableMap,
    /// Top-level items.
    #[serde(default)]
    pub items: Vec<CollectionItem>,
}

impl Collection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            path: PathBuf::new(),
            root: RootRequest::default(),
            config: CollectionConfig::default(),
            collection_variables: VariableMap::new(),
            runtime_variables: VariableMap::new(),
            items: Vec::new(),
        }
    }

    /// Adds a top-level item.
    #[must_use]
    pub fn with_item(mut self, item: CollectionItem) -> Self {
        self.items.push(item);
        self
    }

    /// Depth-first iterator over every item in the tree.
    pub fn iter_items(&self) -> impl Iterator<Item = &CollectionItem> {
        let mut stack: Vec<&CollectionItem> = self.items.iter().rev().collect();
        std::iter::from_fn(move || {
            let item = stack.pop()?;
            stack.extend(item.children().iter().rev());
            Some(item)
        })
    }

    /// Finds a request by uid anywhere in the tree.
    #[must_use]
    pub fn find_request(&self, uid: &str) -> Option<&RequestItem> {
        self.iter_items()
            .filter_map(CollectionItem::as_request)
            .find(|r| r.uid == uid)
    }

    /// Finds a request by name anywhere in the tree.
    #[must_use]
    pub fn find_request_by_name(&self, name: &str) -> Option<&RequestItem> {
        self.iter_items()
            .filter_map(CollectionItem::as_request)
            .find(|r| r.name == name)
    }

    /// Finds a folder by uid anywhere in the tree.
    #[must_use]
    pub fn find_folder(&self, uid: &str) -> Option<&FolderItem> {
        self.iter_items()
            .filter_map(CollectionItem::as_folder)
            .find(|f| f.uid == uid)
    }
}

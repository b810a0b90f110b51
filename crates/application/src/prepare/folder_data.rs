//! Ancestor folder contributions for one request.

use std::collections::HashMap;

use courier_domain::auth::AuthConfig;
use courier_domain::collection::{Collection, CollectionItem, FolderItem};
use courier_domain::request::KeyValue;
use courier_domain::scripting::{RequestScripts, RequestVars};
use courier_domain::{DomainError, DomainResult};

/// What one ancestor folder contributes to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderData {
    /// Folder uid.
    pub uid: String,
    /// Folder name.
    pub name: String,
    /// Folder headers.
    pub headers: Vec<KeyValue>,
    /// Folder auth.
    pub auth: AuthConfig,
    /// Folder scripts.
    pub script: RequestScripts,
    /// Folder variables.
    pub vars: RequestVars,
    /// Folder tests.
    pub tests: String,
}

impl FolderData {
    fn from_folder(folder: &FolderItem) -> Self {
        Self {
            uid: folder.uid.clone(),
            name: folder.name.clone(),
            headers: folder.root.headers.clone(),
            auth: folder.root.auth.clone(),
            script: folder.root.script.clone(),
            vars: folder.root.vars.clone(),
            tests: folder.root.tests.clone(),
        }
    }
}

/// Maps every item uid to its parent folder; top-level items map to `None`.
fn parent_map(collection: &Collection) -> DomainResult<HashMap<&str, Option<&FolderItem>>> {
    let mut parents = HashMap::new();
    let mut stack: Vec<(&CollectionItem, Option<&FolderItem>)> =
        collection.items.iter().map(|item| (item, None)).collect();

    while let Some((item, parent)) = stack.pop() {
        if parents.insert(item.uid(), parent).is_some() {
            return Err(DomainError::Topology(format!(
                "uid '{}' appears more than once",
                item.uid()
            )));
        }
        if let CollectionItem::Folder(folder) = item {
            stack.extend(folder.items.iter().map(|child| (child, Some(folder))));
        }
    }
    Ok(parents)
}

/// Ancestor folders of `item_uid`, outermost first. The collection root is
/// not included.
///
/// # Errors
///
/// Returns [`DomainError::Topology`] when the request is not in the
/// collection or a uid is duplicated.
pub fn collect_folder_data(collection: &Collection, item_uid: &str) -> DomainResult<Vec<FolderData>> {
    let parents = parent_map(collection)?;
    if !parents.contains_key(item_uid) {
        return Err(DomainError::Topology(format!(
            "request '{item_uid}' is not part of collection '{}'",
            collection.name
        )));
    }

    // Unique uids make the parent chain finite.
    let mut folders = Vec::new();
    let mut child = item_uid;
    while let Some(Some(folder)) = parents.get(child) {
        folders.push(FolderData::from_folder(folder));
        child = &folder.uid;
    }

    folders.reverse();
    Ok(folders)
}

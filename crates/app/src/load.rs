//! Loading collections, environments and preferences from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use courier_domain::collection::Collection;
use courier_domain::environment::Environment;
use courier_domain::preferences::Preferences;
use courier_domain::request::RequestItem;
use courier_domain::variables::VariableMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cli::SourceArgs;

/// Reads a JSON or YAML document; the extension decides.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if yaml {
        serde_yaml::from_str(&text).with_context(|| format!("invalid YAML in {}", path.display()))
    } else {
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
    }
}

/// Default response directory under the user data directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("courier")
        .join("responses")
}

/// Everything loaded for one invocation.
#[derive(Debug)]
pub struct Workspace {
    /// The collection.
    pub collection: Arc<Collection>,
    /// Selected environment.
    pub environment: Option<Environment>,
    /// Global variables.
    pub globals: VariableMap,
    /// Preferences.
    pub preferences: Preferences,
    /// Response directory; created on load.
    pub data_dir: PathBuf,
}

impl Workspace {
    /// Loads every file named by `args`.
    ///
    /// A collection without a `path` gets the directory of its file, so
    /// scripts and body files resolve next to it.
    pub fn load(args: &SourceArgs) -> Result<Self> {
        let mut collection: Collection = load_document(&args.collection)?;
        if collection.path.as_os_str().is_empty() {
            collection.path = args
                .collection
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
        }
        let environment = args.env.as_deref().map(load_document::<Environment>).transpose()?;
        let globals = args
            .globals
            .as_deref()
            .map(load_document::<VariableMap>)
            .transpose()?
            .unwrap_or_default();
        let preferences = args
            .preferences
            .as_deref()
            .map(load_document::<Preferences>)
            .transpose()?
            .unwrap_or_default();
        let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
        std::fs::create_dir_all(&data_dir).with_context(|| format!("cannot create {}", data_dir.display()))?;
        debug!(collection = %collection.name, data_dir = %data_dir.display(), "workspace loaded");

        Ok(Self {
            collection: Arc::new(collection),
            environment,
            globals,
            preferences,
            data_dir,
        })
    }

    /// Finds a request by uid, then by name.
    pub fn find_request(&self, key: &str) -> Result<RequestItem> {
        self.collection
            .find_request(key)
            .or_else(|| self.collection.find_request_by_name(key))
            .cloned()
            .ok_or_else(|| anyhow!("no request named {key:?} in {}", self.collection.name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const COLLECTION: &str = r#"
uid: c1
name: Demo
items:
  - type: http-request
    uid: r1
    name: Get user
    request:
      method: GET
      url: "{{base}}/users/1"
"#;

    fn source(dir: &Path) -> SourceArgs {
        std::fs::write(dir.join("demo.yaml"), COLLECTION).unwrap();
        std::fs::write(
            dir.join("dev.json"),
            r#"{"name":"dev","variables":[{"name":"base","value":"http://localhost"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.join("globals.json"), r#"{"tenant":"acme"}"#).unwrap();
        SourceArgs {
            collection: dir.join("demo.yaml"),
            env: Some(dir.join("dev.json")),
            globals: Some(dir.join("globals.json")),
            preferences: None,
            data_dir: Some(dir.join("data")),
        }
    }

    #[test]
    fn test_workspace_loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::load(&source(dir.path())).unwrap();

        assert_eq!(workspace.collection.name, "Demo");
        assert_eq!(workspace.collection.path, dir.path());
        assert_eq!(workspace.environment.as_ref().unwrap().name, "dev");
        assert_eq!(workspace.globals["tenant"], json!("acme"));
        assert!(workspace.data_dir.is_dir());
    }

    #[test]
    fn test_find_request_by_uid_or_name() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::load(&source(dir.path())).unwrap();
        assert_eq!(workspace.find_request("r1").unwrap().name, "Get user");
        assert_eq!(workspace.find_request("Get user").unwrap().uid, "r1");
        assert!(workspace.find_request("nope").is_err());
    }

    #[test]
    fn test_invalid_document_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        let err = load_document::<Environment>(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}

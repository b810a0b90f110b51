//! Module resolution for `require` inside the sandbox.
//!
//! Lookup order: built-in modules, whitelisted packages under
//! `node_modules`, `fs` when filesystem access is on, then local `.js`
//! files below the collection directory or one of the additional roots.

use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};

use courier_application::error::ScriptError;
use courier_domain::collection::ScriptSettings;
use serde::Deserialize;
use tracing::debug;

/// Modules implemented by the sandbox itself.
pub const BUILTIN_MODULES: &[&str] = &["atob", "btoa", "uuid", "nanoid", "path", "chai"];

/// What `require(name)` turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedModule {
    /// A module the sandbox provides.
    Builtin(String),
    /// JavaScript source loaded from disk, evaluated as CommonJS.
    Source {
        /// File the source came from.
        path: PathBuf,
        /// Module source.
        code: String,
    },
}

/// Where a script runs from.
#[derive(Debug, Clone, Default)]
pub struct ModuleContext {
    /// Collection directory.
    pub collection_path: PathBuf,
    /// Whitelist, filesystem access and extra roots.
    pub settings: ScriptSettings,
}

impl ModuleContext {
    /// Roots searched for local modules, collection directory first.
    #[must_use]
    pub fn search_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.collection_path.clone()];
        roots.extend(
            self.settings
                .additional_context_roots
                .iter()
                .map(|root| self.collection_path.join(root)),
        );
        roots
    }
}

/// Resolves module names for the sandbox.
///
/// Called from the sandbox thread, so implementations are synchronous.
pub trait ModuleResolver: Send + Sync + Debug {
    /// Resolves `name` for a script running in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::ModuleNotFound`] listing every tried location.
    fn resolve(&self, name: &str, context: &ModuleContext) -> Result<ResolvedModule, ScriptError>;
}

/// Filesystem-backed resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsModuleResolver;

#[derive(Deserialize)]
struct PackageManifest {
    main: Option<String>,
}

/// Joins `relative` onto `root` lexically, refusing to climb above it.
fn contained_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                joined.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(joined)
}

fn with_js_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension("js")
    }
}

fn load(path: &Path) -> Option<ResolvedModule> {
    let code = std::fs::read_to_string(path).ok()?;
    debug!(path = %path.display(), "module loaded");
    Some(ResolvedModule::Source {
        path: path.to_path_buf(),
        code,
    })
}

impl FsModuleResolver {
    fn package_entry(package_dir: &Path) -> PathBuf {
        let main = std::fs::read_to_string(package_dir.join("package.json"))
            .ok()
            .and_then(|text| serde_json::from_str::<PackageManifest>(&text).ok())
            .and_then(|manifest| manifest.main);
        main.map_or_else(
            || package_dir.join("index.js"),
            |main| with_js_extension(&package_dir.join(main)),
        )
    }

    fn whitelisted(
        name: &str,
        context: &ModuleContext,
        tried: &mut Vec<String>,
    ) -> Option<ResolvedModule> {
        let package = name.split('/').next().unwrap_or(name);
        if !context.settings.module_whitelist.iter().any(|w| w == package) {
            return None;
        }
        let modules = context.collection_path.join("node_modules");
        let dir = contained_join(&modules, name)?;
        let candidates = if dir.is_dir() {
            vec![Self::package_entry(&dir)]
        } else {
            vec![with_js_extension(&dir)]
        };
        candidates.into_iter().find_map(|path| {
            tried.push(path.display().to_string());
            load(&path)
        })
    }

    fn local(name: &str, context: &ModuleContext, tried: &mut Vec<String>) -> Option<ResolvedModule> {
        context.search_roots().into_iter().find_map(|root| {
            let path = with_js_extension(&contained_join(&root, name)?);
            tried.push(path.display().to_string());
            load(&path)
        })
    }
}

impl ModuleResolver for FsModuleResolver {
    fn resolve(&self, name: &str, context: &ModuleContext) -> Result<ResolvedModule, ScriptError> {
        if BUILTIN_MODULES.contains(&name) {
            return Ok(ResolvedModule::Builtin(name.to_string()));
        }
        if name == "fs" && context.settings.filesystem_access.allow {
            return Ok(ResolvedModule::Builtin(name.to_string()));
        }

        let mut tried = Vec::new();
        if let Some(module) = Self::whitelisted(name, context, &mut tried) {
            return Ok(module);
        }
        if let Some(module) = Self::local(name, context, &mut tried) {
            return Ok(module);
        }
        Err(ScriptError::ModuleNotFound {
            name: name.to_string(),
            tried,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use courier_domain::collection::FilesystemAccess;
    use pretty_assertions::assert_eq;

    fn context(dir: &Path) -> ModuleContext {
        ModuleContext {
            collection_path: dir.to_path_buf(),
            settings: ScriptSettings::default(),
        }
    }

    #[test]
    fn test_builtins_resolve_without_disk() {
        let ctx = context(Path::new("/nowhere"));
        assert_eq!(
            FsModuleResolver.resolve("uuid", &ctx).unwrap(),
            ResolvedModule::Builtin("uuid".into())
        );
    }

    #[test]
    fn test_fs_requires_permission() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        assert!(matches!(
            FsModuleResolver.resolve("fs", &ctx),
            Err(ScriptError::ModuleNotFound { .. })
        ));
        ctx.settings.filesystem_access = FilesystemAccess { allow: true };
        assert_eq!(
            FsModuleResolver.resolve("fs", &ctx).unwrap(),
            ResolvedModule::Builtin("fs".into())
        );
    }

    #[test]
    fn test_local_module_and_additional_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helpers.js"), "module.exports = 1;").unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib").join("shared.js"), "module.exports = 2;").unwrap();

        let mut ctx = context(dir.path());
        ctx.settings.additional_context_roots = vec!["lib".into()];

        let ResolvedModule::Source { code, .. } = FsModuleResolver.resolve("./helpers", &ctx).unwrap()
        else {
            unreachable!()
        };
        assert_eq!(code, "module.exports = 1;");
        assert!(matches!(
            FsModuleResolver.resolve("shared", &ctx).unwrap(),
            ResolvedModule::Source { .. }
        ));
    }

    #[test]
    fn test_whitelisted_package_uses_manifest_main() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("node_modules").join("lodash");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(package.join("package.json"), r#"{"main": "lodash.js"}"#).unwrap();
        std::fs::write(package.join("lodash.js"), "module.exports = {};").unwrap();

        let mut ctx = context(dir.path());
        assert!(FsModuleResolver.resolve("lodash", &ctx).is_err());
        ctx.settings.module_whitelist = vec!["lodash".into()];
        let ResolvedModule::Source { path, .. } = FsModuleResolver.resolve("lodash", &ctx).unwrap()
        else {
            unreachable!()
        };
        assert!(path.ends_with("node_modules/lodash/lodash.js"));
    }

    #[test]
    fn test_escape_from_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsModuleResolver
            .resolve("../../etc/passwd", &context(dir.path()))
            .unwrap_err();
        let ScriptError::ModuleNotFound { tried, .. } = err else {
            unreachable!()
        };
        assert!(tried.is_empty());
    }

    #[test]
    fn test_missing_module_lists_tried_paths() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsModuleResolver.resolve("missing", &context(dir.path())).unwrap_err();
        assert!(err.to_string().contains("missing.js"));
    }
}

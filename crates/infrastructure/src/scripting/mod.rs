//! JavaScript sandbox.
//!
//! [`QuickJsRuntime`] implements the script runtime port on QuickJS.
//! Modules are looked up through a [`ModuleResolver`].

pub mod modules;
mod protocol;
mod sandbox;

pub use modules::{BUILTIN_MODULES, FsModuleResolver, ModuleContext, ModuleResolver, ResolvedModule};
pub use sandbox::{QuickJsRuntime, SandboxLimits};

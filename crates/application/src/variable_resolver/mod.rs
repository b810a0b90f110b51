//! Variable resolution module
//!
//! Parses and resolves `{{variable}}` placeholders against the merged
//! variable scopes of a request.
//!
//! # Usage
//!
//! ```
//! use courier_application::variable_resolver::VariableResolver;
//! use courier_domain::variables::VariableMap;
//!
//! let mut variables = VariableMap::new();
//! variables.insert("host".into(), "localhost".into());
//!
//! let mut resolver = VariableResolver::new(variables, VariableMap::new());
//! assert_eq!(resolver.interpolate("http://{{host}}/api"), "http://localhost/api");
//! ```

pub mod builtins;
pub mod engine;
pub mod parser;

pub use builtins::BuiltinVariables;
pub use engine::{
    MAX_INTERPOLATION_DEPTH, ResolutionResult, VariableResolver, lookup_path, render_value,
};
pub use parser::{VariableReference, has_variables, parse_variables};

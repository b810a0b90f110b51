//! Entry points wiring the pipeline to the concrete adapters.
//!
//! [`request`] runs one request item with the reqwest transport and the
//! QuickJS sandbox. [`run_folder`] runs every request below a folder in
//! order, carrying runtime, environment and global variables from one
//! request to the next.

use std::path::PathBuf;
use std::sync::Arc;

use courier_application::ports::{AuthorizationCodeFetcher, CancellationToken};
use courier_application::{ContextInputs, ExecutionMode, PipelineServices, RequestContext, run_request};
use courier_domain::collection::{Collection, CollectionItem};
use courier_domain::cookie::SharedCookieJar;
use courier_domain::environment::Environment;
use courier_domain::events::EventSink;
use courier_domain::preferences::Preferences;
use courier_domain::request::RequestItem;
use courier_domain::variables::{InitialScopes, VariableMap, VariablesContext};
use tracing::{info, warn};

use crate::http::ReqwestTransport;
use crate::scripting::QuickJsRuntime;

/// Upper bound on requests one folder run may send, `setNextRequest` loops included.
pub const MAX_RUNNER_STEPS: usize = 10_000;

/// Everything one request run needs.
#[derive(Clone)]
pub struct RequestInput {
    /// The request to run.
    pub request_item: RequestItem,
    /// Its collection.
    pub collection: Arc<Collection>,
    /// Global environment variables.
    pub global_variables: VariableMap,
    /// Runtime variables; starts from the collection's.
    pub runtime_variables: VariableMap,
    /// Application preferences.
    pub preferences: Preferences,
    /// Shared cookie jar.
    pub cookie_jar: SharedCookieJar,
    /// Where response bodies are written.
    pub data_dir: PathBuf,
    /// Cancels the run.
    pub cancel: CancellationToken,
    /// Caller version, sent in the user agent.
    pub version: String,
    /// Standalone or runner.
    pub execution_mode: ExecutionMode,
    /// Interactive `OAuth2` code fetcher.
    pub authorization: Option<Arc<dyn AuthorizationCodeFetcher>>,
    /// Selected environment.
    pub environment: Option<Environment>,
    /// Progress events.
    pub events: Option<EventSink>,
    /// Wait before sending.
    pub delay_ms: u64,
}

impl std::fmt::Debug for RequestInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestInput")
            .field("request", &self.request_item.name)
            .field("collection", &self.collection.name)
            .field("environment", &self.environment.as_ref().map(|e| &e.name))
            .field("delay_ms", &self.delay_ms)
            .finish_non_exhaustive()
    }
}

impl RequestInput {
    /// Input with default preferences and a temporary data directory.
    #[must_use]
    pub fn new(request_item: RequestItem, collection: Arc<Collection>) -> Self {
        Self {
            request_item,
            runtime_variables: collection.runtime_variables.clone(),
            collection,
            global_variables: VariableMap::new(),
            preferences: Preferences::default(),
            cookie_jar: SharedCookieJar::default(),
            data_dir: std::env::temp_dir(),
            cancel: CancellationToken::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            execution_mode: ExecutionMode::Standalone,
            authorization: None,
            environment: None,
            events: None,
            delay_ms: 0,
        }
    }

    fn services(&self) -> PipelineServices {
        default_services(self.authorization.clone())
    }

    /// Pipeline inputs with the process environment as the top scope.
    #[must_use]
    pub fn into_context_inputs(self) -> ContextInputs {
        let variables = VariablesContext::new(InitialScopes {
            process: process_env(),
            collection: self.collection.collection_variables.clone(),
            environment: self
                .environment
                .as_ref()
                .map(Environment::to_variable_map)
                .unwrap_or_default(),
            global: self.global_variables,
            runtime: self.runtime_variables,
        });
        ContextInputs {
            request_item: self.request_item,
            collection: self.collection,
            environment: self.environment,
            preferences: self.preferences,
            cookie_jar: self.cookie_jar,
            data_dir: self.data_dir,
            variables,
            events: self.events.unwrap_or_else(EventSink::disabled),
            cancel: self.cancel,
            execution_mode: self.execution_mode,
            version: self.version,
        }
    }
}

/// Process environment as a scope map.
#[must_use]
pub fn process_env() -> VariableMap {
    std::env::vars()
        .map(|(name, value)| (name, serde_json::Value::String(value)))
        .collect()
}

/// The reqwest transport and the QuickJS sandbox.
#[must_use]
pub fn default_services(authorization: Option<Arc<dyn AuthorizationCodeFetcher>>) -> PipelineServices {
    PipelineServices {
        transport: Arc::new(ReqwestTransport::new()),
        scripts: Arc::new(QuickJsRuntime::default()),
        authorization,
    }
}

/// Runs one request with the default adapters.
pub async fn request(input: RequestInput) -> RequestContext {
    let services = input.services();
    request_with(input, &services).await
}

/// Runs one request with the given adapters.
pub async fn request_with(input: RequestInput, services: &PipelineServices) -> RequestContext {
    let delay_ms = input.delay_ms;
    run_request(input.into_context_inputs(), services, delay_ms).await
}

/// Requests below `folder_uid` in tree order; the whole collection for `None`.
#[must_use]
pub fn folder_requests(collection: &Collection, folder_uid: Option<&str>) -> Option<Vec<RequestItem>> {
    let items: Vec<&CollectionItem> = match folder_uid {
        None => collection.iter_items().collect(),
        Some(uid) => {
            let folder = collection.find_folder(uid)?;
            let mut stack: Vec<&CollectionItem> = folder.items.iter().rev().collect();
            let mut ordered = Vec::new();
            while let Some(item) = stack.pop() {
                stack.extend(item.children().iter().rev());
                ordered.push(item);
            }
            ordered
        }
    };
    Some(
        items
            .into_iter()
            .filter_map(CollectionItem::as_request)
            .cloned()
            .collect(),
    )
}

/// Result of a folder run.
#[derive(Debug, Default)]
pub struct FolderRun {
    /// One context per request sent, in run order.
    pub contexts: Vec<RequestContext>,
    /// A script called `bru.runner.stopExecution()`.
    pub stopped: bool,
}

fn carry_environment(environment: &mut Environment, values: &VariableMap) {
    for (name, value) in values {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match environment.variables.iter_mut().find(|v| v.enabled && &v.name == name) {
            Some(variable) => variable.value = text,
            None => environment.add_variable(name.clone(), text),
        }
    }
}

/// Runs every request below `folder_uid`.
///
/// `template.request_item` is ignored. The delay applies between requests.
/// `bru.setNextRequest` jumps to the named request; an unknown name ends
/// the run. Returns `None` when the folder does not exist.
pub async fn run_folder(
    template: RequestInput,
    folder_uid: Option<&str>,
    services: &PipelineServices,
) -> Option<FolderRun> {
    let requests = folder_requests(&template.collection, folder_uid)?;
    let scope_uid = folder_uid.map_or_else(|| template.collection.uid.clone(), str::to_string);
    let events = template.events.as_ref().map(|sink| sink.for_folder(scope_uid.clone()));
    info!(folder = %scope_uid, requests = requests.len(), "folder run started");

    let mut run = FolderRun::default();
    let mut runtime = template.runtime_variables.clone();
    let mut globals = template.global_variables.clone();
    let mut environment = template.environment.clone();
    let mut index = 0;
    let mut steps = 0;

    while index < requests.len() && steps < MAX_RUNNER_STEPS && !template.cancel.is_cancelled() {
        let input = RequestInput {
            request_item: requests[index].clone(),
            runtime_variables: runtime.clone(),
            global_variables: globals.clone(),
            environment: environment.clone(),
            events: events.clone(),
            execution_mode: ExecutionMode::Runner,
            delay_ms: if steps == 0 { 0 } else { template.delay_ms },
            ..template.clone()
        };
        let ctx = request_with(input, services).await;
        steps += 1;

        runtime = ctx.variables.runtime_variables().clone();
        globals = ctx.variables.global_variables().clone();
        if let Some(env) = environment.as_mut() {
            carry_environment(env, ctx.variables.environment_variables());
        }
        let next = ctx.next_request_name.clone();
        let stop = ctx.stop_execution;
        run.contexts.push(ctx);

        if stop {
            run.stopped = true;
            break;
        }
        match next {
            Some(name) => match requests.iter().position(|r| r.name == name) {
                Some(target) => index = target,
                None => {
                    warn!(%name, "next request not found in folder, stopping");
                    break;
                }
            },
            None => index += 1,
        }
    }
    info!(folder = %scope_uid, sent = run.contexts.len(), stopped = run.stopped, "folder run finished");
    Some(run)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use courier_domain::collection::FolderItem;
    use courier_domain::request::{HttpMethod, HttpRequest};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn item(uid: &str) -> CollectionItem {
        CollectionItem::Http(RequestItem::new(
            uid,
            uid,
            HttpRequest::new(HttpMethod::Get, "http://x.test"),
        ))
    }

    fn collection() -> Collection {
        Collection::new("c", "C")
            .with_item(item("a"))
            .with_item(CollectionItem::Folder(
                FolderItem::new("f", "F")
                    .with_item(item("b"))
                    .with_item(CollectionItem::Folder(FolderItem::new("g", "G").with_item(item("c")))),
            ))
            .with_item(item("d"))
    }

    fn names(requests: Option<Vec<RequestItem>>) -> Vec<String> {
        requests.unwrap().into_iter().map(|r| r.uid).collect()
    }

    #[test]
    fn test_folder_requests_in_tree_order() {
        let collection = collection();
        assert_eq!(names(folder_requests(&collection, None)), vec!["a", "b", "c", "d"]);
        assert_eq!(names(folder_requests(&collection, Some("f"))), vec!["b", "c"]);
        assert!(folder_requests(&collection, Some("missing")).is_none());
    }

    #[test]
    fn test_environment_values_are_carried() {
        let mut env = Environment::new("dev");
        env.add_variable("host", "a.test");
        let mut values = VariableMap::new();
        values.insert("host".into(), json!("b.test"));
        values.insert("count".into(), json!(3));
        carry_environment(&mut env, &values);
        let map = env.to_variable_map();
        assert_eq!(map["host"], json!("b.test"));
        assert_eq!(map["count"], json!("3"));
    }

    #[test]
    fn test_context_inputs_scopes() {
        let mut collection = collection();
        collection.runtime_variables.insert("token".into(), json!("t"));
        let collection = Arc::new(collection);
        let mut input = RequestInput::new(collection.find_request("a").unwrap().clone(), collection);
        input.global_variables.insert("g".into(), json!(1));
        let inputs = input.into_context_inputs();
        assert_eq!(inputs.variables.runtime_variables()["token"], json!("t"));
        assert_eq!(inputs.variables.global_variables()["g"], json!(1));
        assert!(inputs.variables.process_variables().contains_key("PATH") || std::env::var("PATH").is_err());
    }
}

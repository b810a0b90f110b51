//! Building sandbox inputs from a context and folding results back.

use courier_domain::events::RequestEvent;
use courier_domain::scripting::ScriptPhase;

use crate::context::RequestContext;
use crate::ports::{
    ReadRequestView, RequestBinding, RequestSnapshot, ResponseView, ScriptOutcome, ScriptRequest,
};

/// Deadline for one script run.
pub const SCRIPT_TIMEOUT_MS: u64 = 30_000;

/// Joins script sources with line breaks, skipping blank ones.
///
/// Returns an empty string when nothing but newlines remains.
pub fn join_scripts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let parts: Vec<&str> = parts
        .into_iter()
        .filter(|part| !part.trim_matches(['\n', '\r']).is_empty())
        .collect();
    parts.join("\n")
}

/// Collection, folder and request sources for `phase`, outermost first.
#[must_use]
pub fn combined_script(ctx: &RequestContext, phase: ScriptPhase) -> String {
    let pick = |scripts: &courier_domain::scripting::RequestScripts, tests: &str| -> String {
        match phase {
            ScriptPhase::PreRequest => scripts.req.clone(),
            ScriptPhase::PostResponse => scripts.res.clone(),
            ScriptPhase::Test => tests.to_string(),
        }
    };
    let root = &ctx.collection.root;
    let mut sources = vec![pick(&root.script, &root.tests)];
    sources.extend(
        ctx.folder_data
            .iter()
            .map(|folder| pick(&folder.script, &folder.tests)),
    );
    sources.push(pick(&ctx.request.script, &ctx.request.tests));
    join_scripts(sources.iter().map(String::as_str))
}

/// Sandbox input for `script`, binding `req` as given.
#[must_use]
pub fn script_request(
    ctx: &RequestContext,
    script: String,
    phase: ScriptPhase,
    request: RequestBinding,
) -> ScriptRequest {
    ScriptRequest {
        script,
        phase,
        request,
        response: ctx.response().map(ResponseView::from_response),
        variables: ctx.variables.clone(),
        collection_name: ctx.collection.name.clone(),
        collection_path: ctx.collection.path.clone(),
        environment_name: ctx.environment.as_ref().map(|env| env.name.clone()),
        settings: ctx.collection.config.scripts.clone(),
        timeout_ms: SCRIPT_TIMEOUT_MS,
    }
}

/// Read-only `req` binding for runs after the response.
#[must_use]
pub fn read_binding(ctx: &RequestContext) -> RequestBinding {
    RequestBinding::Read(ReadRequestView::new(RequestSnapshot::from_request(
        &ctx.request_item.name,
        &ctx.request,
    )))
}

/// Feeds writable scopes, console output and runner flags back into `ctx`.
///
/// Scopes are replaced by value. A changed response body is written into
/// the recorded response.
pub fn apply_script_outcome(ctx: &mut RequestContext, outcome: ScriptOutcome) {
    let ids = ctx.ids();
    for entry in outcome.logs {
        ctx.emit(RequestEvent::ConsoleLog {
            ids: ids.clone(),
            entry,
        });
    }

    ctx.variables
        .replace_environment_variables(outcome.env_variables.clone());
    ctx.variables
        .replace_runtime_variables(outcome.runtime_variables.clone());
    ctx.variables
        .replace_global_variables(outcome.global_variables.clone());
    ctx.emit(RequestEvent::ScriptEnvironmentUpdated {
        ids,
        env_variables: outcome.env_variables,
        runtime_variables: outcome.runtime_variables,
        global_variables: outcome.global_variables,
    });

    if let Some(name) = outcome.next_request_name {
        ctx.next_request_name = Some(name);
    }
    if outcome.stop_execution {
        ctx.stop_execution = true;
    }
    if let Some(body) = outcome.response_body
        && let Some(response) = ctx.response_mut()
    {
        response.data = body;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use crate::prepare::FolderData;
    use courier_domain::collection::Collection;
    use courier_domain::request::{HttpMethod, HttpRequest};
    use courier_domain::variables::VariableMap;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_join_skips_blank_sources() {
        assert_eq!(join_scripts(["a()", "\n\n", "", "b()"]), "a()\nb()");
        assert_eq!(join_scripts(["\n", "\r\n"]), "");
    }

    #[test]
    fn test_combined_script_order() {
        let mut collection = Collection::new("c", "C");
        collection.root.script.req = "collection()".into();
        collection.root.tests = "collectionTests()".into();
        let mut request = HttpRequest::new(HttpMethod::Get, "http://x.test");
        request.script.req = "request()".into();
        let mut ctx = context_for(request, collection);
        ctx.folder_data.push(FolderData {
            uid: "f".into(),
            name: "F".into(),
            headers: vec![],
            auth: Default::default(),
            script: courier_domain::scripting::RequestScripts {
                req: "folder()".into(),
                res: String::new(),
            },
            vars: Default::default(),
            tests: String::new(),
        });

        assert_eq!(
            combined_script(&ctx, ScriptPhase::PreRequest),
            "collection()\nfolder()\nrequest()"
        );
        assert_eq!(combined_script(&ctx, ScriptPhase::PostResponse), "");
        assert_eq!(combined_script(&ctx, ScriptPhase::Test), "collectionTests()");
    }

    #[test]
    fn test_outcome_replaces_scopes_by_value() {
        let mut ctx = context_for(HttpRequest::default(), Collection::new("c", "C"));
        ctx.variables.set_runtime_variable("old", json!(1));
        let mut runtime = VariableMap::new();
        runtime.insert("x".into(), json!(2));
        apply_script_outcome(
            &mut ctx,
            ScriptOutcome {
                runtime_variables: runtime,
                next_request_name: Some("Next".into()),
                ..ScriptOutcome::default()
            },
        );
        assert_eq!(ctx.variables.runtime_variables().get("x"), Some(&json!(2)));
        assert!(ctx.variables.runtime_variables().get("old").is_none());
        assert_eq!(ctx.next_request_name.as_deref(), Some("Next"));
    }
}

//! Interpolation of every string field of the working request.

use courier_domain::auth::{AuthConfig, AwsV4Config, OAuth2Config};
use courier_domain::request::{HttpRequest, KeyValue, MultipartField, RequestBody, RequestParam};

use crate::context::RequestContext;
use crate::variable_resolver::VariableResolver;

/// Resolver plus the placeholders it could not resolve.
struct Interpolator {
    resolver: VariableResolver,
    unresolved: Vec<String>,
}

impl Interpolator {
    fn text(&mut self, input: &str) -> String {
        let result = self.resolver.resolve(input);
        self.unresolved.extend(result.unresolved);
        result.resolved
    }

    fn in_place(&mut self, field: &mut String) {
        if field.contains("{{") {
            *field = self.text(field);
        }
    }

    fn key_values(&mut self, pairs: &mut [KeyValue]) {
        for pair in pairs {
            self.in_place(&mut pair.name);
            self.in_place(&mut pair.value);
        }
    }

    fn params(&mut self, params: &mut [RequestParam]) {
        for param in params {
            self.in_place(&mut param.name);
            self.in_place(&mut param.value);
        }
    }

    fn auth(&mut self, auth: &mut AuthConfig) {
        match auth {
            AuthConfig::None | AuthConfig::Inherit => {}
            AuthConfig::Basic { username, password }
            | AuthConfig::Digest { username, password }
            | AuthConfig::Wsse { username, password } => {
                self.in_place(username);
                self.in_place(password);
            }
            AuthConfig::Bearer { token } => self.in_place(token),
            AuthConfig::ApiKey { key, value, .. } => {
                self.in_place(key);
                self.in_place(value);
            }
            AuthConfig::Awsv4(AwsV4Config {
                access_key_id,
                secret_access_key,
                session_token,
                service,
                region,
                profile_name,
            }) => {
                for field in [
                    access_key_id,
                    secret_access_key,
                    session_token,
                    service,
                    region,
                    profile_name,
                ] {
                    self.in_place(field);
                }
            }
            AuthConfig::Oauth2(OAuth2Config {
                access_token_url,
                authorization_url,
                callback_url,
                client_id,
                client_secret,
                username,
                password,
                scope,
                state,
                ..
            }) => {
                for field in [
                    access_token_url,
                    authorization_url,
                    callback_url,
                    client_id,
                    client_secret,
                    username,
                    password,
                    scope,
                    state,
                ] {
                    self.in_place(field);
                }
            }
        }
    }

    fn json(&mut self, source: &str) -> String {
        let stripped = strip_json_comments(source);
        let interpolated = self.text(&stripped);
        serde_json::from_str::<serde_json::Value>(&interpolated)
            .map_or(interpolated, |value| value.to_string())
    }

    fn body(&mut self, body: &mut RequestBody) {
        match body {
            RequestBody::None => {}
            RequestBody::Json { json } => *json = self.json(json),
            RequestBody::Text { text } => self.in_place(text),
            RequestBody::Xml { xml } => self.in_place(xml),
            RequestBody::Sparql { sparql } => self.in_place(sparql),
            RequestBody::FormUrlEncoded { fields } => self.key_values(fields),
            RequestBody::MultipartForm { fields } => {
                for field in fields {
                    match field {
                        MultipartField::Text { name, value, .. } => {
                            self.in_place(name);
                            self.in_place(value);
                        }
                        MultipartField::File { name, paths, .. } => {
                            self.in_place(name);
                            for path in paths {
                                self.in_place(path);
                            }
                        }
                    }
                }
            }
            RequestBody::Graphql { query, variables } => {
                self.in_place(query);
                if !variables.trim().is_empty() {
                    *variables = self.json(variables);
                }
            }
        }
    }
}

/// Removes `//` and `/* */` comments outside JSON strings.
///
/// Tolerates invalid JSON; an unterminated block comment swallows the rest.
#[must_use]
pub fn strip_json_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Byte range of the path within `url`: after the authority, before `?`/`#`.
fn path_range(url: &str) -> (usize, usize) {
    let after_scheme = url.find("://").map_or(0, |i| i + 3);
    let rest = &url[after_scheme..];
    let path_start = rest
        .find(['/', '?', '#'])
        .map_or(url.len(), |i| after_scheme + i);
    let path_end = url[path_start..]
        .find(['?', '#'])
        .map_or(url.len(), |i| path_start + i);
    (path_start, path_end)
}

/// Replaces `:name` path segments with path param values.
///
/// Segments with no bound param become empty.
#[must_use]
pub fn substitute_path_params(url: &str, request: &HttpRequest) -> String {
    let (start, end) = path_range(url);
    let path = &url[start..end];
    if !path.contains("/:") {
        return url.to_string();
    }
    let replaced: Vec<String> = path
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => request
                .path_params()
                .find(|p| p.name == name)
                .map(|p| p.value.clone())
                .unwrap_or_default(),
            _ => segment.to_string(),
        })
        .collect();
    format!("{}{}{}", &url[..start], replaced.join("/"), &url[end..])
}

/// Appends enabled query params whose names the URL does not carry yet.
#[must_use]
pub fn append_query_params(url: &str, request: &HttpRequest) -> String {
    let (fragment_start, fragment) = url.find('#').map_or((url.len(), ""), |i| (i, &url[i..]));
    let base = &url[..fragment_start];
    let existing: Vec<&str> = base
        .split_once('?')
        .map(|(_, query)| {
            query
                .split('&')
                .map(|pair| pair.split('=').next().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut added = false;
    for param in request.query_params() {
        if !param.name.is_empty() && !existing.contains(&param.name.as_str()) {
            serializer.append_pair(&param.name, &param.value);
            added = true;
        }
    }
    if !added {
        return url.to_string();
    }
    let extra = serializer.finish();
    let separator = match base.split_once('?') {
        None => "?",
        Some((_, "")) => "",
        Some(_) => "&",
    };
    format!("{base}{separator}{extra}{fragment}")
}

/// Interpolates headers, params, URL, auth and body of the working request.
///
/// Returns the placeholder names that stayed unresolved.
pub fn interpolate_request(ctx: &mut RequestContext) -> Vec<String> {
    let mut interpolator = Interpolator {
        resolver: VariableResolver::from_context(&ctx.variables),
        unresolved: Vec::new(),
    };
    let request = &mut ctx.request;

    interpolator.key_values(&mut request.headers);
    interpolator.params(&mut request.params);

    let mut url = interpolator.text(request.url.trim());
    if !url.contains("://") {
        url = format!("http://{url}");
    }
    url = substitute_path_params(&url, request);
    request.url = append_query_params(&url, request);

    interpolator.auth(&mut request.auth);
    interpolator.body(&mut request.body);

    let mut unresolved = interpolator.unresolved;
    unresolved.sort();
    unresolved.dedup();
    if !unresolved.is_empty() {
        ctx.debug.log_with(
            "interpolation",
            "unresolved variables",
            serde_json::json!(unresolved),
        );
    }
    ctx.debug
        .log_with("interpolation", "interpolated url", serde_json::json!(ctx.request.url));
    unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use courier_domain::collection::Collection;
    use courier_domain::request::HttpMethod;
    use courier_domain::variables::InitialScopes;
    use courier_domain::variables::VariablesContext;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context(request: HttpRequest) -> RequestContext {
        let mut ctx = context_for(request, Collection::new("c", "C"));
        let mut initial = InitialScopes::default();
        initial.environment.insert("host".into(), json!("api.test"));
        initial.environment.insert("token".into(), json!("t0k"));
        initial.environment.insert("n".into(), json!(5));
        ctx.variables = VariablesContext::new(initial);
        ctx
    }

    #[test]
    fn test_path_params_substituted() {
        let mut request = HttpRequest::new(HttpMethod::Get, "https://example.com/:id");
        request.params.push(RequestParam::path("id", "42"));
        let mut ctx = context(request);
        interpolate_request(&mut ctx);
        assert_eq!(ctx.request.url, "https://example.com/42");
    }

    #[test]
    fn test_unbound_path_param_is_empty() {
        let mut ctx = context(HttpRequest::new(
            HttpMethod::Get,
            "https://example.com/users/:missing/posts",
        ));
        interpolate_request(&mut ctx);
        assert_eq!(ctx.request.url, "https://example.com/users//posts");
    }

    #[test]
    fn test_port_colon_is_not_a_path_param() {
        let mut request = HttpRequest::new(HttpMethod::Get, "http://localhost:8080/:id?x=1");
        request.params.push(RequestParam::path("id", "7"));
        let mut ctx = context(request);
        interpolate_request(&mut ctx);
        assert_eq!(ctx.request.url, "http://localhost:8080/7?x=1");
    }

    #[test]
    fn test_scheme_defaults_to_http() {
        let mut ctx = context(HttpRequest::new(HttpMethod::Get, "{{host}}/v1"));
        interpolate_request(&mut ctx);
        assert_eq!(ctx.request.url, "http://api.test/v1");
    }

    #[test]
    fn test_query_params_appended_once() {
        let mut request = HttpRequest::new(HttpMethod::Get, "http://x.test/a?page=1#top");
        request.params.push(RequestParam::query("page", "1"));
        request.params.push(RequestParam::query("q", "a b"));
        let mut ctx = context(request);
        interpolate_request(&mut ctx);
        assert_eq!(ctx.request.url, "http://x.test/a?page=1&q=a+b#top");
    }

    #[test]
    fn test_headers_and_auth() {
        let mut request = HttpRequest::new(HttpMethod::Get, "http://x.test");
        request.headers.push(KeyValue::new("x-host", "{{host}}"));
        request.auth = AuthConfig::bearer("{{token}}");
        let mut ctx = context(request);
        let unresolved = interpolate_request(&mut ctx);
        assert!(unresolved.is_empty());
        assert_eq!(ctx.request.headers[0].value, "api.test");
        assert_eq!(ctx.request.auth, AuthConfig::bearer("t0k"));
    }

    #[test]
    fn test_json_body_decommented_and_compacted() {
        let mut request = HttpRequest::new(HttpMethod::Post, "http://x.test");
        request.body = RequestBody::json(
            "{\n  // count\n  \"n\": {{n}}, /* note */ \"url\": \"http://a//b\"\n}",
        );
        let mut ctx = context(request);
        interpolate_request(&mut ctx);
        assert_eq!(
            ctx.request.body,
            RequestBody::json(r#"{"n":5,"url":"http://a//b"}"#)
        );
    }

    #[test]
    fn test_json_body_keeps_key_order() {
        let mut request = HttpRequest::new(HttpMethod::Post, "http://x.test");
        request.body = RequestBody::json(
            r#"{"zeta": {{n}}, "alpha": {"y": 2, "b": 1}, "mid": [3, 1]}"#,
        );
        let mut ctx = context(request);
        interpolate_request(&mut ctx);
        assert_eq!(
            ctx.request.body,
            RequestBody::json(r#"{"zeta":5,"alpha":{"y":2,"b":1},"mid":[3,1]}"#)
        );
    }

    #[test]
    fn test_invalid_json_kept_as_string() {
        let mut request = HttpRequest::new(HttpMethod::Post, "http://x.test");
        request.body = RequestBody::json("{ \"a\": {{missing}} }");
        let mut ctx = context(request);
        let unresolved = interpolate_request(&mut ctx);
        assert_eq!(unresolved, vec!["missing"]);
        assert_eq!(ctx.request.body, RequestBody::json("{ \"a\": {{missing}} }"));
    }

    #[test]
    fn test_strip_comments_respects_strings() {
        assert_eq!(
            strip_json_comments(r#"{"a":"/* keep */","b":1}// tail"#),
            r#"{"a":"/* keep */","b":1}"#
        );
        assert_eq!(strip_json_comments(r#"{"a":"\"//"}"#), r#"{"a":"\"//"}"#);
    }
}

//! Collection and folder settings merged into the working request.

use courier_domain::auth::AuthConfig;
use courier_domain::collection::Collection;
use courier_domain::proxy::{CollectionProxy, CollectionProxyEnabled, ProxyMode, ProxyPolicy, ProxySettings};
use courier_domain::request::HttpRequest;

use super::FolderData;

/// Prepends collection and folder headers and resolves `inherit` auth.
///
/// Headers keep append order: collection, then folders outer to inner, then
/// the request's own. Nothing is deduplicated.
pub fn merge_collection_settings(
    request: &mut HttpRequest,
    collection: &Collection,
    folders: &[FolderData],
) {
    let mut headers = collection.root.headers.clone();
    for folder in folders {
        headers.extend(folder.headers.iter().cloned());
    }
    headers.append(&mut request.headers);
    request.headers = headers;

    if request.auth.is_inherit() {
        request.auth = inherited_auth(collection, folders);
    }
}

/// Nearest folder auth that is set, else the collection auth.
fn inherited_auth(collection: &Collection, folders: &[FolderData]) -> AuthConfig {
    folders
        .iter()
        .rev()
        .map(|folder| &folder.auth)
        .find(|auth| auth.is_configured())
        .unwrap_or(&collection.root.auth)
        .clone()
}

/// Proxy decision from the collection setting and app preferences.
///
/// A collection proxy set to `"global"` defers to the preferences; a
/// preference mode of `system` is left to the operating system.
#[must_use]
pub fn resolve_proxy_policy(collection: &CollectionProxy, preferences: &ProxySettings) -> ProxyPolicy {
    match collection.enabled {
        CollectionProxyEnabled::Flag(true) => ProxyPolicy::Manual(collection.endpoint.clone()),
        CollectionProxyEnabled::Flag(false) => ProxyPolicy::Direct,
        CollectionProxyEnabled::Keyword(_) => match preferences.mode {
            ProxyMode::On => ProxyPolicy::Manual(preferences.endpoint.clone()),
            ProxyMode::System => ProxyPolicy::System,
            ProxyMode::Off => ProxyPolicy::Direct,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_domain::proxy::{ProxyEndpoint, ProxyType};
    use courier_domain::request::{HttpMethod, KeyValue};
    use pretty_assertions::assert_eq;

    fn folder(name: &str, header: &str, auth: AuthConfig) -> FolderData {
        FolderData {
            uid: name.into(),
            name: name.into(),
            headers: vec![KeyValue::new(header, name)],
            auth,
            script: Default::default(),
            vars: Default::default(),
            tests: String::new(),
        }
    }

    #[test]
    fn test_headers_append_in_order_without_dedupe() {
        let mut collection = Collection::new("c", "C");
        collection.root.headers.push(KeyValue::new("x-a", "collection"));
        let folders = vec![
            folder("outer", "x-a", AuthConfig::None),
            folder("inner", "x-b", AuthConfig::None),
        ];
        let mut request = HttpRequest::new(HttpMethod::Get, "http://x.test");
        request.headers.push(KeyValue::new("x-a", "request"));

        merge_collection_settings(&mut request, &collection, &folders);

        let values: Vec<&str> = request.headers.iter().map(|h| h.value.as_str()).collect();
        assert_eq!(values, vec!["collection", "outer", "inner", "request"]);
    }

    #[test]
    fn test_inherit_prefers_nearest_folder() {
        let mut collection = Collection::new("c", "C");
        collection.root.auth = AuthConfig::bearer("collection");
        let folders = vec![
            folder("outer", "x", AuthConfig::bearer("outer")),
            folder("inner", "y", AuthConfig::Inherit),
        ];
        let mut request = HttpRequest::new(HttpMethod::Get, "http://x.test");
        request.auth = AuthConfig::Inherit;

        merge_collection_settings(&mut request, &collection, &folders);
        assert_eq!(request.auth, AuthConfig::bearer("outer"));

        let mut request = HttpRequest::new(HttpMethod::Get, "http://x.test");
        request.auth = AuthConfig::Inherit;
        merge_collection_settings(&mut request, &collection, &[]);
        assert_eq!(request.auth, AuthConfig::bearer("collection"));
    }

    #[test]
    fn test_explicit_auth_untouched() {
        let mut collection = Collection::new("c", "C");
        collection.root.auth = AuthConfig::bearer("collection");
        let mut request = HttpRequest::new(HttpMethod::Get, "http://x.test");
        merge_collection_settings(&mut request, &collection, &[]);
        assert_eq!(request.auth, AuthConfig::None);
    }

    #[test]
    fn test_proxy_policy_resolution() {
        let endpoint = ProxyEndpoint::new(ProxyType::Http, "proxy.local", 3128);
        let prefs = ProxySettings {
            mode: ProxyMode::On,
            endpoint: endpoint.clone(),
        };
        let global = CollectionProxy::default();
        assert_eq!(
            resolve_proxy_policy(&global, &prefs),
            ProxyPolicy::Manual(endpoint)
        );

        let system = ProxySettings {
            mode: ProxyMode::System,
            ..prefs.clone()
        };
        assert_eq!(resolve_proxy_policy(&global, &system), ProxyPolicy::System);

        let off = CollectionProxy {
            enabled: CollectionProxyEnabled::Flag(false),
            ..CollectionProxy::default()
        };
        assert_eq!(resolve_proxy_policy(&off, &prefs), ProxyPolicy::Direct);
    }
}

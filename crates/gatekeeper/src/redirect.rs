//! Login redirect location.

use axum::http::Uri;

/// Build the `Location` for an unauthenticated request.
///
/// Unless `disable_query` is set, the original request path and query are
/// form-urlencoded into `query_param` so the login page can send the user back.
pub fn login_location(
    target_path: &str,
    disable_query: bool,
    query_param: &str,
    original_uri: &Uri,
) -> String {
    if disable_query {
        return target_path.to_string();
    }

    let original = original_uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let separator = if target_path.contains('?') { '&' } else { '?' };
    let encoded: String = url::form_urlencoded::byte_serialize(original.as_bytes()).collect();

    format!("{target_path}{separator}{query_param}={encoded}")
}

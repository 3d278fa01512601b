//! Typed wrappers over [`ApiGateway`](crate::gateway::ApiGateway), one module
//! per backend area.

use url::form_urlencoded;

pub mod auth;
pub mod blog;
pub mod shop;

/// `path?k=v&...` with url-encoded pairs. Pairs with an empty value are kept.
pub(crate) fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return path.to_string();
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    format!("{path}?{}", serializer.finish())
}

#[cfg(test)]
#[path = "../tests/api_tests.rs"]
mod tests;

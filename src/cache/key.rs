//! Cache keys and request fingerprints.

use std::fmt;

/// Deterministic fingerprint of a request.
///
/// Parameters are sorted (by name, then value) and percent-encoded, so two
/// requests carrying the same parameters in a different order produce the
/// same fingerprint.
pub fn fingerprint<K, V, I>(endpoint: &str, params: I) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k.as_ref()).into_owned(),
                urlencoding::encode(v.as_ref()).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    let endpoint = endpoint.trim_end_matches('/');
    if pairs.is_empty() {
        return endpoint.to_string();
    }

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", endpoint, query)
}

/// A fingerprint scoped to a TTL namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Key for a request to `endpoint` with `params`.
    pub fn for_request<K, V, I>(namespace: &str, endpoint: &str, params: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(namespace, fingerprint(endpoint, params))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.fingerprint)
    }
}

/// Segment-aware prefix match.
///
/// `/api/public` matches `/api/public` and `/api/public/movies` but not
/// `/api/publicity`. A prefix that ends in `/` matches anything below it.
pub fn path_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    if prefix == "/" {
        return path.starts_with('/');
    }
    if prefix.ends_with('/') {
        return path.starts_with(prefix) || path == prefix.trim_end_matches('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Public path prefixes. A matching request is never asked for a token.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    public_prefixes: Vec<String>,
}

impl RouteTable {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let public_prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .map(|prefix: String| prefix.trim().to_string())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        Self { public_prefixes }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes
            .iter()
            .any(|prefix| path_matches(prefix, path))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.public_prefixes
    }
}

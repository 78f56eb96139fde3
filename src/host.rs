//! Ollama endpoint resolution
//!
//! Resolves the server base URL from an explicit host string or the
//! `OLLAMA_HOST` environment variable, defaulting to the local loopback
//! address on Ollama's well-known port.

use url::Url;

/// Default Ollama API endpoint
pub const DEFAULT_HOST: &str = "http://127.0.0.1:11434";

/// Environment variable consulted when no base URL is configured
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// Well-known Ollama port, used when an `http` host omits one
const DEFAULT_PORT: u16 = 11434;

/// Normalize a host string into a base URL.
///
/// Empty input resolves to [`DEFAULT_HOST`]. A missing scheme defaults to
/// `http`, a missing port to 11434 for `http` and 443 for `https`, and any
/// trailing slash is stripped. Input that cannot be parsed as a URL falls
/// back to the default.
pub fn resolve_host(host: &str) -> String {
    let host = host.trim();
    if host.is_empty() {
        return DEFAULT_HOST.to_string();
    }

    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    let parsed = match Url::parse(&with_scheme) {
        Ok(url) => url,
        Err(_) => return DEFAULT_HOST.to_string(),
    };

    let authority = match parsed.host_str() {
        Some(authority) => authority,
        None => return DEFAULT_HOST.to_string(),
    };

    let port = parsed.port().unwrap_or(match parsed.scheme() {
        "https" => 443,
        _ => DEFAULT_PORT,
    });

    format!("{}://{}:{}", parsed.scheme(), authority, port)
}

/// Resolve the base URL from `OLLAMA_HOST`, falling back to the default.
pub fn host_from_env() -> String {
    resolve_host(&std::env::var(OLLAMA_HOST_ENV).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_host_resolves_to_loopback() {
        assert_eq!(resolve_host(""), "http://127.0.0.1:11434");
        assert_eq!(resolve_host("   "), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_bare_host_gets_scheme_and_port() {
        assert_eq!(resolve_host("example.com"), "http://example.com:11434");
    }

    #[test]
    fn test_https_host_gets_default_tls_port() {
        assert_eq!(resolve_host("https://example.com"), "https://example.com:443");
    }

    #[test]
    fn test_explicit_port_is_preserved() {
        assert_eq!(resolve_host("example.com:8080"), "http://example.com:8080");
        assert_eq!(
            resolve_host("https://example.com:8443"),
            "https://example.com:8443"
        );
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        assert_eq!(resolve_host("http://example.com/"), "http://example.com:11434");
        assert_eq!(
            resolve_host("https://example.com:443/"),
            "https://example.com:443"
        );
    }

    #[test]
    fn test_unparseable_host_falls_back_to_default() {
        assert_eq!(resolve_host("http://"), "http://127.0.0.1:11434");
    }
}

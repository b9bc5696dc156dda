use crate::error::{Error, Result};
use crate::http::{Address, Protocol, Uri};

/// Hop budget for one logical request.
pub const MAX_REDIRECTS: usize = 5;

/// Hop counter for a single top-level request. A fresh chain is made per
/// call so one chain's hops never count against another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectChain {
    hops: usize,
    limit: usize,
}

impl RedirectChain {
    pub fn new(limit: usize) -> Self {
        Self { hops: 0, limit }
    }

    pub fn hops(&self) -> usize {
        self.hops
    }

    pub fn exhausted(&self) -> bool {
        self.hops >= self.limit
    }

    /// Counts one more hop; `false` once the limit has been reached.
    pub fn advance(&mut self) -> bool {
        if self.exhausted() { return false }
        self.hops += 1;
        true
    }
}

impl Default for RedirectChain {
    fn default() -> Self {
        Self::new(MAX_REDIRECTS)
    }
}

/// Turns a `Location` value into a request target on the current connection.
/// Absolute and scheme-relative URLs must point back at `origin` over plain HTTP.
pub fn resolve_location(location: &str, origin: &Address) -> Result<String> {
    let unsupported = || Error::UnsupportedRedirectTarget(location.to_string());
    let trimmed = location.trim();
    let uri = match trimmed.strip_prefix("//") {
        Some(relative) => Uri::parse(&format!("http://{}", relative)),
        None => Uri::parse(trimmed),
    }.ok_or_else(unsupported)?;

    match (&uri.protocol, &uri.address) {
        (Some(Protocol::Https), _) => Err(unsupported()),
        (_, Some(address)) if !address.same_origin(origin) => Err(unsupported()),
        _ => Ok(uri.target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_stops_at_limit() {
        let mut chain = RedirectChain::default();
        for _ in 0..MAX_REDIRECTS {
            assert!(chain.advance());
        }
        assert!(!chain.advance());
        assert_eq!(chain.hops(), MAX_REDIRECTS);
    }

    #[test]
    fn relative_location_stays_on_connection() {
        let origin = Address::new("localhost", 8080);
        assert_eq!(resolve_location("/moved?x=1", &origin).unwrap(), "/moved?x=1");
    }

    #[test]
    fn same_origin_url_keeps_path() {
        let origin = Address::new("localhost", 8080);
        assert_eq!(resolve_location("http://LOCALHOST:8080/a", &origin).unwrap(), "/a");
        assert_eq!(resolve_location("http://localhost:8080", &origin).unwrap(), "/");
        assert_eq!(resolve_location("//localhost:8080/b", &origin).unwrap(), "/b");
    }

    #[test]
    fn other_origins_are_rejected() {
        let origin = Address::new("localhost", 8080);
        let locations = [
            "http://localhost:9090/a",
            "http://example.com/a",
            "https://localhost:8080/a",
            "//evil.example:9999/steal",
            "//localhost/a",
            "elsewhere",
        ];
        for location in locations {
            let error = resolve_location(location, &origin).unwrap_err();
            assert!(matches!(error, Error::UnsupportedRedirectTarget(_)), "{}", location);
        }
    }
}

use std::collections::{HashSet, VecDeque};

use url::Url;

use crate::core::error::{AuditError, Result};

/// A validated audit target.
///
/// Keeps the caller's spelling for the scanner command line; the parsed
/// `Url` is only used for validation and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    raw: String,
    url: Url,
}

impl Target {
    /// Accepts `http(s)://` URLs and scheme-less `www.` style hosts.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() || raw.starts_with('-') || raw.chars().any(char::is_whitespace) {
            return Err(AuditError::InvalidTarget(input.to_string()));
        }

        let raw = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };

        let url = Url::parse(&raw).map_err(|_| AuditError::InvalidTarget(input.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AuditError::InvalidTarget(input.to_string()));
        }
        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(AuditError::InvalidTarget(input.to_string())),
        }

        Ok(Self { raw, url })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Deduplicating target queue that tracks which targets have been seen.
#[derive(Debug, Default)]
pub struct TargetQueue {
    queue: VecDeque<String>,
    seen: HashSet<String>,
}

impl TargetQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target if it has not been queued before. Returns whether it was added.
    pub fn add_target(&mut self, target: impl Into<String>) -> bool {
        let target = target.into().trim().to_string();
        if target.is_empty() {
            return false;
        }
        if self.seen.insert(target.clone()) {
            self.queue.push_back(target);
            true
        } else {
            false
        }
    }

    pub fn next(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_http_urls() {
        let target = Target::parse("http://testphp.vulnweb.com/artists.php?artist=1").unwrap();
        assert_eq!(target.as_str(), "http://testphp.vulnweb.com/artists.php?artist=1");
        assert_eq!(target.host(), "testphp.vulnweb.com");
    }

    #[test]
    fn test_parse_adds_scheme_to_bare_host() {
        let target = Target::parse("www.example.com/item?id=2").unwrap();
        assert_eq!(target.as_str(), "http://www.example.com/item?id=2");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "   ", "--os-shell", "ftp://example.com", "http://", "http://exa mple.com"] {
            assert!(
                matches!(Target::parse(bad), Err(AuditError::InvalidTarget(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_queue_deduplicates() {
        let mut queue = TargetQueue::new();
        assert!(queue.add_target("http://a.com"));
        assert!(!queue.add_target("http://a.com "));
        assert!(queue.add_target("http://b.com"));
        assert!(!queue.add_target(""));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().as_deref(), Some("http://a.com"));
        assert_eq!(queue.next().as_deref(), Some("http://b.com"));
        assert!(queue.is_empty());
    }
}

//! Answer cache keyed by the exact queried name.

use crate::config::DnsCacheConfig;
use crate::dns::wire::ResourceRecord;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A cached answer list
struct DnsCacheEntry {
    answers: Vec<ResourceRecord>,
    /// None when TTLs are not honoured
    expires_at: Option<Instant>,
}

impl DnsCacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => now < at,
            None => true,
        }
    }
}

/// Address answers from upstream, reused for repeated queries.
///
/// Unbounded. With `respect_ttl` off entries live forever; with it on an
/// entry expires after the smallest TTL among its records.
pub struct DnsCache {
    entries: HashMap<String, DnsCacheEntry>,
    config: DnsCacheConfig,
}

impl DnsCache {
    pub fn new(config: DnsCacheConfig) -> Self {
        DnsCache {
            entries: HashMap::new(),
            config,
        }
    }

    /// Cached answers for `name`, if present and not expired
    pub fn get(&self, name: &str) -> Option<Vec<ResourceRecord>> {
        let entry = self.entries.get(name)?;
        if entry.is_live(Instant::now()) {
            Some(entry.answers.clone())
        } else {
            None
        }
    }

    /// Store `answers` under `name`, replacing any previous entry.
    /// Empty answer lists are not stored.
    pub fn put(&mut self, name: &str, answers: Vec<ResourceRecord>) {
        if answers.is_empty() {
            return;
        }

        let expires_at = if self.config.respect_ttl {
            let min_ttl = answers.iter().map(|r| r.ttl).min().unwrap_or(0);
            Some(Instant::now() + Duration::from_secs(min_ttl as u64))
        } else {
            None
        };

        self.entries.insert(
            name.to_string(),
            DnsCacheEntry {
                answers,
                expires_at,
            },
        );
    }

    /// Whether entries ever expire
    pub fn respects_ttl(&self) -> bool {
        self.config.respect_ttl
    }

    /// Remove expired entries
    pub fn cleanup(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

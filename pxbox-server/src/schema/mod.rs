//! Schema compiler
//!
//! Compiles JSON-Schema documents, caches the prepared form by content
//! hash, and validates response payloads. Remote `$ref` URLs are checked
//! against a configurable allowlist before anything else happens.
//!
//! The core never fetches remote documents. A schema whose top level is a
//! `$ref` to an external URL (the `remote-reference` kind) is prepared by
//! gating the URL through the allowlist and stored as a pass-through: the
//! form renderer resolves the document, and response payloads for that
//! kind are accepted without server-side validation. External references
//! nested inside an otherwise inline schema fail compilation for the same
//! reason.
//!
//! Cache: bounded, time-expiring LRU keyed by schema content. A hit skips
//! both compilation and the reference walk (both are pure functions of the
//! content).

use jsonschema::Validator;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use shared::error::{AppError, AppResult, ErrorCode};
use shared::model::SchemaKind;

/// A prepared schema document
enum Prepared {
    /// Compiled and ready to validate payloads
    Compiled(Validator),
    /// Top-level external `$ref`: allowlist-checked here, resolved by the
    /// rendering surface, payloads accepted as-is
    RemoteRef,
}

/// Prepared-schema cache entry
struct CacheEntry {
    prepared: Arc<Prepared>,
    inserted_at: Instant,
    last_used: u64,
}

struct Cache {
    entries: HashMap<String, CacheEntry>,
    /// Monotonic access tick for LRU ordering
    tick: u64,
}

/// Schema compiler with compiled-validator cache and `$ref` allowlist
pub struct SchemaCompiler {
    cache: Mutex<Cache>,
    capacity: usize,
    ttl: Duration,
    /// Allowed URL patterns; empty = allow all (development only)
    ref_allowlist: Vec<String>,
}

impl SchemaCompiler {
    pub fn new(capacity: usize, ttl: Duration, ref_allowlist: Vec<String>) -> Self {
        Self {
            cache: Mutex::new(Cache {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
            ttl,
            ref_allowlist,
        }
    }

    /// Prepare and cache a schema document.
    ///
    /// Fails with `ref_not_allowed` when the allowlist is non-empty and
    /// any `$ref` URL (nested included) falls outside it, and with
    /// `schema_invalid` when an inline document does not compile. A
    /// top-level external `$ref` prepares without being fetched.
    pub fn prepare(&self, schema: &Value) -> AppResult<()> {
        self.prepared(schema).map(|_| ())
    }

    fn prepared(&self, schema: &Value) -> AppResult<Arc<Prepared>> {
        let key = content_key(schema);
        if let Some(prepared) = self.cache_get(&key) {
            return Ok(prepared);
        }

        if !self.ref_allowlist.is_empty() {
            check_refs(schema, &self.ref_allowlist)?;
        }

        let is_remote_ref = schema
            .get("$ref")
            .and_then(Value::as_str)
            .map(|r| !r.starts_with('#'))
            .unwrap_or(false);
        let prepared = if is_remote_ref {
            // No retriever is wired up: the external document stays with
            // the rendering surface
            Prepared::RemoteRef
        } else {
            let validator = jsonschema::validator_for(schema).map_err(|e| {
                AppError::schema_invalid(format!("failed to compile schema: {e}"))
            })?;
            Prepared::Compiled(validator)
        };
        let prepared = Arc::new(prepared);
        self.cache_put(key, prepared.clone());
        Ok(prepared)
    }

    /// Validate a payload against a schema of the given kind.
    ///
    /// `jsonexample` schemas are informational and always pass, and so do
    /// `remote-reference` payloads — the referenced document cannot be
    /// fetched here, acceptance is gated at creation via the allowlist.
    pub fn validate(&self, kind: SchemaKind, schema: &Value, value: &Value) -> AppResult<()> {
        if !kind.validates() {
            return Ok(());
        }

        let prepared = self.prepared(schema)?;
        let validator = match prepared.as_ref() {
            Prepared::Compiled(validator) => validator,
            Prepared::RemoteRef => return Ok(()),
        };
        let paths: Vec<String> = validator
            .iter_errors(value)
            .map(|e| e.instance_path.to_string())
            .collect();
        if paths.is_empty() {
            return Ok(());
        }

        // First error message, all failing paths in details
        let message = validator
            .validate(value)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "payload does not satisfy the schema".to_string());
        Err(AppError::schema_violation(message).with_detail("paths", paths))
    }

    fn cache_get(&self, key: &str) -> Option<Arc<Prepared>> {
        let mut cache = self.cache.lock().unwrap();
        cache.tick += 1;
        let tick = cache.tick;
        match cache.entries.get_mut(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                entry.last_used = tick;
                Some(entry.prepared.clone())
            }
            Some(_) => {
                cache.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_put(&self, key: String, prepared: Arc<Prepared>) {
        let mut cache = self.cache.lock().unwrap();
        cache.tick += 1;
        let tick = cache.tick;
        if cache.entries.len() >= self.capacity && !cache.entries.contains_key(&key) {
            if let Some(oldest) = cache
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                cache.entries.remove(&oldest);
            }
        }
        cache.entries.insert(
            key,
            CacheEntry {
                prepared,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().entries.len()
    }
}

/// Cache key: SHA-256 of the canonical JSON bytes
fn content_key(schema: &Value) -> String {
    let bytes = serde_json::to_vec(schema).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

/// Walk the document and verify every `$ref` URL against the allowlist
fn check_refs(value: &Value, allowlist: &[String]) -> AppResult<()> {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if !is_ref_allowed(reference, allowlist) {
                    return Err(AppError::new(ErrorCode::RefNotAllowed)
                        .with_detail("ref", reference.to_string()));
                }
            }
            for nested in map.values() {
                check_refs(nested, allowlist)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                check_refs(item, allowlist)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn is_ref_allowed(reference: &str, allowlist: &[String]) -> bool {
    // Intra-document pointers are always local
    if reference.starts_with('#') {
        return true;
    }
    allowlist.iter().any(|p| matches_pattern(reference, p))
}

/// Pattern match: exact, trailing-wildcard prefix, or same host
fn matches_pattern(url: &str, pattern: &str) -> bool {
    if url == pattern {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return url.starts_with(prefix);
    }
    match (url_host(url), url_host(pattern)) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Authority component of an absolute URL ("scheme://host[:port]/...")
fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = &rest[..end];
    (!host.is_empty()).then_some(host)
}

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;
use crate::def::*;
use crate::message::{Request, Response};

/// What a `200 GET` left behind: the body, its validators and any file saved from it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: Vec<u8>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub saved_path: Option<PathBuf>,
}

/// Client-side validator cache keyed by method and path. Entries are only
/// ever replaced, never evicted.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<(Method, String), CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, method: &Method, path: &str) -> Option<&CacheEntry> {
        self.entries.get(&(method.clone(), path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `If-Modified-Since` / `If-None-Match` to a GET whose path is cached.
    pub fn apply(&self, request: &mut Request) {
        if request.method != Method::GET { return }
        let entry = match self.get(&request.method, &request.target) {
            Some(entry) => entry,
            None => return,
        };

        if let Some(last_modified) = &entry.last_modified {
            request.message.headers.set(IF_MODIFIED_SINCE, last_modified.as_str());
        }
        if let Some(etag) = &entry.etag {
            request.message.headers.set(IF_NONE_MATCH, etag.as_str());
        }
    }

    /// Records a `200` answer to a GET. Returns whether anything was stored.
    pub fn store(&mut self, method: &Method, path: &str, response: &Response, saved_path: Option<PathBuf>) -> bool {
        if *method != Method::GET || response.status != Status::Ok { return false }

        let headers = &response.message.headers;
        let entry = CacheEntry {
            body: response.message.body.clone(),
            last_modified: headers.get(LAST_MODIFIED).map(str::to_string),
            etag: headers.get(ETAG).map(str::to_string),
            saved_path,
        };
        debug!(%method, path, etag = ?entry.etag, last_modified = ?entry.last_modified, "cached response");
        self.entries.insert((method.clone(), path.to_string()), entry);
        true
    }

    /// Fills a `304` with the cached body. `None` when nothing was cached for the key.
    pub fn revalidate(&self, method: &Method, path: &str, response: &mut Response) -> Option<&CacheEntry> {
        let entry = self.get(method, path)?;
        response.message.set_body(entry.body.clone());
        Some(entry)
    }
}

// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Navigation history.

use std::fmt;

/// A parsed location: path, optional query string and optional fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Path component, always starting with `/`.
    pub path: String,
    /// Query string without the leading `?`.
    pub query: Option<String>,
    /// Fragment without the leading `#`.
    pub hash: Option<String>,
}

impl Location {
    /// Parses a path-absolute URL such as `/docs?x=1#intro`.
    pub fn parse(url: &str) -> Self {
        let (rest, hash) = match url.split_once('#') {
            Some((rest, hash)) => (rest, Some(hash.to_string())),
            None => (url, None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (rest, None),
        };

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        Self {
            path,
            query: query.filter(|q| !q.is_empty()),
            hash: hash.filter(|h| !h.is_empty()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(hash) = &self.hash {
            write!(f, "#{}", hash)?;
        }
        Ok(())
    }
}

/// The host's navigation history (the browser's `window.history`).
pub trait History {
    /// The current location.
    fn location(&self) -> Location;
    /// Pushes a new entry.
    fn push(&mut self, url: &str);
    /// Replaces the current entry.
    fn replace(&mut self, url: &str);
    /// Goes one entry back. Returns false at the first entry.
    fn back(&mut self) -> bool;
    /// Reloads the current entry.
    fn reload(&mut self);
}

/// An in-memory [`History`] for tests and non-browser hosts.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<Location>,
    index: usize,
    reloads: usize,
}

impl MemoryHistory {
    /// Creates a history with a single entry.
    pub fn new(url: &str) -> Self {
        Self {
            entries: vec![Location::parse(url)],
            index: 0,
            reloads: 0,
        }
    }

    /// Number of entries up to and including the current one.
    pub fn len(&self) -> usize {
        self.index + 1
    }

    /// Always false: a history has at least one entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// How many times [`History::reload`] was called.
    pub fn reloads(&self) -> usize {
        self.reloads
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        self.entries[self.index].clone()
    }

    fn push(&mut self, url: &str) {
        self.entries.truncate(self.index + 1);
        self.entries.push(Location::parse(url));
        self.index = self.entries.len() - 1;
    }

    fn replace(&mut self, url: &str) {
        self.entries[self.index] = Location::parse(url);
    }

    fn back(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    fn reload(&mut self) {
        self.reloads += 1;
    }
}

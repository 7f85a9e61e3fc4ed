// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source map registry
//!
//! Process-wide table from absolute file path to the most recently produced
//! source map for that path. Written on every successful compile, read by
//! the stack-frame formatter; a miss means the frame keeps its transformed
//! location. Cleared on hook uninstall.

use crate::error::Result;
use dashmap::DashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A decoded source map, ready for position lookups
#[derive(Debug)]
pub struct SourceMap {
    sources: Vec<String>,
    /// Decoded segments per generated line
    lines: Vec<Vec<Segment>>,
}

/// One decoded mapping segment
#[derive(Debug, Clone, Copy)]
struct Segment {
    generated_column: u32,
    source: u32,
    original_line: u32,
    original_column: u32,
}

/// Original-source position resolved from a generated location.
/// Line and column are 1-based for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    /// Original source file named by the map, if indexed
    pub source: Option<String>,
    /// 1-based original line
    pub line: u32,
    /// 1-based original column
    pub column: u32,
}

/// Wire form of a version-3 source map
#[derive(Debug, Deserialize)]
struct RawSourceMap {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    mappings: String,
}

impl SourceMap {
    /// Parse a JSON source map and decode its mappings.
    ///
    /// Unknown VLQ characters make individual segments drop out rather than
    /// failing the whole map; lookups simply miss there.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        Ok(Self {
            sources: raw.sources,
            lines: decode_mappings(&raw.mappings),
        })
    }

    /// Map a generated position (1-based line and column) back to the
    /// original source
    pub fn lookup(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let segments = self.lines.get(line.checked_sub(1)? as usize)?;
        let column = column.saturating_sub(1);

        let segment = segments
            .iter()
            .rev()
            .find(|s| s.generated_column <= column)
            .or_else(|| segments.first())?;

        Some(OriginalPosition {
            source: self.sources.get(segment.source as usize).cloned(),
            line: segment.original_line + 1,
            column: segment.original_column + 1,
        })
    }
}

/// Decode the `mappings` field: one group per generated line, segments
/// relative to their predecessors per the version-3 encoding
fn decode_mappings(mappings: &str) -> Vec<Vec<Segment>> {
    let mut lines = Vec::new();
    let mut source = 0i64;
    let mut original_line = 0i64;
    let mut original_column = 0i64;

    for group in mappings.split(';') {
        let mut segments = Vec::new();
        let mut generated_column = 0i64;

        for raw in group.split(',') {
            if raw.is_empty() {
                continue;
            }
            let Some(fields) = decode_vlq(raw) else {
                continue;
            };
            if fields.is_empty() {
                continue;
            }

            generated_column += fields[0];
            if fields.len() >= 4 {
                source += fields[1];
                original_line += fields[2];
                original_column += fields[3];
                segments.push(Segment {
                    generated_column: generated_column.max(0) as u32,
                    source: source.max(0) as u32,
                    original_line: original_line.max(0) as u32,
                    original_column: original_column.max(0) as u32,
                });
            }
        }

        lines.push(segments);
    }

    lines
}

/// Decode one base64-VLQ segment into signed fields
fn decode_vlq(segment: &str) -> Option<Vec<i64>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut fields = Vec::new();
    let mut value = 0i64;
    let mut shift = 0u32;

    for ch in segment.bytes() {
        let digit = ALPHABET.iter().position(|&c| c == ch)? as i64;
        value |= (digit & 31) << shift;

        if digit & 32 != 0 {
            shift += 5;
        } else {
            let negative = value & 1 != 0;
            let magnitude = value >> 1;
            fields.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        }
    }

    Some(fields)
}

/// Injected map store: absolute path to latest map, last write wins
pub struct SourceMapRegistry {
    maps: DashMap<PathBuf, Arc<SourceMap>>,
}

impl SourceMapRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            maps: DashMap::new(),
        }
    }

    /// Get the latest map registered for `path`
    pub fn get(&self, path: &Path) -> Option<Arc<SourceMap>> {
        self.maps.get(path).map(|entry| Arc::clone(&entry))
    }

    /// Register the latest map for `path`, replacing any earlier entry.
    /// A malformed map is dropped (later lookups miss and frames keep their
    /// transformed locations).
    pub fn set(&self, path: PathBuf, map_json: &str) {
        match SourceMap::parse(map_json) {
            Ok(map) => {
                self.maps.insert(path, Arc::new(map));
            }
            Err(err) => {
                tracing::debug!("dropping unparseable source map for {}: {}", path.display(), err);
            }
        }
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.maps.clear();
    }

    /// Number of registered maps
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Whether the registry holds no maps
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl Default for SourceMapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

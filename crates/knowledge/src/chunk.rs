//! Knowledge chunks and the chunk directory loader.
//!
//! Directory layout:
//!
//! ```text
//! knowledge/
//!   India/rule_10d.txt        -> jurisdiction "India"
//!   US/treas_reg_1.482.txt    -> jurisdiction "US"
//!   oecd/chapter_i.txt        -> jurisdiction-agnostic
//!   extra.jsonl               -> one JSON-encoded chunk per line
//! ```
//!
//! Files under `global/` or `oecd/` and files at the top level apply to
//! every jurisdiction. A text file inside a folder gets the id
//! `{folder}/{stem}` (`India/rule_10d`); top-level files keep the bare stem.
//! Text longer than [`MAX_CHUNK_CHARS`] is split into `{id}_chunk_{n}`
//! pieces. Ids are unique: later chunks reusing an id are skipped.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tpforge_core::error::RetrievalError;
use tracing::{debug, warn};

pub const MAX_CHUNK_CHARS: usize = 5000;

const AGNOSTIC_DIRS: [&str; 2] = ["global", "oecd"];

/// One retrievable piece of regulatory text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Doubles as the citation source id
    pub id: String,

    /// `None` = applies to all jurisdictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl KnowledgeChunk {
    pub fn new(id: impl Into<String>, jurisdiction: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            jurisdiction: jurisdiction.map(String::from),
            title: None,
            text: text.into(),
            embedding: None,
        }
    }

    /// Whether this chunk may be used for `jurisdiction`.
    pub fn applies_to(&self, jurisdiction: &str) -> bool {
        match &self.jurisdiction {
            None => true,
            Some(j) => j.eq_ignore_ascii_case(jurisdiction),
        }
    }
}

/// Load every chunk under `dir`. A missing directory yields no chunks.
pub fn load_dir(dir: &Path) -> Result<Vec<KnowledgeChunk>, RetrievalError> {
    if !dir.exists() {
        debug!(path = %dir.display(), "Knowledge directory not found, starting empty");
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    for path in sorted_entries(dir)? {
        if path.is_dir() {
            let folder = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let jurisdiction = if AGNOSTIC_DIRS.iter().any(|d| d.eq_ignore_ascii_case(&folder)) {
                None
            } else {
                Some(folder.as_str())
            };
            for file in sorted_entries(&path)? {
                if file.is_file() {
                    load_file(&file, Some(folder.as_str()), jurisdiction, &mut chunks);
                }
            }
        } else {
            load_file(&path, None, None, &mut chunks);
        }
    }

    let chunks = dedup_ids(chunks);
    debug!(path = %dir.display(), count = chunks.len(), "Knowledge chunks loaded");
    Ok(chunks)
}

/// Keep the first chunk for each id.
pub(crate) fn dedup_ids(chunks: Vec<KnowledgeChunk>) -> Vec<KnowledgeChunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| {
            let fresh = seen.insert(c.id.clone());
            if !fresh {
                warn!(id = %c.id, "Skipping chunk with duplicate id");
            }
            fresh
        })
        .collect()
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, RetrievalError> {
    let read = std::fs::read_dir(dir).map_err(|e| load_failed(dir, e))?;
    let mut paths: Vec<PathBuf> = read.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    Ok(paths)
}

fn load_failed(path: &Path, e: impl std::fmt::Display) -> RetrievalError {
    RetrievalError::LoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Read a text file; invalid UTF-8 is replaced, unreadable files are skipped.
fn read_text(path: &Path) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable knowledge file");
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(path = %path.display(), "Knowledge file is not valid UTF-8, replacing invalid bytes");
            Some(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

fn load_file(
    path: &Path,
    folder: Option<&str>,
    jurisdiction: Option<&str>,
    out: &mut Vec<KnowledgeChunk>,
) {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        "txt" | "md" => {
            let Some(text) = read_text(path) else {
                return;
            };
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("chunk");
            let id = match folder {
                Some(folder) => format!("{folder}/{stem}"),
                None => stem.to_string(),
            };
            out.extend(split_text(&id, stem, jurisdiction, &text));
        }
        "jsonl" => {
            let Some(content) = read_text(path) else {
                return;
            };
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<KnowledgeChunk>(line) {
                    Ok(mut chunk) => {
                        if chunk.jurisdiction.is_none() {
                            chunk.jurisdiction = jurisdiction.map(String::from);
                        }
                        out.push(chunk);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping corrupted chunk");
                    }
                }
            }
        }
        _ => {}
    }
}

/// Split `text` into pieces of at most [`MAX_CHUNK_CHARS`] characters.
fn split_text(id: &str, title: &str, jurisdiction: Option<&str>, text: &str) -> Vec<KnowledgeChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MAX_CHUNK_CHARS {
        let mut chunk = KnowledgeChunk::new(id, jurisdiction, text);
        chunk.title = Some(title.to_string());
        return vec![chunk];
    }

    chars
        .chunks(MAX_CHUNK_CHARS)
        .enumerate()
        .map(|(i, piece)| {
            let mut chunk = KnowledgeChunk::new(
                format!("{id}_chunk_{}", i + 1),
                jurisdiction,
                piece.iter().collect::<String>(),
            );
            chunk.title = Some(title.to_string());
            chunk
        })
        .collect()
}

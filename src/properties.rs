//! Key/value configuration files.
//!
//! Server configuration files (`tomcat.conf`, `CS.cfg`) are plain
//! `KEY=value` lines. [`KeyValueFile`] keeps every line in order so that
//! comments, blank lines and keys we never touch survive a rewrite.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry {
        key: String,
        value: String,
        /// Text as read from disk; cleared once the entry is edited.
        raw: Option<String>,
    },
    Other(String),
}

/// Ordered `KEY=value` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueFile {
    path: PathBuf,
    lines: Vec<Line>,
}

impl KeyValueFile {
    /// Create an empty in-memory file bound to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: Vec::new(),
        }
    }

    /// Load `path`, treating a missing file as empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            lines: parse_lines(&raw),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key`, replacing the existing entry in place or appending.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v, raw } = line {
                if k == key {
                    if *v != value {
                        *v = value;
                        *raw = None;
                    }
                    return;
                }
            }
        }
        self.lines.push(Line::Entry {
            key: key.to_string(),
            value,
            raw: None,
        });
    }

    /// Remove every entry for `key`. Returns true if anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(line, Line::Entry { key: k, .. } if k == key));
        before != self.lines.len()
    }

    /// Rename `from` to `to`, keeping the entry's position.
    ///
    /// Returns false if `from` does not exist. An existing `to` entry is
    /// dropped.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if self.get(from).is_none() {
            return false;
        }
        if from != to {
            self.remove(to);
        }
        for line in &mut self.lines {
            if let Line::Entry { key, raw, .. } = line {
                if key == from {
                    *key = to.to_string();
                    *raw = None;
                }
            }
        }
        true
    }

    /// Iterate over `(key, value)` entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
            Line::Other(_) => None,
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { raw: Some(raw), .. } => out.push_str(raw),
                Line::Entry { key, value, raw: None } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Other(text) => out.push_str(text),
            }
            out.push('\n');
        }
        out
    }

    /// Write the file atomically: a sibling temp file is written and then
    /// renamed over the target.
    pub fn store(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, self.to_text())?;
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

fn parse_lines(raw: &str) -> Vec<Line> {
    raw.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return Line::Other(line.to_string());
            }
            match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => Line::Entry {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                    raw: Some(line.to_string()),
                },
                _ => Line::Other(line.to_string()),
            }
        })
        .collect()
}

//! Minimal YAML-subset front matter parser for knowledge files.
//!
//! Supports the handful of shapes `spec.md` §6 actually needs: scalar
//! `key: value` lines, `key:` followed by `  - item` list lines, and
//! quoted strings. Not a YAML parser — deliberately smaller, matching
//! the teacher's "no heavier dependency than the job needs" posture.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq)]
pub enum FrontMatterValue {
    Scalar(String),
    List(Vec<String>),
}

impl FrontMatterValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FrontMatterValue::Scalar(s) => Some(s),
            FrontMatterValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            FrontMatterValue::Scalar(s) => vec![s.clone()],
            FrontMatterValue::List(l) => l.clone(),
        }
    }
}

/// Ordered front matter map (insertion order preserved for stable writes).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    entries: Vec<(String, FrontMatterValue)>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scalar(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = FrontMatterValue::Scalar(value.into());
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn set_list(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        let value = FrontMatterValue::List(values);
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&FrontMatterValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_scalar())
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(|v| v.as_list()).unwrap_or_default()
    }

    pub fn as_map(&self) -> BTreeMap<String, FrontMatterValue> {
        self.entries.iter().cloned().collect()
    }

    /// Parse a full markdown document `---\n...\n---\nbody`.
    pub fn parse_document(raw: &str) -> CoreResult<(FrontMatter, String)> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let rest = raw
            .strip_prefix("---\n")
            .ok_or_else(|| CoreError::validation("knowledge file missing front matter delimiter"))?;
        let end = rest
            .find("\n---")
            .ok_or_else(|| CoreError::validation("knowledge file missing closing delimiter"))?;
        let fm_block = &rest[..end];
        let after = &rest[end + 4..];
        let body = after.strip_prefix('\n').unwrap_or(after).to_string();
        Ok((Self::parse(fm_block)?, body))
    }

    fn parse(block: &str) -> CoreResult<FrontMatter> {
        let mut fm = FrontMatter::new();
        let mut lines = block.lines().peekable();
        while let Some(line) = lines.next() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_string();
            let rest = rest.trim();
            if rest.is_empty() {
                let mut items = Vec::new();
                while let Some(next) = lines.peek() {
                    let trimmed = next.trim_start();
                    if let Some(item) = trimmed.strip_prefix("- ") {
                        items.push(unquote(item.trim()));
                        lines.next();
                    } else {
                        break;
                    }
                }
                fm.entries.push((key, FrontMatterValue::List(items)));
            } else if let Some(inline_list) = rest.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                let items = inline_list
                    .split(',')
                    .map(|s| unquote(s.trim()))
                    .filter(|s| !s.is_empty())
                    .collect();
                fm.entries.push((key, FrontMatterValue::List(items)));
            } else {
                fm.entries.push((key, FrontMatterValue::Scalar(unquote(rest))));
            }
        }
        Ok(fm)
    }

    /// Render back to the `---\n...\n---\n` block, followed by `body`.
    pub fn render_document(&self, body: &str) -> String {
        let mut out = String::from("---\n");
        for (key, value) in &self.entries {
            match value {
                FrontMatterValue::Scalar(s) => {
                    let _ = writeln!(out, "{key}: {}", quote_if_needed(s));
                }
                FrontMatterValue::List(items) => {
                    if items.is_empty() {
                        let _ = writeln!(out, "{key}: []");
                    } else {
                        let _ = writeln!(out, "{key}:");
                        for item in items {
                            let _ = writeln!(out, "  - {}", quote_if_needed(item));
                        }
                    }
                }
            }
        }
        out.push_str("---\n");
        out.push_str(body);
        out
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn quote_if_needed(s: &str) -> String {
    if s.contains(':') || s.contains('#') || s.is_empty() {
        format!("\"{}\"", s.replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars_and_lists() {
        let mut fm = FrontMatter::new();
        fm.set_scalar("title", "Flaky retry loop");
        fm.set_scalar("category", "pits");
        fm.set_list("tags", vec!["retry".into(), "flaky".into()]);

        let doc = fm.render_document("body text\n");
        let (parsed, body) = FrontMatter::parse_document(&doc).unwrap();
        assert_eq!(parsed.get_scalar("title"), Some("Flaky retry loop"));
        assert_eq!(parsed.get_list("tags"), vec!["retry", "flaky"]);
        assert_eq!(body, "body text\n");
    }

    #[test]
    fn parses_inline_list_syntax() {
        let raw = "---\ntitle: x\ntags: [a, b, c]\n---\nbody\n";
        let (fm, body) = FrontMatter::parse_document(raw).unwrap();
        assert_eq!(fm.get_list("tags"), vec!["a", "b", "c"]);
        assert_eq!(body, "body\n");
    }

    #[test]
    fn missing_delimiter_is_validation_error() {
        let err = FrontMatter::parse_document("no front matter here").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}

//! Candidate extraction: code-shape heuristics plus decision markers
//! over a single session's event payloads (spec §4.10).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::types::PatternCandidate;
use crate::knowledge::KnowledgeCategory;
use crate::session_log::SessionEvent;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\n(.*?)```").unwrap());

static DECISION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(decided to|we chose|chose to|opted for|going with)\b").unwrap()
});

static PIT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(root cause|the bug was|caused by|failed because)\b").unwrap()
});

static SOLUTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(the fix was|resolved by|fixed by|solution:)\b").unwrap());

/// Walks an extracted text corpus and collects every candidate it
/// recognizes for one session's events.
pub fn extract_candidates(session_id: &str, events: &[SessionEvent]) -> Vec<PatternCandidate> {
    let mut candidates = Vec::new();
    for event in events {
        let Some(data) = &event.data else { continue };
        let text = collect_strings(data);
        if text.is_empty() {
            continue;
        }

        for cap in CODE_FENCE.captures_iter(&text) {
            let body = cap[1].trim().to_string();
            if body.is_empty() {
                continue;
            }
            push_candidate(
                &mut candidates,
                session_id,
                KnowledgeCategory::Patterns,
                &body,
                &body,
            );
        }

        for sentence in split_sentences(&text) {
            if DECISION_MARKER.is_match(&sentence) {
                push_candidate(
                    &mut candidates,
                    session_id,
                    KnowledgeCategory::Decisions,
                    &sentence,
                    &sentence,
                );
            } else if PIT_MARKER.is_match(&sentence) {
                push_candidate(
                    &mut candidates,
                    session_id,
                    KnowledgeCategory::Pits,
                    &sentence,
                    &sentence,
                );
            } else if SOLUTION_MARKER.is_match(&sentence) {
                push_candidate(
                    &mut candidates,
                    session_id,
                    KnowledgeCategory::Solutions,
                    &sentence,
                    &sentence,
                );
            }
        }
    }
    candidates
}

fn push_candidate(
    out: &mut Vec<PatternCandidate>,
    session_id: &str,
    category: KnowledgeCategory,
    title_source: &str,
    body: &str,
) {
    let key = normalize_key(title_source);
    if key.is_empty() {
        return;
    }
    out.push(PatternCandidate {
        key,
        category,
        title: summarize_title(title_source),
        body: body.to_string(),
        session_id: session_id.to_string(),
    });
}

/// Lowercased, whitespace-collapsed, alnum-only digest used to dedupe
/// the same candidate recognized in different sessions.
fn normalize_key(text: &str) -> String {
    let lower = text.to_lowercase();
    let collapsed: String = lower
        .split_whitespace()
        .take(12)
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

fn summarize_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    let words: Vec<&str> = first_line.split_whitespace().take(10).collect();
    let mut title = words.join(" ");
    if title.len() > 80 {
        title.truncate(80);
    }
    if title.is_empty() {
        title = "Untitled pattern".to_string();
    }
    title
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '\n'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn collect_strings(value: &Value) -> String {
    let mut out = String::new();
    collect_strings_into(value, &mut out);
    out
}

fn collect_strings_into(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Value::Array(items) => {
            for item in items {
                collect_strings_into(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_strings_into(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SessionId;

    fn event_with(data: Value) -> SessionEvent {
        SessionEvent::new("agent.turn", SessionId::new(), Some(data))
    }

    #[test]
    fn extracts_code_fence_as_pattern() {
        let events = vec![event_with(serde_json::json!({
            "output": "Use this retry helper:\n```rust\nfn retry() {}\n```\ndone"
        }))];
        let candidates = extract_candidates("s1", &events);
        assert!(candidates
            .iter()
            .any(|c| c.category == KnowledgeCategory::Patterns && c.body.contains("fn retry")));
    }

    #[test]
    fn extracts_decision_marker() {
        let events = vec![event_with(serde_json::json!({
            "output": "We chose to use axum for the gateway transport."
        }))];
        let candidates = extract_candidates("s1", &events);
        assert!(candidates
            .iter()
            .any(|c| c.category == KnowledgeCategory::Decisions));
    }

    #[test]
    fn extracts_pit_marker() {
        let events = vec![event_with(serde_json::json!({
            "output": "The root cause was a missing await on the session lock."
        }))];
        let candidates = extract_candidates("s1", &events);
        assert!(candidates
            .iter()
            .any(|c| c.category == KnowledgeCategory::Pits));
    }

    #[test]
    fn ignores_events_without_data() {
        let events = vec![SessionEvent::new("task.started", SessionId::new(), None)];
        assert!(extract_candidates("s1", &events).is_empty());
    }

    #[test]
    fn normalize_key_is_case_and_punctuation_insensitive() {
        assert_eq!(normalize_key("Decided To Use Axum!"), normalize_key("decided to use axum"));
    }
}

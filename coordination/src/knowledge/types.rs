//! Knowledge item types (spec §3, §4.2, §6).

use chrono::{DateTime, Utc};

use super::front_matter::FrontMatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KnowledgeCategory {
    Pits,
    Patterns,
    Decisions,
    Solutions,
}

impl KnowledgeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            KnowledgeCategory::Pits => "pits",
            KnowledgeCategory::Patterns => "patterns",
            KnowledgeCategory::Decisions => "decisions",
            KnowledgeCategory::Solutions => "solutions",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pits" => Some(KnowledgeCategory::Pits),
            "patterns" => Some(KnowledgeCategory::Patterns),
            "decisions" => Some(KnowledgeCategory::Decisions),
            "solutions" => Some(KnowledgeCategory::Solutions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeSource {
    Auto,
    Manual,
}

impl KnowledgeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            KnowledgeSource::Auto => "auto",
            KnowledgeSource::Manual => "manual",
        }
    }
}

/// A single knowledge file: front matter plus body, addressed by
/// `(source, category, slug)`.
#[derive(Debug, Clone)]
pub struct KnowledgeItem {
    pub category: KnowledgeCategory,
    pub slug: String,
    pub source: KnowledgeSource,
    pub title: String,
    pub tags: Vec<String>,
    pub severity: Option<String>,
    pub discovered: DateTime<Utc>,
    pub occurrences: Option<u32>,
    pub related_sessions: Vec<String>,
    pub manual_edited: bool,
    pub reflector_can_update: bool,
    pub version: u32,
    pub body: String,
}

impl KnowledgeItem {
    pub fn new(
        category: KnowledgeCategory,
        slug: impl Into<String>,
        source: KnowledgeSource,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            category,
            slug: slug.into(),
            source,
            title: title.into(),
            tags: Vec::new(),
            severity: None,
            discovered: Utc::now(),
            occurrences: None,
            related_sessions: Vec::new(),
            manual_edited: false,
            reflector_can_update: true,
            version: 1,
            body: body.into(),
        }
    }

    pub(crate) fn from_front_matter(fm: FrontMatter, body: String, slug: &str) -> Option<Self> {
        let category = KnowledgeCategory::parse(fm.get_scalar("category")?)?;
        let source = match fm.get_scalar("source")? {
            "auto" => KnowledgeSource::Auto,
            "manual" => KnowledgeSource::Manual,
            _ => return None,
        };
        let discovered = fm
            .get_scalar("discovered")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(Self {
            category,
            slug: slug.to_string(),
            source,
            title: fm.get_scalar("title").unwrap_or(slug).to_string(),
            tags: fm.get_list("tags"),
            severity: fm.get_scalar("severity").map(String::from),
            discovered,
            occurrences: fm.get_scalar("occurrences").and_then(|s| s.parse().ok()),
            related_sessions: fm.get_list("related_sessions"),
            manual_edited: fm.get_scalar("manual_edited") == Some("true"),
            reflector_can_update: fm.get_scalar("reflector_can_update") != Some("false"),
            version: fm
                .get_scalar("version")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            body,
        })
    }

    pub(crate) fn to_front_matter(&self) -> FrontMatter {
        let mut fm = FrontMatter::new();
        fm.set_scalar("title", &self.title);
        fm.set_scalar("category", self.category.as_str());
        fm.set_list("tags", self.tags.clone());
        if let Some(sev) = &self.severity {
            fm.set_scalar("severity", sev);
        }
        fm.set_scalar("discovered", self.discovered.to_rfc3339());
        fm.set_scalar("source", self.source.as_str());
        if let Some(occ) = self.occurrences {
            fm.set_scalar("occurrences", occ.to_string());
        }
        if !self.related_sessions.is_empty() {
            fm.set_list("related_sessions", self.related_sessions.clone());
        }
        fm.set_scalar("manual_edited", self.manual_edited.to_string());
        fm.set_scalar("reflector_can_update", self.reflector_can_update.to_string());
        fm.set_scalar("version", self.version.to_string());
        fm
    }

    pub fn render(&self) -> String {
        self.to_front_matter().render_document(&self.body)
    }

    /// Weighted content-search score against a single query term, per
    /// the scoring table: title hit (10), tag hit (5), body occurrence
    /// (1 each), category hit (3).
    pub(crate) fn score_for_term(&self, term: &str) -> u32 {
        let term_lower = term.to_lowercase();
        let mut score = 0u32;
        if self.title.to_lowercase().contains(&term_lower) {
            score += 10;
        }
        if self
            .tags
            .iter()
            .any(|t| t.to_lowercase().contains(&term_lower))
        {
            score += 5;
        }
        if self.category.as_str().contains(&term_lower) {
            score += 3;
        }
        score += self.body.to_lowercase().matches(&term_lower).count() as u32;
        score
    }
}

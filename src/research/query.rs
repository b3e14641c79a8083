//! Research queries and their constraints.

use crate::research::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Longest query text accepted, in characters.
pub const MAX_QUERY_CHARS: usize = 2000;

/// Channel a scrape task draws its source from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// General web search
    Web,
    /// Preprint / paper search (arXiv)
    Academic,
    /// PDF documents
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "web",
            SourceType::Academic => "academic",
            SourceType::Pdf => "pdf",
        }
    }

    /// Search query used to find sources of this type.
    pub fn search_query(&self, query: &str) -> String {
        match self {
            SourceType::Web => query.to_string(),
            SourceType::Academic => format!("{} site:arxiv.org", query),
            SourceType::Pdf => format!("{} filetype:pdf", query),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "web" => Ok(SourceType::Web),
            "academic" | "arxiv" => Ok(SourceType::Academic),
            "pdf" => Ok(SourceType::Pdf),
            other => Err(format!("unknown source type '{}'", other)),
        }
    }
}

/// Citation formatting style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    #[default]
    Apa,
    Mla,
    Chicago,
}

impl std::str::FromStr for CitationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apa" => Ok(CitationStyle::Apa),
            "mla" => Ok(CitationStyle::Mla),
            "chicago" => Ok(CitationStyle::Chicago),
            other => Err(format!("unknown citation style '{}'", other)),
        }
    }
}

/// Optional constraints attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConstraints {
    /// Target languages for translated variants of the summary
    #[serde(default)]
    pub languages: Vec<String>,
    /// Source channels; empty means the configured default
    #[serde(default)]
    pub source_types: Vec<SourceType>,
    /// Explicit URLs to scrape in addition to searched sources
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub citation_style: Option<CitationStyle>,
    #[serde(default)]
    pub summary_bullets: Option<usize>,
}

/// An immutable research request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    constraints: QueryConstraints,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            constraints: QueryConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: QueryConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.constraints.languages.push(language.into());
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.constraints.source_types.push(source_type);
        self
    }

    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        self.constraints.sources.push(url.into());
        self
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn constraints(&self) -> &QueryConstraints {
        &self.constraints
    }

    /// Check the query text and constraints.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let text = self.text();
        if text.is_empty() {
            return Err(ConfigurationError::InvalidQuery(
                "query text is empty".to_string(),
            ));
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(ConfigurationError::InvalidQuery(format!(
                "query text exceeds {} characters",
                MAX_QUERY_CHARS
            )));
        }

        for lang in &self.constraints.languages {
            if !is_language_code(lang) {
                return Err(ConfigurationError::InvalidQuery(format!(
                    "'{}' is not a language code",
                    lang
                )));
            }
        }

        for source in &self.constraints.sources {
            let lower = source.to_lowercase();
            if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                return Err(ConfigurationError::InvalidQuery(format!(
                    "source '{}' is not an http(s) URL",
                    source
                )));
            }
        }

        if self.constraints.summary_bullets == Some(0) {
            return Err(ConfigurationError::InvalidQuery(
                "summary_bullets must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// `en`, `fra`, `pt-BR` style codes.
fn is_language_code(code: &str) -> bool {
    let mut parts = code.split('-');
    let primary = parts.next().unwrap_or_default();
    let primary_ok =
        (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_lowercase());

    let region_ok = match (parts.next(), parts.next()) {
        (None, _) => true,
        (Some(region), None) => {
            region.len() == 2 && region.chars().all(|c| c.is_ascii_uppercase())
        }
        _ => false,
    };

    primary_ok && region_ok
}

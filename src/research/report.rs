//! Research report model
//!
//! A [`Report`] is an ordered list of [`Section`]s. Each section carries its
//! content and whether it is complete or degraded by failed tasks.

use crate::capabilities::{SentimentLabel, Verdict};
use crate::research::query::{CitationStyle, SourceType};
use crate::research::run::RunId;
use crate::research::task::{ClaimVerdict, Translation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use utoipa::ToSchema;

/// Section identifiers, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    FactCheck,
    Translations,
    Sentiment,
    Citations,
    Sources,
}

impl SectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::Summary => "Summary",
            SectionKind::FactCheck => "Fact Check",
            SectionKind::Translations => "Translations",
            SectionKind::Sentiment => "Sentiment",
            SectionKind::Citations => "Citations",
            SectionKind::Sources => "Sources",
        }
    }
}

/// Whether every task feeding a section succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SectionStatus {
    Complete,
    /// One `"<task id>: <reason>"` entry per failed task
    Degraded { reasons: Vec<String> },
}

impl SectionStatus {
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            SectionStatus::Complete
        } else {
            SectionStatus::Degraded { reasons }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SourceEntry {
    pub url: String,
    pub title: Option<String>,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionContent {
    Summary { bullets: Vec<String> },
    FactCheck { verdicts: Vec<ClaimVerdict> },
    Translations { items: Vec<Translation> },
    Sentiment { label: Option<SentimentLabel> },
    Citations { style: CitationStyle, entries: Vec<String> },
    Sources { items: Vec<SourceEntry> },
}

impl SectionContent {
    pub fn kind(&self) -> SectionKind {
        match self {
            SectionContent::Summary { .. } => SectionKind::Summary,
            SectionContent::FactCheck { .. } => SectionKind::FactCheck,
            SectionContent::Translations { .. } => SectionKind::Translations,
            SectionContent::Sentiment { .. } => SectionKind::Sentiment,
            SectionContent::Citations { .. } => SectionKind::Citations,
            SectionContent::Sources { .. } => SectionKind::Sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Section {
    pub status: SectionStatus,
    pub content: SectionContent,
}

impl Section {
    pub fn new(content: SectionContent, reasons: Vec<String>) -> Self {
        Self {
            status: SectionStatus::from_reasons(reasons),
            content,
        }
    }

    pub fn kind(&self) -> SectionKind {
        self.content.kind()
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, SectionStatus::Degraded { .. })
    }

    pub fn reasons(&self) -> &[String] {
        match &self.status {
            SectionStatus::Complete => &[],
            SectionStatus::Degraded { reasons } => reasons,
        }
    }
}

/// Final output of a research run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Report {
    #[schema(value_type = String, format = Uuid)]
    pub run_id: RunId,
    pub query: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
}

impl Report {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind() == kind)
    }

    pub fn is_degraded(&self) -> bool {
        self.sections.iter().any(Section::is_degraded)
    }

    /// Render the report as a markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Research Report\n");
        let _ = writeln!(out, "**Query:** {}  ", self.query);
        let _ = writeln!(out, "**Run:** {}  ", self.run_id);
        let _ = writeln!(
            out,
            "**Generated:** {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );

        for section in &self.sections {
            let _ = writeln!(out, "## {}\n", section.kind().title());
            for reason in section.reasons() {
                let _ = writeln!(out, "> ⚠ degraded: {}", reason);
            }
            if section.is_degraded() {
                out.push('\n');
            }

            match &section.content {
                SectionContent::Summary { bullets } => {
                    for bullet in bullets {
                        let _ = writeln!(out, "- {}", bullet);
                    }
                }
                SectionContent::FactCheck { verdicts } => {
                    for v in verdicts {
                        let _ = writeln!(out, "- {} [{}]", v.claim, v.verdict.symbol());
                    }
                }
                SectionContent::Translations { items } => {
                    for t in items {
                        let _ = writeln!(out, "### {}\n\n{}\n", t.language, t.text);
                    }
                }
                SectionContent::Sentiment { label } => match label {
                    Some(label) => {
                        let _ = writeln!(out, "Overall sentiment: {}", label);
                    }
                    None => {
                        let _ = writeln!(out, "Overall sentiment: unavailable");
                    }
                },
                SectionContent::Citations { entries, .. } => {
                    for entry in entries {
                        let _ = writeln!(out, "{}", entry);
                    }
                }
                SectionContent::Sources { items } => {
                    for (i, source) in items.iter().enumerate() {
                        let _ = writeln!(
                            out,
                            "{}. [{}]({}) ({})",
                            i + 1,
                            source.title.as_deref().unwrap_or(&source.url),
                            source.url,
                            source.source_type.as_str()
                        );
                    }
                }
            }
            out.push('\n');
        }

        out
    }

    /// Count of fact-check verdicts per outcome, in supported/refuted/unverifiable order.
    pub fn verdict_counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        if let Some(SectionContent::FactCheck { verdicts }) =
            self.section(SectionKind::FactCheck).map(|s| &s.content)
        {
            for v in verdicts {
                match v.verdict {
                    Verdict::Supported => counts.0 += 1,
                    Verdict::Refuted => counts.1 += 1,
                    Verdict::Unverifiable => counts.2 += 1,
                }
            }
        }
        counts
    }
}

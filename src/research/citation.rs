//! Citation formatting
//!
//! Formats scraped sources as numbered APA, MLA or Chicago references.
//! arXiv papers and DOI links are recognised from the source URL and cited
//! by identifier; everything else is cited as a web page.

use crate::research::query::CitationStyle;
use crate::research::task::SourceDocument;
use chrono::{DateTime, Utc};

/// What kind of work a source URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Arxiv { id: String },
    Doi { doi: String },
    Web,
}

impl SourceKind {
    pub fn detect(url: &str) -> Self {
        // ASCII lowercasing keeps byte offsets valid for slicing `url`
        let lower = url.to_ascii_lowercase();
        if let Some(pos) = lower.find("arxiv.org/") {
            let path = &url[pos + "arxiv.org/".len()..];
            let id = path
                .trim_start_matches("abs/")
                .trim_start_matches("pdf/")
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .trim_end_matches('/')
                .trim_end_matches(".pdf");
            if !id.is_empty() {
                return SourceKind::Arxiv { id: id.to_string() };
            }
        }
        if let Some(pos) = lower.find("doi.org/") {
            let doi = url[pos + "doi.org/".len()..]
                .split_whitespace()
                .next()
                .unwrap_or_default();
            if !doi.is_empty() {
                return SourceKind::Doi {
                    doi: doi.to_string(),
                };
            }
        }
        SourceKind::Web
    }
}

/// Format every source, numbering from 1 in the given order.
pub fn format_citations<'a, I>(sources: I, style: CitationStyle) -> Vec<String>
where
    I: IntoIterator<Item = &'a SourceDocument>,
{
    sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| format_citation(i + 1, source, style))
        .collect()
}

/// Format one numbered reference.
pub fn format_citation(index: usize, source: &SourceDocument, style: CitationStyle) -> String {
    let title = source
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(&source.url);
    let url = &source.url;
    let site = site_name(url);

    let body = match (SourceKind::detect(url), style) {
        (SourceKind::Arxiv { id }, CitationStyle::Apa) => {
            format!("{}. (n.d.). *arXiv preprint arXiv:{}*. {}", title, id, url)
        }
        (SourceKind::Arxiv { id }, CitationStyle::Mla) => format!(
            "\"{}.\" *arXiv*, arXiv:{}. Accessed {}.",
            title,
            id,
            mla_date(&source.retrieved_at)
        ),
        (SourceKind::Arxiv { id }, CitationStyle::Chicago) => {
            format!("\"{}.\" arXiv preprint arXiv:{}. {}.", title, id, url)
        }
        (SourceKind::Doi { doi }, CitationStyle::Apa) => {
            format!("{}. (n.d.). https://doi.org/{}", title, doi)
        }
        (SourceKind::Doi { doi }, CitationStyle::Mla) => format!(
            "\"{}.\" doi:{}. Accessed {}.",
            title,
            doi,
            mla_date(&source.retrieved_at)
        ),
        (SourceKind::Doi { doi }, CitationStyle::Chicago) => {
            format!("\"{}.\" https://doi.org/{}.", title, doi)
        }
        (SourceKind::Web, CitationStyle::Apa) => format!(
            "{}. (n.d.). {}. Retrieved {}, from {}",
            title,
            site,
            long_date(&source.retrieved_at),
            url
        ),
        (SourceKind::Web, CitationStyle::Mla) => format!(
            "\"{}.\" *{}*, {}. Accessed {}.",
            title,
            site,
            url,
            mla_date(&source.retrieved_at)
        ),
        (SourceKind::Web, CitationStyle::Chicago) => format!(
            "\"{}.\" {}. Accessed {}. {}.",
            title,
            site,
            long_date(&source.retrieved_at),
            url
        ),
    };

    format!("[{}] {}", index, body)
}

fn site_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "Web Source".to_string())
}

/// `January 5, 2025`
fn long_date(at: &DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

/// `5 Jan. 2025`
fn mla_date(at: &DateTime<Utc>) -> String {
    at.format("%-d %b. %Y").to_string()
}

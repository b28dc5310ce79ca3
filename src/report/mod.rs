//! Analysis report detection and extraction.
//!
//! The research agent saves its deliverable by writing a markdown file named
//! `<slug>-analysis.md` under the logs directory. When the write tool's
//! result comes back, the assistant message that issued the call is scanned
//! for that write: front matter becomes the company metadata, the agent's
//! own "Key Findings" text (or the report's executive summary) becomes the
//! display summary, and the PE fund shortlist table is parsed into
//! structured fund records.
//!
//! Detection is all-or-nothing: a missing required metadata key rejects the
//! whole report rather than surfacing a partial one.

mod table;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::chat::types::{AssistantMessage, ContentBlock};

/// Canonical name of the file-write tool in the agent's tool set.
const WRITE_TOOL: &str = "Write";

/// Report file suffix enforced by the agent's save protocol.
const REPORT_SUFFIX: &str = "-analysis.md";

/// Fallback summary when neither the assistant text nor the report body
/// yields one.
const DEFAULT_SUMMARY: &str = "Company analysis report generated.";

/// Truncation length for the executive-summary fallback.
const SUMMARY_LIMIT: usize = 500;

static KEY_FINDINGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)Key Findings:\s*\n(.*?)(?:\n\s*Shortlist of P\.E Buyers:|\z)")
        .expect("key findings pattern")
});

static EXECUTIVE_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)##\s*Executive Summary\s*\n+(.*?)(?:\n##|\z)").expect("summary pattern")
});

static FUNDS_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)##\s*(?:\d+\.\s*)?PE Fund Shortlist[^\n]*\n+(.*?)(?:\n###|\n##|\z)")
        .expect("funds section pattern")
});

// ============================================================================
// Artifact types
// ============================================================================

/// Front-matter metadata describing the analyzed company. All six fields are
/// required for a report to be recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyMetadata {
    pub company: String,
    pub url: String,
    pub industry: String,
    pub location: String,
    pub size: String,
    pub analyzed: String,
}

/// One candidate buyer from the PE fund shortlist table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeFund {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub investment_focus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_size: Option<String>,
    pub fit_rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_investments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// The structured report synthesized from a detected file write.
///
/// `pe_funds` distinguishes "no shortlist section" (`None`, section hidden)
/// from "section present but empty" (`Some(vec![])`, renders as zero funds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    pub metadata: CompanyMetadata,
    pub file_path: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_funds: Option<Vec<PeFund>>,
}

// ============================================================================
// Detection
// ============================================================================

/// Scan an assistant message for a qualifying report write.
///
/// Returns `None` unless the message carries a `Write` tool call whose
/// `file_path` points into the logs directory with the analysis suffix and
/// whose content opens with complete front matter.
pub fn detect_report(message: &AssistantMessage) -> Option<ReportArtifact> {
    let input = message.content.iter().find_map(|block| match block {
        ContentBlock::ToolUse { name, input, .. } if name == WRITE_TOOL => Some(input),
        _ => None,
    })?;

    let file_path = input.get("file_path").and_then(Value::as_str)?;
    if !is_report_path(file_path) {
        return None;
    }

    let content = input.get("content").and_then(Value::as_str)?;
    let Some(metadata) = parse_front_matter(content) else {
        debug!(file_path, "analysis file missing required front matter");
        return None;
    };

    Some(ReportArtifact {
        metadata,
        file_path: file_path.to_string(),
        summary: extract_summary(message, content),
        pe_funds: extract_pe_funds(content),
    })
}

/// The save protocol is a narrow, fixed convention: logs directory plus
/// `-analysis.md` suffix.
fn is_report_path(path: &str) -> bool {
    path.contains("logs/") && path.ends_with(REPORT_SUFFIX)
}

/// Parse `--- ... ---` front matter into company metadata.
///
/// Lines split on the first `:`; keys and values are trimmed. Any missing or
/// empty required key rejects the report.
fn parse_front_matter(content: &str) -> Option<CompanyMetadata> {
    let body = content.strip_prefix("---\n")?;
    let end = body.find("\n---")?;

    let mut fields: [Option<&str>; 6] = Default::default();
    const KEYS: [&str; 6] = ["company", "url", "industry", "location", "size", "analyzed"];

    for line in body[..end].lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if let Some(slot) = KEYS.iter().position(|k| *k == key) {
            fields[slot] = Some(value);
        }
    }

    let mut values = fields.into_iter().map(|v| v.filter(|s| !s.is_empty()));
    Some(CompanyMetadata {
        company: values.next()??.to_string(),
        url: values.next()??.to_string(),
        industry: values.next()??.to_string(),
        location: values.next()??.to_string(),
        size: values.next()??.to_string(),
        analyzed: values.next()??.to_string(),
    })
}

/// Pick the report summary: the assistant's own "Key Findings" text when
/// present, the report's executive summary as a truncated fallback, or a
/// fixed default.
fn extract_summary(message: &AssistantMessage, content: &str) -> String {
    for text in message.text_blocks() {
        if !text.contains("Key Findings:") {
            continue;
        }
        if let Some(captures) = KEY_FINDINGS.captures(text) {
            return captures[1].trim().to_string();
        }
    }

    if let Some(captures) = EXECUTIVE_SUMMARY.captures(content) {
        let summary: String = captures[1].trim().chars().take(SUMMARY_LIMIT).collect();
        return summary + "...";
    }

    DEFAULT_SUMMARY.to_string()
}

/// Locate the PE fund shortlist section and parse its table.
///
/// `None` means the heading itself is absent. A present heading with no
/// parseable table yields `Some(vec![])`.
fn extract_pe_funds(content: &str) -> Option<Vec<PeFund>> {
    let captures = FUNDS_SECTION.captures(content)?;
    let section = &captures[1];

    // Collect the contiguous run of pipe lines; blank lines inside the run
    // are tolerated, any other line ends it.
    let mut table_lines: Vec<&str> = Vec::new();
    let mut in_table = false;
    for line in section.lines() {
        if line.contains('|') {
            in_table = true;
            table_lines.push(line);
        } else if in_table && line.trim().is_empty() {
            continue;
        } else if in_table {
            break;
        }
    }

    // Header + separator + at least one data row.
    if table_lines.len() < 3 {
        return Some(Vec::new());
    }

    let header_cells = table::split_row(table_lines[0]);
    let rows: Vec<Vec<String>> = table_lines[2..]
        .iter()
        .map(|line| table::split_row(line))
        .collect();

    Some(table::infer_funds(&header_cells, &rows))
}

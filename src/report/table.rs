//! Shape inference for the PE fund shortlist table.
//!
//! The agent emits the shortlist in one of several column layouts; which one
//! is inferred from the header and the per-row cell count:
//!
//! - compact, no row numbers (≤5 cells):
//!   `name | focus | fit | recent | contact`
//! - compact with a leading row-number column (≤6 cells)
//! - full layout (8 columns):
//!   `# | name | headquarters | focus | check size | recent | fit | contact`
//!
//! A 7-column row without a row-number column is ambiguous upstream; it is
//! resolved here by falling through to the full-layout offsets with missing
//! trailing cells treated as absent.

use once_cell::sync::Lazy;
use regex::Regex;

use super::PeFund;

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://[^\s<]+|www\.[^\s<]+)").expect("url pattern"));

/// Split one table row into trimmed, non-empty cells.
pub(super) fn split_row(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

/// Infer fund records from header cells and data rows.
///
/// Pure over its inputs so the layout quirks stay independently testable.
/// Rows with fewer than 3 cells are discarded.
pub(super) fn infer_funds(header_cells: &[String], rows: &[Vec<String>]) -> Vec<PeFund> {
    let has_row_numbers = header_cells
        .first()
        .is_some_and(|cell| cell == "#" || cell == "No" || is_numeric(cell));
    let offset = usize::from(has_row_numbers);

    rows.iter()
        .filter_map(|cells| parse_row(cells, has_row_numbers, offset))
        .collect()
}

fn parse_row(cells: &[String], has_row_numbers: bool, offset: usize) -> Option<PeFund> {
    if cells.len() < 3 {
        return None;
    }

    let name = cell(cells, offset).replace("**", "").trim().to_string();

    // Compact layout: name | focus | fit | recent | contact.
    if cells.len() <= 5 && !has_row_numbers {
        let contact = optional_cell(cells, 4);
        return Some(PeFund {
            name,
            website: contact.as_deref().and_then(extract_website),
            investment_focus: cell(cells, 1),
            check_size: None,
            fit_rationale: cell(cells, 2),
            recent_investments: optional_cell(cells, 3).map(|value| split_list(&value)),
            contact,
        });
    }

    // Compact layout shifted by the row-number column.
    if cells.len() <= 6 && has_row_numbers {
        let contact = optional_cell(cells, 5);
        return Some(PeFund {
            name,
            website: contact.as_deref().and_then(extract_website),
            investment_focus: cell(cells, 2),
            check_size: None,
            fit_rationale: cell(cells, 3),
            recent_investments: optional_cell(cells, 4).map(|value| split_list(&value)),
            contact,
        });
    }

    // Full layout at fixed offsets from the row-number column.
    let contact = optional_cell(cells, offset + 6);
    Some(PeFund {
        name,
        website: contact.as_deref().and_then(extract_website),
        investment_focus: cell(cells, offset + 2),
        check_size: optional_cell(cells, offset + 3),
        fit_rationale: cell(cells, offset + 5),
        recent_investments: optional_cell(cells, offset + 4).map(|value| split_list(&value)),
        contact,
    })
}

fn cell(cells: &[String], index: usize) -> String {
    cells.get(index).cloned().unwrap_or_default()
}

/// A cell that is absent or empty maps to `None`.
fn optional_cell(cells: &[String], index: usize) -> Option<String> {
    cells.get(index).filter(|value| !value.is_empty()).cloned()
}

fn split_list(value: &str) -> Vec<String> {
    value.split(';').map(|item| item.trim().to_string()).collect()
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Pull the first URL-looking substring out of a contact cell; bare `www.`
/// hosts get an https scheme.
fn extract_website(contact: &str) -> Option<String> {
    let found = URL.find(contact)?.as_str();
    if found.starts_with("www.") {
        Some(format!("https://{found}"))
    } else {
        Some(found.to_string())
    }
}

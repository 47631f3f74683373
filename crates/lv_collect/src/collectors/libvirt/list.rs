//! `virsh list` table parsing

use crate::CollectError;

/// Column header plus the dashed underline
const HEADER_LINES: usize = 2;

/// Minimum columns in a data row: Id, Name, State
const MIN_COLUMNS: usize = 3;

/// Extract domain names from `virsh list` output.
///
/// The first two lines are always treated as the table header. Every other
/// non-blank line must have at least three whitespace-separated columns;
/// the second one is the domain name. A single short row fails the whole
/// listing.
pub fn parse_domain_list(output: &str) -> Result<Vec<String>, CollectError> {
    let mut domains = Vec::new();

    for line in output.split('\n').skip(HEADER_LINES) {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.is_empty() {
            continue;
        }
        if columns.len() < MIN_COLUMNS {
            return Err(CollectError::MalformedListLine {
                line: line.trim_end().to_string(),
            });
        }
        domains.push(columns[1].to_string());
    }

    Ok(domains)
}

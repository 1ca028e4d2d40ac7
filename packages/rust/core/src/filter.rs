//! Ad-block list merging.
//!
//! Lines are treated as opaque filter rules: trimmed, blank ones dropped,
//! duplicates collapsed across every source, and the result sorted so the
//! output depends only on the set of lines, not on source order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rulefeed_shared::{Result, RulefeedError};
use tracing::{debug, instrument};

/// Merge newline-delimited filter lists into one sorted, deduplicated list.
///
/// The output always ends with a newline, so an empty merge yields `"\n"`.
pub fn merge_filter_lists<S: AsRef<str>>(sources: &[S]) -> String {
    let lines: BTreeSet<&str> = sources
        .iter()
        .flat_map(|source| source.as_ref().lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut out = lines.into_iter().collect::<Vec<_>>().join("\n");
    out.push('\n');
    out
}

/// Merge local filter files into `output`. Returns the number of rules written.
#[instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
pub fn merge_filter_files(inputs: &[PathBuf], output: &Path) -> Result<usize> {
    let mut sources = Vec::with_capacity(inputs.len());
    for path in inputs {
        let text = std::fs::read_to_string(path).map_err(|e| RulefeedError::io(path, e))?;
        sources.push(text);
    }

    let merged = merge_filter_lists(&sources);
    std::fs::write(output, &merged).map_err(|e| RulefeedError::io(output, e))?;

    let count = merged.lines().filter(|l| !l.is_empty()).count();
    debug!(count, "filter list written");
    Ok(count)
}

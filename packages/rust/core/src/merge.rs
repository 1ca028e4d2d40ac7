//! Rule document merging.
//!
//! All entries of all input documents collapse into a single entry: every
//! field becomes the sorted union of the values seen for it. Falsy values
//! (`false`, `0`, `""`, `[]`) are skipped, so a field that is empty in every
//! input does not appear in the output at all.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rulefeed_shared::{
    DEFAULT_RULE_SET_VERSION, Result, RuleDocument, RuleEntry, RuleValue, RulefeedError, Scalar,
};
use tracing::{debug, instrument};

/// Union every rule field across `documents` into a one-entry document.
///
/// The version is the first non-null one encountered; `1` when none is
/// declared or the declared one is `0`.
pub fn merge_rule_documents<'a, I>(documents: I) -> RuleDocument
where
    I: IntoIterator<Item = &'a RuleDocument>,
{
    let mut version: Option<u32> = None;
    let mut fields: BTreeMap<String, BTreeSet<Scalar>> = BTreeMap::new();

    for doc in documents {
        if version.is_none() {
            version = doc.version;
        }

        for (key, value) in doc.rules.iter().flatten() {
            if value.is_falsy() {
                continue;
            }

            let acc = fields.entry(key.clone()).or_default();
            match value {
                RuleValue::Sequence(items) => acc.extend(items.iter().cloned()),
                RuleValue::Scalar(item) => {
                    acc.insert(item.clone());
                }
            }
        }
    }

    let merged: RuleEntry = fields
        .into_iter()
        .map(|(key, values)| (key, RuleValue::Sequence(values.into_iter().collect())))
        .collect();

    RuleDocument {
        version: Some(version.filter(|v| *v != 0).unwrap_or(DEFAULT_RULE_SET_VERSION)),
        rules: vec![merged],
    }
}

/// Read a decompiled rule document from disk.
pub fn read_rule_document(path: &Path) -> Result<RuleDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| RulefeedError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| RulefeedError::parse(format!("invalid rule document {}: {e}", path.display())))
}

/// Write a rule document as pretty JSON (two-space indent, UTF-8 kept verbatim).
pub fn write_rule_document(path: &Path, doc: &RuleDocument) -> Result<()> {
    let mut content = serde_json::to_string_pretty(doc)
        .map_err(|e| RulefeedError::parse(format!("failed to serialize rule document: {e}")))?;
    content.push('\n');
    std::fs::write(path, content).map_err(|e| RulefeedError::io(path, e))
}

/// Merge rule documents stored in `inputs` and write the result to `output`.
#[instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
pub fn merge_rule_files(inputs: &[PathBuf], output: &Path) -> Result<RuleDocument> {
    let docs = inputs
        .iter()
        .map(|p| read_rule_document(p))
        .collect::<Result<Vec<_>>>()?;

    let merged = merge_rule_documents(&docs);
    write_rule_document(output, &merged)?;

    debug!(
        fields = merged.rules.first().map_or(0, |r| r.len()),
        "merged rule document written"
    );
    Ok(merged)
}

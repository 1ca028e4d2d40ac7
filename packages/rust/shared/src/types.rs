//! Core domain types: rule categories and the JSON rule-set document model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version written when no input document declares one.
pub const DEFAULT_RULE_SET_VERSION: u32 = 1;

/// File name of the compiled ad-block rule set.
pub const ADBLOCK_ARTIFACT: &str = "adblock.srs";

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The four groupings rule sources are merged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    DirectDomain,
    ProxyDomain,
    DirectIp,
    ProxyIp,
}

impl Category {
    /// All categories, in pipeline processing order.
    pub const ALL: [Category; 4] = [
        Category::DirectDomain,
        Category::ProxyDomain,
        Category::DirectIp,
        Category::ProxyIp,
    ];

    /// Config/CLI spelling of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectDomain => "direct-domain",
            Self::ProxyDomain => "proxy-domain",
            Self::DirectIp => "direct-ip",
            Self::ProxyIp => "proxy-ip",
        }
    }

    /// File stem of the merged artifact (`merged-domain-direct`, ...).
    pub fn artifact_stem(&self) -> &'static str {
        match self {
            Self::DirectDomain => "merged-domain-direct",
            Self::ProxyDomain => "merged-domain-proxy",
            Self::DirectIp => "merged-ip-direct",
            Self::ProxyIp => "merged-ip-proxy",
        }
    }

    /// Name of the compiled merged artifact.
    pub fn artifact_name(&self) -> String {
        format!("{}.srs", self.artifact_stem())
    }

    /// Name of the intermediate merged JSON document.
    pub fn json_name(&self) -> String {
        format!("{}.json", self.artifact_stem())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of files that survive a run.
pub fn retained_artifacts() -> Vec<String> {
    let mut names = vec![ADBLOCK_ARTIFACT.to_string()];
    names.extend(Category::ALL.iter().map(Category::artifact_name));
    names
}

// ---------------------------------------------------------------------------
// Rule document model
// ---------------------------------------------------------------------------

/// A single JSON scalar that may appear in a rule field.
///
/// Variant order defines the sort order used when merging mixed-type fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl Scalar {
    /// `false`, `0` and `""` are treated as absent by the merger.
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Bool(b) => !b,
            Self::Integer(n) => *n == 0,
            Self::Text(s) => s.is_empty(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// A rule field value: either one scalar or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Scalar(Scalar),
    Sequence(Vec<Scalar>),
}

impl RuleValue {
    /// Build a text sequence, mostly useful in tests and fixtures.
    pub fn texts<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Sequence(items.into_iter().map(|s| Scalar::Text(s.into())).collect())
    }

    /// Empty sequences and falsy scalars.
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Scalar(s) => s.is_falsy(),
            Self::Sequence(items) => items.is_empty(),
        }
    }
}

/// One rule: field name (`domain`, `domain_suffix`, `ip_cidr`, ...) to value.
pub type RuleEntry = BTreeMap<String, RuleValue>;

/// The JSON rule-set document produced by `sing-box rule-set decompile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDocument {
    /// Rule-set format version.
    #[serde(default)]
    pub version: Option<u32>,
    /// Rules in declaration order.
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

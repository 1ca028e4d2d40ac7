//! Application configuration for rulefeed.
//!
//! User config lives at `~/.rulefeed/rulefeed.toml`; `--config` points
//! elsewhere. CLI flags override config file values, which override defaults.
//! The defaults carry the full feed table, so a missing file still yields a
//! working run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RulefeedError};
use crate::types::{Category, retained_artifacts};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rulefeed.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rulefeed";

/// Stem reserved for the ad-block intermediates (`adblock.txt`, `adblock.srs`).
const ADBLOCK_STEM: &str = "adblock";

const SING_GEOSITE: &str = "https://raw.githubusercontent.com/SagerNet/sing-geosite/rule-set";
const SING_GEOIP: &str = "https://raw.githubusercontent.com/SagerNet/sing-geoip/rule-set";
const LOYALSOLDIER_GEOIP: &str = "https://raw.githubusercontent.com/Loyalsoldier/geoip/release/srs";

// ---------------------------------------------------------------------------
// Config structs (matching rulefeed.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory that receives every artifact. Cleared at the start of a run.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Ad-block text lists merged into `adblock.srs`.
    #[serde(default = "default_adblock_urls")]
    pub adblock_urls: Vec<String>,

    /// External converter settings.
    #[serde(default)]
    pub converter: ConverterConfig,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Commit settings.
    #[serde(default)]
    pub publish: PublishConfig,

    /// Binary rule sets to download, decompile and merge.
    #[serde(default = "default_sources")]
    pub sources: Vec<RuleSource>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            adblock_urls: default_adblock_urls(),
            converter: ConverterConfig::default(),
            http: HttpConfig::default(),
            publish: PublishConfig::default(),
            sources: default_sources(),
        }
    }
}

impl AppConfig {
    /// Sources configured under `category`, in declaration order.
    pub fn sources_for(&self, category: Category) -> impl Iterator<Item = &RuleSource> {
        self.sources.iter().filter(move |s| s.category == category)
    }
}

fn default_output_dir() -> String {
    "rule-set".into()
}

fn default_adblock_urls() -> Vec<String> {
    vec!["https://raw.githubusercontent.com/jackszb/json-txt-2/main/domains.txt".into()]
}

/// `[converter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path or name of the sing-box executable.
    #[serde(default = "default_converter_binary")]
    pub binary: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            binary: default_converter_binary(),
        }
    }
}

fn default_converter_binary() -> String {
    "sing-box".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout. Unset means the transport default (no timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// `[publish]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Commit changes after a successful run.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Commit message.
    #[serde(default = "default_commit_message")]
    pub message: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message: default_commit_message(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_commit_message() -> String {
    "Auto commit changes after rule update".into()
}

/// `[[sources]]` entry — one binary rule set feeding a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    /// Identifier; also the stem of the intermediate `<name>.srs` / `<name>.json`.
    pub name: String,
    /// Download location of the compiled rule set.
    pub url: String,
    /// Category the source is merged into.
    pub category: Category,
}

impl RuleSource {
    pub fn new(name: &str, url: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.to_string(),
            url: url.into(),
            category,
        }
    }
}

fn default_sources() -> Vec<RuleSource> {
    use Category::*;

    let geosite = |name: &str, category| {
        RuleSource::new(
            name,
            format!("{SING_GEOSITE}/geosite-{}.srs", name_to_geosite(name)),
            category,
        )
    };

    vec![
        geosite("apple-cn", DirectDomain),
        geosite("apple-pki-cn", DirectDomain),
        geosite("apple-dev-cn", DirectDomain),
        geosite("cctv", DirectDomain),
        geosite("bilibili", DirectDomain),
        RuleSource::new(
            "wechat",
            "https://raw.githubusercontent.com/jackszb/sing-box-abc/main/wechat.srs",
            DirectDomain,
        ),
        RuleSource::new(
            "geosite-private",
            format!("{SING_GEOSITE}/geosite-private.srs"),
            DirectDomain,
        ),
        RuleSource::new("geosite-cn", format!("{SING_GEOSITE}/geosite-cn.srs"), DirectDomain),
        geosite("github", ProxyDomain),
        geosite("openai", ProxyDomain),
        geosite("youtube", ProxyDomain),
        RuleSource::new(
            "geosite-geolocation-!cn",
            format!("{SING_GEOSITE}/geosite-geolocation-!cn.srs"),
            ProxyDomain,
        ),
        RuleSource::new("geoip-cn", format!("{SING_GEOIP}/geoip-cn.srs"), DirectIp),
        RuleSource::new(
            "geoip-private",
            format!("{LOYALSOLDIER_GEOIP}/private.srs"),
            DirectIp,
        ),
        RuleSource::new("telegram", format!("{LOYALSOLDIER_GEOIP}/telegram.srs"), ProxyIp),
        RuleSource::new("netflix", format!("{LOYALSOLDIER_GEOIP}/netflix.srs"), ProxyIp),
        RuleSource::new("google", format!("{LOYALSOLDIER_GEOIP}/google.srs"), ProxyIp),
        RuleSource::new("twitter", format!("{LOYALSOLDIER_GEOIP}/twitter.srs"), ProxyIp),
    ]
}

/// Upstream geosite names use `@cn` where our source names use `-cn`.
fn name_to_geosite(name: &str) -> String {
    match name.strip_suffix("-cn") {
        Some(base) => format!("{base}@cn"),
        None => name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject configurations that would produce colliding or unfetchable files.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.output_dir.trim().is_empty() {
        return Err(RulefeedError::config("output_dir must not be empty"));
    }

    if config.adblock_urls.is_empty() {
        return Err(RulefeedError::config("at least one ad-block url is required"));
    }
    for url in &config.adblock_urls {
        check_url(url)?;
    }

    let reserved: HashSet<String> = retained_artifacts()
        .iter()
        .filter_map(|name| name.strip_suffix(".srs").map(String::from))
        .chain(std::iter::once(ADBLOCK_STEM.to_string()))
        .collect();

    let mut seen = HashSet::new();
    for source in &config.sources {
        let name = source.name.as_str();
        if name.trim().is_empty() {
            return Err(RulefeedError::config("source name must not be empty"));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(RulefeedError::config(format!(
                "source name '{name}' must be a plain file stem"
            )));
        }
        if reserved.contains(name) {
            return Err(RulefeedError::config(format!(
                "source name '{name}' collides with an output artifact"
            )));
        }
        if !seen.insert(name) {
            return Err(RulefeedError::config(format!("duplicate source name '{name}'")));
        }
        check_url(&source.url)?;
    }

    Ok(())
}

fn check_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| RulefeedError::config(format!("invalid url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(RulefeedError::config(format!(
            "unsupported scheme '{other}' in '{raw}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rulefeed/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RulefeedError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rulefeed/rulefeed.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RulefeedError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RulefeedError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RulefeedError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RulefeedError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RulefeedError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

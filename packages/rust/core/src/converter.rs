//! External rule-set converter.
//!
//! The binary `.srs` format is never parsed here. Every translation is an
//! out-of-process `sing-box rule-set ...` call that blocks until the tool
//! exits; a non-zero exit surfaces the tool's stderr and aborts the run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rulefeed_shared::{Result, RulefeedError};
use tracing::{debug, error, instrument};

/// Adblock-list dialect passed to `rule-set convert`.
const ADBLOCK_SOURCE_TYPE: &str = "adguard";

/// Translation between rule-list text, JSON rule documents and binary rule sets.
pub trait RuleSetConverter {
    /// Compile a newline-delimited ad-block list into a binary rule set.
    fn convert(&self, text_file: &Path, output: &Path) -> Result<()>;
    /// Decompile a binary rule set into its JSON document form.
    fn decompile(&self, binary_file: &Path, json_file: &Path) -> Result<()>;
    /// Compile a JSON rule document into a binary rule set.
    fn compile(&self, json_file: &Path, binary_file: &Path) -> Result<()>;
}

/// [`RuleSetConverter`] backed by the `sing-box` executable.
#[derive(Debug, Clone)]
pub struct SingBox {
    binary: PathBuf,
}

impl SingBox {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Path or name of the executable being invoked.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run `sing-box rule-set <args...>` and fail loudly on a non-zero exit.
    fn rule_set(&self, args: Vec<OsString>) -> Result<()> {
        debug!(binary = %self.binary.display(), ?args, "invoking converter");

        let output = Command::new(&self.binary)
            .arg("rule-set")
            .args(&args)
            .output()
            .map_err(|e| {
                RulefeedError::Conversion(format!(
                    "failed to spawn {}: {e}. Is sing-box installed?",
                    self.binary.display()
                ))
            })?;

        check_output(&args, output)
    }
}

impl Default for SingBox {
    fn default() -> Self {
        Self::new("sing-box")
    }
}

impl RuleSetConverter for SingBox {
    #[instrument(skip(self), fields(input = %text_file.display(), output = %output.display()))]
    fn convert(&self, text_file: &Path, output: &Path) -> Result<()> {
        self.rule_set(vec![
            "convert".into(),
            "--type".into(),
            ADBLOCK_SOURCE_TYPE.into(),
            "--output".into(),
            output.into(),
            text_file.into(),
        ])
    }

    #[instrument(skip(self), fields(input = %binary_file.display(), output = %json_file.display()))]
    fn decompile(&self, binary_file: &Path, json_file: &Path) -> Result<()> {
        self.rule_set(vec![
            "decompile".into(),
            binary_file.into(),
            "-o".into(),
            json_file.into(),
        ])
    }

    #[instrument(skip(self), fields(input = %json_file.display(), output = %binary_file.display()))]
    fn compile(&self, json_file: &Path, binary_file: &Path) -> Result<()> {
        self.rule_set(vec![
            "compile".into(),
            json_file.into(),
            "-o".into(),
            binary_file.into(),
        ])
    }
}

/// Map a finished process to `Ok` or a conversion error carrying its stderr.
fn check_output(args: &[OsString], output: Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let subcommand = args
        .first()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_default();

    error!(
        subcommand = %subcommand,
        code = output.status.code().unwrap_or(-1),
        stderr = %stderr,
        "sing-box rule-set failed"
    );

    Err(RulefeedError::Conversion(format!(
        "sing-box rule-set {subcommand} exited with status {}: {stderr}",
        output.status.code().unwrap_or(-1)
    )))
}

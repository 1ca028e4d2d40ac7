//! End-to-end `run` pipeline: feeds → ad-block + merged rule sets → commit.
//!
//! Strictly sequential. Any fetch, conversion or filesystem failure aborts
//! the run immediately and leaves the workspace as it was at that point.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use rulefeed_fetch::{FetchOptions, Fetcher};
use rulefeed_shared::{
    ADBLOCK_ARTIFACT, AppConfig, Category, Result, RuleSource, retained_artifacts,
};

use crate::converter::RuleSetConverter;
use crate::filter::merge_filter_lists;
use crate::merge::{merge_rule_documents, read_rule_document, write_rule_document};
use crate::publisher::Publisher;
use crate::workspace::{ArtifactMeta, Workspace};

/// Intermediate merged ad-block list.
const ADBLOCK_TEXT: &str = "adblock.txt";

/// Configuration for the `run` pipeline.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Flat output directory, cleared at the start of the run.
    pub output_dir: PathBuf,
    /// Ad-block text lists.
    pub adblock_urls: Vec<String>,
    /// Binary rule sets, grouped by category at merge time.
    pub sources: Vec<RuleSource>,
    /// HTTP client options.
    pub fetch: FetchOptions,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output_dir),
            adblock_urls: config.adblock_urls.clone(),
            sources: config.sources.clone(),
            fetch: FetchOptions::from(&config.http),
        }
    }
}

impl RunConfig {
    /// Sources in processing order: by category, then declaration order.
    fn ordered_sources(&self) -> Vec<&RuleSource> {
        Category::ALL
            .iter()
            .flat_map(|category| self.sources.iter().filter(move |s| s.category == *category))
            .collect()
    }
}

/// Result of the `run` pipeline.
#[derive(Debug)]
pub struct RunResult {
    /// Retained artifacts with checksums.
    pub artifacts: Vec<ArtifactMeta>,
    /// Distinct rules in the merged ad-block list.
    pub adblock_rules: usize,
    /// Number of rule sources downloaded and decompiled.
    pub sources_processed: usize,
    /// Whether the publisher created a commit.
    pub committed: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a rule source has been downloaded and decompiled.
    fn source_processed(&self, name: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_processed(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run the full pipeline.
///
/// 1. Clear the output directory
/// 2. Fetch and merge ad-block lists, convert to `adblock.srs`
/// 3. Download and decompile every rule source
/// 4. Merge decompiled documents per category and compile them
/// 5. Prune everything but the retained artifacts
/// 6. Publish
#[instrument(skip_all, fields(output_dir = %config.output_dir.display()))]
pub async fn run(
    config: &RunConfig,
    converter: &dyn RuleSetConverter,
    publisher: &dyn Publisher,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();

    // --- Phase 1: Workspace ---
    progress.phase("Clearing workspace");
    let workspace = Workspace::open(&config.output_dir)?;
    workspace.clear()?;

    let fetcher = Fetcher::new(&config.fetch)?;

    // --- Phase 2: Ad-block list ---
    progress.phase("Merging ad-block lists");
    let adblock_rules = build_adblock(config, &fetcher, &workspace, converter).await?;

    // --- Phase 3: Rule sources ---
    let sources = config.ordered_sources();
    let total = sources.len();
    let mut decompiled: BTreeMap<Category, Vec<PathBuf>> = BTreeMap::new();

    for (i, source) in sources.into_iter().enumerate() {
        progress.phase(&format!("Downloading {}", source.name));
        let json_path = process_source(source, &fetcher, &workspace, converter).await?;
        decompiled.entry(source.category).or_default().push(json_path);
        progress.source_processed(&source.name, i + 1, total);
    }

    // --- Phase 4: Merge per category ---
    for category in Category::ALL {
        progress.phase(&format!("Merging {category}"));
        let inputs = decompiled.remove(&category).unwrap_or_default();
        merge_category(category, &inputs, &workspace, converter)?;
    }

    // --- Phase 5: Prune ---
    progress.phase("Pruning intermediates");
    let retained = retained_artifacts();
    workspace.prune(&retained)?;

    let artifacts = retained
        .iter()
        .map(|name| workspace.artifact_meta(name))
        .collect::<Result<Vec<_>>>()?;

    // --- Phase 6: Publish ---
    progress.phase("Publishing");
    let committed = publisher.publish()?;

    let result = RunResult {
        artifacts,
        adblock_rules,
        sources_processed: total,
        committed,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        artifacts = result.artifacts.len(),
        adblock_rules = result.adblock_rules,
        sources = result.sources_processed,
        committed = result.committed,
        elapsed_ms = result.elapsed.as_millis(),
        "run completed"
    );

    Ok(result)
}

/// Fetch every ad-block list, write the merged text and compile it.
async fn build_adblock(
    config: &RunConfig,
    fetcher: &Fetcher,
    workspace: &Workspace,
    converter: &dyn RuleSetConverter,
) -> Result<usize> {
    let mut lists = Vec::with_capacity(config.adblock_urls.len());
    for url in &config.adblock_urls {
        info!(%url, "downloading ad-block list");
        lists.push(fetcher.fetch_text(url).await?);
    }

    let merged = merge_filter_lists(&lists);
    let rules = merged.lines().filter(|l| !l.is_empty()).count();
    let text_path = workspace.write(ADBLOCK_TEXT, &merged)?;
    info!(rules, "merged ad-block list written");

    converter.convert(&text_path, &workspace.path(ADBLOCK_ARTIFACT))?;
    info!("{ADBLOCK_ARTIFACT} generated");

    Ok(rules)
}

/// Download one compiled rule set and decompile it next to itself.
async fn process_source(
    source: &RuleSource,
    fetcher: &Fetcher,
    workspace: &Workspace,
    converter: &dyn RuleSetConverter,
) -> Result<PathBuf> {
    info!(name = %source.name, url = %source.url, category = %source.category, "downloading rule set");

    let bytes = fetcher.fetch_bytes(&source.url).await?;
    let srs_path = workspace.write(&format!("{}.srs", source.name), &bytes)?;
    let json_path = workspace.path(&format!("{}.json", source.name));

    converter.decompile(&srs_path, &json_path)?;
    info!(name = %source.name, "rule set decompiled");

    Ok(json_path)
}

/// Merge the decompiled documents of one category and compile the result.
fn merge_category(
    category: Category,
    inputs: &[PathBuf],
    workspace: &Workspace,
    converter: &dyn RuleSetConverter,
) -> Result<()> {
    let docs = inputs
        .iter()
        .map(|p| read_rule_document(p))
        .collect::<Result<Vec<_>>>()?;

    let merged = merge_rule_documents(&docs);
    let json_path = workspace.path(&category.json_name());
    write_rule_document(&json_path, &merged)?;

    converter.compile(&json_path, &workspace.path(&category.artifact_name()))?;
    info!(
        %category,
        documents = docs.len(),
        fields = merged.rules.first().map_or(0, |r| r.len()),
        "merged rule set compiled"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use rulefeed_shared::{RuleValue, RulefeedError};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::publisher::NoPublish;

    /// Converter that copies bytes through, so decompiled "binary" sources
    /// are simply JSON documents served by the mock server.
    #[derive(Default)]
    struct CopyConverter {
        calls: Mutex<Vec<String>>,
        converted_text: Mutex<Option<String>>,
    }

    impl CopyConverter {
        fn record(&self, op: &str, input: &Path, output: &Path) {
            let name = |p: &Path| p.file_name().unwrap().to_string_lossy().into_owned();
            self.calls
                .lock()
                .unwrap()
                .push(format!("{op} {} {}", name(input), name(output)));
        }
    }

    impl RuleSetConverter for CopyConverter {
        fn convert(&self, text_file: &Path, output: &Path) -> Result<()> {
            self.record("convert", text_file, output);
            let text = std::fs::read_to_string(text_file).unwrap();
            *self.converted_text.lock().unwrap() = Some(text);
            std::fs::copy(text_file, output).map_err(|e| RulefeedError::io(output, e))?;
            Ok(())
        }

        fn decompile(&self, binary_file: &Path, json_file: &Path) -> Result<()> {
            self.record("decompile", binary_file, json_file);
            std::fs::copy(binary_file, json_file).map_err(|e| RulefeedError::io(json_file, e))?;
            Ok(())
        }

        fn compile(&self, json_file: &Path, binary_file: &Path) -> Result<()> {
            self.record("compile", json_file, binary_file);
            std::fs::copy(json_file, binary_file).map_err(|e| RulefeedError::io(binary_file, e))?;
            Ok(())
        }
    }

    /// Converter whose decompile step always fails.
    struct BrokenDecompiler;

    impl RuleSetConverter for BrokenDecompiler {
        fn convert(&self, text_file: &Path, output: &Path) -> Result<()> {
            std::fs::copy(text_file, output).map_err(|e| RulefeedError::io(output, e))?;
            Ok(())
        }

        fn decompile(&self, _binary_file: &Path, _json_file: &Path) -> Result<()> {
            Err(RulefeedError::Conversion("decode rule-set: unexpected EOF".into()))
        }

        fn compile(&self, _json_file: &Path, _binary_file: &Path) -> Result<()> {
            unreachable!("compile must not run after a failed decompile")
        }
    }

    struct CountingPublisher(Mutex<usize>);

    impl Publisher for CountingPublisher {
        fn publish(&self) -> Result<bool> {
            *self.0.lock().unwrap() += 1;
            Ok(true)
        }
    }

    fn temp_output(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rf-{label}-{}", uuid::Uuid::now_v7()))
    }

    async fn mount(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn feed_server() -> MockServer {
        let server = MockServer::start().await;
        mount(&server, "/domains.txt", "b.com\na.com\na.com\n").await;
        mount(
            &server,
            "/cn.srs",
            r#"{"version": 2, "rules": [{"domain_suffix": ["cn", "qq.com"], "domain_keyword": []}]}"#,
        )
        .await;
        mount(
            &server,
            "/private.srs",
            r#"{"version": 1, "rules": [{"domain_suffix": ["local", "cn"], "domain": "localhost"}]}"#,
        )
        .await;
        mount(
            &server,
            "/telegram.srs",
            r#"{"version": 3, "rules": [{"ip_cidr": ["91.108.4.0/22", "149.154.160.0/20"]}]}"#,
        )
        .await;
        server
    }

    fn run_config(server: &MockServer, output_dir: PathBuf) -> RunConfig {
        let uri = server.uri();
        RunConfig {
            output_dir,
            adblock_urls: vec![format!("{uri}/domains.txt")],
            sources: vec![
                RuleSource::new("telegram", format!("{uri}/telegram.srs"), Category::ProxyIp),
                RuleSource::new("geosite-cn", format!("{uri}/cn.srs"), Category::DirectDomain),
                RuleSource::new(
                    "geosite-private",
                    format!("{uri}/private.srs"),
                    Category::DirectDomain,
                ),
            ],
            fetch: FetchOptions::default(),
        }
    }

    fn read_doc(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn full_run_leaves_exactly_the_retained_artifacts() {
        let server = feed_server().await;
        let output_dir = temp_output("pipeline");
        std::fs::create_dir_all(&output_dir).unwrap();
        std::fs::write(output_dir.join("stale-from-last-run.srs"), b"old").unwrap();

        let config = run_config(&server, output_dir.clone());
        let converter = CopyConverter::default();
        let publisher = CountingPublisher(Mutex::new(0));

        let result = run(&config, &converter, &publisher, &SilentProgress)
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&output_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, retained_artifacts());

        assert_eq!(result.artifacts.len(), 5);
        assert_eq!(result.adblock_rules, 2);
        assert_eq!(result.sources_processed, 3);
        assert!(result.committed);
        assert_eq!(*publisher.0.lock().unwrap(), 1);

        let _ = std::fs::remove_dir_all(&output_dir);
    }

    #[tokio::test]
    async fn adblock_text_is_sorted_and_deduplicated() {
        let server = feed_server().await;
        let output_dir = temp_output("adblock");
        let config = run_config(&server, output_dir.clone());
        let converter = CopyConverter::default();

        run(&config, &converter, &NoPublish, &SilentProgress)
            .await
            .unwrap();

        let text = converter.converted_text.lock().unwrap().clone();
        assert_eq!(text.as_deref(), Some("a.com\nb.com\n"));

        let _ = std::fs::remove_dir_all(&output_dir);
    }

    #[tokio::test]
    async fn categories_merge_their_own_sources() {
        let server = feed_server().await;
        let output_dir = temp_output("merge");
        let config = run_config(&server, output_dir.clone());
        let converter = CopyConverter::default();

        run(&config, &converter, &NoPublish, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(
            read_doc(&output_dir.join("merged-domain-direct.srs")),
            serde_json::json!({
                "version": 2,
                "rules": [{
                    "domain": ["localhost"],
                    "domain_suffix": ["cn", "local", "qq.com"]
                }]
            })
        );
        assert_eq!(
            read_doc(&output_dir.join("merged-ip-proxy.srs")),
            serde_json::json!({
                "version": 3,
                "rules": [{"ip_cidr": ["149.154.160.0/20", "91.108.4.0/22"]}]
            })
        );
        // No sources configured for these categories.
        for empty in ["merged-domain-proxy.srs", "merged-ip-direct.srs"] {
            assert_eq!(
                read_doc(&output_dir.join(empty)),
                serde_json::json!({"version": 1, "rules": [{}]})
            );
        }

        let merged = read_rule_document(&output_dir.join("merged-domain-direct.srs")).unwrap();
        assert_eq!(
            merged.rules[0]["domain_suffix"],
            RuleValue::texts(["cn", "local", "qq.com"])
        );

        let _ = std::fs::remove_dir_all(&output_dir);
    }

    #[tokio::test]
    async fn converter_calls_follow_pipeline_order() {
        let server = feed_server().await;
        let output_dir = temp_output("order");
        let config = run_config(&server, output_dir.clone());
        let converter = CopyConverter::default();

        run(&config, &converter, &NoPublish, &SilentProgress)
            .await
            .unwrap();

        let calls = converter.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "convert adblock.txt adblock.srs",
                "decompile geosite-cn.srs geosite-cn.json",
                "decompile geosite-private.srs geosite-private.json",
                "decompile telegram.srs telegram.json",
                "compile merged-domain-direct.json merged-domain-direct.srs",
                "compile merged-domain-proxy.json merged-domain-proxy.srs",
                "compile merged-ip-direct.json merged-ip-direct.srs",
                "compile merged-ip-proxy.json merged-ip-proxy.srs",
            ]
        );

        let _ = std::fs::remove_dir_all(&output_dir);
    }

    #[tokio::test]
    async fn failed_download_aborts_without_cleanup() {
        let server = feed_server().await;
        Mock::given(method("GET"))
            .and(path("/gone.srs"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let output_dir = temp_output("abort");
        let mut config = run_config(&server, output_dir.clone());
        config.sources.push(RuleSource::new(
            "gone",
            format!("{}/gone.srs", server.uri()),
            Category::ProxyIp,
        ));
        let converter = CopyConverter::default();
        let publisher = CountingPublisher(Mutex::new(0));

        let err = run(&config, &converter, &publisher, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RulefeedError::Fetch(_)));

        // Intermediates written before the failure stay behind.
        assert!(output_dir.join("adblock.txt").exists());
        assert!(output_dir.join("adblock.srs").exists());
        assert!(output_dir.join("telegram.json").exists());
        assert!(!output_dir.join("merged-ip-proxy.srs").exists());
        assert_eq!(*publisher.0.lock().unwrap(), 0);

        let _ = std::fs::remove_dir_all(&output_dir);
    }

    #[tokio::test]
    async fn conversion_failure_propagates() {
        let server = feed_server().await;
        let output_dir = temp_output("convfail");
        let config = run_config(&server, output_dir.clone());

        let err = run(&config, &BrokenDecompiler, &NoPublish, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RulefeedError::Conversion(_)));
        assert!(err.to_string().contains("unexpected EOF"));

        let _ = std::fs::remove_dir_all(&output_dir);
    }

    #[test]
    fn run_config_from_app_config() {
        let app = AppConfig::default();
        let config = RunConfig::from(&app);
        assert_eq!(config.output_dir, PathBuf::from("rule-set"));
        assert_eq!(config.sources.len(), app.sources.len());

        let ordered = config.ordered_sources();
        let categories: Vec<Category> = ordered.iter().map(|s| s.category).collect();
        let mut sorted = categories.clone();
        sorted.sort();
        assert_eq!(categories, sorted);
        assert_eq!(ordered[0].name, "apple-cn");
        assert_eq!(ordered.last().unwrap().name, "twitter");
    }
}

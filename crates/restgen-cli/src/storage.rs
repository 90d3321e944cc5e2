//! Persistent run storage
//!
//! Every `restgen generate` run is saved regardless of `--output` mode.
//! Directory layout: `{output_dir}/{host_port}_{timestamp}/`

use std::path::{Path, PathBuf};

use restgen_core::graph::DependencyGraph;
use restgen_core::report::GenerationReport;
use restgen_core::sequence::TestInteraction;
use restgen_core::{Config, to_http_file};

/// Everything needed to persist a generation run.
pub struct RunData<'a> {
    pub config: &'a Config,
    pub report: &'a GenerationReport,
    pub graph: &'a DependencyGraph,
    pub nominal: &'a [TestInteraction],
    pub mutants: &'a [TestInteraction],
}

/// Save a run under `base`.
///
/// Returns the run directory path on success.
pub fn save_run(data: &RunData, base: &Path) -> Result<PathBuf, std::io::Error> {
    let run_dir = base.join(build_dir_name(&data.config.base_url));
    std::fs::create_dir_all(&run_dir)?;

    // config.toml: snapshot of the config used, without auth values
    let mut config = data.config.clone();
    for auth in &mut config.auth {
        auth.value = "***".to_string();
    }
    let config_toml =
        toml::to_string_pretty(&config).map_err(|e| std::io::Error::other(e.to_string()))?;
    std::fs::write(run_dir.join("config.toml"), config_toml)?;

    let summary = serde_json::json!({
        "complete": data.report.is_complete(),
        "summary": data.report.summary,
        "operations": data.report.operations,
        "meta": {
            "started_at": data.report.started_at,
            "elapsed_ms": data.report.elapsed_ms,
            "base_url": data.config.base_url,
            "spec": data.config.spec.display().to_string(),
        },
    });
    std::fs::write(
        run_dir.join("summary.json"),
        serde_json::to_string_pretty(&summary).unwrap_or_default(),
    )?;
    std::fs::write(
        run_dir.join("report.json"),
        serde_json::to_string_pretty(data.report).unwrap_or_default(),
    )?;

    std::fs::write(run_dir.join("nominal.http"), to_http_file(data.nominal, "base_url"))?;
    if !data.mutants.is_empty() {
        std::fs::write(run_dir.join("errors.http"), to_http_file(data.mutants, "base_url"))?;
    }
    std::fs::write(run_dir.join("graph.dot"), data.graph.to_dot())?;

    Ok(run_dir)
}

/// `{host_port}_{timestamp}` e.g. `localhost_8080_20260205T193000`
fn build_dir_name(base_url: &str) -> String {
    let host_port = extract_host_port(base_url);
    let ts = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    format!("{host_port}_{ts}")
}

/// `"http://localhost:8080/path"` → `"localhost_8080"`
fn extract_host_port(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("unknown")
        .replace(':', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use restgen_core::generation::{GenerationContext, NominalGenerator};
    use restgen_core::operation::{HttpMethod, Operation, OperationSpec};
    use restgen_core::sequence::{ExecutionOutcome, InteractionExecutor};
    use restgen_core::{AuthParameter, Location};
    use std::convert::Infallible;
    use std::sync::Arc;

    struct AlwaysOk;

    impl InteractionExecutor for AlwaysOk {
        type Error = Infallible;

        fn execute(&mut self, _: &TestInteraction) -> Result<ExecutionOutcome, Infallible> {
            Ok(ExecutionOutcome::pass(Some(200), Vec::new()))
        }
    }

    #[test]
    fn extract_host_port_standard() {
        assert_eq!(extract_host_port("http://localhost:8080"), "localhost_8080");
        assert_eq!(
            extract_host_port("https://api.example.com"),
            "api.example.com"
        );
        assert_eq!(
            extract_host_port("http://10.0.0.1:3000/v1"),
            "10.0.0.1_3000"
        );
    }

    #[test]
    fn dir_name_format() {
        let name = build_dir_name("http://localhost:8080");
        assert!(name.starts_with("localhost_8080_"));
        assert_eq!(name.len(), "localhost_8080_".len() + "20260205T193000".len());
    }

    #[test]
    fn run_files_are_written() {
        let op = Arc::new(Operation::from_spec(OperationSpec::new(HttpMethod::Get, "/health")));
        let graph = DependencyGraph::build(&[op]);
        let mut config = Config::default();
        config.auth.push(AuthParameter {
            name: "Authorization".into(),
            location: Location::Header,
            value: "Bearer secret".into(),
        });
        let mut ctx = GenerationContext::unauthenticated(config.generation.clone());
        let nominal = NominalGenerator::new(&graph).run(&mut ctx, &mut AlwaysOk).unwrap();
        let report = GenerationReport::new(&graph, &nominal, None, chrono::Utc::now());

        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_run(
            &RunData {
                config: &config,
                report: &report,
                graph: &graph,
                nominal: nominal.sequence.interactions(),
                mutants: &[],
            },
            dir.path(),
        )
        .unwrap();

        for file in ["config.toml", "summary.json", "report.json", "nominal.http", "graph.dot"] {
            assert!(run_dir.join(file).exists(), "{file} missing");
        }
        assert!(!run_dir.join("errors.http").exists());
        let config_toml = std::fs::read_to_string(run_dir.join("config.toml")).unwrap();
        assert!(!config_toml.contains("secret"));
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(run_dir.join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["complete"], true);
    }
}

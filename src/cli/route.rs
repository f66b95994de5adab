//! CLI route: dispatch each command to the domain and render JSON output.

use crate::cli::parse::Commands;
use crate::config::{self, AnimatrConfig};
use crate::intake::InputClassifier;
use crate::pipeline::ProductionPlan;
use crate::progress::HistoryRuntime;
use crate::schema::{SchemaValidator, SpecValidator};
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub struct RunContext {
    config: AnimatrConfig,
    classifier: InputClassifier,
}

impl RunContext {
    /// Build from the process-wide configuration installed at startup.
    pub fn new() -> Result<Self> {
        let config = config::global().context("configuration was not installed")?;
        Ok(Self::with_config(config.clone()))
    }

    pub fn with_config(config: AnimatrConfig) -> Self {
        Self {
            config,
            classifier: InputClassifier::new(),
        }
    }

    pub fn execute(&self, command: &Commands) -> Result<String> {
        match command {
            Commands::Classify { input } => {
                let raw = read_input(input)?;
                let request = self.classifier.classify(&raw)?;
                Ok(serde_json::to_string_pretty(&request)?)
            }
            Commands::Plan { input } => {
                let raw = read_input(input)?;
                let request = self.classifier.classify(&raw)?;
                let plan = ProductionPlan::for_kind(request.kind());
                Ok(serde_json::to_string_pretty(&plan)?)
            }
            Commands::Validate { input } => {
                let raw = read_input(input)?;
                let text = String::from_utf8(raw).context("input is not UTF-8")?;
                let output = match SchemaValidator.validate(&text) {
                    Ok(spec) => json!({
                        "valid": true,
                        "scenes": spec.spec().scene_count(),
                        "total_duration_s": spec.spec().total_duration_seconds(),
                    }),
                    Err(err) => json!({ "valid": false, "error": err.to_string() }),
                };
                Ok(serde_json::to_string_pretty(&output)?)
            }
            Commands::History { run } => self.history(run.as_deref()),
        }
    }

    fn history(&self, run: Option<&str>) -> Result<String> {
        let path = self
            .config
            .storage
            .history_path
            .as_ref()
            .ok_or_else(|| anyhow!("storage.history_path is not configured"))?;
        let runtime = HistoryRuntime::open(path)?;
        let output = match run {
            Some(run_id) => {
                let record = runtime
                    .store()
                    .get_run(run_id)?
                    .ok_or_else(|| anyhow!("run {run_id} not found"))?;
                json!({
                    "run": record,
                    "jobs": runtime.store().read_jobs(run_id)?,
                    "qa": runtime.store().read_qa(run_id)?,
                    "events": runtime.store().read_events(run_id)?,
                })
            }
            None => json!(runtime.store().list_runs()?),
        };
        Ok(serde_json::to_string_pretty(&output)?)
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    debug!(path = %path.display(), "reading input");
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

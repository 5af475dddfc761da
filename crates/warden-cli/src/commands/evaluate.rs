//! Evaluate command - decides one access request against a dataset.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use warden_abac::{Decision, EvaluationRequest, MemoryStore, Pdp};
use warden_config::WardenConfig;

use crate::style::colors::{SemanticStyle, decision_style};
use crate::style::info_table;
use crate::{EvaluateArgs, OutputFormat};

pub fn run(config: &WardenConfig, args: EvaluateArgs) -> Result<()> {
    let dataset = match args.dataset.as_deref().or(config.store.dataset.as_deref()) {
        Some(path) => path.to_path_buf(),
        None => bail!("No dataset given. Pass --dataset or set store.dataset in warden.toml"),
    };
    let store = load_store(&dataset)?;

    let mut engine = config.engine.clone();
    if args.strict {
        engine.fail_safe = false;
    }
    let pdp = Pdp::new(store, engine).context("Invalid engine configuration")?;

    let mut request = EvaluationRequest::new(args.subject, args.resource, args.action);
    if let Some(request_id) = args.request_id {
        request = request.with_request_id(request_id);
    }
    for raw in &args.env {
        let (key, value) = parse_env_pair(raw)?;
        request = request.with_environment(key, value);
    }
    if let Some(timestamp) = args.timestamp {
        request = request.with_timestamp(timestamp);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let decision = runtime.block_on(async {
        match args.timeout_ms {
            Some(ms) => pdp.evaluate_within(Duration::from_millis(ms), &request).await,
            None => pdp.evaluate(&request).await,
        }
    })?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&decision)?),
        OutputFormat::Table => print_decision(&decision),
    }
    Ok(())
}

fn load_store(path: &Path) -> Result<MemoryStore> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    MemoryStore::from_json(&json)
        .with_context(|| format!("Failed to load dataset {}", path.display()))
}

/// Splits `key=value`. The value is taken as JSON when it parses, otherwise
/// as a plain string.
fn parse_env_pair(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid --env '{raw}': expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --env '{raw}': empty key");
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn print_decision(decision: &Decision) {
    let matched = decision.matched_ids();
    let entries = [
        ("Request", decision.request_id.clone()),
        (
            "Result",
            decision.result.styled(decision_style(decision.result)),
        ),
        ("Reason", decision.reason.clone()),
        (
            "Matched",
            if matched.is_empty() {
                "-".muted()
            } else {
                matched.join(", ")
            },
        ),
        ("Elapsed", format!("{:?}", decision.elapsed)),
        ("Evaluated at", decision.evaluated_at.to_rfc3339()),
    ];
    println!("{}", info_table(&entries));
}

//! Validate command - parses policy documents the way the engine loads them.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use warden_abac::{Dataset, Policy, PolicyDocument};

use crate::style::{print_error, print_labeled, print_success, print_warn, policy_table};

/// Accepts a dataset object, an array of policy documents, or one policy
/// document. Every policy is parsed, so unknown operators are reported here
/// rather than at evaluation time.
pub fn run(file: &Path) -> Result<()> {
    let json = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    println!("Validating {}...", file.display());

    match parse(&json) {
        Ok(Parsed { policies, entities }) => {
            print_success(&format!("{} policies valid", policies.len()));
            if let Some((subjects, resources, actions)) = entities {
                print_labeled("Subjects", &subjects.to_string());
                print_labeled("Resources", &resources.to_string());
                print_labeled("Actions", &actions.to_string());
            }
            if policies.is_empty() {
                print_warn("No policies found; every request will be not_applicable");
            } else {
                println!("{}", policy_table(&policies));
            }
            let disabled = policies.iter().filter(|p| !p.enabled).count();
            if disabled > 0 {
                print_warn(&format!("{disabled} policies are disabled"));
            }
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Validation failed: {e:#}"));
            Err(e)
        }
    }
}

#[derive(Debug)]
struct Parsed {
    policies: Vec<Policy>,
    /// Subject, resource and action counts when the file is a dataset.
    entities: Option<(usize, usize, usize)>,
}

fn parse(json: &str) -> Result<Parsed> {
    let value: Value = serde_json::from_str(json).context("Invalid JSON")?;

    if value.is_array() {
        return Ok(Parsed {
            policies: Policy::list_from_json(json)?,
            entities: None,
        });
    }

    let is_dataset = ["subjects", "resources", "actions", "policies"]
        .iter()
        .any(|key| value.get(key).is_some());
    if is_dataset {
        let dataset: Dataset = serde_json::from_value(value).context("Invalid dataset")?;
        let entities = (
            dataset.subjects.len(),
            dataset.resources.len(),
            dataset.actions.len(),
        );
        let policies = dataset
            .policies
            .into_iter()
            .map(Policy::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Parsed {
            policies,
            entities: Some(entities),
        });
    }

    let document: PolicyDocument = serde_json::from_value(value).context("Invalid policy")?;
    Ok(Parsed {
        policies: vec![Policy::try_from(document)?],
        entities: None,
    })
}

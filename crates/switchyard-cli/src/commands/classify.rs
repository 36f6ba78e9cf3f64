use std::path::Path;

use anyhow::Context;
use switchyard_core::{ErrorClassification, SwitchyardConfig};
use switchyard_recovery::{ErrorClassifier, RecoveryAdvisor};

use crate::Format;

fn load(config_path: Option<&str>) -> anyhow::Result<(ErrorClassifier, RecoveryAdvisor)> {
    match config_path {
        None => Ok((ErrorClassifier::builtin(), RecoveryAdvisor::builtin())),
        Some(path) => {
            let config = SwitchyardConfig::from_file(Path::new(path))
                .with_context(|| format!("loading {path}"))?;
            let classifier = ErrorClassifier::with_patterns(&config.error_patterns)?;
            Ok((classifier, RecoveryAdvisor::with_overrides(&config.recovery)))
        }
    }
}

fn print_classification(c: &ErrorClassification) {
    println!("type:       {}", c.error_type);
    println!("category:   {}", format!("{:?}", c.category).to_lowercase());
    println!("severity:   {}", format!("{:?}", c.severity).to_lowercase());
    println!("retriable:  {}", c.retriable);
    println!("reason:     {}", c.reason);
    println!("suggestion: {}", c.suggestion);
}

pub fn classify(
    message: &str,
    operation: &str,
    config_path: Option<&str>,
    format: Format,
) -> anyhow::Result<()> {
    let (classifier, _) = load(config_path)?;
    let classification = classifier.classify(message, operation);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&classification)?),
        Format::Text => print_classification(&classification),
    }
    Ok(())
}

pub fn suggest(
    message: &str,
    operation: &str,
    config_path: Option<&str>,
    format: Format,
) -> anyhow::Result<()> {
    let (classifier, advisor) = load(config_path)?;
    let classification = classifier.classify(message, operation);
    let actions = advisor.suggest(&classification);

    match format {
        Format::Json => {
            let out = serde_json::json!({
                "classification": classification,
                "actions": actions,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Text => {
            print_classification(&classification);
            println!();
            if actions.is_empty() {
                println!("no recovery actions");
            }
            for (i, action) in actions.iter().enumerate() {
                let auto = if action.auto_retry { " [auto]" } else { "" };
                println!(
                    "{}. {} ({:?}){}: {}",
                    i + 1,
                    action.kind,
                    action.priority,
                    auto,
                    action.description
                );
                if !action.command.is_empty() {
                    println!("     $ {}", action.command);
                }
            }
        }
    }
    Ok(())
}

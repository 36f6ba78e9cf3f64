use std::path::Path;

use anyhow::Context;
use switchyard_core::{SwitchyardConfig, format_duration};
use switchyard_rollout::planner;

use crate::Format;

/// Print the phases a run with this config would step through.
pub fn plan(config_path: &str, format: Format) -> anyhow::Result<()> {
    let config = SwitchyardConfig::from_file(Path::new(config_path))
        .with_context(|| format!("loading {config_path}"))?;
    config.validate()?;

    let switch = &config.switch;
    if let Some(requested) = switch.phase_count {
        let fixed = planner::phase_count(switch.switch_type);
        if requested != fixed {
            tracing::warn!(
                requested,
                fixed,
                switch_type = %switch.switch_type,
                "phase_count is advisory; using the fixed count"
            );
        }
    }
    let phases = planner::phases(switch.switch_type, switch.total_duration);

    match format {
        Format::Json => {
            let preview = serde_json::json!({
                "project": config.project.name,
                "type": switch.switch_type,
                "total_duration": format_duration(switch.total_duration),
                "phases": phases,
                "validation_rules": config.validation_rules,
                "auto_rollback": config.rollback.auto_rollback,
            });
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        Format::Text => {
            println!(
                "{}: {} switch over {}",
                config.project.name,
                switch.switch_type,
                format_duration(switch.total_duration)
            );
            for phase in &phases {
                println!(
                    "  phase {}  {:>3}%  soak {}",
                    phase.phase_number,
                    phase.traffic_percent,
                    format_duration(phase.duration)
                );
            }
            if !config.validation_rules.is_empty() {
                println!("gated on:");
                for rule in &config.validation_rules {
                    println!("  {} ({}): {:?}", rule.name, rule.condition, rule.action);
                }
            }
            println!(
                "auto-rollback: {}",
                if config.rollback.auto_rollback { "on" } else { "off" }
            );
        }
    }

    Ok(())
}

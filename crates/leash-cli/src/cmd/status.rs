use crate::cmd::{self, TargetOverrides};
use crate::output::{print_json, print_table};
use leash_core::exec::Executor;
use leash_core::health::{HealthProbe, HealthReport};
use std::path::Path;

pub fn run(root: &Path, overrides: &TargetOverrides, json: bool) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    let exec = cmd::executor(&config)?;

    let report = cmd::block_on(async {
        // Explicit reachability check first: an unreachable target is a
        // hard error for status, not six identical sub-check failures.
        exec.execute("true", config.target.command_timeout()).await?;
        Ok::<HealthReport, leash_core::LeashError>(HealthProbe::new(&exec, &config).probe().await)
    })??;

    if json {
        return print_json(&report);
    }

    let mut rows = vec![
        vec!["service".to_string(), report.service.to_string()],
        vec![
            "processes".to_string(),
            format!("{} matching", report.processes.len()),
        ],
        vec![
            "ports".to_string(),
            report
                .ports
                .iter()
                .map(|p| p.port.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ],
    ];
    if let Some(pct) = report.disk_used_percent {
        rows.push(vec!["disk_used".to_string(), format!("{pct}%")]);
    }
    if let Some(temp) = report.cpu_temp_celsius {
        rows.push(vec!["cpu_temp".to_string(), format!("{temp:.1} C")]);
    }
    if let Some(bytes) = report.mem_available_bytes {
        rows.push(vec!["mem_available".to_string(), human_bytes(bytes)]);
    }
    print_table(&["check", "value"], rows);

    for failure in &report.errors {
        println!("warning: {} check failed: {}", failure.check, failure.error);
    }
    Ok(())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_scales() {
        assert_eq!(human_bytes(512), "512.0 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}

use serde::Serialize;
use stackup_core::config::{ConfigWarning, WarnLevel};
use stackup_core::plan::ExecutionPlan;
use stackup_core::{DeploymentResult, Outcome};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", padded.join("  ").trim_end());
    };

    line(headers.iter().map(|h| h.to_string()).collect());
    line(widths.iter().map(|&w| "-".repeat(w)).collect());
    for row in rows {
        line(row);
    }
}

pub fn print_warnings(warnings: &[ConfigWarning]) {
    for w in warnings {
        let prefix = match w.level {
            WarnLevel::Warning => "warning",
            WarnLevel::Error => "error",
        };
        eprintln!("[{prefix}] {}", w.message);
    }
}

pub fn print_plan(plan: &ExecutionPlan) {
    println!(
        "Plan for mode {} in namespace '{}':",
        plan.mode, plan.namespace
    );
    for (i, step) in plan.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
}

/// Human rendering of a finished run: per-service table, then a summary.
pub fn print_result(result: &DeploymentResult, access_hint: Option<&str>) {
    if !result.services.is_empty() && result.mode.deploys() {
        let rows = result
            .services
            .iter()
            .map(|s| {
                vec![
                    s.name.clone(),
                    s.tier.to_string(),
                    yes_no(s.built),
                    yes_no(s.loaded),
                    yes_no(s.applied),
                    s.state.label().to_string(),
                    s.error.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(
            &["SERVICE", "TIER", "BUILT", "LOADED", "APPLIED", "STATE", "ERROR"],
            rows,
        );
        println!();
    }

    let elapsed = result.elapsed.as_secs_f64();
    match &result.outcome {
        Outcome::Succeeded => {
            println!(
                "{} succeeded in namespace '{}' ({elapsed:.1}s)",
                result.mode, result.namespace
            );
            if result.mode.deploys() {
                match (&result.access_url, access_hint) {
                    (Some(url), _) => println!("Access: {url}"),
                    (None, Some(hint)) => println!("Access: run `{hint}`"),
                    (None, None) => {}
                }
            }
        }
        Outcome::Failed { category, message } => {
            eprintln!("error: {category} failure after {elapsed:.1}s: {message}");
        }
        Outcome::Cancelled => {
            eprintln!("cancelled after {elapsed:.1}s; resources already applied were left in place");
        }
    }
}

fn yes_no(b: bool) -> String {
    let s = if b { "yes" } else { "-" };
    s.to_string()
}

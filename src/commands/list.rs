use crate::compiler::{CompilerRegistry, CompilerSummary};
use crate::result::Result;

pub async fn execute(json: bool) -> Result<bool> {
    let mut registry = CompilerRegistry::new();
    registry.ensure_detected().await?;

    let summaries = registry.summaries();
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(true);
    }

    if summaries.is_empty() {
        println!("No compilers detected.");
        return Ok(true);
    }

    let default = registry.default_name();
    for summary in &summaries {
        println!("{}", render(summary, default == Some(summary.name.as_str())));
    }

    Ok(true)
}

fn render(summary: &CompilerSummary, is_default: bool) -> String {
    let standards: Vec<&str> = summary.standards.iter().map(|s| s.as_str()).collect();
    let mut features = Vec::new();
    if summary.parallel {
        features.push("parallel");
    }
    if summary.pch {
        features.push("pch");
    }
    if summary.modules {
        features.push("modules");
    }
    if summary.concepts {
        features.push("concepts");
    }

    format!(
        "{}{} {} ({})\n  path: {}\n  standards: {}\n  features: {}",
        summary.name,
        if is_default { " [default]" } else { "" },
        summary.version,
        summary.dialect,
        summary.command.display(),
        standards.join(", "),
        features.join(", ")
    )
}

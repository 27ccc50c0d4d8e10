use std::fmt::Write;

use crate::aggregate::DashboardView;
use crate::registry::{Category, Registry};

fn district_label(registry: &Registry, district_id: Option<i32>) -> String {
    district_id
        .and_then(|id| registry.by_id(id))
        .map_or_else(|| "all districts".to_string(), |district| district.name.clone())
}

pub fn build_report(view: &DashboardView, registry: &Registry, summary: Option<&str>) -> String {
    let mut output = String::new();
    let scope = district_label(registry, view.filters.district_id);
    let category_scope = view
        .filters
        .category
        .map_or("all categories", Category::label);

    let _ = writeln!(output, "# District Performance Report");
    match view.range {
        Some(range) => {
            let _ = writeln!(
                output,
                "Generated for {} / {} ({} to {})",
                scope, category_scope, range.start, range.end
            );
        }
        None => {
            let _ = writeln!(output, "Generated for {} / {} (no records)", scope, category_scope);
        }
    }

    if let Some(summary) = summary {
        let _ = writeln!(output);
        let _ = writeln!(output, "> {}", summary);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Indicators");
    for metric in &view.kpis {
        let _ = writeln!(
            output,
            "- {}: {} ({:+.1}% vs previous month)",
            metric.label, metric.value, metric.change
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## District Comparison");
    let _ = write!(output, "| District |");
    for category in Category::ALL {
        let _ = write!(output, " {} |", category);
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "|---|{}", "---:|".repeat(Category::ALL.len()));
    for row in &view.comparison {
        let _ = write!(output, "| {} |", row.district.name);
        for (_, value) in row.totals.iter() {
            let _ = write!(output, " {} |", value);
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Month-wise Trend");
    for bucket in &view.trend {
        let parts: Vec<String> = bucket
            .totals
            .iter()
            .filter(|(_, value)| *value != 0.0)
            .map(|(category, value)| format!("{} {}", category, value))
            .collect();
        if parts.is_empty() {
            let _ = writeln!(output, "- {}: no activity", bucket.label);
        } else {
            let _ = writeln!(output, "- {}: {}", bucket.label, parts.join(", "));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Leaderboard");
    for entry in &view.leaderboard {
        let _ = writeln!(
            output,
            "{}. {} score {}",
            entry.rank, entry.district.name, entry.score
        );
    }

    output
}

use crate::document::WriteOutcome;
use crate::pipeline::audit::AuditReport;
use crate::pipeline::features::FeatureCollection;
use crate::pipeline::validate::ValidationSummary;
use crate::tiles::CommandOutput;

pub fn render_summary(s: &ValidationSummary) -> String {
    let mut out = String::new();
    out.push_str("Data Validation Results:\n");
    out.push_str(&format!("Total records: {}\n", s.total));
    out.push_str(&format!("Accepted records: {}\n", s.accepted));
    out.push_str(&format!("Invalid dates: {}\n", s.invalid_dates));
    out.push_str(&format!(
        "Date range: {} to {}\n",
        s.min_date.as_deref().unwrap_or("-"),
        s.max_date.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("Dates past cutoff: {}\n", s.past_cutoff));
    out.push_str(&format!(
        "Rejected coordinates: {}\nRejected prices: {}\n",
        s.rejected_coordinates, s.rejected_prices
    ));
    out
}

pub fn render_audit(report: &AuditReport, max_listed: usize) -> String {
    let mut out = String::new();
    out.push_str("GeoJSON Validation:\n");
    if report.is_clean() {
        out.push_str("All features passed the audit\n");
    } else {
        out.push_str("Found invalid features:\n");
        let (shown, rest) = report.listed(max_listed);
        for issue in shown {
            out.push_str(&format!("{}\n", issue));
        }
        if rest > 0 {
            out.push_str(&format!("...and {} more errors\n", rest));
        }
    }

    out.push_str(&format!("\nTotal features: {}\n", report.total));
    out.push_str("\nFeatures by county:\n");
    for (county, count) in &report.by_county {
        out.push_str(&format!("{}: {}\n", county, count));
    }
    out.push_str("\nFeatures by year:\n");
    for (year, count) in &report.by_year {
        out.push_str(&format!("{}: {}\n", year, count));
    }
    if report.undated > 0 {
        out.push_str(&format!("undated: {}\n", report.undated));
    }
    out
}

pub fn render_written(written: &WriteOutcome) -> String {
    format!(
        "GeoJSON written to {} ({:.2} MB, {} features)\n",
        written.path.display(),
        written.megabytes(),
        written.features
    )
}

pub fn render_sample(collection: &FeatureCollection) -> Option<String> {
    let first = collection.features.first()?;
    serde_json::to_string_pretty(first)
        .ok()
        .map(|json| format!("Sample feature:\n{}\n", json))
}

pub fn render_tiles(output: &CommandOutput) -> String {
    let mut out = String::new();
    if !output.stdout.trim().is_empty() {
        out.push_str(&format!("Tippecanoe output: {}\n", output.stdout.trim_end()));
    }
    if !output.stderr.trim().is_empty() {
        out.push_str(&format!("Tippecanoe errors: {}\n", output.stderr.trim_end()));
    }
    out.push_str("MBTiles file created successfully!\n");
    out
}

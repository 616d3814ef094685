//! Output formatting helpers for CLI commands

use crate::queue::RunReport;
use crate::store::RunStatus;
use crate::trace::{ApprovalStatus, DecisionTrace};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

/// Format a run's decision trace as a table followed by a summary line
pub fn format_report_table(report: &RunReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Step",
        "Type",
        "Decision",
        "Confidence",
        "Approval",
        "Duration",
    ]);

    for trace in &report.traces {
        table.add_row(vec![
            Cell::new(trace.step_number),
            Cell::new(trace.step_type),
            Cell::new(&trace.decision),
            Cell::new(format!("{:.2}", trace.confidence)),
            Cell::new(approval_label(trace)),
            Cell::new(format!("{}ms", trace.duration_ms)),
        ]);
    }

    let mut out = table.to_string();
    out.push('\n');
    out.push_str(&summary_line(report));
    if let Some(content) = &report.content {
        out.push_str("\n\n");
        out.push_str(content);
    }
    out
}

/// Format a run report as pretty JSON
pub fn format_report_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

fn approval_label(trace: &DecisionTrace) -> String {
    match trace.approval_status {
        ApprovalStatus::NotRequired => "-".to_string(),
        ApprovalStatus::Pending => "pending".yellow().to_string(),
        ApprovalStatus::Approved => match &trace.approved_by {
            Some(by) => format!("approved by {}", by).green().to_string(),
            None => "approved".green().to_string(),
        },
        ApprovalStatus::Rejected => "rejected".red().to_string(),
    }
}

fn summary_line(report: &RunReport) -> String {
    let status = match report.status {
        RunStatus::Completed => "completed".green().bold().to_string(),
        RunStatus::Failed => "failed".red().bold().to_string(),
        RunStatus::Cancelled => "cancelled".yellow().bold().to_string(),
        other => other.to_string(),
    };
    let provider = report
        .used_provider
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());

    let mut line = format!(
        "Run {} {} via {} ({} attempt{}, ${:.4})",
        report.run_id,
        status,
        provider,
        report.attempts,
        if report.attempts == 1 { "" } else { "s" },
        report.cost_usd
    );
    if let Some(error) = &report.error {
        line.push_str(&format!("\nError: {}", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;
    use crate::trace::StepType;
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> RunReport {
        let run_id = Uuid::new_v4();
        RunReport {
            run_id,
            status: RunStatus::Completed,
            used_provider: Some(ProviderId::new("anthropic")),
            model: Some("claude-3-5-sonnet-20241022".to_string()),
            content: Some("Here is the summary.".to_string()),
            attempts: 3,
            cost_usd: 0.0012,
            error: None,
            traces: vec![DecisionTrace {
                id: Uuid::new_v4(),
                run_id,
                step_number: 1,
                step_type: StepType::ProviderSelection,
                decision: "Use openai".to_string(),
                reasoning: "Requested provider".to_string(),
                confidence: 0.95,
                alternatives: vec!["anthropic".to_string()],
                context_used: vec![],
                duration_ms: 0,
                approval_status: ApprovalStatus::NotRequired,
                approved_by: None,
                rejection_reason: None,
                created_at: Utc::now(),
            }],
        }
    }

    #[test]
    fn test_format_report_table_contains_steps() {
        colored::control::set_override(false);
        let out = format_report_table(&report());
        assert!(out.contains("provider_selection"));
        assert!(out.contains("Use openai"));
        assert!(out.contains("0.95"));
        assert!(out.contains("completed via anthropic (3 attempts"));
        assert!(out.contains("Here is the summary."));
    }

    #[test]
    fn test_format_report_json_roundtrips_fields() {
        let json = format_report_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["used_provider"], "anthropic");
        assert_eq!(value["traces"][0]["step_type"], "provider_selection");
    }

    #[test]
    fn test_failed_summary_includes_error() {
        colored::control::set_override(false);
        let mut r = report();
        r.status = RunStatus::Failed;
        r.content = None;
        r.error = Some("All providers in fallback chain failed".to_string());
        let out = format_report_table(&r);
        assert!(out.contains("failed"));
        assert!(out.contains("Error: All providers"));
    }
}

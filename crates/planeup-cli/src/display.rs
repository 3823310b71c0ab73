//! Display formatting for CLI output
//!
//! Line builders are separated from printing so they can be tested without
//! capturing stdout.

use console::style;

use planeup_core::InstallationStatus;
use planeup_kube::{CleanupOutcome, CleanupReport};

fn mark(ok: bool) -> String {
    if ok {
        style("✓").green().to_string()
    } else {
        style("✗").red().to_string()
    }
}

/// Render a status snapshot as display lines
pub fn status_lines(status: &InstallationStatus) -> Vec<String> {
    let mut lines = Vec::new();

    if !status.installed {
        lines.push(format!(
            "{} '{}' is not installed in namespace '{}'",
            mark(false),
            status.release_name,
            status.namespace
        ));
        lines.push("Run 'planeup up' to install it".to_string());
        return lines;
    }

    lines.push(format!(
        "{} {} in namespace '{}'",
        status.release_name,
        status.version.as_deref().unwrap_or("(unknown version)"),
        status.namespace
    ));
    lines.push(format!(
        "  {} pods ready ({}/{})",
        mark(status.ready),
        status.ready_pod_count,
        status.pod_count
    ));
    lines.push(format!(
        "  {} provider {}",
        mark(status.provider_ready),
        if status.provider_ready {
            "installed and healthy"
        } else if status.provider_installed {
            "installed but not healthy"
        } else {
            "not installed"
        }
    ));
    lines.push(format!(
        "  {} provider config {}",
        mark(status.provider_config_exists),
        if status.provider_config_exists {
            "present"
        } else {
            "missing"
        }
    ));

    if !status.issues.is_empty() {
        lines.push("issues:".to_string());
        for issue in &status.issues {
            lines.push(format!("  - {issue}"));
        }
    }

    lines
}

/// Render a teardown report as display lines
pub fn report_lines(report: &CleanupReport) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in report.entries() {
        let line = match &entry.outcome {
            CleanupOutcome::Removed => format!("{} {} removed", mark(true), entry.step),
            CleanupOutcome::AlreadyAbsent => {
                format!("{} {} already absent", mark(true), entry.step)
            }
            CleanupOutcome::Failed(detail) => {
                format!("{} {} failed: {detail}", mark(false), entry.step)
            }
        };
        lines.push(line);
    }
    lines.push(format!("teardown: {}", report.summary()));
    lines
}

pub fn print_status(status: &InstallationStatus) {
    for line in status_lines(status) {
        println!("{line}");
    }
}

pub fn print_report(report: &CleanupReport) {
    for line in report_lines(report) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed_status() -> InstallationStatus {
        InstallationStatus {
            installed: true,
            version: Some("1.15.0".to_string()),
            namespace: "crossplane-system".to_string(),
            release_name: "crossplane".to_string(),
            ready: true,
            pod_count: 3,
            ready_pod_count: 3,
            provider_installed: true,
            provider_ready: true,
            provider_config_exists: true,
            issues: Vec::new(),
        }
    }

    #[test]
    fn test_status_lines_healthy() {
        let lines = status_lines(&installed_status());
        assert!(lines[0].contains("crossplane 1.15.0"));
        assert!(lines.iter().any(|l| l.contains("pods ready (3/3)")));
        assert!(lines.iter().any(|l| l.contains("installed and healthy")));
        assert!(!lines.iter().any(|l| l.contains("issues")));
    }

    #[test]
    fn test_status_lines_not_installed() {
        let status = InstallationStatus::absent("crossplane-system", "crossplane");
        let lines = status_lines(&status);
        assert!(lines[0].contains("not installed"));
        assert!(lines[1].contains("planeup up"));
    }

    #[test]
    fn test_status_lines_show_issues() {
        let mut status = installed_status();
        status.provider_ready = false;
        status
            .issues
            .push("provider 'provider-aws-s3' is not healthy: pulling package".to_string());

        let lines = status_lines(&status);
        assert!(lines.iter().any(|l| l.contains("installed but not healthy")));
        assert!(lines.iter().any(|l| l.contains("pulling package")));
    }
}

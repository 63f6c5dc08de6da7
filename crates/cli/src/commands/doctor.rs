use serde::Serialize;
use shopdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use shopdesk_core::domain::knowledge::KnowledgeBase;
use shopdesk_core::domain::profile::AssistantProfile;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(loaded: Result<AppConfig, ConfigError>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_knowledge_base(&config));
            checks.push(check_profile(&config));
            checks.push(check_generation(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["knowledge_base", "assistant_profile", "generation_endpoint"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_knowledge_base(config: &AppConfig) -> DoctorCheck {
    let path = &config.assistant.knowledge_base_path;
    let knowledge = KnowledgeBase::load_or_empty(path);
    let duplicates = knowledge.duplicate_ids();

    let (status, details) = if knowledge.is_empty() {
        (
            CheckStatus::Fail,
            format!(
                "no entries loaded from `{}`; policy questions will get the no-information reply",
                path.display()
            ),
        )
    } else if !duplicates.is_empty() {
        (
            CheckStatus::Fail,
            format!(
                "{} entries loaded from `{}` but ids are duplicated: {}",
                knowledge.len(),
                path.display(),
                duplicates.join(", ")
            ),
        )
    } else {
        (CheckStatus::Pass, format!("{} entries loaded from `{}`", knowledge.len(), path.display()))
    };

    DoctorCheck { name: "knowledge_base", status, details }
}

fn check_profile(config: &AppConfig) -> DoctorCheck {
    let path = &config.assistant.profile_path;
    if !path.exists() {
        return DoctorCheck {
            name: "assistant_profile",
            status: CheckStatus::Skipped,
            details: format!("`{}` not found; built-in profile will be used", path.display()),
        };
    }

    let profile = AssistantProfile::load_or_default(path);
    DoctorCheck {
        name: "assistant_profile",
        status: CheckStatus::Pass,
        details: format!(
            "assistant `{}` with {} rules loaded from `{}`",
            profile.identity.name,
            profile.rules.len(),
            path.display()
        ),
    }
}

fn check_generation(config: &AppConfig) -> DoctorCheck {
    match config.generation.endpoint.as_deref().filter(|_| config.generation.is_enabled()) {
        Some(endpoint) => DoctorCheck {
            name: "generation_endpoint",
            status: CheckStatus::Pass,
            details: format!("generation requests go to `{endpoint}`"),
        },
        None => DoctorCheck {
            name: "generation_endpoint",
            status: CheckStatus::Skipped,
            details: "no endpoint configured; canned fallbacks will be used".to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

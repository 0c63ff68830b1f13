use claimly_core::config::{AppConfig, LoadOptions};
use claimly_db::{connect_with_settings, migrations};
use serde::Serialize;

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

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_rate_table(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "currency_rate_table",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Conversion is fail-open, so an empty rate table is a warning condition
/// worth surfacing before the first multi-currency expense arrives.
fn check_rate_table(config: &AppConfig) -> DoctorCheck {
    let rates = &config.currency.rates;
    if rates.is_empty() {
        DoctorCheck {
            name: "currency_rate_table",
            status: CheckStatus::Fail,
            details: "no exchange rates configured; cross-currency amounts will pass through unconverted"
                .to_string(),
        }
    } else {
        DoctorCheck {
            name: "currency_rate_table",
            status: CheckStatus::Pass,
            details: format!("{} rate(s) configured", rates.len()),
        }
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| format!("failed to inspect migration state: {error}"))?;

        pool.close().await;
        Ok::<usize, String>(pending)
    });

    match result {
        Ok(0) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; schema is current", config.database.url),
        },
        Ok(pending) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Fail,
            details: format!("connected, but {pending} migration(s) are pending; run `claimly migrate`"),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
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

#[cfg(test)]
mod tests {
    use claimly_core::config::AppConfig;

    use super::{check_rate_table, CheckStatus};

    #[test]
    fn empty_rate_table_fails_the_readiness_check() {
        let config = AppConfig::default();
        let check = check_rate_table(&config);
        assert_eq!(check.status, CheckStatus::Fail);
    }

    #[test]
    fn populated_rate_table_passes() {
        let mut config = AppConfig::default();
        config
            .currency
            .rates
            .insert("USD".to_string(), rust_decimal::Decimal::ONE);
        let check = check_rate_table(&config);
        assert_eq!(check.status, CheckStatus::Pass);
    }
}

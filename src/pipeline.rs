//! Sequential fetch and summary over a registry.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::config::HealthSettings;
use crate::health::{rescale, summarize_rescaled, HealthSummary, SummaryTable};
use crate::registry::{Registry, SensorRecord};
use crate::sensors::{FetchError, SensorTimeSeries};

/// What to do when a sensor cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Leave the sensor out of the table and keep going.
    Skip,
    /// Stop at the first failure.
    Abort,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sensor {name} (id {site_id}) failed: {source}")]
    Aborted {
        name: String,
        site_id: String,
        #[source]
        source: FetchError,
    },
}

/// A sensor with data, its series already rescaled to percent.
#[derive(Debug, Clone)]
pub struct SensorReport {
    pub record: SensorRecord,
    pub series: SensorTimeSeries,
    pub summary: HealthSummary,
}

#[derive(Debug, Clone)]
pub struct SkippedSensor {
    pub record: SensorRecord,
    pub reason: FetchError,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// In registry order.
    pub reports: Vec<SensorReport>,
    pub table: SummaryTable,
    pub skipped: Vec<SkippedSensor>,
}

impl RunOutcome {
    /// Every sensor was attempted and none produced data.
    pub fn is_total_failure(&self) -> bool {
        self.reports.is_empty() && !self.skipped.is_empty()
    }
}

/// Fetch and summarize every sensor in registry order, one at a time.
pub fn run<F>(
    registry: &Registry,
    settings: &HealthSettings,
    now: NaiveDateTime,
    policy: FailurePolicy,
    mut fetch: F,
) -> Result<RunOutcome, PipelineError>
where
    F: FnMut(&SensorRecord) -> Result<SensorTimeSeries, FetchError>,
{
    let mut reports = Vec::with_capacity(registry.len());
    let mut skipped = Vec::new();

    for record in registry.iter() {
        log::info!("querying {name} (id {id})", name = record.name, id = record.site_id);
        match fetch(record) {
            Ok(series) => {
                let series = rescale(&series, settings);
                let summary = summarize_rescaled(record, &series, settings, now);
                reports.push(SensorReport {
                    record: record.clone(),
                    series,
                    summary,
                });
            }
            Err(reason) if policy == FailurePolicy::Abort => {
                return Err(PipelineError::Aborted {
                    name: record.name.clone(),
                    site_id: record.site_id.to_string(),
                    source: reason,
                });
            }
            Err(reason) => {
                log::info!("skipping {name} (id {id}): {reason}", name = record.name, id = record.site_id);
                skipped.push(SkippedSensor {
                    record: record.clone(),
                    reason,
                });
            }
        }
    }

    let table = reports.iter().map(|r| r.summary.clone()).collect();
    if !skipped.is_empty() {
        log::warn!(
            "{skipped} of {total} sensors skipped",
            skipped = skipped.len(),
            total = registry.len()
        );
    }
    Ok(RunOutcome { reports, table, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SiteId, SiteMetadata};
    use crate::sensors::{DeviceInfo, Reading};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn registry(ids: &[&str]) -> Registry {
        ids.iter()
            .map(|id| SensorRecord {
                name: format!("sensor-{id}"),
                site_id: SiteId::new(id),
                site: SiteMetadata::default(),
            })
            .collect()
    }

    fn fake_fetch(record: &SensorRecord) -> Result<SensorTimeSeries, FetchError> {
        match record.site_id.as_str() {
            "5" => Err(FetchError::NoData),
            "8" => Err(FetchError::Status(502)),
            _ => {
                let reading = Reading {
                    timestamp: now() - chrono::Duration::hours(12),
                    level: 1.0,
                    battery: 120.0,
                    signal: 15.0,
                };
                Ok(SensorTimeSeries::new(vec![reading], DeviceInfo::default()).unwrap())
            }
        }
    }

    #[test]
    fn test_failed_sensors_are_left_out_of_the_table() {
        let outcome = run(&registry(&["30", "5", "8", "6"]), &HealthSettings::default(), now(), FailurePolicy::Skip, fake_fetch)
            .unwrap();

        let ids: Vec<&str> = outcome.table.rows().iter().map(|r| r.site_id.as_str()).collect();
        assert_eq!(ids, vec!["6", "30"]);

        let skipped: Vec<(&str, &FetchError)> =
            outcome.skipped.iter().map(|s| (s.record.site_id.as_str(), &s.reason)).collect();
        assert_eq!(skipped, vec![("5", &FetchError::NoData), ("8", &FetchError::Status(502))]);
        assert!(!outcome.is_total_failure());
    }

    #[test]
    fn test_reports_keep_registry_order_and_rescaled_series() {
        let outcome =
            run(&registry(&["30", "6"]), &HealthSettings::default(), now(), FailurePolicy::Skip, fake_fetch).unwrap();
        let names: Vec<&str> = outcome.reports.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(names, vec!["sensor-30", "sensor-6"]);

        let report = &outcome.reports[0];
        assert_eq!(report.series.last().battery, 12.0);
        assert_eq!(report.series.last().signal, 50.0);
        assert_eq!(report.summary.days_since_last_reading, 0.5);
    }

    #[test]
    fn test_abort_policy_stops_at_first_failure() {
        let mut calls = 0;
        let result = run(&registry(&["30", "5", "6"]), &HealthSettings::default(), now(), FailurePolicy::Abort, |record| {
            calls += 1;
            fake_fetch(record)
        });

        let err = result.unwrap_err();
        assert!(matches!(err, PipelineError::Aborted { ref site_id, .. } if site_id == "5"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_total_failure() {
        let outcome =
            run(&registry(&["5", "8"]), &HealthSettings::default(), now(), FailurePolicy::Skip, fake_fetch).unwrap();
        assert!(outcome.table.is_empty());
        assert!(outcome.is_total_failure());

        let empty = run(&Registry::default(), &HealthSettings::default(), now(), FailurePolicy::Skip, fake_fetch).unwrap();
        assert!(!empty.is_total_failure());
    }
}

//! Per-sensor health metrics and the summary table built from them.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::config::HealthSettings;
use crate::registry::{SensorRecord, SiteId};
use crate::sensors::{Reading, SensorTimeSeries};

/// Status snapshot of one sensor. Values are kept at full precision.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HealthSummary {
    pub site_id: SiteId,
    pub name: String,
    pub last_reading: NaiveDateTime,
    pub days_since_last_reading: f64,
    /// Mean signal (%) over the trailing window; NaN when it has no values.
    pub mean_signal_recent: f64,
    pub battery_percent: f64,
    /// `None` when the series does not reach back far enough.
    pub battery_change_7d: Option<f64>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Convert raw battery and signal units to percent.
pub fn rescale(series: &SensorTimeSeries, settings: &HealthSettings) -> SensorTimeSeries {
    series.map_readings(|r| Reading {
        battery: r.battery / settings.battery_divisor,
        signal: round1(r.signal / settings.signal_full_scale * 100.0),
        ..r.clone()
    })
}

// NaN values are skipped; no values at all is NaN.
fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Summarize a raw series.
pub fn summarize(
    record: &SensorRecord,
    series: &SensorTimeSeries,
    settings: &HealthSettings,
    now: NaiveDateTime,
) -> HealthSummary {
    summarize_rescaled(record, &rescale(series, settings), settings, now)
}

/// Summarize a series already passed through [`rescale`].
pub fn summarize_rescaled(
    record: &SensorRecord,
    series: &SensorTimeSeries,
    settings: &HealthSettings,
    now: NaiveDateTime,
) -> HealthSummary {
    let last = series.last();
    let last_reading = last.timestamp;

    let age = now.signed_duration_since(last_reading);
    let mut days_since_last_reading = age.num_milliseconds() as f64 / 86_400_000.0;
    if days_since_last_reading < 0.0 {
        log::debug!("{}: last reading {last_reading} is ahead of the local clock", record.name);
        days_since_last_reading = 0.0;
    }

    let signal_from = last_reading - Duration::hours(settings.signal_window_hours);
    let mean_signal_recent = mean(
        series
            .readings()
            .iter()
            .filter(|r| r.timestamp >= signal_from)
            .map(|r| r.signal),
    );

    let battery_cutoff = last_reading - Duration::days(settings.battery_window_days);
    let battery_change_7d = series
        .readings()
        .iter()
        .rev()
        .find(|r| r.timestamp <= battery_cutoff)
        .map(|baseline| last.battery - baseline.battery);

    HealthSummary {
        site_id: record.site_id.clone(),
        name: record.name.clone(),
        last_reading,
        days_since_last_reading,
        mean_signal_recent,
        battery_percent: last.battery,
        battery_change_7d,
    }
}

/// Summaries ordered by site id.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(transparent)]
pub struct SummaryTable {
    rows: Vec<HealthSummary>,
}

impl SummaryTable {
    pub fn new(mut rows: Vec<HealthSummary>) -> Self {
        rows.sort_by(|a, b| a.site_id.cmp(&b.site_id));
        SummaryTable { rows }
    }

    pub fn rows(&self) -> &[HealthSummary] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<HealthSummary> for SummaryTable {
    fn from_iter<I: IntoIterator<Item = HealthSummary>>(iter: I) -> Self {
        SummaryTable::new(iter.into_iter().collect())
    }
}

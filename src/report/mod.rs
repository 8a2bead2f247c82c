//! Outputs: summary CSV, skipped list, raw series and the paginated document.
mod chart;
mod csv;
mod document;

use self::csv::{series_csv, skipped_csv, summary_csv};
use document::render_document;

use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{HealthSettings, ReportSettings};
use crate::health::SummaryTable;
use crate::pipeline::RunOutcome;
use crate::registry::SensorRecord;
use crate::tabular::encode_latin1;

/// Round for display only; NaN renders as `NaN`.
pub fn fmt_fixed(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:.decimals$}")
    }
}

pub fn fmt_optional(value: Option<f64>, decimals: usize) -> String {
    value.map(|v| fmt_fixed(v, decimals)).unwrap_or_default()
}

/// Aligned plain-text table for the terminal.
pub fn render_table(table: &SummaryTable) -> String {
    let headers = ["id", "name", "days", "battery %", "signal %", "battery 7d %"];
    let rows: Vec<[String; 6]> = table
        .rows()
        .iter()
        .map(|row| {
            [
                row.site_id.to_string(),
                row.name.clone(),
                fmt_fixed(row.days_since_last_reading, 2),
                fmt_fixed(row.battery_percent, 1),
                fmt_fixed(row.mean_signal_recent, 1),
                fmt_optional(row.battery_change_7d, 1),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_line = |cells: &[String]| {
        let line: Vec<String> = cells
            .iter()
            .zip(widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                // Name column is left aligned, numbers right aligned.
                if i == 1 {
                    format!("{cell:<width$}")
                } else {
                    format!("{cell:>width$}")
                }
            })
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };
    push_line(&headers.map(str::to_string));
    for row in &rows {
        push_line(row);
    }
    out
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `<prefix>_<site id>_<name>.csv`, so exports never clash with each other or with `<prefix>_skipped.csv`.
fn series_file_name(prefix: &str, record: &SensorRecord) -> PathBuf {
    PathBuf::from(format!(
        "{prefix}_{}_{}.csv",
        sanitize_file_name(record.site_id.as_str()),
        sanitize_file_name(&record.name)
    ))
}

fn write_latin1(path: &Path, text: &str) -> io::Result<()> {
    fs::write(path, encode_latin1(text))
}

/// Write every report file next to `settings.output`, returning the paths written.
pub fn write_outputs(
    outcome: &RunOutcome,
    settings: &ReportSettings,
    health: &HealthSettings,
    now: NaiveDateTime,
    export_series: bool,
) -> io::Result<Vec<PathBuf>> {
    let prefix = &settings.output;
    let mut written = Vec::new();

    let summary_path = PathBuf::from(format!("{prefix}.csv"));
    write_latin1(&summary_path, &summary_csv(&outcome.table))?;
    written.push(summary_path);

    if !outcome.skipped.is_empty() {
        let skipped_path = PathBuf::from(format!("{prefix}_skipped.csv"));
        write_latin1(&skipped_path, &skipped_csv(&outcome.skipped))?;
        written.push(skipped_path);
    }

    let document_path = PathBuf::from(format!("{prefix}.txt"));
    fs::write(&document_path, render_document(outcome, settings, health, now))?;
    written.push(document_path);

    if export_series {
        for report in &outcome.reports {
            let path = series_file_name(prefix, &report.record);
            if written.contains(&path) {
                log::warn!("{} already written, skipping series of {}", path.display(), report.record.name);
                continue;
            }
            write_latin1(&path, &series_csv(&report.series))?;
            written.push(path);
        }
    }

    for path in &written {
        log::info!("wrote {}", path.display());
    }
    Ok(written)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_fixed() {
        assert_eq!(fmt_fixed(1.256, 2), "1.26");
        assert_eq!(fmt_fixed(-2.04, 1), "-2.0");
        assert_eq!(fmt_fixed(f64::NAN, 1), "NaN");
        assert_eq!(fmt_optional(None, 1), "");
    }

    #[test]
    fn test_render_table_is_sorted_and_aligned() {
        let outcome = fixtures::outcome();
        let text = render_table(&outcome.table);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id"));
        assert!(lines[1].trim_start().starts_with("7  Borches"));
        assert!(lines[2].trim_start().starts_with("30  Carabelas"));
        assert!(lines[1].contains("12.0"));
        assert!(lines[1].contains("70.0"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("INTA Delta"), "INTA_Delta");
        assert_eq!(sanitize_file_name("Atucha II/UPA"), "Atucha_II_UPA");
    }

    #[test]
    fn test_series_file_names_do_not_collide() {
        let record = |name: &str, id: &str| SensorRecord {
            name: name.to_string(),
            site_id: crate::registry::SiteId::new(id),
            site: Default::default(),
        };
        let skipped = series_file_name("Delta", &record("skipped", "12"));
        assert_eq!(skipped, PathBuf::from("Delta_12_skipped.csv"));
        assert_ne!(skipped, PathBuf::from("Delta_skipped.csv"));

        let spaced = series_file_name("Delta", &record("Atucha II", "43"));
        let underscored = series_file_name("Delta", &record("Atucha_II", "44"));
        assert_ne!(spaced, underscored);
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ReportSettings {
            output: dir.path().join("SensoresDelta").display().to_string(),
            ..Default::default()
        };
        let outcome = fixtures::outcome();
        let written = write_outputs(&outcome, &settings, &HealthSettings::default(), fixtures::now(), true).unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "SensoresDelta.csv",
                "SensoresDelta_skipped.csv",
                "SensoresDelta.txt",
                "SensoresDelta_30_Carabelas.csv",
                "SensoresDelta_7_Borches.csv",
            ]
        );
        assert!(written.iter().all(|p| p.exists()));

        let summary = fs::read(dir.path().join("SensoresDelta.csv")).unwrap();
        assert!(summary.starts_with(b"fdx_id,nombre,"));
    }
}

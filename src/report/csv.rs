use super::{fmt_fixed, fmt_optional};
use crate::health::SummaryTable;
use crate::pipeline::SkippedSensor;
use crate::sensors::SensorTimeSeries;
use crate::tabular::write_row;

const SUMMARY_HEADER: [&str; 6] = ["fdx_id", "nombre", "Dias_UltDato", "bateria", "Senal_Media", "Bat_Perdida_1S"];

/// One row per summarized sensor, rounded for presentation.
pub fn summary_csv(table: &SummaryTable) -> String {
    let mut out = String::new();
    write_row(&mut out, &SUMMARY_HEADER);
    for row in table.rows() {
        write_row(
            &mut out,
            &[
                row.site_id.to_string(),
                row.name.clone(),
                fmt_fixed(row.days_since_last_reading, 2),
                fmt_fixed(row.battery_percent, 1),
                fmt_fixed(row.mean_signal_recent, 1),
                fmt_optional(row.battery_change_7d, 1),
            ],
        );
    }
    out
}

pub fn skipped_csv(skipped: &[SkippedSensor]) -> String {
    let mut out = String::new();
    write_row(&mut out, &["fdx_id", "nombre", "reason"]);
    for sensor in skipped {
        write_row(
            &mut out,
            &[
                sensor.record.site_id.to_string(),
                sensor.record.name.clone(),
                sensor.reason.to_string(),
            ],
        );
    }
    out
}

pub fn series_csv(series: &SensorTimeSeries) -> String {
    let mut out = String::new();
    write_row(&mut out, &["hora", "nivel", "bateria", "senal"]);
    for reading in series.readings() {
        write_row(
            &mut out,
            &[
                reading.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                reading.level.to_string(),
                reading.battery.to_string(),
                reading.signal.to_string(),
            ],
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures;

    #[test]
    fn test_summary_csv_rounds_and_sorts() {
        let csv = summary_csv(&fixtures::outcome().table);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "fdx_id,nombre,Dias_UltDato,bateria,Senal_Media,Bat_Perdida_1S");
        assert_eq!(lines[1], "7,Borches,0.25,12.0,70.0,-0.7");
        assert_eq!(lines[2], "30,Carabelas,0.25,12.0,70.0,-0.7");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_skipped_csv_lists_reasons() {
        let csv = skipped_csv(&fixtures::outcome().skipped);
        assert_eq!(csv, "fdx_id,nombre,reason\n46,Zemek,request failed with status 503\n");
    }

    #[test]
    fn test_series_csv() {
        let outcome = fixtures::outcome();
        let csv = series_csv(&outcome.reports[0].series);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], "hora,nivel,bateria,senal");
        assert_eq!(lines[11], "2024-06-10 06:00:00,2,12,70");
    }
}

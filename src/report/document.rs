use chrono::NaiveDateTime;

use super::chart::{render_chart, TimeAxis};
use super::{fmt_fixed, fmt_optional};
use crate::config::{HealthSettings, ReportSettings};
use crate::pipeline::{RunOutcome, SensorReport};
use crate::sensors::Reading;

const PAGE_BREAK: char = '\u{000c}';

/// Plain-text pages of a fixed height.
#[derive(Debug, Clone)]
pub struct Document {
    pages: Vec<Vec<String>>,
    lines_per_page: usize,
}

impl Document {
    pub fn new(lines_per_page: usize) -> Self {
        Document {
            pages: vec![Vec::new()],
            lines_per_page: lines_per_page.max(1),
        }
    }

    fn current(&mut self) -> &mut Vec<String> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Overflowing lines continue on a new page.
    pub fn line<S: Into<String>>(&mut self, text: S) {
        let lines_per_page = self.lines_per_page;
        if self.current().len() >= lines_per_page {
            self.pages.push(Vec::new());
        }
        self.current().push(text.into());
    }

    pub fn blank(&mut self) {
        self.line("");
    }

    /// No-op on an empty page.
    pub fn new_page(&mut self) {
        if !self.current().is_empty() {
            self.pages.push(Vec::new());
        }
    }

    /// Move to a new page unless the next `lines` fit on this one.
    pub fn keep_together(&mut self, lines: usize) {
        let lines_per_page = self.lines_per_page;
        if self.current().len() + lines > lines_per_page {
            self.new_page();
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|page| !page.is_empty()).count()
    }

    /// Pages separated by form feeds, each ending with its page number.
    pub fn render(&self) -> String {
        let total = self.page_count();
        let pages = self.pages.iter().filter(|page| !page.is_empty());
        let mut out = String::new();
        for (i, page) in pages.enumerate() {
            if i > 0 {
                out.push(PAGE_BREAK);
                out.push('\n');
            }
            for line in page.iter() {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&format!("\n{:>40}\n", format!("page {} of {total}", i + 1)));
        }
        out
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn fmt_coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn summary_section(doc: &mut Document, outcome: &RunOutcome, health: &HealthSettings) {
    doc.line("Sensor summary");
    doc.blank();
    for row in outcome.table.rows() {
        doc.keep_together(5);
        doc.line(format!("ID: {}, Name: {}", row.site_id, row.name));
        doc.line(format!("Last reading: {} days ago", fmt_fixed(row.days_since_last_reading, 2)));
        doc.line(format!(
            "Mean signal ({}h): {}%",
            health.signal_window_hours,
            fmt_fixed(row.mean_signal_recent, 1)
        ));
        let change = match row.battery_change_7d {
            Some(_) => format!("{}%", fmt_optional(row.battery_change_7d, 1)),
            None => "n/a".to_string(),
        };
        doc.line(format!(
            "Battery: {}%, battery change ({} days): {change}",
            fmt_fixed(row.battery_percent, 1),
            health.battery_window_days
        ));
        doc.blank();
    }

    if !outcome.skipped.is_empty() {
        doc.keep_together(3);
        doc.line(format!("Skipped sensors ({})", outcome.skipped.len()));
        doc.blank();
        for sensor in &outcome.skipped {
            doc.line(format!(
                "ID: {}, Name: {} - {}",
                sensor.record.site_id, sensor.record.name, sensor.reason
            ));
        }
    }
}

fn detail_page(doc: &mut Document, report: &SensorReport, settings: &ReportSettings, now: NaiveDateTime) {
    let record = &report.record;
    let device = report.series.device();
    let last = report.series.last();

    doc.new_page();
    doc.line(format!("Sensor: {} (ID: {})", record.name, record.site_id));
    doc.blank();
    doc.line(format!(
        "Brand: {}, Model: {}, Serial: {}",
        or_dash(device.brand.as_deref()),
        or_dash(device.model.as_deref()),
        or_dash(device.serial.as_deref())
    ));
    doc.line(format!(
        "Location: lat {}, lon {}",
        fmt_coordinate(record.site.lat),
        fmt_coordinate(record.site.lon)
    ));
    doc.line(format!("River: {}", or_dash(record.site.river.as_deref())));
    doc.line(format!("Last reading: {}", last.timestamp.format("%Y-%m-%d %H:%M:%S")));
    doc.line(format!("Battery: {} %", fmt_fixed(last.battery, 1)));
    doc.line(format!("Signal: {} %", fmt_fixed(last.signal, 1)));
    doc.blank();

    let axis = TimeAxis {
        start: report.series.first().timestamp,
        end: last.timestamp.max(now),
        now,
    };
    let panels: [(&str, fn(&Reading) -> f64); 3] = [
        ("Level", |r| r.level),
        ("Battery (%)", |r| r.battery),
        ("Signal (%)", |r| r.signal),
    ];
    for (title, value) in panels {
        let points: Vec<_> = report.series.readings().iter().map(|r| (r.timestamp, value(r))).collect();
        let chart = render_chart(title, &points, &axis, settings.chart_width, settings.chart_height);
        doc.keep_together(chart.len() + 1);
        for line in chart {
            doc.line(line);
        }
        doc.blank();
    }
}

/// Summary page(s) followed by one detail page per sensor with data.
pub fn render_document(
    outcome: &RunOutcome,
    settings: &ReportSettings,
    health: &HealthSettings,
    now: NaiveDateTime,
) -> String {
    let mut doc = Document::new(settings.lines_per_page);

    doc.line(format!("Hydrometric network report - {}", now.format("%Y-%m-%d")));
    doc.blank();
    doc.line(format!("Stations with data: {}", outcome.reports.len()));
    if !outcome.skipped.is_empty() {
        doc.line(format!("Stations without data: {}", outcome.skipped.len()));
    }
    doc.blank();
    summary_section(&mut doc, outcome, health);

    for report in &outcome.reports {
        detail_page(&mut doc, report, settings, now);
    }
    doc.render()
}

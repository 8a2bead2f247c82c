use chrono::NaiveDateTime;

const LABEL_WIDTH: usize = 9;
const POINT: char = '*';
const NOW: char = '|';

/// Time axis shared by the panels of one sensor.
#[derive(Debug, Clone, Copy)]
pub struct TimeAxis {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Drawn as a vertical marker when it falls inside the axis.
    pub now: NaiveDateTime,
}

impl TimeAxis {
    fn column(&self, ts: NaiveDateTime, width: usize) -> Option<usize> {
        let span = (self.end - self.start).num_seconds().max(1) as f64;
        let offset = (ts - self.start).num_seconds() as f64 / span;
        if !(0.0..=1.0).contains(&offset) {
            return None;
        }
        Some((offset * (width - 1) as f64).round() as usize)
    }
}

/// Scatter plot of `points` as text lines: title, `height` plot rows and two axis rows.
pub fn render_chart(
    title: &str,
    points: &[(NaiveDateTime, f64)],
    axis: &TimeAxis,
    width: usize,
    height: usize,
) -> Vec<String> {
    let width = width.max(10);
    let height = height.max(2);
    let mut lines = vec![title.to_string()];

    let finite: Vec<&(NaiveDateTime, f64)> = points.iter().filter(|(_, v)| v.is_finite()).collect();
    if finite.is_empty() {
        lines.push(format!("{} (no numeric values)", " ".repeat(LABEL_WIDTH)));
        return lines;
    }

    let (mut lo, mut hi) = finite
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
    if hi - lo < f64::EPSILON {
        lo -= 1.0;
        hi += 1.0;
    }

    let mut grid = vec![vec![' '; width]; height];
    if let Some(col) = axis.column(axis.now, width) {
        for row in grid.iter_mut() {
            row[col] = NOW;
        }
    }
    for (ts, value) in finite {
        let Some(col) = axis.column(*ts, width) else {
            continue;
        };
        let level = ((value - lo) / (hi - lo) * (height - 1) as f64).round() as usize;
        grid[height - 1 - level][col] = POINT;
    }

    for (i, row) in grid.iter().enumerate() {
        let label = if i == 0 {
            format!("{:>w$.2}", hi, w = LABEL_WIDTH)
        } else if i == height - 1 {
            format!("{:>w$.2}", lo, w = LABEL_WIDTH)
        } else {
            " ".repeat(LABEL_WIDTH)
        };
        lines.push(format!("{label} |{}", row.iter().collect::<String>()));
    }

    let left = axis.start.format("%Y-%m-%d").to_string();
    let right = axis.end.format("%Y-%m-%d").to_string();
    let gap = width.saturating_sub(left.len() + right.len()).max(1);
    lines.push(format!("{} +{}", " ".repeat(LABEL_WIDTH), "-".repeat(width)));
    lines.push(format!("{}  {left}{}{right}", " ".repeat(LABEL_WIDTH), " ".repeat(gap)));
    lines
}

//! Read-only views over the analysis log: table, hazard chart, map points, CSV.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::storage::LogEntry;
use crate::HazardLevel;

/// File name offered for CSV downloads.
pub const CSV_FILE_NAME: &str = "railway_logs.csv";

pub const CSV_HEADER: [&str; 9] = [
    "ID",
    "Timestamp",
    "Image",
    "Summary",
    "Direction",
    "Hazard",
    "Signal",
    "Lat",
    "Lon",
];

const TABLE_WIDTHS: [usize; 9] = [5, 19, 20, 40, 9, 7, 8, 10, 10];
const BAR_WIDTH: usize = 40;

fn coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row_fields(entry: &LogEntry) -> [String; 9] {
    [
        entry.id.to_string(),
        entry.timestamp.clone(),
        entry.image_name.clone(),
        entry.summary.clone(),
        entry.direction.to_string(),
        entry.hazard_level.to_string(),
        entry.signal_color.to_string(),
        coordinate(entry.latitude),
        coordinate(entry.longitude),
    ]
}

fn fit(value: &str, width: usize) -> String {
    let flat = value.replace('\n', " | ");
    let count = flat.chars().count();
    if count <= width {
        return format!("{:<width$}", flat, width = width);
    }
    let mut cut: String = flat.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn table_line(fields: &[String]) -> String {
    fields
        .iter()
        .zip(TABLE_WIDTHS)
        .map(|(field, width)| fit(field, width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Fixed-width table, one line per entry. Multi-line summaries are flattened.
pub fn render_table(entries: &[LogEntry]) -> String {
    let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
    let mut out = table_line(&header);
    out.push('\n');
    let rule_len = TABLE_WIDTHS.iter().sum::<usize>() + 2 * (TABLE_WIDTHS.len() - 1);
    out.push_str(&"-".repeat(rule_len));
    out.push('\n');
    for entry in entries {
        out.push_str(&table_line(&row_fields(entry)));
        out.push('\n');
    }
    out
}

/// Count of entries per hazard level, most frequent first.
///
/// Absent levels are omitted. Equal counts list the more severe level first.
pub fn hazard_distribution(entries: &[LogEntry]) -> Vec<(HazardLevel, usize)> {
    let mut counts: Vec<(HazardLevel, usize)> = Vec::new();
    for entry in entries {
        match counts.iter_mut().find(|(level, _)| *level == entry.hazard_level) {
            Some((_, count)) => *count += 1,
            None => counts.push((entry.hazard_level, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    counts
}

/// Horizontal text bar chart, scaled so the largest bar is `BAR_WIDTH` wide.
pub fn render_bar_chart(distribution: &[(HazardLevel, usize)]) -> String {
    let max = distribution.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let mut out = String::new();
    for (level, count) in distribution {
        let len = if max == 0 {
            0
        } else {
            ((count * BAR_WIDTH) + max - 1) / max
        };
        out.push_str(&format!(
            "{:<6} | {} {}\n",
            level.as_str(),
            "#".repeat(len),
            count
        ));
    }
    out
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapPoint {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub image_name: String,
    pub hazard_level: HazardLevel,
}

/// Entries that carry both coordinates, in input order.
pub fn map_points(entries: &[LogEntry]) -> Vec<MapPoint> {
    entries
        .iter()
        .filter_map(|entry| match (entry.latitude, entry.longitude) {
            (Some(latitude), Some(longitude)) => Some(MapPoint {
                id: entry.id,
                latitude,
                longitude,
                image_name: entry.image_name.clone(),
                hazard_level: entry.hazard_level,
            }),
            _ => None,
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// Write `entries` as RFC 4180 CSV (CRLF line endings) with a header row.
pub fn write_csv<W: Write>(entries: &[LogEntry], mut out: W) -> Result<()> {
    let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
    out.write_all(csv_line(&header).as_bytes())
        .context("write csv header")?;
    for entry in entries {
        out.write_all(csv_line(&row_fields(entry)).as_bytes())
            .with_context(|| format!("write csv row {}", entry.id))?;
    }
    out.flush().context("flush csv output")?;
    Ok(())
}

/// CSV export as an in-memory string.
pub fn csv_string(entries: &[LogEntry]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(entries, &mut buf)?;
    String::from_utf8(buf).context("csv output was not utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, SignalColor};

    fn entry(id: i64, hazard: HazardLevel, summary: &str) -> LogEntry {
        LogEntry {
            id,
            timestamp: format!("2024-05-01 10:00:{:02}", id),
            image_name: format!("frame_{}.jpg", id),
            summary: summary.to_string(),
            direction: Direction::Straight,
            hazard_level: hazard,
            signal_color: SignalColor::Red,
            latitude: Some(37.5),
            longitude: Some(127.0),
        }
    }

    #[test]
    fn distribution_orders_by_count_then_severity() {
        let entries = vec![
            entry(1, HazardLevel::Low, "a"),
            entry(2, HazardLevel::Medium, "b"),
            entry(3, HazardLevel::Low, "c"),
            entry(4, HazardLevel::High, "d"),
        ];
        assert_eq!(
            hazard_distribution(&entries),
            vec![
                (HazardLevel::Low, 2),
                (HazardLevel::High, 1),
                (HazardLevel::Medium, 1)
            ]
        );
    }

    #[test]
    fn distribution_omits_absent_levels() {
        let entries = vec![entry(1, HazardLevel::High, "a")];
        assert_eq!(hazard_distribution(&entries), vec![(HazardLevel::High, 1)]);
        assert!(hazard_distribution(&[]).is_empty());
    }

    #[test]
    fn bar_chart_scales_to_largest_count() {
        let chart = render_bar_chart(&[(HazardLevel::Low, 4), (HazardLevel::High, 1)]);
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Low    | "));
        assert_eq!(lines[0].matches('#').count(), BAR_WIDTH);
        assert_eq!(lines[1].matches('#').count(), 10);
        assert!(lines[1].ends_with(" 1"));
    }

    #[test]
    fn map_points_require_both_coordinates() {
        let mut missing_lon = entry(2, HazardLevel::Low, "b");
        missing_lon.longitude = None;
        let points = map_points(&[entry(1, HazardLevel::High, "a"), missing_lon]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, 1);
        assert_eq!(points[0].latitude, 37.5);
    }

    #[test]
    fn csv_quotes_commas_quotes_and_newlines() {
        let entries = vec![entry(
            7,
            HazardLevel::High,
            "Detected: rock, person\nVLM says: a \"big\" rock",
        )];
        let csv = csv_string(&entries).unwrap();
        let mut lines = csv.split("\r\n");
        assert_eq!(
            lines.next(),
            Some("ID,Timestamp,Image,Summary,Direction,Hazard,Signal,Lat,Lon")
        );
        assert_eq!(
            csv,
            "ID,Timestamp,Image,Summary,Direction,Hazard,Signal,Lat,Lon\r\n\
             7,2024-05-01 10:00:07,frame_7.jpg,\"Detected: rock, person\nVLM says: a \"\"big\"\" rock\",Straight,High,Red,37.5,127\r\n"
        );
    }

    #[test]
    fn csv_leaves_missing_coordinates_blank() {
        let mut row = entry(1, HazardLevel::Low, "plain");
        row.latitude = None;
        row.longitude = None;
        let csv = csv_string(&[row]).unwrap();
        assert!(csv.ends_with("Straight,Low,Red,,\r\n"));
    }

    #[test]
    fn table_flattens_and_truncates_summaries() {
        let long = format!("Detected: rock\nVLM says: {}", "x".repeat(80));
        let table = render_table(&[entry(3, HazardLevel::Medium, &long)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID     Timestamp"));
        assert!(lines[2].contains("Detected: rock | VLM says: "));
        assert!(lines[2].contains("...  Straight"));
        assert!(lines[2].contains("Medium"));
    }
}

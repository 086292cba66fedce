use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{open_db_connection, AnalysisResult, Direction, HazardLevel, SignalColor};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time at second precision, in the stored format.
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// What the caller supplies when saving an analysis.
#[derive(Clone, Debug)]
pub struct NewLogEntry {
    pub image_name: String,
    pub result: AnalysisResult,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewLogEntry {
    pub fn new(image_name: impl Into<String>, result: AnalysisResult) -> Self {
        Self {
            image_name: image_name.into(),
            result,
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }
}

/// One persisted row of the analysis log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: String,
    pub image_name: String,
    pub summary: String,
    pub direction: Direction,
    pub hazard_level: HazardLevel,
    pub signal_color: SignalColor,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LogEntry {
    fn from_new(id: i64, timestamp: String, entry: &NewLogEntry) -> Self {
        Self {
            id,
            timestamp,
            image_name: entry.image_name.clone(),
            summary: entry.result.summary.clone(),
            direction: entry.result.direction,
            hazard_level: entry.result.hazard_level,
            signal_color: entry.result.signal_color,
            latitude: Some(entry.latitude),
            longitude: Some(entry.longitude),
        }
    }
}

/// Append-only analysis log.
pub trait LogStore {
    /// Append a row with a fresh id and the current timestamp.
    fn save(&mut self, entry: &NewLogEntry) -> Result<LogEntry>;

    /// Every row, newest timestamp first; rows sharing a timestamp come newest id first.
    fn list_all(&mut self) -> Result<Vec<LogEntry>>;
}

pub struct SqliteLogStore {
    conn: Connection,
}

impl SqliteLogStore {
    /// Open (creating if needed) the log table at `db_path`.
    ///
    /// Accepts plain paths, `:memory:` and `file:` URIs.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)
            .with_context(|| format!("open log database {}", db_path))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              timestamp TEXT,
              image_name TEXT,
              summary TEXT,
              direction TEXT,
              hazard_level TEXT,
              signal_color TEXT,
              latitude REAL,
              longitude REAL
            );
            "#,
        )?;
        Ok(())
    }

    /// Close the underlying connection, surfacing any close error.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow!("failed to close log database: {}", e))
    }
}

struct RawRow {
    id: i64,
    timestamp: Option<String>,
    image_name: Option<String>,
    summary: Option<String>,
    direction: Option<String>,
    hazard_level: Option<String>,
    signal_color: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl RawRow {
    fn into_entry(self) -> Result<LogEntry> {
        let id = self.id;
        Ok(LogEntry {
            id,
            timestamp: self.timestamp.unwrap_or_default(),
            image_name: self.image_name.unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            direction: parse_column(id, "direction", self.direction)?,
            hazard_level: parse_column(id, "hazard_level", self.hazard_level)?,
            signal_color: parse_column(id, "signal_color", self.signal_color)?,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

fn parse_column<T>(id: i64, column: &str, value: Option<String>) -> Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    value
        .unwrap_or_default()
        .parse()
        .with_context(|| format!("log row {} has invalid {}", id, column))
}

impl LogStore for SqliteLogStore {
    fn save(&mut self, entry: &NewLogEntry) -> Result<LogEntry> {
        let timestamp = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO logs (timestamp, image_name, summary, direction, hazard_level, signal_color, latitude, longitude)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                timestamp,
                entry.image_name,
                entry.result.summary,
                entry.result.direction.as_str(),
                entry.result.hazard_level.as_str(),
                entry.result.signal_color.as_str(),
                entry.latitude,
                entry.longitude
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(LogEntry::from_new(id, timestamp, entry))
    }

    fn list_all(&mut self) -> Result<Vec<LogEntry>> {
        let rows = {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT id, timestamp, image_name, summary, direction, hazard_level, signal_color, latitude, longitude
                FROM logs ORDER BY timestamp DESC, id DESC
                "#,
            )?;
            let mapped = stmt.query_map([], |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    image_name: row.get(2)?,
                    summary: row.get(3)?,
                    direction: row.get(4)?,
                    hazard_level: row.get(5)?,
                    signal_color: row.get(6)?,
                    latitude: row.get(7)?,
                    longitude: row.get(8)?,
                })
            })?;
            let collected = mapped.collect::<rusqlite::Result<Vec<_>>>()?;
            collected
        };
        rows.into_iter().map(RawRow::into_entry).collect()
    }
}

/// Log store kept in process memory, with the same ordering contract.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogStore {
    entries: Vec<LogEntry>,
    last_id: i64,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for InMemoryLogStore {
    fn save(&mut self, entry: &NewLogEntry) -> Result<LogEntry> {
        self.last_id += 1;
        let saved = LogEntry::from_new(self.last_id, now_timestamp(), entry);
        self.entries.push(saved.clone());
        Ok(saved)
    }

    fn list_all(&mut self) -> Result<Vec<LogEntry>> {
        let mut out = self.entries.clone();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(out)
    }
}

/// Path that selects a process-private log with no database behind it.
pub const IN_MEMORY_DB_PATH: &str = ":memory:";

/// Open the log store named by `db_path`.
///
/// `:memory:` gives an [`InMemoryLogStore`]; anything else (including `file:`
/// URIs) opens SQLite.
pub fn open_log_store(db_path: &str) -> Result<Box<dyn LogStore + Send>> {
    if db_path == IN_MEMORY_DB_PATH {
        log::info!("analysis log kept in memory; rows are lost on exit");
        return Ok(Box::new(InMemoryLogStore::new()));
    }
    Ok(Box::new(SqliteLogStore::open(db_path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(summary: &str, hazard: HazardLevel, signal: SignalColor) -> AnalysisResult {
        AnalysisResult {
            summary: summary.to_string(),
            labels: vec!["rock".to_string()],
            signal_color: signal,
            hazard_level: hazard,
            direction: Direction::Straight,
        }
    }

    fn check_round_trip(store: &mut dyn LogStore) {
        let first = store
            .save(&NewLogEntry::new(
                "a.jpg",
                result("Detected: rock\nVLM says: stones, on the rail", HazardLevel::High, SignalColor::Red),
            ))
            .unwrap();
        let second = store
            .save(
                &NewLogEntry::new("b.png", result("Detected: ", HazardLevel::Low, SignalColor::Unknown))
                    .with_coordinates(37.55, 126.97),
            )
            .unwrap();
        assert!(second.id > first.id);

        let rows = store.list_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], second);
        assert_eq!(rows[1], first);
        assert_eq!(rows[1].summary, "Detected: rock\nVLM says: stones, on the rail");
        assert_eq!(rows[1].hazard_level, HazardLevel::High);
        assert_eq!(rows[1].signal_color, SignalColor::Red);
        assert_eq!(rows[1].latitude, Some(0.0));
        assert_eq!(rows[0].latitude, Some(37.55));
        assert_eq!(rows[0].timestamp.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn sqlite_round_trip_preserves_fields() {
        let mut store = SqliteLogStore::open(":memory:").unwrap();
        check_round_trip(&mut store);
        store.close().unwrap();
    }

    #[test]
    fn in_memory_round_trip_preserves_fields() {
        check_round_trip(&mut InMemoryLogStore::new());
    }

    #[test]
    fn empty_store_lists_nothing() {
        let mut store = SqliteLogStore::open(":memory:").unwrap();
        assert!(store.list_all().unwrap().is_empty());
        assert!(InMemoryLogStore::new().list_all().unwrap().is_empty());
    }

    #[test]
    fn same_second_rows_list_newest_first() {
        let mut store = SqliteLogStore::open(":memory:").unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let saved = store
                .save(&NewLogEntry::new(
                    format!("{i}.jpg"),
                    result("x", HazardLevel::Low, SignalColor::Unknown),
                ))
                .unwrap();
            ids.push(saved.id);
        }
        let listed: Vec<i64> = store.list_all().unwrap().iter().map(|e| e.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);
    }

    #[test]
    fn sqlite_orders_by_timestamp_before_id() {
        let mut store = SqliteLogStore::open(":memory:").unwrap();
        store
            .conn
            .execute_batch(
                r#"
                INSERT INTO logs (timestamp, image_name, summary, direction, hazard_level, signal_color, latitude, longitude)
                VALUES ('2024-05-02 10:00:00', 'new.jpg', 's', 'Straight', 'Low', 'Green', NULL, NULL);
                INSERT INTO logs (timestamp, image_name, summary, direction, hazard_level, signal_color, latitude, longitude)
                VALUES ('2024-05-01 10:00:00', 'old.jpg', 's', 'Unknown', 'Medium', 'Red', 1.5, 2.5);
                "#,
            )
            .unwrap();
        let rows = store.list_all().unwrap();
        assert_eq!(rows[0].image_name, "new.jpg");
        assert_eq!(rows[0].latitude, None);
        assert_eq!(rows[1].image_name, "old.jpg");
        assert_eq!(rows[1].hazard_level, HazardLevel::Medium);
    }

    #[test]
    fn corrupt_enum_values_are_reported() {
        let mut store = SqliteLogStore::open(":memory:").unwrap();
        store
            .conn
            .execute(
                "INSERT INTO logs (timestamp, hazard_level, signal_color, direction) VALUES ('t', 'Severe', 'Red', 'Straight')",
                [],
            )
            .unwrap();
        let err = store.list_all().unwrap_err();
        assert!(format!("{:#}", err).contains("hazard_level"));
    }

    #[test]
    fn database_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");
        let path = path.to_str().unwrap();
        {
            let mut store = SqliteLogStore::open(path).unwrap();
            store
                .save(&NewLogEntry::new("a.jpg", result("s", HazardLevel::Medium, SignalColor::Green)))
                .unwrap();
            store.close().unwrap();
        }
        let mut reopened = SqliteLogStore::open(path).unwrap();
        let rows = reopened.list_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hazard_level, HazardLevel::Medium);
        let next = reopened
            .save(&NewLogEntry::new("b.jpg", result("s", HazardLevel::Low, SignalColor::Green)))
            .unwrap();
        assert!(next.id > rows[0].id);
    }

    #[test]
    fn memory_path_opens_a_private_in_memory_store() {
        let mut first = open_log_store(":memory:").unwrap();
        let mut second = open_log_store(":memory:").unwrap();
        let saved = first
            .save(&NewLogEntry::new("m.jpg", result("Detected: ", HazardLevel::Low, SignalColor::Unknown)))
            .unwrap();
        assert_eq!(first.list_all().unwrap(), vec![saved]);
        assert!(second.list_all().unwrap().is_empty());
    }

    #[test]
    fn file_paths_open_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");
        let path = path.to_string_lossy().to_string();
        {
            let mut store = open_log_store(&path).unwrap();
            store
                .save(&NewLogEntry::new("f.jpg", result("Detected: ", HazardLevel::Medium, SignalColor::Green)))
                .unwrap();
        }
        let mut reopened = open_log_store(&path).unwrap();
        assert_eq!(reopened.list_all().unwrap().len(), 1);
    }
}

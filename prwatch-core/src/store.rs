//! Flat-file storage for PR count history.
//!
//! The table is a CSV file with the header `date,agent,total,merged` and one
//! row per (date, agent), sorted by date then agent. It is read fully on
//! every run and rewritten atomically (temp file in the same directory, then
//! rename) so a crash mid-write never corrupts history.
//!
//! Older tables in the wide layout (`timestamp,<agent>_total,<agent>_merged,…`,
//! one row per run) are read transparently and rewritten in the long layout
//! on the next append.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::types::{AgentRecord, History};

/// Header of the long-format table
pub const HEADER: &str = "date,agent,total,merged";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The persisted history table.
///
/// `load` and `append`/`append_all` are the only ways the file is touched.
#[derive(Debug, Clone)]
pub struct DataStore {
    path: PathBuf,
}

impl DataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full table. A missing or empty file yields an empty history.
    pub fn load(&self) -> Result<History> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No data table yet");
                return Ok(History::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = content
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            return Ok(History::new());
        };

        let history = if header.trim() == HEADER {
            self.parse_long(lines)?
        } else if header.starts_with("timestamp,") {
            tracing::info!(
                path = %self.path.display(),
                "Reading legacy wide-format table; it will be rewritten on next append"
            );
            self.parse_wide(header, lines)?
        } else {
            return Err(self.read_error(1, format!("unrecognized header {:?}", header)));
        };

        tracing::debug!(
            path = %self.path.display(),
            rows = history.len(),
            "Loaded data table"
        );
        Ok(history)
    }

    /// Insert or overwrite the row for (date, agent) and persist the table.
    pub fn append(&self, date: NaiveDate, agent: &str, total: u64, merged: u64) -> Result<()> {
        let record = AgentRecord::new(date, agent, total, merged)?;
        self.append_all(&[record]).map(|_| ())
    }

    /// Upsert a batch of records and persist the table in a single write.
    pub fn append_all(&self, records: &[AgentRecord]) -> Result<History> {
        let mut history = self.load()?;
        for record in records {
            if let Some(previous) = history.upsert(record.clone()) {
                tracing::debug!(
                    agent = %record.agent,
                    date = %record.date,
                    previous_total = previous.total,
                    total = record.total,
                    "Overwriting same-day row"
                );
            }
        }
        self.write(&history)?;
        Ok(history)
    }

    fn write(&self, history: &History) -> Result<()> {
        let mut body = String::with_capacity(32 * (history.len() + 1));
        body.push_str(HEADER);
        body.push('\n');
        for record in history.records() {
            body.push_str(&format!(
                "{},{},{},{}\n",
                record.date.format(DATE_FORMAT),
                record.agent,
                record.total,
                record.merged
            ));
        }

        write_atomic(&self.path, body.as_bytes()).map_err(|source| Error::StoreWrite {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(
            path = %self.path.display(),
            rows = history.len(),
            "Data table written"
        );
        Ok(())
    }

    fn parse_long<'a>(&self, lines: impl Iterator<Item = (usize, &'a str)>) -> Result<History> {
        let mut history = History::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(self.read_error(
                    line_no,
                    format!("expected 4 fields, found {}", fields.len()),
                ));
            }
            let date = NaiveDate::parse_from_str(fields[0], DATE_FORMAT)
                .map_err(|e| self.read_error(line_no, format!("bad date {:?}: {}", fields[0], e)))?;
            let total = self.parse_count(line_no, fields[2])?;
            let merged = self.parse_count(line_no, fields[3])?;
            let record = AgentRecord::new(date, fields[1], total, merged)
                .map_err(|e| self.read_error(line_no, e.to_string()))?;
            if history.upsert(record).is_some() {
                return Err(self.read_error(
                    line_no,
                    format!("duplicate row for {} on {}", fields[1], fields[0]),
                ));
            }
        }
        Ok(history)
    }

    fn parse_wide<'a>(
        &self,
        header: &str,
        lines: impl Iterator<Item = (usize, &'a str)>,
    ) -> Result<History> {
        // Map each agent to its (total, merged) column indices.
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();
        let mut agents: Vec<(String, usize, usize)> = Vec::new();
        for (idx, column) in columns.iter().enumerate() {
            if let Some(agent) = column.strip_suffix("_total") {
                let merged_col = format!("{agent}_merged");
                let merged_idx = columns
                    .iter()
                    .position(|c| *c == merged_col)
                    .ok_or_else(|| self.read_error(1, format!("missing column {merged_col}")))?;
                agents.push((agent.to_string(), idx, merged_idx));
            }
        }

        let mut history = History::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() > columns.len() {
                return Err(self.read_error(
                    line_no,
                    format!("expected at most {} fields, found {}", columns.len(), fields.len()),
                ));
            }
            let date = parse_legacy_timestamp(fields[0])
                .ok_or_else(|| self.read_error(line_no, format!("bad timestamp {:?}", fields[0])))?;
            for (agent, total_idx, merged_idx) in &agents {
                // Agents added later have empty or missing cells in older rows.
                let cell = |idx: usize| fields.get(idx).copied().unwrap_or("");
                let (total_cell, merged_cell) = (cell(*total_idx), cell(*merged_idx));
                if total_cell.is_empty() && merged_cell.is_empty() {
                    continue;
                }
                let total = self.parse_count(line_no, total_cell)?;
                let merged = self.parse_count(line_no, merged_cell)?;
                // Later rows of the same day win.
                history.upsert(AgentRecord {
                    date,
                    agent: agent.clone(),
                    total,
                    merged: merged.min(total),
                });
            }
        }
        Ok(history)
    }

    fn parse_count(&self, line: usize, field: &str) -> Result<u64> {
        // Legacy tables written through pandas may carry floats like "12.0".
        let trimmed = field.strip_suffix(".0").unwrap_or(field);
        trimmed
            .parse::<u64>()
            .map_err(|e| self.read_error(line, format!("bad count {:?}: {}", field, e)))
    }

    fn read_error(&self, line: usize, message: String) -> Error {
        Error::StoreRead {
            path: self.path.clone(),
            line,
            message,
        }
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS`, tolerating U+2011 non-breaking hyphens.
fn parse_legacy_timestamp(raw: &str) -> Option<NaiveDate> {
    let normalized = raw.replace('\u{2011}', "-");
    let date_part = normalized.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Write `bytes` to `path` via a temp file in the same directory plus rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    match_target_permissions(tmp.as_file(), path)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Give a temp file the mode of the file it is about to replace, or 0644
/// for a new file. Temp files start out owner-only.
#[cfg(unix)]
pub(crate) fn match_target_permissions(tmp: &fs::File, target: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match fs::metadata(target) {
        Ok(meta) => meta.permissions().mode() & 0o7777,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0o644,
        Err(e) => return Err(e),
    };
    tmp.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn match_target_permissions(_tmp: &fs::File, _target: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Directory containing `path`, treating a bare file name as the cwd.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path().join("data.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_empty_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "").unwrap();
        assert!(DataStore::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path().join("nested/data.csv"));

        store.append(day(1), "codex", 100, 80).unwrap();
        store.append(day(1), "codex", 120, 90).unwrap();

        let history = store.load().unwrap();
        assert_eq!(history.len(), 1);
        let record = history.get(day(1), "codex").unwrap();
        assert_eq!((record.total, record.merged), (120, 90));
    }

    #[test]
    fn test_append_rejects_invalid_counts() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path().join("data.csv"));
        let err = store.append(day(1), "codex", 1, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_written_table_is_sorted_long_format() {
        let dir = TempDir::new().unwrap();
        let store = DataStore::new(dir.path().join("data.csv"));
        store
            .append_all(&[
                AgentRecord::new(day(2), "copilot", 5, 1).unwrap(),
                AgentRecord::new(day(1), "codex", 7, 3).unwrap(),
                AgentRecord::new(day(1), "codegen", 2, 2).unwrap(),
            ])
            .unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            content,
            "date,agent,total,merged\n\
             2025-06-01,codegen,2,2\n\
             2025-06-01,codex,7,3\n\
             2025-06-02,copilot,5,1\n"
        );
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "date,agent,total,merged\n2025-06-01,codex,10,5\n2025-06-02,codex,ten,5\n")
            .unwrap();

        match DataStore::new(&path).load().unwrap_err() {
            Error::StoreRead { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_rows_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(
            &path,
            "date,agent,total,merged\n2025-06-01,codex,10,5\n2025-06-01,codex,11,5\n",
        )
        .unwrap();
        assert!(matches!(
            DataStore::new(&path).load(),
            Err(Error::StoreRead { line: 3, .. })
        ));
    }

    #[test]
    fn test_legacy_wide_table_is_imported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(
            &path,
            "timestamp,copilot_total,copilot_merged,codex_total,codex_merged\n\
             2025\u{2011}06\u{2011}01 08:00:00,1000,400,2000,1600\n\
             2025\u{2011}06\u{2011}01 20:00:00,1010,405,2050,1650\n\
             2025-06-02 08:00:00,1100,450,2100,1700\n",
        )
        .unwrap();

        let store = DataStore::new(&path);
        let history = store.load().unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.get(day(1), "copilot").unwrap().total, 1010);
        assert_eq!(history.get(day(2), "codex").unwrap().merged, 1700);

        // The next append migrates the file to the long layout.
        store.append(day(3), "codex", 2200, 1800).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("date,agent,total,merged\n"));
        assert_eq!(store.load().unwrap().len(), 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_written_table_is_world_readable_and_keeps_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        let store = DataStore::new(&path);
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;

        store.append(day(1), "codex", 10, 5).unwrap();
        assert_eq!(mode(&path), 0o644);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o664)).unwrap();
        store.append(day(2), "codex", 12, 6).unwrap();
        assert_eq!(mode(&path), 0o664);
    }

    #[test]
    fn test_legacy_rows_predating_an_agent_may_be_short() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(
            &path,
            "timestamp,copilot_total,copilot_merged,codex_total,codex_merged\n\
             2025-05-31 08:00:00,900,300\n\
             2025-06-01 08:00:00,1000,400,,\n\
             2025-06-02 08:00:00,1100,450,2100,1700\n",
        )
        .unwrap();

        let history = DataStore::new(&path).load().unwrap();
        assert_eq!(history.len(), 4);
        let may_31 = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();
        assert_eq!(history.get(may_31, "copilot").unwrap().total, 900);
        assert!(history.get(may_31, "codex").is_none());
        assert_eq!(history.get(day(1), "copilot").unwrap().total, 1000);
        assert!(history.get(day(1), "codex").is_none());
        assert_eq!(history.get(day(2), "codex").unwrap().total, 2100);
    }

    #[test]
    fn test_legacy_row_with_extra_fields_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(
            &path,
            "timestamp,copilot_total,copilot_merged\n2025-06-01 08:00:00,1000,400,7\n",
        )
        .unwrap();
        match DataStore::new(&path).load().unwrap_err() {
            Error::StoreRead { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_header_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "when,who\n").unwrap();
        assert!(matches!(
            DataStore::new(&path).load(),
            Err(Error::StoreRead { line: 1, .. })
        ));
    }

    #[test]
    fn test_write_failure_is_store_write_error() {
        let dir = TempDir::new().unwrap();
        // A regular file where the parent directory should be.
        let blocker = dir.path().join("docs");
        fs::write(&blocker, "not a directory").unwrap();

        let store = DataStore::new(blocker.join("data.csv"));
        let mut history = History::new();
        history.upsert(AgentRecord::new(day(1), "codex", 1, 1).unwrap());
        let err = store.write(&history).unwrap_err();
        assert!(matches!(err, Error::StoreWrite { .. }), "got {err}");
    }
}

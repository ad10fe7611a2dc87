//! Log ingestion: full loads and incremental tails of one log source
//!
//! State machine per source:
//!
//! ```text
//!   Unloaded ──load──▶ Loaded ──tail──▶ Tailing ⇄ Reloading
//!      ▲                                   │
//!      └──────────── set_source ───────────┘
//! ```
//!
//! The cursor always sits right after the last complete line that was parsed.
//! An incomplete trailing line stays on disk until the producer finishes it,
//! so a line written in two chunks is parsed exactly once.

pub mod source;

pub use source::{complete_prefix_len, decode_text, read_snapshot, SourceKind};

use crate::error::IngestError;
use crate::parser::LineParser;
use crate::project::AddressBook;
use crate::store::{LogCache, Seq};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// Nothing loaded yet, or the last load failed
    Unloaded,
    /// Full load done, not polled yet
    Loaded,
    /// Polling for appended lines
    Tailing,
    /// Truncation or rotation detected, full reload in progress
    Reloading,
}

/// File bookkeeping for incremental reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Byte offset just past the last complete line consumed
    pub position: u64,
    /// File size when last read
    pub size: u64,
    pub mtime: Option<SystemTime>,
}

/// Outcome of a full load
#[derive(Debug)]
pub struct LoadReport {
    pub source: PathBuf,
    pub kind: SourceKind,
    /// Records parsed (before trimming to the cache size)
    pub records: usize,
    /// Lines dropped as malformed or out of the time range
    pub skipped: usize,
    /// Records dropped to honour the cache size
    pub trimmed: usize,
    pub duration: Duration,
    /// Set when the load failed; the cache is empty in that case
    pub error: Option<IngestError>,
}

impl LoadReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one incremental tail
#[derive(Debug)]
pub enum TailResult {
    /// Source is a snapshot and cannot be tailed
    NotTaillable,
    /// Source file does not exist (yet); try again later
    Missing,
    /// Size and mtime unchanged since the last read
    Unchanged,
    /// File shrank, or was never loaded; it was reloaded from scratch
    Reloaded(LoadReport),
    /// New complete lines were parsed and appended
    Appended {
        /// Sequence number of the first appended record
        first_seq: Seq,
        records: usize,
        skipped: usize,
        trimmed: usize,
    },
}

/// Tracks one log source and feeds a [`LogCache`] from it
#[derive(Debug)]
pub struct LogIngestion {
    path: PathBuf,
    kind: SourceKind,
    state: IngestState,
    cursor: Cursor,
}

impl LogIngestion {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            kind: SourceKind::of(&path),
            path,
            state: IngestState::Unloaded,
            cursor: Cursor::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn is_taillable(&self) -> bool {
        self.kind.is_taillable()
    }

    /// Point at a different source; the next load starts from scratch
    pub fn set_source(&mut self, path: impl Into<PathBuf>) {
        *self = Self::new(path);
    }

    /// Read the whole source into a fresh cache and swap it in
    ///
    /// On failure the cache is emptied and the error is carried in the report.
    pub fn load(&mut self, parser: &LineParser, book: &AddressBook, cache: &mut LogCache) -> LoadReport {
        let started = Instant::now();
        let max_size = cache.records.max_size();
        tracing::info!("Loading log {} ({})", self.path.display(), self.kind.as_str());

        let mut report = LoadReport {
            source: self.path.clone(),
            kind: self.kind,
            records: 0,
            skipped: 0,
            trimmed: 0,
            duration: Duration::ZERO,
            error: None,
        };

        match self.read_full() {
            Ok((bytes, cursor)) => {
                let text = decode_text(&bytes);
                let batch = parser.parse_lines(text.lines(), book);
                report.records = batch.records.len();
                report.skipped = batch.skipped;
                report.trimmed = batch.records.len().saturating_sub(max_size);

                *cache = LogCache::from_records(batch.records, max_size);
                self.cursor = cursor;
                self.state = IngestState::Loaded;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!("{}", e);
                } else {
                    tracing::error!("Failed to load {}: {}", self.path.display(), e);
                }
                cache.reset();
                self.cursor = Cursor::default();
                self.state = IngestState::Unloaded;
                report.error = Some(e);
            }
        }

        report.duration = started.elapsed();
        if report.is_ok() {
            tracing::info!(
                "Loaded {} records from {} in {:.2?} ({} skipped, {} trimmed)",
                report.records,
                self.path.display(),
                report.duration,
                report.skipped,
                report.trimmed
            );
        }
        report
    }

    /// Bytes to parse for a full load plus the cursor they leave behind
    fn read_full(&self) -> Result<(Vec<u8>, Cursor), IngestError> {
        if !self.kind.is_taillable() {
            // Snapshots are complete; a missing final newline is not a partial line
            let bytes = read_snapshot(&self.path, self.kind)?;
            return Ok((bytes, Cursor::default()));
        }

        let mut file = File::open(&self.path).map_err(|e| IngestError::io(&self.path, e))?;
        let mtime = file.metadata().ok().and_then(|m| m.modified().ok());
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| IngestError::io(&self.path, e))?;

        let complete = complete_prefix_len(&bytes);
        let cursor = Cursor {
            position: complete as u64,
            size: bytes.len() as u64,
            mtime,
        };
        bytes.truncate(complete);
        Ok((bytes, cursor))
    }

    /// Poll the source once and bring the cache up to date
    pub fn tail(
        &mut self,
        parser: &LineParser,
        book: &AddressBook,
        cache: &mut LogCache,
    ) -> Result<TailResult, IngestError> {
        if !self.kind.is_taillable() {
            return Ok(TailResult::NotTaillable);
        }

        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!("Log {} missing, waiting", self.path.display());
                return Ok(TailResult::Missing);
            }
            Err(e) => return Err(IngestError::io(&self.path, e)),
        };
        let size = metadata.len();
        let mtime = metadata.modified().ok();

        if self.state == IngestState::Unloaded {
            tracing::info!("Log {} appeared, loading", self.path.display());
            return Ok(TailResult::Reloaded(self.reload(parser, book, cache)));
        }

        if size < self.cursor.size {
            tracing::info!(
                "Log {} shrank from {} to {} bytes, reloading",
                self.path.display(),
                self.cursor.size,
                size
            );
            return Ok(TailResult::Reloaded(self.reload(parser, book, cache)));
        }

        if size == self.cursor.size && mtime == self.cursor.mtime {
            self.state = IngestState::Tailing;
            return Ok(TailResult::Unchanged);
        }

        let mut file = File::open(&self.path).map_err(|e| IngestError::io(&self.path, e))?;
        file.seek(SeekFrom::Start(self.cursor.position))
            .map_err(|e| IngestError::io(&self.path, e))?;
        let mut chunk = Vec::new();
        file.read_to_end(&mut chunk)
            .map_err(|e| IngestError::io(&self.path, e))?;

        let complete = complete_prefix_len(&chunk);
        let text = decode_text(&chunk[..complete]);
        let batch = parser.parse_lines(text.lines(), book);

        self.cursor = Cursor {
            position: self.cursor.position + complete as u64,
            size: self.cursor.position + chunk.len() as u64,
            mtime,
        };
        self.state = IngestState::Tailing;

        let first_seq = cache.records.next_seq();
        let records = batch.records.len();
        let trimmed = cache.append(batch.records);
        if records > 0 || batch.skipped > 0 {
            tracing::debug!(
                "Tailed {} new records ({} skipped, {} trimmed)",
                records,
                batch.skipped,
                trimmed
            );
        }

        Ok(TailResult::Appended {
            first_seq,
            records,
            skipped: batch.skipped,
            trimmed,
        })
    }

    fn reload(&mut self, parser: &LineParser, book: &AddressBook, cache: &mut LogCache) -> LoadReport {
        self.state = IngestState::Reloading;
        let report = self.load(parser, book, cache);
        if report.is_ok() {
            self.state = IngestState::Tailing;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TimeRange;
    use std::io::Write;

    fn line(ts: &str, dest: &str, payload: &str) -> String {
        format!("{} | 1.1.1 | dev | {} | ga | {}\n", ts, dest, payload)
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn payloads(cache: &LogCache) -> Vec<String> {
        cache.records.iter().map(|r| r.payload.clone()).collect()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        parser: LineParser,
        book: AddressBook,
        cache: LogCache,
    }

    fn fixture(initial: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knx_bus.log");
        std::fs::write(&path, initial).unwrap();
        Fixture {
            _dir: dir,
            path,
            parser: LineParser::default(),
            book: AddressBook::default(),
            cache: LogCache::new(1000),
        }
    }

    #[test]
    fn test_full_load_then_tail_equals_fresh_load() {
        let mut f = fixture(&(line("10:00:00", "1/1/1", "a") + &line("10:00:01", "1/1/2", "b")));
        let mut ingest = LogIngestion::new(&f.path);
        assert!(ingest.load(&f.parser, &f.book, &mut f.cache).is_ok());
        assert_eq!(ingest.state(), IngestState::Loaded);

        append(&f.path, &(line("10:00:02", "1/1/1", "c") + &line("10:00:03", "1/1/3", "d")));
        let result = ingest.tail(&f.parser, &f.book, &mut f.cache).unwrap();
        assert!(matches!(result, TailResult::Appended { first_seq: 2, records: 2, .. }));
        assert_eq!(ingest.state(), IngestState::Tailing);

        let mut fresh = LogCache::new(1000);
        LogIngestion::new(&f.path).load(&f.parser, &f.book, &mut fresh);
        assert_eq!(payloads(&f.cache), payloads(&fresh));
        assert_eq!(f.cache.history.latest("1/1/1"), Some("c"));
    }

    #[test]
    fn test_partial_line_is_deferred() {
        let mut f = fixture(&(line("10:00:00", "1/1/1", "a") + "10:00:01 | 1.1.1 | dev | 1/1"));
        let mut ingest = LogIngestion::new(&f.path);
        ingest.load(&f.parser, &f.book, &mut f.cache);
        assert_eq!(payloads(&f.cache), vec!["a"]);

        append(&f.path, "/2 | ga | b\n");
        ingest.tail(&f.parser, &f.book, &mut f.cache).unwrap();
        assert_eq!(payloads(&f.cache), vec!["a", "b"]);
        assert_eq!(f.cache.records.get(1).unwrap().dest_id, "1/1/2");
    }

    #[test]
    fn test_unchanged_file_is_noop() {
        let mut f = fixture(&line("10:00:00", "1/1/1", "a"));
        let mut ingest = LogIngestion::new(&f.path);
        ingest.load(&f.parser, &f.book, &mut f.cache);
        let result = ingest.tail(&f.parser, &f.book, &mut f.cache).unwrap();
        assert!(matches!(result, TailResult::Unchanged));
    }

    #[test]
    fn test_truncation_triggers_reload() {
        let mut f = fixture(&(line("10:00:00", "1/1/1", "a").repeat(5)));
        let mut ingest = LogIngestion::new(&f.path);
        ingest.load(&f.parser, &f.book, &mut f.cache);
        assert_eq!(f.cache.records.len(), 5);

        std::fs::write(&f.path, line("11:00:00", "1/1/9", "fresh")).unwrap();
        let result = ingest.tail(&f.parser, &f.book, &mut f.cache).unwrap();
        assert!(matches!(result, TailResult::Reloaded(ref r) if r.is_ok()));
        assert_eq!(payloads(&f.cache), vec!["fresh"]);
        assert_eq!(ingest.state(), IngestState::Tailing);
    }

    #[test]
    fn test_missing_source_then_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knx_bus.log");
        let parser = LineParser::default();
        let book = AddressBook::default();
        let mut cache = LogCache::new(10);
        let mut ingest = LogIngestion::new(&path);

        let report = ingest.load(&parser, &book, &mut cache);
        assert!(matches!(report.error, Some(IngestError::SourceNotFound(_))));
        assert!(cache.records.is_empty());
        assert!(matches!(
            ingest.tail(&parser, &book, &mut cache).unwrap(),
            TailResult::Missing
        ));

        std::fs::write(&path, line("10:00:00", "1/1/1", "late")).unwrap();
        let result = ingest.tail(&parser, &book, &mut cache).unwrap();
        assert!(matches!(result, TailResult::Reloaded(_)));
        assert_eq!(payloads(&cache), vec!["late"]);
    }

    #[test]
    fn test_failed_load_discards_previous_cache() {
        let mut f = fixture(&line("10:00:00", "1/1/1", "a"));
        let mut ingest = LogIngestion::new(&f.path);
        ingest.load(&f.parser, &f.book, &mut f.cache);
        assert_eq!(f.cache.records.len(), 1);

        let zip_path = f.path.with_extension("zip");
        let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
        writer
            .start_file("other.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.finish().unwrap();

        ingest.set_source(&zip_path);
        let report = ingest.load(&f.parser, &f.book, &mut f.cache);
        assert!(matches!(report.error, Some(IngestError::ArchiveMissingMember(_))));
        assert!(f.cache.records.is_empty());
        assert_eq!(ingest.state(), IngestState::Unloaded);
    }

    #[test]
    fn test_gzip_snapshot_loads_and_is_not_tailed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knx_bus.log.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        // No trailing newline: snapshots parse their last line too
        encoder
            .write_all((line("10:00:00", "1/1/1", "a") + "10:00:01 | 1.1.1 | d | 1/1/2 | g | b").as_bytes())
            .unwrap();
        encoder.finish().unwrap();

        let parser = LineParser::default();
        let book = AddressBook::default();
        let mut cache = LogCache::new(10);
        let mut ingest = LogIngestion::new(&path);
        assert!(ingest.load(&parser, &book, &mut cache).is_ok());
        assert_eq!(payloads(&cache), vec!["a", "b"]);
        assert!(matches!(
            ingest.tail(&parser, &book, &mut cache).unwrap(),
            TailResult::NotTaillable
        ));
    }

    #[test]
    fn test_rotated_xz_snapshot_loads_and_is_not_tailed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knx_bus.log.2024-05-01_00-00-00.xz");
        let mut encoder = xz2::write::XzEncoder::new(File::create(&path).unwrap(), 6);
        encoder
            .write_all((line("10:00:00", "1/1/1", "a") + &line("10:00:01", "1/1/2", "b")).as_bytes())
            .unwrap();
        encoder.finish().unwrap();

        let parser = LineParser::default();
        let book = AddressBook::default();
        let mut cache = LogCache::new(10);
        let mut ingest = LogIngestion::new(&path);
        assert_eq!(ingest.kind(), SourceKind::Xz);
        assert!(!ingest.is_taillable());

        assert!(ingest.load(&parser, &book, &mut cache).is_ok());
        assert_eq!(payloads(&cache), vec!["a", "b"]);
        assert!(matches!(
            ingest.tail(&parser, &book, &mut cache).unwrap(),
            TailResult::NotTaillable
        ));
    }

    #[test]
    fn test_unknown_extension_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knx_bus.log.2024-05-01.lz4");
        std::fs::write(&path, [0x04, 0x22, 0x4D, 0x18, 0xFF, 0x00]).unwrap();

        let parser = LineParser::default();
        let book = AddressBook::default();
        let mut cache = LogCache::from_records(vec![], 10);
        let mut ingest = LogIngestion::new(&path);
        let report = ingest.load(&parser, &book, &mut cache);

        assert!(matches!(report.error, Some(IngestError::UnsupportedSource(_))));
        assert_eq!(report.records, 0);
        assert_eq!(ingest.state(), IngestState::Unloaded);
        assert!(!ingest.is_taillable());
        assert!(matches!(
            ingest.tail(&parser, &book, &mut cache).unwrap(),
            TailResult::NotTaillable
        ));
    }

    #[test]
    fn test_latin1_log_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knx_bus.log");
        let mut bytes = b"10:00:00 | 1.1.1 | K".to_vec();
        bytes.push(0xFC);
        bytes.extend_from_slice(b"che | 1/1/1 | Licht | An\n");
        std::fs::write(&path, bytes).unwrap();

        let mut cache = LogCache::new(10);
        LogIngestion::new(&path).load(&LineParser::default(), &AddressBook::default(), &mut cache);
        assert_eq!(cache.records.get(0).unwrap().source_name, "Küche");
    }

    #[test]
    fn test_time_range_applies_to_tail() {
        let mut f = fixture(&line("2024-05-01 08:00:00", "1/1/1", "early"));
        f.parser = LineParser::new(TimeRange::from_input(Some("09:00"), None));
        let mut ingest = LogIngestion::new(&f.path);
        let report = ingest.load(&f.parser, &f.book, &mut f.cache);
        assert_eq!(report.skipped, 1);

        append(&f.path, &(line("2024-05-01 08:30:00", "1/1/1", "x") + &line("2024-05-01 09:15:00", "1/1/1", "late")));
        let result = ingest.tail(&f.parser, &f.book, &mut f.cache).unwrap();
        assert!(matches!(result, TailResult::Appended { records: 1, skipped: 1, .. }));
        assert_eq!(payloads(&f.cache), vec!["late"]);
    }
}

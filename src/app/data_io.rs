use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::SinkError;
use super::types::{CSV_HEADERS, DataFormat, JobRecord};

/// Append-mode CSV output. The file is opened on the first record, so a run
/// that writes nothing leaves nothing behind.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    columns: Vec<String>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            columns: Vec::new(),
        }
    }

    pub fn write_record(&mut self, record: &JobRecord) -> Result<(), SinkError> {
        if self.writer.is_none() {
            self.open()?;
        }

        let row = project(&self.columns, &record.fields());
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(&row)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// A non-empty file keeps its own header; a new or empty one gets
    /// `CSV_HEADERS`.
    fn open(&mut self) -> Result<(), SinkError> {
        let existing = existing_header(&self.path)?;
        let fresh = existing.is_none();
        self.columns = existing
            .unwrap_or_else(|| CSV_HEADERS.iter().map(ToString::to_string).collect());

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer.write_record(&self.columns)?;
        }

        info!(
            path = %self.path.display(),
            columns = self.columns.len(),
            appending = !fresh,
            "csv output opened"
        );
        self.writer = Some(writer);
        Ok(())
    }
}

fn existing_header(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => return Ok(None),
    }

    let mut reader = csv::Reader::from_path(path)?;
    let header = reader
        .headers()?
        .iter()
        .map(|column| column.trim().to_string())
        .collect::<Vec<_>>();
    if header.iter().all(String::is_empty) {
        return Ok(None);
    }
    Ok(Some(header))
}

/// Values in `columns` order; absent columns are empty, extra fields dropped.
fn project(columns: &[String], fields: &[(&'static str, String)]) -> Vec<String> {
    columns
        .iter()
        .map(|column| {
            fields
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
        .collect()
}

/// A single JSON array. Records from a later run are appended inside the
/// existing array; the closing bracket is written by `finalize` or on drop.
pub struct JsonSink {
    path: PathBuf,
    file: Option<File>,
    first: bool,
    closed: bool,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            first: true,
            closed: false,
        }
    }

    pub fn write_record(&mut self, record: &JobRecord) -> Result<(), SinkError> {
        if self.file.is_none() {
            self.open()?;
        }
        if let Some(file) = self.file.as_mut() {
            if !self.first {
                file.write_all(b",\n")?;
            }
            self.first = false;
            serde_json::to_writer(&mut *file, record)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<(), SinkError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        if !self.closed {
            if self.first {
                file.write_all(b"]\n")?;
            } else {
                file.write_all(b"\n]\n")?;
            }
            self.closed = true;
        }
        file.flush()?;
        Ok(())
    }

    /// Opens the array for writing, reopening an existing one by cutting its
    /// closing bracket.
    fn open(&mut self) -> Result<(), SinkError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let existing = content.trim_end();
        if existing.is_empty() {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(b"[\n")?;
            self.first = true;
        } else {
            let Some(body) = existing.strip_suffix(']').map(str::trim_end) else {
                return Err(SinkError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} does not hold a json array", self.path.display()),
                )));
            };
            file.set_len(body.len() as u64)?;
            file.seek(SeekFrom::End(0))?;
            self.first = body.ends_with('[');
        }

        info!(
            path = %self.path.display(),
            appending = !existing.is_empty(),
            "json output opened"
        );
        self.file = Some(file);
        Ok(())
    }
}

impl Drop for JsonSink {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

/// One JSON object per line, appended.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn write_record(&mut self, record: &JobRecord) -> Result<(), SinkError> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            info!(path = %self.path.display(), "json-lines output opened");
            self.file = Some(BufWriter::new(file));
        }
        if let Some(file) = self.file.as_mut() {
            serde_json::to_writer(&mut *file, record)?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

pub enum OutputSink {
    Csv(CsvSink),
    Json(JsonSink),
    JsonLines(JsonLinesSink),
}

impl OutputSink {
    pub fn new(path: impl Into<PathBuf>, format: DataFormat) -> Self {
        match format {
            DataFormat::Csv => OutputSink::Csv(CsvSink::new(path)),
            DataFormat::Json => OutputSink::Json(JsonSink::new(path)),
            DataFormat::JsonLines => OutputSink::JsonLines(JsonLinesSink::new(path)),
        }
    }

    pub fn write_record(&mut self, record: &JobRecord) -> Result<(), SinkError> {
        debug!(job_id = %record.posting.id, "writing record");
        match self {
            OutputSink::Csv(sink) => sink.write_record(record),
            OutputSink::Json(sink) => sink.write_record(record),
            OutputSink::JsonLines(sink) => sink.write_record(record),
        }
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        match self {
            OutputSink::Csv(sink) => sink.flush(),
            OutputSink::Json(sink) => sink.flush(),
            OutputSink::JsonLines(sink) => sink.flush(),
        }
    }

    pub fn finalize(&mut self) -> Result<(), SinkError> {
        match self {
            OutputSink::Csv(sink) => sink.flush(),
            OutputSink::Json(sink) => sink.finalize(),
            OutputSink::JsonLines(sink) => sink.flush(),
        }
    }
}

pub fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".jsonl") || lower.ends_with(".ndjson") {
        DataFormat::JsonLines
    } else if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else {
        fallback
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::types::{EmailResolution, JobPosting, RecoveryEmailResolution};

    pub(crate) fn record(id: &str, title: &str) -> JobRecord {
        JobRecord {
            posting: JobPosting {
                id: id.to_string(),
                url: format!("https://www.jobbank.gc.ca/jobsearch/jobposting/{id}"),
                title: title.to_string(),
                posted_date: "2024-01-05".to_string(),
                employer_name: "Northwind Bistro".to_string(),
                employer_link: String::new(),
                location: "Kingston".to_string(),
                region: "ON".to_string(),
                workplace_info: None,
                salary: "17.60".to_string(),
                hours: "40".to_string(),
                employment_type: "Full time".to_string(),
                commitments: None,
                vacancies: None,
                source: "Job Bank".to_string(),
                lmia: false,
            },
            email: EmailResolution::Found("hr@northwind.ca".to_string()),
            recovery_email: RecoveryEmailResolution::NotAttempted,
        }
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|row| row.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn header_written_once_for_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        let mut sink = OutputSink::new(&path, DataFormat::Csv);

        sink.write_record(&record("1", "Cook")).unwrap();
        sink.write_record(&record("2", "Driver")).unwrap();
        sink.flush().unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "id");
        assert_eq!(rows[0].last().map(String::as_str), Some("recovery_status"));
        assert_eq!(rows[1][2], "Cook");
        assert_eq!(rows[2][2], "Driver");
    }

    #[test]
    fn nothing_written_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        let mut sink = OutputSink::new(&path, DataFormat::Csv);

        sink.flush().unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn every_record_carries_every_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        let mut sink = CsvSink::new(&path);

        let mut second = record("2", "Driver");
        second.posting.workplace_info = Some("Remote work available".to_string());
        second.posting.vacancies = Some("3".to_string());
        sink.write_record(&record("1", "Cook")).unwrap();
        sink.write_record(&second).unwrap();
        sink.flush().unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows[0], CSV_HEADERS.to_vec());
        let workplace = rows[0].iter().position(|c| c == "workplace_info").unwrap();
        let vacancies = rows[0].iter().position(|c| c == "vacancies").unwrap();
        assert_eq!(rows[1][workplace], "");
        assert_eq!(rows[1][vacancies], "");
        assert_eq!(rows[2][workplace], "Remote work available");
        assert_eq!(rows[2][vacancies], "3");
    }

    #[test]
    fn appends_to_existing_file_using_its_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        fs::write(&path, "id,title,notes\n9,Baker,kept\n").unwrap();

        let mut sink = CsvSink::new(&path);
        sink.write_record(&record("1", "Cook")).unwrap();
        sink.flush().unwrap();

        let rows = read_rows(&path);
        assert_eq!(
            rows,
            vec![
                vec!["id", "title", "notes"],
                vec!["9", "Baker", "kept"],
                vec!["1", "Cook", ""],
            ]
        );
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.csv");
        File::create(&path).unwrap();

        let mut sink = CsvSink::new(&path);
        sink.write_record(&record("1", "Cook")).unwrap();
        sink.flush().unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "id");
    }

    #[test]
    fn json_lines_append_one_object_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let mut sink = OutputSink::new(&path, DataFormat::JsonLines);

        sink.write_record(&record("1", "Cook")).unwrap();
        sink.write_record(&record("2", "Driver")).unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], "1");
        assert_eq!(first["email"]["status"], "found");
        assert_eq!(first["email"]["address"], "hr@northwind.ca");
        assert_eq!(first["recovery_email"]["status"], "not_attempted");
        assert!(first.get("vacancies").is_none());
    }

    fn read_array(path: &Path) -> Vec<serde_json::Value> {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn json_output_is_one_array_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let mut sink = OutputSink::new(&path, DataFormat::Json);
        sink.write_record(&record("1", "Cook")).unwrap();
        sink.write_record(&record("2", "Driver")).unwrap();
        sink.finalize().unwrap();
        assert_eq!(read_array(&path).len(), 2);

        let mut sink = OutputSink::new(&path, DataFormat::Json);
        sink.write_record(&record("3", "Baker")).unwrap();
        drop(sink);

        let records = read_array(&path);
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["title"], "Baker");
    }

    #[test]
    fn json_sink_refuses_non_array_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        fs::write(&path, "{\"id\": 1}\n").unwrap();

        let mut sink = JsonSink::new(&path);

        assert!(sink.write_record(&record("1", "Cook")).is_err());
        drop(sink);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"id\": 1}\n");
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(detect_data_format("out.JSON", DataFormat::Csv), DataFormat::Json);
        assert_eq!(detect_data_format("out.jsonl", DataFormat::Csv), DataFormat::JsonLines);
        assert_eq!(detect_data_format("out.ndjson", DataFormat::Csv), DataFormat::JsonLines);
        assert_eq!(detect_data_format("out.csv", DataFormat::Json), DataFormat::Csv);
        assert_eq!(detect_data_format("out.txt", DataFormat::Json), DataFormat::Json);
    }
}

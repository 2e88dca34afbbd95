//! Append-only CSV export, one file per record kind.
//!
//! A file's header is fixed by the first rows ever written to it. Later rows are
//! laid out positionally against that header: fields the header lacks are dropped
//! (with a warning) and header columns a record lacks are left empty. A record
//! type that gains a field after its file was created therefore loses that column
//! in the export until the file is rotated.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::models::health_data::{AnonymizedPayload, RecordCounts, RecordKind};

type Row = Map<String, Value>;

/// Lines end in CRLF, as RFC 4180 writers do, so files shared with other CSV
/// producers keep one line ending.
const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, thiserror::Error)]
pub enum FlatFileError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {0} record: {1}")]
    Serialize(RecordKind, #[source] serde_json::Error),

    #[error("{0} record did not serialize to a field map")]
    NotAnObject(RecordKind),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FlatFileError + '_ {
    move |source| FlatFileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug)]
pub struct FlatFileStore {
    dir: PathBuf,
    headers: Mutex<HashMap<RecordKind, Vec<String>>>,
}

impl FlatFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            headers: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Appends every non-empty record kind of the payload to its file.
    ///
    /// Not safe against concurrent callers writing the same kind: the header
    /// check and the append are separate steps. Callers serialize access.
    #[tracing::instrument(
        name = "Append payload to flat files",
        skip(self, payload),
        fields(anonymous_user_id = %payload.anonymous_user_id())
    )]
    pub async fn append_payload(&self, payload: &AnonymizedPayload) -> Result<RecordCounts, FlatFileError> {
        let batches = payload_rows(payload)?;
        let mut counts = RecordCounts::default();
        if batches.is_empty() {
            return Ok(counts);
        }

        fs::create_dir_all(&self.dir).await.map_err(io_error(&self.dir))?;

        for (kind, rows) in batches {
            self.append_rows(kind, &rows).await?;
            counts.add(kind, rows.len() as u64);
        }
        tracing::info!("Flat files appended in {}: {}", self.dir.display(), counts);

        Ok(counts)
    }

    async fn append_rows(&self, kind: RecordKind, rows: &[Row]) -> Result<(), FlatFileError> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let path = self.path_for(kind);
        let mut out = String::new();

        let header = if file_has_content(&path).await? {
            match self.cached_header(kind) {
                Some(header) => header,
                None => read_header(&path).await?,
            }
        } else {
            let header: Vec<String> = first.keys().cloned().collect();
            push_line(&mut out, header.iter().map(|name| Cow::Borrowed(name.as_str())));
            header
        };

        for row in rows {
            let dropped: Vec<&str> = row
                .keys()
                .filter(|name| !header.contains(*name))
                .map(String::as_str)
                .collect();
            if !dropped.is_empty() {
                tracing::warn!(
                    "{} has no column for {:?}; values dropped from the export",
                    path.display(),
                    dropped
                );
            }
            push_line(&mut out, header.iter().map(|name| render_cell(row.get(name))));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_error(&path))?;
        file.write_all(out.as_bytes()).await.map_err(io_error(&path))?;
        file.flush().await.map_err(io_error(&path))?;

        self.headers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(kind, header);
        Ok(())
    }

    fn cached_header(&self, kind: RecordKind) -> Option<Vec<String>> {
        self.headers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .cloned()
    }
}

async fn file_has_content(path: &Path) -> Result<bool, FlatFileError> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len() > 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path)(e)),
    }
}

async fn read_header(path: &Path) -> Result<Vec<String>, FlatFileError> {
    let file = File::open(path).await.map_err(io_error(path))?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .await
        .map_err(io_error(path))?;
    Ok(parse_line(line.trim_end_matches(['\r', '\n'])))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StepsRow<'a> {
    user_id: &'a str,
    request_timestamp: i64,
    date: &'a str,
    hour: i64,
    count: i64,
}

/// Flattens the payload into field maps per record kind, skipping empty kinds.
fn payload_rows(payload: &AnonymizedPayload) -> Result<Vec<(RecordKind, Vec<Row>)>, FlatFileError> {
    let user_id = payload.anonymous_user_id();
    let ts = payload.timestamp;
    let steps: Vec<StepsRow<'_>> = payload
        .steps
        .hourly_counts
        .iter()
        .map(|(hour, count)| StepsRow {
            user_id,
            request_timestamp: ts,
            date: &payload.steps.date,
            hour: *hour,
            count: *count,
        })
        .collect();

    let batches = vec![
        (RecordKind::HeartRate, tag_rows(RecordKind::HeartRate, &payload.heart_rate_records, user_id, ts)?),
        (RecordKind::Accelerometer, tag_rows(RecordKind::Accelerometer, &payload.accelerometer_readings, user_id, ts)?),
        (RecordKind::Gyroscope, tag_rows(RecordKind::Gyroscope, &payload.gyroscope_readings, user_id, ts)?),
        (RecordKind::Steps, tag_rows(RecordKind::Steps, &steps, user_id, ts)?),
        (
            RecordKind::SleepSessions,
            tag_rows(
                RecordKind::SleepSessions,
                payload.sleep_sessions.iter().map(|s| &s.session_summary),
                user_id,
                ts,
            )?,
        ),
        (
            RecordKind::SleepStages,
            tag_rows(
                RecordKind::SleepStages,
                payload.sleep_sessions.iter().flat_map(|s| s.stages.iter()),
                user_id,
                ts,
            )?,
        ),
        (RecordKind::Calories, tag_rows(RecordKind::Calories, &payload.calorie_records, user_id, ts)?),
        (
            RecordKind::OxygenSaturation,
            tag_rows(RecordKind::OxygenSaturation, &payload.oxygen_saturation_records, user_id, ts)?,
        ),
        (RecordKind::RawSpO2, tag_rows(RecordKind::RawSpO2, &payload.raw_spo2_readings, user_id, ts)?),
        (RecordKind::RawPpg, tag_rows(RecordKind::RawPpg, &payload.raw_ppg_readings, user_id, ts)?),
        (
            RecordKind::RingAccelerometer,
            tag_rows(RecordKind::RingAccelerometer, &payload.ring_accelerometer_readings, user_id, ts)?,
        ),
    ];

    Ok(batches.into_iter().filter(|(_, rows)| !rows.is_empty()).collect())
}

/// Serializes each record and merges in `userId` and `requestTimestamp`.
/// Keys the record already has keep their position.
fn tag_rows<'a, T, I>(kind: RecordKind, records: I, user_id: &str, ts: i64) -> Result<Vec<Row>, FlatFileError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    records
        .into_iter()
        .map(|record| match serde_json::to_value(record) {
            Ok(Value::Object(mut fields)) => {
                fields.insert("userId".to_string(), Value::from(user_id));
                fields.insert("requestTimestamp".to_string(), Value::from(ts));
                Ok(fields)
            }
            Ok(_) => Err(FlatFileError::NotAnObject(kind)),
            Err(e) => Err(FlatFileError::Serialize(kind, e)),
        })
        .collect()
}

fn render_cell(value: Option<&Value>) -> Cow<'_, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => escape(s),
        Some(Value::Bool(b)) => Cow::Owned(b.to_string()),
        Some(Value::Number(n)) => Cow::Owned(n.to_string()),
        Some(other) => Cow::Owned(escape(&other.to_string()).into_owned()),
    }
}

fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = Cow<'a, str>>) {
    let cells: Vec<Cow<'a, str>> = cells.collect();
    out.push_str(&cells.join(","));
    out.push_str(LINE_TERMINATOR);
}

/// Splits one CSV line, honouring double-quoted cells.
fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

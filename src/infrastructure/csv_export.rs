// CSV export of the rolling window
use crate::domain::sensor::{Reading, RecordShape, SensorRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no data to export")]
    Empty,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid timestamp {0:?}")]
    Timestamp(String),

    #[error("invalid value {0:?}")]
    Value(String),

    #[error("unrecognised header {0:?}")]
    Shape(String),

    #[error("records mix single- and multi-channel readings")]
    MixedShapes,
}

/// Render records as CSV, one row per record, timestamps in ISO-8601 UTC.
pub fn render_csv(records: &[SensorRecord]) -> Result<String, ExportError> {
    let first = records.first().ok_or(ExportError::Empty)?;
    let shape = first.reading.shape();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["timestamp"];
    header.extend_from_slice(shape.channels());
    writer.write_record(&header)?;

    for record in records {
        if record.reading.shape() != shape {
            return Err(ExportError::MixedShapes);
        }
        let mut row = vec![format_timestamp(record.timestamp)?];
        row.extend(record.reading.values().iter().map(f64::to_string));
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    // every field written above is ASCII
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read back a CSV produced by `render_csv`.
pub fn parse_csv(text: &str) -> Result<Vec<SensorRecord>, ExportError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let shape = [RecordShape::SingleChannel, RecordShape::MultiChannel]
        .into_iter()
        .find(|shape| {
            header.first().map(String::as_str) == Some("timestamp")
                && header[1..].iter().map(String::as_str).eq(shape.channels().iter().copied())
        })
        .ok_or_else(|| ExportError::Shape(header.join(",")))?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let timestamp = parse_timestamp(&row[0])?;
        let values = row
            .iter()
            .skip(1)
            .map(|field| {
                field
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ExportError::Value(field.to_string()))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let reading = match shape {
            RecordShape::SingleChannel => Reading::Scalar { value: values[0] },
            RecordShape::MultiChannel => Reading::Environmental {
                co2: values[0],
                temperature: values[1],
                humidity: values[2],
            },
        };
        records.push(SensorRecord::new(timestamp, reading));
    }

    Ok(records)
}

/// Download name for an export taken at `now_ms`.
pub fn export_filename(now_ms: i64) -> String {
    format!("sensor-data-{}.csv", now_ms)
}

fn format_timestamp(millis: i64) -> Result<String, ExportError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| ExportError::Timestamp(millis.to_string()))
}

fn parse_timestamp(text: &str) -> Result<i64, ExportError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.timestamp_millis())
        .map_err(|_| ExportError::Timestamp(text.to_string()))
}

// Record parser - converts a framed line into a typed reading
use super::sensor::{Reading, RecordShape};
use thiserror::Error;

/// Why a line was dropped. Rejections are expected noise and never surfaced.
#[derive(Debug, Error, PartialEq)]
pub enum RejectReason {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("not a finite number: {0:?}")]
    NotANumber(String),
}

#[derive(Debug, Clone, Copy)]
pub struct RecordParser {
    shape: RecordShape,
}

impl RecordParser {
    pub fn new(shape: RecordShape) -> Self {
        Self { shape }
    }

    /// `Ok(None)` for a blank line, which is ignored rather than rejected.
    pub fn parse(&self, line: &str) -> Result<Option<Reading>, RejectReason> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let reading = match self.shape {
            RecordShape::SingleChannel => Reading::Scalar {
                value: parse_field(trimmed)?,
            },
            RecordShape::MultiChannel => {
                let parts: Vec<&str> = trimmed.split(',').collect();
                let expected = self.shape.channels().len();
                if parts.len() != expected {
                    return Err(RejectReason::FieldCount {
                        expected,
                        found: parts.len(),
                    });
                }
                Reading::Environmental {
                    co2: parse_field(parts[0])?,
                    temperature: parse_field(parts[1])?,
                    humidity: parse_field(parts[2])?,
                }
            }
        };

        Ok(Some(reading))
    }
}

fn parse_field(field: &str) -> Result<f64, RejectReason> {
    let field = field.trim();
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RejectReason::NotANumber(field.to_string()))
}

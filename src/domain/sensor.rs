// Sensor domain models
use serde::{Deserialize, Serialize};

/// Shape of the records a device emits on each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RecordShape {
    /// `<float>\n`
    #[serde(rename = "single")]
    SingleChannel,
    /// `<co2>,<temperature>,<humidity>\n`
    #[serde(rename = "multi")]
    MultiChannel,
}

impl RecordShape {
    /// Channel names in wire order.
    pub fn channels(&self) -> &'static [&'static str] {
        match self {
            RecordShape::SingleChannel => &["value"],
            RecordShape::MultiChannel => &["co2", "temperature", "humidity"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Scalar {
        value: f64,
    },
    Environmental {
        co2: f64,
        temperature: f64,
        humidity: f64,
    },
}

impl Reading {
    /// The channel anomaly rules are evaluated against.
    pub fn primary(&self) -> f64 {
        match self {
            Reading::Scalar { value } => *value,
            Reading::Environmental { co2, .. } => *co2,
        }
    }

    pub fn shape(&self) -> RecordShape {
        match self {
            Reading::Scalar { .. } => RecordShape::SingleChannel,
            Reading::Environmental { .. } => RecordShape::MultiChannel,
        }
    }

    /// Values in the same order as `RecordShape::channels`.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Reading::Scalar { value } => vec![*value],
            Reading::Environmental {
                co2,
                temperature,
                humidity,
            } => vec![*co2, *temperature, *humidity],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorRecord {
    /// Epoch millis assigned at ingestion.
    pub timestamp: i64,
    #[serde(flatten)]
    pub reading: Reading,
}

impl SensorRecord {
    pub fn new(timestamp: i64, reading: Reading) -> Self {
        Self { timestamp, reading }
    }

    pub fn primary(&self) -> f64 {
        self.reading.primary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_flat_records() {
        let single = SensorRecord::new(5, Reading::Scalar { value: 1.5 });
        assert_eq!(
            serde_json::to_value(single).unwrap(),
            serde_json::json!({ "timestamp": 5, "value": 1.5 })
        );

        let multi = SensorRecord::new(
            7,
            Reading::Environmental {
                co2: 410.0,
                temperature: 21.5,
                humidity: 40.0,
            },
        );
        assert_eq!(
            serde_json::to_value(multi).unwrap(),
            serde_json::json!({ "timestamp": 7, "co2": 410.0, "temperature": 21.5, "humidity": 40.0 })
        );
    }

    #[test]
    fn test_primary_channel() {
        let multi = Reading::Environmental {
            co2: 650.0,
            temperature: 20.0,
            humidity: 35.0,
        };
        assert_eq!(multi.primary(), 650.0);
        assert_eq!(multi.shape().channels()[0], "co2");
        assert_eq!(Reading::Scalar { value: -3.0 }.primary(), -3.0);
    }
}

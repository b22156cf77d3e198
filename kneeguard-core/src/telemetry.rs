//! Telemetry document decoding and the per-sensor reading record
//!
//! The feeder pushes one UTF-8 JSON document per sample:
//!
//! ```text
//! { "sensors": [ { "id": "sensor1", "quaternion": {"w":..,"x":..,"y":..,"z":..},
//!                  "euler": {"roll":..,"pitch":..,"yaw":..} },      <- optional
//!                { "id": "sensor2", ... } ],
//!   "time": 1712345678.9 }                                          <- optional, ignored
//! ```
//!
//! Only the first two entries are consumed. Entry order decides the slot
//! ([`SensorSlot::First`] is "sensor1"), not identity: the mapping from sensor to
//! thigh/shin is settled by calibration.

use serde::{Deserialize, Serialize};

use crate::constants::network::MAX_SENSORS_PER_MESSAGE;
use crate::errors::{KneeGuardError, KneeGuardResult};
use crate::orientation::Orientation;

/// Cache slot a reading lands in, by position within its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorSlot {
    /// First entry of a message ("sensor1")
    First,
    /// Second entry of a message ("sensor2")
    Second,
}

impl SensorSlot {
    pub const ALL: [SensorSlot; 2] = [SensorSlot::First, SensorSlot::Second];

    pub const fn index(self) -> usize {
        match self {
            SensorSlot::First => 0,
            SensorSlot::Second => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SensorSlot::First => "sensor1",
            SensorSlot::Second => "sensor2",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(SensorSlot::First),
            1 => Some(SensorSlot::Second),
            _ => None,
        }
    }
}

/// Optional Euler block some feeders attach; carried through but unused
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// One sensor entry as it appears on the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecodedSensor {
    pub id: String,
    pub quaternion: Orientation,
    #[serde(default)]
    pub euler: Option<EulerAngles>,
}

#[derive(Debug, Deserialize)]
struct TelemetryDocument {
    #[serde(default)]
    sensors: Vec<DecodedSensor>,
}

/// Latest known state of one sensor slot
///
/// Immutable once built; the cache swaps whole records, so a reader always sees
/// the id, orientation and sequence number of the same message.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Identity tag reported by the sensor
    pub sensor_id: String,
    /// Sensor-fused orientation
    pub orientation: Orientation,
    /// Logical receive timestamp: sequence number of the carrying message
    pub received_at: u64,
}

impl SensorReading {
    pub fn new(sensor_id: impl Into<String>, orientation: Orientation, received_at: u64) -> Self {
        Self { sensor_id: sensor_id.into(), orientation, received_at }
    }
}

/// Decode one telemetry message body
///
/// Returns at most [`MAX_SENSORS_PER_MESSAGE`] entries, in slot order. Invalid
/// UTF-8, malformed JSON and unusable quaternions all reject the whole message.
pub fn decode_telemetry(payload: &[u8]) -> KneeGuardResult<Vec<DecodedSensor>> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| KneeGuardError::Decode(format!("telemetry is not UTF-8: {e}")))?;

    let document: TelemetryDocument = serde_json::from_str(text)?;

    let mut sensors = document.sensors;
    sensors.truncate(MAX_SENSORS_PER_MESSAGE);
    Ok(sensors)
}

/// Pair decoded entries with their slots and stamp them with `sequence`
pub fn into_readings(
    sensors: Vec<DecodedSensor>,
    sequence: u64,
) -> impl Iterator<Item = (SensorSlot, SensorReading)> {
    sensors.into_iter().enumerate().filter_map(move |(index, sensor)| {
        SensorSlot::from_index(index)
            .map(|slot| (slot, SensorReading::new(sensor.id, sensor.quaternion, sequence)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_two_sensors() {
        let payload = br#"{"sensors":[
            {"id":"sensor1","quaternion":{"w":1,"x":0,"y":0,"z":0}},
            {"id":"sensor2","quaternion":{"w":0,"x":1,"y":0,"z":0},"euler":{"roll":180,"pitch":0,"yaw":0}}
        ],"time":12.5}"#;

        let sensors = decode_telemetry(payload).unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].id, "sensor1");
        assert!(sensors[0].euler.is_none());
        assert_eq!(sensors[1].euler.map(|e| e.roll), Some(180.0));
    }

    #[test]
    fn only_first_two_entries_are_consumed() {
        let payload = br#"{"sensors":[
            {"id":"a","quaternion":{"w":1,"x":0,"y":0,"z":0}},
            {"id":"b","quaternion":{"w":1,"x":0,"y":0,"z":0}},
            {"id":"c","quaternion":{"w":1,"x":0,"y":0,"z":0}}
        ]}"#;

        let readings: Vec<_> = into_readings(decode_telemetry(payload).unwrap(), 7).collect();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].0, SensorSlot::First);
        assert_eq!(readings[1].1.sensor_id, "b");
        assert_eq!(readings[1].1.received_at, 7);
    }

    #[test]
    fn empty_sensor_list_is_not_an_error() {
        assert!(decode_telemetry(br#"{"sensors":[]}"#).unwrap().is_empty());
        assert!(decode_telemetry(br#"{}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_payloads_are_decode_errors() {
        assert!(matches!(decode_telemetry(b"not json"), Err(KneeGuardError::Decode(_))));
        assert!(matches!(decode_telemetry(&[0xff, 0xfe]), Err(KneeGuardError::Decode(_))));
        let zero = br#"{"sensors":[{"id":"x","quaternion":{"w":0,"x":0,"y":0,"z":0}}]}"#;
        assert!(decode_telemetry(zero).is_err());
    }

    #[test]
    fn slot_names() {
        assert_eq!(SensorSlot::First.name(), "sensor1");
        assert_eq!(SensorSlot::from_index(1), Some(SensorSlot::Second));
        assert_eq!(SensorSlot::from_index(2), None);
    }
}

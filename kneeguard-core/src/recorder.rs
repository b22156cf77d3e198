//! Per-tick session rows and CSV export
//!
//! One row is recorded per tick while calibrated. Export writes the rows as CSV under
//! a timestamped name, `sensor_data_YYYYMMDD_HHMMSS.csv`. The header keeps a blank
//! column between the two sensors, which downstream spreadsheets rely on:
//!
//! ```text
//! Timestamp,Sensor1_Quat_W,Sensor1_Quat_X,Sensor1_Quat_Y,Sensor1_Quat_Z,,Sensor2_Quat_W,…,SPARC,LDLJ,KneeAngle
//! ```
//!
//! Sensor1 is the thigh and Sensor2 the shin, whatever slots they arrived in. Metrics
//! cells stay empty until the first analysis result of the session.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::errors::KneeGuardResult;
use crate::orientation::Orientation;
use crate::smoothness::SmoothnessMetrics;

const CSV_HEADER: &str = "Timestamp,Sensor1_Quat_W,Sensor1_Quat_X,Sensor1_Quat_Y,Sensor1_Quat_Z,,\
Sensor2_Quat_W,Sensor2_Quat_X,Sensor2_Quat_Y,Sensor2_Quat_Z,SPARC,LDLJ,KneeAngle";

/// One tick's worth of session data
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionRow {
    /// Session time (seconds)
    pub timestamp: f64,
    pub thigh: Orientation,
    pub shin: Orientation,
    pub metrics: Option<SmoothnessMetrics>,
    pub knee_angle: Option<f64>,
}

/// Accumulates rows for one session
#[derive(Debug, Clone, Default)]
pub struct SessionRecorder {
    rows: Vec<SessionRow>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, row: SessionRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[SessionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Write header and rows as CSV
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> KneeGuardResult<()> {
        writeln!(writer, "{CSV_HEADER}")?;
        for row in &self.rows {
            let [tw, tx, ty, tz] = row.thigh.components();
            let [sw, sx, sy, sz] = row.shin.components();
            let (sparc, ldlj) = row
                .metrics
                .map_or((String::new(), String::new()), |m| (m.sparc.to_string(), m.ldlj.to_string()));
            let angle = row.knee_angle.map(|a| a.to_string()).unwrap_or_default();

            writeln!(
                writer,
                "{},{tw},{tx},{ty},{tz},,{sw},{sx},{sy},{sz},{sparc},{ldlj},{angle}",
                row.timestamp
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write `sensor_data_<local time>.csv` into `dir`, creating it if needed
    pub fn export_csv(&self, dir: impl AsRef<Path>) -> KneeGuardResult<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("sensor_data_{stamp}.csv"));

        let mut writer = BufWriter::new(fs::File::create(&path)?);
        self.write_csv(&mut writer)?;

        info!("Session exported to {} ({} rows)", path.display(), self.rows.len());
        Ok(path)
    }
}

//! Shared fixtures for the connector suites
//!
//! - Telemetry documents in the feeder's wire shape
//! - A one-connection analysis stub that replies with a canned document
//! - Polling helper with a deadline

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use kneeguard_core::framing::{read_json, write_json, Framing};
use kneeguard_core::{AnalysisConfig, Orientation};

/// Pose of the leg with the shin flexed `flexion_deg` away from straight about x
pub fn leg_pose(flexion_deg: f64) -> (Orientation, Orientation) {
    let thigh = Orientation::identity();
    let shin = Orientation::from_axis_angle([1.0, 0.0, 0.0], 180.0 - flexion_deg).unwrap();
    (thigh, shin)
}

/// Feeder message carrying the thigh in the first entry and the shin in the second
pub fn telemetry_message(thigh: Orientation, shin: Orientation) -> Vec<u8> {
    let entry = |id: &str, o: Orientation| {
        let [w, x, y, z] = o.components();
        json!({ "id": id, "quaternion": { "w": w, "x": x, "y": y, "z": z } })
    };
    serde_json::to_vec(&json!({ "sensors": [entry("sensor1", thigh), entry("sensor2", shin)], "time": 0.0 }))
        .unwrap()
}

/// What the stub does with each request
#[derive(Debug, Clone)]
pub enum StubReply {
    Document(Value),
    RawBytes(Vec<u8>),
    /// Wait, then send the document
    Delayed(Duration, Value),
    /// Wait without answering
    Hang(Duration),
}

/// Accept one connection and answer `replies` in order, then close
///
/// The join handle yields the request documents that were received.
pub fn stub_service(framing: Framing, replies: Vec<StubReply>) -> (SocketAddr, JoinHandle<Vec<Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        for reply in replies {
            let Ok(request) = read_json::<Value, _>(&mut conn, framing, 1 << 20) else {
                break;
            };
            received.push(request);
            match reply {
                StubReply::Document(doc) => write_json(&mut conn, framing, &doc).unwrap(),
                StubReply::RawBytes(bytes) => {
                    use std::io::Write;
                    conn.write_all(&bytes).unwrap();
                }
                StubReply::Delayed(delay, doc) => {
                    thread::sleep(delay);
                    write_json(&mut conn, framing, &doc).unwrap();
                }
                StubReply::Hang(for_how_long) => thread::sleep(for_how_long),
            }
        }
        received
    });
    (addr, handle)
}

pub fn analysis_config(addr: SocketAddr, framing: Framing) -> AnalysisConfig {
    AnalysisConfig::default().with_addr(addr.to_string()).with_framing(framing).with_io_timeout_ms(1000)
}

pub fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../mtemp-parser/tests/data")
        .join(name)
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("failed to write test input");
    path
}

fn metadata_block(serial: &str, channels: usize) -> String {
    format!(
        "Device Name: cDAQ1Mod1\nSerial Number: {serial}\nProduct Type: NI 9213\nStart Time: 2024-08-14 10:00:00\nSample Rate: 1 Hz\nChannel Count: {channels}\n"
    )
}

fn clock(second: usize) -> String {
    format!(
        "2024-08-14 {:02}:{:02}:{:02}",
        10 + second / 3600,
        (second / 60) % 60,
        second % 60
    )
}

/// Cart 1 temperature log with one row per second starting at 10:00:00 plus
/// `first_second`. `AIk` reads `20 + k`.
pub fn cart1_temperature(first_second: usize, rows: usize) -> String {
    let mut out = metadata_block("21AD4B7", 8);
    out.push_str("Sample,Date/Time");
    for k in 0..8 {
        write!(out, ",AI{k} (°C)").unwrap();
    }
    out.push('\n');
    for i in 0..rows {
        write!(out, "{i},{}", clock(first_second + i)).unwrap();
        for k in 0..8 {
            write!(out, ",{}", 20 + k).unwrap();
        }
        out.push('\n');
    }
    out
}

/// Cart 1 IR log (serial 2082107) with `AI0 (V)` = `volts(i)`.
pub fn cart1_infrared(first_second: usize, rows: usize, volts: impl Fn(usize) -> f64) -> String {
    let mut out = metadata_block("2082107", 1);
    out.push_str("Sample,Date/Time,AI0 (V)\n");
    for i in 0..rows {
        writeln!(out, "{i},{},{:.6}", clock(first_second + i), volts(i)).unwrap();
    }
    out
}

/// GPS track at a fixed position, one fix per second from 10:00:00 UTC.
pub fn gps_track(first_second: usize, rows: usize) -> String {
    let mut out = String::from("Timestamp,Latitude,Longitude\n");
    for i in 0..rows {
        let stamp = clock(first_second + i).replace(' ', "T");
        writeln!(out, "{stamp}Z,40.1106,-88.2434").unwrap();
    }
    out
}

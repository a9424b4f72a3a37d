//! Touchstone writer round-trip, idempotence, and atomicity tests.

use std::collections::BTreeMap;
use std::fs;

use rust_vna::error::VnaError;
use rust_vna::measurement::{SParam, Trace};
use rust_vna::touchstone::{self, FreqUnit, TouchstoneExporter};

fn sample_data() -> (Vec<f64>, BTreeMap<SParam, Trace>) {
    let points = 201;
    let frequencies: Vec<f64> = (0..points)
        .map(|i| 10e6 + (1500e6 - 10e6) * i as f64 / (points - 1) as f64)
        .collect();

    let mut traces = BTreeMap::new();
    for (param, offset) in [(SParam::S11, -10.0), (SParam::S21, -3.0)] {
        let magnitude_db: Vec<f64> = (0..points).map(|i| offset - 0.01 * i as f64).collect();
        let phase_deg: Vec<f64> = (0..points).map(|i| -180.0 + 1.5 * i as f64).collect();
        traces.insert(
            param,
            Trace {
                magnitude_db,
                phase_deg,
            },
        );
    }
    (frequencies, traces)
}

#[test]
fn export_then_import_round_trips_within_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let (frequencies, traces) = sample_data();

    let path = TouchstoneExporter::new()
        .export(&frequencies, &traces, &dir.path().join("sweep"))
        .unwrap();
    assert_eq!(path.extension().unwrap(), "s2p");

    let (read_freqs, read_traces) = touchstone::import(&path).unwrap();

    assert_eq!(read_freqs.len(), frequencies.len());
    for (a, b) in frequencies.iter().zip(&read_freqs) {
        // Frequencies are written in MHz with 6 decimals: 1 Hz resolution.
        assert!((a - b).abs() <= 1.0, "{a} vs {b}");
    }

    assert_eq!(
        read_traces.keys().copied().collect::<Vec<_>>(),
        vec![SParam::S11, SParam::S21]
    );
    for (param, trace) in &traces {
        let read = &read_traces[param];
        for (a, b) in trace.magnitude_db.iter().zip(&read.magnitude_db) {
            assert!((a - b).abs() < 1e-5);
        }
        for (a, b) in trace.phase_deg.iter().zip(&read.phase_deg) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}

#[test]
fn repeated_export_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let (frequencies, traces) = sample_data();
    let exporter = TouchstoneExporter::new();
    let destination = dir.path().join("sweep");

    let path = exporter.export(&frequencies, &traces, &destination).unwrap();
    let first = fs::read(&path).unwrap();

    let path = exporter.export(&frequencies, &traces, &destination).unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn header_declares_the_format_contract() {
    let dir = tempfile::tempdir().unwrap();
    let (frequencies, traces) = sample_data();

    let path = TouchstoneExporter::new()
        .export(&frequencies, &traces, &dir.path().join("sweep"))
        .unwrap();
    let contents = fs::read_to_string(&path).unwrap();

    assert!(contents.contains("# MHz S DB R 50"));
    assert!(contents.contains("! Points: 201"));
    assert!(contents.contains("! Parameters: S11 S21"));

    // Every data row carries the same column count: freq + 2 per parameter.
    for line in contents
        .lines()
        .filter(|l| !l.starts_with('!') && !l.starts_with('#') && !l.is_empty())
    {
        assert_eq!(line.split_whitespace().count(), 5, "row: {line}");
    }
}

#[test]
fn rows_preserve_ascending_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let (frequencies, traces) = sample_data();

    let path = TouchstoneExporter::new()
        .export(&frequencies, &traces, &dir.path().join("sweep"))
        .unwrap();
    let (read_freqs, _) = touchstone::import(&path).unwrap();

    assert!(read_freqs.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn alternate_frequency_units_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (frequencies, traces) = sample_data();

    let path = TouchstoneExporter::new()
        .with_freq_unit(FreqUnit::GHz)
        .export(&frequencies, &traces, &dir.path().join("sweep_ghz"))
        .unwrap();
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("# GHz S DB R 50"));

    let (read_freqs, _) = touchstone::import(&path).unwrap();
    for (a, b) in frequencies.iter().zip(&read_freqs) {
        // GHz with 6 decimals: 1 kHz resolution.
        assert!((a - b).abs() <= 1e3, "{a} vs {b}");
    }
}

#[test]
fn length_mismatch_fails_before_any_bytes_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let (frequencies, mut traces) = sample_data();
    if let Some(trace) = traces.get_mut(&SParam::S21) {
        trace.magnitude_db.pop();
    }

    let err = TouchstoneExporter::new()
        .export(&frequencies, &traces, &dir.path().join("broken"))
        .unwrap_err();
    assert!(matches!(err, VnaError::Export(_)));

    // Atomic-or-nothing: neither the final file nor a temp file exists.
    let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
}

#[test]
fn empty_parameter_set_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (frequencies, _) = sample_data();

    let err = TouchstoneExporter::new()
        .export(&frequencies, &BTreeMap::new(), &dir.path().join("empty"))
        .unwrap_err();
    assert!(matches!(err, VnaError::Export(_)));
}

#[test]
fn unwritable_destination_is_an_export_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();

    let (frequencies, traces) = sample_data();
    let err = TouchstoneExporter::new()
        .export(&frequencies, &traces, &blocker.join("sweep"))
        .unwrap_err();
    assert!(matches!(err, VnaError::Export(_)));
}

#[test]
fn import_skips_comments_and_malformed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand_written.s2p");
    fs::write(
        &path,
        "! hand-written fixture\n\
         # MHz S DB R 50\n\
         10.000000  -1.000000  5.000000\n\
         not a data row\n\
         20.000000  -2.000000  6.000000\n",
    )
    .unwrap();

    let (freqs, traces) = touchstone::import(&path).unwrap();
    assert_eq!(freqs, vec![10e6, 20e6]);
    let s11 = &traces[&SParam::S11];
    assert_eq!(s11.magnitude_db, vec![-1.0, -2.0]);
    assert_eq!(s11.phase_deg, vec![5.0, 6.0]);
    assert_eq!(traces.len(), 1);
}

#[test]
fn import_of_an_empty_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.s2p");
    fs::write(&path, "! nothing here\n").unwrap();

    assert!(matches!(
        touchstone::import(&path),
        Err(VnaError::Export(_))
    ));
}

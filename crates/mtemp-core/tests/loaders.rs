mod common;

use chrono::NaiveTime;
use mtemp_core::carts::{CartId, RegistryError};
use mtemp_core::loaders::{
    DuplicatePolicy, GpsLoader, InstrumentLoader, IrRhLoader, LoadError, LoaderOptions,
    TemperatureLoader,
};
use tempfile::tempdir;

use common::{cart1_infrared, fixture_path, write_file};

const CART1_COLUMNS: [&str; 8] = [
    "0.6 ft (°C)",
    "1.8 ft (°C)",
    "3.6 ft (°C)",
    "3.6 ft b (°C)",
    "5.4 ft (°C)",
    "5.4 ft b (°C)",
    "7.2 ft (°C)",
    "9.0 ft (°C)",
];

#[test]
fn cart1_temperature_file_is_labelled_and_converted() {
    let options = LoaderOptions::default();
    let dataset = TemperatureLoader::new(&options)
        .load(&fixture_path("Cart1_Temperature.csv"), None)
        .expect("temperature load failed");

    let mut expected = vec!["time".to_string()];
    expected.extend(CART1_COLUMNS.iter().map(|c| c.to_string()));
    expected.extend(CART1_COLUMNS.iter().map(|c| c.replace("°C", "°F")));
    assert_eq!(dataset.column_names(), expected);
    assert_eq!(dataset.height(), 10);
    assert_eq!(dataset.name, "temperature");
    assert_eq!(dataset.sources.len(), 1);
    assert_eq!(dataset.sources[0].parser, "DAQ_LOG");
    assert_eq!(dataset.sources[0].blake3.len(), 64);

    // AI2 is the 0.6 ft probe on cart 1.
    let celsius = dataset.f64_values("0.6 ft (°C)").unwrap();
    let fahrenheit = dataset.f64_values("0.6 ft (°F)").unwrap();
    assert_eq!(celsius[0], Some(22.0));
    assert!((fahrenheit[0].unwrap() - 71.6).abs() < 1e-9);

    let (start, end) = dataset.time_range().unwrap();
    assert_eq!(start, NaiveTime::from_hms_opt(13, 45, 0).unwrap());
    assert_eq!(end, NaiveTime::from_hms_opt(13, 45, 9).unwrap());
}

#[test]
fn prelabelled_export_skips_wiring_and_aliases_lowest_probe() {
    let options = LoaderOptions::default();
    let dataset = TemperatureLoader::new(&options)
        .load(&fixture_path("Export_Temperature.csv"), None)
        .expect("export load failed");

    assert_eq!(dataset.sources[0].parser, "DAQ_EXPORT");
    assert_eq!(
        &dataset.column_names()[..7],
        &[
            "time",
            "0.6 ft (°C)",
            "1.8 ft (°C)",
            "3.6 ft (°C)",
            "5.4 ft (°C)",
            "7.2 ft (°C)",
            "9.0 ft (°C)"
        ]
    );
    assert_eq!(dataset.df.width(), 13);
    assert_eq!(dataset.f64_values("0.6 ft (°C)").unwrap()[0], Some(15.0));
}

#[test]
fn infrared_file_gets_fahrenheit_and_smoothing() {
    let options = LoaderOptions::default();
    let dataset = IrRhLoader::new(&options)
        .load(&fixture_path("Cart2_IrRh.csv"), None)
        .expect("IR/RH load failed");

    let names = dataset.column_names();
    for column in [
        "time",
        "IR Raw (V)",
        "Raw RH 0.0 ft (V)",
        "Raw RH 7.2 ft (V)",
        "Raw RH 1.8 ft (V)",
        "Raw RH 9.0 ft (V)",
        "IR (°F)",
        "Smoothed IR (°F)",
    ] {
        assert!(names.contains(&column.to_string()), "missing {column}");
    }
    assert_eq!(dataset.height(), 12);
    assert_eq!(dataset.f64_values("IR (°F)").unwrap()[0], Some(32.0));
    // Twelve samples never fill a 100-sample window.
    assert!(dataset
        .f64_values("Smoothed IR (°F)")
        .unwrap()
        .iter()
        .all(Option::is_none));
}

#[test]
fn smoothed_value_at_row_100_is_mean_of_first_100() {
    let dir = tempdir().unwrap();
    let volts = |i: usize| 0.62 + 0.001 * i as f64;
    let path = write_file(dir.path(), "ir.csv", &cart1_infrared(0, 150, volts));

    let options = LoaderOptions::default();
    let dataset = IrRhLoader::new(&options).load(&path, None).unwrap();
    let infrared = dataset.f64_values("IR (°F)").unwrap();
    let smoothed = dataset.f64_values("Smoothed IR (°F)").unwrap();

    assert_eq!(smoothed[98], None);
    let mean: f64 = infrared[..100].iter().map(|v| v.unwrap()).sum::<f64>() / 100.0;
    assert!((smoothed[99].unwrap() - mean).abs() < 1e-9);
    // Source column is untouched.
    assert!((infrared[0].unwrap() - 32.0).abs() < 1e-9);
}

#[test]
fn smoothing_window_counts_rows_after_collapsing_seconds() {
    let dir = tempdir().unwrap();
    // Two samples per second for 150 seconds.
    let mut content = String::from("Date/Time,AI0 (V)\n");
    for i in 0..300 {
        let second = i / 2;
        let millis = if i % 2 == 0 { "000" } else { "500" };
        content.push_str(&format!(
            "2024-08-14 10:{:02}:{:02}.{millis},{:.4}\n",
            second / 60,
            second % 60,
            0.62 + 0.0005 * i as f64
        ));
    }
    let path = write_file(dir.path(), "ir.csv", &content);

    let options = LoaderOptions::default();
    let dataset = IrRhLoader::new(&options)
        .load(&path, Some(CartId::One))
        .unwrap();
    assert_eq!(dataset.height(), 150);

    let infrared = dataset.f64_values("IR (°F)").unwrap();
    let smoothed = dataset.f64_values("Smoothed IR (°F)").unwrap();
    assert!(smoothed[..99].iter().all(Option::is_none));
    let mean: f64 = infrared[..100].iter().map(|v| v.unwrap()).sum::<f64>() / 100.0;
    assert!((smoothed[99].unwrap() - mean).abs() < 1e-9);
}

#[test]
fn real_lowest_probe_is_not_replaced_by_zero_foot_alias() {
    let dir = tempdir().unwrap();
    let content = "Date/Time,0.0 ft (°C),0.6 ft (°C),1.8 ft (°C),3.6 ft (°C),5.4 ft (°C),7.2 ft (°C),9.0 ft (°C)\n\
        2024-08-14 10:00:00,99,15,16,17,18,19,20\n";
    let path = write_file(dir.path(), "temp.csv", content);
    let options = LoaderOptions::default();

    let dataset = TemperatureLoader::new(&options).load(&path, None).unwrap();
    assert_eq!(dataset.f64_values("0.6 ft (°C)").unwrap(), vec![Some(15.0)]);
    assert!(!dataset.has_column("0.0 ft (°C)"));
}

#[test]
fn mixed_headers_are_labelled_per_column() {
    let dir = tempdir().unwrap();
    // AI2 is the 0.6 ft probe on cart 1; this file names it directly.
    let content = common::cart1_temperature(0, 3).replace("AI2 (°C)", "0.0 ft (°C)");
    let path = write_file(dir.path(), "temp.csv", &content);
    let options = LoaderOptions::default();

    let dataset = TemperatureLoader::new(&options).load(&path, None).unwrap();
    assert_eq!(dataset.height(), 3);
    assert_eq!(dataset.f64_values("0.6 ft (°C)").unwrap()[0], Some(22.0));
    assert!(dataset.has_column("9.0 ft (°C)"));
}

#[test]
fn explicit_cart_wins_over_missing_serial() {
    let dir = tempdir().unwrap();
    let content = "Date/Time,AI0 (V)\n2024-08-14 10:00:00,0.700\n2024-08-14 10:00:01,0.710\n";
    let path = write_file(dir.path(), "ir.csv", content);
    let options = LoaderOptions::default();
    let loader = IrRhLoader::new(&options);

    let err = loader.load(&path, None).unwrap_err();
    assert!(matches!(err, LoadError::MissingSerialNumber { .. }));

    let dataset = loader.load(&path, Some(CartId::One)).unwrap();
    assert_eq!(dataset.height(), 2);
    assert!(dataset.has_column("IR (°F)"));
}

#[test]
fn unknown_serial_is_an_error() {
    let dir = tempdir().unwrap();
    let content = common::cart1_temperature(0, 3).replace("21AD4B7", "FFFFFFF");
    let path = write_file(dir.path(), "temp.csv", &content);
    let options = LoaderOptions::default();

    let err = TemperatureLoader::new(&options).load(&path, None).unwrap_err();
    match err {
        LoadError::Registry { source, .. } => {
            assert_eq!(source, RegistryError::UnknownSerial("FFFFFFF".to_string()))
        }
        other => panic!("expected registry error, got {other:?}"),
    }
}

#[test]
fn configured_serial_is_recognised() {
    let dir = tempdir().unwrap();
    let content = common::cart1_temperature(0, 3).replace("21AD4B7", "FFFFFFF");
    let path = write_file(dir.path(), "temp.csv", &content);
    let options = LoaderOptions {
        registry: mtemp_core::carts::CartRegistry::new().with_serial("FFFFFFF", CartId::One),
        ..LoaderOptions::default()
    };

    let dataset = TemperatureLoader::new(&options).load(&path, None).unwrap();
    assert_eq!(dataset.height(), 3);
}

#[test]
fn missing_height_column_is_schema_mismatch() {
    let dir = tempdir().unwrap();
    // AI5 (the 9.0 ft probe on cart 1) was not recorded.
    let content = "Device Name: cDAQ1Mod1\nSerial Number: 21AD4B7\nProduct Type: NI 9213\n\
        Start Time: 2024-08-14 10:00:00\nSample Rate: 1 Hz\nChannel Count: 5\n\
        Date/Time,AI0 (°C),AI1 (°C),AI2 (°C),AI3 (°C),AI4 (°C)\n\
        2024-08-14 10:00:00,1,2,3,4,5\n";
    let path = write_file(dir.path(), "temp.csv", content);
    let options = LoaderOptions::default();

    let err = TemperatureLoader::new(&options).load(&path, None).unwrap_err();
    match err {
        LoadError::SchemaMismatch { expected, .. } => assert_eq!(expected, "9.0 ft (°C)"),
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn infrared_without_raw_channel_is_schema_mismatch() {
    let dir = tempdir().unwrap();
    let content = "Date/Time,Raw RH 1.8 ft (V)\n2024-08-14 10:00:00,2.0\n";
    let path = write_file(dir.path(), "irrh.csv", content);
    let options = LoaderOptions::default();

    let err = IrRhLoader::new(&options).load(&path, None).unwrap_err();
    assert!(matches!(err, LoadError::SchemaMismatch { .. }));
}

#[test]
fn malformed_timestamp_reports_line() {
    let options = LoaderOptions::default();
    let err = TemperatureLoader::new(&options)
        .load(&fixture_path("Bad_Timestamp.csv"), None)
        .unwrap_err();
    match err {
        LoadError::MalformedTimestamp { line, value, .. } => {
            assert_eq!(line, 9);
            assert_eq!(value, "not a time");
        }
        other => panic!("expected malformed timestamp, got {other:?}"),
    }
}

#[test]
fn missing_file_is_reported() {
    let options = LoaderOptions::default();
    let err = GpsLoader::new(&options)
        .load(&fixture_path("does_not_exist.csv"), None)
        .unwrap_err();
    assert!(matches!(err, LoadError::FileNotFound { .. }));
}

#[test]
fn duplicate_seconds_follow_policy() {
    let dir = tempdir().unwrap();
    let content = "Date/Time,AI0 (V)\n\
        2024-08-14 10:00:00.250,0.700\n\
        2024-08-14 10:00:00.750,0.800\n\
        2024-08-14 10:00:01.250,0.900\n";
    let path = write_file(dir.path(), "ir.csv", content);

    let keep_last = LoaderOptions::default();
    let dataset = IrRhLoader::new(&keep_last)
        .load(&path, Some(CartId::One))
        .unwrap();
    assert_eq!(dataset.height(), 2);
    assert_eq!(dataset.time_seconds().unwrap(), vec![Some(36_000), Some(36_001)]);
    assert_eq!(
        dataset.f64_values("IR Raw (V)").unwrap(),
        vec![Some(0.8), Some(0.9)]
    );

    let reject = LoaderOptions {
        duplicates: DuplicatePolicy::Reject,
        ..LoaderOptions::default()
    };
    let err = IrRhLoader::new(&reject)
        .load(&path, Some(CartId::One))
        .unwrap_err();
    match err {
        LoadError::DuplicateTimestamp { time, .. } => {
            assert_eq!(time, NaiveTime::from_hms_opt(10, 0, 0).unwrap())
        }
        other => panic!("expected duplicate timestamp, got {other:?}"),
    }
}

#[test]
fn time_running_backwards_is_rejected() {
    let dir = tempdir().unwrap();
    let content = "Date/Time,AI0 (V)\n2024-08-14 10:00:05,0.7\n2024-08-14 10:00:04,0.7\n";
    let path = write_file(dir.path(), "ir.csv", content);
    let options = LoaderOptions::default();

    let err = IrRhLoader::new(&options)
        .load(&path, Some(CartId::One))
        .unwrap_err();
    assert!(matches!(err, LoadError::NonMonotonicTime { row: 1, .. }));
}

#[test]
fn gps_track_is_indexed_by_local_time() {
    let utc = LoaderOptions::default();
    let dataset = GpsLoader::new(&utc)
        .load(&fixture_path("Track_Gps.csv"), None)
        .unwrap();
    assert_eq!(dataset.column_names(), vec!["time", "Latitude", "Longitude"]);
    assert_eq!(dataset.height(), 10);
    assert_eq!(
        dataset.time_range().unwrap().0,
        NaiveTime::from_hms_opt(13, 45, 0).unwrap()
    );

    let chicago = LoaderOptions::default()
        .with_gps_timezone("America/Chicago")
        .unwrap();
    let dataset = GpsLoader::new(&chicago)
        .load(&fixture_path("Track_Gps.csv"), None)
        .unwrap();
    assert_eq!(
        dataset.time_range().unwrap().0,
        NaiveTime::from_hms_opt(8, 45, 0).unwrap()
    );
}

#[test]
fn unknown_timezone_is_rejected() {
    let err = LoaderOptions::default()
        .with_gps_timezone("Atlantis/Central")
        .unwrap_err();
    assert!(matches!(err, LoadError::InvalidTimezone(_)));
}

#[test]
fn out_of_range_coordinates_are_rejected() {
    let dir = tempdir().unwrap();
    let content = "Timestamp,Latitude,Longitude\n2024-08-14T10:00:00Z,40.0,-88.0\n2024-08-14T10:00:01Z,95.0,-88.0\n";
    let path = write_file(dir.path(), "gps.csv", content);
    let options = LoaderOptions::default();

    let err = GpsLoader::new(&options).load(&path, None).unwrap_err();
    match err {
        LoadError::InvalidCoordinate { row, latitude, .. } => {
            assert_eq!(row, 3);
            assert_eq!(latitude, 95.0);
        }
        other => panic!("expected invalid coordinate, got {other:?}"),
    }
}

//! Integration tests for qls-core.
//!
//! These tests exercise the full workflow:
//! labeled CSV → training → artifacts on disk → load → predict → recalibrate,
//! plus the upload → score path for `.npz`/`.npy` payloads.

use std::sync::Arc;

use qls_core::archive::write_npz;
use qls_core::npy::encode_npy;
use qls_core::train::{METADATA_FILE, MODEL_FILE};
use qls_core::{
    CalibrationMetadata, CalibrationSource, Complex, Dataset, ParameterRecord, PointEstimate,
    PredictionWarning, Predictor, QlsModel, Scorer, SessionStore, TrainOptions, ensure_trained,
    load_samples, train,
};

fn labeled_csv(n: usize) -> String {
    let topologies = ["line", "ring", "smallworld"];
    let mut out = String::from("topology,J,gamma,sigma,QLS\n");
    for i in 0..n {
        let topo = topologies[i % 3];
        let j = 0.05 + 0.35 * ((i * 7) % n) as f64 / n as f64;
        let gamma = 0.005 + 0.045 * ((i * 11) % n) as f64 / n as f64;
        let sigma = 0.08 * ((i * 13) % n) as f64 / n as f64;
        let qls = 0.3 + 0.8 * j - 3.0 * gamma - sigma + 0.05 * (i % 3) as f64;
        out.push_str(&format!("{topo},{j},{gamma},{sigma},{qls}\n"));
    }
    out
}

fn quick_options() -> TrainOptions {
    let mut opts = TrainOptions::default();
    opts.boosting.n_estimators = 80;
    opts
}

struct Constant(f64);

impl QlsModel for Constant {
    fn predict(&self, record: &ParameterRecord) -> qls_core::Result<PointEstimate> {
        record.validate()?;
        Ok(PointEstimate {
            value: self.0,
            warning: None,
        })
    }
}

#[test]
fn train_save_load_predict_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("train.csv");
    std::fs::write(&csv_path, labeled_csv(60)).unwrap();

    let dataset = Dataset::from_path(&csv_path).unwrap();
    let artifacts = train(&dataset, &quick_options()).unwrap();
    let (model_path, metadata_path) = artifacts.save(&dir.path().join("model")).unwrap();
    assert!(model_path.ends_with(MODEL_FILE));
    assert!(metadata_path.ends_with(METADATA_FILE));

    let predictor = Predictor::load(&model_path, &metadata_path).unwrap();
    assert_eq!(predictor.fingerprint().map(str::len), Some(64));
    assert_eq!(predictor.metadata(), &artifacts.metadata);

    let record = ParameterRecord::new("ring", 0.2, 0.02, 0.04);
    let cal = predictor.default_calibration();
    let out = predictor.predict(&record, &cal).unwrap();
    assert!(out.interval.lo <= out.prediction && out.prediction <= out.interval.hi);
    assert_eq!(out.half_width, artifacts.metadata.conformal_width_90);
    assert_eq!(
        out.prediction,
        artifacts.pipeline.predict(&record).unwrap().value
    );
}

#[test]
fn unseen_topology_predicts_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("train.csv");
    std::fs::write(&csv_path, labeled_csv(30)).unwrap();
    let model_path = dir.path().join(MODEL_FILE);
    let metadata_path = dir.path().join(METADATA_FILE);

    assert!(ensure_trained(&model_path, &metadata_path, Some(&csv_path), &quick_options()).unwrap());
    // second call finds the files and does nothing
    assert!(!ensure_trained(&model_path, &metadata_path, Some(&csv_path), &quick_options()).unwrap());

    let predictor = Predictor::load(&model_path, &metadata_path).unwrap();
    let out = predictor
        .predict(
            &ParameterRecord::new("lattice3d", 0.2, 0.02, 0.04),
            &predictor.default_calibration(),
        )
        .unwrap();
    assert!(out.prediction.is_finite());
    assert!(
        out.warnings
            .iter()
            .any(|w| matches!(w, PredictionWarning::UnknownCategory(u) if u.value == "lattice3d"))
    );
}

#[test]
fn missing_artifacts_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join(MODEL_FILE);
    let metadata_path = dir.path().join(METADATA_FILE);
    assert!(!ensure_trained(&model_path, &metadata_path, None, &quick_options()).unwrap());
    let err = Predictor::load(&model_path, &metadata_path).unwrap_err();
    assert_eq!(err.kind(), qls_core::ErrorKind::Io);

    std::fs::write(&model_path, b"not json").unwrap();
    let err = Predictor::load(&model_path, &metadata_path).unwrap_err();
    assert_eq!(err.kind(), qls_core::ErrorKind::Configuration);
}

#[test]
fn metadata_with_missing_keys_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(METADATA_FILE);
    std::fs::write(&path, r#"{"conformal_width_90": 0.07}"#).unwrap();
    let meta = CalibrationMetadata::load(&path).unwrap();
    assert_eq!(meta.conformal_width_90, 0.07);
    assert_eq!(meta.topologies_seen, vec!["line", "ring", "smallworld"]);
}

#[test]
fn ring_example_interval() {
    let predictor = Predictor::new(Arc::new(Constant(0.62)), CalibrationMetadata::default());
    let out = predictor
        .predict(
            &ParameterRecord::new("ring", 0.2, 0.02, 0.04),
            &predictor.default_calibration(),
        )
        .unwrap();
    assert!((out.interval.lo - 0.47).abs() < 1e-12);
    assert!((out.interval.hi - 0.77).abs() < 1e-12);
}

#[test]
fn session_recalibration_is_isolated_and_non_destructive() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("train.csv");
    std::fs::write(&csv_path, labeled_csv(45)).unwrap();
    let model_path = dir.path().join(MODEL_FILE);
    let metadata_path = dir.path().join(METADATA_FILE);
    ensure_trained(&model_path, &metadata_path, Some(&csv_path), &quick_options()).unwrap();
    let metadata_before = std::fs::read(&metadata_path).unwrap();
    let model_before = std::fs::read(&model_path).unwrap();

    let predictor = Predictor::load(&model_path, &metadata_path).unwrap();
    let store = SessionStore::new(predictor.metadata().conformal_width_90);
    let a = store.create();
    let b = store.create();

    let reference = Dataset::from_reader(labeled_csv(21).as_bytes()).unwrap();
    let recal = predictor.recalibrate(&reference).unwrap();
    assert_eq!(recal.source, CalibrationSource::Residual);
    assert_eq!(recal.n_rows, 21);
    store.set_calibration(&a.id, recal.into()).unwrap();

    let record = ParameterRecord::new("line", 0.1, 0.01, 0.0);
    let out_a = predictor
        .predict(&record, &store.calibration(&a.id).unwrap())
        .unwrap();
    let out_b = predictor
        .predict(&record, &store.calibration(&b.id).unwrap())
        .unwrap();
    assert_eq!(out_a.half_width, recal.half_width);
    assert_eq!(out_b.half_width, predictor.metadata().conformal_width_90);
    assert_eq!(out_a.prediction, out_b.prediction);

    assert_eq!(std::fs::read(&metadata_path).unwrap(), metadata_before);
    assert_eq!(std::fs::read(&model_path).unwrap(), model_before);
}

#[test]
fn recalibration_on_own_predictions_gives_zero_width() {
    let predictor = Predictor::new(Arc::new(Constant(0.5)), CalibrationMetadata::default());
    let reference = Dataset::from_reader(
        "topology,J,gamma,sigma,QLS\nring,0.2,0.02,0.04,0.5\nline,0.1,0.01,0.0,0.5\n".as_bytes(),
    )
    .unwrap();
    let recal = predictor.recalibrate(&reference).unwrap();
    assert_eq!(recal.half_width, 0.0);
}

#[test]
fn recalibration_without_truth_reports_degraded_mode() {
    let predictor = Predictor::new(Arc::new(Constant(0.5)), CalibrationMetadata::default());
    let reference =
        Dataset::from_reader("topology,J,gamma,sigma\nring,0.2,0.02,0.04\n".as_bytes()).unwrap();
    let recal = predictor.recalibrate(&reference).unwrap();
    assert_eq!(recal.source, CalibrationSource::MedianDeviation);
    assert_eq!(recal.half_width, 0.0);
}

#[test]
fn training_is_deterministic_for_fixed_seed() {
    let dataset = Dataset::from_reader(labeled_csv(30).as_bytes()).unwrap();
    let a = train(&dataset, &quick_options()).unwrap();
    let b = train(&dataset, &quick_options()).unwrap();
    assert_eq!(
        serde_json::to_string(&a.pipeline).unwrap(),
        serde_json::to_string(&b.pipeline).unwrap()
    );
    assert_eq!(a.metadata.conformal_width_90, b.metadata.conformal_width_90);
}

#[test]
fn npz_upload_scores_like_the_matrices() {
    // 2x2 diag(1, 0): tr(ρρ†) = 1; 2x2 diag(0.5, 0.5): 0.5
    let pure = [1.0, 0.0, 0.0, 0.0].map(Complex::real);
    let mixed = [0.5, 0.0, 0.0, 0.5].map(Complex::real);
    let zip = write_npz(
        &[
            ("rho_0", encode_npy(&[2, 2], &pure, true)),
            ("rho_1", encode_npy(&[2, 2], &mixed, false)),
        ],
        true,
    )
    .unwrap();
    let samples = load_samples(&zip).unwrap();
    assert_eq!(samples.len(), 2);

    let report = Scorer::default().score(&samples, true).unwrap();
    assert_eq!(report.debug_raw, Some(0.75));
    assert!((report.qls - 0.25).abs() < 1e-12);
    assert!((report.interval.lo - 0.10).abs() < 1e-12);
    assert!((report.interval.hi - 0.40).abs() < 1e-12);
    assert_eq!(report.components.num_samples, 2);
}

#[test]
fn npz_with_mixed_dimensions_scores_mean_purity() {
    // 2x2 pure state (purity 1) and 3x3 maximally mixed (purity 1/3)
    let pure = [1.0, 0.0, 0.0, 0.0].map(Complex::real);
    let third = 1.0 / 3.0;
    let mixed: Vec<Complex> = (0..9)
        .map(|i| Complex::real(if i % 4 == 0 { third } else { 0.0 }))
        .collect();
    let zip = write_npz(
        &[
            ("rho_0", encode_npy(&[2, 2], &pure, false)),
            ("rho_1", encode_npy(&[3, 3], &mixed, true)),
        ],
        true,
    )
    .unwrap();
    let report = Scorer::default()
        .score(&load_samples(&zip).unwrap(), true)
        .unwrap();
    let raw = report.debug_raw.unwrap();
    assert!((raw - (1.0 + third) / 2.0).abs() < 1e-12);
    assert_eq!(report.components.min_dimension, 2);
    assert_eq!(report.components.max_dimension, 3);
}

#[test]
fn hostile_npy_shape_is_data_format_error() {
    let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (4294967296, 4294967296, 2), }\n";
    let mut npy = b"\x93NUMPY\x01\x00".to_vec();
    npy.extend_from_slice(&(header.len() as u16).to_le_bytes());
    npy.extend_from_slice(header.as_bytes());
    let zip = write_npz(&[("rho", npy)], false).unwrap();
    let err = load_samples(&zip).unwrap_err();
    assert_eq!(err.kind(), qls_core::ErrorKind::DataFormat);
}

#[test]
fn stacked_npy_upload_expands_to_samples() {
    let mut data = Vec::new();
    for _ in 0..3 {
        data.extend([0.5, 0.0, 0.0, 0.5].map(Complex::real));
    }
    let npy = encode_npy(&[3, 2, 2], &data, false);
    let samples = load_samples(&npy).unwrap();
    assert_eq!(samples.len(), 3);
    let report = Scorer::default().score(&samples, false).unwrap();
    assert!(report.debug_raw.is_none());
    assert!(report.interval.lo >= 0.0);
}

#[test]
fn garbage_upload_is_data_format_error() {
    let err = load_samples(b"definitely not numpy").unwrap_err();
    assert_eq!(err.kind(), qls_core::ErrorKind::DataFormat);
}

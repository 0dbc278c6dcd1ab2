mod common;
use approx::assert_abs_diff_eq;
use common::write_session;
use vistuning::behavior::{behavior_modulated_tuning, BehaviorOptions, BehaviorState};
use vistuning::{
    compute_tuning_response_per_cells, curve_osi, with_session, ImagingQuantity, ProtocolSelector,
    SelectivityPolicy, Session, StoredTraces, TuningConfig, TuningError,
};

fn load(quantity: ImagingQuantity) -> (tempfile::TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_session(dir.path(), "2023_02_15-13-30-47.safetensors", "WT-mouse1");
    let session =
        with_session(&path, |h| Session::load(h, quantity, &StoredTraces::default())).unwrap();
    (dir, session)
}

#[test]
fn responsive_cells_peak_at_zero_shift() {
    let (_dir, session) = load(ImagingQuantity::DFoF);
    let tuning = compute_tuning_response_per_cells(&session, &TuningConfig::default()).unwrap();

    assert_eq!(tuning.n_rois, 4);
    assert_eq!(tuning.cells.iter().map(|c| c.roi).collect::<Vec<_>>(), vec![0, 1, 3]);
    assert_abs_diff_eq!(tuning.frac_resp, 0.75);
    assert_eq!(
        tuning.shifted_angle,
        vec![-22.5, 0.0, 22.5, 45.0, 67.5, 90.0, 112.5, 135.0]
    );
    assert_eq!(
        tuning.cells.iter().map(|c| c.preferred_angle).collect::<Vec<_>>(),
        vec![90.0, 45.0, 90.0]
    );

    for cell in &tuning.cells {
        let v = &cell.curve.values;
        let peak = v.iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(v[1], peak, "roi {} does not peak at 0", cell.roi);
        assert!(cell.curve.measured.iter().all(|&m| m));
        // ±22.5° around the peak are equally far from it
        assert_abs_diff_eq!(v[0], v[2], epsilon = 1e-5);
    }
    // mean of the 1.0, 1.1, 1.2 repeats
    assert_abs_diff_eq!(tuning.cells[0].curve.values[1], 1.1, epsilon = 1e-5);
    assert_abs_diff_eq!(tuning.cells[2].curve.values[1], 2.2, epsilon = 1e-5);
}

#[test]
fn half_contrast_halves_the_peak() {
    let (_dir, session) = load(ImagingQuantity::DFoF);
    let cfg = TuningConfig { contrast: 0.5, ..TuningConfig::default() };
    let tuning = compute_tuning_response_per_cells(&session, &cfg).unwrap();
    assert_eq!(tuning.cells.len(), 3);
    assert_abs_diff_eq!(tuning.cells[0].curve.values[1], 0.55, epsilon = 1e-5);
}

#[test]
fn raw_fluorescence_keeps_the_alignment() {
    let (_dir, session) = load(ImagingQuantity::RawFluo);
    let cfg = TuningConfig { quantity: ImagingQuantity::RawFluo, ..TuningConfig::default() };
    let tuning = compute_tuning_response_per_cells(&session, &cfg).unwrap();
    assert_eq!(
        tuning.cells.iter().map(|c| c.preferred_angle).collect::<Vec<_>>(),
        vec![90.0, 45.0, 90.0]
    );
    assert_abs_diff_eq!(tuning.cells[0].curve.values[1], 1.1, epsilon = 1e-3);
}

#[test]
fn aligned_curves_are_selective() {
    let (_dir, session) = load(ImagingQuantity::DFoF);
    let tuning = compute_tuning_response_per_cells(&session, &TuningConfig::default()).unwrap();
    let grid = tuning.grid();
    for cell in &tuning.cells {
        for policy in [SelectivityPolicy::PrefMinusOrth, SelectivityPolicy::Normalized] {
            let si = curve_osi(&cell.curve.values, &grid, policy).unwrap();
            assert!(si > 0.99 && si <= 1.0, "roi {}: {policy:?} = {si}", cell.roi);
        }
    }
}

#[test]
fn max_rois_caps_the_analysis() {
    let (_dir, session) = load(ImagingQuantity::DFoF);
    let cfg = TuningConfig { max_rois: Some(2), ..TuningConfig::default() };
    let tuning = compute_tuning_response_per_cells(&session, &cfg).unwrap();
    assert_eq!(tuning.n_rois, 2);
    assert_abs_diff_eq!(tuning.frac_resp, 1.0);
}

#[test]
fn missing_protocol_is_reported() {
    let (_dir, session) = load(ImagingQuantity::DFoF);
    let cfg = TuningConfig {
        protocol: ProtocolSelector::Named(vec![
            "ff-gratings-8orientation-2contrasts-10repeats".into(),
        ]),
        ..TuningConfig::default()
    };
    let err = compute_tuning_response_per_cells(&session, &cfg).unwrap_err();
    assert!(matches!(err.downcast_ref::<TuningError>(), Some(TuningError::UnknownProtocol(_))));

    let cfg = TuningConfig { protocol: ProtocolSelector::Index(1), ..TuningConfig::default() };
    assert_eq!(compute_tuning_response_per_cells(&session, &cfg).unwrap().cells.len(), 3);
}

#[test]
fn behaviour_states_share_the_preferred_angle() {
    let (_dir, session) = load(ImagingQuantity::DFoF);
    let opts = BehaviorOptions { pupil_threshold: Some(2.5), ..BehaviorOptions::default() };
    let tuning = behavior_modulated_tuning(&session, &TuningConfig::default(), &opts).unwrap();

    assert_eq!(
        tuning.n_episodes,
        vec![
            (BehaviorState::Running, 16),
            (BehaviorState::Still, 32),
            (BehaviorState::Constricted, 32),
            (BehaviorState::Dilated, 16),
        ]
    );
    assert_eq!(tuning.cells.len(), 3);

    let cell = &tuning.cells[0];
    assert_eq!(cell.preferred_angle, 90.0);
    // running: repeat 0 only; dilated: repeat 2 only
    let peak = |s| cell.curve(s).unwrap().values[1];
    assert_abs_diff_eq!(peak(BehaviorState::Running), 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(peak(BehaviorState::Still), 1.15, epsilon = 1e-5);
    assert_abs_diff_eq!(peak(BehaviorState::Dilated), 1.2, epsilon = 1e-5);
    assert_abs_diff_eq!(peak(BehaviorState::Constricted), 1.05, epsilon = 1e-5);

    let mean = tuning.mean_curve(None);
    assert_abs_diff_eq!(mean[1], (1.1 + 1.1 + 2.2) / 3.0, epsilon = 1e-5);
}

use ottcal::{
    calibration::calibrate_par_rm,
    devices::{simulated::SimulatedInterferometer, Positioner, Tower},
    AlignmentRecord, Calibration, OpticalAlignment, OttConfig, Target,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn calibrate_and_align() -> anyhow::Result<()> {
    init();
    let root = tempfile::tempdir()?;
    let config = OttConfig::default().base_path(root.path());
    let mut tower = Tower::simulated(
        &config,
        SimulatedInterferometer::builder().pupil(96, 44.),
    )?;

    let calibration = calibrate_par_rm(&config, &mut tower, vec![0.5, 1., 1., 2., 2.], 2, 1)?;
    assert_eq!(calibration.who(), &Target::ParRm);
    assert_eq!(calibration.interaction_matrix().shape(), (5, 5));
    assert_eq!(tower.parabola.position()?, vec![0.; 6]);
    assert_eq!(tower.reference_mirror.position()?, vec![0.; 6]);

    let loaded = Calibration::load(&config, calibration.tracking_number())?;
    assert_eq!(loaded, calibration);

    tower.parabola.set_position(&[0., 0., 0.5, -0.3, 0.2, 0.])?;
    tower
        .reference_mirror
        .set_position(&[0., 0., 0., 0.4, -0.1, 0.])?;

    let alignment = OpticalAlignment::new(&config, calibration.tracking_number())?;
    let (par, rm) = alignment.preview(&mut tower, 1, None, None)?;
    for (c, x) in par.iter().zip([0., 0., -0.5, 0.3, -0.2, 0.]) {
        assert!((c - x).abs() < 1e-6, "{:?}", par);
    }
    for (c, x) in rm.iter().zip([0., 0., 0., -0.4, 0.1, 0.]) {
        assert!((c - x).abs() < 1e-6, "{:?}", rm);
    }

    let record = alignment.align(&mut tower, 2, None, None, true)?;
    assert_eq!(record.parabola_position, vec![0., 0., 0.5, -0.3, 0.2, 0.]);
    for x in tower
        .parabola
        .position()?
        .into_iter()
        .chain(tower.reference_mirror.position()?)
    {
        assert!(x.abs() < 1e-6);
    }

    let tt = record.tracking_number();
    assert_eq!(AlignmentRecord::load(&config, &tt)?, record);
    let log = std::fs::read_to_string(config.alignment_root().join(AlignmentRecord::LOG))?;
    assert_eq!(log.lines().count(), 1);
    assert_eq!(log.split_whitespace().count(), 1 + 5);

    let (par, rm) = alignment.preview(&mut tower, 1, None, None)?;
    assert!(par.iter().chain(&rm).all(|c| c.abs() < 1e-6));
    Ok(())
}

#[test]
fn partial_dof_alignment() -> anyhow::Result<()> {
    init();
    let root = tempfile::tempdir()?;
    let config = OttConfig::default().base_path(root.path());
    let mut tower = Tower::simulated(
        &config,
        SimulatedInterferometer::builder().pupil(64, 30.),
    )?;
    let calibration = calibrate_par_rm(&config, &mut tower, vec![1.; 5], 1, 1)?;

    tower.parabola.set_position(&[0., 0., 0.2, 0., 0., 0.])?;
    let alignment = OpticalAlignment::from_calibration(&config, calibration);
    // focus only, corrected with the parabola piston only
    let (par, rm) = alignment.preview(&mut tower, 1, Some(vec![2]), Some(vec![0]))?;
    assert!((par[2] + 0.2).abs() < 1e-6);
    assert!(par.iter().enumerate().all(|(i, c)| i == 2 || *c == 0.));
    assert!(rm.iter().all(|c| *c == 0.));
    Ok(())
}

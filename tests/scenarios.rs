use nalgebra::{DMatrix, DVector};
use ottcal::{
    calibration::CalibrationBuilder,
    command_history::{CommandHistory, Order},
    devices::{
        simulated::{SimulatedInterferometer, SimulatedPositioner},
        Actuate, Interferometer, Positioner,
    },
    iff::{frame_name, is_zonal},
    tracking::TtFolder,
    utilities::circular_pupil,
    Alignment, Calibration, IffAcquisition, OpticalAlignment, OttConfig, OttError, Reconstructor,
    Target, TrackingNumber,
};

#[test]
fn tidy_command_history() -> anyhow::Result<()> {
    let history = CommandHistory::builder(vec![0, 1, 2], vec![1.; 3], DMatrix::identity(3, 3))
        .n_push_pull(2)
        .template(vec![1, -1])
        .build()?;
    let m = history.matrix();
    assert_eq!(m.ncols(), 12);
    let e0 = DVector::from_vec(vec![1., 0., 0.]);
    assert_eq!(m.column(0), e0);
    assert_eq!(m.column(1), -&e0);
    assert_eq!(m.column(6), e0);
    assert_eq!(history.indexing_list(), &vec![vec![0, 1, 2]; 2]);
    Ok(())
}

#[test]
fn shuffled_command_history() -> anyhow::Result<()> {
    let modes = vec![3, 0, 4, 1];
    let history = CommandHistory::builder(modes.clone(), vec![1.; 4], DMatrix::identity(5, 5))
        .n_push_pull(3)
        .template(vec![1, -1, 1])
        .order(Order::Shuffle)
        .build()?;
    assert_eq!(history.n_command(), 4 * 3 * 3);
    let mut sorted_modes = modes.clone();
    sorted_modes.sort();
    for row in history.indexing_list() {
        let mut row = row.clone();
        row.sort();
        assert_eq!(row, sorted_modes);
    }
    Ok(())
}

#[test]
fn zonal_or_modal() {
    let mut padded = DMatrix::<f64>::identity(6, 6);
    padded.columns_mut(4, 2).fill(0.);
    assert!(is_zonal(&padded));
    assert!(is_zonal(&DMatrix::identity(6, 4)));
    let dense = DMatrix::from_fn(6, 6, |i, j| ((i + 2 * j) as f64).sin() + 2.);
    assert!(!is_zonal(&dense));
}

#[test]
fn reduced_reconstructor() -> anyhow::Result<()> {
    let interaction_matrix =
        DMatrix::from_row_slice(2, 5, &[0.3, 1.2, -0.7, 2.5, 0.1, 1.1, -0.4, 0.9, 0.2, 3.3]);
    let command_matrix = DMatrix::identity(5, 5);
    let rec = Reconstructor::from_matrices(
        &interaction_matrix,
        &command_matrix,
        Some(vec![0]),
        Some(vec![1, 3]),
    )?;
    assert_eq!(
        rec.interaction_matrix(),
        &DMatrix::from_row_slice(1, 2, &[1.2, 2.5])
    );
    assert_eq!(rec.reconstructor().shape(), (2, 1));
    assert!(((rec.interaction_matrix() * rec.reconstructor())[0] - 1.).abs() < 1e-9);

    let again = Reconstructor::from_matrices(
        &interaction_matrix,
        &command_matrix,
        Some(vec![0]),
        Some(vec![1, 3]),
    )?;
    assert_eq!(again.reconstructor(), rec.reconstructor());

    let v = DVector::from_vec(vec![4e-8]);
    assert_eq!(
        rec.delta_command(&v)?,
        -(rec.command_matrix() * rec.reconstructor()) * &v
    );
    Ok(())
}

#[test]
fn calibration_round_trip() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let config = OttConfig::default().base_path(root.path());
    let calibration = Calibration::new(
        Target::M4,
        TrackingNumber::now(),
        None,
        circular_pupil(20, 9.5),
        DMatrix::from_fn(5, 3, |i, j| 1. / (1. + i as f64 + 3. * j as f64)),
        DMatrix::from_fn(8, 3, |i, j| (i * j) as f64 / 7.),
    )?;
    calibration.save(&config)?;
    let loaded = Calibration::load_tagged(&config, "M4", calibration.tracking_number())?;
    assert_eq!(loaded.who().to_string(), "M4");
    assert_eq!(loaded.mask(), calibration.mask());
    assert_eq!(
        loaded.interaction_matrix(),
        calibration.interaction_matrix()
    );
    assert_eq!(loaded.command_matrix(), calibration.command_matrix());

    let alignment = OpticalAlignment::new(&config, calibration.tracking_number())?;
    let mut tower = ottcal::devices::Tower::from_config(&config)?;
    assert!(matches!(
        alignment.preview(&mut tower, 1, None, None),
        Err(OttError::UnsupportedTarget(_))
    ));
    assert!(matches!(
        Alignment::new(&config, &loaded, None, None),
        Err(OttError::UnsupportedTarget(_))
    ));
    Ok(())
}

struct ParRm {
    parabola: SimulatedPositioner,
    reference_mirror: SimulatedPositioner,
}
impl Actuate for ParRm {
    fn n_actuator(&self) -> usize {
        5
    }
    fn apply(&mut self, command: &[f64]) -> ottcal::Result<()> {
        self.parabola
            .set_position(&[0., 0., command[0], command[1], command[2], 0.])?;
        self.reference_mirror
            .set_position(&[0., 0., 0., command[3], command[4], 0.])
    }
}

#[test]
fn interrupted_acquisition() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let config = OttConfig::default().base_path(root.path());
    let parabola = SimulatedPositioner::new(6);
    let reference_mirror = SimulatedPositioner::new(6);
    let mut interferometer = SimulatedInterferometer::builder().pupil(32, 15.).build(
        &config.tower,
        &parabola,
        &reference_mirror,
    )?;
    let mut actuator = ParRm {
        parabola,
        reference_mirror,
    };
    let iff = IffAcquisition::builder(vec![0usize, 1, 2, 3, 4], vec![1.; 5], DMatrix::identity(5, 5))
        .build(&config)?;
    assert!(iff.info().zonal);
    let tt = iff.acquire(&config, &mut actuator, &mut interferometer)?;
    let mask = interferometer.acquire(1)?.mask;

    assert!(matches!(
        CalibrationBuilder::new(Target::ParRm, circular_pupil(16, 7.)).build(&config, &tt),
        Err(OttError::MaskShapeMismatch { .. })
    ));

    let folder = TtFolder::open(config.iff_root(), tt.clone())?;
    std::fs::remove_file(folder.join(frame_name(9)))?;
    assert!(matches!(
        CalibrationBuilder::new(Target::ParRm, mask).build(&config, &tt),
        Err(OttError::IncompleteAcquisition {
            expected: 10,
            found: 9,
            ..
        })
    ));
    Ok(())
}

struct Counter(usize);
impl Actuate for Counter {
    fn n_actuator(&self) -> usize {
        5
    }
    fn apply(&mut self, _command: &[f64]) -> ottcal::Result<()> {
        self.0 += 1;
        Ok(())
    }
}

#[test]
fn unwritable_acquisition_record() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let base = root.path().join("data");
    std::fs::write(&base, b"not a folder")?;
    let config = OttConfig::default().base_path(&base);
    let parabola = SimulatedPositioner::new(6);
    let reference_mirror = SimulatedPositioner::new(6);
    let mut interferometer = SimulatedInterferometer::builder().pupil(32, 15.).build(
        &config.tower,
        &parabola,
        &reference_mirror,
    )?;
    let iff = IffAcquisition::builder(vec![0usize, 1, 2, 3, 4], vec![1.; 5], DMatrix::identity(5, 5))
        .build(&config)?;
    let mut actuator = Counter(0);
    assert!(matches!(
        iff.acquire(&config, &mut actuator, &mut interferometer),
        Err(OttError::Io(..))
    ));
    assert_eq!(actuator.0, 0);
    Ok(())
}

#[test]
fn acquisition_folder_collision() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let config = OttConfig::default().base_path(root.path());
    let tt = TrackingNumber::from("20240101_120000");
    TtFolder::create_with(config.iff_root(), tt.clone())?;
    assert!(matches!(
        TtFolder::create_with(config.iff_root(), tt),
        Err(OttError::FolderExists(_))
    ));
    Ok(())
}

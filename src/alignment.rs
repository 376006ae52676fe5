//! Optical alignment
//!
//! An alignment computes the parabola and reference mirror commands that
//! correct the wavefront measured by the interferometer, using the
//! reconstructor of a [Calibration].
//!
//! The alignment goes through the states
//! [Idle] → [MeasurementAcquired] → [ModesFit] → [CommandComputed] → [Persisted],
//! each transition consuming the alignment in the previous state:
//! ```no_run
//! use ottcal::{alignment::Alignment, devices::Tower, Calibration, OttConfig};
//!
//! # fn main() -> ottcal::Result<()> {
//! let config = OttConfig::load("ott.toml")?;
//! let mut tower = Tower::from_config(&config)?;
//! let calibration = Calibration::load(&config, &"20240101_120000".into())?;
//! let aligned = Alignment::new(&config, &calibration, None, None)?
//!     .acquire(&mut tower, 4)?
//!     .fit()?
//!     .compute()?
//!     .persist()?;
//! aligned.apply(&mut tower)?;
//! # Ok(())
//! # }
//! ```

use nalgebra::DVector;

use crate::{
    calibration::{Calibration, Target},
    devices::{par_rm_split, Tower},
    reconstructor::Reconstructor,
    tracking::{TrackingNumber, TtFolder},
    utilities::{roi_generator, MaskedImage},
    zernike::{Zernike, ZernikeFit},
    OttConfig, OttError, Result,
};

mod record;
pub use record::AlignmentRecord;

/// No measurement yet
#[derive(Debug)]
pub struct Idle;
/// Wavefront and starting positions recorded
#[derive(Debug)]
pub struct MeasurementAcquired {
    image: MaskedImage,
    parabola_position: Vec<f64>,
    reference_mirror_position: Vec<f64>,
}
/// Zernike coefficients fitted
#[derive(Debug)]
pub struct ModesFit {
    measurement: MeasurementAcquired,
    z_total: DVector<f64>,
    z_sensed: DVector<f64>,
    z_selected: DVector<f64>,
}
/// Delta commands computed
#[derive(Debug)]
pub struct CommandComputed {
    fit: ModesFit,
    parabola_command: Vec<f64>,
    reference_mirror_command: Vec<f64>,
}
/// Alignment record written
#[derive(Debug)]
pub struct Persisted {
    record: AlignmentRecord,
    folder: TtFolder,
}

/// Alignment of the parabola and reference mirror
#[derive(Debug)]
pub struct Alignment<'a, S> {
    config: &'a OttConfig,
    calibration: &'a Calibration,
    reconstructor: Reconstructor,
    state: S,
}

impl<'a> Alignment<'a, Idle> {
    /// Creates an alignment from a calibration and the mode and DOF selections
    ///
    /// Fails with [OttError::UnsupportedTarget] if the calibration is not of the parabola
    /// and reference mirror pair, and with [OttError::Config] if the configuration is invalid
    pub fn new(
        config: &'a OttConfig,
        calibration: &'a Calibration,
        modes: Option<Vec<usize>>,
        dofs: Option<Vec<usize>>,
    ) -> Result<Self> {
        match calibration.who() {
            Target::ParRm => (),
            Target::M4 => {
                return Err(OttError::UnsupportedTarget(
                    "M4 alignment is not implemented".into(),
                ))
            }
            who => return Err(OttError::UnsupportedTarget(who.to_string())),
        }
        config.validate()?;
        let n_sensed = config.alignment.sensed_coefficients.len();
        if calibration.interaction_matrix().nrows() != n_sensed {
            return Err(OttError::SelectionMismatch(format!(
                "calibration {} senses {} modes, the configuration {}",
                calibration.tracking_number(),
                calibration.interaction_matrix().nrows(),
                n_sensed
            )));
        }
        let reconstructor = Reconstructor::new(calibration, modes, dofs)?;
        Ok(Self {
            config,
            calibration,
            reconstructor,
            state: Idle,
        })
    }
    /// Records the starting positions and acquires the wavefront averaged over `n_frames`
    pub fn acquire(
        self,
        tower: &mut Tower,
        n_frames: usize,
    ) -> Result<Alignment<'a, MeasurementAcquired>> {
        let parabola_position = tower.parabola.position()?;
        let reference_mirror_position = tower.reference_mirror.position()?;
        let image = tower.interferometer.acquire(n_frames)?;
        self.measurement(image, parabola_position, reference_mirror_position)
    }
    /// Sets the wavefront and the positions it has been measured at
    pub fn measurement(
        self,
        image: MaskedImage,
        parabola_position: Vec<f64>,
        reference_mirror_position: Vec<f64>,
    ) -> Result<Alignment<'a, MeasurementAcquired>> {
        let n = self.config.tower.n_dof_per_group;
        for position in [&parabola_position, &reference_mirror_position] {
            if position.len() != n {
                return Err(OttError::shape("starting position", n, position.len()));
            }
        }
        Ok(self.map(|Idle| MeasurementAcquired {
            image,
            parabola_position,
            reference_mirror_position,
        }))
    }
}

impl<'a> Alignment<'a, MeasurementAcquired> {
    /// Fits the Zernike modes and selects the coefficients of the reconstructor modes
    ///
    /// The image mask is combined with the configured region of interest if any
    pub fn fit(self) -> Result<Alignment<'a, ModesFit>> {
        let alignment = &self.config.alignment;
        let image = &self.state.image;
        let image = match alignment.roi {
            Some(k) => {
                let rois = roi_generator(image);
                let roi = rois.get(k).ok_or_else(|| {
                    OttError::SelectionMismatch(format!(
                        "region of interest {k} out of {} regions",
                        rois.len()
                    ))
                })?;
                image.mask_or(roi)?
            }
            None => image.clone(),
        };
        let (z_total, _) = Zernike.fit(&image, &alignment.zernike_modes)?;
        let z_sensed = DVector::from_iterator(
            alignment.sensed_coefficients.len(),
            alignment.sensed_coefficients.iter().map(|&i| z_total[i]),
        );
        let z_selected = self.reconstructor.select(&z_sensed)?;
        log::info!("sensed Zernike coefficients: {:?}", z_sensed.as_slice());
        Ok(self.map(|measurement| ModesFit {
            measurement,
            z_total,
            z_sensed,
            z_selected,
        }))
    }
}

impl<'a> Alignment<'a, ModesFit> {
    /// Computes the parabola and reference mirror delta commands
    pub fn compute(self) -> Result<Alignment<'a, CommandComputed>> {
        let delta = self
            .reconstructor
            .full_delta_command(&self.state.z_selected)?;
        let (parabola_command, reference_mirror_command) =
            par_rm_split(&self.config.tower, delta.as_slice())?;
        log::info!(
            "PAR command: {:?}, RM command: {:?}",
            parabola_command,
            reference_mirror_command
        );
        Ok(self.map(|fit| CommandComputed {
            fit,
            parabola_command,
            reference_mirror_command,
        }))
    }
    /// All the fitted Zernike coefficients
    pub fn z_total(&self) -> &DVector<f64> {
        &self.state.z_total
    }
    /// Coefficients of the sensed modes
    pub fn z_sensed(&self) -> &DVector<f64> {
        &self.state.z_sensed
    }
    /// Coefficients of the reconstructor modes
    pub fn z_selected(&self) -> &DVector<f64> {
        &self.state.z_selected
    }
}

impl<'a> Alignment<'a, CommandComputed> {
    /// Parabola and reference mirror delta commands
    pub fn commands(&self) -> (&[f64], &[f64]) {
        (
            &self.state.parabola_command,
            &self.state.reference_mirror_command,
        )
    }
    /// Writes the alignment record and appends the sensed coefficients to the alignment log
    pub fn persist(self) -> Result<Alignment<'a, Persisted>> {
        let CommandComputed {
            fit,
            parabola_command,
            reference_mirror_command,
        } = self.state;
        let ModesFit {
            measurement,
            z_total,
            z_sensed,
            z_selected,
        } = fit;
        let record = AlignmentRecord {
            who: self.calibration.who().clone(),
            tt_calibration: self.calibration.tracking_number().clone(),
            tt_alignment: TrackingNumber::now(),
            interaction_matrix: self.reconstructor.interaction_matrix().clone(),
            reconstructor: self.reconstructor.reconstructor().clone(),
            command_matrix: self.reconstructor.command_matrix().clone(),
            modes: self.reconstructor.modes().to_vec(),
            dofs: self.reconstructor.dofs().to_vec(),
            z_selected: z_selected.as_slice().to_vec(),
            z_sensed: z_sensed.as_slice().to_vec(),
            z_total: z_total.as_slice().to_vec(),
            parabola_position: measurement.parabola_position,
            reference_mirror_position: measurement.reference_mirror_position,
            parabola_command,
            reference_mirror_command,
        };
        let folder = record.save(self.config)?;
        measurement.image.dump(folder.join("StartImage.pkl"))?;
        record.log(self.config.alignment_root())?;
        log::info!("alignment saved into {:?}", folder.path());
        Ok(Alignment {
            config: self.config,
            calibration: self.calibration,
            reconstructor: self.reconstructor,
            state: Persisted { record, folder },
        })
    }
}

impl<'a> Alignment<'a, Persisted> {
    pub fn record(&self) -> &AlignmentRecord {
        &self.state.record
    }
    /// Compound tracking number of the alignment
    pub fn tracking_number(&self) -> &TrackingNumber {
        self.state.folder.tracking_number()
    }
    /// Moves the parabola and the reference mirror to their starting positions plus the delta commands
    pub fn apply(&self, tower: &mut Tower) -> Result<()> {
        let record = &self.state.record;
        let add = |a: &[f64], b: &[f64]| -> Vec<f64> { a.iter().zip(b).map(|(a, b)| a + b).collect() };
        tower
            .parabola
            .set_position(&add(&record.parabola_position, &record.parabola_command))?;
        tower.reference_mirror.set_position(&add(
            &record.reference_mirror_position,
            &record.reference_mirror_command,
        ))?;
        log::info!("alignment {} applied", self.tracking_number());
        Ok(())
    }
}

impl<'a, S> Alignment<'a, S> {
    fn map<T, F: FnOnce(S) -> T>(self, f: F) -> Alignment<'a, T> {
        Alignment {
            config: self.config,
            calibration: self.calibration,
            reconstructor: self.reconstructor,
            state: f(self.state),
        }
    }
    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }
    pub fn calibration(&self) -> &Calibration {
        self.calibration
    }
}

/// Alignment of the parabola and reference mirror of a tower with a calibration
pub struct OpticalAlignment<'a> {
    config: &'a OttConfig,
    calibration: Calibration,
}
impl<'a> OpticalAlignment<'a> {
    /// Loads the calibration `tt`
    pub fn new(config: &'a OttConfig, tt: &TrackingNumber) -> Result<Self> {
        Ok(Self {
            config,
            calibration: Calibration::load(config, tt)?,
        })
    }
    pub fn from_calibration(config: &'a OttConfig, calibration: Calibration) -> Self {
        Self {
            config,
            calibration,
        }
    }
    /// Computes the parabola and reference mirror delta commands without saving nor moving anything
    pub fn preview(
        &self,
        tower: &mut Tower,
        n_frames: usize,
        modes: Option<Vec<usize>>,
        dofs: Option<Vec<usize>>,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let computed = Alignment::new(self.config, &self.calibration, modes, dofs)?
            .acquire(tower, n_frames)?
            .fit()?
            .compute()?;
        let (par, rm) = computed.commands();
        Ok((par.to_vec(), rm.to_vec()))
    }
    /// Computes and saves the delta commands, and applies them if `apply` is true
    ///
    /// Returns the alignment record
    pub fn align(
        &self,
        tower: &mut Tower,
        n_frames: usize,
        modes: Option<Vec<usize>>,
        dofs: Option<Vec<usize>>,
        apply: bool,
    ) -> Result<AlignmentRecord> {
        let aligned = Alignment::new(self.config, &self.calibration, modes, dofs)?
            .acquire(tower, n_frames)?
            .fit()?
            .compute()?
            .persist()?;
        if apply {
            aligned.apply(tower)?;
        }
        Ok(aligned.record().clone())
    }
}

//! Optical calibration
//!
//! A [Calibration] is the interaction matrix between the commanded DOF of a
//! tower element and the Zernike modes sensed by the interferometer,
//! together with the command matrix that was used to measure it and the pupil mask.
//! It is reduced from an influence functions acquisition by a
//! [CalibrationBuilder] and written once into a calibration tracking folder.

use std::{fmt::Display, str::FromStr};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    tracking::{TrackingNumber, TtFolder},
    utilities::Mask,
    OttConfig, OttError, Result,
};

mod builder;
mod par_rm;
pub use builder::CalibrationBuilder;
pub use par_rm::{calibrate_par_rm, par_rm_command_matrix};

/// Calibrated tower element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Target {
    /// parabola and reference mirror
    ParRm,
    /// the whole deformable mirror
    M4,
    /// a single segment of the deformable mirror
    Segment(u8),
    Other(String),
}
impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::ParRm => write!(f, "PAR + RM"),
            Target::M4 => write!(f, "M4"),
            Target::Segment(id) => write!(f, "SEGMENT {id}"),
            Target::Other(tag) => write!(f, "{tag}"),
        }
    }
}
impl From<&str> for Target {
    fn from(value: &str) -> Self {
        match value.trim() {
            "PAR + RM" | "PAR+RM" => Target::ParRm,
            "M4" => Target::M4,
            tag => tag
                .strip_prefix("SEGMENT")
                .and_then(|id| u8::from_str(id.trim()).ok())
                .map_or_else(|| Target::Other(value.to_string()), Target::Segment),
        }
    }
}
impl From<String> for Target {
    fn from(value: String) -> Self {
        Target::from(value.as_str())
    }
}
impl From<Target> for String {
    fn from(value: Target) -> Self {
        value.to_string()
    }
}

/// Calibration artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    who: Target,
    tt: TrackingNumber,
    tt_acquisition: Option<TrackingNumber>,
    mask: Mask,
    interaction_matrix: DMatrix<f64>,
    command_matrix: DMatrix<f64>,
}

impl Calibration {
    pub const FILE: &'static str = "calibration.pkl";
    /// Creates a calibration artifact, checking that the matrices agree on the number of DOF
    pub fn new(
        who: Target,
        tt: TrackingNumber,
        tt_acquisition: Option<TrackingNumber>,
        mask: Mask,
        interaction_matrix: DMatrix<f64>,
        command_matrix: DMatrix<f64>,
    ) -> Result<Self> {
        if interaction_matrix.ncols() != command_matrix.ncols() {
            return Err(OttError::shape(
                "command matrix columns",
                interaction_matrix.ncols(),
                command_matrix.ncols(),
            ));
        }
        Ok(Self {
            who,
            tt,
            tt_acquisition,
            mask,
            interaction_matrix,
            command_matrix,
        })
    }
    pub fn builder<W: Into<Target>>(who: W, mask: Mask) -> CalibrationBuilder {
        CalibrationBuilder::new(who.into(), mask)
    }
    pub fn who(&self) -> &Target {
        &self.who
    }
    pub fn tracking_number(&self) -> &TrackingNumber {
        &self.tt
    }
    /// Tracking number of the influence functions acquisition the calibration is reduced from
    pub fn acquisition(&self) -> Option<&TrackingNumber> {
        self.tt_acquisition.as_ref()
    }
    pub fn mask(&self) -> &Mask {
        &self.mask
    }
    /// Interaction matrix: one row per sensed mode, one column per DOF
    pub fn interaction_matrix(&self) -> &DMatrix<f64> {
        &self.interaction_matrix
    }
    /// Command matrix: one row per actuator, one column per DOF
    pub fn command_matrix(&self) -> &DMatrix<f64> {
        &self.command_matrix
    }
    /// Writes the calibration into a new tracking folder of the calibration root folder
    pub fn save(&self, config: &OttConfig) -> Result<()> {
        let folder = TtFolder::create_with(config.calibration_root(), self.tt.clone())?;
        folder.dump(Self::FILE, self)?;
        folder.dump("mask.pkl", &self.mask)?;
        folder.dump("interaction_matrix.pkl", &self.interaction_matrix)?;
        folder.dump("command_matrix.pkl", &self.command_matrix)?;
        folder.write_text(
            "info.txt",
            &format!(
                "who = {}\ntt_acquisition = {}",
                self.who,
                self.tt_acquisition
                    .as_ref()
                    .map_or("none".to_string(), |tt| tt.to_string())
            ),
        )?;
        log::info!("{} calibration saved into {:?}", self.who, folder.path());
        Ok(())
    }
    /// Loads the calibration `tt`
    pub fn load(config: &OttConfig, tt: &TrackingNumber) -> Result<Self> {
        TtFolder::open(config.calibration_root(), tt.clone())?.load(Self::FILE)
    }
    /// Loads the calibration `tt` of the element `who`
    ///
    /// Fails with [OttError::UnsupportedTarget] if the calibration is of another element
    pub fn load_tagged<W: Into<Target>>(
        config: &OttConfig,
        who: W,
        tt: &TrackingNumber,
    ) -> Result<Self> {
        let who = who.into();
        let calibration = Self::load(config, tt)?;
        if calibration.who != who {
            return Err(OttError::UnsupportedTarget(format!(
                "calibration {tt} is of {}, not {who}",
                calibration.who
            )));
        }
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_tags() {
        assert_eq!(Target::from("PAR + RM"), Target::ParRm);
        assert_eq!(Target::from("M4"), Target::M4);
        assert_eq!(Target::from("SEGMENT 3"), Target::Segment(3));
        assert_eq!(Target::from("M1"), Target::Other("M1".into()));
        assert_eq!(Target::Segment(3).to_string(), "SEGMENT 3");
    }

    #[test]
    fn round_trip() {
        let root = tempfile::tempdir().unwrap();
        let config = OttConfig::default().base_path(root.path());
        let calibration = Calibration::new(
            Target::ParRm,
            "20240101_120000".into(),
            Some("20240101_110000".into()),
            crate::utilities::circular_pupil(16, 7.),
            DMatrix::from_fn(5, 5, |i, j| (i as f64 + 0.1) * (j as f64 - 0.3) / 7.),
            DMatrix::identity(5, 5),
        )
        .unwrap();
        calibration.save(&config).unwrap();
        let loaded = Calibration::load_tagged(&config, "PAR + RM", calibration.tracking_number())
            .unwrap();
        assert_eq!(loaded, calibration);
        assert!(matches!(
            Calibration::load_tagged(&config, Target::M4, calibration.tracking_number()),
            Err(OttError::UnsupportedTarget(_))
        ));
        assert!(matches!(
            calibration.save(&config),
            Err(OttError::FolderExists(_))
        ));
    }
}

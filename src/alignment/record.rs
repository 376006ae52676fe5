use std::{fs::OpenOptions, io::Write, path::Path};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    calibration::Target,
    tracking::{TrackingNumber, TtFolder},
    OttConfig, OttError, Result,
};

/// Alignment record
///
/// Written as `info.pkl` into the alignment tracking folder `<calibration>--<alignment>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub who: Target,
    pub tt_calibration: TrackingNumber,
    pub tt_alignment: TrackingNumber,
    pub interaction_matrix: DMatrix<f64>,
    pub reconstructor: DMatrix<f64>,
    pub command_matrix: DMatrix<f64>,
    pub modes: Vec<usize>,
    pub dofs: Vec<usize>,
    /// coefficients of the selected modes
    pub z_selected: Vec<f64>,
    /// coefficients of the sensed modes
    pub z_sensed: Vec<f64>,
    /// all the fitted coefficients
    pub z_total: Vec<f64>,
    pub parabola_position: Vec<f64>,
    pub reference_mirror_position: Vec<f64>,
    pub parabola_command: Vec<f64>,
    pub reference_mirror_command: Vec<f64>,
}

impl AlignmentRecord {
    pub const FILE: &'static str = "info.pkl";
    pub const LOG: &'static str = "AlignmentLog.txt";
    /// Compound tracking number `<calibration>--<alignment>`
    pub fn tracking_number(&self) -> TrackingNumber {
        self.tt_calibration.compound(&self.tt_alignment)
    }
    /// Writes the record into a new tracking folder of the alignment root folder
    pub fn save(&self, config: &OttConfig) -> Result<TtFolder> {
        let folder = TtFolder::create_with(config.alignment_root(), self.tracking_number())?;
        folder.dump(Self::FILE, self)?;
        let vector = |v: &[f64]| {
            v.iter()
                .map(|x| format!("{:9.3e}", x))
                .collect::<Vec<_>>()
                .join(" ")
        };
        folder.write_text(
            "positions_and_delta_commands.txt",
            &[
                format!("parabola position         = {}", vector(&self.parabola_position)),
                format!("reference mirror position = {}", vector(&self.reference_mirror_position)),
                format!("parabola command          = {}", vector(&self.parabola_command)),
                format!("reference mirror command  = {}", vector(&self.reference_mirror_command)),
            ]
            .join("\n"),
        )?;
        Ok(folder)
    }
    /// Appends the alignment tracking number and the sensed coefficients to the alignment log
    pub fn log<P: AsRef<Path>>(&self, root: P) -> Result<()> {
        let path = root.as_ref().join(Self::LOG);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| OttError::Io(e, path.clone()))?;
        let line = std::iter::once(self.tt_alignment.to_string())
            .chain(self.z_sensed.iter().map(|z| format!("{:9.3e}", z)))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(file, "{}", line).map_err(|e| OttError::Io(e, path))?;
        Ok(())
    }
    /// Loads an alignment record from its compound tracking number
    pub fn load(config: &OttConfig, tt: &TrackingNumber) -> Result<Self> {
        let (tt_calibration, tt_alignment) = tt.split().ok_or_else(|| {
            OttError::SelectionMismatch(format!(
                "{tt} is not a `<calibration>--<alignment>` tracking number"
            ))
        })?;
        log::debug!(
            "loading alignment {} of calibration {}",
            tt_alignment,
            tt_calibration
        );
        TtFolder::open(config.alignment_root(), tt.clone())?.load(Self::FILE)
    }
}

use nalgebra::DMatrix;

use super::{Calibration, Target};
use crate::{config, devices::Tower, iff::IffAcquisition, OttConfig, Result};

/// Command matrix of the parabola and reference mirror DOF
///
/// Columns and rows are the parabola DOF followed by the reference mirror DOF.
/// A parabola rotation is compensated by the same rotation of the reference
/// mirror scaled by the coupling coefficient.
pub fn par_rm_command_matrix(tower: &config::Tower) -> DMatrix<f64> {
    let n_par = tower.parabola_dof.len();
    let mut command_matrix = DMatrix::<f64>::identity(tower.n_dof(), tower.n_dof());
    for (i, dof) in tower.parabola_dof.iter().enumerate() {
        if let Some(j) = tower.reference_mirror_dof.iter().position(|d| d == dof) {
            command_matrix[(n_par + j, i)] = tower.par_rm_coupling;
        }
    }
    command_matrix
}

/// Calibrates the parabola and reference mirror DOF
///
/// Acquires the push-pull influence functions of the DOF with the given
/// amplitudes, then reduces and saves the calibration.
/// The pupil mask is the mask of a frame acquired before the first command.
pub fn calibrate_par_rm(
    config: &OttConfig,
    tower: &mut Tower,
    amplitude: Vec<f64>,
    n_push_pull: usize,
    n_frames: usize,
) -> Result<Calibration> {
    let iff = IffAcquisition::builder(
        (0..config.tower.n_dof()).collect::<Vec<usize>>(),
        amplitude,
        par_rm_command_matrix(&config.tower),
    )
    .who(Target::ParRm.to_string())
    .n_push_pull(n_push_pull)
    .n_frames(n_frames)
    .build(config)?;
    let (mut actuator, interferometer) = tower.par_rm(&config.tower)?;
    let mask = interferometer.acquire(n_frames)?.mask;
    let tt = iff.acquire(config, &mut actuator, interferometer)?;
    Calibration::builder(Target::ParRm, mask).build(config, &tt)
}

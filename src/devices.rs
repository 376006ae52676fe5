//! Tower devices
//!
//! The calibration and alignment procedures only see the tower through 3
//! capabilities:
//!  - [Positioner]: get and set the position of an optical element,
//!  - [Interferometer]: acquire and save masked wavefront images,
//!  - [Actuate]: apply an actuator-space command.
//!
//! All the calls are blocking: a [Positioner] returns once the motion is completed
//! and an [Interferometer] once the frames are captured.
//! Simulated devices are provided in [simulated] and grouped into a [Tower] by [Tower::from_config].

use std::path::Path;

use crate::{config, utilities::MaskedImage, OttError, Result};

pub mod simulated;
mod tower;

pub use tower::{ParRmActuator, Tower};

/// Position control of an optical element
pub trait Positioner {
    /// Returns the current position
    fn position(&self) -> Result<Vec<f64>>;
    /// Moves to `position` and returns when the motion is completed
    fn set_position(&mut self, position: &[f64]) -> Result<()>;
}

/// Wavefront sensor
pub trait Interferometer {
    /// Acquires `n_frames` frames and returns their average
    fn acquire(&mut self, n_frames: usize) -> Result<MaskedImage>;
    /// Saves an image as `name` into the folder `path`
    fn save(&self, path: &Path, name: &str, image: &MaskedImage) -> Result<()> {
        image.dump(path.join(name))
    }
}

/// Actuator-space command interface
pub trait Actuate {
    /// Number of actuators
    fn n_actuator(&self) -> usize;
    /// Applies a command and returns when it is completed
    fn apply(&mut self, command: &[f64]) -> Result<()>;
}

/// Splits a parabola and reference mirror command into the positioner commands
///
/// The i<sup>th</sup> element of `command` is written at the i<sup>th</sup> DOF
/// index of the parabola followed by the reference mirror; all the other DOF are zero.
pub fn par_rm_split(tower: &config::Tower, command: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let dof_index = tower.dof_index();
    if command.len() != dof_index.len() {
        return Err(OttError::SelectionMismatch(format!(
            "expected a command of {} DOF for PAR + RM, found {}",
            dof_index.len(),
            command.len()
        )));
    }
    let n_par = tower.parabola_dof.len();
    let mut par = vec![0f64; tower.n_dof_per_group];
    let mut rm = vec![0f64; tower.n_dof_per_group];
    for (i, (&dof, &c)) in dof_index.iter().zip(command).enumerate() {
        if i < n_par {
            par[dof] = c;
        } else {
            rm[dof] = c;
        }
    }
    Ok((par, rm))
}

/// Gathers the parabola and reference mirror DOF from the positioner vectors
pub fn par_rm_gather(tower: &config::Tower, par: &[f64], rm: &[f64]) -> Vec<f64> {
    tower
        .parabola_dof
        .iter()
        .map(|&i| par[i])
        .chain(tower.reference_mirror_dof.iter().map(|&i| rm[i]))
        .collect()
}

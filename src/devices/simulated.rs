//! Simulated tower devices
//!
//! The simulated interferometer computes the wavefront from the current
//! positions of the simulated parabola and reference mirror with a linear
//! optical model: the Zernike coefficients of the wavefront are the product of
//! a sensitivity matrix with the parabola and reference mirror DOF.

use std::{cell::RefCell, rc::Rc};

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use super::{par_rm_gather, Interferometer, Positioner};
use crate::{
    config,
    utilities::{circular_pupil, Mask, MaskedImage},
    zernike::Zernike,
    Result,
};

/// A simulated positioner
///
/// Clones share the same position.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPositioner {
    position: Rc<RefCell<Vec<f64>>>,
}
impl SimulatedPositioner {
    /// Creates a positioner with `n_dof` DOF at zero
    pub fn new(n_dof: usize) -> Self {
        Self {
            position: Rc::new(RefCell::new(vec![0f64; n_dof])),
        }
    }
}
impl Positioner for SimulatedPositioner {
    fn position(&self) -> Result<Vec<f64>> {
        Ok(self.position.borrow().clone())
    }
    fn set_position(&mut self, position: &[f64]) -> Result<()> {
        let mut current = self.position.borrow_mut();
        if current.len() != position.len() {
            return Err(crate::OttError::shape(
                "positioner command",
                current.len(),
                position.len(),
            ));
        }
        current.copy_from_slice(position);
        Ok(())
    }
}

/// Simulated interferometer builder
///
/// Default properties:
///  - frame size     : 128px
///  - pupil radius   : 60px
///  - modes          : Noll 2, 3, 4, 7, 8
///  - sensitivity    : parabola piston to focus, parabola tip-tilt to tip-tilt and coma,
///    reference mirror tip-tilt to tip-tilt
///  - noise          : none
#[derive(Debug, Clone)]
pub struct SimulatedInterferometerBuilder {
    size: usize,
    radius: f64,
    modes: Vec<usize>,
    sensitivity: DMatrix<f64>,
    noise_rms: f64,
}
impl Default for SimulatedInterferometerBuilder {
    fn default() -> Self {
        #[rustfmt::skip]
        let sensitivity = DMatrix::from_row_slice(5, 5, &[
            0.0, 1.0, 0.0, 2.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 2.0,
            1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.4, 0.0, 0.0,
            0.0, 0.4, 0.0, 0.0, 0.0,
        ]) * 1e-7;
        Self {
            size: 128,
            radius: 60.,
            modes: vec![2, 3, 4, 7, 8],
            sensitivity,
            noise_rms: 0.,
        }
    }
}
impl SimulatedInterferometerBuilder {
    /// Sets the frame size and the pupil radius in pixels
    pub fn pupil(self, size: usize, radius: f64) -> Self {
        Self {
            size,
            radius,
            ..self
        }
    }
    /// Sets the Zernike modes and the DOF to modes sensitivity matrix
    pub fn sensitivity(self, modes: Vec<usize>, sensitivity: DMatrix<f64>) -> Self {
        Self {
            modes,
            sensitivity,
            ..self
        }
    }
    /// Sets the rms of the uniform noise added to each frame
    pub fn noise_rms(self, noise_rms: f64) -> Self {
        Self { noise_rms, ..self }
    }
    /// Builds the interferometer looking at the given parabola and reference mirror
    pub fn build(
        self,
        tower: &config::Tower,
        parabola: &SimulatedPositioner,
        reference_mirror: &SimulatedPositioner,
    ) -> Result<SimulatedInterferometer> {
        if self.sensitivity.shape() != (self.modes.len(), tower.n_dof()) {
            return Err(crate::OttError::shape(
                "simulated interferometer sensitivity",
                format!("({}, {})", self.modes.len(), tower.n_dof()),
                format!("{:?}", self.sensitivity.shape()),
            ));
        }
        let mask = circular_pupil(self.size, self.radius);
        let blank = MaskedImage::new(DMatrix::zeros(self.size, self.size), mask.clone())?;
        let basis = Zernike.basis(&blank, &self.modes)?;
        Ok(SimulatedInterferometer {
            tower: tower.clone(),
            parabola: parabola.clone(),
            reference_mirror: reference_mirror.clone(),
            sensitivity: self.sensitivity,
            mask,
            basis,
            noise_rms: self.noise_rms,
        })
    }
}

/// Simulated interferometer
#[derive(Debug, Clone)]
pub struct SimulatedInterferometer {
    tower: config::Tower,
    parabola: SimulatedPositioner,
    reference_mirror: SimulatedPositioner,
    sensitivity: DMatrix<f64>,
    mask: Mask,
    basis: DMatrix<f64>,
    noise_rms: f64,
}
impl SimulatedInterferometer {
    pub fn builder() -> SimulatedInterferometerBuilder {
        Default::default()
    }
    /// Returns the Zernike coefficients of the current wavefront
    pub fn zernike_coefficients(&self) -> Result<DVector<f64>> {
        let dof = par_rm_gather(
            &self.tower,
            &self.parabola.position()?,
            &self.reference_mirror.position()?,
        );
        Ok(&self.sensitivity * DVector::from_vec(dof))
    }
    fn frame(&self, rng: &mut impl Rng) -> Result<MaskedImage> {
        let values = &self.basis * self.zernike_coefficients()?;
        let mut data = DMatrix::<f64>::zeros(self.mask.nrows(), self.mask.ncols());
        // uniform noise of variance noise_rms^2
        let half_width = self.noise_rms * 3f64.sqrt();
        data.iter_mut()
            .zip(self.mask.iter())
            .filter(|(_, m)| !**m)
            .zip(values.iter())
            .for_each(|((d, _), v)| {
                *d = if half_width > 0. {
                    v + rng.gen_range(-half_width..half_width)
                } else {
                    *v
                }
            });
        MaskedImage::new(data, self.mask.clone())
    }
}
impl Interferometer for SimulatedInterferometer {
    fn acquire(&mut self, n_frames: usize) -> Result<MaskedImage> {
        let mut rng = rand::thread_rng();
        let frames = (0..n_frames.max(1))
            .map(|_| self.frame(&mut rng))
            .collect::<Result<Vec<_>>>()?;
        MaskedImage::mean(&frames)
    }
}

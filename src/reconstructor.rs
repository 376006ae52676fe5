//! Reconstructor and DOF/mode selection
//!
//! The reconstructor is the pseudo-inverse of the interaction matrix of a
//! [Calibration] restricted to a subset of its sensed modes (rows) and of its
//! DOF (columns). When DOF are selected, the command matrix is restricted to
//! the rows and columns of the same DOF so that the unselected DOF are never
//! commanded.
//!
//! ```
//! use ottcal::Reconstructor;
//! use nalgebra::DMatrix;
//!
//! let interaction_matrix = DMatrix::from_row_slice(2, 5, &[
//!     1., 2., 3., 4., 5.,
//!     6., 7., 8., 9., 10.,
//! ]);
//! let command_matrix = DMatrix::identity(5, 5);
//! let rec = Reconstructor::from_matrices(&interaction_matrix, &command_matrix, Some(vec![0]), Some(vec![1, 3])).unwrap();
//! assert_eq!(rec.interaction_matrix().shape(), (1, 2));
//! assert_eq!(rec.reconstructor().shape(), (2, 1));
//! assert!(((rec.interaction_matrix() * rec.reconstructor())[0] - 1.).abs() < 1e-9);
//! ```

use nalgebra::{DMatrix, DVector};

use crate::{calibration::Calibration, OttError, Result};

/// Moore-Penrose pseudo-inverse computed from the singular value decomposition
///
/// Singular values below `s_max * max(rows, cols) * f64::EPSILON` are discarded.
pub fn pseudo_inverse(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (nrows, ncols) = matrix.shape();
    let svd = matrix.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    let tol = s_max * nrows.max(ncols) as f64 * f64::EPSILON;
    let s_min = svd
        .singular_values
        .iter()
        .cloned()
        .filter(|s| *s > tol)
        .fold(f64::INFINITY, f64::min);
    log::info!(
        "{}x{} matrix singular values range: [{:.3e},{:.3e}], condition number: {:.3e}",
        nrows,
        ncols,
        svd.singular_values.min(),
        s_max,
        s_max / s_min
    );
    svd.pseudo_inverse(tol)
        .map_err(|msg| OttError::PseudoInverse(msg.to_string()))
}

fn check_selection(what: &str, selection: &[usize], n: usize) -> Result<()> {
    if selection.is_empty() {
        return Err(OttError::SelectionMismatch(format!("empty {what} selection")));
    }
    if let Some(i) = selection.iter().find(|&&i| i >= n) {
        return Err(OttError::SelectionMismatch(format!(
            "{what} index {i} is out of range for {n} {what}s"
        )));
    }
    Ok(())
}

/// Reconstructor with its mode and DOF selections
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstructor {
    modes: Vec<usize>,
    dofs: Vec<usize>,
    interaction_matrix: DMatrix<f64>,
    reconstructor: DMatrix<f64>,
    command_matrix: DMatrix<f64>,
    command_rows: Vec<usize>,
    n_command: usize,
}

impl Reconstructor {
    /// Builds the reconstructor of a calibration
    ///
    /// All the sensed modes and all the DOF are selected by default
    pub fn new(
        calibration: &Calibration,
        modes: Option<Vec<usize>>,
        dofs: Option<Vec<usize>>,
    ) -> Result<Self> {
        Self::from_matrices(
            calibration.interaction_matrix(),
            calibration.command_matrix(),
            modes,
            dofs,
        )
    }
    /// Builds the reconstructor from an interaction matrix and a command matrix
    pub fn from_matrices(
        interaction_matrix: &DMatrix<f64>,
        command_matrix: &DMatrix<f64>,
        modes: Option<Vec<usize>>,
        dofs: Option<Vec<usize>>,
    ) -> Result<Self> {
        let (n_mode, n_dof) = interaction_matrix.shape();
        if command_matrix.ncols() != n_dof {
            return Err(OttError::shape(
                "command matrix columns",
                n_dof,
                command_matrix.ncols(),
            ));
        }
        let n_command = command_matrix.nrows();
        let modes = modes.unwrap_or_else(|| (0..n_mode).collect());
        check_selection("mode", &modes, n_mode)?;
        let (dofs, command_rows, command_matrix) = match dofs {
            Some(dofs) => {
                check_selection("DOF", &dofs, n_dof.min(n_command))?;
                let command_matrix = command_matrix.select_rows(&dofs).select_columns(&dofs);
                (dofs.clone(), dofs, command_matrix)
            }
            None => {
                let dofs: Vec<usize> = (0..n_dof).collect();
                check_selection("DOF", &dofs, n_dof)?;
                (dofs, (0..n_command).collect(), command_matrix.clone())
            }
        };

        let interaction_matrix = interaction_matrix.select_rows(&modes).select_columns(&dofs);
        let reconstructor = pseudo_inverse(&interaction_matrix)?;
        log::debug!("reconstructor modes: {:?}, DOF: {:?}", modes, dofs);
        Ok(Self {
            modes,
            dofs,
            interaction_matrix,
            reconstructor,
            command_matrix,
            command_rows,
            n_command,
        })
    }
    /// Selected sensed modes
    pub fn modes(&self) -> &[usize] {
        &self.modes
    }
    /// Selected DOF
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }
    /// Reduced interaction matrix
    pub fn interaction_matrix(&self) -> &DMatrix<f64> {
        &self.interaction_matrix
    }
    pub fn reconstructor(&self) -> &DMatrix<f64> {
        &self.reconstructor
    }
    /// Reduced command matrix
    pub fn command_matrix(&self) -> &DMatrix<f64> {
        &self.command_matrix
    }
    /// Product of the reduced command matrix with the reconstructor
    pub fn mixing_matrix(&self) -> DMatrix<f64> {
        &self.command_matrix * &self.reconstructor
    }
    /// Selects the coefficients of the selected modes from the coefficients of all the sensed modes
    pub fn select(&self, coefficients: &DVector<f64>) -> Result<DVector<f64>> {
        if let Some(i) = self.modes.iter().find(|&&i| i >= coefficients.len()) {
            return Err(OttError::SelectionMismatch(format!(
                "mode index {i} is out of range for {} coefficients",
                coefficients.len()
            )));
        }
        Ok(coefficients.select_rows(&self.modes))
    }
    /// Correcting command `-(C R) z` of the selected mode coefficients `z`
    pub fn delta_command(&self, coefficients: &DVector<f64>) -> Result<DVector<f64>> {
        if coefficients.len() != self.reconstructor.ncols() {
            return Err(OttError::SelectionMismatch(format!(
                "expected {} mode coefficients, found {}",
                self.reconstructor.ncols(),
                coefficients.len()
            )));
        }
        Ok(-(self.mixing_matrix() * coefficients))
    }
    /// Correcting command of [Reconstructor::delta_command] over all the command matrix rows
    ///
    /// The rows of the unselected DOF are zero.
    pub fn full_delta_command(&self, coefficients: &DVector<f64>) -> Result<DVector<f64>> {
        let delta = self.delta_command(coefficients)?;
        let mut full = DVector::zeros(self.n_command);
        for (&i, d) in self.command_rows.iter().zip(delta.iter()) {
            full[i] = *d;
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrices() -> (DMatrix<f64>, DMatrix<f64>) {
        (
            DMatrix::from_row_slice(2, 5, &[1., 2., 3., 4., 5., 6., 7., 8., 9., 10.]),
            DMatrix::from_fn(4, 5, |i, j| if i == j { 1. } else { 0.5 }),
        )
    }

    #[test]
    fn selection() {
        let (d, c) = matrices();
        let rec = Reconstructor::from_matrices(&d, &c, Some(vec![0]), Some(vec![1, 3])).unwrap();
        assert_eq!(rec.interaction_matrix(), &DMatrix::from_row_slice(1, 2, &[2., 4.]));
        assert_eq!(rec.reconstructor().shape(), (2, 1));
        assert_eq!(
            rec.command_matrix(),
            &DMatrix::from_row_slice(2, 2, &[1., 0.5, 0.5, 1.])
        );
        let identity = rec.interaction_matrix() * rec.reconstructor();
        assert!((identity[0] - 1.).abs() < 1e-9);
    }

    #[test]
    fn idempotent() {
        let (d, c) = matrices();
        let a = Reconstructor::from_matrices(&d, &c, Some(vec![0, 1]), Some(vec![0, 2, 4])).unwrap();
        let b = Reconstructor::from_matrices(&d, &c, Some(vec![0, 1]), Some(vec![0, 2, 4])).unwrap();
        assert_eq!(a.reconstructor(), b.reconstructor());
    }

    #[test]
    fn sign() {
        let (d, c) = matrices();
        let rec = Reconstructor::from_matrices(&d, &c, None, Some(vec![0, 1])).unwrap();
        let v = DVector::from_vec(vec![1e-7, -3e-8]);
        let delta = rec.delta_command(&v).unwrap();
        let expected = -(rec.command_matrix() * rec.reconstructor()) * &v;
        assert_eq!(delta, expected);
        assert!(matches!(
            rec.delta_command(&DVector::zeros(3)),
            Err(OttError::SelectionMismatch(_))
        ));
    }

    #[test]
    fn unselected_dofs_stay_zero() {
        let config = crate::OttConfig::default();
        let command_matrix = crate::calibration::par_rm_command_matrix(&config.tower);
        let interaction_matrix = DMatrix::<f64>::identity(5, 5) * 1e-7;
        let rec =
            Reconstructor::from_matrices(&interaction_matrix, &command_matrix, None, Some(vec![1]))
                .unwrap();
        assert_eq!(rec.command_matrix(), &DMatrix::identity(1, 1));
        let z = DVector::from_vec(vec![0., 1e-7, 0., 0., 0.]);
        let delta = rec.full_delta_command(&z).unwrap();
        assert_eq!(delta.len(), 5);
        assert!((delta[1] + 1.).abs() < 1e-9);
        assert!(delta.iter().enumerate().all(|(i, d)| i == 1 || *d == 0.));
        let (par, rm) = crate::devices::par_rm_split(&config.tower, delta.as_slice()).unwrap();
        assert!((par[3] + 1.).abs() < 1e-9);
        assert_eq!(rm, vec![0.; 6]);

        let all = Reconstructor::from_matrices(&interaction_matrix, &command_matrix, None, None)
            .unwrap()
            .full_delta_command(&z)
            .unwrap();
        assert!(all[3] != 0.);
    }

    #[test]
    fn rank_deficient() {
        let d = DMatrix::from_row_slice(3, 2, &[1., 2., 2., 4., 3., 6.]);
        let rec = Reconstructor::from_matrices(&d, &DMatrix::identity(2, 2), None, None).unwrap();
        let p = rec.reconstructor();
        assert!((&d * p * &d - &d).abs().max() < 1e-12);
    }

    #[test]
    fn bad_selection() {
        let (d, c) = matrices();
        assert!(matches!(
            Reconstructor::from_matrices(&d, &c, Some(vec![2]), None),
            Err(OttError::SelectionMismatch(_))
        ));
        assert!(matches!(
            Reconstructor::from_matrices(&d, &c, None, Some(vec![])),
            Err(OttError::SelectionMismatch(_))
        ));
    }
}

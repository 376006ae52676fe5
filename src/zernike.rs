//! Zernike decomposition
//!
//! Wavefronts are decomposed on Zernike polynomials normalized according to
//! Noll (J. Opt. Soc. Am. 66, 207 (1976)) over the disk circumscribing the
//! valid pixels of the image.
//!
//! ```
//! use ottcal::{zernike::{Zernike, ZernikeFit}, utilities::{circular_pupil, MaskedImage}};
//! use nalgebra::DMatrix;
//!
//! let mask = circular_pupil(64, 30.);
//! let image = MaskedImage::new(DMatrix::zeros(64, 64), mask).unwrap();
//! let (coefs, basis) = Zernike.fit(&image, &[1, 2, 3]).unwrap();
//! assert_eq!(coefs.len(), 3);
//! assert_eq!(basis.ncols(), 3);
//! ```

use nalgebra::{DMatrix, DVector};

use crate::{utilities::MaskedImage, OttError, Result};

/// Zernike decomposition interface
pub trait ZernikeFit {
    /// Fits the Zernike modes given by their Noll indices to the valid pixels of the image
    ///
    /// Returns the coefficients, in the order of `modes`, and the basis matrix
    /// (one row per valid pixel, one column per mode)
    fn fit(&self, image: &MaskedImage, modes: &[usize]) -> Result<(DVector<f64>, DMatrix<f64>)>;
    /// Synthesizes the surface from the coefficients and the basis returned by [ZernikeFit::fit]
    fn surface(
        &self,
        image: &MaskedImage,
        coefficients: &DVector<f64>,
        basis: &DMatrix<f64>,
    ) -> Result<MaskedImage>;
}

/// Radial order and azimuthal frequency of the Noll indices `modes`
///
/// The polynomials of the first radial orders are enumerated by [::zernike::jnm]
/// until all the indices are covered.
fn noll_nm(modes: &[usize]) -> Result<Vec<(u32, u32, u32)>> {
    if let Some(&j) = modes.iter().find(|&&j| j == 0) {
        return Err(OttError::SelectionMismatch(format!(
            "Zernike mode {j} is not a Noll index"
        )));
    }
    let j_max = modes.iter().cloned().max().unwrap_or(1);
    let mut n_radial_order = 1;
    while n_radial_order * (n_radial_order + 1) / 2 < j_max {
        n_radial_order += 1;
    }
    let (j, n, m) = ::zernike::jnm(n_radial_order as u32);
    let jnm: Vec<_> = j
        .into_iter()
        .zip(n.into_iter())
        .zip(m.into_iter())
        .map(|((j, n), m)| (j, n, m))
        .collect();
    modes
        .iter()
        .map(|&mode| {
            jnm.iter()
                .find(|(j, _, _)| *j as usize == mode)
                .cloned()
                .ok_or_else(|| {
                    OttError::SelectionMismatch(format!("Zernike mode {mode} is out of range"))
                })
        })
        .collect()
}

/// Noll normalized Zernike basis over the valid pixels of an image
#[derive(Debug, Default, Clone, Copy)]
pub struct Zernike;

impl Zernike {
    /// Returns the basis matrix, one row per valid pixel (column-major) and one column per mode
    pub fn basis(&self, image: &MaskedImage, modes: &[usize]) -> Result<DMatrix<f64>> {
        let jnm = noll_nm(modes)?;
        let pixels: Vec<_> = image.valid().map(|(i, j, _)| (i as f64, j as f64)).collect();
        if pixels.len() < modes.len() {
            return Err(OttError::EmptyPupil {
                n_mode: modes.len(),
                n_pixel: pixels.len(),
            });
        }
        let (i_min, i_max, j_min, j_max) = pixels.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), &(i, j)| (a.min(i), b.max(i), c.min(j), d.max(j)),
        );
        let (yc, xc) = (0.5 * (i_min + i_max), 0.5 * (j_min + j_max));
        let radius = match 0.5 * (i_max - i_min).max(j_max - j_min) {
            r if r > 0. => r,
            _ => 1.,
        };
        log::debug!(
            "Zernike pupil: center=({:.1},{:.1}), radius={:.1}px",
            xc,
            yc,
            radius
        );
        let polar: Vec<_> = pixels
            .iter()
            .map(|&(i, j)| {
                let x = (j - xc) / radius;
                let y = (i - yc) / radius;
                (x.hypot(y), y.atan2(x))
            })
            .collect();
        Ok(DMatrix::from_fn(polar.len(), modes.len(), |k, l| {
            let (r, o) = polar[k];
            let (j, n, m) = jnm[l];
            ::zernike::zernike(j, n, m, r, o)
        }))
    }
}

impl ZernikeFit for Zernike {
    fn fit(&self, image: &MaskedImage, modes: &[usize]) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let basis = self.basis(image, modes)?;
        let data = DVector::from_vec(image.compressed());
        let svd = basis.clone().svd(true, true);
        let tol = svd.singular_values.max() * basis.nrows().max(basis.ncols()) as f64 * f64::EPSILON;
        let coefficients = svd
            .solve(&data, tol)
            .map_err(|msg| OttError::PseudoInverse(msg.to_string()))?;
        Ok((coefficients, basis))
    }

    fn surface(
        &self,
        image: &MaskedImage,
        coefficients: &DVector<f64>,
        basis: &DMatrix<f64>,
    ) -> Result<MaskedImage> {
        if basis.nrows() != image.area() || basis.ncols() != coefficients.len() {
            return Err(OttError::shape(
                "Zernike surface",
                format!("({}, {})", image.area(), coefficients.len()),
                format!("{:?}", basis.shape()),
            ));
        }
        let values = basis * coefficients;
        let (nrows, ncols) = image.shape();
        let mut data = DMatrix::<f64>::zeros(nrows, ncols);
        image
            .valid()
            .zip(values.iter())
            .for_each(|((i, j, _), v)| data[(i, j)] = *v);
        MaskedImage::new(data, image.mask.clone())
    }
}

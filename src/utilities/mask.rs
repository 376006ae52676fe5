use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{OttError, Result};

/// A 2D boolean mask, `true` flags an invalid pixel
pub type Mask = DMatrix<bool>;

/// A 2D image with a mask of invalid pixels
///
/// The mask follows the interferometer convention: `true` marks a pixel
/// without a valid measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedImage {
    pub data: DMatrix<f64>,
    pub mask: Mask,
}

impl MaskedImage {
    /// Creates a new masked image
    ///
    /// Fails with [OttError::MaskShapeMismatch] if data and mask shapes differ
    pub fn new(data: DMatrix<f64>, mask: Mask) -> Result<Self> {
        if data.shape() != mask.shape() {
            return Err(OttError::MaskShapeMismatch {
                mask: mask.shape(),
                image: data.shape(),
            });
        }
        Ok(Self { data, mask })
    }
    /// Creates an image with all pixels valid
    pub fn unmasked(data: DMatrix<f64>) -> Self {
        let (nrows, ncols) = data.shape();
        Self {
            data,
            mask: Mask::from_element(nrows, ncols, false),
        }
    }
    /// Returns the number of rows and columns
    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }
    /// Returns the number of valid pixels
    pub fn area(&self) -> usize {
        self.mask.iter().filter(|m| !**m).count()
    }
    /// Returns a copy of the image where the mask is the union of its own mask with `other`
    pub fn mask_or(&self, other: &Mask) -> Result<Self> {
        if self.mask.shape() != other.shape() {
            return Err(OttError::MaskShapeMismatch {
                mask: other.shape(),
                image: self.shape(),
            });
        }
        Ok(Self {
            data: self.data.clone(),
            mask: self.mask.zip_map(other, |a, b| a || b),
        })
    }
    /// Iterates over the valid pixels as `(row, column, value)`
    pub fn valid(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let nrows = self.data.nrows();
        self.data
            .iter()
            .zip(self.mask.iter())
            .enumerate()
            .filter(|(_, (_, m))| !**m)
            .map(move |(k, (v, _))| (k % nrows, k / nrows, *v))
    }
    /// Returns the valid pixel values in column-major order
    pub fn compressed(&self) -> Vec<f64> {
        MaskFilter::filter(&self.mask, self.data.iter())
            .cloned()
            .collect()
    }
    /// Averages a set of frames
    ///
    /// A pixel is invalid in the average if it is invalid in any frame
    pub fn mean(frames: &[MaskedImage]) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(OttError::shape("frame average", "at least 1 frame", 0));
        };
        let shape = first.shape();
        let mut data = DMatrix::<f64>::zeros(shape.0, shape.1);
        let mut mask = Mask::from_element(shape.0, shape.1, false);
        for frame in frames {
            if frame.shape() != shape {
                return Err(OttError::shape(
                    "frame average",
                    format!("{:?}", shape),
                    format!("{:?}", frame.shape()),
                ));
            }
            data += &frame.data;
            mask.zip_apply(&frame.mask, |a, b| *a |= b);
        }
        data /= frames.len() as f64;
        Ok(Self { data, mask })
    }
    /// Writes the image into a pickle file
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::tracking::dump(path, self)
    }
    /// Reads the image from a pickle file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::tracking::load(path)
    }
}

// Apply a mask to an iterator and filter out elements where the mask flags an invalid pixel
//
// If using several masks, a pixel is kept only if it is valid in all the masks
pub trait MaskFilter {
    /// Filters out the values in the iterator according to the mask
    fn filter<'a, T: 'a + ?Sized>(
        self,
        data: impl Iterator<Item = &'a T>,
    ) -> impl Iterator<Item = &'a T>;
}
impl MaskFilter for &Mask {
    fn filter<'a, T: 'a + ?Sized>(
        self,
        data: impl Iterator<Item = &'a T>,
    ) -> impl Iterator<Item = &'a T> {
        data.zip(self.iter())
            .filter(|(_, m)| !**m)
            .map(|(data, _)| data)
    }
}
impl MaskFilter for (&Mask, &Mask) {
    fn filter<'a, T: 'a + ?Sized>(
        self,
        data: impl Iterator<Item = &'a T>,
    ) -> impl Iterator<Item = &'a T> {
        data.zip(self.0.iter().zip(self.1.iter()))
            .filter(|(_, (m, mo))| !**m && !**mo)
            .map(|(data, _)| data)
    }
}

/// Creates a circular pupil mask of radius `radius` pixels centered in a `size`x`size` frame
pub fn circular_pupil(size: usize, radius: f64) -> Mask {
    let c = (size as f64 - 1.) * 0.5;
    Mask::from_fn(size, size, |i, j| {
        let x = j as f64 - c;
        let y = i as f64 - c;
        x.hypot(y) > radius
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_frames() {
        let mut a = MaskedImage::unmasked(DMatrix::from_element(2, 2, 1.));
        let b = MaskedImage::unmasked(DMatrix::from_element(2, 2, 3.));
        a.mask[(0, 1)] = true;
        let m = MaskedImage::mean(&[a, b]).unwrap();
        assert_eq!(m.data, DMatrix::from_element(2, 2, 2.));
        assert_eq!(m.area(), 3);
        assert!(m.mask[(0, 1)]);
    }

    #[test]
    fn mask_or() {
        let image = MaskedImage::new(
            DMatrix::from_row_slice(2, 2, &[1., 2., 3., 4.]),
            Mask::from_row_slice(2, 2, &[false, true, false, false]),
        )
        .unwrap();
        let roi = Mask::from_row_slice(2, 2, &[false, false, false, true]);
        let masked = image.mask_or(&roi).unwrap();
        assert_eq!(masked.compressed(), vec![1., 3.]);
        assert!(matches!(
            image.mask_or(&Mask::from_element(3, 3, false)),
            Err(OttError::MaskShapeMismatch { .. })
        ));
    }

    #[test]
    fn pupil() {
        let pupil = circular_pupil(11, 5.);
        assert!(!pupil[(5, 5)]);
        assert!(pupil[(0, 0)]);
        assert!(!pupil[(0, 5)]);
    }
}

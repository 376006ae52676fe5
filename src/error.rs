use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum OttError {
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: String,
        found: String,
    },
    #[error("index {0} appears more than once in the modes vector")]
    DuplicateIndex(usize),
    #[error("invalid push-pull template {0:?}, expected a non-empty sequence of 1 and -1")]
    InvalidTemplate(Vec<i32>),
    #[error("amplitude {value} of mode {index} is not a finite non-zero number")]
    InvalidAmplitude { index: usize, value: f64 },
    #[error("tracking folder {0} already exists")]
    FolderExists(PathBuf),
    #[error("incomplete acquisition {tt}: expected {expected} frames, found {found}")]
    IncompleteAcquisition {
        tt: String,
        expected: usize,
        found: usize,
    },
    #[error("mask shape {mask:?} does not match image shape {image:?}")]
    MaskShapeMismatch {
        mask: (usize, usize),
        image: (usize, usize),
    },
    #[error("unsupported calibration target: {0}")]
    UnsupportedTarget(String),
    #[error("selection mismatch: {0}")]
    SelectionMismatch(String),
    #[error("cannot fit {n_mode} modes over {n_pixel} valid pixels")]
    EmptyPupil { n_mode: usize, n_pixel: usize },
    #[error("pseudo-inverse: {0}")]
    PseudoInverse(String),
    #[error("I/O failure on {1}")]
    Io(#[source] std::io::Error, PathBuf),
    #[error("cannot (de)serialize {1}")]
    Pickle(#[source] serde_pickle::Error, PathBuf),
    #[error("configuration error")]
    Config(#[from] ConfigError),
    #[error("device failure: {0}")]
    Device(String),
}

impl OttError {
    pub(crate) fn check_amplitude(modes: &[usize], amplitude: &[f64]) -> Result<(), Self> {
        match modes
            .iter()
            .zip(amplitude)
            .find(|(_, a)| !a.is_finite() || **a == 0.)
        {
            Some((&index, &value)) => Err(Self::InvalidAmplitude { index, value }),
            None => Ok(()),
        }
    }
    pub(crate) fn shape<C, E, F>(context: C, expected: E, found: F) -> Self
    where
        C: Into<String>,
        E: ToString,
        F: ToString,
    {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

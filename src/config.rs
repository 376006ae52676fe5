//! Tower configuration
//!
//! [OttConfig] is loaded once from a TOML file and passed by reference to every
//! component that reads or writes tracking folders or needs the tower geometry.
//!
//! ```
//! use ottcal::OttConfig;
//! let config = OttConfig::default().base_path("/tmp/ott");
//! assert_eq!(config.calibration_root(), std::path::PathBuf::from("/tmp/ott/Calibration"));
//! ```

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open `::ottcal::OttConfig` toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create `::ottcal::OttConfig` toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read `::ottcal::OttConfig` toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write `::ottcal::OttConfig` toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize `::ottcal::OttConfig` from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize `::ottcal::OttConfig` into toml")]
    Save(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Data folders, all relative to `base`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folders {
    pub base: PathBuf,
    pub iff_functions: String,
    pub calibration: String,
    pub alignment: String,
    pub modes_vector: String,
    pub modal_base: String,
    pub modal_amplitude: String,
}
impl Default for Folders {
    fn default() -> Self {
        Self {
            base: PathBuf::from("OTTData"),
            iff_functions: "IFFunctions".into(),
            calibration: "Calibration".into(),
            alignment: "Alignment".into(),
            modes_vector: "ModesVector".into(),
            modal_base: "ModalBase".into(),
            modal_amplitude: "ModalAmplitude".into(),
        }
    }
}

/// Tower geometry
///
/// Default properties:
///  - simulated               : true
///  - parabola DOF            : [2, 3, 4] (piston, tip, tilt)
///  - reference mirror DOF    : [3, 4] (tip, tilt)
///  - DOF per positioner      : 6
///  - PAR to RM coupling      : -2.05
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    pub simulated: bool,
    pub parabola_dof: Vec<usize>,
    pub reference_mirror_dof: Vec<usize>,
    pub n_dof_per_group: usize,
    pub par_rm_coupling: f64,
}
impl Default for Tower {
    fn default() -> Self {
        Self {
            simulated: true,
            parabola_dof: vec![2, 3, 4],
            reference_mirror_dof: vec![3, 4],
            n_dof_per_group: 6,
            par_rm_coupling: -2.05,
        }
    }
}
impl Tower {
    /// Returns the parabola DOF followed by the reference mirror DOF
    pub fn dof_index(&self) -> Vec<usize> {
        self.parabola_dof
            .iter()
            .chain(&self.reference_mirror_dof)
            .cloned()
            .collect()
    }
    /// Total number of commanded DOF over the parabola and the reference mirror
    pub fn n_dof(&self) -> usize {
        self.parabola_dof.len() + self.reference_mirror_dof.len()
    }
}

/// Wavefront analysis settings
///
/// `zernike_modes` are the Noll indices of the fitted basis and
/// `sensed_coefficients` the positions, in the fitted coefficients, of the
/// modes used for calibration and alignment (tip, tilt, focus and comas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub zernike_modes: Vec<usize>,
    pub sensed_coefficients: Vec<usize>,
    pub roi: Option<usize>,
}
impl Default for Alignment {
    fn default() -> Self {
        Self {
            zernike_modes: (1..=10).collect(),
            sensed_coefficients: vec![1, 2, 3, 6, 7],
            roi: None,
        }
    }
}
impl Alignment {
    /// Noll indices of the sensed modes
    pub fn sensed_modes(&self) -> Vec<usize> {
        self.sensed_coefficients
            .iter()
            .map(|&i| self.zernike_modes[i])
            .collect()
    }
}

/// Optical Test Tower configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OttConfig {
    pub folders: Folders,
    pub tower: Tower,
    pub alignment: Alignment,
}

impl OttConfig {
    /// Loads and validates the configuration from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file =
            File::open(&path).map_err(|e| ConfigError::Open(e, path.as_ref().to_path_buf()))?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)
            .map_err(|e| ConfigError::Read(e, path.as_ref().to_path_buf()))?;
        let config: OttConfig = toml::from_str(&toml)?;
        config.validate()?;
        log::info!("OTT configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }
    /// Saves the configuration to a toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)?;
        let mut file = File::create(&path)
            .map_err(|e| ConfigError::Create(e, path.as_ref().to_path_buf()))?;
        write!(file, "# ::ottcal::OttConfig\n\n{}", toml)
            .map_err(|e| ConfigError::Write(e, path.as_ref().to_path_buf()))?;
        Ok(())
    }
    /// Checks the consistency of the tower geometry and of the wavefront analysis settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.tower.n_dof_per_group;
        if let Some(i) = self
            .tower
            .dof_index()
            .into_iter()
            .find(|&i| i >= n)
        {
            return Err(ConfigError::Invalid(format!(
                "DOF index {i} is out of range for {n} DOF per positioner"
            )));
        }
        let n_z = self.alignment.zernike_modes.len();
        if let Some(i) = self
            .alignment
            .sensed_coefficients
            .iter()
            .find(|&&i| i >= n_z)
        {
            return Err(ConfigError::Invalid(format!(
                "sensed coefficient {i} is out of range for {n_z} fitted modes"
            )));
        }
        if self.alignment.zernike_modes.contains(&0) {
            return Err(ConfigError::Invalid(
                "Zernike modes are Noll indices starting at 1".into(),
            ));
        }
        Ok(())
    }
    /// Sets the data base path
    pub fn base_path<P: Into<PathBuf>>(mut self, base: P) -> Self {
        self.folders.base = base.into();
        self
    }
    /// Sets the region of interest used for alignment
    pub fn alignment_roi(mut self, roi: Option<usize>) -> Self {
        self.alignment.roi = roi;
        self
    }
    pub fn iff_root(&self) -> PathBuf {
        self.folders.base.join(&self.folders.iff_functions)
    }
    pub fn calibration_root(&self) -> PathBuf {
        self.folders.base.join(&self.folders.calibration)
    }
    pub fn alignment_root(&self) -> PathBuf {
        self.folders.base.join(&self.folders.alignment)
    }
    pub fn modes_vector_root(&self) -> PathBuf {
        self.folders.base.join(&self.folders.modes_vector)
    }
    pub fn modal_base_root(&self) -> PathBuf {
        self.folders.base.join(&self.folders.modal_base)
    }
    pub fn modal_amplitude_root(&self) -> PathBuf {
        self.folders.base.join(&self.folders.modal_amplitude)
    }
}

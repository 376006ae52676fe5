use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use super::{Calibration, Target};
use crate::{
    iff::{frame_name, IffInfo},
    tracking::{TrackingNumber, TtFolder},
    utilities::{Mask, MaskedImage},
    zernike::{Zernike, ZernikeFit},
    OttConfig, OttError, Result,
};

/// Calibration builder
///
/// Reduces the frames of an influence functions acquisition into an interaction matrix.
/// Each frame is decomposed on the configured Zernike modes over the union of
/// its own mask with the pupil mask, and the response of each DOF is the
/// template weighted average of its push-pull frames, divided by the DOF amplitude
/// and averaged over the repetitions.
#[derive(Debug, Clone)]
pub struct CalibrationBuilder {
    who: Target,
    mask: Mask,
    command_matrix: Option<DMatrix<f64>>,
}

impl CalibrationBuilder {
    pub fn new(who: Target, mask: Mask) -> Self {
        Self {
            who,
            mask,
            command_matrix: None,
        }
    }
    /// Sets the command matrix for acquisition records that do not store it
    pub fn command_matrix(self, command_matrix: DMatrix<f64>) -> Self {
        Self {
            command_matrix: Some(command_matrix),
            ..self
        }
    }
    /// Reads the frames of the acquisition `tt`
    ///
    /// Fails with [OttError::IncompleteAcquisition] if the folder holds fewer frames than commands
    pub fn frames(
        config: &OttConfig,
        tt: &TrackingNumber,
    ) -> Result<(IffInfo, Vec<MaskedImage>)> {
        let info = IffInfo::load(config, tt)?;
        let folder = TtFolder::open(config.iff_root(), tt.clone())?;
        let expected = info.n_expected_frames();
        let found = (0..expected)
            .take_while(|&k| folder.join(frame_name(k)).is_file())
            .count();
        if found < expected {
            return Err(OttError::IncompleteAcquisition {
                tt: tt.to_string(),
                expected,
                found,
            });
        }
        let frames = (0..expected)
            .map(|k| MaskedImage::load(folder.join(frame_name(k))))
            .collect::<Result<Vec<_>>>()?;
        Ok((info, frames))
    }
    /// Reduces the frames of an acquisition into a calibration
    ///
    /// The calibration is not saved
    pub fn reduce(
        self,
        config: &OttConfig,
        info: &IffInfo,
        frames: &[MaskedImage],
        tt_acquisition: Option<TrackingNumber>,
    ) -> Result<Calibration> {
        config.validate()?;
        let expected = info.n_expected_frames();
        if frames.len() < expected {
            return Err(OttError::IncompleteAcquisition {
                tt: tt_acquisition.map_or("live".to_string(), |tt| tt.to_string()),
                expected,
                found: frames.len(),
            });
        }
        let n_mode = info.modes_vector.len();
        if n_mode == 0 {
            return Err(OttError::shape("acquisition modes vector length", ">0", 0));
        }
        if info.amplitude.len() != n_mode {
            return Err(OttError::shape(
                "amplitude vector length",
                n_mode,
                info.amplitude.len(),
            ));
        }
        OttError::check_amplitude(&info.modes_vector, &info.amplitude)?;
        let positions = info.positions();
        for (row, indices) in positions.iter().zip(&info.indexing_list) {
            if row.len() != indices.len() {
                return Err(OttError::shape(
                    "positions of the indexing list in the modes vector",
                    indices.len(),
                    row.len(),
                ));
            }
            if let Some(&k) = row.iter().find(|&&k| k >= n_mode) {
                return Err(OttError::shape(
                    "position in the modes vector",
                    format!("position < {n_mode}"),
                    k,
                ));
            }
        }
        let command_matrix = match (self.command_matrix, &info.command_matrix) {
            (Some(c), _) => c,
            (None, Some(c)) => c.clone(),
            (None, None) => {
                return Err(OttError::shape(
                    "acquisition command matrix",
                    "a command matrix",
                    "none",
                ))
            }
        };
        if let Some(&j) = info
            .modes_vector
            .iter()
            .find(|&&j| j >= command_matrix.ncols())
        {
            return Err(OttError::shape(
                "command matrix columns",
                format!("index < {}", command_matrix.ncols()),
                j,
            ));
        }

        let modes = &config.alignment.zernike_modes;
        let sensed = &config.alignment.sensed_coefficients;
        let mask = &self.mask;
        log::info!(
            "fitting {} Zernike modes to {} frames",
            modes.len(),
            frames.len()
        );
        let coefficients = frames[..expected]
            .par_iter()
            .map(|frame| -> Result<DVector<f64>> {
                let (z, _) = Zernike.fit(&frame.mask_or(mask)?, modes)?;
                Ok(DVector::from_iterator(
                    sensed.len(),
                    sensed.iter().map(|&i| z[i]),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let template: Vec<f64> = info.template.iter().map(|&t| t as f64).collect();
        let weight: f64 = template.iter().map(|t| t.abs()).sum();
        let n_template = template.len();
        let n_push_pull = info.indexing_list.len();
        let mut interaction_matrix = DMatrix::<f64>::zeros(sensed.len(), n_mode);
        for (r, block) in positions.iter().enumerate() {
            for (i, &k) in block.iter().enumerate() {
                let start = (r * block.len() + i) * n_template;
                let response = template
                    .iter()
                    .zip(&coefficients[start..start + n_template])
                    .fold(DVector::<f64>::zeros(sensed.len()), |a, (t, z)| a + z * *t)
                    / (weight * info.amplitude[k] * n_push_pull as f64);
                let mut column = interaction_matrix.column_mut(k);
                column += response;
            }
        }
        let command_matrix = command_matrix.select_columns(&info.modes_vector);
        log::info!(
            "{} interaction matrix: {}x{}",
            self.who,
            interaction_matrix.nrows(),
            interaction_matrix.ncols()
        );
        Calibration::new(
            self.who,
            TrackingNumber::now(),
            tt_acquisition,
            self.mask,
            interaction_matrix,
            command_matrix,
        )
    }
    /// Reduces the acquisition `tt` into a calibration and saves it
    pub fn build(self, config: &OttConfig, tt: &TrackingNumber) -> Result<Calibration> {
        let (info, frames) = Self::frames(config, tt)?;
        let calibration = self.reduce(config, &info, &frames, Some(tt.clone()))?;
        calibration.save(config)?;
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command_history::CommandHistory,
        utilities::circular_pupil,
    };

    // frames of a linear model where DOF j adds `gain[j]` of Noll mode `noll[j]`
    fn synthetic_frames(
        history: &CommandHistory,
        noll: &[usize],
        gain: &[f64],
        mask: &Mask,
    ) -> Vec<MaskedImage> {
        let blank = MaskedImage::new(DMatrix::zeros(mask.nrows(), mask.ncols()), mask.clone())
            .unwrap();
        let modes: Vec<usize> = (1..=10).collect();
        let basis = Zernike.basis(&blank, &modes).unwrap();
        history
            .commands()
            .map(|command| {
                let mut z = DVector::<f64>::zeros(10);
                for (j, c) in command.iter().enumerate() {
                    z[noll[j] - 1] += gain[j] * c;
                }
                Zernike.surface(&blank, &z, &basis).unwrap()
            })
            .collect()
    }

    fn info(history: &CommandHistory, amplitude: Vec<f64>, modes: Vec<usize>) -> IffInfo {
        IffInfo {
            who: "PAR + RM".into(),
            tt_cmd_history: history.tracking_number().clone(),
            modes_vector_tag: None,
            cmd_matrix_tag: None,
            amplitude_tag: None,
            n_push_pull: history.n_push_pull(),
            indexing_list: history.indexing_list().clone(),
            positions: history.positions().clone(),
            template: history.template().to_vec(),
            modes_vector: modes,
            amplitude,
            command_matrix: Some(DMatrix::identity(5, 5)),
            n_frames: 1,
            zonal: true,
        }
    }

    #[test]
    fn diagonal_response() {
        let config = OttConfig::default();
        let mask = circular_pupil(48, 22.);
        let modes = vec![0, 1, 2, 3, 4];
        let amplitude = vec![1., 2., 0.5, 1., 4.];
        let history = CommandHistory::builder(modes.clone(), amplitude.clone(), DMatrix::identity(5, 5))
            .n_push_pull(2)
            .shuffle(true)
            .build()
            .unwrap();
        let gain = [3e-8, -1e-8, 2e-8, 5e-9, 1e-8];
        let frames = synthetic_frames(&history, &[2, 3, 4, 7, 8], &gain, &mask);
        let info = info(&history, amplitude, modes);
        let calibration = Calibration::builder("PAR + RM", mask)
            .reduce(&config, &info, &frames, None)
            .unwrap();
        let expected = DMatrix::from_diagonal(&DVector::from_column_slice(&gain));
        assert!((calibration.interaction_matrix() - expected).abs().max() < 1e-18);
        assert_eq!(calibration.command_matrix(), &DMatrix::identity(5, 5));
    }

    #[test]
    fn partial_acquisition() {
        let config = OttConfig::default();
        let mask = circular_pupil(32, 15.);
        let history = CommandHistory::builder(vec![0, 1], vec![1., 1.], DMatrix::identity(5, 5))
            .build()
            .unwrap();
        let frames = synthetic_frames(&history, &[2, 3, 4, 7, 8], &[1e-8; 5], &mask);
        let info = info(&history, vec![1., 1.], vec![0, 1]);
        assert!(matches!(
            Calibration::builder("PAR + RM", mask.clone()).reduce(&config, &info, &frames[..3], None),
            Err(OttError::IncompleteAcquisition {
                expected: 4,
                found: 3,
                ..
            })
        ));
        assert!(matches!(
            Calibration::builder("PAR + RM", circular_pupil(16, 7.))
                .reduce(&config, &info, &frames, None),
            Err(OttError::MaskShapeMismatch { .. })
        ));
    }

    #[test]
    fn missing_modes_vector() {
        let config = OttConfig::default();
        let mask = circular_pupil(32, 15.);
        let history = CommandHistory::builder(vec![0, 1, 2], vec![1.; 3], DMatrix::identity(5, 5))
            .build()
            .unwrap();
        let frames = synthetic_frames(&history, &[2, 3, 4, 7, 8], &[1e-8; 5], &mask);
        let mut info = info(&history, vec![], vec![]);
        info.positions = vec![];
        assert!(matches!(
            Calibration::builder("PAR + RM", mask.clone()).reduce(&config, &info, &frames, None),
            Err(OttError::ShapeMismatch { .. })
        ));

        let mut info = self::info(&history, vec![1.; 2], vec![0, 1]);
        info.positions = vec![];
        assert!(matches!(
            Calibration::builder("PAR + RM", mask).reduce(&config, &info, &frames, None),
            Err(OttError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn zero_amplitude() {
        let config = OttConfig::default();
        let mask = circular_pupil(32, 15.);
        let history = CommandHistory::builder(vec![0, 1], vec![1., 1.], DMatrix::identity(5, 5))
            .build()
            .unwrap();
        let frames = synthetic_frames(&history, &[2, 3, 4, 7, 8], &[1e-8; 5], &mask);
        let info = info(&history, vec![0., 1.], vec![0, 1]);
        assert!(matches!(
            Calibration::builder("PAR + RM", mask).reduce(&config, &info, &frames, None),
            Err(OttError::InvalidAmplitude { index: 0, .. })
        ));
    }

    #[test]
    fn invalid_sensed_coefficients() {
        let mut config = OttConfig::default();
        config.alignment.sensed_coefficients = vec![1, 2, 30];
        let mask = circular_pupil(32, 15.);
        let history = CommandHistory::builder(vec![0, 1], vec![1., 1.], DMatrix::identity(5, 5))
            .build()
            .unwrap();
        let frames = synthetic_frames(&history, &[2, 3, 4, 7, 8], &[1e-8; 5], &mask);
        let info = info(&history, vec![1., 1.], vec![0, 1]);
        assert!(matches!(
            Calibration::builder("PAR + RM", mask).reduce(&config, &info, &frames, None),
            Err(OttError::Config(_))
        ));
    }
}

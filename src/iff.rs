//! Influence functions acquisition
//!
//! The acquisition applies, one after the other, the commands of a
//! [CommandHistory] to an [Actuate] device and records a frame of the
//! [Interferometer] after each command.
//! Every frame and the [IffInfo] record are written into a new tracking folder
//! of the influence functions root folder.

use std::path::Path;

use indicatif::ProgressBar;
use nalgebra::DMatrix;
use serde::de::DeserializeOwned;

use crate::{
    command_history::{CommandHistory, Order},
    devices::{Actuate, Interferometer},
    tracking::{TrackingNumber, TtFolder},
    OttConfig, OttError, Result,
};

mod info;
pub use info::IffInfo;

/// An input given either by value or by the tag of a stored artifact
#[derive(Debug, Clone, PartialEq)]
pub enum Input<T> {
    Value(T),
    Tag(String),
}
impl<T> Input<T> {
    pub fn tag<S: Into<String>>(tag: S) -> Self {
        Self::Tag(tag.into())
    }
}
impl<T: DeserializeOwned> Input<T> {
    /// Returns the value and its tag
    ///
    /// A tag resolves to the pickle file `<root>/<tag>.pkl`
    pub fn resolve<P: AsRef<Path>>(self, root: P) -> Result<(T, Option<String>)> {
        match self {
            Input::Value(value) => Ok((value, None)),
            Input::Tag(tag) => {
                let value = crate::tracking::load(root.as_ref().join(format!("{tag}.pkl")))?;
                Ok((value, Some(tag)))
            }
        }
    }
}
impl<T> From<T> for Input<T> {
    fn from(value: T) -> Self {
        Input::Value(value)
    }
}

/// Classifies a command matrix as zonal
///
/// The matrix is padded with zero columns up to its number of rows and it is
/// zonal if all the off-diagonal elements are exactly zero, modal otherwise.
pub fn is_zonal(command_matrix: &DMatrix<f64>) -> bool {
    let (nrows, ncols) = command_matrix.shape();
    let padded = if nrows > ncols {
        command_matrix.clone().resize_horizontally(nrows, 0.)
    } else {
        command_matrix.clone()
    };
    let n_off_diagonal = padded
        .column_iter()
        .enumerate()
        .map(|(j, column)| {
            column
                .iter()
                .enumerate()
                .filter(|&(i, v)| i != j && *v != 0.)
                .count()
        })
        .sum::<usize>();
    n_off_diagonal == 0
}

/// Name of the k<sup>th</sup> frame of an acquisition
pub fn frame_name(k: usize) -> String {
    format!("frame_{:04}.pkl", k)
}

/// [IffAcquisition] builder
///
/// Default properties:
///  - who                   : "PAR + RM"
///  - push-pull repetitions : 1
///  - template              : [1, -1]
///  - order                 : [Order::Tidy]
///  - frames per command    : 1
#[derive(Debug, Clone)]
pub struct IffAcquisitionBuilder {
    who: String,
    modes: Input<Vec<usize>>,
    amplitude: Input<Vec<f64>>,
    command_matrix: Input<DMatrix<f64>>,
    n_push_pull: usize,
    template: Option<Vec<i32>>,
    order: Order,
    n_frames: usize,
}
impl IffAcquisitionBuilder {
    /// Sets the tag of the actuated element
    pub fn who<S: Into<String>>(self, who: S) -> Self {
        Self {
            who: who.into(),
            ..self
        }
    }
    pub fn n_push_pull(self, n_push_pull: usize) -> Self {
        Self {
            n_push_pull,
            ..self
        }
    }
    pub fn template(self, template: Vec<i32>) -> Self {
        Self {
            template: Some(template),
            ..self
        }
    }
    pub fn shuffle(self, shuffle: bool) -> Self {
        Self {
            order: if shuffle { Order::Shuffle } else { Order::Tidy },
            ..self
        }
    }
    /// Sets the number of frames averaged by the interferometer after each command
    pub fn n_frames(self, n_frames: usize) -> Self {
        Self { n_frames, ..self }
    }
    /// Resolves the inputs and builds the command history
    pub fn build(self, config: &OttConfig) -> Result<IffAcquisition> {
        let (modes_vector, modes_vector_tag) = self.modes.resolve(config.modes_vector_root())?;
        let (amplitude, amplitude_tag) = self.amplitude.resolve(config.modal_amplitude_root())?;
        let (command_matrix, cmd_matrix_tag) =
            self.command_matrix.resolve(config.modal_base_root())?;
        let mut builder =
            CommandHistory::builder(modes_vector.clone(), amplitude.clone(), command_matrix.clone())
                .n_push_pull(self.n_push_pull)
                .order(self.order);
        if let Some(template) = self.template {
            builder = builder.template(template);
        }
        let history = builder.build()?;
        Ok(IffAcquisition {
            info: IffInfo {
                who: self.who,
                tt_cmd_history: history.tracking_number().clone(),
                modes_vector_tag,
                cmd_matrix_tag,
                amplitude_tag,
                n_push_pull: history.n_push_pull(),
                indexing_list: history.indexing_list().clone(),
                positions: history.positions().clone(),
                template: history.template().to_vec(),
                modes_vector,
                amplitude,
                zonal: is_zonal(&command_matrix),
                command_matrix: Some(command_matrix),
                n_frames: self.n_frames,
            },
            history,
        })
    }
}

/// Influence functions acquisition
#[derive(Debug, Clone)]
pub struct IffAcquisition {
    info: IffInfo,
    history: CommandHistory,
}
impl IffAcquisition {
    pub fn builder<M, A, C>(modes: M, amplitude: A, command_matrix: C) -> IffAcquisitionBuilder
    where
        M: Into<Input<Vec<usize>>>,
        A: Into<Input<Vec<f64>>>,
        C: Into<Input<DMatrix<f64>>>,
    {
        IffAcquisitionBuilder {
            who: crate::calibration::Target::ParRm.to_string(),
            modes: modes.into(),
            amplitude: amplitude.into(),
            command_matrix: command_matrix.into(),
            n_push_pull: 1,
            template: None,
            order: Order::Tidy,
            n_frames: 1,
        }
    }
    pub fn info(&self) -> &IffInfo {
        &self.info
    }
    pub fn history(&self) -> &CommandHistory {
        &self.history
    }
    /// Runs the acquisition and returns its tracking number
    ///
    /// A frame is acquired after each command of the history, once the command is completed.
    /// The device is sent back to its starting point at the end.
    pub fn acquire(
        &self,
        config: &OttConfig,
        actuator: &mut dyn Actuate,
        interferometer: &mut dyn Interferometer,
    ) -> Result<TrackingNumber> {
        if actuator.n_actuator() != self.history.n_actuator() {
            return Err(OttError::shape(
                "actuator count",
                self.history.n_actuator(),
                actuator.n_actuator(),
            ));
        }
        let folder = TtFolder::create(config.iff_root())?;
        let tt = folder.tracking_number().clone();
        if self.info.zonal {
            log::info!("measurement of zonal influence functions of {}: {}", self.info.who, tt);
        } else {
            log::info!("measurement of modal influence functions of {}: {}", self.info.who, tt);
        }
        self.info.save(&folder)?;
        folder.dump("cmd_history.pkl", self.history.matrix())?;

        let pb = ProgressBar::new(self.history.n_command() as u64);
        for (k, command) in self.history.commands().enumerate() {
            let command: Vec<f64> = command.iter().cloned().collect();
            actuator.apply(&command)?;
            let frame = interferometer.acquire(self.info.n_frames)?;
            interferometer.save(folder.path(), &frame_name(k), &frame)?;
            pb.inc(1);
        }
        pb.finish();
        let n_actuator = actuator.n_actuator();
        actuator.apply(&vec![0f64; n_actuator])?;
        log::info!(
            "{} influence function frames written to {:?}",
            self.history.n_command(),
            folder.path()
        );
        Ok(tt)
    }
}

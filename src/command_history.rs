//! Push-pull command history
//!
//! A command history is the ordered sequence of actuator commands applied
//! during an influence function acquisition. It is built from a vector of
//! mode (or actuator) indices, the amplitude of each mode, a command matrix
//! (one column per mode) and a push-pull template, repeated `n_push_pull` times.
//!
//! ```
//! use ottcal::command_history::CommandHistory;
//! use nalgebra::DMatrix;
//!
//! let history = CommandHistory::builder(vec![0, 1, 2], vec![1.; 3], DMatrix::identity(3, 3))
//!     .n_push_pull(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(history.n_command(), 12);
//! assert_eq!(history.indexing_list(), &vec![vec![0, 1, 2], vec![0, 1, 2]]);
//! ```

use nalgebra::{DMatrix, DVectorView};
use serde::{Deserialize, Serialize};

use crate::tracking::TrackingNumber;

mod builder;
pub use builder::CommandHistoryBuilder;

/// Order of the modes within each repetition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// the order of the modes vector
    #[default]
    Tidy,
    /// a new random permutation of the modes vector at each repetition
    Shuffle,
}

/// Command history
#[derive(Debug, Clone, PartialEq)]
pub struct CommandHistory {
    matrix: DMatrix<f64>,
    indexing_list: Vec<Vec<usize>>,
    positions: Vec<Vec<usize>>,
    template: Vec<i32>,
    order: Order,
    tt: TrackingNumber,
}

impl CommandHistory {
    /// Creates a command history builder
    pub fn builder(
        modes: Vec<usize>,
        amplitude: Vec<f64>,
        command_matrix: DMatrix<f64>,
    ) -> CommandHistoryBuilder {
        CommandHistoryBuilder::new(modes, amplitude, command_matrix)
    }
    /// The commands, one column per step
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
    /// Iterator over the commands in the order they must be applied
    pub fn commands(&self) -> impl Iterator<Item = DVectorView<'_, f64>> {
        self.matrix.column_iter()
    }
    /// Number of commands
    pub fn n_command(&self) -> usize {
        self.matrix.ncols()
    }
    /// Number of actuators
    pub fn n_actuator(&self) -> usize {
        self.matrix.nrows()
    }
    /// The mode indices in the order they are applied, one row per repetition
    pub fn indexing_list(&self) -> &Vec<Vec<usize>> {
        &self.indexing_list
    }
    /// The positions in the modes vector of the indices in [CommandHistory::indexing_list]
    pub fn positions(&self) -> &Vec<Vec<usize>> {
        &self.positions
    }
    pub fn template(&self) -> &[i32] {
        &self.template
    }
    pub fn n_push_pull(&self) -> usize {
        self.indexing_list.len()
    }
    pub fn order(&self) -> Order {
        self.order
    }
    /// Tracking number given to the history when it was built
    pub fn tracking_number(&self) -> &TrackingNumber {
        &self.tt
    }
}

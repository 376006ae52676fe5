use std::collections::HashSet;

use nalgebra::DMatrix;
use rand::seq::SliceRandom;

use super::{CommandHistory, Order};
use crate::{tracking::TrackingNumber, OttError, Result};

/// Command history builder
///
/// Default properties:
///  - push-pull repetitions : 1
///  - template              : [1, -1]
///  - order                 : [Order::Tidy]
#[derive(Debug, Clone)]
pub struct CommandHistoryBuilder {
    modes: Vec<usize>,
    amplitude: Vec<f64>,
    command_matrix: DMatrix<f64>,
    n_push_pull: usize,
    template: Vec<i32>,
    order: Order,
}

impl CommandHistoryBuilder {
    pub fn new(modes: Vec<usize>, amplitude: Vec<f64>, command_matrix: DMatrix<f64>) -> Self {
        Self {
            modes,
            amplitude,
            command_matrix,
            n_push_pull: 1,
            template: vec![1, -1],
            order: Order::Tidy,
        }
    }
    /// Sets the number of push-pull repetitions
    pub fn n_push_pull(self, n_push_pull: usize) -> Self {
        Self {
            n_push_pull,
            ..self
        }
    }
    /// Sets the push-pull template
    pub fn template(self, template: Vec<i32>) -> Self {
        Self { template, ..self }
    }
    /// Sets the modes order
    pub fn order(self, order: Order) -> Self {
        Self { order, ..self }
    }
    /// Shuffles, or not, the modes at each repetition
    pub fn shuffle(self, shuffle: bool) -> Self {
        self.order(if shuffle { Order::Shuffle } else { Order::Tidy })
    }
    fn validate(&self) -> Result<()> {
        if self.modes.is_empty() {
            return Err(OttError::shape("modes vector length", ">0", 0));
        }
        if self.amplitude.len() != self.modes.len() {
            return Err(OttError::shape(
                "amplitude vector length",
                self.modes.len(),
                self.amplitude.len(),
            ));
        }
        OttError::check_amplitude(&self.modes, &self.amplitude)?;
        let n_col = self.command_matrix.ncols();
        if let Some(&i) = self.modes.iter().find(|&&i| i >= n_col) {
            return Err(OttError::shape(
                "command matrix columns",
                format!("index < {n_col}"),
                i,
            ));
        }
        if self.n_push_pull == 0 {
            return Err(OttError::shape("push-pull repetitions", ">0", 0));
        }
        if self.template.is_empty() || self.template.iter().any(|t| t.abs() != 1) {
            return Err(OttError::InvalidTemplate(self.template.clone()));
        }
        if self.order == Order::Tidy {
            let mut seen = HashSet::new();
            if let Some(&i) = self.modes.iter().find(|&&i| !seen.insert(i)) {
                return Err(OttError::DuplicateIndex(i));
            }
        }
        Ok(())
    }
    /// Builds the command history
    ///
    /// Commands are ordered by repetition, then by mode, then by template entry
    pub fn build(self) -> Result<CommandHistory> {
        self.validate()?;
        let n_mode = self.modes.len();
        let n_template = self.template.len();

        let mut rng = rand::thread_rng();
        let positions: Vec<Vec<usize>> = (0..self.n_push_pull)
            .map(|_| {
                let mut p: Vec<usize> = (0..n_mode).collect();
                if self.order == Order::Shuffle {
                    p.shuffle(&mut rng);
                }
                p
            })
            .collect();
        let indexing_list: Vec<Vec<usize>> = positions
            .iter()
            .map(|p| p.iter().map(|&k| self.modes[k]).collect())
            .collect();

        let mut matrix = DMatrix::<f64>::zeros(
            self.command_matrix.nrows(),
            n_mode * self.n_push_pull * n_template,
        );
        for (r, block) in positions.iter().enumerate() {
            for (i, &k) in block.iter().enumerate() {
                let command = self.command_matrix.column(self.modes[k]) * self.amplitude[k];
                for (t, &s) in self.template.iter().enumerate() {
                    matrix.set_column((r * n_mode + i) * n_template + t, &(&command * s as f64));
                }
            }
        }
        log::info!(
            "command history: {} modes x {} push-pull x {} template = {} commands ({:?})",
            n_mode,
            self.n_push_pull,
            n_template,
            matrix.ncols(),
            self.order
        );
        Ok(CommandHistory {
            matrix,
            indexing_list,
            positions,
            template: self.template,
            order: self.order,
            tt: TrackingNumber::now(),
        })
    }
}

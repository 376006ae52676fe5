use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    tracking::{TrackingNumber, TtFolder},
    OttConfig, Result,
};

fn one() -> usize {
    1
}

/// Influence functions acquisition record
///
/// The record is written as `info.pkl` into the acquisition tracking folder.
/// Records written without the number of push-pull repetitions are read with 1 repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IffInfo {
    /// tag of the actuated element
    pub who: String,
    /// tracking number of the command history
    pub tt_cmd_history: TrackingNumber,
    pub modes_vector_tag: Option<String>,
    pub cmd_matrix_tag: Option<String>,
    pub amplitude_tag: Option<String>,
    #[serde(default = "one")]
    pub n_push_pull: usize,
    /// mode indices in the order they were applied, one row per repetition
    pub indexing_list: Vec<Vec<usize>>,
    /// positions in the modes vector matching the indexing list
    #[serde(default)]
    pub positions: Vec<Vec<usize>>,
    pub template: Vec<i32>,
    #[serde(default)]
    pub modes_vector: Vec<usize>,
    #[serde(default)]
    pub amplitude: Vec<f64>,
    #[serde(default)]
    pub command_matrix: Option<DMatrix<f64>>,
    #[serde(default = "one")]
    pub n_frames: usize,
    #[serde(default)]
    pub zonal: bool,
}

impl IffInfo {
    pub const FILE: &'static str = "info.pkl";
    /// Loads the record of the acquisition `tt`
    pub fn load(config: &OttConfig, tt: &TrackingNumber) -> Result<Self> {
        TtFolder::open(config.iff_root(), tt.clone())?.load(Self::FILE)
    }
    /// Writes the record and its plain text companions into the tracking folder
    pub fn save(&self, folder: &TtFolder) -> Result<()> {
        folder.dump(Self::FILE, self)?;
        let indexing_list = self
            .indexing_list
            .iter()
            .map(|row| {
                row.iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n");
        folder.write_text("indexingList.txt", &indexing_list)?;
        folder.write_text(
            "template.txt",
            &self
                .template
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        )?;
        folder.write_text(
            "more_info.txt",
            &format!("tt_cmdH = {}", self.tt_cmd_history),
        )?;
        let tag = |t: &Option<String>| t.clone().unwrap_or_else(|| "none".into());
        folder.write_text(
            "tag_info.txt",
            &format!(
                "Who = {}, Modes_vector_tag = {}, Cmd_matrix_tag = {}, Amplitude_tag = {}",
                self.who,
                tag(&self.modes_vector_tag),
                tag(&self.cmd_matrix_tag),
                tag(&self.amplitude_tag)
            ),
        )?;
        folder.write_text("n_push_pull.txt", &format!("N_push_pull = {}", self.n_push_pull))?;
        Ok(())
    }
    /// Positions in the modes vector of the indices applied at each repetition
    ///
    /// Records without positions are resolved by looking up each index in the modes vector
    pub fn positions(&self) -> Vec<Vec<usize>> {
        if !self.positions.is_empty() {
            return self.positions.clone();
        }
        self.indexing_list
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|i| self.modes_vector.iter().position(|m| m == i))
                    .collect()
            })
            .collect()
    }
    /// Number of frames expected in the tracking folder
    pub fn n_expected_frames(&self) -> usize {
        self.indexing_list.iter().map(|row| row.len()).sum::<usize>() * self.template.len()
    }
}

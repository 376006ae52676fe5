//!
//! # Optical test tower calibration and alignment
//!
//! The crate calibrates the parabola and reference mirror of an optical test
//! tower against the Zernike modes sensed by an interferometer and computes
//! the commands that align them.
//!
//! The processing chain is:
//!  1. [CommandHistory]: push-pull sequence of commands,
//!  2. [IffAcquisition]: applies the command history and records one frame per command,
//!  3. [Calibration]: reduces the frames into an interaction matrix,
//!  4. [Reconstructor]: pseudo-inverse of a selection of the interaction matrix,
//!  5. [Alignment]: delta commands correcting a wavefront measurement.
//!
//! Every artifact is written into a tracking folder named after its [TrackingNumber],
//! under the folders of the [OttConfig].
//!
//! ```no_run
//! use ottcal::{calibration::calibrate_par_rm, devices::Tower, OpticalAlignment, OttConfig};
//!
//! # fn main() -> ottcal::Result<()> {
//! let config = OttConfig::load("ott.toml")?;
//! let mut tower = Tower::from_config(&config)?;
//! let calibration = calibrate_par_rm(&config, &mut tower, vec![0.7, 2., 2., 5., 5.], 3, 2)?;
//! let alignment = OpticalAlignment::from_calibration(&config, calibration);
//! let record = alignment.align(&mut tower, 4, None, None, true)?;
//! println!("PAR: {:?}, RM: {:?}", record.parabola_command, record.reference_mirror_command);
//! # Ok(())
//! # }
//! ```

pub mod alignment;
pub mod calibration;
pub mod command_history;
pub mod config;
pub mod devices;
pub mod error;
pub mod iff;
pub mod reconstructor;
pub mod tracking;
pub mod utilities;
pub mod zernike;

#[doc(inline)]
pub use self::alignment::{Alignment, AlignmentRecord, OpticalAlignment};
#[doc(inline)]
pub use self::calibration::{Calibration, Target};
#[doc(inline)]
pub use self::command_history::CommandHistory;
#[doc(inline)]
pub use self::config::OttConfig;
#[doc(inline)]
pub use self::error::OttError;
#[doc(inline)]
pub use self::iff::{IffAcquisition, IffInfo};
#[doc(inline)]
pub use self::reconstructor::Reconstructor;
#[doc(inline)]
pub use self::tracking::{TrackingNumber, TtFolder};

pub type Result<T> = std::result::Result<T, OttError>;

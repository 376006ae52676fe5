mod mask;
mod roi;

pub use mask::{circular_pupil, Mask, MaskFilter, MaskedImage};
pub use roi::roi_generator;

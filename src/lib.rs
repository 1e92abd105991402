//! Comic-to-XTC converter
//!
//! Turns comic archives (CBZ/ZIP) or directories of page images into the
//! fixed-layout XTC container format used by Xteink e-ink readers: each
//! page is cropped, contrast-boosted, split or rotated for the reading
//! orientation, scaled onto the 480x800 panel and dithered down to 1-bit
//! (or 2-bit grayscale) XTG page blobs.

pub mod codec;
pub mod dither;
pub mod error;
pub mod mapping;
pub mod metadata;
pub mod options;
pub mod pool;
pub mod preview;
pub mod processor;
pub mod session;
pub mod source;

pub use error::ConvertError;
pub use options::{ConversionOptions, DeviceProfile, DitherMode, Orientation, SplitMode};
pub use session::{BatchItem, ConversionOutcome, container_extension, convert_batch, convert_path};

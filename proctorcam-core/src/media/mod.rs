//! Local media tooling: duration probing and preview frames.

mod preview;
mod probe;

pub use preview::{PreviewHandle, PreviewRelease, PreviewSource, ThumbnailPreview};
pub use probe::{FfprobeProbe, MediaProbe};

//! Sample-buffer primitives for Buzz machine mixing: scaled copy/add over
//! float slices and the mono/stereo conversions an input mixer needs.
//!
//! Stereo buffers are interleaved (`L R L R ...`). Every routine processes
//! as many frames as both slices can hold, so a short buffer never panics.

mod error;
pub use error::{Error, Result};

mod channels;
pub use channels::Channels;

mod mix;
pub use mix::{
    add_mono_to_stereo, add_scaled, add_stereo_to_mono, copy, copy_mono_to_stereo,
    copy_scaled, copy_stereo_to_mono, zero,
};

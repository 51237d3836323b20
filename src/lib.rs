//! # buzzhost - Native Buzz machine hosting
//!
//! Runs precompiled Buzz machines (generators and effects built against the
//! machine SDK) inside a Rust host.
//!
//! ## Architecture
//!
//! buzzhost is an umbrella crate over:
//! - **buzzhost-loader** - Library loading, ABI-compatible host objects, the
//!   MDK helper shim, parameter marshaling
//! - **buzzhost-dsp** - Mixing kernels shared by the helper shim and hosts
//!
//! ## Quick Start
//!
//! ```ignore
//! use buzzhost::prelude::*;
//!
//! let loader = Loader::new(LoaderConfig::default());
//! let machine = loader.open("/usr/lib/buzzhost/Gear/Jeskola Reverb.so")?;
//!
//! let mut instance = machine.instantiate()?;
//! instance.initialize(&[]);
//!
//! let mut block = [0.0f32; 256];
//! instance.run_block(&mut block, WM_READWRITE);
//! ```

/// Re-export of buzzhost-loader for direct access
pub use buzzhost_loader as loader;

/// Re-export of buzzhost-dsp for direct access
pub use buzzhost_dsp as dsp;

pub use buzzhost_loader::{
    Generation, InitOrder, Instance, Loader, LoaderConfig, MachineLibrary, MachineMetadata,
    Tempo, WaveProvider,
};

pub use buzzhost_dsp::Channels;

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Channels, Instance, Loader, LoaderConfig, MachineLibrary, Tempo};

    // Work modes
    pub use crate::loader::abi::{WM_NOIO, WM_READ, WM_READWRITE, WM_WRITE};

    pub use crate::{Error, Result};
}

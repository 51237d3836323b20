//! Native Buzz machine loading for buzzhost
//!
//! Loads precompiled machine libraries and runs them in-process. The host
//! objects machines talk to (callbacks, the `CMachine` header, data streams
//! and the MDK helper) are laid out exactly as the machines expect, so
//! binaries built against the original SDK work unmodified.
//!
//! ## Usage
//!
//! ```ignore
//! use buzzhost_loader::{Loader, LoaderConfig, abi::WM_READWRITE};
//!
//! let loader = Loader::new(LoaderConfig::default());
//! let machine = loader.open("/usr/lib/buzzhost/Gear/Jeskola Reverb.so")?;
//!
//! let mut instance = machine.instantiate()?;
//! instance.initialize(&[]);
//! instance.set_global_parameter_value(0, 0x40);
//!
//! let mut block = [0.0f32; 256];
//! instance.run_block(&mut block, WM_READWRITE);
//! ```

pub mod abi;

pub mod error;
pub use error::{LoadStage, LoaderError, Result};

mod callbacks;
pub use callbacks::{
    CallbackObject, HostServices, HostState, Sentinel, SentinelRegistry, WaveProvider,
    AUX_BUFFER_LEN,
};

mod config;
pub use config::{search_path_from_env, LoaderConfig, DEFAULT_GEAR_DIR};

mod instance;
pub use instance::{InitOrder, Instance};

mod loader;
pub use loader::{EntryPoints, Loader, MachineLibrary};

pub mod machine;

mod master;
pub use master::{MasterTiming, Tempo};

pub mod mdk;

mod metadata;
pub use metadata::{
    initial_value, AttributeInfo, AttributeProperty, Generation, MachineInfo, MachineMetadata,
    MachineProperty, ParameterInfo, ParameterProperty, PropertyValue,
};

pub mod osc_table;

pub mod params;
pub use params::{ParamLayout, ParamType};

mod plugin;
pub use plugin::{MachineLifecycle, PluginInterface, PluginInterfaceEx};

mod registry;
pub use registry::{scan_directory, scan_search_path, MachineEntry};

pub mod stream;

//! Opening machine libraries.
//!
//! [`Loader::open`] loads a shared library, resolves `GetInfo` and
//! `CreateMachine`, repairs known metadata bugs and, unless disabled, runs a
//! probe instance to find out whether the machine uses the MDK helper. The
//! resulting [`MachineLibrary`] answers metadata queries and creates
//! [`Instance`]s.

use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::abi::{CreateMachineFn, GetInfoFn, MIF_MONO_TO_STEREO};
use crate::config::LoaderConfig;
use crate::error::{LoadStage, LoaderError, Result};
use crate::instance::{InitOrder, Instance};
use crate::master::{MasterTiming, Tempo};
use crate::metadata::{
    AttributeProperty, Generation, MachineInfo, MachineMetadata, MachineProperty,
    ParameterProperty, PropertyValue,
};
use crate::params::ParamLayout;
use crate::registry::{self, MachineEntry};

const GET_INFO_SYMBOL: &[u8] = b"GetInfo\0";
const CREATE_MACHINE_SYMBOL: &[u8] = b"CreateMachine\0";

/// The two functions every machine library exports.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub get_info: GetInfoFn,
    pub create_machine: CreateMachineFn,
}

impl EntryPoints {
    /// Resolves both exports through `lookup`, which returns a symbol's
    /// address.
    ///
    /// # Safety
    /// The addresses `lookup` returns must be functions with the expected
    /// signatures.
    unsafe fn resolve_with<F>(mut lookup: F) -> std::result::Result<Self, String>
    where
        F: FnMut(&[u8]) -> std::result::Result<*const (), String>,
    {
        let get_info = lookup(GET_INFO_SYMBOL)
            .and_then(non_null_symbol)
            .map_err(|e| format!("missing GetInfo: {}", e))?;
        let create_machine = lookup(CREATE_MACHINE_SYMBOL)
            .and_then(non_null_symbol)
            .map_err(|e| format!("missing CreateMachine: {}", e))?;
        Ok(Self {
            get_info: std::mem::transmute::<*const (), GetInfoFn>(get_info),
            create_machine: std::mem::transmute::<*const (), CreateMachineFn>(create_machine),
        })
    }

    /// # Safety
    /// `library` must be a machine library whose exports have the expected
    /// signatures.
    unsafe fn resolve(library: &libloading::Library) -> std::result::Result<Self, String> {
        Self::resolve_with(|name| {
            library
                .get::<*const ()>(name)
                .map(|symbol| *symbol)
                .map_err(|e| e.to_string())
        })
    }
}

fn non_null_symbol(address: *const ()) -> std::result::Result<*const (), String> {
    if address.is_null() {
        Err("symbol resolved to null".to_string())
    } else {
        Ok(address)
    }
}

fn entry_points_error(path: &Path, reason: String) -> LoaderError {
    LoaderError::load_failed(path, LoadStage::EntryPoints, reason)
}

/// Library data shared by every instance. Keeps the code mapped until the
/// last instance is gone.
pub(crate) struct LoadedLibrary {
    pub(crate) path: PathBuf,
    pub(crate) info: MachineInfo,
    pub(crate) layout: ParamLayout,
    pub(crate) entry_points: EntryPoints,
    pub(crate) init_order: InitOrder,
    // Declared last so it is unloaded after everything pointing into it.
    _library: Option<libloading::Library>,
}

// Safety: the machine info is only mutated by the fix-ups in `open`, before
// the library is shared.
unsafe impl Send for LoadedLibrary {}
unsafe impl Sync for LoadedLibrary {}

/// An open machine library.
pub struct MachineLibrary {
    // Destroyed before the shared library data below.
    probe: Option<Instance>,
    shared: Arc<LoadedLibrary>,
    timing: Arc<MasterTiming>,
    mdk_channels: i32,
}

impl MachineLibrary {
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn info(&self) -> MachineInfo {
        self.shared.info
    }

    pub fn generation(&self) -> Generation {
        self.shared.info.generation()
    }

    /// Input channel count of the MDK helper seen while probing, 0 if the
    /// machine does not use it.
    pub fn mdk_channels(&self) -> i32 {
        self.mdk_channels
    }

    pub fn input_channels(&self) -> i32 {
        if self.mdk_channels != 0 {
            self.mdk_channels
        } else {
            1
        }
    }

    pub fn output_channels(&self) -> i32 {
        if self.mdk_channels == 2 || self.info().flags() & MIF_MONO_TO_STEREO != 0 {
            2
        } else {
            1
        }
    }

    fn library_name(&self) -> String {
        self.path()
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn property(&self, key: MachineProperty) -> PropertyValue {
        let info = self.info();
        match key {
            MachineProperty::Type => PropertyValue::Int(info.kind()),
            MachineProperty::Version => PropertyValue::Int(info.version()),
            MachineProperty::Flags => PropertyValue::Int(info.flags()),
            MachineProperty::MinTracks => PropertyValue::Int(info.min_tracks()),
            MachineProperty::MaxTracks => PropertyValue::Int(info.max_tracks()),
            MachineProperty::NumGlobalParams => {
                PropertyValue::Int(info.num_global_parameters() as i32)
            }
            MachineProperty::NumTrackParams => {
                PropertyValue::Int(info.num_track_parameters() as i32)
            }
            MachineProperty::NumAttributes => PropertyValue::Int(info.num_attributes() as i32),
            MachineProperty::Name => PropertyValue::Str(info.name()),
            MachineProperty::ShortName => PropertyValue::Str(info.short_name()),
            MachineProperty::Author => PropertyValue::Str(info.author()),
            MachineProperty::Commands => PropertyValue::Str(info.commands()),
            MachineProperty::LibraryName => PropertyValue::Str(self.library_name()),
            MachineProperty::NumInputChannels => PropertyValue::Int(self.input_channels()),
            MachineProperty::NumOutputChannels => PropertyValue::Int(self.output_channels()),
        }
    }

    pub fn global_parameter_property(
        &self,
        index: usize,
        key: ParameterProperty,
    ) -> Option<PropertyValue> {
        let info = self.info();
        info.global_parameter(index)
            .map(|p| info.parameter_property(p, key))
    }

    pub fn track_parameter_property(
        &self,
        index: usize,
        key: ParameterProperty,
    ) -> Option<PropertyValue> {
        let info = self.info();
        info.track_parameter(index)
            .map(|p| info.parameter_property(p, key))
    }

    pub fn attribute_property(&self, index: usize, key: AttributeProperty) -> Option<PropertyValue> {
        let info = self.info();
        info.attribute(index).map(|a| info.attribute_property(a, key))
    }

    pub fn metadata(&self) -> MachineMetadata {
        MachineMetadata::capture(
            &self.info(),
            self.library_name(),
            self.input_channels(),
            self.output_channels(),
        )
    }

    /// The probe instance, created on first use when probing at open time
    /// was disabled.
    fn probe(&mut self) -> Option<&mut Instance> {
        if self.probe.is_none() {
            match Instance::new(self.shared.clone(), self.timing.clone()) {
                Ok(mut probe) => {
                    probe.initialize(&[]);
                    self.probe = Some(probe);
                }
                Err(e) => {
                    tracing::warn!("Could not create probe instance: {}", e);
                    return None;
                }
            }
        }
        self.probe.as_mut()
    }

    /// Text the machine shows for a global parameter value.
    pub fn describe_global_value(&mut self, param: usize, value: i32) -> String {
        if param >= self.info().num_global_parameters() {
            return String::new();
        }
        self.probe()
            .map(|p| p.describe_value(param as i32, value))
            .unwrap_or_default()
    }

    /// Text the machine shows for a track parameter value.
    pub fn describe_track_value(&mut self, param: usize, value: i32) -> String {
        let info = self.info();
        if param >= info.num_track_parameters() {
            return String::new();
        }
        let index = (info.num_global_parameters() + param) as i32;
        self.probe()
            .map(|p| p.describe_value(index, value))
            .unwrap_or_default()
    }

    /// Creates a new, uninitialized instance.
    pub fn instantiate(&self) -> Result<Instance> {
        Instance::new(self.shared.clone(), self.timing.clone())
    }

    pub fn close(self) {}
}

impl Drop for MachineLibrary {
    fn drop(&mut self) {
        tracing::info!("Closing machine {}", self.shared.path.display());
    }
}

pub struct Loader {
    config: RwLock<LoaderConfig>,
    timing: Arc<MasterTiming>,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        let timing = MasterTiming::new(config.tempo);
        Self {
            config: RwLock::new(config),
            timing,
        }
    }

    pub fn config(&self) -> LoaderConfig {
        self.config.read().clone()
    }

    pub fn timing(&self) -> Arc<MasterTiming> {
        self.timing.clone()
    }

    /// Changes the song timing every instance sees. Must not run while any
    /// instance is processing a block.
    pub fn set_master_info(&self, tempo: Tempo) {
        self.config.write().tempo = tempo;
        self.timing.set(tempo);
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<MachineLibrary> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.config.read().is_blacklisted(&file_name) {
            return Err(LoaderError::load_failed(
                path,
                LoadStage::Opening,
                "machine is blacklisted",
            ));
        }

        tracing::info!("Loading machine {}", path.display());
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| LoaderError::load_failed(path, LoadStage::Opening, e.to_string()))?;
        let entry_points = unsafe { EntryPoints::resolve(&library) }
            .map_err(|reason| entry_points_error(path, reason))?;

        self.finish_open(path, Some(library), entry_points)
    }

    /// Opens a machine whose entry points are already in memory, such as one
    /// linked into the host.
    pub fn open_with_entry_points<P: AsRef<Path>>(
        &self,
        path: P,
        entry_points: EntryPoints,
    ) -> Result<MachineLibrary> {
        self.finish_open(path.as_ref(), None, entry_points)
    }

    fn finish_open(
        &self,
        path: &Path,
        library: Option<libloading::Library>,
        entry_points: EntryPoints,
    ) -> Result<MachineLibrary> {
        let raw = unsafe { (entry_points.get_info)() };
        let raw = NonNull::new(raw).ok_or_else(|| {
            LoaderError::load_failed(path, LoadStage::Metadata, "GetInfo returned null")
        })?;
        let info = unsafe { MachineInfo::from_raw(raw) };
        unsafe { info.fix_up() };

        let (probe_on_open, init_order) = {
            let config = self.config.read();
            let order = if config.wants_params_before_init(&info.name()) {
                InitOrder::ParamsBeforeInit
            } else {
                InitOrder::ParamsAfterInit
            };
            (config.probe_on_open, order)
        };

        let shared = Arc::new(LoadedLibrary {
            path: path.to_path_buf(),
            info,
            layout: info.layout(),
            entry_points,
            init_order,
            _library: library,
        });
        let mut machine = MachineLibrary {
            probe: None,
            shared,
            timing: self.timing.clone(),
            mdk_channels: 0,
        };

        if probe_on_open {
            let mut probe = machine.instantiate()?;
            probe.initialize(&[]);
            machine.mdk_channels = probe.shim_channels().unwrap_or(0);
            machine.probe = Some(probe);
        }

        tracing::info!(
            "Loaded {:?} by {:?} ({:?} callbacks, {} global / {} track parameters)",
            info.name(),
            info.author(),
            info.generation(),
            info.num_global_parameters(),
            info.num_track_parameters()
        );
        Ok(machine)
    }

    /// Machine libraries on the configured search path.
    pub fn scan(&self) -> Vec<MachineEntry> {
        let config = self.config.read();
        registry::scan_search_path(&config.search_path, &config.blacklist)
    }

    /// Finds a machine on the search path by name, without extension.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.scan()
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.path)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

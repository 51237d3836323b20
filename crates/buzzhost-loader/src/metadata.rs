//! Machine metadata.
//!
//! `MachineInfo` is a read-only view over the `CMachineInfo` a library hands
//! out from `GetInfo`. The storage belongs to the library and lives as long as
//! it stays loaded. `MachineMetadata` is an owned snapshot for editors and
//! tooling.

use std::ffi::{c_char, c_int, CStr};
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::abi::{
    interface_version, RawAttribute, RawMachineInfo, RawParameter, MI_VERSION_CURRENT_CALLBACKS,
    MPF_STATE,
};
use crate::params::{ParamLayout, ParamType};

/// Which callback vtable a machine was compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Generation {
    Legacy,
    Current,
}

impl Generation {
    pub fn from_version(version: c_int) -> Self {
        if interface_version(version) < MI_VERSION_CURRENT_CALLBACKS {
            Generation::Legacy
        } else {
            Generation::Current
        }
    }
}

/// Keys for [`crate::MachineLibrary::property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineProperty {
    Type,
    Version,
    Flags,
    MinTracks,
    MaxTracks,
    NumGlobalParams,
    NumTrackParams,
    NumAttributes,
    Name,
    ShortName,
    Author,
    Commands,
    LibraryName,
    NumInputChannels,
    NumOutputChannels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterProperty {
    Type,
    Name,
    Description,
    MinValue,
    MaxValue,
    NoValue,
    Flags,
    DefaultValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeProperty {
    Name,
    MinValue,
    MaxValue,
    DefaultValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i32),
    Str(String),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            PropertyValue::Int(_) => None,
        }
    }
}

/// Copies a C string out, treating null as empty.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Borrowed view over a library's `CMachineInfo`.
#[derive(Debug, Clone, Copy)]
pub struct MachineInfo {
    raw: NonNull<RawMachineInfo>,
}

impl MachineInfo {
    /// # Safety
    /// `raw` must point to a valid `CMachineInfo` whose parameter and
    /// attribute arrays hold the declared number of entries, and it must
    /// outlive every copy of the returned view.
    pub unsafe fn from_raw(raw: NonNull<RawMachineInfo>) -> Self {
        Self { raw }
    }

    pub fn as_ptr(&self) -> *mut RawMachineInfo {
        self.raw.as_ptr()
    }

    fn raw(&self) -> &RawMachineInfo {
        // Safety: guaranteed by from_raw
        unsafe { self.raw.as_ref() }
    }

    pub fn kind(&self) -> i32 {
        self.raw().kind
    }

    pub fn version(&self) -> i32 {
        self.raw().version
    }

    pub fn flags(&self) -> i32 {
        self.raw().flags
    }

    pub fn min_tracks(&self) -> i32 {
        self.raw().min_tracks
    }

    pub fn max_tracks(&self) -> i32 {
        self.raw().max_tracks
    }

    pub fn num_global_parameters(&self) -> usize {
        self.raw().num_global_parameters.max(0) as usize
    }

    pub fn num_track_parameters(&self) -> usize {
        self.raw().num_track_parameters.max(0) as usize
    }

    pub fn num_attributes(&self) -> usize {
        self.raw().num_attributes.max(0) as usize
    }

    pub fn generation(&self) -> Generation {
        Generation::from_version(self.version())
    }

    pub fn name(&self) -> String {
        unsafe { c_string(self.raw().name) }
    }

    pub fn short_name(&self) -> String {
        unsafe { c_string(self.raw().short_name) }
    }

    pub fn author(&self) -> String {
        unsafe { c_string(self.raw().author) }
    }

    pub fn commands(&self) -> String {
        unsafe { c_string(self.raw().commands) }
    }

    /// Parameter by absolute index: globals first, then track parameters.
    fn parameter(&self, index: usize) -> Option<&RawParameter> {
        let raw = self.raw();
        if index >= self.num_global_parameters() + self.num_track_parameters()
            || raw.parameters.is_null()
        {
            return None;
        }
        // Safety: index is within the declared parameter count
        unsafe { (*raw.parameters.add(index)).as_ref() }
    }

    pub fn global_parameter(&self, index: usize) -> Option<&RawParameter> {
        if index >= self.num_global_parameters() {
            return None;
        }
        self.parameter(index)
    }

    pub fn track_parameter(&self, index: usize) -> Option<&RawParameter> {
        if index >= self.num_track_parameters() {
            return None;
        }
        self.parameter(self.num_global_parameters() + index)
    }

    pub fn attribute(&self, index: usize) -> Option<&RawAttribute> {
        let raw = self.raw();
        if index >= self.num_attributes() || raw.attributes.is_null() {
            return None;
        }
        // Safety: index is within the declared attribute count
        unsafe { (*raw.attributes.add(index)).as_ref() }
    }

    /// Repairs track declarations known to be inconsistent in shipped
    /// machines: with `minTracks == 0` there can be neither track parameters
    /// nor a nonzero track maximum. Returns whether anything changed.
    ///
    /// # Safety
    /// The info must be writable and not read concurrently.
    pub unsafe fn fix_up(&self) -> bool {
        let name = self.name();
        let raw = &mut *self.raw.as_ptr();
        let mut changed = false;
        if raw.min_tracks == 0 {
            if raw.num_track_parameters != 0 {
                tracing::warn!(
                    "buggy machine {:?}: numTrackParameters={} but minTracks=0",
                    name,
                    raw.num_track_parameters
                );
                raw.num_track_parameters = 0;
                changed = true;
            }
            if raw.max_tracks != 0 {
                tracing::warn!(
                    "buggy machine {:?}: maxTracks={} but minTracks=0",
                    name,
                    raw.max_tracks
                );
                raw.max_tracks = 0;
                changed = true;
            }
        }
        changed
    }

    pub fn layout(&self) -> ParamLayout {
        let globals: Vec<c_int> = (0..self.num_global_parameters())
            .map(|i| self.global_parameter(i).map_or(-1, |p| p.kind))
            .collect();
        let tracks: Vec<c_int> = (0..self.num_track_parameters())
            .map(|i| self.track_parameter(i).map_or(-1, |p| p.kind))
            .collect();
        ParamLayout::new(&globals, &tracks, self.max_tracks().max(0) as usize)
    }

    pub fn parameter_property(
        &self,
        param: &RawParameter,
        key: ParameterProperty,
    ) -> PropertyValue {
        match key {
            ParameterProperty::Type => PropertyValue::Int(param.kind),
            ParameterProperty::Name => PropertyValue::Str(unsafe { c_string(param.name) }),
            ParameterProperty::Description => {
                PropertyValue::Str(unsafe { c_string(param.description) })
            }
            ParameterProperty::MinValue => PropertyValue::Int(param.min_value),
            ParameterProperty::MaxValue => PropertyValue::Int(param.max_value),
            ParameterProperty::NoValue => PropertyValue::Int(param.no_value),
            ParameterProperty::Flags => PropertyValue::Int(param.flags),
            ParameterProperty::DefaultValue => PropertyValue::Int(param.default_value),
        }
    }

    pub fn attribute_property(&self, attr: &RawAttribute, key: AttributeProperty) -> PropertyValue {
        match key {
            AttributeProperty::Name => PropertyValue::Str(unsafe { c_string(attr.name) }),
            AttributeProperty::MinValue => PropertyValue::Int(attr.min_value),
            AttributeProperty::MaxValue => PropertyValue::Int(attr.max_value),
            AttributeProperty::DefaultValue => PropertyValue::Int(attr.default_value),
        }
    }
}

/// Value a parameter slot starts with: the default for state parameters,
/// the "no value" sentinel otherwise.
pub fn initial_value(param: &RawParameter) -> i32 {
    if param.flags & MPF_STATE != 0 {
        param.default_value
    } else {
        param.no_value
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Raw type tag as declared by the machine.
    pub type_tag: i32,
    pub param_type: Option<ParamType>,
    pub name: String,
    pub description: String,
    pub min_value: i32,
    pub max_value: i32,
    pub no_value: i32,
    pub flags: i32,
    pub default_value: i32,
}

impl ParameterInfo {
    fn from_raw(param: &RawParameter) -> Self {
        Self {
            type_tag: param.kind,
            param_type: ParamType::from_raw(param.kind),
            name: unsafe { c_string(param.name) },
            description: unsafe { c_string(param.description) },
            min_value: param.min_value,
            max_value: param.max_value,
            no_value: param.no_value,
            flags: param.flags,
            default_value: param.default_value,
        }
    }

    pub fn is_state(&self) -> bool {
        self.flags & MPF_STATE != 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub min_value: i32,
    pub max_value: i32,
    pub default_value: i32,
}

/// Owned copy of everything a library declares about its machine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineMetadata {
    pub library: String,
    pub name: String,
    pub short_name: String,
    pub author: String,
    /// Newline separated command menu entries.
    pub commands: String,
    pub machine_type: i32,
    pub version: i32,
    pub flags: i32,
    pub min_tracks: i32,
    pub max_tracks: i32,
    pub input_channels: i32,
    pub output_channels: i32,
    pub global_parameters: Vec<ParameterInfo>,
    pub track_parameters: Vec<ParameterInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl MachineMetadata {
    pub(crate) fn capture(
        info: &MachineInfo,
        library: String,
        input_channels: i32,
        output_channels: i32,
    ) -> Self {
        Self {
            library,
            name: info.name(),
            short_name: info.short_name(),
            author: info.author(),
            commands: info.commands(),
            machine_type: info.kind(),
            version: info.version(),
            flags: info.flags(),
            min_tracks: info.min_tracks(),
            max_tracks: info.max_tracks(),
            input_channels,
            output_channels,
            global_parameters: (0..info.num_global_parameters())
                .filter_map(|i| info.global_parameter(i))
                .map(ParameterInfo::from_raw)
                .collect(),
            track_parameters: (0..info.num_track_parameters())
                .filter_map(|i| info.track_parameter(i))
                .map(ParameterInfo::from_raw)
                .collect(),
            attributes: (0..info.num_attributes())
                .filter_map(|i| info.attribute(i))
                .map(|a| AttributeInfo {
                    name: unsafe { c_string(a.name) },
                    min_value: a.min_value,
                    max_value: a.max_value,
                    default_value: a.default_value,
                })
                .collect(),
        }
    }

    pub fn generation(&self) -> Generation {
        Generation::from_version(self.version)
    }

    /// Command menu entries.
    pub fn command_list(&self) -> Vec<&str> {
        self.commands.lines().filter(|c| !c.is_empty()).collect()
    }
}

//! Binary layouts shared with compiled machines.
//!
//! Every type here mirrors a C++ class or struct the machine was compiled
//! against, for the Itanium C++ ABI: the vtable pointer comes first, a virtual
//! destructor takes two slots (complete, deleting) and each method receives
//! `this` as its first argument with the platform C calling convention.
//! Field order and widths must not change.

use std::ffi::{c_char, c_int, c_void};

use crate::machine::RawMachine;

pub type Word = u16;
pub type Dword = u32;

/// Parameter field types (`CMPType`).
pub const PT_NOTE: c_int = 0;
pub const PT_SWITCH: c_int = 1;
pub const PT_BYTE: c_int = 2;
pub const PT_WORD: c_int = 3;

/// Machine types.
pub const MT_MASTER: c_int = 0;
pub const MT_GENERATOR: c_int = 1;
pub const MT_EFFECT: c_int = 2;

/// Machine info flags.
pub const MIF_MONO_TO_STEREO: c_int = 1 << 0;
pub const MIF_PLAYS_WAVES: c_int = 1 << 1;
pub const MIF_USES_LIB_INTERFACE: c_int = 1 << 2;
pub const MIF_USES_INSTRUMENTS: c_int = 1 << 3;
pub const MIF_DOES_INPUT_MIXING: c_int = 1 << 4;
pub const MIF_NO_OUTPUT: c_int = 1 << 5;
pub const MIF_CONTROL_MACHINE: c_int = 1 << 6;
pub const MIF_INTERNAL_AUX: c_int = 1 << 7;

/// Parameter flags.
pub const MPF_WAVE: c_int = 1 << 0;
pub const MPF_STATE: c_int = 1 << 1;
pub const MPF_TICK_ON_EDIT: c_int = 1 << 2;

/// Work modes passed to `Work`/`WorkMonoToStereo`.
pub const WM_NOIO: c_int = 0;
pub const WM_READ: c_int = 1;
pub const WM_WRITE: c_int = 2;
pub const WM_READWRITE: c_int = 3;

/// Machines built against this interface version or later expect the
/// current callback vtable.
pub const MI_VERSION_CURRENT_CALLBACKS: c_int = 15;

/// Low byte of `CMachineInfo::Version`.
#[inline]
pub fn interface_version(version: c_int) -> c_int {
    version & 0xff
}

#[repr(C)]
#[derive(Debug)]
pub struct RawParameter {
    pub kind: c_int,
    pub name: *const c_char,
    pub description: *const c_char,
    pub min_value: c_int,
    pub max_value: c_int,
    pub no_value: c_int,
    pub flags: c_int,
    pub default_value: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub struct RawAttribute {
    pub name: *const c_char,
    pub min_value: c_int,
    pub max_value: c_int,
    pub default_value: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MasterInfo {
    pub beats_per_min: c_int,
    pub ticks_per_beat: c_int,
    pub samples_per_sec: c_int,
    pub samples_per_tick: c_int,
    pub pos_in_tick: c_int,
    pub ticks_per_sec: f32,
}

/// `CMachineInfo`, returned by the library's `GetInfo` export.
#[repr(C)]
#[derive(Debug)]
pub struct RawMachineInfo {
    pub kind: c_int,
    pub version: c_int,
    pub flags: c_int,
    pub min_tracks: c_int,
    pub max_tracks: c_int,
    pub num_global_parameters: c_int,
    pub num_track_parameters: c_int,
    /// Global parameters followed by track parameters.
    pub parameters: *const *const RawParameter,
    pub num_attributes: c_int,
    pub attributes: *const *const RawAttribute,
    pub name: *const c_char,
    pub short_name: *const c_char,
    pub author: *const c_char,
    pub commands: *const c_char,
    pub lib_interface: *mut c_void,
}

#[repr(C)]
#[derive(Debug)]
pub struct EnvelopeInfo {
    pub name: *const c_char,
    pub flags: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaveInfo {
    pub flags: c_int,
    pub volume: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveLevel {
    pub num_samples: c_int,
    pub samples: *mut i16,
    pub root_note: c_int,
    pub samples_per_sec: c_int,
    pub loop_start: c_int,
    pub loop_end: c_int,
}

impl Default for WaveLevel {
    fn default() -> Self {
        Self {
            num_samples: 0,
            samples: std::ptr::null_mut(),
            root_note: 0,
            samples_per_sec: 0,
            loop_start: 0,
            loop_end: 0,
        }
    }
}

/// Itanium pointer-to-member-function, passed by value to `SetEventHandler`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemberFnPtr {
    pub ptr: usize,
    pub adj: isize,
}

pub type PatternPtr = *mut c_void;
pub type SequencePtr = *mut c_void;

// ---------------------------------------------------------------------------
// Data streams

#[repr(C)]
pub struct RawDataInput {
    pub vtable: *const DataInputVtable,
}

#[repr(C)]
pub struct DataInputVtable {
    pub read: unsafe extern "C" fn(this: *mut RawDataInput, buf: *mut c_void, len: c_int),
}

#[repr(C)]
pub struct RawDataOutput {
    pub vtable: *const DataOutputVtable,
}

#[repr(C)]
pub struct DataOutputVtable {
    pub write: unsafe extern "C" fn(this: *mut RawDataOutput, buf: *const c_void, len: c_int),
}

// ---------------------------------------------------------------------------
// Machine side

/// `CMachineInterface`, created by the library's `CreateMachine` export.
#[repr(C)]
pub struct RawMachineInterface {
    pub vtable: *const MachineInterfaceVtable,
    pub global_vals: *mut c_void,
    pub track_vals: *mut c_void,
    pub attr_vals: *mut c_int,
    pub master_info: *const MasterInfo,
    pub callbacks: *mut RawCallbacks,
}

#[repr(C)]
pub struct MachineInterfaceVtable {
    pub destroy: unsafe extern "C" fn(this: *mut RawMachineInterface),
    pub destroy_delete: unsafe extern "C" fn(this: *mut RawMachineInterface),
    pub init: unsafe extern "C" fn(this: *mut RawMachineInterface, input: *mut RawDataInput),
    pub tick: unsafe extern "C" fn(this: *mut RawMachineInterface),
    pub work: unsafe extern "C" fn(
        this: *mut RawMachineInterface,
        samples: *mut f32,
        num_samples: c_int,
        mode: c_int,
    ) -> bool,
    pub work_mono_to_stereo: unsafe extern "C" fn(
        this: *mut RawMachineInterface,
        input: *mut f32,
        output: *mut f32,
        num_samples: c_int,
        mode: c_int,
    ) -> bool,
    pub stop: unsafe extern "C" fn(this: *mut RawMachineInterface),
    pub save: unsafe extern "C" fn(this: *mut RawMachineInterface, output: *mut RawDataOutput),
    pub attributes_changed: unsafe extern "C" fn(this: *mut RawMachineInterface),
    pub command: unsafe extern "C" fn(this: *mut RawMachineInterface, i: c_int),
    pub set_num_tracks: unsafe extern "C" fn(this: *mut RawMachineInterface, n: c_int),
    pub mute_track: unsafe extern "C" fn(this: *mut RawMachineInterface, i: c_int),
    pub is_track_muted: unsafe extern "C" fn(this: *const RawMachineInterface, i: c_int) -> bool,
    pub midi_note: unsafe extern "C" fn(
        this: *mut RawMachineInterface,
        channel: c_int,
        value: c_int,
        velocity: c_int,
    ),
    pub event: unsafe extern "C" fn(this: *mut RawMachineInterface, data: Dword),
    pub describe_value: unsafe extern "C" fn(
        this: *mut RawMachineInterface,
        param: c_int,
        value: c_int,
    ) -> *const c_char,
    pub get_envelope_infos:
        unsafe extern "C" fn(this: *mut RawMachineInterface) -> *const *const EnvelopeInfo,
    pub play_wave: unsafe extern "C" fn(
        this: *mut RawMachineInterface,
        wave: c_int,
        note: c_int,
        volume: f32,
    ) -> bool,
    pub stop_wave: unsafe extern "C" fn(this: *mut RawMachineInterface),
    pub get_wave_env_play_pos:
        unsafe extern "C" fn(this: *mut RawMachineInterface, env: c_int) -> c_int,
}

/// Vtable of a machine built on the MDK: the plain machine vtable followed by
/// the MDK hooks the helper shim calls back into.
#[repr(C)]
pub struct MdkMachineInterfaceVtable {
    pub base: MachineInterfaceVtable,
    pub get_ex: unsafe extern "C" fn(this: *mut RawMachineInterface) -> *mut RawMachineInterfaceEx,
    pub output_mode_changed: unsafe extern "C" fn(this: *mut RawMachineInterface, stereo: bool),
    pub mdk_work: unsafe extern "C" fn(
        this: *mut RawMachineInterface,
        samples: *mut f32,
        num_samples: c_int,
        mode: c_int,
    ) -> bool,
    pub mdk_work_stereo: unsafe extern "C" fn(
        this: *mut RawMachineInterface,
        samples: *mut f32,
        num_samples: c_int,
        mode: c_int,
    ) -> bool,
    pub mdk_init: unsafe extern "C" fn(this: *mut RawMachineInterface, input: *mut RawDataInput),
    pub mdk_save: unsafe extern "C" fn(this: *mut RawMachineInterface, output: *mut RawDataOutput),
}

/// `CMachineInterfaceEx`. No virtual destructor.
#[repr(C)]
pub struct RawMachineInterfaceEx {
    pub vtable: *const MachineInterfaceExVtable,
}

#[repr(C)]
pub struct MachineInterfaceExVtable {
    pub describe_param:
        unsafe extern "C" fn(this: *mut RawMachineInterfaceEx, param: c_int) -> *const c_char,
    pub set_instrument:
        unsafe extern "C" fn(this: *mut RawMachineInterfaceEx, name: *const c_char) -> bool,
    pub get_sub_menu:
        unsafe extern "C" fn(this: *mut RawMachineInterfaceEx, i: c_int, out: *mut RawDataOutput),
    pub add_input:
        unsafe extern "C" fn(this: *mut RawMachineInterfaceEx, name: *const c_char, stereo: bool),
    pub delete_input: unsafe extern "C" fn(this: *mut RawMachineInterfaceEx, name: *const c_char),
    pub rename_input: unsafe extern "C" fn(
        this: *mut RawMachineInterfaceEx,
        old_name: *const c_char,
        new_name: *const c_char,
    ),
    pub input: unsafe extern "C" fn(
        this: *mut RawMachineInterfaceEx,
        samples: *mut f32,
        num_samples: c_int,
        amp: f32,
    ),
    pub midi_control_change: unsafe extern "C" fn(
        this: *mut RawMachineInterfaceEx,
        ctrl: c_int,
        channel: c_int,
        value: c_int,
    ),
    pub set_input_channels:
        unsafe extern "C" fn(this: *mut RawMachineInterfaceEx, name: *const c_char, stereo: bool),
    pub handle_input: unsafe extern "C" fn(
        this: *mut RawMachineInterfaceEx,
        index: c_int,
        amp: c_int,
        pan: c_int,
    ) -> bool,
    pub reserved: [unsafe extern "C" fn(this: *mut RawMachineInterfaceEx); 32],
}

// ---------------------------------------------------------------------------
// Host side

/// Any callback object handed to a machine as `pCB`.
#[repr(C)]
pub struct RawCallbacks {
    pub vtable: *const c_void,
}

/// Host services available to machines older than interface version 15.
#[repr(C)]
pub struct LegacyCallbacksVtable {
    pub get_wave: unsafe extern "C" fn(this: *mut RawCallbacks, i: c_int) -> *const WaveInfo,
    pub get_wave_level:
        unsafe extern "C" fn(this: *mut RawCallbacks, i: c_int, level: c_int) -> *const WaveLevel,
    pub message_box: unsafe extern "C" fn(this: *mut RawCallbacks, text: *const c_char),
    pub lock: unsafe extern "C" fn(this: *mut RawCallbacks),
    pub unlock: unsafe extern "C" fn(this: *mut RawCallbacks),
    pub get_write_pos: unsafe extern "C" fn(this: *mut RawCallbacks) -> c_int,
    pub get_play_pos: unsafe extern "C" fn(this: *mut RawCallbacks) -> c_int,
    pub get_aux_buffer: unsafe extern "C" fn(this: *mut RawCallbacks) -> *mut f32,
    pub clear_aux_buffer: unsafe extern "C" fn(this: *mut RawCallbacks),
    pub get_free_wave: unsafe extern "C" fn(this: *mut RawCallbacks) -> c_int,
    pub allocate_wave: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        i: c_int,
        size: c_int,
        name: *const c_char,
    ) -> bool,
    pub schedule_event: unsafe extern "C" fn(this: *mut RawCallbacks, time: c_int, data: Dword),
    pub midi_out: unsafe extern "C" fn(this: *mut RawCallbacks, dev: c_int, data: Dword),
    pub get_oscillator_table:
        unsafe extern "C" fn(this: *mut RawCallbacks, waveform: c_int) -> *const i16,
    pub get_env_size:
        unsafe extern "C" fn(this: *mut RawCallbacks, wave: c_int, env: c_int) -> c_int,
    pub get_env_point: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        wave: c_int,
        env: c_int,
        i: c_int,
        x: *mut Word,
        y: *mut Word,
        flags: *mut c_int,
    ) -> bool,
    pub get_nearest_wave_level:
        unsafe extern "C" fn(this: *mut RawCallbacks, i: c_int, note: c_int) -> *const WaveLevel,
    pub set_number_of_tracks: unsafe extern "C" fn(this: *mut RawCallbacks, n: c_int),
    pub create_pattern: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        name: *const c_char,
        length: c_int,
    ) -> PatternPtr,
    pub get_pattern: unsafe extern "C" fn(this: *mut RawCallbacks, index: c_int) -> PatternPtr,
    pub get_pattern_name:
        unsafe extern "C" fn(this: *mut RawCallbacks, pattern: PatternPtr) -> *const c_char,
    pub rename_pattern: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        old_name: *const c_char,
        new_name: *const c_char,
    ),
    pub delete_pattern: unsafe extern "C" fn(this: *mut RawCallbacks, pattern: PatternPtr),
    pub get_pattern_data: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        pattern: PatternPtr,
        row: c_int,
        group: c_int,
        track: c_int,
        field: c_int,
    ) -> c_int,
    pub set_pattern_data: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        pattern: PatternPtr,
        row: c_int,
        group: c_int,
        track: c_int,
        field: c_int,
        value: c_int,
    ),
    pub create_sequence: unsafe extern "C" fn(this: *mut RawCallbacks) -> SequencePtr,
    pub delete_sequence: unsafe extern "C" fn(this: *mut RawCallbacks, sequence: SequencePtr),
    pub get_sequence_data: unsafe extern "C" fn(this: *mut RawCallbacks, row: c_int) -> PatternPtr,
    pub set_sequence_data:
        unsafe extern "C" fn(this: *mut RawCallbacks, row: c_int, pattern: PatternPtr),
}

/// Host services for interface version 15 and later. Starts with the legacy
/// slots so a legacy-sized prefix of it is itself a valid legacy table.
#[repr(C)]
pub struct CallbacksVtable {
    pub legacy: LegacyCallbacksVtable,
    pub set_machine_interface_ex:
        unsafe extern "C" fn(this: *mut RawCallbacks, ex: *mut RawMachineInterfaceEx),
    pub control_change_obsolete: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        group: c_int,
        track: c_int,
        param: c_int,
        value: c_int,
    ),
    pub ad_get_num_channels: unsafe extern "C" fn(this: *mut RawCallbacks, input: bool) -> c_int,
    pub ad_write: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        channel: c_int,
        samples: *mut f32,
        num_samples: c_int,
    ),
    pub ad_read: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        channel: c_int,
        samples: *mut f32,
        num_samples: c_int,
    ),
    pub get_this_machine: unsafe extern "C" fn(this: *mut RawCallbacks) -> *mut RawMachine,
    pub control_change: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        machine: *mut RawMachine,
        group: c_int,
        track: c_int,
        param: c_int,
        value: c_int,
    ),
    pub get_playing_sequence:
        unsafe extern "C" fn(this: *mut RawCallbacks, machine: *mut RawMachine) -> SequencePtr,
    pub get_playing_row: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        sequence: SequencePtr,
        group: c_int,
        track: c_int,
    ) -> *mut c_void,
    pub get_state_flags: unsafe extern "C" fn(this: *mut RawCallbacks) -> c_int,
    pub set_num_output_channels:
        unsafe extern "C" fn(this: *mut RawCallbacks, machine: *mut RawMachine, n: c_int),
    pub set_event_handler: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        machine: *mut RawMachine,
        event_type: c_int,
        handler: MemberFnPtr,
        param: *mut c_void,
    ),
    pub get_wave_name: unsafe extern "C" fn(this: *mut RawCallbacks, i: c_int) -> *const c_char,
    pub set_internal_wave_name: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        machine: *mut RawMachine,
        i: c_int,
        name: *const c_char,
    ),
    pub get_machine_names: unsafe extern "C" fn(this: *mut RawCallbacks, out: *mut RawDataOutput),
    pub get_machine:
        unsafe extern "C" fn(this: *mut RawCallbacks, name: *const c_char) -> *mut RawMachine,
    pub get_machine_info: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        machine: *mut RawMachine,
    ) -> *const RawMachineInfo,
    pub get_machine_name:
        unsafe extern "C" fn(this: *mut RawCallbacks, machine: *mut RawMachine) -> *const c_char,
    pub get_input: unsafe extern "C" fn(
        this: *mut RawCallbacks,
        index: c_int,
        samples: *mut f32,
        num_samples: c_int,
        stereo: bool,
        extra: *mut f32,
    ) -> bool,
}

/// Entry point signatures exported by a machine library.
pub type GetInfoFn = unsafe extern "C" fn() -> *mut RawMachineInfo;
pub type CreateMachineFn = unsafe extern "C" fn() -> *mut RawMachineInterface;

//! Host callback object (`CMICallbacks`) handed to every machine as `pCB`.
//!
//! Two vtable generations exist. Machines older than interface version 15
//! get the legacy table, newer ones the current table, which extends it.
//! The generation is picked once when the instance is created.
//!
//! Most services make no sense for a headless loader (patterns, sequences,
//! the audio driver) and answer with 0/false/null. Those are logged at trace
//! level only.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;
use std::sync::OnceLock;

use crate::abi::{
    CallbacksVtable, Dword, LegacyCallbacksVtable, MemberFnPtr, PatternPtr, RawCallbacks,
    RawDataOutput, RawMachineInfo, RawMachineInterfaceEx, SequencePtr, WaveInfo, WaveLevel, Word,
    MIF_MONO_TO_STEREO,
};
use crate::machine::RawMachine;
use crate::mdk::MdkHelper;
use crate::metadata::Generation;
use crate::osc_table;

/// Floats in the per-instance aux bus buffer.
pub const AUX_BUFFER_LEN: usize = 2 * 1024;

/// Source of real wave table data, supplied by the embedding host.
pub trait WaveProvider: Send {
    fn wave(&self, index: i32) -> Option<&WaveInfo>;

    fn wave_level(&self, index: i32, level: i32) -> Option<&WaveLevel>;

    fn nearest_wave_level(&self, index: i32, note: i32) -> Option<&WaveLevel>;

    fn wave_name(&self, _index: i32) -> Option<&CStr> {
        None
    }
}

/// Meaning of a special `GetNearestWaveLevel` argument pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// The caller is MDK code asking for its helper object.
    MdkHelper,
    /// Known convention this host does not answer.
    Unsupported(&'static str),
}

/// Special `(wave, note)` pairs recognised before the normal wave lookup.
#[derive(Debug, Clone)]
pub struct SentinelRegistry {
    entries: Vec<((i32, i32), Sentinel)>,
}

impl SentinelRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, wave: i32, note: i32, sentinel: Sentinel) {
        self.entries.retain(|(key, _)| *key != (wave, note));
        self.entries.push(((wave, note), sentinel));
    }

    pub fn lookup(&self, wave: i32, note: i32) -> Option<Sentinel> {
        self.entries
            .iter()
            .find(|(key, _)| *key == (wave, note))
            .map(|(_, s)| *s)
    }

    /// The conventions every instance uses.
    pub fn global() -> &'static SentinelRegistry {
        static REGISTRY: OnceLock<SentinelRegistry> = OnceLock::new();
        REGISTRY.get_or_init(SentinelRegistry::default)
    }
}

impl Default for SentinelRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(-1, -1, Sentinel::MdkHelper);
        registry.register(-2, -2, Sentinel::Unsupported("host version probe"));
        registry
    }
}

/// Services a machine can ask of its host.
pub trait HostServices {
    fn wave(&mut self, index: i32) -> *const WaveInfo;

    fn wave_level(&mut self, index: i32, level: i32) -> *const WaveLevel;

    fn nearest_wave_level(&mut self, index: i32, note: i32) -> *const WaveLevel;

    fn message_box(&mut self, text: &str);

    fn aux_buffer(&mut self) -> *mut f32;

    fn clear_aux_buffer(&mut self);

    fn oscillator_table(&mut self, waveform: i32) -> *const i16;

    fn this_machine(&mut self) -> *mut RawMachine;

    fn set_output_channels(&mut self, machine: *mut RawMachine, n: i32);

    fn set_interface_ex(&mut self, ex: *mut RawMachineInterfaceEx);

    fn machine_info(&mut self, machine: *mut RawMachine) -> *const RawMachineInfo;
}

/// Per-instance host state behind the callback vtable.
pub struct HostState {
    generation: Generation,
    machine: *mut RawMachine,
    info: *const RawMachineInfo,
    interface_ex: *mut RawMachineInterfaceEx,
    /// Owned; created on the first `(-1, -1)` query.
    helper: *mut MdkHelper,
    aux: Box<[f32]>,
    output_channels: i32,
    waves: Option<Box<dyn WaveProvider>>,
    empty_wave: WaveInfo,
    empty_level: WaveLevel,
}

impl HostState {
    fn new(generation: Generation, machine: *mut RawMachine, info: *const RawMachineInfo) -> Self {
        let flags = if info.is_null() {
            0
        } else {
            unsafe { (*info).flags }
        };
        Self {
            generation,
            machine,
            info,
            interface_ex: ptr::null_mut(),
            helper: ptr::null_mut(),
            aux: vec![0.0; AUX_BUFFER_LEN].into_boxed_slice(),
            output_channels: if flags & MIF_MONO_TO_STEREO != 0 { 2 } else { 1 },
            waves: None,
            empty_wave: WaveInfo::default(),
            empty_level: WaveLevel::default(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The helper shim, if the machine has asked for one.
    pub fn helper(&self) -> Option<&MdkHelper> {
        unsafe { self.helper.as_ref() }
    }

    pub(crate) fn helper_ptr(&self) -> *mut MdkHelper {
        self.helper
    }

    /// Extended interface registered through `SetMachineInterfaceEx`.
    pub fn interface_ex(&self) -> *mut RawMachineInterfaceEx {
        self.interface_ex
    }

    pub fn output_channels(&self) -> i32 {
        self.output_channels
    }

    pub fn set_wave_provider(&mut self, provider: Option<Box<dyn WaveProvider>>) {
        self.waves = provider;
    }

    pub fn aux(&self) -> &[f32] {
        &self.aux
    }

    fn mdk_helper(&mut self) -> *mut MdkHelper {
        if self.helper.is_null() {
            tracing::debug!("creating MDK helper");
            let host: *mut HostState = self;
            self.helper = Box::into_raw(Box::new(MdkHelper::new(host)));
        }
        self.helper
    }
}

impl HostServices for HostState {
    fn wave(&mut self, index: i32) -> *const WaveInfo {
        tracing::trace!("GetWave({})", index);
        match self.waves.as_ref().and_then(|w| w.wave(index)) {
            Some(wave) => wave,
            None => &self.empty_wave,
        }
    }

    fn wave_level(&mut self, index: i32, level: i32) -> *const WaveLevel {
        tracing::trace!("GetWaveLevel({}, {})", index, level);
        match self.waves.as_ref().and_then(|w| w.wave_level(index, level)) {
            Some(l) => l,
            None => &self.empty_level,
        }
    }

    fn nearest_wave_level(&mut self, index: i32, note: i32) -> *const WaveLevel {
        tracing::trace!("GetNearestWaveLevel({}, {})", index, note);
        match SentinelRegistry::global().lookup(index, note) {
            Some(Sentinel::MdkHelper) => return self.mdk_helper().cast::<WaveLevel>(),
            Some(Sentinel::Unsupported(what)) => {
                tracing::debug!("GetNearestWaveLevel({}, {}): {} not supported", index, note, what);
            }
            None => {}
        }
        match self
            .waves
            .as_ref()
            .and_then(|w| w.nearest_wave_level(index, note))
        {
            Some(l) => l,
            None => &self.empty_level,
        }
    }

    fn message_box(&mut self, text: &str) {
        tracing::info!("machine message: {}", text);
    }

    fn aux_buffer(&mut self) -> *mut f32 {
        self.aux.as_mut_ptr()
    }

    fn clear_aux_buffer(&mut self) {
        self.aux.fill(0.0);
    }

    fn oscillator_table(&mut self, waveform: i32) -> *const i16 {
        let table = osc_table::table_ptr(waveform);
        if table.is_null() {
            tracing::debug!("GetOscillatorTable({}): unknown waveform", waveform);
        }
        table
    }

    fn this_machine(&mut self) -> *mut RawMachine {
        self.machine
    }

    fn set_output_channels(&mut self, machine: *mut RawMachine, n: i32) {
        if machine.is_null() || machine == self.machine {
            tracing::debug!("SetnumOutputChannels({})", n);
            self.output_channels = n;
        } else {
            tracing::debug!("SetnumOutputChannels({}) for foreign machine {:p}", n, machine);
        }
    }

    fn set_interface_ex(&mut self, ex: *mut RawMachineInterfaceEx) {
        tracing::debug!("SetMachineInterfaceEx({:p})", ex);
        self.interface_ex = ex;
        // Safety: the machine outlives its callbacks
        if let Some(machine) = unsafe { self.machine.as_mut() } {
            machine.set_interface_ex(ex);
        }
    }

    fn machine_info(&mut self, machine: *mut RawMachine) -> *const RawMachineInfo {
        if machine == self.machine {
            self.info
        } else {
            ptr::null()
        }
    }
}

impl Drop for HostState {
    fn drop(&mut self) {
        if !self.helper.is_null() {
            // Safety: allocated by mdk_helper and never freed elsewhere
            drop(unsafe { Box::from_raw(self.helper) });
            self.helper = ptr::null_mut();
        }
    }
}

/// The object whose address machines store in `pCB`.
#[repr(C)]
pub struct CallbackObject {
    vtable: *const c_void,
    state: HostState,
}

impl CallbackObject {
    pub fn new(
        generation: Generation,
        machine: *mut RawMachine,
        info: *const RawMachineInfo,
    ) -> Box<Self> {
        let vtable: *const c_void = match generation {
            Generation::Legacy => ptr::addr_of!(LEGACY_VTABLE).cast(),
            Generation::Current => ptr::addr_of!(CURRENT_VTABLE).cast(),
        };
        Box::new(Self {
            vtable,
            state: HostState::new(generation, machine, info),
        })
    }

    pub fn as_raw(&mut self) -> *mut RawCallbacks {
        (self as *mut Self).cast()
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut HostState {
        &mut self.state
    }
}

/// # Safety
/// `this` must be the address of a live `CallbackObject`.
unsafe fn host<'a>(this: *mut RawCallbacks) -> &'a mut HostState {
    &mut (*this.cast::<CallbackObject>()).state
}

unsafe fn lossy(text: *const c_char) -> String {
    crate::metadata::c_string(text)
}

macro_rules! unsupported {
    ($name:literal) => {
        tracing::trace!("{}() not supported", $name)
    };
    ($name:literal, $($arg:expr),+) => {
        tracing::trace!("{}{:?} not supported", $name, ($($arg,)+))
    };
}

// ---------------------------------------------------------------------------
// Legacy slots

unsafe extern "C" fn get_wave(this: *mut RawCallbacks, i: c_int) -> *const WaveInfo {
    host(this).wave(i)
}

unsafe extern "C" fn get_wave_level(
    this: *mut RawCallbacks,
    i: c_int,
    level: c_int,
) -> *const WaveLevel {
    host(this).wave_level(i, level)
}

unsafe extern "C" fn message_box(this: *mut RawCallbacks, text: *const c_char) {
    host(this).message_box(&lossy(text));
}

unsafe extern "C" fn lock(_this: *mut RawCallbacks) {
    unsupported!("Lock");
}

unsafe extern "C" fn unlock(_this: *mut RawCallbacks) {
    unsupported!("Unlock");
}

unsafe extern "C" fn get_write_pos(_this: *mut RawCallbacks) -> c_int {
    unsupported!("GetWritePos");
    0
}

unsafe extern "C" fn get_play_pos(_this: *mut RawCallbacks) -> c_int {
    unsupported!("GetPlayPos");
    0
}

unsafe extern "C" fn get_aux_buffer(this: *mut RawCallbacks) -> *mut f32 {
    host(this).aux_buffer()
}

unsafe extern "C" fn clear_aux_buffer(this: *mut RawCallbacks) {
    host(this).clear_aux_buffer();
}

unsafe extern "C" fn get_free_wave(_this: *mut RawCallbacks) -> c_int {
    unsupported!("GetFreeWave");
    0
}

unsafe extern "C" fn allocate_wave(
    _this: *mut RawCallbacks,
    i: c_int,
    size: c_int,
    _name: *const c_char,
) -> bool {
    unsupported!("AllocateWave", i, size);
    false
}

unsafe extern "C" fn schedule_event(_this: *mut RawCallbacks, time: c_int, data: Dword) {
    unsupported!("ScheduleEvent", time, data);
}

unsafe extern "C" fn midi_out(_this: *mut RawCallbacks, dev: c_int, data: Dword) {
    unsupported!("MidiOut", dev, data);
}

unsafe extern "C" fn get_oscillator_table(this: *mut RawCallbacks, waveform: c_int) -> *const i16 {
    host(this).oscillator_table(waveform)
}

unsafe extern "C" fn get_env_size(_this: *mut RawCallbacks, wave: c_int, env: c_int) -> c_int {
    unsupported!("GetEnvSize", wave, env);
    0
}

unsafe extern "C" fn get_env_point(
    _this: *mut RawCallbacks,
    wave: c_int,
    env: c_int,
    i: c_int,
    _x: *mut Word,
    _y: *mut Word,
    _flags: *mut c_int,
) -> bool {
    unsupported!("GetEnvPoint", wave, env, i);
    false
}

unsafe extern "C" fn get_nearest_wave_level(
    this: *mut RawCallbacks,
    i: c_int,
    note: c_int,
) -> *const WaveLevel {
    host(this).nearest_wave_level(i, note)
}

unsafe extern "C" fn set_number_of_tracks(_this: *mut RawCallbacks, n: c_int) {
    unsupported!("SetNumberOfTracks", n);
}

unsafe extern "C" fn create_pattern(
    _this: *mut RawCallbacks,
    _name: *const c_char,
    length: c_int,
) -> PatternPtr {
    unsupported!("CreatePattern", length);
    ptr::null_mut()
}

unsafe extern "C" fn get_pattern(_this: *mut RawCallbacks, index: c_int) -> PatternPtr {
    unsupported!("GetPattern", index);
    ptr::null_mut()
}

unsafe extern "C" fn get_pattern_name(_this: *mut RawCallbacks, _pattern: PatternPtr) -> *const c_char {
    unsupported!("GetPatternName");
    ptr::null()
}

unsafe extern "C" fn rename_pattern(
    _this: *mut RawCallbacks,
    _old_name: *const c_char,
    _new_name: *const c_char,
) {
    unsupported!("RenamePattern");
}

unsafe extern "C" fn delete_pattern(_this: *mut RawCallbacks, _pattern: PatternPtr) {
    unsupported!("DeletePattern");
}

unsafe extern "C" fn get_pattern_data(
    _this: *mut RawCallbacks,
    _pattern: PatternPtr,
    row: c_int,
    group: c_int,
    track: c_int,
    field: c_int,
) -> c_int {
    unsupported!("GetPatternData", row, group, track, field);
    0
}

unsafe extern "C" fn set_pattern_data(
    _this: *mut RawCallbacks,
    _pattern: PatternPtr,
    row: c_int,
    group: c_int,
    track: c_int,
    field: c_int,
    value: c_int,
) {
    unsupported!("SetPatternData", row, group, track, field, value);
}

unsafe extern "C" fn create_sequence(_this: *mut RawCallbacks) -> SequencePtr {
    unsupported!("CreateSequence");
    ptr::null_mut()
}

unsafe extern "C" fn delete_sequence(_this: *mut RawCallbacks, _sequence: SequencePtr) {
    unsupported!("DeleteSequence");
}

unsafe extern "C" fn get_sequence_data(_this: *mut RawCallbacks, row: c_int) -> PatternPtr {
    unsupported!("GetSequenceData", row);
    ptr::null_mut()
}

unsafe extern "C" fn set_sequence_data(_this: *mut RawCallbacks, row: c_int, _pattern: PatternPtr) {
    unsupported!("SetSequenceData", row);
}

// ---------------------------------------------------------------------------
// Slots added with interface version 15

unsafe extern "C" fn set_machine_interface_ex(
    this: *mut RawCallbacks,
    ex: *mut RawMachineInterfaceEx,
) {
    host(this).set_interface_ex(ex);
}

unsafe extern "C" fn control_change_obsolete(
    _this: *mut RawCallbacks,
    group: c_int,
    track: c_int,
    param: c_int,
    value: c_int,
) {
    unsupported!("ControlChange__obsolete__", group, track, param, value);
}

unsafe extern "C" fn ad_get_num_channels(_this: *mut RawCallbacks, input: bool) -> c_int {
    unsupported!("ADGetnumChannels", input);
    0
}

unsafe extern "C" fn ad_write(
    _this: *mut RawCallbacks,
    channel: c_int,
    _samples: *mut f32,
    num_samples: c_int,
) {
    unsupported!("ADWrite", channel, num_samples);
}

unsafe extern "C" fn ad_read(
    _this: *mut RawCallbacks,
    channel: c_int,
    _samples: *mut f32,
    num_samples: c_int,
) {
    unsupported!("ADRead", channel, num_samples);
}

unsafe extern "C" fn get_this_machine(this: *mut RawCallbacks) -> *mut RawMachine {
    host(this).this_machine()
}

unsafe extern "C" fn control_change(
    _this: *mut RawCallbacks,
    _machine: *mut RawMachine,
    group: c_int,
    track: c_int,
    param: c_int,
    value: c_int,
) {
    unsupported!("ControlChange", group, track, param, value);
}

unsafe extern "C" fn get_playing_sequence(
    _this: *mut RawCallbacks,
    _machine: *mut RawMachine,
) -> SequencePtr {
    unsupported!("GetPlayingSequence");
    ptr::null_mut()
}

unsafe extern "C" fn get_playing_row(
    _this: *mut RawCallbacks,
    _sequence: SequencePtr,
    group: c_int,
    track: c_int,
) -> *mut c_void {
    unsupported!("GetPlayingRow", group, track);
    ptr::null_mut()
}

unsafe extern "C" fn get_state_flags(_this: *mut RawCallbacks) -> c_int {
    unsupported!("GetStateFlags");
    0
}

unsafe extern "C" fn set_num_output_channels(
    this: *mut RawCallbacks,
    machine: *mut RawMachine,
    n: c_int,
) {
    host(this).set_output_channels(machine, n);
}

unsafe extern "C" fn set_event_handler(
    _this: *mut RawCallbacks,
    _machine: *mut RawMachine,
    event_type: c_int,
    _handler: MemberFnPtr,
    _param: *mut c_void,
) {
    unsupported!("SetEventHandler", event_type);
}

unsafe extern "C" fn get_wave_name(this: *mut RawCallbacks, i: c_int) -> *const c_char {
    let state = host(this);
    match state.waves.as_ref().and_then(|w| w.wave_name(i)) {
        Some(name) => name.as_ptr(),
        None => ptr::null(),
    }
}

unsafe extern "C" fn set_internal_wave_name(
    _this: *mut RawCallbacks,
    _machine: *mut RawMachine,
    i: c_int,
    _name: *const c_char,
) {
    unsupported!("SetInternalWaveName", i);
}

unsafe extern "C" fn get_machine_names(_this: *mut RawCallbacks, _out: *mut RawDataOutput) {
    unsupported!("GetMachineNames");
}

unsafe extern "C" fn get_machine(_this: *mut RawCallbacks, name: *const c_char) -> *mut RawMachine {
    unsupported!("GetMachine", lossy(name));
    ptr::null_mut()
}

unsafe extern "C" fn get_machine_info(
    this: *mut RawCallbacks,
    machine: *mut RawMachine,
) -> *const RawMachineInfo {
    host(this).machine_info(machine)
}

unsafe extern "C" fn get_machine_name(
    _this: *mut RawCallbacks,
    _machine: *mut RawMachine,
) -> *const c_char {
    unsupported!("GetMachineName");
    ptr::null()
}

unsafe extern "C" fn get_input(
    _this: *mut RawCallbacks,
    index: c_int,
    _samples: *mut f32,
    num_samples: c_int,
    stereo: bool,
    _extra: *mut f32,
) -> bool {
    unsupported!("GetInput", index, num_samples, stereo);
    false
}

const LEGACY_SLOTS: LegacyCallbacksVtable = LegacyCallbacksVtable {
    get_wave,
    get_wave_level,
    message_box,
    lock,
    unlock,
    get_write_pos,
    get_play_pos,
    get_aux_buffer,
    clear_aux_buffer,
    get_free_wave,
    allocate_wave,
    schedule_event,
    midi_out,
    get_oscillator_table,
    get_env_size,
    get_env_point,
    get_nearest_wave_level,
    set_number_of_tracks,
    create_pattern,
    get_pattern,
    get_pattern_name,
    rename_pattern,
    delete_pattern,
    get_pattern_data,
    set_pattern_data,
    create_sequence,
    delete_sequence,
    get_sequence_data,
    set_sequence_data,
};

static LEGACY_VTABLE: LegacyCallbacksVtable = LEGACY_SLOTS;

static CURRENT_VTABLE: CallbacksVtable = CallbacksVtable {
    legacy: LEGACY_SLOTS,
    set_machine_interface_ex,
    control_change_obsolete,
    ad_get_num_channels,
    ad_write,
    ad_read,
    get_this_machine,
    control_change,
    get_playing_sequence,
    get_playing_row,
    get_state_flags,
    set_num_output_channels,
    set_event_handler,
    get_wave_name,
    set_internal_wave_name,
    get_machine_names,
    get_machine,
    get_machine_info,
    get_machine_name,
    get_input,
};

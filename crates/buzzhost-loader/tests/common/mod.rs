//! Fake machines for integration tests.
//!
//! Each fake is a `#[repr(C)]` object whose first field is a
//! `CMachineInterface` with a hand-built vtable, behaving the way a compiled
//! machine does: it reads its version byte in `Init`, keeps its parameters in
//! packed buffers, and the MDK variant performs the helper handshake.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CStr};
use std::ptr;

use buzzhost_loader::abi::*;
use buzzhost_loader::mdk::{MdkHelper, MdkHelperVtable};
use buzzhost_loader::EntryPoints;

thread_local! {
    static CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

pub fn record(call: impl Into<String>) {
    CALLS.with(|c| c.borrow_mut().push(call.into()));
}

/// Calls recorded on this thread since the last `take_calls`.
pub fn take_calls() -> Vec<String> {
    CALLS.with(|c| std::mem::take(&mut *c.borrow_mut()))
}

pub fn param(kind: c_int, name: &'static CStr, min: c_int, max: c_int, none: c_int, flags: c_int, default: c_int) -> RawParameter {
    RawParameter {
        kind,
        name: name.as_ptr(),
        description: name.as_ptr(),
        min_value: min,
        max_value: max,
        no_value: none,
        flags,
        default_value: default,
    }
}

pub fn attribute(name: &'static CStr, min: c_int, max: c_int, default: c_int) -> RawAttribute {
    RawAttribute {
        name: name.as_ptr(),
        min_value: min,
        max_value: max,
        default_value: default,
    }
}

pub struct InfoDecl {
    pub kind: c_int,
    pub version: c_int,
    pub flags: c_int,
    pub min_tracks: c_int,
    pub max_tracks: c_int,
    pub globals: Vec<RawParameter>,
    pub tracks: Vec<RawParameter>,
    pub attributes: Vec<RawAttribute>,
    pub name: &'static CStr,
}

impl Default for InfoDecl {
    fn default() -> Self {
        Self {
            kind: MT_GENERATOR,
            version: MI_VERSION_CURRENT_CALLBACKS,
            flags: 0,
            min_tracks: 0,
            max_tracks: 0,
            globals: Vec::new(),
            tracks: Vec::new(),
            attributes: Vec::new(),
            name: c"Fake Machine",
        }
    }
}

/// Builds a `CMachineInfo` that lives for the rest of the test process.
pub fn leak_info(decl: InfoDecl) -> *mut RawMachineInfo {
    let num_globals = decl.globals.len() as c_int;
    let num_tracks = decl.tracks.len() as c_int;
    let params: Vec<*const RawParameter> = decl
        .globals
        .into_iter()
        .chain(decl.tracks)
        .map(|p| Box::into_raw(Box::new(p)) as *const RawParameter)
        .collect();
    let attrs: Vec<*const RawAttribute> = decl
        .attributes
        .into_iter()
        .map(|a| Box::into_raw(Box::new(a)) as *const RawAttribute)
        .collect();
    let num_attributes = attrs.len() as c_int;
    Box::into_raw(Box::new(RawMachineInfo {
        kind: decl.kind,
        version: decl.version,
        flags: decl.flags,
        min_tracks: decl.min_tracks,
        max_tracks: decl.max_tracks,
        num_global_parameters: num_globals,
        num_track_parameters: num_tracks,
        parameters: Box::leak(params.into_boxed_slice()).as_ptr(),
        num_attributes,
        attributes: Box::leak(attrs.into_boxed_slice()).as_ptr(),
        name: decl.name.as_ptr(),
        short_name: c"Fake".as_ptr(),
        author: c"Tests".as_ptr(),
        commands: c"About...".as_ptr(),
        lib_interface: ptr::null_mut(),
    }))
}

/// Packed buffer size for a list of parameter kinds.
fn packed_size(kinds: &[c_int]) -> usize {
    kinds
        .iter()
        .map(|kind| match *kind {
            PT_WORD => 2,
            PT_NOTE | PT_SWITCH | PT_BYTE => 1,
            _ => 0,
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Plain machine

#[repr(C)]
pub struct FakeMachine {
    pub iface: RawMachineInterface,
    pub ex: FakeEx,
    pub globals: Vec<u8>,
    pub tracks: Vec<u8>,
    pub attrs: Vec<c_int>,
    /// MDK helper handed out by the host, for MDK machines.
    pub helper: *mut MdkHelper,
    pub muted: Vec<bool>,
}

#[repr(C)]
pub struct FakeEx {
    pub raw: RawMachineInterfaceEx,
    pub owner: *mut FakeMachine,
}

impl FakeMachine {
    /// Allocates a machine whose buffers fit `info`.
    ///
    /// # Safety
    /// `info` must come from `leak_info`.
    pub unsafe fn create(info: *const RawMachineInfo, vtable: *const MachineInterfaceVtable) -> *mut RawMachineInterface {
        let info = &*info;
        let num_globals = info.num_global_parameters as usize;
        let kinds: Vec<c_int> = (0..num_globals + info.num_track_parameters as usize)
            .map(|i| (**info.parameters.add(i)).kind)
            .collect();
        let (globals, tracks) = kinds.split_at(num_globals);
        let track_size = packed_size(tracks) * info.max_tracks.max(0) as usize;

        let mut machine = Box::new(FakeMachine {
            iface: RawMachineInterface {
                vtable,
                global_vals: ptr::null_mut(),
                track_vals: ptr::null_mut(),
                attr_vals: ptr::null_mut(),
                master_info: ptr::null(),
                callbacks: ptr::null_mut(),
            },
            ex: FakeEx {
                raw: RawMachineInterfaceEx {
                    vtable: &MDK_EX_VTABLE,
                },
                owner: ptr::null_mut(),
            },
            globals: vec![0; packed_size(globals).max(1)],
            tracks: vec![0; track_size.max(1)],
            attrs: vec![0; info.num_attributes.max(1) as usize],
            helper: ptr::null_mut(),
            muted: vec![false; info.max_tracks.max(1) as usize],
        });
        machine.iface.global_vals = machine.globals.as_mut_ptr().cast();
        machine.iface.track_vals = machine.tracks.as_mut_ptr().cast();
        machine.iface.attr_vals = machine.attrs.as_mut_ptr();
        let raw = Box::into_raw(machine);
        (*raw).ex.owner = raw;
        raw.cast()
    }
}

unsafe fn fake<'a>(this: *mut RawMachineInterface) -> &'a mut FakeMachine {
    &mut *this.cast::<FakeMachine>()
}

unsafe fn legacy_callbacks<'a>(this: *mut RawMachineInterface) -> &'a LegacyCallbacksVtable {
    &*(*(*this).callbacks).vtable.cast::<LegacyCallbacksVtable>()
}

unsafe fn current_callbacks<'a>(this: *mut RawMachineInterface) -> &'a CallbacksVtable {
    &*(*(*this).callbacks).vtable.cast::<CallbacksVtable>()
}

unsafe fn read_version(input: *mut RawDataInput) -> u8 {
    let mut version = 0xffu8;
    if !input.is_null() {
        ((*(*input).vtable).read)(input, ptr::addr_of_mut!(version).cast(), 1);
    }
    version
}

unsafe extern "C" fn destroy_complete(_this: *mut RawMachineInterface) {
    record("destroy_complete");
}

unsafe extern "C" fn destroy(this: *mut RawMachineInterface) {
    record("destroy");
    drop(Box::from_raw(this.cast::<FakeMachine>()));
}

unsafe extern "C" fn init(this: *mut RawMachineInterface, input: *mut RawDataInput) {
    let m = fake(this);
    let version = read_version(input);
    let g0 = m.globals[0];
    let a0 = m.attrs[0];
    record(format!("init version={} g0={} a0={}", version, g0, a0));
    let cb = legacy_callbacks(this);
    let table = (cb.get_oscillator_table)((*this).callbacks, 0);
    record(format!("osc table {}", !table.is_null()));
    let master = &*(*this).master_info;
    record(format!("master spt={}", master.samples_per_tick));
}

unsafe extern "C" fn tick(_this: *mut RawMachineInterface) {
    record("tick");
}

/// Generator: writes the first global byte as a DC level.
unsafe extern "C" fn work(this: *mut RawMachineInterface, samples: *mut f32, n: c_int, mode: c_int) -> bool {
    let m = fake(this);
    record(format!("work n={} mode={}", n, mode));
    let out = std::slice::from_raw_parts_mut(samples, n as usize);
    out.fill(m.globals[0] as f32);
    true
}

unsafe extern "C" fn work_mono_to_stereo(
    _this: *mut RawMachineInterface,
    input: *mut f32,
    output: *mut f32,
    n: c_int,
    mode: c_int,
) -> bool {
    record(format!("work_m2s n={} mode={}", n, mode));
    let input = std::slice::from_raw_parts(input, n as usize);
    let output = std::slice::from_raw_parts_mut(output, 2 * n as usize);
    for (frame, s) in output.chunks_exact_mut(2).zip(input) {
        frame[0] = *s;
        frame[1] = -*s;
    }
    true
}

unsafe extern "C" fn stop(_this: *mut RawMachineInterface) {
    record("stop");
}

unsafe extern "C" fn save(this: *mut RawMachineInterface, output: *mut RawDataOutput) {
    let m = fake(this);
    let bytes = [1u8, m.globals[0]];
    ((*(*output).vtable).write)(output, bytes.as_ptr().cast(), bytes.len() as c_int);
}

unsafe extern "C" fn attributes_changed(this: *mut RawMachineInterface) {
    let m = fake(this);
    record(format!("attributes_changed g0={}", m.globals[0]));
}

unsafe extern "C" fn command(_this: *mut RawMachineInterface, i: c_int) {
    record(format!("command {}", i));
}

unsafe extern "C" fn set_num_tracks(this: *mut RawMachineInterface, n: c_int) {
    let m = fake(this);
    record(format!("set_num_tracks {} g0={}", n, m.globals[0]));
}

unsafe extern "C" fn mute_track(this: *mut RawMachineInterface, i: c_int) {
    if let Some(muted) = fake(this).muted.get_mut(i as usize) {
        *muted = true;
    }
}

unsafe extern "C" fn is_track_muted(this: *const RawMachineInterface, i: c_int) -> bool {
    let m = &*this.cast::<FakeMachine>();
    m.muted.get(i as usize).copied().unwrap_or(false)
}

unsafe extern "C" fn midi_note(_this: *mut RawMachineInterface, channel: c_int, value: c_int, velocity: c_int) {
    record(format!("midi_note {} {} {}", channel, value, velocity));
}

unsafe extern "C" fn event(_this: *mut RawMachineInterface, _data: Dword) {}

unsafe extern "C" fn describe_value(_this: *mut RawMachineInterface, param: c_int, value: c_int) -> *const c_char {
    match (param, value) {
        (1, 16) => c"16 ticks".as_ptr(),
        (2, _) => c"track value".as_ptr(),
        _ => ptr::null(),
    }
}

unsafe extern "C" fn get_envelope_infos(_this: *mut RawMachineInterface) -> *const *const EnvelopeInfo {
    ptr::null()
}

unsafe extern "C" fn play_wave(_this: *mut RawMachineInterface, _wave: c_int, _note: c_int, _volume: f32) -> bool {
    false
}

unsafe extern "C" fn stop_wave(_this: *mut RawMachineInterface) {}

unsafe extern "C" fn get_wave_env_play_pos(_this: *mut RawMachineInterface, _env: c_int) -> c_int {
    -1
}

pub static FAKE_VTABLE: MachineInterfaceVtable = MachineInterfaceVtable {
    destroy: destroy_complete,
    destroy_delete: destroy,
    init,
    tick,
    work,
    work_mono_to_stereo,
    stop,
    save,
    attributes_changed,
    command,
    set_num_tracks,
    mute_track,
    is_track_muted,
    midi_note,
    event,
    describe_value,
    get_envelope_infos,
    play_wave,
    stop_wave,
    get_wave_env_play_pos,
};

// ---------------------------------------------------------------------------
// MDK machine: routes Init, Work and input handling through the host helper.

unsafe fn helper_vtable<'a>(helper: *mut MdkHelper) -> &'a MdkHelperVtable {
    &**helper.cast::<*const MdkHelperVtable>()
}

unsafe extern "C" fn mdk_init_entry(this: *mut RawMachineInterface, input: *mut RawDataInput) {
    let m = fake(this);
    let cb = legacy_callbacks(this);
    let helper = (cb.get_nearest_wave_level)((*this).callbacks, -1, -1) as *mut MdkHelper;
    // pImp->pmi = this
    *helper.cast::<*mut RawMachineInterface>().add(1) = this;
    m.helper = helper;
    (current_callbacks(this).set_machine_interface_ex)((*this).callbacks, &mut m.ex.raw);
    (helper_vtable(helper).init)(helper, input);
}

unsafe extern "C" fn mdk_destroy(this: *mut RawMachineInterface) {
    record("destroy");
    let m = fake(this);
    if !m.helper.is_null() {
        // delete pImp
        (helper_vtable(m.helper).destroy_delete)(m.helper);
    }
    drop(Box::from_raw(this.cast::<FakeMachine>()));
}

unsafe extern "C" fn mdk_work_entry(this: *mut RawMachineInterface, samples: *mut f32, n: c_int, mode: c_int) -> bool {
    let helper = fake(this).helper;
    (helper_vtable(helper).work)(helper, samples, n, mode)
}

unsafe extern "C" fn mdk_work_m2s_entry(
    this: *mut RawMachineInterface,
    input: *mut f32,
    output: *mut f32,
    n: c_int,
    mode: c_int,
) -> bool {
    let helper = fake(this).helper;
    (helper_vtable(helper).work_mono_to_stereo)(helper, input, output, n, mode)
}

unsafe extern "C" fn mdk_save_entry(this: *mut RawMachineInterface, output: *mut RawDataOutput) {
    let helper = fake(this).helper;
    (helper_vtable(helper).save)(helper, output);
}

unsafe extern "C" fn get_ex(this: *mut RawMachineInterface) -> *mut RawMachineInterfaceEx {
    &mut fake(this).ex.raw
}

unsafe extern "C" fn output_mode_changed(_this: *mut RawMachineInterface, stereo: bool) {
    record(format!("output_mode_changed {}", stereo));
}

/// Records what the helper handed over and passes it through (effects keep
/// their input).
unsafe extern "C" fn mdk_work(_this: *mut RawMachineInterface, samples: *mut f32, n: c_int, mode: c_int) -> bool {
    let block = std::slice::from_raw_parts(samples, n as usize);
    record(format!("mdk_work n={} mode={} first={}", n, mode, block[0]));
    true
}

unsafe extern "C" fn mdk_work_stereo(_this: *mut RawMachineInterface, samples: *mut f32, n: c_int, mode: c_int) -> bool {
    let block = std::slice::from_raw_parts(samples, 2 * n as usize);
    record(format!("mdk_work_stereo n={} mode={} first={},{}", n, mode, block[0], block[1]));
    true
}

unsafe extern "C" fn mdk_init(_this: *mut RawMachineInterface, input: *mut RawDataInput) {
    let next = read_version(input);
    record(format!("mdk_init next={}", next));
}

unsafe extern "C" fn mdk_save(_this: *mut RawMachineInterface, output: *mut RawDataOutput) {
    let byte = 0x42u8;
    ((*(*output).vtable).write)(output, ptr::addr_of!(byte).cast(), 1);
}

const MDK_SLOTS: MdkMachineInterfaceVtable = MdkMachineInterfaceVtable {
    base: MachineInterfaceVtable {
        destroy: destroy_complete,
        destroy_delete: mdk_destroy,
        init: mdk_init_entry,
        tick,
        work: mdk_work_entry,
        work_mono_to_stereo: mdk_work_m2s_entry,
        stop,
        save: mdk_save_entry,
        attributes_changed,
        command,
        set_num_tracks,
        mute_track,
        is_track_muted,
        midi_note,
        event,
        describe_value,
        get_envelope_infos,
        play_wave,
        stop_wave,
        get_wave_env_play_pos,
    },
    get_ex,
    output_mode_changed,
    mdk_work,
    mdk_work_stereo,
    mdk_init,
    mdk_save,
};

pub static MDK_VTABLE: MdkMachineInterfaceVtable = MDK_SLOTS;

/// Asks for stereo output while initializing, like machines calling
/// `SetOutputMode(true)` from `MDKInit`.
unsafe extern "C" fn mdk_init_stereo(this: *mut RawMachineInterface, input: *mut RawDataInput) {
    mdk_init(this, input);
    let helper = fake(this).helper;
    (helper_vtable(helper).set_output_mode)(helper, true);
}

pub static MDK_STEREO_VTABLE: MdkMachineInterfaceVtable = MdkMachineInterfaceVtable {
    mdk_init: mdk_init_stereo,
    ..MDK_SLOTS
};

unsafe fn ex_owner<'a>(this: *mut RawMachineInterfaceEx) -> &'a mut FakeMachine {
    &mut *(*this.cast::<FakeEx>()).owner
}

unsafe extern "C" fn ex_describe_param(_this: *mut RawMachineInterfaceEx, param: c_int) -> *const c_char {
    if param == 0 {
        c"Level".as_ptr()
    } else {
        ptr::null()
    }
}

unsafe extern "C" fn ex_set_instrument(_this: *mut RawMachineInterfaceEx, _name: *const c_char) -> bool {
    false
}

unsafe extern "C" fn ex_get_sub_menu(_this: *mut RawMachineInterfaceEx, _i: c_int, _out: *mut RawDataOutput) {}

unsafe extern "C" fn ex_add_input(this: *mut RawMachineInterfaceEx, name: *const c_char, stereo: bool) {
    let helper = ex_owner(this).helper;
    (helper_vtable(helper).add_input)(helper, name, stereo);
}

unsafe extern "C" fn ex_delete_input(this: *mut RawMachineInterfaceEx, name: *const c_char) {
    let helper = ex_owner(this).helper;
    (helper_vtable(helper).delete_input)(helper, name);
}

unsafe extern "C" fn ex_rename_input(this: *mut RawMachineInterfaceEx, old_name: *const c_char, new_name: *const c_char) {
    let helper = ex_owner(this).helper;
    (helper_vtable(helper).rename_input)(helper, old_name, new_name);
}

unsafe extern "C" fn ex_input(this: *mut RawMachineInterfaceEx, samples: *mut f32, n: c_int, amp: f32) {
    let helper = ex_owner(this).helper;
    (helper_vtable(helper).input)(helper, samples, n, amp);
}

unsafe extern "C" fn ex_midi_control_change(_this: *mut RawMachineInterfaceEx, ctrl: c_int, channel: c_int, value: c_int) {
    record(format!("midi_cc {} {} {}", ctrl, channel, value));
}

unsafe extern "C" fn ex_set_input_channels(this: *mut RawMachineInterfaceEx, name: *const c_char, stereo: bool) {
    let helper = ex_owner(this).helper;
    (helper_vtable(helper).set_input_channels)(helper, name, stereo);
}

unsafe extern "C" fn ex_handle_input(_this: *mut RawMachineInterfaceEx, _index: c_int, _amp: c_int, _pan: c_int) -> bool {
    false
}

unsafe extern "C" fn ex_reserved(_this: *mut RawMachineInterfaceEx) {}

pub static MDK_EX_VTABLE: MachineInterfaceExVtable = MachineInterfaceExVtable {
    describe_param: ex_describe_param,
    set_instrument: ex_set_instrument,
    get_sub_menu: ex_get_sub_menu,
    add_input: ex_add_input,
    delete_input: ex_delete_input,
    rename_input: ex_rename_input,
    input: ex_input,
    midi_control_change: ex_midi_control_change,
    set_input_channels: ex_set_input_channels,
    handle_input: ex_handle_input,
    reserved: [ex_reserved; 32],
};

// ---------------------------------------------------------------------------
// Entry points

/// Declares `GetInfo`/`CreateMachine` for a fake machine. Every `GetInfo`
/// call builds fresh metadata so fix-ups in one test never leak into another.
macro_rules! machine_entry {
    ($name:ident, $vtable:expr, $decl:expr) => {
        pub mod $name {
            #[allow(unused_imports)]
            use super::*;

            thread_local! {
                static INFO: std::cell::Cell<*mut buzzhost_loader::abi::RawMachineInfo> =
                    const { std::cell::Cell::new(std::ptr::null_mut()) };
            }

            pub unsafe extern "C" fn get_info() -> *mut buzzhost_loader::abi::RawMachineInfo {
                let info = crate::common::leak_info($decl);
                INFO.with(|i| i.set(info));
                info
            }

            pub unsafe extern "C" fn create_machine() -> *mut buzzhost_loader::abi::RawMachineInterface {
                let info = INFO.with(|i| i.get());
                crate::common::FakeMachine::create(info, crate::common::vtable_ptr($vtable))
            }

            pub fn entry_points() -> buzzhost_loader::EntryPoints {
                buzzhost_loader::EntryPoints {
                    get_info,
                    create_machine,
                }
            }
        }
    };
}

/// Any of the fake vtables, as the plain machine vtable it starts with.
pub fn vtable_ptr<T>(vtable: &'static T) -> *const MachineInterfaceVtable {
    (vtable as *const T).cast()
}

pub unsafe extern "C" fn null_info() -> *mut RawMachineInfo {
    ptr::null_mut()
}

pub unsafe extern "C" fn null_machine() -> *mut RawMachineInterface {
    ptr::null_mut()
}

pub fn null_info_entry_points() -> EntryPoints {
    EntryPoints {
        get_info: null_info,
        create_machine: null_machine,
    }
}

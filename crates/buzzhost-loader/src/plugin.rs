//! Machine side of the boundary: safe wrappers over the interface objects a
//! library creates.
//!
//! [`MachineLifecycle`] is the set of calls the host makes into a machine.
//! [`PluginInterface`] implements it by dispatching through the machine's
//! vtable. [`PluginInterfaceEx`] wraps the optional extended interface a
//! machine registers with `SetMachineInterfaceEx`.

use std::ffi::{c_int, CString};
use std::ptr::{self, NonNull};

use crate::abi::{
    MachineInterfaceExVtable, MachineInterfaceVtable, MasterInfo, RawCallbacks,
    RawMachineInterface, RawMachineInterfaceEx,
};
use crate::metadata::c_string;
use crate::stream::{DataInput, DataOutput};

/// Calls the host makes into a machine.
pub trait MachineLifecycle {
    fn init(&mut self, input: &mut DataInput<'_>);

    fn tick(&mut self);

    /// `samples` is both input and output, one float per frame.
    fn work(&mut self, samples: &mut [f32], mode: i32) -> bool;

    /// `output` is interleaved stereo and twice as long as `input`.
    fn work_mono_to_stereo(&mut self, input: &mut [f32], output: &mut [f32], mode: i32) -> bool;

    fn stop(&mut self);

    fn save(&mut self, output: &mut DataOutput);

    fn attributes_changed(&mut self);

    fn command(&mut self, index: i32);

    fn set_num_tracks(&mut self, n: i32);

    fn mute_track(&mut self, track: i32);

    fn is_track_muted(&self, track: i32) -> bool;

    fn midi_note(&mut self, channel: i32, note: i32, velocity: i32);

    /// `None` when the machine has no text for the value.
    fn describe_value(&mut self, param: i32, value: i32) -> Option<String>;
}

/// Owned `CMachineInterface` created by `CreateMachine`.
pub struct PluginInterface {
    raw: NonNull<RawMachineInterface>,
}

impl PluginInterface {
    /// # Safety
    /// `raw` must be a live interface returned by the library's
    /// `CreateMachine`, not owned by anything else.
    pub unsafe fn from_raw(raw: NonNull<RawMachineInterface>) -> Self {
        Self { raw }
    }

    pub fn as_ptr(&self) -> *mut RawMachineInterface {
        self.raw.as_ptr()
    }

    fn vtable(&self) -> &MachineInterfaceVtable {
        // Safety: a live C++ object always carries its vtable pointer
        unsafe { &*(*self.raw.as_ptr()).vtable }
    }

    pub fn global_vals(&self) -> *mut u8 {
        unsafe { (*self.raw.as_ptr()).global_vals.cast() }
    }

    pub fn track_vals(&self) -> *mut u8 {
        unsafe { (*self.raw.as_ptr()).track_vals.cast() }
    }

    pub fn attr_vals(&self) -> *mut c_int {
        unsafe { (*self.raw.as_ptr()).attr_vals }
    }

    /// Points the machine at the shared timing and its callback object.
    ///
    /// # Safety
    /// Both pointers must stay valid until the interface is destroyed.
    pub unsafe fn wire(&mut self, master_info: *const MasterInfo, callbacks: *mut RawCallbacks) {
        let raw = &mut *self.raw.as_ptr();
        raw.master_info = master_info;
        raw.callbacks = callbacks;
    }

    /// Runs the machine's deleting destructor.
    ///
    /// # Safety
    /// The callback object and machine header must still be alive, since
    /// destructors of MDK machines call back into them.
    pub unsafe fn destroy(self) {
        (self.vtable().destroy_delete)(self.raw.as_ptr());
    }
}

impl MachineLifecycle for PluginInterface {
    fn init(&mut self, input: &mut DataInput<'_>) {
        unsafe { (self.vtable().init)(self.raw.as_ptr(), input.as_raw()) }
    }

    fn tick(&mut self) {
        unsafe { (self.vtable().tick)(self.raw.as_ptr()) }
    }

    fn work(&mut self, samples: &mut [f32], mode: i32) -> bool {
        unsafe {
            (self.vtable().work)(
                self.raw.as_ptr(),
                samples.as_mut_ptr(),
                samples.len() as c_int,
                mode,
            )
        }
    }

    fn work_mono_to_stereo(&mut self, input: &mut [f32], output: &mut [f32], mode: i32) -> bool {
        let n = input.len().min(output.len() / 2);
        unsafe {
            (self.vtable().work_mono_to_stereo)(
                self.raw.as_ptr(),
                input.as_mut_ptr(),
                output.as_mut_ptr(),
                n as c_int,
                mode,
            )
        }
    }

    fn stop(&mut self) {
        unsafe { (self.vtable().stop)(self.raw.as_ptr()) }
    }

    fn save(&mut self, output: &mut DataOutput) {
        unsafe { (self.vtable().save)(self.raw.as_ptr(), output.as_raw()) }
    }

    fn attributes_changed(&mut self) {
        unsafe { (self.vtable().attributes_changed)(self.raw.as_ptr()) }
    }

    fn command(&mut self, index: i32) {
        unsafe { (self.vtable().command)(self.raw.as_ptr(), index) }
    }

    fn set_num_tracks(&mut self, n: i32) {
        unsafe { (self.vtable().set_num_tracks)(self.raw.as_ptr(), n) }
    }

    fn mute_track(&mut self, track: i32) {
        unsafe { (self.vtable().mute_track)(self.raw.as_ptr(), track) }
    }

    fn is_track_muted(&self, track: i32) -> bool {
        unsafe { (self.vtable().is_track_muted)(self.raw.as_ptr(), track) }
    }

    fn midi_note(&mut self, channel: i32, note: i32, velocity: i32) {
        unsafe { (self.vtable().midi_note)(self.raw.as_ptr(), channel, note, velocity) }
    }

    fn describe_value(&mut self, param: i32, value: i32) -> Option<String> {
        let text = unsafe { (self.vtable().describe_value)(self.raw.as_ptr(), param, value) };
        if text.is_null() {
            None
        } else {
            Some(unsafe { c_string(text) })
        }
    }
}

/// Borrowed `CMachineInterfaceEx`. The machine owns it.
#[derive(Clone, Copy)]
pub struct PluginInterfaceEx {
    raw: NonNull<RawMachineInterfaceEx>,
}

fn c_name(name: &str) -> CString {
    CString::new(name.replace('\0', "")).unwrap_or_default()
}

impl PluginInterfaceEx {
    /// # Safety
    /// `raw` must stay valid for as long as the wrapper is used.
    pub unsafe fn from_raw(raw: *mut RawMachineInterfaceEx) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self { raw })
    }

    fn vtable(&self) -> &MachineInterfaceExVtable {
        unsafe { &*(*self.raw.as_ptr()).vtable }
    }

    pub fn describe_param(&self, param: i32) -> Option<String> {
        let text = unsafe { (self.vtable().describe_param)(self.raw.as_ptr(), param) };
        (!text.is_null()).then(|| unsafe { c_string(text) })
    }

    pub fn add_input(&self, name: &str, stereo: bool) {
        let name = c_name(name);
        unsafe { (self.vtable().add_input)(self.raw.as_ptr(), name.as_ptr(), stereo) }
    }

    pub fn delete_input(&self, name: &str) {
        let name = c_name(name);
        unsafe { (self.vtable().delete_input)(self.raw.as_ptr(), name.as_ptr()) }
    }

    pub fn rename_input(&self, old_name: &str, new_name: &str) {
        let old_name = c_name(old_name);
        let new_name = c_name(new_name);
        unsafe {
            (self.vtable().rename_input)(self.raw.as_ptr(), old_name.as_ptr(), new_name.as_ptr())
        }
    }

    pub fn set_input_channels(&self, name: &str, stereo: bool) {
        let name = c_name(name);
        unsafe { (self.vtable().set_input_channels)(self.raw.as_ptr(), name.as_ptr(), stereo) }
    }

    /// `None` marks an input that is silent this block. `frames` is the
    /// block length; stereo sources supply `2 * frames` samples.
    pub fn input(&self, samples: Option<&mut [f32]>, frames: usize, amp: f32) {
        let ptr = samples.map_or(ptr::null_mut(), |s| s.as_mut_ptr());
        unsafe { (self.vtable().input)(self.raw.as_ptr(), ptr, frames as c_int, amp) }
    }

    pub fn midi_control_change(&self, ctrl: i32, channel: i32, value: i32) {
        unsafe { (self.vtable().midi_control_change)(self.raw.as_ptr(), ctrl, channel, value) }
    }
}

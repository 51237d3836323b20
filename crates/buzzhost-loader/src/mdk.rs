//! Host side of the MDK helper (`CMDKImplementation`).
//!
//! Machines built on the MDK link a small static library that asks the host
//! for this object through `GetNearestWaveLevel(-1, -1)`, stores its own
//! interface in the second field and then routes input mixing, `Work`, `Init`
//! and `Save` through it. The helper owns a scratch buffer where every
//! connected input is summed before the machine's `MDKWork` runs.
//!
//! The object belongs to the callbacks of its instance. The machine's
//! destructor deletes it through the vtable, so both destructor slots are
//! no-ops.

use std::ffi::{c_char, c_int};
use std::ptr;
use std::slice;

use buzzhost_dsp::{
    add_mono_to_stereo, add_scaled, add_stereo_to_mono, copy, copy_mono_to_stereo, copy_scaled,
    copy_stereo_to_mono, zero, Channels,
};

use crate::abi::{
    MdkMachineInterfaceVtable, RawDataInput, RawDataOutput, RawMachineInterface, WM_READ,
};
use crate::callbacks::{HostServices, HostState};
use crate::machine::RawMachine;
use crate::metadata::c_string;

/// Largest block, in frames, the helper mixes in one call.
pub const MAX_BUFFER_LENGTH: usize = 256;

/// Version byte written ahead of the machine's own saved state.
pub const MDK_VERSION: u8 = 2;

#[repr(C)]
pub struct MdkHelperVtable {
    pub destroy: unsafe extern "C" fn(this: *mut MdkHelper),
    pub destroy_delete: unsafe extern "C" fn(this: *mut MdkHelper),
    pub add_input: unsafe extern "C" fn(this: *mut MdkHelper, name: *const c_char, stereo: bool),
    pub delete_input: unsafe extern "C" fn(this: *mut MdkHelper, name: *const c_char),
    pub rename_input: unsafe extern "C" fn(
        this: *mut MdkHelper,
        old_name: *const c_char,
        new_name: *const c_char,
    ),
    pub set_input_channels:
        unsafe extern "C" fn(this: *mut MdkHelper, name: *const c_char, stereo: bool),
    pub input: unsafe extern "C" fn(this: *mut MdkHelper, samples: *mut f32, n: c_int, amp: f32),
    pub work:
        unsafe extern "C" fn(this: *mut MdkHelper, samples: *mut f32, n: c_int, mode: c_int) -> bool,
    pub work_mono_to_stereo: unsafe extern "C" fn(
        this: *mut MdkHelper,
        input: *mut f32,
        output: *mut f32,
        n: c_int,
        mode: c_int,
    ) -> bool,
    pub init: unsafe extern "C" fn(this: *mut MdkHelper, input: *mut RawDataInput),
    pub save: unsafe extern "C" fn(this: *mut MdkHelper, output: *mut RawDataOutput),
    pub set_output_mode: unsafe extern "C" fn(this: *mut MdkHelper, stereo: bool),
}

#[derive(Debug, Clone, PartialEq)]
struct MdkInput {
    name: String,
    channels: Channels,
}

#[repr(C)]
pub struct MdkHelper {
    vtable: *const MdkHelperVtable,
    /// Written by the machine right after it gets the helper.
    pmi: *mut RawMachineInterface,
    host: *mut HostState,
    this_machine: *mut RawMachine,
    inputs: Vec<MdkInput>,
    cursor: usize,
    have_input: usize,
    channels: Channels,
    wanted_channels: Channels,
    buffer: Box<[f32]>,
}

impl MdkHelper {
    pub(crate) fn new(host: *mut HostState) -> Self {
        Self {
            vtable: &MDK_HELPER_VTABLE,
            pmi: ptr::null_mut(),
            host,
            this_machine: ptr::null_mut(),
            inputs: Vec::new(),
            cursor: 0,
            have_input: 0,
            channels: Channels::Mono,
            wanted_channels: Channels::Mono,
            buffer: vec![0.0; 2 * MAX_BUFFER_LENGTH].into_boxed_slice(),
        }
    }

    /// Channel count the machine currently produces.
    pub fn num_channels(&self) -> i32 {
        self.channels.count() as i32
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|i| i.name.as_str())
    }

    /// Number of inputs mixed into the scratch buffer this block.
    pub fn pending_inputs(&self) -> usize {
        self.have_input
    }

    /// Scratch buffer as mixed so far, interleaved when stereo.
    pub fn mixed(&self, frames: usize) -> &[f32] {
        let frames = frames.min(MAX_BUFFER_LENGTH);
        &self.buffer[..frames * self.channels.count()]
    }

    fn mdk_vtable(&self) -> Option<&MdkMachineInterfaceVtable> {
        // Safety: pmi is an MDK machine, so its vtable carries the MDK slots
        unsafe {
            self.pmi
                .as_ref()
                .map(|pmi| &*pmi.vtable.cast::<MdkMachineInterfaceVtable>())
        }
    }

    fn host(&mut self) -> Option<&mut HostState> {
        // Safety: the host state owns this helper and outlives it
        unsafe { self.host.as_mut() }
    }

    pub fn add_input(&mut self, name: &str, stereo: bool) {
        tracing::debug!("MDK AddInput({:?}, stereo={})", name, stereo);
        self.inputs.push(MdkInput {
            name: name.to_string(),
            channels: Channels::from_stereo(stereo),
        });
        self.update_output_mode();
    }

    pub fn delete_input(&mut self, name: &str) {
        tracing::debug!("MDK DeleteInput({:?})", name);
        if let Some(pos) = self.inputs.iter().position(|i| i.name == name) {
            self.inputs.remove(pos);
            self.update_output_mode();
        }
    }

    pub fn rename_input(&mut self, old_name: &str, new_name: &str) {
        if let Some(input) = self.inputs.iter_mut().find(|i| i.name == old_name) {
            input.name = new_name.to_string();
        }
    }

    pub fn set_input_channels(&mut self, name: &str, stereo: bool) {
        if let Some(input) = self.inputs.iter_mut().find(|i| i.name == name) {
            input.channels = Channels::from_stereo(stereo);
            self.update_output_mode();
        }
    }

    fn current_input_channels(&self) -> Channels {
        self.inputs
            .get(self.cursor)
            .map_or(Channels::Mono, |i| i.channels)
    }

    /// Mixes the next connected input into the scratch buffer. `None` means
    /// the input is silent this block and only advances the cursor.
    pub fn input(&mut self, samples: Option<&[f32]>, amp: f32) {
        let source = self.current_input_channels();
        self.cursor += 1;
        let Some(samples) = samples else {
            return;
        };
        let frames = (samples.len() / source.count()).min(MAX_BUFFER_LENGTH);
        let src = &samples[..frames * source.count()];
        let (dst, rest) = self.buffer.split_at_mut(frames * self.channels.count());
        let first = self.have_input == 0;
        if first {
            // A short first input must not leave last block's mix behind it
            zero(rest);
        }
        match (self.channels, source, first) {
            (Channels::Mono, Channels::Stereo, true) => copy_stereo_to_mono(dst, src, amp),
            (Channels::Mono, Channels::Stereo, false) => add_stereo_to_mono(dst, src, amp),
            (Channels::Stereo, Channels::Mono, true) => copy_mono_to_stereo(dst, src, amp),
            (Channels::Stereo, Channels::Mono, false) => add_mono_to_stereo(dst, src, amp),
            (_, _, true) => copy_scaled(dst, src, amp),
            (_, _, false) => add_scaled(dst, src, amp),
        }
        self.have_input += 1;
    }

    /// Runs one mono block through `MDKWork`.
    pub fn work(&mut self, out: &mut [f32], mode: i32) -> bool {
        unsafe { self.work_raw(out.as_mut_ptr(), out.len() as c_int, mode) }
    }

    /// # Safety
    /// `samples` must be null or hold `n` floats.
    unsafe fn work_raw(&mut self, samples: *mut f32, n: c_int, mode: c_int) -> bool {
        let frames = (n.max(0) as usize).min(MAX_BUFFER_LENGTH);
        if mode & WM_READ != 0 && self.have_input > 0 && !samples.is_null() {
            let out = slice::from_raw_parts_mut(samples, frames);
            copy(out, &self.buffer[..frames]);
        }
        let result = match self.mdk_vtable() {
            Some(vt) => (vt.mdk_work)(self.pmi, samples, n, mode),
            None => false,
        };
        self.cursor = 0;
        self.have_input = 0;
        result
    }

    /// Runs one stereo block through `MDKWorkStereo`. `out` is interleaved.
    pub fn work_stereo(&mut self, out: &mut [f32], mode: i32) -> bool {
        unsafe { self.work_mono_to_stereo_raw(out.as_mut_ptr(), (out.len() / 2) as c_int, mode) }
    }

    /// # Safety
    /// `output` must be null or hold `2 * n` floats.
    unsafe fn work_mono_to_stereo_raw(&mut self, output: *mut f32, n: c_int, mode: c_int) -> bool {
        let frames = (n.max(0) as usize).min(MAX_BUFFER_LENGTH);
        if mode & WM_READ != 0 && self.have_input > 0 && !output.is_null() {
            let out = slice::from_raw_parts_mut(output, 2 * frames);
            copy(out, &self.buffer[..2 * frames]);
        }
        let result = match self.mdk_vtable() {
            Some(vt) => (vt.mdk_work_stereo)(self.pmi, output, n, mode),
            None => false,
        };
        self.cursor = 0;
        self.have_input = 0;
        result
    }

    /// # Safety
    /// `input` must be null or a live data input object.
    pub unsafe fn init(&mut self, input: *mut RawDataInput) {
        self.this_machine = self
            .host()
            .map_or(ptr::null_mut(), |host| host.this_machine());
        self.channels = Channels::Mono;
        self.wanted_channels = Channels::Mono;
        self.cursor = 0;
        self.have_input = 0;
        if let Some(reader) = input.as_mut() {
            let mut version = 0u8;
            ((*reader.vtable).read)(reader, ptr::addr_of_mut!(version).cast(), 1);
            tracing::debug!("MDK helper init, saved version {}", version);
        }
        if let Some(vt) = self.mdk_vtable() {
            (vt.mdk_init)(self.pmi, input);
        }
    }

    /// # Safety
    /// `output` must be null or a live data output object.
    pub unsafe fn save(&mut self, output: *mut RawDataOutput) {
        if let Some(writer) = output.as_mut() {
            let version = MDK_VERSION;
            ((*writer.vtable).write)(writer, ptr::addr_of!(version).cast(), 1);
        }
        if let Some(vt) = self.mdk_vtable() {
            (vt.mdk_save)(self.pmi, output);
        }
    }

    /// The machine asks for a fixed output layout.
    pub fn set_output_mode(&mut self, stereo: bool) {
        self.channels = Channels::from_stereo(stereo);
        self.wanted_channels = self.channels;
        self.notify_output_mode();
    }

    /// Recomputes the output layout after the input set changed: stereo if
    /// the machine asked for it or any input is stereo.
    fn update_output_mode(&mut self) {
        self.cursor = 0;
        self.have_input = 0;
        self.channels = if self.wanted_channels.is_stereo()
            || self.inputs.iter().any(|i| i.channels.is_stereo())
        {
            Channels::Stereo
        } else {
            Channels::Mono
        };
        self.notify_output_mode();
    }

    fn notify_output_mode(&mut self) {
        let n = self.num_channels();
        let machine = self.this_machine;
        if let Some(host) = self.host() {
            host.set_output_channels(machine, n);
        }
        let stereo = self.channels.is_stereo();
        if let Some(vt) = self.mdk_vtable() {
            unsafe { (vt.output_mode_changed)(self.pmi, stereo) };
        }
    }
}

/// # Safety
/// `this` must be the address of a live `MdkHelper`.
unsafe fn helper<'a>(this: *mut MdkHelper) -> &'a mut MdkHelper {
    &mut *this
}

unsafe extern "C" fn destroy(_this: *mut MdkHelper) {
    tracing::trace!("MDK helper destructor ignored");
}

unsafe extern "C" fn add_input(this: *mut MdkHelper, name: *const c_char, stereo: bool) {
    helper(this).add_input(&c_string(name), stereo);
}

unsafe extern "C" fn delete_input(this: *mut MdkHelper, name: *const c_char) {
    helper(this).delete_input(&c_string(name));
}

unsafe extern "C" fn rename_input(
    this: *mut MdkHelper,
    old_name: *const c_char,
    new_name: *const c_char,
) {
    helper(this).rename_input(&c_string(old_name), &c_string(new_name));
}

unsafe extern "C" fn set_input_channels(this: *mut MdkHelper, name: *const c_char, stereo: bool) {
    helper(this).set_input_channels(&c_string(name), stereo);
}

unsafe extern "C" fn input(this: *mut MdkHelper, samples: *mut f32, n: c_int, amp: f32) {
    let helper = helper(this);
    if samples.is_null() {
        helper.input(None, amp);
        return;
    }
    let frames = (n.max(0) as usize).min(MAX_BUFFER_LENGTH);
    let len = frames * helper.current_input_channels().count();
    helper.input(Some(slice::from_raw_parts(samples, len)), amp);
}

unsafe extern "C" fn work(this: *mut MdkHelper, samples: *mut f32, n: c_int, mode: c_int) -> bool {
    helper(this).work_raw(samples, n, mode)
}

unsafe extern "C" fn work_mono_to_stereo(
    this: *mut MdkHelper,
    _input: *mut f32,
    output: *mut f32,
    n: c_int,
    mode: c_int,
) -> bool {
    helper(this).work_mono_to_stereo_raw(output, n, mode)
}

unsafe extern "C" fn init(this: *mut MdkHelper, input: *mut RawDataInput) {
    helper(this).init(input);
}

unsafe extern "C" fn save(this: *mut MdkHelper, output: *mut RawDataOutput) {
    helper(this).save(output);
}

unsafe extern "C" fn set_output_mode(this: *mut MdkHelper, stereo: bool) {
    helper(this).set_output_mode(stereo);
}

static MDK_HELPER_VTABLE: MdkHelperVtable = MdkHelperVtable {
    destroy,
    destroy_delete: destroy,
    add_input,
    delete_input,
    rename_input,
    set_input_channels,
    input,
    work,
    work_mono_to_stereo,
    init,
    save,
    set_output_mode,
};

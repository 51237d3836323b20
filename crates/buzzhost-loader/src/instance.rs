//! A running machine.
//!
//! An [`Instance`] owns the interface object the library created, the Buzz
//! compatible machine header, and the callback object of the generation the
//! machine was built for. Parameter and attribute access goes straight to the
//! packed value buffers the machine exposes.

use std::ffi::c_int;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::Arc;

use buzzhost_dsp::Channels;

use crate::callbacks::{CallbackObject, WaveProvider};
use crate::error::{LoadStage, LoaderError, Result};
use crate::loader::LoadedLibrary;
use crate::machine::RawMachine;
use crate::master::MasterTiming;
use crate::mdk::MdkHelper;
use crate::metadata::{initial_value, Generation, MachineInfo};
use crate::params::{read_field, write_field};
use crate::plugin::{MachineLifecycle, PluginInterface, PluginInterfaceEx};
use crate::stream::{DataInput, DataOutput};

/// When parameter slots get their initial values relative to `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitOrder {
    /// Shipped order: `Init`, `AttributesChanged`, `SetNumTracks`, then
    /// parameters.
    #[default]
    ParamsAfterInit,
    /// For machines that read their parameters inside `Init`.
    ParamsBeforeInit,
}

pub struct Instance {
    plugin: ManuallyDrop<PluginInterface>,
    callbacks: Box<CallbackObject>,
    machine: Box<RawMachine>,
    /// Owned by the callbacks; cached once the machine finishes wiring.
    helper: *mut MdkHelper,
    /// Inputs registered through the extended interface, in connection
    /// order, and the next one `input` feeds this block.
    inputs: Vec<(String, Channels)>,
    input_cursor: usize,
    library: Arc<LoadedLibrary>,
    _timing: Arc<MasterTiming>,
}

// Safety: an instance is only ever driven from one thread at a time. Nothing
// in it is shared with other instances except the immutable library data and
// the master timing.
unsafe impl Send for Instance {}

impl Instance {
    pub(crate) fn new(library: Arc<LoadedLibrary>, timing: Arc<MasterTiming>) -> Result<Self> {
        let raw = unsafe { (library.entry_points.create_machine)() };
        let raw = NonNull::new(raw).ok_or_else(|| {
            LoaderError::load_failed(
                &library.path,
                LoadStage::Instantiation,
                "CreateMachine returned null",
            )
        })?;
        let mut plugin = unsafe { PluginInterface::from_raw(raw) };

        let info = library.info;
        let mut machine = Box::new(unsafe {
            RawMachine::new(
                plugin.as_ptr(),
                info.as_ptr(),
                library.layout.global_size(),
                library.layout.track_size(),
            )
        });
        let generation = info.generation();
        let mut callbacks = CallbackObject::new(generation, &mut *machine, info.as_ptr());
        unsafe { plugin.wire(timing.as_ptr(), callbacks.as_raw()) };

        tracing::debug!(
            "Created instance of {:?} ({:?} callbacks)",
            info.name(),
            generation
        );

        Ok(Self {
            plugin: ManuallyDrop::new(plugin),
            callbacks,
            machine,
            helper: std::ptr::null_mut(),
            inputs: Vec::new(),
            input_cursor: 0,
            library,
            _timing: timing,
        })
    }

    pub fn info(&self) -> MachineInfo {
        self.library.info
    }

    pub fn generation(&self) -> Generation {
        self.callbacks.state().generation()
    }

    pub fn machine(&self) -> &RawMachine {
        &self.machine
    }

    /// Brings a fresh instance into a playable state, loading `blob` as its
    /// saved data. An empty blob reads as zeros.
    pub fn initialize(&mut self, blob: &[u8]) {
        let info = self.info();
        let _span = tracing::debug_span!("initialize", machine = %info.name()).entered();

        let attrs = self.plugin.attr_vals();
        if !attrs.is_null() {
            for i in 0..info.num_attributes() {
                if let Some(attr) = info.attribute(i) {
                    unsafe { *attrs.add(i) = attr.default_value };
                }
            }
        }

        if self.library.init_order == InitOrder::ParamsBeforeInit {
            tracing::debug!("writing parameters before Init");
            self.init_parameters();
        }

        let mut input = DataInput::new(blob);
        self.plugin.init(&mut input);
        tracing::debug!("Init done, {} blob bytes unread", input.remaining());

        if self.generation() == Generation::Current
            && !self.callbacks.state().interface_ex().is_null()
        {
            self.helper = self.callbacks.state().helper_ptr();
            if !self.helper.is_null() {
                tracing::debug!("machine uses the MDK helper");
            }
        }

        self.plugin.attributes_changed();
        self.plugin.set_num_tracks(info.min_tracks());

        if self.library.init_order == InitOrder::ParamsAfterInit {
            self.init_parameters();
        }
    }

    fn init_parameters(&mut self) {
        let info = self.info();
        for i in 0..info.num_global_parameters() {
            if let Some(param) = info.global_parameter(i) {
                self.set_global_parameter_value(i, initial_value(param));
            }
        }
        for track in 0..info.max_tracks().max(0) as usize {
            for i in 0..info.num_track_parameters() {
                if let Some(param) = info.track_parameter(i) {
                    self.set_track_parameter_value(track, i, initial_value(param));
                }
            }
        }
    }

    pub fn run_block(&mut self, samples: &mut [f32], mode: i32) -> bool {
        self.input_cursor = 0;
        self.plugin.work(samples, mode)
    }

    /// `output` must hold at least twice as many floats as `input`.
    pub fn run_block_mono_to_stereo(
        &mut self,
        input: &mut [f32],
        output: &mut [f32],
        mode: i32,
    ) -> bool {
        if output.len() < 2 * input.len() {
            tracing::debug!(
                "stereo output of {} floats too short for {} frames",
                output.len(),
                input.len()
            );
            return false;
        }
        self.input_cursor = 0;
        self.plugin.work_mono_to_stereo(input, output, mode)
    }

    pub fn tick(&mut self) {
        self.plugin.tick();
    }

    pub fn stop(&mut self) {
        self.plugin.stop();
    }

    pub fn set_num_tracks(&mut self, n: i32) {
        self.plugin.set_num_tracks(n);
    }

    /// Only forwarded for machines that declare attributes.
    pub fn attributes_changed(&mut self) {
        if self.info().num_attributes() > 0 {
            self.plugin.attributes_changed();
        }
    }

    pub fn command(&mut self, index: i32) {
        self.plugin.command(index);
    }

    pub fn mute_track(&mut self, track: i32) {
        self.plugin.mute_track(track);
    }

    pub fn is_track_muted(&self, track: i32) -> bool {
        self.plugin.is_track_muted(track)
    }

    pub fn midi_note(&mut self, channel: i32, note: i32, velocity: i32) {
        self.plugin.midi_note(channel, note, velocity);
    }

    /// Text for a parameter value, by absolute parameter index. Empty when
    /// the machine has none.
    pub fn describe_value(&mut self, param: i32, value: i32) -> String {
        let total = self.info().num_global_parameters() + self.info().num_track_parameters();
        if param < 0 || param as usize >= total {
            return String::new();
        }
        self.plugin.describe_value(param, value).unwrap_or_default()
    }

    /// Writes the machine's saved state to `writer`.
    pub fn save<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.save_to_vec())?;
        Ok(())
    }

    pub fn save_to_vec(&mut self) -> Vec<u8> {
        let mut output = DataOutput::new();
        self.plugin.save(&mut output);
        output.into_inner()
    }

    pub fn attribute_value(&self, index: usize) -> i32 {
        let attrs = self.plugin.attr_vals();
        if index >= self.info().num_attributes() || attrs.is_null() {
            return 0;
        }
        unsafe { *attrs.add(index) }
    }

    pub fn set_attribute_value(&mut self, index: usize, value: i32) {
        let attrs = self.plugin.attr_vals();
        if index >= self.info().num_attributes() || attrs.is_null() {
            return;
        }
        unsafe { *attrs.add(index) = value as c_int };
    }

    pub fn global_parameter_value(&self, index: usize) -> i32 {
        let base = self.plugin.global_vals();
        match self.library.layout.global_field(index) {
            Some(field) if !base.is_null() => unsafe { read_field(base, field) },
            _ => 0,
        }
    }

    pub fn set_global_parameter_value(&mut self, index: usize, value: i32) {
        let base = self.plugin.global_vals();
        if let Some(field) = self.library.layout.global_field(index) {
            if !base.is_null() {
                unsafe { write_field(base, field, value) };
            }
        }
    }

    pub fn track_parameter_value(&self, track: usize, index: usize) -> i32 {
        let base = self.plugin.track_vals();
        match self.library.layout.track_field(track, index) {
            Some(field) if !base.is_null() => unsafe { read_field(base, field) },
            _ => 0,
        }
    }

    pub fn set_track_parameter_value(&mut self, track: usize, index: usize, value: i32) {
        let base = self.plugin.track_vals();
        if let Some(field) = self.library.layout.track_field(track, index) {
            if !base.is_null() {
                unsafe { write_field(base, field, value) };
            }
        }
    }

    /// Extended interface, for current-generation machines that registered
    /// one.
    fn interface_ex(&self) -> Option<PluginInterfaceEx> {
        if self.generation() != Generation::Current {
            return None;
        }
        unsafe { PluginInterfaceEx::from_raw(self.callbacks.state().interface_ex()) }
    }

    pub fn has_interface_ex(&self) -> bool {
        self.interface_ex().is_some()
    }

    pub fn add_input(&mut self, name: &str, stereo: bool) {
        if let Some(ex) = self.interface_ex() {
            self.inputs.push((name.to_string(), Channels::from_stereo(stereo)));
            ex.add_input(name, stereo);
        }
    }

    pub fn delete_input(&mut self, name: &str) {
        if let Some(ex) = self.interface_ex() {
            if let Some(pos) = self.inputs.iter().position(|(n, _)| n == name) {
                self.inputs.remove(pos);
            }
            ex.delete_input(name);
        }
    }

    pub fn rename_input(&mut self, old_name: &str, new_name: &str) {
        if let Some(ex) = self.interface_ex() {
            if let Some(input) = self.inputs.iter_mut().find(|(n, _)| n == old_name) {
                input.0 = new_name.to_string();
            }
            ex.rename_input(old_name, new_name);
        }
    }

    pub fn set_input_channels(&mut self, name: &str, stereo: bool) {
        if let Some(ex) = self.interface_ex() {
            if let Some(input) = self.inputs.iter_mut().find(|(n, _)| n == name) {
                input.1 = Channels::from_stereo(stereo);
            }
            ex.set_input_channels(name, stereo);
        }
    }

    /// Feeds the next connected input for this block. `stereo` says how
    /// `samples` is laid out; `None` marks a silent input.
    ///
    /// The machine reads the input with the layout it was registered with,
    /// so the frame count always comes from that layout. A slice shorter
    /// than that layout needs is passed as fewer frames.
    pub fn input(&mut self, samples: Option<&mut [f32]>, stereo: bool, amp: f32) {
        let Some(ex) = self.interface_ex() else {
            return;
        };
        let registered = self
            .inputs
            .get(self.input_cursor)
            .map_or(Channels::Mono, |(_, channels)| *channels);
        self.input_cursor += 1;
        if samples.is_some() && registered.is_stereo() != stereo {
            tracing::warn!(
                "input {} fed as {} but registered as {:?}",
                self.input_cursor - 1,
                if stereo { "stereo" } else { "mono" },
                registered
            );
        }
        let frames = samples.as_ref().map_or(0, |s| s.len() / registered.count());
        ex.input(samples, frames, amp);
    }

    pub fn midi_control_change(&mut self, ctrl: i32, channel: i32, value: i32) {
        if let Some(ex) = self.interface_ex() {
            ex.midi_control_change(ctrl, channel, value);
        }
    }

    pub fn describe_param(&mut self, param: i32) -> String {
        self.interface_ex()
            .and_then(|ex| ex.describe_param(param))
            .unwrap_or_default()
    }

    pub fn set_wave_provider(&mut self, provider: Option<Box<dyn WaveProvider>>) {
        self.callbacks.state_mut().set_wave_provider(provider);
    }

    /// Output channel count last announced by the machine or its helper.
    pub fn output_channels(&self) -> i32 {
        self.callbacks.state().output_channels()
    }

    /// Channel count of the MDK helper, if the machine uses one.
    pub fn shim_channels(&self) -> Option<i32> {
        unsafe { self.helper.as_ref() }.map(MdkHelper::num_channels)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        tracing::debug!("Destroying instance of {:?}", self.info().name());
        // The machine goes first: its destructor may still call into the
        // callbacks and the helper they own.
        let plugin = unsafe { ManuallyDrop::take(&mut self.plugin) };
        unsafe { plugin.destroy() };
        self.helper = std::ptr::null_mut();
    }
}

//! Buzz-compatible `CMachine` object.
//!
//! Machines receive a pointer to this from `GetThisMachine` and some read
//! fields straight out of it (short name, interface pointers, mute state), so
//! the header mirrors the original host's bookkeeping struct byte for byte.
//! Offsets in the field comments are for 32-bit targets.

use std::ffi::{c_char, c_int, c_void};
use std::ptr;

use crate::abi::{Dword, RawMachineInfo, RawMachineInterface, RawMachineInterfaceEx, MT_GENERATOR};

pub const HEADER_GENERATOR: Dword = 0x004b_3758;
pub const HEADER_EFFECT: Dword = 0x004b_3708;

#[repr(C)]
pub struct RawMachine {
    header: Dword,                   // 0x00
    _placeholder: [u8; 16],          // 0x04
    short_name: *const c_char,       // 0x14
    _placeholder2: [u8; 52],         // 0x18
    machine_interface: *mut c_void,  // 0x4C
    machine_ex: *mut c_void,         // 0x50
    _placeholder3: [u8; 20],         // 0x54
    global_state: *mut c_void,       // 0x68
    track_state: *mut c_void,        // 0x6C
    _placeholder4: [u8; 16],         // 0x70
    machine_interface2: *mut c_void, // 0x80
    global_size: Dword,              // 0x84
    track_size: Dword,               // 0x88
    _unk1: Dword,                    // 0x8C
    _unk2: Dword,                    // 0x90
    global_params: Dword,            // 0x94
    track_params: Dword,             // 0x98
    _placeholder5: [u8; 76],         // 0x9C
    seq_command: c_int,              // 0xE8: 0 = --, 1 = mute, 2 = thru
    _placeholder6: [u8; 17],         // 0xEC
    hard_muted: bool,                // 0xFD
    // Host-only fields past the compatible header.
    interface: *mut RawMachineInterface,
    info: *const RawMachineInfo,
}

impl RawMachine {
    /// Builds the header for a freshly created interface.
    ///
    /// # Safety
    /// `interface` and `info` must point to live objects.
    pub(crate) unsafe fn new(
        interface: *mut RawMachineInterface,
        info: *const RawMachineInfo,
        global_size: usize,
        track_size: usize,
    ) -> Self {
        let mi = &*info;
        let iface = &*interface;
        Self {
            header: if mi.kind == MT_GENERATOR {
                HEADER_GENERATOR
            } else {
                HEADER_EFFECT
            },
            _placeholder: [0; 16],
            short_name: mi.short_name,
            _placeholder2: [0; 52],
            machine_interface: interface.cast(),
            machine_ex: ptr::null_mut(),
            _placeholder3: [0; 20],
            global_state: iface.global_vals,
            track_state: iface.track_vals,
            _placeholder4: [0; 16],
            machine_interface2: interface.cast(),
            global_size: global_size as Dword,
            track_size: track_size as Dword,
            _unk1: 0,
            _unk2: 0,
            global_params: mi.num_global_parameters as Dword,
            track_params: mi.num_track_parameters as Dword,
            _placeholder5: [0; 76],
            seq_command: 0,
            _placeholder6: [0; 17],
            hard_muted: false,
            interface,
            info,
        }
    }

    /// Interface object this header describes.
    pub fn interface(&self) -> *mut RawMachineInterface {
        self.interface
    }

    pub fn info(&self) -> *const RawMachineInfo {
        self.info
    }

    pub fn header(&self) -> Dword {
        self.header
    }

    pub fn is_hard_muted(&self) -> bool {
        self.hard_muted
    }

    pub fn set_hard_muted(&mut self, muted: bool) {
        self.hard_muted = muted;
    }

    pub fn global_size(&self) -> usize {
        self.global_size as usize
    }

    pub fn track_size(&self) -> usize {
        self.track_size as usize
    }

    pub(crate) fn set_interface_ex(&mut self, ex: *mut RawMachineInterfaceEx) {
        self.machine_ex = ex.cast();
    }

    pub fn interface_ex(&self) -> *mut RawMachineInterfaceEx {
        self.machine_ex.cast()
    }
}

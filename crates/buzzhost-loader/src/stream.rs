//! `CMachineDataInput` / `CMachineDataOutput` objects handed to machines for
//! loading and saving their private state.

use std::ffi::{c_int, c_void};
use std::ptr;

use crate::abi::{DataInputVtable, DataOutputVtable, RawDataInput, RawDataOutput};

/// Reader over a saved blob. Reads past the end yield zero bytes, so a
/// machine always finds its leading version byte even with no blob.
#[repr(C)]
pub struct DataInput<'a> {
    raw: RawDataInput,
    remaining: &'a [u8],
}

static DATA_INPUT_VTABLE: DataInputVtable = DataInputVtable { read: data_input_read };

unsafe extern "C" fn data_input_read(this: *mut RawDataInput, buf: *mut c_void, len: c_int) {
    if this.is_null() || buf.is_null() || len <= 0 {
        return;
    }
    let input = &mut *this.cast::<DataInput<'_>>();
    let out = std::slice::from_raw_parts_mut(buf.cast::<u8>(), len as usize);
    input.read(out);
}

impl<'a> DataInput<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        Self {
            raw: RawDataInput {
                vtable: &DATA_INPUT_VTABLE,
            },
            remaining: blob,
        }
    }

    pub fn read(&mut self, out: &mut [u8]) {
        let n = out.len().min(self.remaining.len());
        out[..n].copy_from_slice(&self.remaining[..n]);
        out[n..].fill(0);
        if n < out.len() {
            tracing::trace!("data input: {} of {} bytes past end", out.len() - n, out.len());
        }
        self.remaining = &self.remaining[n..];
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn as_raw(&mut self) -> *mut RawDataInput {
        ptr::addr_of_mut!(self.raw)
    }
}

/// Writer collecting whatever a machine saves.
#[repr(C)]
pub struct DataOutput {
    raw: RawDataOutput,
    data: Vec<u8>,
}

static DATA_OUTPUT_VTABLE: DataOutputVtable = DataOutputVtable {
    write: data_output_write,
};

unsafe extern "C" fn data_output_write(this: *mut RawDataOutput, buf: *const c_void, len: c_int) {
    if this.is_null() || buf.is_null() || len <= 0 {
        return;
    }
    let output = &mut *this.cast::<DataOutput>();
    output.write(std::slice::from_raw_parts(buf.cast::<u8>(), len as usize));
}

impl DataOutput {
    pub fn new() -> Self {
        Self {
            raw: RawDataOutput {
                vtable: &DATA_OUTPUT_VTABLE,
            },
            data: Vec::new(),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn as_raw(&mut self) -> *mut RawDataOutput {
        ptr::addr_of_mut!(self.raw)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Default for DataOutput {
    fn default() -> Self {
        Self::new()
    }
}

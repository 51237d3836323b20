//! Packed parameter buffers.
//!
//! Machines keep their current global and track values in dense byte regions
//! (`GlobalVals`, `TrackVals`) with no padding: note, switch and byte fields
//! take one byte, word fields two. A field's offset is the sum of the widths
//! declared before it. `ParamLayout` precomputes those offsets once per
//! library; [`locate`] is the plain walk they must agree with.

use std::ffi::c_int;

use serde::{Deserialize, Serialize};

use crate::abi::{PT_BYTE, PT_NOTE, PT_SWITCH, PT_WORD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Note,
    Switch,
    Byte,
    Word,
}

impl ParamType {
    pub fn from_raw(kind: c_int) -> Option<Self> {
        match kind {
            PT_NOTE => Some(ParamType::Note),
            PT_SWITCH => Some(ParamType::Switch),
            PT_BYTE => Some(ParamType::Byte),
            PT_WORD => Some(ParamType::Word),
            _ => None,
        }
    }

    pub fn width(self) -> usize {
        match self {
            ParamType::Note | ParamType::Switch | ParamType::Byte => 1,
            ParamType::Word => 2,
        }
    }
}

/// Storage width of a raw type tag. Unknown tags occupy no bytes.
pub fn field_width(kind: c_int) -> usize {
    ParamType::from_raw(kind).map_or(0, ParamType::width)
}

/// Byte offset of field `index` in a section with the given field widths.
pub fn locate(widths: &[usize], index: usize) -> Option<usize> {
    if index >= widths.len() {
        return None;
    }
    Some(widths[..index].iter().sum())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub width: usize,
}

#[derive(Debug, Clone, Default)]
struct Section {
    offsets: Vec<usize>,
    widths: Vec<usize>,
    size: usize,
}

impl Section {
    fn new(kinds: &[c_int]) -> Self {
        let widths: Vec<usize> = kinds.iter().map(|&k| field_width(k)).collect();
        let mut offsets = Vec::with_capacity(widths.len());
        let mut size = 0;
        for w in &widths {
            offsets.push(size);
            size += w;
        }
        Self {
            offsets,
            widths,
            size,
        }
    }

    fn field(&self, index: usize) -> Option<Field> {
        Some(Field {
            offset: *self.offsets.get(index)?,
            width: self.widths[index],
        })
    }
}

/// Field offsets for one machine's global and per-track value buffers.
#[derive(Debug, Clone, Default)]
pub struct ParamLayout {
    global: Section,
    track: Section,
    max_tracks: usize,
}

impl ParamLayout {
    pub fn new(global_kinds: &[c_int], track_kinds: &[c_int], max_tracks: usize) -> Self {
        Self {
            global: Section::new(global_kinds),
            track: Section::new(track_kinds),
            max_tracks,
        }
    }

    pub fn global_field(&self, index: usize) -> Option<Field> {
        self.global.field(index)
    }

    pub fn track_field(&self, track: usize, index: usize) -> Option<Field> {
        if track >= self.max_tracks {
            return None;
        }
        let field = self.track.field(index)?;
        Some(Field {
            offset: track * self.track.size + field.offset,
            width: field.width,
        })
    }

    /// Bytes in the global buffer.
    pub fn global_size(&self) -> usize {
        self.global.size
    }

    /// Bytes per track slot.
    pub fn track_size(&self) -> usize {
        self.track.size
    }

    pub fn global_widths(&self) -> &[usize] {
        &self.global.widths
    }

    pub fn track_widths(&self) -> &[usize] {
        &self.track.widths
    }
}

/// Reads a field as an unsigned value of its width.
///
/// # Safety
/// `base` must be valid for reads of `field.offset + field.width` bytes.
pub unsafe fn read_field(base: *const u8, field: Field) -> i32 {
    let p = base.add(field.offset);
    match field.width {
        1 => *p as i32,
        2 => p.cast::<u16>().read_unaligned() as i32,
        _ => 0,
    }
}

/// Writes the low bytes of `value` into a field.
///
/// # Safety
/// `base` must be valid for writes of `field.offset + field.width` bytes.
pub unsafe fn write_field(base: *mut u8, field: Field, value: i32) {
    let p = base.add(field.offset);
    match field.width {
        1 => *p = value as u8,
        2 => p.cast::<u16>().write_unaligned(value as u16),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_for(mask: u32, n: usize) -> Vec<c_int> {
        (0..n)
            .map(|i| if mask & (1 << i) != 0 { PT_WORD } else { PT_BYTE })
            .collect()
    }

    #[test]
    fn test_widths() {
        assert_eq!(field_width(PT_NOTE), 1);
        assert_eq!(field_width(PT_SWITCH), 1);
        assert_eq!(field_width(PT_BYTE), 1);
        assert_eq!(field_width(PT_WORD), 2);
        assert_eq!(field_width(42), 0);
        assert_eq!(ParamType::from_raw(-1), None);
    }

    #[test]
    fn test_layout_matches_linear_walk() {
        for mask in 0..(1u32 << 6) {
            let kinds = kinds_for(mask, 6);
            let layout = ParamLayout::new(&kinds, &kinds, 3);
            let widths = layout.global_widths().to_vec();
            for i in 0..6 {
                let expected: usize = kinds[..i].iter().map(|&k| field_width(k)).sum();
                assert_eq!(locate(&widths, i), Some(expected));
                assert_eq!(layout.global_field(i).map(|f| f.offset), Some(expected));
                assert_eq!(
                    layout.track_field(2, i).map(|f| f.offset),
                    Some(2 * layout.track_size() + expected)
                );
            }
            assert_eq!(locate(&widths, 6), None);
        }
    }

    #[test]
    fn test_out_of_range_fields() {
        let layout = ParamLayout::new(&[PT_BYTE], &[PT_WORD, PT_NOTE], 2);
        assert!(layout.global_field(1).is_none());
        assert!(layout.track_field(2, 0).is_none());
        assert!(layout.track_field(0, 2).is_none());
        assert_eq!(layout.track_size(), 3);
        assert_eq!(layout.track_field(1, 1), Some(Field { offset: 5, width: 1 }));
    }

    #[test]
    fn test_unknown_type_takes_no_space() {
        let layout = ParamLayout::new(&[PT_BYTE, 9, PT_WORD], &[], 0);
        assert_eq!(layout.global_size(), 3);
        assert_eq!(layout.global_field(2).map(|f| f.offset), Some(1));
        let mut buf = [0xAAu8; 3];
        let field = layout.global_field(1).unwrap();
        unsafe {
            write_field(buf.as_mut_ptr(), field, 7);
            assert_eq!(read_field(buf.as_ptr(), field), 0);
        }
        assert_eq!(buf, [0xAA; 3]);
    }

    #[test]
    fn test_read_write_truncates() {
        let layout = ParamLayout::new(&[PT_NOTE, PT_WORD, PT_SWITCH], &[], 0);
        let mut buf = [0u8; 4];
        let base = buf.as_mut_ptr();
        let note = layout.global_field(0).unwrap();
        let word = layout.global_field(1).unwrap();
        let switch = layout.global_field(2).unwrap();
        unsafe {
            for v in [0, 1, 0x7f, 0xff] {
                write_field(base, note, v);
                assert_eq!(read_field(base, note), v);
            }
            for v in [0, 0x1234, 0xfffe, 0xffff] {
                write_field(base, word, v);
                assert_eq!(read_field(base, word), v);
            }
            write_field(base, switch, 0x1ff);
            assert_eq!(read_field(base, switch), 0xff);
            write_field(base, word, 0x12345);
            assert_eq!(read_field(base, word), 0x2345);
            // neighbours untouched
            assert_eq!(read_field(base, note), 0xff);
        }
    }
}

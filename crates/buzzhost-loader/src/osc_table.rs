//! Built-in oscillator tables returned by `GetOscillatorTable`.
//!
//! Each waveform is a run of eleven mip levels of 16-bit samples, 2048
//! samples at level 0 halving down to 2 at level 10. Level `l` starts at
//! [`level_offset`]`(l)`. Higher levels carry fewer harmonics so machines can
//! pick one that does not alias at their playback rate.

use std::f64::consts::TAU;
use std::sync::OnceLock;

pub const OWF_SINE: i32 = 0;
pub const OWF_SAWTOOTH: i32 = 1;
pub const OWF_PULSE: i32 = 2;
pub const OWF_TRIANGLE: i32 = 3;
pub const OWF_NOISE: i32 = 4;
pub const OWF_303_SAWTOOTH: i32 = 5;

pub const NUM_WAVEFORMS: usize = 6;
pub const NUM_LEVELS: usize = 11;
pub const LEVEL0_LEN: usize = 2048;
/// Samples per waveform across all levels.
pub const TABLE_LEN: usize = 2 * LEVEL0_LEN - 2;

pub fn level_len(level: usize) -> usize {
    LEVEL0_LEN >> level
}

pub fn level_offset(level: usize) -> usize {
    2 * LEVEL0_LEN - (2 * LEVEL0_LEN >> level)
}

struct OscTables {
    waves: Vec<Box<[i16]>>,
}

static TABLES: OnceLock<OscTables> = OnceLock::new();

fn tables() -> &'static OscTables {
    TABLES.get_or_init(|| {
        let _span = tracing::debug_span!("osc_tables").entered();
        OscTables {
            waves: (0..NUM_WAVEFORMS as i32).map(build_waveform).collect(),
        }
    })
}

/// The full table for `waveform`, or `None` for an unknown id.
pub fn table(waveform: i32) -> Option<&'static [i16]> {
    if !(0..NUM_WAVEFORMS as i32).contains(&waveform) {
        return None;
    }
    Some(&tables().waves[waveform as usize])
}

/// Pointer handed to machines; null for an unknown id.
pub fn table_ptr(waveform: i32) -> *const i16 {
    table(waveform).map_or(std::ptr::null(), <[i16]>::as_ptr)
}

fn build_waveform(waveform: i32) -> Box<[i16]> {
    let mut out = vec![0i16; TABLE_LEN].into_boxed_slice();
    let mut noise = XorShift(0x2545_f491);
    for level in 0..NUM_LEVELS {
        let len = level_len(level);
        let dst = &mut out[level_offset(level)..level_offset(level) + len];
        let samples: Vec<f64> = match waveform {
            OWF_SINE => (0..len).map(|i| (TAU * i as f64 / len as f64).sin()).collect(),
            OWF_SAWTOOTH => additive(len, |k| Some(1.0 / k as f64)),
            OWF_PULSE => additive(len, |k| (k % 2 == 1).then(|| 1.0 / k as f64)),
            OWF_TRIANGLE => additive(len, |k| {
                (k % 2 == 1).then(|| {
                    let sign = if (k / 2) % 2 == 0 { 1.0 } else { -1.0 };
                    sign / (k * k) as f64
                })
            }),
            OWF_NOISE => (0..len).map(|_| noise.next_f64()).collect(),
            // softer saw: upper harmonics roll off faster
            _ => additive(len, |k| Some(1.0 / (k as f64 * (1.0 + k as f64 / 8.0)))),
        };
        let peak = samples.iter().fold(0.0f64, |m, s| m.max(s.abs()));
        let scale = if peak > 1e-9 { 32767.0 / peak } else { 0.0 };
        for (d, s) in dst.iter_mut().zip(&samples) {
            *d = (s * scale).round() as i16;
        }
    }
    out
}

/// Sums sine partials `1..len/2` with the given amplitudes.
fn additive(len: usize, amplitude: impl Fn(usize) -> Option<f64>) -> Vec<f64> {
    let nyquist = len / 2;
    let partials: Vec<(usize, f64)> = (1..nyquist)
        .filter_map(|k| amplitude(k).map(|a| (k, a)))
        .collect();
    (0..len)
        .map(|i| {
            let phase = TAU * i as f64 / len as f64;
            partials
                .iter()
                .map(|&(k, a)| a * (phase * k as f64).sin())
                .sum()
        })
        .collect()
}

struct XorShift(u32);

impl XorShift {
    fn next_f64(&mut self) -> f64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x as f64 / u32::MAX as f64) * 2.0 - 1.0
    }
}

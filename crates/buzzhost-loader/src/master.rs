//! Song timing shared by every instance (`CMasterInfo`).
//!
//! Machines keep the `pMasterInfo` pointer they are given and read it during
//! `Tick`/`Work`, so the struct lives at a fixed address for as long as any
//! instance refers to it.

use std::cell::UnsafeCell;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::abi::MasterInfo;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub beats_per_min: i32,
    pub ticks_per_beat: i32,
    pub sample_rate: i32,
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            beats_per_min: 120,
            ticks_per_beat: 4,
            sample_rate: 44100,
        }
    }
}

impl Tempo {
    pub fn master_info(&self) -> MasterInfo {
        let bpm = self.beats_per_min.max(1);
        let tpb = self.ticks_per_beat.max(1);
        let samples_per_minute = 60 * i64::from(self.sample_rate);
        let ticks_per_minute = i64::from(bpm) * i64::from(tpb);
        let samples_per_tick =
            (samples_per_minute / ticks_per_minute).clamp(1, i64::from(i32::MAX)) as i32;
        MasterInfo {
            beats_per_min: bpm,
            ticks_per_beat: tpb,
            samples_per_sec: self.sample_rate,
            samples_per_tick,
            pos_in_tick: 0,
            ticks_per_sec: self.sample_rate as f32 / samples_per_tick as f32,
        }
    }
}

pub struct MasterTiming {
    info: UnsafeCell<MasterInfo>,
    writer: Mutex<()>,
}

// Safety: machines only read the info from the thread driving them; writes go
// through `set`, which callers run while no block is being processed.
unsafe impl Send for MasterTiming {}
unsafe impl Sync for MasterTiming {}

impl MasterTiming {
    pub fn new(tempo: Tempo) -> Arc<Self> {
        Arc::new(Self {
            info: UnsafeCell::new(tempo.master_info()),
            writer: Mutex::new(()),
        })
    }

    /// Updates the timing every instance sees. Must not race a block call.
    pub fn set(&self, tempo: Tempo) {
        let _guard = self.writer.lock();
        let info = tempo.master_info();
        tracing::debug!(
            "master info: {} bpm, {} tpb, {} Hz, {} samples/tick",
            info.beats_per_min,
            info.ticks_per_beat,
            info.samples_per_sec,
            info.samples_per_tick
        );
        // Safety: see the Send/Sync note
        unsafe { *self.info.get() = info };
    }

    pub fn get(&self) -> MasterInfo {
        let _guard = self.writer.lock();
        unsafe { *self.info.get() }
    }

    pub(crate) fn as_ptr(&self) -> *const MasterInfo {
        self.info.get()
    }
}

impl Default for MasterTiming {
    fn default() -> Self {
        Self {
            info: UnsafeCell::new(Tempo::default().master_info()),
            writer: Mutex::new(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_tempo() {
        let info = Tempo::default().master_info();
        assert_eq!(info.samples_per_tick, 5512);
        assert_eq!(info.pos_in_tick, 0);
        assert_relative_eq!(info.ticks_per_sec, 44100.0 / 5512.0);
    }

    #[test]
    fn test_set_keeps_address() {
        let timing = MasterTiming::new(Tempo::default());
        let before = timing.as_ptr();
        timing.set(Tempo {
            beats_per_min: 140,
            ticks_per_beat: 8,
            sample_rate: 48000,
        });
        assert_eq!(before, timing.as_ptr());
        let info = timing.get();
        assert_eq!(info.samples_per_tick, (60 * 48000) / (140 * 8));
        assert_eq!(info.samples_per_sec, 48000);
    }

    #[test]
    fn test_extreme_tempo_does_not_overflow() {
        let info = Tempo {
            beats_per_min: i32::MAX,
            ticks_per_beat: i32::MAX,
            sample_rate: i32::MAX,
        }
        .master_info();
        assert_eq!(info.samples_per_tick, 1);

        let info = Tempo {
            beats_per_min: 1,
            ticks_per_beat: 1,
            sample_rate: i32::MAX,
        }
        .master_info();
        assert_eq!(info.samples_per_tick, i32::MAX);
        assert_eq!(info.samples_per_sec, i32::MAX);
    }
}

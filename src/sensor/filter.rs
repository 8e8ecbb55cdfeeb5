//! Hysteresis Filter
//!
//! Turns the noisy stream of batch means into sparse, debounced
//! notifications. Rising readings are adopted at once; lower readings are
//! suppressed in favour of the held peak until they drop below the low
//! threshold, which resets the peak.
//!
//! What is stored and what is sent differ on reset: the state drops to 0
//! while the raw low reading is transmitted.

use crate::core::config::{LOW_READING_THRESHOLD, MAX_VALID_READING};

/// Which branch produced an emitted value
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Decision {
    /// Reading above the held value; adopted.
    Rise,
    /// Lower reading above the threshold; held value re-sent.
    Hold,
    /// Reading below the threshold; state reset, reading sent.
    Reset,
}

/// Result of filtering one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct Emission {
    pub value: u8,
    pub decision: Decision,
}

#[derive(Debug, Default, Clone)]
pub struct HysteresisFilter {
    last_emitted: u8,
}

impl HysteresisFilter {
    /// Boot state: nothing held.
    pub const fn new() -> Self {
        Self { last_emitted: 0 }
    }

    /// Feed one reading. Out-of-range readings (> 254) yield `None` and
    /// leave the state untouched.
    pub fn process(&mut self, reading: u16) -> Option<Emission> {
        if reading > MAX_VALID_READING {
            return None;
        }
        // Bounded by MAX_VALID_READING above
        let value = reading as u8;

        let emission = if value > self.last_emitted {
            self.last_emitted = value;
            Emission { value, decision: Decision::Rise }
        } else if reading >= LOW_READING_THRESHOLD {
            Emission {
                value: self.last_emitted,
                decision: Decision::Hold,
            }
        } else {
            self.last_emitted = 0;
            Emission { value, decision: Decision::Reset }
        };
        Some(emission)
    }

    pub fn last_emitted(&self) -> u8 {
        self.last_emitted
    }
}

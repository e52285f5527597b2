//! Monotonic, collision-resistant version tokens for secret revisions.
//!
//! A stamp packs the millisecond wallclock into the upper 48 bits and a
//! per-millisecond counter into the lower 16, so lexicographic order of the
//! hex form equals creation order within a process. Cross-process collisions
//! are possible; the store's `(series, version)` uniqueness rejects them and
//! the caller retries with a fresh stamp.

use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Hex serialization length: 64 bits as lowercase hex.
pub const STAMP_LEN: usize = 16;

const MILLIS_MASK: u64 = (1 << 48) - 1;

static STATE: Mutex<(u64, u16)> = Mutex::new((0, 0));

fn state() -> MutexGuard<'static, (u64, u16)> {
    STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An opaque version token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionStamp(u64);

impl VersionStamp {
    /// Stamp for the current instant, unique within this process.
    pub fn now() -> Self {
        let millis = (Utc::now().timestamp_millis() as u64) & MILLIS_MASK;
        let mut guard = state();
        if guard.0 == millis {
            guard.1 = guard.1.wrapping_add(1);
        } else {
            *guard = (millis, 0);
        }
        Self((millis << 16) | guard.1 as u64)
    }

    pub fn from_value(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// 16 lowercase hex chars.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse a 16-char lowercase hex token.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != STAMP_LEN
            || !s
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return None;
        }
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

//! Server-side atomic scripts.
//!
//! Each script touches a fixed key shape, takes positional string arguments
//! and replies with a single integer. Backends either ship `source` to the
//! server (Redis) or emulate the script by `name` under one lock.

/// A named compound check-and-mutate executed atomically against one logical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicScript {
    pub name: &'static str,
    pub source: &'static str,
}

/// Store a one-time code unless a recent one is still cooling down.
///
/// - `KEYS[1]`: code key (`<key>:cnt` holds the remaining verify attempts)
/// - `ARGV`: code, ttl seconds, resend cooldown seconds, verify attempts
/// - reply: `0` stored, `-1` resend too soon, `-2` key exists without expiry
pub const SET_CODE: AtomicScript = AtomicScript {
    name: "set_code",
    source: include_str!("lua/set_code.lua"),
};

/// Compare a submitted code, consuming one attempt on mismatch.
///
/// - `KEYS[1]`: code key
/// - `ARGV`: submitted code
/// - reply: `0` matched and cleared, `-1` attempts exhausted, `-2` mismatch
pub const VERIFY_CODE: AtomicScript = AtomicScript {
    name: "verify_code",
    source: include_str!("lua/verify_code.lua"),
};

/// `HINCRBY` a hash field only when the hash already exists.
///
/// - `KEYS[1]`: hash key
/// - `ARGV`: field, signed delta
/// - reply: `1` applied, `0` key absent (left untouched)
pub const INCR_FIELD_IF_PRESENT: AtomicScript = AtomicScript {
    name: "incr_field_if_present",
    source: include_str!("lua/incr_field_if_present.lua"),
};

pub(crate) const SET_CODE_STORED: i64 = 0;
pub(crate) const SET_CODE_TOO_SOON: i64 = -1;
pub(crate) const SET_CODE_NO_EXPIRY: i64 = -2;

pub(crate) const VERIFY_CODE_MATCHED: i64 = 0;
pub(crate) const VERIFY_CODE_EXHAUSTED: i64 = -1;
pub(crate) const VERIFY_CODE_MISMATCH: i64 = -2;

pub(crate) const INCR_APPLIED: i64 = 1;
pub(crate) const INCR_KEY_ABSENT: i64 = 0;

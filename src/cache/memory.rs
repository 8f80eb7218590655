//! In-process [`KvCache`] used for tests and single-node deployments.
//!
//! Expiry is lazy and measured on the tokio clock, so paused-time tests can
//! move past TTLs with `tokio::time::advance`. Scripts are emulated by name
//! while the state lock is held, which gives the same atomicity as the
//! server-side versions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::backend::{KeyTtl, KvCache};
use super::error::CacheError;
use super::keys;
use super::lock::mutex_lock;
use super::scripts::{
    AtomicScript, INCR_APPLIED, INCR_FIELD_IF_PRESENT, INCR_KEY_ABSENT, SET_CODE,
    SET_CODE_NO_EXPIRY, SET_CODE_STORED, SET_CODE_TOO_SOON, VERIFY_CODE, VERIFY_CODE_EXHAUSTED,
    VERIFY_CODE_MATCHED, VERIFY_CODE_MISMATCH,
};

const TARGET: &str = "lectern::cache::memory";

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
}

impl State {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now))
        {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn bytes(&mut self, key: &str, now: Instant) -> Result<Option<Vec<u8>>, CacheError> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    fn ttl(&mut self, key: &str, now: Instant) -> KeyTtl {
        match self.live(key, now) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        }
    }

    fn put(&mut self, key: &str, value: Value, ttl: Option<Duration>, now: Instant) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
    }

    fn set_code(&mut self, key: &str, args: &[String], now: Instant) -> Result<i64, CacheError> {
        let [code, ttl, cooldown, attempts] = args else {
            return Err(script_args(&SET_CODE, "expected 4 arguments"));
        };
        let ttl = Duration::from_secs(parse_arg(&SET_CODE, ttl)?);
        let cooldown = Duration::from_secs(parse_arg(&SET_CODE, cooldown)?);
        let attempts: u32 = parse_arg(&SET_CODE, attempts)?;

        let store = match self.ttl(key, now) {
            KeyTtl::Persistent => return Ok(SET_CODE_NO_EXPIRY),
            KeyTtl::Missing => true,
            KeyTtl::Expires(remaining) => remaining < ttl.saturating_sub(cooldown),
        };
        if !store {
            return Ok(SET_CODE_TOO_SOON);
        }

        self.put(key, Value::Bytes(code.clone().into_bytes()), Some(ttl), now);
        self.put(
            &keys::code_attempts(key),
            Value::Bytes(attempts.to_string().into_bytes()),
            Some(ttl),
            now,
        );
        Ok(SET_CODE_STORED)
    }

    fn verify_code(&mut self, key: &str, args: &[String], now: Instant) -> Result<i64, CacheError> {
        let [submitted] = args else {
            return Err(script_args(&VERIFY_CODE, "expected 1 argument"));
        };
        let cnt_key = keys::code_attempts(key);
        let remaining = match self.bytes(&cnt_key, now)? {
            Some(raw) => parse_counter(&cnt_key, &raw)?,
            None => return Ok(VERIFY_CODE_EXHAUSTED),
        };
        if remaining <= 0 {
            return Ok(VERIFY_CODE_EXHAUSTED);
        }

        let stored = self.bytes(key, now)?;
        if stored.as_deref() == Some(submitted.as_bytes()) {
            self.entries.remove(key);
            self.entries.remove(&cnt_key);
            return Ok(VERIFY_CODE_MATCHED);
        }

        if let Some(entry) = self.live(&cnt_key, now) {
            entry.value = Value::Bytes((remaining - 1).to_string().into_bytes());
        }
        Ok(VERIFY_CODE_MISMATCH)
    }

    fn incr_field_if_present(
        &mut self,
        key: &str,
        args: &[String],
        now: Instant,
    ) -> Result<i64, CacheError> {
        let [field, delta] = args else {
            return Err(script_args(&INCR_FIELD_IF_PRESENT, "expected 2 arguments"));
        };
        let delta: i64 = parse_arg(&INCR_FIELD_IF_PRESENT, delta)?;
        let Some(entry) = self.live(key, now) else {
            return Ok(INCR_KEY_ABSENT);
        };
        let Value::Hash(fields) = &mut entry.value else {
            return Err(CacheError::WrongType {
                key: key.to_string(),
            });
        };
        let current = match fields.get(field.as_str()) {
            Some(raw) => raw.parse::<i64>().map_err(|err| CacheError::Corrupt {
                key: key.to_string(),
                detail: format!("field `{field}`: {err}"),
            })?,
            None => 0,
        };
        fields.insert(field.clone(), (current + delta).to_string());
        Ok(INCR_APPLIED)
    }
}

fn script_args(script: &AtomicScript, detail: &str) -> CacheError {
    CacheError::ScriptArguments {
        script: script.name,
        detail: detail.to_string(),
    }
}

fn parse_arg<T: std::str::FromStr>(script: &AtomicScript, raw: &str) -> Result<T, CacheError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|err| script_args(script, &format!("`{raw}`: {err}")))
}

fn parse_counter(key: &str, raw: &[u8]) -> Result<i64, CacheError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| CacheError::Corrupt {
            key: key.to_string(),
            detail: "counter is not an integer".to_string(),
        })
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    state: Mutex<State>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut state = mutex_lock(&self.state, TARGET, "get");
        state.bytes(key, Instant::now())
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut state = mutex_lock(&self.state, TARGET, "set");
        state.put(key, Value::Bytes(value), ttl, Instant::now());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        mutex_lock(&self.state, TARGET, "delete")
            .entries
            .remove(key);
        Ok(())
    }

    async fn run_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, CacheError> {
        let [key] = keys else {
            return Err(script_args(script, "expected exactly one key"));
        };
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, TARGET, "run_script");
        match script.name {
            name if name == SET_CODE.name => state.set_code(key, args, now),
            name if name == VERIFY_CODE.name => state.verify_code(key, args, now),
            name if name == INCR_FIELD_IF_PRESENT.name => {
                state.incr_field_if_present(key, args, now)
            }
            _ => Err(CacheError::UnsupportedScript(script.name)),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        let mut state = mutex_lock(&self.state, TARGET, "hash_get_all");
        match state.live(key, Instant::now()) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, TARGET, "hash_set");
        match state.live(key, now) {
            Some(Entry {
                value: Value::Hash(existing),
                ..
            }) => {
                existing.extend(fields.iter().cloned());
                Ok(())
            }
            Some(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
            None => {
                let value = Value::Hash(fields.iter().cloned().collect());
                state.put(key, value, None, now);
                Ok(())
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut state = mutex_lock(&self.state, TARGET, "expire");
        Ok(match state.live(key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheError> {
        let mut state = mutex_lock(&self.state, TARGET, "ttl");
        Ok(state.ttl(key, Instant::now()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

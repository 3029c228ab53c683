//! Snowflake-style unique identifier issuance.
//!
//! Generates 64-bit IDs that are unique for the lifetime of the issuer,
//! roughly time-ordered across workers, and strictly increasing for a single
//! issuer. Record ids and token ids are both drawn from here.
//!
//! # ID Structure
//!
//! ```text
//! | 42 bits: timestamp (ms since epoch) | 12 bits: worker | 10 bits: sequence |
//! ```
//!
//! - **Timestamp**: milliseconds since 2024-01-01 00:00:00 UTC (~139 years range)
//! - **Worker**: configured, or derived from entropy mixed with PID (4096 values)
//! - **Sequence**: counter within each millisecond (1024 IDs/ms per worker)
//!
//! # Thread Safety
//!
//! The `(last_timestamp, sequence)` pair lives in a `parking_lot::Mutex`
//! owned by the [`IdIssuer`]. The lock is held only for the compare and
//! increment. When the sequence for the current millisecond is exhausted the
//! caller releases the lock and waits for the next millisecond tick.
//!
//! # Clock Regression
//!
//! If the clock reads earlier than the last issued timestamp the issuer
//! fails with [`IdentityError::ClockRegression`] instead of issuing an id
//! that would sort before one already handed out.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    clock::{Clock, SystemClock},
    config::IdentityConfig,
    error::IdentityError,
    types::{RecordId, TokenId},
};

/// Custom epoch: 2024-01-01 00:00:00 UTC (milliseconds since Unix epoch).
pub const EPOCH_MS: i64 = 1_704_067_200_000;

/// Number of bits used for the worker ID.
pub const WORKER_BITS: u32 = 12;

/// Number of bits used for the sequence portion.
pub const SEQUENCE_BITS: u32 = 10;

/// Number of bits used for the timestamp portion.
pub const TIMESTAMP_BITS: u32 = 64 - WORKER_BITS - SEQUENCE_BITS;

/// Mask for extracting the worker ID (12 bits).
pub const WORKER_MASK: u64 = (1 << WORKER_BITS) - 1;

/// Mask for extracting the sequence portion (10 bits).
pub const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// A 64-bit snowflake identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Wraps a raw snowflake value.
    #[inline]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Milliseconds since [`EPOCH_MS`] at which the id was issued.
    #[must_use]
    pub const fn timestamp_ms(self) -> u64 {
        self.0 >> (WORKER_BITS + SEQUENCE_BITS)
    }

    /// Worker discriminator (0 to 4,095).
    #[must_use]
    pub const fn worker(self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) & WORKER_MASK) as u16
    }

    /// Sequence counter within the issuing millisecond (0 to 1,023).
    #[must_use]
    pub const fn sequence(self) -> u16 {
        (self.0 & SEQUENCE_MASK) as u16
    }

    const fn compose(timestamp: u64, worker: u64, sequence: u64) -> Self {
        Self((timestamp << (WORKER_BITS + SEQUENCE_BITS)) | (worker << SEQUENCE_BITS) | sequence)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Snowflake> for RecordId {
    fn from(id: Snowflake) -> Self {
        RecordId::new(id.0)
    }
}

impl From<Snowflake> for TokenId {
    fn from(id: Snowflake) -> Self {
        TokenId::new(id.0)
    }
}

/// State for sequence-based ID generation.
#[derive(Debug)]
struct SnowflakeState {
    /// Last timestamp (ms since [`EPOCH_MS`]) used for ID generation.
    last_timestamp: u64,
    /// Sequence counter within the current millisecond.
    sequence: u64,
    /// Whether any id has been issued yet.
    issued: bool,
}

/// Issues [`Snowflake`] identifiers.
///
/// One issuer per process. Share it as `Arc<IdIssuer>`; concurrent
/// [`next`](Self::next) calls serialize briefly on the internal mutex.
pub struct IdIssuer {
    worker: u64,
    clock: Arc<dyn Clock>,
    state: Mutex<SnowflakeState>,
}

impl fmt::Debug for IdIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdIssuer").field("worker", &self.worker).finish_non_exhaustive()
    }
}

impl IdIssuer {
    /// Creates an issuer for `worker` reading time from `clock`.
    ///
    /// Only the low 12 bits of `worker` are used.
    pub fn new(worker: u16, clock: Arc<dyn Clock>) -> Self {
        Self {
            worker: u64::from(worker) & WORKER_MASK,
            clock,
            state: Mutex::new(SnowflakeState { last_timestamp: 0, sequence: 0, issued: false }),
        }
    }

    /// Creates an issuer from configuration, using the system clock.
    ///
    /// When no worker id is configured one is derived from OS entropy mixed
    /// with the process ID, so separate processes started in the same
    /// millisecond still produce distinct ids.
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`from_config`](Self::from_config), reading time from `clock`.
    pub fn from_config_with_clock(config: &IdentityConfig, clock: Arc<dyn Clock>) -> Self {
        let worker = config.worker_id.unwrap_or_else(random_worker_id);
        Self::new(worker, clock)
    }

    /// Returns this issuer's worker discriminator.
    pub fn worker(&self) -> u16 {
        self.worker as u16
    }

    /// Issues the next identifier.
    ///
    /// The returned id is strictly greater than every id previously returned
    /// by this issuer. If 1,024 ids were already issued in the current
    /// millisecond the call waits for the next millisecond instead of
    /// wrapping.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::ClockRegression`] if the clock reads earlier than the last issued id.
    /// - [`IdentityError::SystemClock`] if the clock reads before [`EPOCH_MS`].
    pub fn next(&self) -> Result<Snowflake, IdentityError> {
        loop {
            let timestamp = self.timestamp()?;
            let mut state = self.state.lock();

            if !state.issued || timestamp > state.last_timestamp {
                // New millisecond, reset sequence
                state.issued = true;
                state.last_timestamp = timestamp;
                state.sequence = 0;
                return Ok(Snowflake::compose(timestamp, self.worker, 0));
            }

            if timestamp < state.last_timestamp {
                let last_ms = state.last_timestamp as i64 + EPOCH_MS;
                let observed_ms = timestamp as i64 + EPOCH_MS;
                drop(state);
                warn!(last_ms, observed_ms, worker = self.worker, "Clock regression detected");
                return Err(IdentityError::ClockRegression { last_ms, observed_ms });
            }

            if state.sequence < SEQUENCE_MASK {
                state.sequence += 1;
                return Ok(Snowflake::compose(timestamp, self.worker, state.sequence));
            }

            // Sequence exhausted for this millisecond, wait for the next tick
            let next_ms = state.last_timestamp as i64 + EPOCH_MS + 1;
            drop(state);
            self.clock.sleep_until_ms(next_ms);
        }
    }

    /// Issues the next identifier as a [`RecordId`].
    ///
    /// # Errors
    ///
    /// See [`next`](Self::next).
    pub fn next_record_id(&self) -> Result<RecordId, IdentityError> {
        self.next().map(RecordId::from)
    }

    /// Issues the next identifier as a [`TokenId`].
    ///
    /// # Errors
    ///
    /// See [`next`](Self::next).
    pub fn next_token_id(&self) -> Result<TokenId, IdentityError> {
        self.next().map(TokenId::from)
    }

    fn timestamp(&self) -> Result<u64, IdentityError> {
        let now_ms = self.clock.now_ms();
        if now_ms < EPOCH_MS {
            return Err(IdentityError::SystemClock { observed_ms: now_ms });
        }
        Ok((now_ms - EPOCH_MS) as u64)
    }
}

/// Derives a worker ID from OS entropy mixed with the process ID.
///
/// The PID mixing keeps concurrent processes on one machine apart even if
/// the RNG hands out identical initial values.
fn random_worker_id() -> u16 {
    use rand::Rng;
    let pid = u64::from(std::process::id());
    ((rand::rng().random::<u64>() ^ pid) & WORKER_MASK) as u16
}

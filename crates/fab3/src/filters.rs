//! Server held filters polled through `eth_getFilterChanges`.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};

use parking_lot::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
};

use crate::{
    error::{
        Fab3Error,
        Result,
    },
    types::{
        GetLogsArgs,
        strip_0x,
    },
};

/// Idle time after which a filter is evicted unless configured otherwise.
pub const DEFAULT_FILTER_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    NewBlocks,
    Logs(GetLogsArgs),
}

/// Poll state of one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub kind: FilterKind,
    pub last_block_seen: u64,
    /// Set once a `blockHash` logs filter reported its block.
    pub exhausted: bool,
}

pub type SharedFilterState = Arc<tokio::sync::Mutex<FilterState>>;

#[derive(Debug)]
struct Slot {
    state: SharedFilterState,
    last_access: Instant,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    slots: HashMap<u64, Slot>,
}

/// Filter map shared by every request handler.
///
/// The map lock is only held for lookups. Polls lock the single entry they
/// advance, so concurrent polls of one filter are serialized.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    inner: Arc<Mutex<Registry>>,
    ttl: Duration,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_TTL)
    }
}

impl FilterRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::default())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Registers a filter and returns its id, `0x` prefixed hex starting at 1.
    pub fn install(&self, kind: FilterKind, last_block_seen: u64) -> String {
        let mut registry = self.inner.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.slots.insert(
            id,
            Slot {
                state: Arc::new(tokio::sync::Mutex::new(FilterState {
                    kind,
                    last_block_seen,
                    exhausted: false,
                })),
                last_access: Instant::now(),
            },
        );
        debug!(target: "fab3::filters", filter_id = id, "installed filter");
        format!("{id:#x}")
    }

    /// Looks up a filter and refreshes its access time.
    pub fn get(&self, id: &str) -> Result<SharedFilterState> {
        let key = parse_id(id)?;
        let mut registry = self.inner.lock();
        let slot = registry
            .slots
            .get_mut(&key)
            .ok_or_else(|| Fab3Error::FilterExpired(id.to_string()))?;
        slot.last_access = Instant::now();
        Ok(slot.state.clone())
    }

    /// Removes a filter. Returns whether it existed.
    pub fn uninstall(&self, id: &str) -> Result<bool> {
        let key = parse_id(id)?;
        Ok(self.inner.lock().slots.remove(&key).is_some())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts filters idle for longer than the TTL, returning their ids.
    pub fn sweep_expired(&self) -> Vec<u64> {
        self.sweep_older_than(Instant::now(), self.ttl)
    }

    fn sweep_older_than(&self, now: Instant, ttl: Duration) -> Vec<u64> {
        let mut registry = self.inner.lock();
        let expired: Vec<u64> = registry
            .slots
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.last_access) > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            registry.slots.remove(id);
        }
        expired
    }

    /// Sweeps at half the TTL until `cancel` fires.
    pub async fn run_reaper(self, cancel: CancellationToken) {
        let interval = self.ttl / 2;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(target: "fab3::filters", "filter reaper received cancellation signal, shutting down...");
                    break;
                }
                () = sleep(interval) => {
                    let evicted = self.sweep_expired();
                    if !evicted.is_empty() {
                        debug!(target: "fab3::filters", count = evicted.len(), "evicted idle filters");
                    }
                }
            }
        }
    }
}

fn parse_id(id: &str) -> Result<u64> {
    u64::from_str_radix(strip_0x(id), 16)
        .map_err(|e| Fab3Error::malformed(format!("failed to parse filter id {id:?}: {e}")))
}

//! Autosend — periodic publication of changed property values.
//!
//! Each autosend source is a getter-bearing leaf below a ranged container
//! (`/analogin/N/value`). Per source the scheduler keeps:
//!
//! - a subscription mask, one bit per index, persisted to the byte store
//!   every time it changes;
//! - the last value published per index, in memory only.
//!
//! On every tick the getter is polled for each subscribed index and a
//! message is emitted only when the value differs from the last one sent.
//!
//! Control surface, registered into the tree during assembly:
//!
//! ```text
//!   /analogin/N/autosend        read → 0/1, write 0/1 → (un)subscribe N
//!   /system/autosend-interval   read → ms,  write 1..=5000 → new period
//! ```
//!
//! Mask record layout in namespace `autosend`, key = leaf path
//! (`analogin/value`):
//!
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │ 0xDF     │ mask, LE, ceil(range/8) bytes│
//! └──────────┴──────────────────────────────┘
//! ```
//!
//! Anything else (missing key, wrong length, wrong sentinel, store error)
//! reads as "nothing subscribed".

use core::time::Duration;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::app::ports::{ConfigPort, SharedStore, StorageError, lock_store};
use crate::config::{AUTOSEND_INTERVAL_MAX_MS, AUTOSEND_INTERVAL_MIN_MS};
use crate::error::{Error, Result, TreeError};
use crate::osc::codec;
use crate::osc::types::{Argument, Message};
use crate::tree::{AddressTree, NodeId, TreeBuilder, handler};

/// Store namespace for subscription masks.
pub const AUTOSEND_NAMESPACE: &str = "autosend";

/// First byte of every valid mask record.
pub const MASK_SENTINEL: u8 = 0xDF;

/// Name of the per-index enable leaf created next to each source.
pub const ENABLE_NODE: &str = "autosend";

fn mask_width(range: u32) -> usize {
    range.div_ceil(8) as usize
}

fn full_mask(range: u32) -> u32 {
    if range >= u32::BITS {
        u32::MAX
    } else {
        (1 << range) - 1
    }
}

/// Serialise a mask record for a source of `range` indices.
pub fn encode_mask_record(mask: u32, range: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + mask_width(range));
    out.push(MASK_SENTINEL);
    out.extend_from_slice(&(mask & full_mask(range)).to_le_bytes()[..mask_width(range)]);
    out
}

/// Parse a mask record; `None` if it is not a valid record for `range`.
pub fn decode_mask_record(bytes: &[u8], range: u32) -> Option<u32> {
    let width = mask_width(range);
    match bytes.split_first() {
        Some((&MASK_SENTINEL, rest)) if rest.len() == width => {
            let mut le = [0u8; 4];
            le[..width].copy_from_slice(rest);
            Some(u32::from_le_bytes(le) & full_mask(range))
        }
        _ => None,
    }
}

fn load_mask(store: &SharedStore, key: &str, range: u32) -> u32 {
    let mut buf = [0u8; 8];
    match lock_store(store).read(AUTOSEND_NAMESPACE, key, &mut buf) {
        Ok(len) => decode_mask_record(&buf[..len], range).unwrap_or_else(|| {
            warn!("Autosend: ignoring invalid mask record for /{} ({} bytes)", key, len);
            0
        }),
        Err(StorageError::NotFound) => {
            debug!("Autosend: no mask stored for /{}", key);
            0
        }
        Err(e) => {
            warn!("Autosend: mask read for /{} failed: {}", key, e);
            0
        }
    }
}

// ── Shared state ──────────────────────────────────────────────

struct Source {
    leaf: NodeId,
    key: String,
    range: u32,
    mask: u32,
    last_values: Vec<Option<Argument>>,
}

/// Subscription masks, last-sent values and the tick interval. Shared by
/// the control handlers in the tree and the [`Autosender`].
pub struct AutosendState {
    sources: Mutex<Vec<Source>>,
    interval_ms: AtomicU32,
    store: SharedStore,
}

impl AutosendState {
    pub fn new(store: SharedStore, interval_ms: u32) -> Arc<Self> {
        Arc::new(Self {
            sources: Mutex::new(Vec::new()),
            interval_ms: AtomicU32::new(
                interval_ms.clamp(AUTOSEND_INTERVAL_MIN_MS, AUTOSEND_INTERVAL_MAX_MS),
            ),
            store,
        })
    }

    fn sources(&self) -> MutexGuard<'_, Vec<Source>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_of(&self, leaf: NodeId) -> Option<usize> {
        self.sources().iter().position(|s| s.leaf == leaf)
    }

    /// Make `leaf` an autosend source and add its `autosend` enable leaf
    /// as a sibling. The persisted mask is loaded here.
    pub fn attach(self: &Arc<Self>, builder: &mut TreeBuilder, leaf: NodeId) -> Result<NodeId> {
        if !builder.has_getter(leaf) {
            return Err(TreeError::NotAutosendCapable.into());
        }
        let range = builder
            .range_of(leaf)
            .ok_or(TreeError::NotAutosendCapable)?;
        let parent = builder.parent(leaf).ok_or(TreeError::NotAutosendCapable)?;
        let key = builder.path_key(leaf);
        let mask = load_mask(&self.store, &key, range);

        let slot = {
            let mut sources = self.sources();
            sources.push(Source {
                leaf,
                key: key.clone(),
                range,
                mask,
                last_values: vec![None; range as usize],
            });
            sources.len() - 1
        };

        let state = Arc::clone(self);
        let node = builder.property(
            parent,
            ENABLE_NODE,
            handler(move |index, args| state.enable_request(slot, index, args)),
        )?;
        info!("Autosend: /{} attached (range {}, mask {:#x})", key, range, mask);
        Ok(node)
    }

    /// Register the interval control leaf at `path`.
    pub fn attach_interval_control(
        self: &Arc<Self>,
        builder: &mut TreeBuilder,
        path: &[&str],
    ) -> Result<NodeId> {
        let state = Arc::clone(self);
        let node = builder.register(
            path,
            None,
            handler(move |_, args| {
                let Some(arg) = args.first() else {
                    return Some(Argument::Int32(state.interval_ms() as i32));
                };
                match arg.as_i32().and_then(|ms| u32::try_from(ms).ok()) {
                    Some(ms) => {
                        if let Err(e) = state.set_interval_ms(ms) {
                            warn!("Autosend: interval {} rejected: {}", ms, e);
                        }
                    }
                    None => warn!("Autosend: interval {} rejected", arg),
                }
                None
            }),
            None,
        )?;
        Ok(node)
    }

    fn enable_request(
        &self,
        slot: usize,
        index: Option<i32>,
        args: &[Argument],
    ) -> Option<Argument> {
        let index = u32::try_from(index?).ok()?;
        let Some(arg) = args.first() else {
            let bit = self.sources()[slot].mask >> index & 1;
            return Some(Argument::Int32(bit as i32));
        };
        let on = match arg.as_i32() {
            Some(0) => false,
            Some(1) => true,
            _ => {
                warn!("Autosend: enable expects 0 or 1, got {}", arg);
                return None;
            }
        };
        if let Err(e) = self.set_slot(slot, index, on) {
            warn!("Autosend: subscription change not persisted: {}", e);
        }
        None
    }

    fn set_slot(&self, slot: usize, index: u32, on: bool) -> Result<()> {
        let (key, range, mask) = {
            let mut sources = self.sources();
            let src = &mut sources[slot];
            if index >= src.range {
                return Err(Error::IndexOutOfRange {
                    index,
                    range: src.range,
                });
            }
            let bit = 1 << index;
            let old = src.mask;
            if on {
                src.mask |= bit;
                if old & bit == 0 {
                    // Publish on the first tick after (re)subscribing.
                    src.last_values[index as usize] = None;
                }
            } else {
                src.mask &= !bit;
            }
            if src.mask == old {
                return Ok(());
            }
            (src.key.clone(), src.range, src.mask)
        };

        info!("Autosend: /{} [{}] {}", key, index, if on { "on" } else { "off" });
        lock_store(&self.store).write(AUTOSEND_NAMESPACE, &key, &encode_mask_record(mask, range))?;
        Ok(())
    }

    /// Subscribe or unsubscribe one index of a source. The new mask is
    /// persisted before returning; on a store failure the in-memory change
    /// stands and the error is returned.
    pub fn set_subscribed(&self, leaf: NodeId, index: u32, on: bool) -> Result<()> {
        let slot = self.slot_of(leaf).ok_or(Error::NotFound)?;
        self.set_slot(slot, index, on)
    }

    pub fn is_subscribed(&self, leaf: NodeId, index: u32) -> bool {
        self.mask(leaf)
            .is_some_and(|m| index < u32::BITS && m >> index & 1 == 1)
    }

    /// Current subscription mask of a source.
    pub fn mask(&self, leaf: NodeId) -> Option<u32> {
        self.sources().iter().find(|s| s.leaf == leaf).map(|s| s.mask)
    }

    /// Pretend `value` was already published at `index`.
    pub fn seed_last_value(&self, leaf: NodeId, index: u32, value: Argument) {
        let mut sources = self.sources();
        if let Some(slot) = sources
            .iter_mut()
            .find(|s| s.leaf == leaf)
            .and_then(|s| s.last_values.get_mut(index as usize))
        {
            *slot = Some(value);
        }
    }

    pub fn last_value(&self, leaf: NodeId, index: u32) -> Option<Argument> {
        self.sources()
            .iter()
            .find(|s| s.leaf == leaf)
            .and_then(|s| s.last_values.get(index as usize).cloned().flatten())
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.interval_ms()))
    }

    /// Change the tick period and persist it with the rest of the config.
    pub fn set_interval_ms(&self, ms: u32) -> Result<()> {
        if !(AUTOSEND_INTERVAL_MIN_MS..=AUTOSEND_INTERVAL_MAX_MS).contains(&ms) {
            return Err(Error::Config("autosend interval must be 1-5000 ms"));
        }
        self.interval_ms.store(ms, Ordering::Relaxed);
        info!("Autosend: interval {} ms", ms);

        let mut store = lock_store(&self.store);
        let mut cfg = store.load_config().unwrap_or_default();
        cfg.autosend_interval_ms = ms;
        store.save_config(&cfg)?;
        Ok(())
    }

    /// Record a freshly sampled value. Returns `true` if it differs from
    /// the last one published and the index is still subscribed.
    fn record(&self, slot: usize, index: u32, value: &Argument) -> bool {
        let mut sources = self.sources();
        let src = &mut sources[slot];
        if src.mask >> index & 1 == 0 {
            return false;
        }
        let last = &mut src.last_values[index as usize];
        if last.as_ref() == Some(value) {
            return false;
        }
        *last = Some(value.clone());
        true
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// Runs one scan per tick over every subscribed index.
#[derive(Clone)]
pub struct Autosender {
    tree: Arc<AddressTree>,
    state: Arc<AutosendState>,
}

impl Autosender {
    pub fn new(tree: Arc<AddressTree>, state: Arc<AutosendState>) -> Self {
        Self { tree, state }
    }

    pub fn state(&self) -> &Arc<AutosendState> {
        &self.state
    }

    pub fn interval(&self) -> Duration {
        self.state.interval()
    }

    /// Poll every subscribed index and return the messages to publish,
    /// in source then index order.
    ///
    /// Getters run without the state lock held, so a slow peripheral does
    /// not block subscription changes. A getter returning `None` is
    /// skipped for this tick.
    pub fn tick(&self) -> Vec<Message> {
        let work: Vec<(usize, NodeId, u32, u32)> = self
            .state
            .sources()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.mask != 0)
            .map(|(slot, s)| (slot, s.leaf, s.range, s.mask))
            .collect();

        let mut out = Vec::new();
        for (slot, leaf, range, mask) in work {
            let Some(getter) = self.tree.getter(leaf) else {
                continue;
            };
            for index in (0..range).filter(|i| mask >> i & 1 == 1) {
                let Some(value) = getter(index) else {
                    debug!(
                        "Autosend: /{} [{}] not ready, skipped",
                        self.tree.path_key(leaf),
                        index
                    );
                    continue;
                };
                if !self.state.record(slot, index, &value) {
                    continue;
                }
                match self.tree.build_address(leaf, Some(index)) {
                    Ok(address) => out.push(Message::new(address, vec![value])),
                    Err(e) => warn!("Autosend: no address for index {}: {}", index, e),
                }
            }
        }
        out
    }

    /// One tick, encoded as a single packet.
    pub fn tick_packet(&self) -> Option<Vec<u8>> {
        codec::encode_batch(self.tick())
    }
}

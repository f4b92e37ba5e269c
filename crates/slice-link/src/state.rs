//! Slice state store
//!
//! The single authoritative copy of per-slice radio state. One logical
//! writer (the radio backend client, plus optimistic CAT updates routed
//! through the coordinator) mutates it; everyone else reads snapshots or
//! subscribes to the event stream.
//!
//! Invariants enforced here:
//! - at most one slice has `transmit = true` after any operation
//! - `in_use` rising edges emit exactly one `Added`, falling edges exactly
//!   one `Removed`
//! - all observers see the events of one operation in the order it
//!   produced them

use std::sync::Mutex;

use slice_protocol::flex::SliceUpdate;
use slice_protocol::SliceMode;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Number of slice rows the store tracks
pub const MAX_SLICES: usize = 8;

/// Capacity of the slice event channel
const EVENT_CAPACITY: usize = 256;

/// State of one radio slice
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    /// Stable index, 0-based
    pub index: usize,
    /// RF frequency in Hz
    pub frequency_hz: u64,
    /// Demodulation mode
    pub mode: SliceMode,
    /// Keyed for transmit
    pub transmit: bool,
    /// Allocated on the radio
    pub in_use: bool,
    /// DAX audio channel (1-based); derived from the index when the radio
    /// never reported one
    pub dax_channel: u8,
    /// Decoder-app instance bound to this slice, if any
    pub instance_id: Option<String>,
}

impl Slice {
    fn empty(index: usize) -> Self {
        Self {
            index,
            frequency_hz: 0,
            mode: SliceMode::Usb,
            transmit: false,
            in_use: false,
            dax_channel: (index + 1) as u8,
            instance_id: None,
        }
    }
}

/// Event emitted on every observable store mutation
#[derive(Debug, Clone)]
pub enum SliceEvent {
    /// `in_use` rose; carries the merged state
    Added(Slice),
    /// Any field changed; carries the state after the change
    Updated(Slice),
    /// `in_use` fell; carries the state prior to the release
    Removed(Slice),
}

impl SliceEvent {
    /// Index of the slice the event concerns
    pub fn index(&self) -> usize {
        match self {
            Self::Added(s) | Self::Updated(s) | Self::Removed(s) => s.index,
        }
    }
}

/// The store itself
///
/// A short mutex section around each operation keeps event emission inside
/// the critical section, which is what gives observers a total order per
/// slice.
pub struct SliceStore {
    slices: Mutex<Vec<Slice>>,
    events: broadcast::Sender<SliceEvent>,
}

impl SliceStore {
    /// Create a store with all slices unallocated
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            slices: Mutex::new((0..MAX_SLICES).map(Slice::empty).collect()),
            events,
        }
    }

    /// Subscribe to the mutation stream
    pub fn subscribe(&self) -> broadcast::Receiver<SliceEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Slice>> {
        // A panic while holding this lock is a bug elsewhere; keep serving
        // the consistent data rather than poisoning everyone.
        self.slices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Consistent copy of one slice, if the index is valid
    pub fn snapshot(&self, index: usize) -> Option<Slice> {
        self.lock().get(index).cloned()
    }

    /// Consistent copy of every in-use slice
    pub fn snapshot_in_use(&self) -> Vec<Slice> {
        self.lock().iter().filter(|s| s.in_use).cloned().collect()
    }

    /// Merge a push update from the radio backend
    ///
    /// The merge is idempotent: re-applying the same update emits nothing.
    pub fn apply_push(&self, update: &SliceUpdate) {
        if update.index >= MAX_SLICES {
            warn!(index = update.index, "push for slice beyond store capacity, ignored");
            return;
        }

        let mut slices = self.lock();
        let slice = &mut slices[update.index];
        let before = slice.clone();

        if let Some(hz) = update.frequency_hz {
            slice.frequency_hz = hz;
        }
        if let Some(mode) = &update.mode {
            slice.mode = mode.clone();
        }
        if let Some(dax) = update.dax {
            if dax != 0 {
                slice.dax_channel = dax;
            }
        }
        if let Some(in_use) = update.in_use {
            slice.in_use = in_use;
        }

        let added = !before.in_use && slice.in_use;
        let removed = before.in_use && !slice.in_use;
        if removed {
            // Release clears transient state; index and dax stay stable.
            slice.transmit = false;
            slice.instance_id = None;
        }

        let after = slice.clone();
        let changed = after != before;
        emit_push_events(&self.events, added, removed, changed, before, after);
    }

    /// Set the transmit flag, enforcing the single-transmitter invariant
    ///
    /// Setting `true` clears `transmit` on every other slice in the same
    /// atomic step; no observer ever sees two transmitters.
    pub fn set_tx(&self, index: usize, on: bool) -> bool {
        let mut slices = self.lock();
        if index >= slices.len() || !slices[index].in_use {
            return false;
        }

        let mut updates = Vec::new();
        if on {
            for slice in slices.iter_mut() {
                if slice.index != index && slice.transmit {
                    slice.transmit = false;
                    updates.push(slice.clone());
                }
            }
        }
        if slices[index].transmit != on {
            slices[index].transmit = on;
            updates.push(slices[index].clone());
        }

        let changed = !updates.is_empty();
        for state in updates {
            let _ = self.events.send(SliceEvent::Updated(state));
        }
        changed
    }

    /// Optimistic frequency update from a CAT set-command
    pub fn set_frequency(&self, index: usize, hz: u64) -> bool {
        let mut slices = self.lock();
        match slices.get_mut(index) {
            Some(slice) if slice.in_use && slice.frequency_hz != hz => {
                slice.frequency_hz = hz;
                let _ = self.events.send(SliceEvent::Updated(slice.clone()));
                true
            }
            _ => false,
        }
    }

    /// Optimistic mode update from a CAT set-command
    pub fn set_mode(&self, index: usize, mode: SliceMode) -> bool {
        let mut slices = self.lock();
        match slices.get_mut(index) {
            Some(slice) if slice.in_use && slice.mode != mode => {
                slice.mode = mode;
                let _ = self.events.send(SliceEvent::Updated(slice.clone()));
                true
            }
            _ => false,
        }
    }

    /// Record the decoder-app instance serving a slice
    ///
    /// Binding a released slice is a no-op; clearing is always allowed.
    pub fn bind_instance(&self, index: usize, instance_id: Option<String>) {
        let mut slices = self.lock();
        if let Some(slice) = slices.get_mut(index) {
            if instance_id.is_some() && !slice.in_use {
                return;
            }
            if slice.instance_id != instance_id {
                slice.instance_id = instance_id;
                let _ = self.events.send(SliceEvent::Updated(slice.clone()));
            }
        }
    }

    /// Index of the slice currently transmitting, if any
    pub fn transmitting_slice(&self) -> Option<usize> {
        self.lock().iter().find(|s| s.transmit).map(|s| s.index)
    }
}

impl Default for SliceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit the events for one `apply_push` in a fixed order: Added (with the
/// merged state), Removed (with the prior state), then Updated.
fn emit_push_events(
    events: &broadcast::Sender<SliceEvent>,
    added: bool,
    removed: bool,
    changed: bool,
    before: Slice,
    after: Slice,
) {
    if added {
        debug!(index = after.index, "slice added");
        let _ = events.send(SliceEvent::Added(after.clone()));
    }
    if removed {
        debug!(index = before.index, "slice removed");
        let _ = events.send(SliceEvent::Removed(before));
    }
    if changed {
        let _ = events.send(SliceEvent::Updated(after));
    }
}

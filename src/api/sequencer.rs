//! Guards against a slow response overwriting a newer one.
//!
//! Each request for a slot (say "stock history") takes a [`Ticket`]. When its
//! response arrives the ticket is checked; if another request for the same
//! slot started in the meantime the response is stale and should be dropped.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Proof that a request was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    slot: &'static str,
    id: u64,
}

#[derive(Debug, Default)]
pub struct RequestSequencer {
    next_id: AtomicU64,
    latest: Mutex<HashMap<&'static str, u64>>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a request for `slot`, superseding any earlier one.
    pub fn begin(&self, slot: &'static str) -> Ticket {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slot, id);
        Ticket { slot, id }
    }

    /// Whether `ticket` still belongs to the newest request for its slot.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(ticket.slot)
            == Some(&ticket.id)
    }
}

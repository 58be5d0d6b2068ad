//! Coalescing primitives used to keep passes and notifications out of each
//! other's way.

use std::sync::{Arc, Mutex};

use crate::group::MemberId;

/// Removal request left behind by a dropped registration.
///
/// `serial` identifies the registration, so a stale handle cannot remove a
/// member that was registered again under the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detach {
    pub member: MemberId,
    pub serial: u64,
}

#[derive(Debug, Default)]
struct SchedulerState {
    pending: bool,
    cancelled: bool,
    absorbed: u64,
    detached: Vec<Detach>,
}

/// Debounce-to-next-frame flag for one group.
///
/// Clones share state, which lets a dropped [`Registration`](crate::group::Registration)
/// queue its own removal without borrowing the group.
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    inner: Arc<Mutex<SchedulerState>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a pass on the next frame. Returns `false` when the request was
    /// absorbed by an already pending pass or the scheduler is cancelled.
    pub fn request(&self) -> bool {
        let Ok(mut guard) = self.inner.lock() else {
            return false;
        };
        if guard.cancelled {
            return false;
        }
        if guard.pending {
            guard.absorbed = guard.absorbed.saturating_add(1);
            return false;
        }
        guard.pending = true;
        true
    }

    /// Consume the pending flag. `true` means a pass should run now.
    pub fn take(&self) -> bool {
        match self.inner.lock() {
            Ok(mut guard) if !guard.cancelled => std::mem::take(&mut guard.pending),
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner
            .lock()
            .map(|guard| guard.pending && !guard.cancelled)
            .unwrap_or(false)
    }

    /// Queue a member for removal at the start of the next pass.
    pub fn detach(&self, request: Detach) {
        if let Ok(mut guard) = self.inner.lock() {
            if guard.cancelled {
                return;
            }
            guard.detached.push(request);
        }
        self.request();
    }

    pub fn drain_detached(&self) -> Vec<Detach> {
        self.inner
            .lock()
            .map(|mut guard| std::mem::take(&mut guard.detached))
            .unwrap_or_default()
    }

    /// Drop any pending pass and refuse future requests.
    pub fn cancel(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.cancelled = true;
            guard.pending = false;
            guard.detached.clear();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .lock()
            .map(|guard| guard.cancelled)
            .unwrap_or(true)
    }

    /// Requests absorbed since the last call.
    pub fn take_absorbed(&self) -> u64 {
        self.inner
            .lock()
            .map(|mut guard| std::mem::take(&mut guard.absorbed))
            .unwrap_or(0)
    }
}

/// Single-slot queue keeping only the most recent value.
#[derive(Debug, Clone, Default)]
pub struct CoalescingSlot<T> {
    value: Option<T>,
    overwritten: u64,
}

impl<T> CoalescingSlot<T> {
    pub fn new() -> Self {
        Self {
            value: None,
            overwritten: 0,
        }
    }

    pub fn put(&mut self, value: T) {
        if self.value.replace(value).is_some() {
            self.overwritten = self.overwritten.saturating_add(1);
        }
    }

    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn peek(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// How many queued values were replaced before being flushed.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

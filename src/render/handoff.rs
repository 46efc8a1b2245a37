//! Single-slot frame handoff between the simulation and the render consumer
//!
//! The producer publishes one frame per loop iteration and then waits until
//! the consumer has released it. The consumer holds a [`FrameLease`] while it
//! reads the buffers; dropping the lease is the acknowledgement. A slow
//! consumer therefore stalls the simulation instead of dropping frames, and a
//! bounded wait turns a vanished consumer into a recoverable stall.

use std::ops::Deref;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::Frame;

/// How a producer wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// The consumer released the frame
    Consumed,
    /// No acknowledgement within the timeout
    Stalled,
    /// The handoff was closed or interrupted while waiting
    Closed,
}

#[derive(Debug, Default)]
struct Slot {
    /// Published and not yet leased
    ready: Option<Frame>,
    published: u64,
    consumed: u64,
    /// Released frame whose buffers the producer can reuse
    spare: Option<Frame>,
    closed: bool,
    /// Producer waits return early; consumers are unaffected
    interrupted: bool,
}

/// Rendezvous point; share it behind an `Arc`
#[derive(Debug, Default)]
pub struct FrameHandoff {
    slot: Mutex<Slot>,
    cond: Condvar,
}

impl FrameHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `frame` the current one. A frame nobody leased yet is replaced.
    ///
    /// Returns the sequence number to pass to [`wait_consumed`](Self::wait_consumed).
    pub fn publish(&self, frame: Frame) -> u64 {
        let mut slot = self.slot.lock();
        slot.published += 1;
        if let Some(stale) = slot.ready.replace(frame) {
            slot.spare = Some(stale);
        }
        let seq = slot.published;
        drop(slot);
        self.cond.notify_all();
        seq
    }

    /// Block until frame `seq` has been released, the timeout passes or the
    /// handoff is closed. `None` waits without a bound.
    pub fn wait_consumed(&self, seq: u64, timeout: Option<Duration>) -> HandoffOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot.lock();
        loop {
            if slot.consumed >= seq {
                return HandoffOutcome::Consumed;
            }
            if slot.closed || slot.interrupted {
                return HandoffOutcome::Closed;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut slot, deadline).timed_out() {
                        return if slot.consumed >= seq {
                            HandoffOutcome::Consumed
                        } else {
                            HandoffOutcome::Stalled
                        };
                    }
                }
                None => self.cond.wait(&mut slot),
            }
        }
    }

    /// Recycle a released frame, if there is one
    pub fn take_spare(&self) -> Option<Frame> {
        self.slot.lock().spare.take()
    }

    /// Wait for a published frame and lease it.
    ///
    /// Returns `None` on timeout or once the handoff is closed with nothing
    /// left to read.
    pub fn acquire(&self, timeout: Option<Duration>) -> Option<FrameLease<'_>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot.lock();
        loop {
            if let Some(frame) = slot.ready.take() {
                return Some(FrameLease {
                    handoff: self,
                    frame,
                    seq: slot.published,
                });
            }
            if slot.closed {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut slot, deadline).timed_out() && slot.ready.is_none() {
                        return None;
                    }
                }
                None => self.cond.wait(&mut slot),
            }
        }
    }

    /// Wake every waiter and refuse further waits until reopened.
    /// Consumers drain what is left, then `acquire` returns `None`.
    pub fn close(&self) {
        self.slot.lock().closed = true;
        self.cond.notify_all();
    }

    /// Release a waiting producer without telling consumers to stop
    pub fn interrupt(&self) {
        self.slot.lock().interrupted = true;
        self.cond.notify_all();
    }

    /// Accept frames again after `close` or `interrupt`, discarding anything unread
    pub fn reopen(&self) {
        let mut slot = self.slot.lock();
        slot.closed = false;
        slot.interrupted = false;
        slot.ready = None;
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    fn release(&self, seq: u64, frame: Frame) {
        let mut slot = self.slot.lock();
        slot.consumed = slot.consumed.max(seq);
        if slot.spare.is_none() {
            slot.spare = Some(frame);
        }
        drop(slot);
        self.cond.notify_all();
    }
}

/// Read access to one published frame. Dropping it acknowledges the frame.
#[derive(Debug)]
pub struct FrameLease<'a> {
    handoff: &'a FrameHandoff,
    frame: Frame,
    seq: u64,
}

impl FrameLease<'_> {
    /// Sequence number of the leased frame
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Deref for FrameLease<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        self.handoff.release(self.seq, std::mem::take(&mut self.frame));
    }
}

use std::fmt;

use crate::error::{EngineError, EngineResult};

/// A point on the GPU timeline.
///
/// Values are handed out by [`Fence::signal`] in strictly increasing order. The
/// zero value is never signaled and always reads as complete.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    pub const ZERO: FenceValue = FenceValue(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The GPU side of the fence.
///
/// Implemented by every backend. Signals are ordered behind all work already
/// handed to the queue.
pub trait Timeline {
    /// Queues a signal of `value` after all previously executed lists.
    fn signal(&mut self, value: FenceValue) -> EngineResult<()>;

    /// Highest value the GPU has reached so far.
    fn completed_value(&self) -> FenceValue;

    /// Blocks the calling thread until `completed_value() >= value`.
    ///
    /// There is no timeout. A hung or removed device surfaces as
    /// [`EngineError::DeviceLost`].
    fn wait_for(&self, value: FenceValue) -> EngineResult<()>;
}

/// CPU-side fence counter.
///
/// Created once at bootstrap and never reset.
#[derive(Debug)]
pub struct Fence {
    next: u64,
    last_signaled: FenceValue,
}

impl Fence {
    pub fn new() -> Self {
        Self {
            next: 1,
            last_signaled: FenceValue::ZERO,
        }
    }

    /// Value the next [`signal`](Self::signal) call will use.
    pub fn next_value(&self) -> FenceValue {
        FenceValue(self.next)
    }

    /// Most recent value handed to the timeline.
    pub fn last_signaled(&self) -> FenceValue {
        self.last_signaled
    }

    /// Queues a signal for the next value and returns it.
    ///
    /// The counter only advances when the timeline accepted the request.
    pub fn signal<T>(&mut self, timeline: &mut T) -> EngineResult<FenceValue>
    where
        T: Timeline + ?Sized,
    {
        let value = FenceValue(self.next);
        timeline.signal(value)?;

        self.next += 1;
        self.last_signaled = value;
        log::trace!("fence signal {value}");
        Ok(value)
    }

    pub fn is_complete<T>(&self, timeline: &T, value: FenceValue) -> bool
    where
        T: Timeline + ?Sized,
    {
        timeline.completed_value() >= value
    }

    /// Blocks until the GPU has reached `value`.
    ///
    /// Returns immediately when the value is already complete. Waiting on a value
    /// that was never signaled would never return, so it is rejected.
    pub fn wait_until_signaled<T>(&self, timeline: &T, value: FenceValue) -> EngineResult<()>
    where
        T: Timeline + ?Sized,
    {
        if value > self.last_signaled {
            return Err(EngineError::Frame(
                "wait on a fence value that was never signaled",
            ));
        }

        if self.is_complete(timeline, value) {
            return Ok(());
        }

        log::trace!(
            "waiting for fence {value} (completed {})",
            timeline.completed_value()
        );
        timeline.wait_for(value)?;
        debug_assert!(timeline.completed_value() >= value);
        Ok(())
    }

    /// Signals and waits: no GPU work queued before this call is outstanding afterwards.
    pub fn flush<T>(&mut self, timeline: &mut T) -> EngineResult<FenceValue>
    where
        T: Timeline + ?Sized,
    {
        let value = self.signal(timeline)?;
        self.wait_until_signaled(timeline, value)?;
        Ok(value)
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Timeline that only completes work when someone waits on it.
    #[derive(Default)]
    struct LazyTimeline {
        queued: Vec<FenceValue>,
        completed: Cell<FenceValue>,
        waits: Cell<u32>,
        reject: bool,
    }

    impl Timeline for LazyTimeline {
        fn signal(&mut self, value: FenceValue) -> EngineResult<()> {
            if self.reject {
                return Err(EngineError::Submit("queue rejected signal".into()));
            }
            self.queued.push(value);
            Ok(())
        }

        fn completed_value(&self) -> FenceValue {
            self.completed.get()
        }

        fn wait_for(&self, value: FenceValue) -> EngineResult<()> {
            self.waits.set(self.waits.get() + 1);
            self.completed.set(value);
            Ok(())
        }
    }

    #[test]
    fn first_signal_is_one() {
        let mut tl = LazyTimeline::default();
        let mut fence = Fence::new();
        assert_eq!(fence.next_value(), FenceValue::new(1));
        assert_eq!(fence.signal(&mut tl).unwrap(), FenceValue::new(1));
        assert_eq!(fence.next_value(), FenceValue::new(2));
        assert_eq!(tl.queued, vec![FenceValue::new(1)]);
    }

    #[test]
    fn signals_strictly_increase() {
        let mut tl = LazyTimeline::default();
        let mut fence = Fence::new();
        let values: Vec<_> = (0..16).map(|_| fence.signal(&mut tl).unwrap()).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fence.last_signaled(), FenceValue::new(16));
    }

    #[test]
    fn rejected_signal_does_not_advance() {
        let mut tl = LazyTimeline {
            reject: true,
            ..Default::default()
        };
        let mut fence = Fence::new();
        let err = fence.signal(&mut tl).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(fence.next_value(), FenceValue::new(1));
        assert_eq!(fence.last_signaled(), FenceValue::ZERO);
    }

    #[test]
    fn wait_skips_blocking_when_complete() {
        let mut tl = LazyTimeline::default();
        let mut fence = Fence::new();
        let v = fence.signal(&mut tl).unwrap();
        tl.completed.set(v);

        fence.wait_until_signaled(&tl, v).unwrap();
        assert_eq!(tl.waits.get(), 0);
    }

    #[test]
    fn flush_waits_for_its_own_value() {
        let mut tl = LazyTimeline::default();
        let mut fence = Fence::new();
        fence.signal(&mut tl).unwrap();

        let v = fence.flush(&mut tl).unwrap();
        assert_eq!(v, FenceValue::new(2));
        assert_eq!(tl.waits.get(), 1);
        assert!(fence.is_complete(&tl, v));
    }

    #[test]
    fn waiting_on_future_value_is_rejected() {
        let tl = LazyTimeline::default();
        let fence = Fence::new();
        assert!(fence.wait_until_signaled(&tl, FenceValue::new(1)).is_err());
        assert!(fence.wait_until_signaled(&tl, FenceValue::ZERO).is_ok());
    }
}

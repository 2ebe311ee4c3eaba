use crate::backend::GpuBackend;
use crate::cmd::{CommandList, RecordingState, RecordingUnit};
use crate::error::{EngineError, EngineResult};
use crate::sync::{Fence, FenceValue, Timeline};

/// Frame recording units plus the fence that decides when they may be reused.
///
/// With one unit in flight every frame waits for the previous one. With more,
/// frame `n` reuses the unit of frame `n - frames_in_flight` and only waits on
/// that unit's own marker.
#[derive(Debug)]
pub struct SubmissionEngine {
    fence: Fence,
    units: Vec<RecordingUnit>,
    current: usize,
    frames_submitted: u64,
}

impl SubmissionEngine {
    pub fn new(frames_in_flight: usize) -> EngineResult<Self> {
        if frames_in_flight == 0 {
            return Err(EngineError::Init("at least one frame in flight is required".into()));
        }

        let units = (0..frames_in_flight)
            .map(|i| RecordingUnit::new(format!("frame {i}")))
            .collect();

        Ok(Self {
            fence: Fence::new(),
            units,
            current: 0,
            frames_submitted: 0,
        })
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn frames_in_flight(&self) -> usize {
        self.units.len()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// The unit the next (or current) frame records into.
    pub fn current_unit(&self) -> &RecordingUnit {
        &self.units[self.current]
    }

    /// Completion marker of the unit the next frame will reuse.
    pub fn pending_marker(&self) -> Option<FenceValue> {
        self.current_unit().pending()
    }

    /// Blocks until the next frame's unit is retired.
    pub fn wait_for_unit<T>(&self, timeline: &T) -> EngineResult<()>
    where
        T: Timeline + ?Sized,
    {
        match self.pending_marker() {
            Some(marker) => self.fence.wait_until_signaled(timeline, marker),
            None => Ok(()),
        }
    }

    /// Resets the current unit into `Recording`.
    ///
    /// Fails with [`EngineError::UnitInFlight`] when its last submission has not
    /// completed yet. Callers wait first (see [`wait_for_unit`](Self::wait_for_unit)).
    pub fn begin_frame(&mut self, completed: FenceValue) -> EngineResult<&mut CommandList> {
        let unit = &mut self.units[self.current];
        if unit.state() == RecordingState::Recording {
            return Err(EngineError::Frame("frame already begun"));
        }
        unit.retire(completed);
        unit.reset(completed)
    }

    /// The list of the frame being recorded.
    pub fn list_mut(&mut self) -> EngineResult<&mut CommandList> {
        self.units[self.current].recording()
    }

    /// Lets `record` append to the frame list.
    pub fn record_into<F, R>(&mut self, record: F) -> EngineResult<R>
    where
        F: FnOnce(&mut CommandList) -> EngineResult<R>,
    {
        record(self.list_mut()?)
    }

    /// Closes the frame list, hands it to the queue and signals the fence.
    ///
    /// The returned value retires the unit. The frame index only advances on
    /// success.
    pub fn submit<B>(&mut self, backend: &mut B) -> EngineResult<FenceValue>
    where
        B: GpuBackend + ?Sized,
    {
        let unit = &mut self.units[self.current];
        let marker = submit_unit(&mut self.fence, backend, unit)?;

        self.current = (self.current + 1) % self.units.len();
        self.frames_submitted += 1;
        log::trace!("frame {} submitted as {marker}", self.frames_submitted);
        Ok(marker)
    }

    /// Submits a closed list owned by another component on the same queue.
    pub fn execute_external<B>(
        &mut self,
        backend: &mut B,
        unit: &mut RecordingUnit,
    ) -> EngineResult<FenceValue>
    where
        B: GpuBackend + ?Sized,
    {
        if unit.state() == RecordingState::Recording {
            unit.close()?;
        }
        submit_unit(&mut self.fence, backend, unit)
    }

    /// Drops the current recording without submitting it.
    pub fn abandon_frame(&mut self) {
        let unit = &mut self.units[self.current];
        if unit.state() == RecordingState::Recording {
            log::debug!("abandoning `{}` with {} commands", unit.label(), unit.list().len());
            // Closed lists are reset on the next begin.
            let _ = unit.close();
        }
    }

    pub fn signal<T>(&mut self, timeline: &mut T) -> EngineResult<FenceValue>
    where
        T: Timeline + ?Sized,
    {
        self.fence.signal(timeline)
    }

    pub fn wait_until_signaled<T>(&self, timeline: &T, value: FenceValue) -> EngineResult<()>
    where
        T: Timeline + ?Sized,
    {
        self.fence.wait_until_signaled(timeline, value)
    }

    /// Waits until everything submitted so far has completed, then retires all units.
    pub fn flush<T>(&mut self, timeline: &mut T) -> EngineResult<FenceValue>
    where
        T: Timeline + ?Sized,
    {
        let value = self.fence.flush(timeline)?;
        for unit in &mut self.units {
            unit.retire(value);
        }
        Ok(value)
    }
}

fn submit_unit<B>(fence: &mut Fence, backend: &mut B, unit: &mut RecordingUnit) -> EngineResult<FenceValue>
where
    B: GpuBackend + ?Sized,
{
    if unit.state() == RecordingState::Recording {
        unit.close()?;
    }
    if unit.state() != RecordingState::Closed {
        return Err(EngineError::RecordingState {
            label: unit.label().to_owned(),
            expected: "closed",
            found: unit.state(),
        });
    }

    backend
        .execute(unit.list())
        .map_err(|e| EngineError::Submit(format!("`{}` rejected: {e}", unit.label())))?;
    let marker = fence.signal(backend)?;
    unit.mark_submitted(marker)?;
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::{HeadlessBackend, HeadlessConfig, LatencyModel};
    use crate::error::ErrorClass;

    fn backend(latency: LatencyModel) -> HeadlessBackend {
        HeadlessBackend::new(HeadlessConfig {
            latency,
            ..Default::default()
        })
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        assert!(SubmissionEngine::new(0).is_err());
    }

    #[test]
    fn submit_signals_and_marks_the_unit() {
        let mut gpu = backend(LatencyModel::Immediate);
        let mut engine = SubmissionEngine::new(1).unwrap();

        engine.begin_frame(gpu.completed_value()).unwrap();
        let marker = engine.submit(&mut gpu).unwrap();

        assert_eq!(marker, FenceValue::new(1));
        assert_eq!(engine.current_unit().state(), RecordingState::Submitted(marker));
        assert_eq!(gpu.executed().len(), 1);
    }

    #[test]
    fn begin_frame_refuses_unit_in_flight() {
        let mut gpu = backend(LatencyModel::Fixed(Duration::from_millis(200)));
        let mut engine = SubmissionEngine::new(1).unwrap();

        engine.begin_frame(gpu.completed_value()).unwrap();
        engine.submit(&mut gpu).unwrap();

        let err = engine.begin_frame(FenceValue::ZERO).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Usage);

        engine.wait_for_unit(&gpu).unwrap();
        engine.begin_frame(gpu.completed_value()).unwrap();
    }

    #[test]
    fn units_rotate_with_two_frames_in_flight() {
        let mut gpu = backend(LatencyModel::Immediate);
        let mut engine = SubmissionEngine::new(2).unwrap();

        engine.begin_frame(gpu.completed_value()).unwrap();
        let first = engine.submit(&mut gpu).unwrap();
        assert_eq!(engine.pending_marker(), None);

        engine.begin_frame(gpu.completed_value()).unwrap();
        engine.submit(&mut gpu).unwrap();
        assert_eq!(engine.pending_marker(), Some(first));
    }

    #[test]
    fn execute_external_shares_the_fence() {
        let mut gpu = backend(LatencyModel::Immediate);
        let mut engine = SubmissionEngine::new(1).unwrap();
        let mut unit = RecordingUnit::new("pso");

        unit.reset(FenceValue::ZERO).unwrap();
        let a = engine.execute_external(&mut gpu, &mut unit).unwrap();

        engine.begin_frame(gpu.completed_value()).unwrap();
        let b = engine.submit(&mut gpu).unwrap();

        assert!(b > a);
        assert_eq!(unit.pending(), Some(a));
        let labels: Vec<_> = gpu.executed().iter().map(|l| l.label.clone()).collect();
        assert_eq!(labels, ["pso", "frame 0"]);
    }

    #[test]
    fn external_unit_must_be_recorded() {
        let mut gpu = backend(LatencyModel::Immediate);
        let mut engine = SubmissionEngine::new(1).unwrap();
        let mut unit = RecordingUnit::new("idle");

        let err = engine.execute_external(&mut gpu, &mut unit).unwrap_err();
        assert!(matches!(err, EngineError::RecordingState { .. }));
        assert_eq!(engine.fence().last_signaled(), FenceValue::ZERO);
    }

    #[test]
    fn flush_retires_every_unit() {
        let mut gpu = backend(LatencyModel::Fixed(Duration::from_millis(5)));
        let mut engine = SubmissionEngine::new(2).unwrap();

        for _ in 0..2 {
            engine.begin_frame(gpu.completed_value()).unwrap();
            engine.submit(&mut gpu).unwrap();
        }
        let value = engine.flush(&mut gpu).unwrap();

        assert!(gpu.completed_value() >= value);
        assert_eq!(engine.current_unit().state(), RecordingState::Idle);
    }

    #[test]
    fn abandoned_frame_can_begin_again() {
        let gpu = backend(LatencyModel::Immediate);
        let mut engine = SubmissionEngine::new(1).unwrap();

        engine.begin_frame(gpu.completed_value()).unwrap().draw_indexed(3, 1);
        engine.abandon_frame();
        let list = engine.begin_frame(gpu.completed_value()).unwrap();
        assert!(list.is_empty());
    }
}

// FIFO queue plus the cpu/gpu execution slots

use super::core::{JobId, RenderMode, Slot};
use std::collections::VecDeque;

/// Decides which queued job starts next and on which slot.
///
/// Pure bookkeeping: no I/O and no knowledge of job status beyond the
/// eligibility predicate handed to [`Scheduler::plan_next`].
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: VecDeque<JobId>,
    cpu: Option<JobId>,
    gpu: Option<JobId>,
    mode: RenderMode,
    gpu_available: bool,
}

impl Scheduler {
    pub fn new(mode: RenderMode, gpu_available: bool) -> Self {
        let mut scheduler = Self {
            gpu_available,
            ..Self::default()
        };
        scheduler.set_mode(mode);
        scheduler
    }

    /// Append `id` unless it is already queued. Returns whether it was added.
    pub fn enqueue(&mut self, id: JobId) -> bool {
        if self.queue.contains(&id) {
            return false;
        }
        self.queue.push_back(id);
        true
    }

    /// Drop `id` from the queue and from any slot holding it
    pub fn remove(&mut self, id: JobId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|queued| *queued != id);
        let dequeued = self.queue.len() != before;
        let released = self.release(id).is_some();
        dequeued || released
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    /// Requested mode, as last recorded
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Mode actually used for dispatch: GPU modes degrade to cpu without a GPU
    pub fn effective_mode(&self) -> RenderMode {
        if self.gpu_available {
            self.mode
        } else {
            RenderMode::Cpu
        }
    }

    pub fn gpu_available(&self) -> bool {
        self.gpu_available
    }

    /// Update GPU availability. Losing the GPU forces cpu mode and moves the
    /// job holding the gpu slot back to the front of the queue; that id is returned.
    pub fn set_gpu_available(&mut self, available: bool) -> Option<JobId> {
        self.gpu_available = available;
        if available {
            return None;
        }
        if self.mode != RenderMode::Cpu {
            self.mode = RenderMode::Cpu;
        }
        let displaced = self.gpu.take()?;
        self.queue.retain(|queued| *queued != displaced);
        self.queue.push_front(displaced);
        Some(displaced)
    }

    /// Pop the first eligible id, discarding ineligible ones on the way
    fn pop_eligible<F>(&mut self, is_eligible: &F) -> Option<JobId>
    where
        F: Fn(&JobId) -> bool,
    {
        while let Some(id) = self.queue.pop_front() {
            if is_eligible(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Plan up to two dispatches. Queue entries are consumed, slot occupancy
    /// is not touched; call [`Scheduler::occupy`] once a job actually starts.
    pub fn plan_next<F>(&mut self, is_eligible: F) -> Vec<(JobId, Slot)>
    where
        F: Fn(&JobId) -> bool,
    {
        let mode = self.effective_mode();
        let mut planned = Vec::with_capacity(2);

        if mode.uses_cpu_slot() && self.cpu.is_none() {
            if let Some(id) = self.pop_eligible(&is_eligible) {
                planned.push((id, Slot::Cpu));
            }
        }
        if self.gpu_available && mode.uses_gpu_slot() && self.gpu.is_none() {
            if let Some(id) = self.pop_eligible(&is_eligible) {
                planned.push((id, Slot::Gpu));
            }
        }

        planned
    }

    pub fn occupy(&mut self, id: JobId, slot: Slot) {
        match slot {
            Slot::Cpu => self.cpu = Some(id),
            Slot::Gpu => self.gpu = Some(id),
        }
    }

    /// Free whichever slot holds `id`. No-op when neither does.
    pub fn release(&mut self, id: JobId) -> Option<Slot> {
        if self.cpu == Some(id) {
            self.cpu = None;
            Some(Slot::Cpu)
        } else if self.gpu == Some(id) {
            self.gpu = None;
            Some(Slot::Gpu)
        } else {
            None
        }
    }

    pub fn release_slot(&mut self, slot: Slot) -> Option<JobId> {
        match slot {
            Slot::Cpu => self.cpu.take(),
            Slot::Gpu => self.gpu.take(),
        }
    }

    /// Put `id` back at the head of the queue (dispatch could not go ahead)
    pub fn requeue_front(&mut self, id: JobId) {
        self.queue.retain(|queued| *queued != id);
        self.queue.push_front(id);
    }

    pub fn reset_slots(&mut self) {
        self.cpu = None;
        self.gpu = None;
    }

    pub fn slot(&self, slot: Slot) -> Option<JobId> {
        match slot {
            Slot::Cpu => self.cpu,
            Slot::Gpu => self.gpu,
        }
    }

    pub fn slot_of(&self, id: JobId) -> Option<Slot> {
        if self.cpu == Some(id) {
            Some(Slot::Cpu)
        } else if self.gpu == Some(id) {
            Some(Slot::Gpu)
        } else {
            None
        }
    }

    pub fn active_count(&self) -> usize {
        usize::from(self.cpu.is_some()) + usize::from(self.gpu.is_some())
    }

    pub fn queued(&self) -> impl Iterator<Item = &JobId> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, id: JobId) -> bool {
        self.queue.contains(&id)
    }
}

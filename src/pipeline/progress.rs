use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct ProgressState {
    total: Option<u64>,
    step: u64,
    done: u64,
    percent: u8,
}

/// Encode progress in percent, refreshed every `max(1, round(total / 100))` video frames.
///
/// With an unknown total the value creeps up one point per refresh and stays below 100 until
/// [`Progress::finish`].
#[derive(Debug, Default)]
pub struct Progress {
    state: Mutex<ProgressState>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self, total: Option<u64>) {
        let step = total.map_or(1, |t| ((t as f64 / 100.0).round() as u64).max(1));
        *self.lock() = ProgressState {
            total,
            step,
            done: 0,
            percent: 0,
        };
    }

    /// Count one encoded video frame.
    pub fn record_frame(&self) {
        let mut st = self.lock();
        st.done += 1;
        if st.done % st.step.max(1) != 0 {
            return;
        }
        st.percent = match st.total {
            Some(t) if t > 0 => (st.done.saturating_mul(100) / t).min(100) as u8,
            _ => st.done.min(99) as u8,
        };
    }

    pub fn finish(&self) {
        self.lock().percent = 100;
    }

    pub fn percent(&self) -> u8 {
        self.lock().percent
    }

    pub fn frames(&self) -> u64 {
        self.lock().done
    }

    pub fn total(&self) -> Option<u64> {
        self.lock().total
    }
}

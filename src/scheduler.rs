//! Registry of periodic producers, advanced in time order by the audio thread.

// -------------------------------------------------------------------------------------------------

/// Smallest time step the scheduler moves an engine forward, when the engine asks to be
/// advanced again at or before the time it just got advanced at.
const MIN_TIME_STEP: f64 = 1e-6;

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct ScheduledEngine {
    key: usize,
    next_time: Option<f64>,
}

// -------------------------------------------------------------------------------------------------

/// Schedules periodic producers ("engines") identified by a numeric key.
///
/// An engine is registered with a start time and then advanced by [`Scheduler::advance_until`]
/// whenever its next time falls into the processed time range. Each advance returns the engine's
/// next time, or `None` to park it: a parked engine stays registered, so [`Scheduler::has`] still
/// reports it, but is not advanced again until it gets re-armed.
///
/// Engines are never advanced concurrently: `advance_until` calls them one after another in
/// time order.
#[derive(Debug, Clone)]
pub struct Scheduler {
    engines: Vec<ScheduledEngine>,
}

impl Scheduler {
    /// Create a new scheduler with preallocated space for the given number of engines.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            engines: Vec::with_capacity(capacity),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// True when an engine with the given key is registered, parked or not.
    pub fn has(&self, key: usize) -> bool {
        self.engines.iter().any(|e| e.key == key)
    }

    /// Next time of the engine with the given key. `None` when it is parked or not registered.
    pub fn next_time_of(&self, key: usize) -> Option<f64> {
        self.engines
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.next_time)
    }

    /// Register an engine to be advanced first at the given time. Registering an already
    /// registered key moves it to the given time.
    pub fn add(&mut self, key: usize, time: f64) {
        if let Some(engine) = self.engines.iter_mut().find(|e| e.key == key) {
            engine.next_time = Some(time);
        } else {
            self.engines.push(ScheduledEngine {
                key,
                next_time: Some(time),
            });
        }
    }

    /// Re-arm a parked engine at the given time. Armed engines keep their next time.
    /// Returns false when no engine with the given key is registered.
    pub fn rearm(&mut self, key: usize, time: f64) -> bool {
        match self.engines.iter_mut().find(|e| e.key == key) {
            Some(engine) => {
                if engine.next_time.is_none() {
                    engine.next_time = Some(time);
                }
                true
            }
            None => false,
        }
    }

    /// Unregister all engines.
    pub fn clear(&mut self) {
        self.engines.clear();
    }

    /// Advance all engines whose next time is before `end_time`, in time order, by calling
    /// `advance(key, time)` until every armed engine's next time is at or past `end_time`.
    ///
    /// Returns the number of performed advance calls.
    pub fn advance_until<F>(&mut self, end_time: f64, mut advance: F) -> usize
    where
        F: FnMut(usize, f64) -> Option<f64>,
    {
        let mut advance_count = 0;
        loop {
            let due = self
                .engines
                .iter_mut()
                .filter(|e| e.next_time.is_some_and(|t| t < end_time))
                .min_by(|a, b| {
                    let a = a.next_time.unwrap_or(f64::INFINITY);
                    let b = b.next_time.unwrap_or(f64::INFINITY);
                    a.total_cmp(&b)
                });
            let Some(engine) = due else {
                break;
            };
            let Some(time) = engine.next_time else {
                break;
            };
            engine.next_time =
                advance(engine.key, time).map(|next_time| next_time.max(time + MIN_TIME_STEP));
            advance_count += 1;
        }
        advance_count
    }
}

// -------------------------------------------------------------------------------------------------

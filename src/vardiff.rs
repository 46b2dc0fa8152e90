use super::*;

/// Tunables for a single worker's variable-difficulty controller, supplied
/// once at worker creation and otherwise immutable.
#[derive(Debug, Clone, Copy)]
pub struct VardiffConfig {
    pub min: Difficulty,
    pub max: Difficulty,
    pub target_seconds: f64,
    pub retarget_seconds: f64,
    pub variance_percent: f64,
}

impl VardiffConfig {
    fn target_min(&self) -> f64 {
        self.target_seconds - self.target_seconds * self.variance_percent / 100.0
    }

    fn target_max(&self) -> f64 {
        self.target_seconds + self.target_seconds * self.variance_percent / 100.0
    }

    /// `4 * retarget / target`, per the reference controller this is modeled
    /// on: enough history to smooth a retarget window without carrying
    /// samples from long before it.
    fn buffer_size(&self) -> usize {
        ((4.0 * self.retarget_seconds / self.target_seconds).round() as usize).max(1)
    }
}

/// Per-worker variable-difficulty controller: tracks inter-share arrival
/// times in a fixed-capacity ring buffer and periodically retargets the
/// assigned difficulty toward `target_seconds`, in "x2 mode" -- each
/// retarget window moves difficulty by at most one double/halve step, never
/// a continuous proportional delta, to damp oscillation.
#[derive(Debug)]
pub struct Vardiff {
    config: VardiffConfig,
    state: Mutex<VardiffState>,
}

#[derive(Debug)]
struct VardiffState {
    intervals: VecDeque<f64>,
    last_share_at: Option<Instant>,
    retarget_at: Instant,
    current: Difficulty,
}

impl Vardiff {
    pub fn new(initial: Difficulty, config: VardiffConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            state: Mutex::new(VardiffState {
                intervals: VecDeque::with_capacity(config.buffer_size()),
                last_share_at: None,
                retarget_at: now
                    .checked_sub(Duration::from_secs_f64(config.retarget_seconds / 2.0))
                    .unwrap_or(now),
                current: initial,
            }),
        }
    }

    pub fn current(&self) -> Difficulty {
        self.state.lock().current
    }

    /// Records a share's arrival and, once the retarget window has elapsed
    /// and the buffer holds at least one sample, returns the new difficulty
    /// the caller should push via `mining.set_difficulty` (`None` if the
    /// retarget held difficulty steady).
    ///
    /// An empty buffer never retargets, even past the window deadline --
    /// there would be nothing to average a retarget off, and the buffer can
    /// only be empty before any share has ever arrived.
    pub fn on_share(&self, now: Instant) -> Option<Difficulty> {
        let mut state = self.state.lock();

        if let Some(last) = state.last_share_at {
            let interval = now.saturating_duration_since(last).as_secs_f64();
            if state.intervals.len() == self.config.buffer_size() {
                state.intervals.pop_front();
            }
            state.intervals.push_back(interval);
        }
        state.last_share_at = Some(now);

        let elapsed = now.saturating_duration_since(state.retarget_at).as_secs_f64();
        if state.intervals.is_empty() || elapsed < self.config.retarget_seconds {
            return None;
        }

        let avg = state.intervals.iter().sum::<f64>() / state.intervals.len() as f64;
        let old = state.current;
        let new = self.retarget(old, avg);

        state.retarget_at = now;

        if new == old {
            None
        } else {
            debug!(old = old.as_f64(), new = new.as_f64(), avg, "vardiff retarget");
            state.current = new;
            Some(new)
        }
    }

    /// x2-mode delta selection: halve if the mean interval overshot the
    /// target band (shares too slow) and we're above the floor; double if it
    /// undershot (shares too fast); otherwise hold.
    fn retarget(&self, old: Difficulty, avg_interval: f64) -> Difficulty {
        let target_max = self.config.target_max();
        let target_min = self.config.target_min();

        if avg_interval > target_max && old > self.config.min {
            Difficulty::from((old.as_f64() * 0.5).max(self.config.min.as_f64()))
        } else if avg_interval < target_min {
            Difficulty::from((old.as_f64() * 2.0).min(self.config.max.as_f64()))
        } else {
            old
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VardiffConfig {
        VardiffConfig {
            min: Difficulty::from(1),
            max: Difficulty::from(1_000_000),
            target_seconds: 10.0,
            retarget_seconds: 100.0,
            variance_percent: 10.0,
        }
    }

    fn controller() -> Vardiff {
        Vardiff::new(Difficulty::from(8), config())
    }

    #[test]
    fn empty_buffer_never_retargets() {
        let vardiff = controller();
        let now = Instant::now();
        assert_eq!(vardiff.on_share(now), None);
        assert_eq!(vardiff.current().as_f64(), 8.0);
    }

    #[test]
    fn doubles_when_shares_arrive_faster_than_target() {
        let vardiff = controller();
        let mut now = Instant::now();
        vardiff.on_share(now);

        // Shares every 4s against a 10s target (well under targetMin=9s)
        // should double once the 100s window has elapsed.
        let mut retargeted = None;
        for _ in 0..40 {
            now += Duration::from_secs(4);
            if let Some(d) = vardiff.on_share(now) {
                retargeted = Some(d);
                break;
            }
        }

        assert_eq!(retargeted, Some(Difficulty::from(16)));
        assert_eq!(vardiff.current().as_f64(), 16.0);
    }

    #[test]
    fn halves_when_shares_arrive_slower_than_target() {
        let vardiff = controller();
        let mut now = Instant::now();
        vardiff.on_share(now);

        // Shares every 25s against a 10s target (well over targetMax=11s)
        // should halve once the window has elapsed.
        let mut retargeted = None;
        for _ in 0..10 {
            now += Duration::from_secs(25);
            if let Some(d) = vardiff.on_share(now) {
                retargeted = Some(d);
                break;
            }
        }

        assert_eq!(retargeted, Some(Difficulty::from(4)));
    }

    #[test]
    fn doubles_twice_across_two_windows() {
        let vardiff = controller();
        let mut now = Instant::now();
        vardiff.on_share(now);

        let mut doublings = Vec::new();
        for _ in 0..80 {
            now += Duration::from_secs(5);
            if let Some(d) = vardiff.on_share(now) {
                doublings.push(d);
                if doublings.len() == 2 {
                    break;
                }
            }
        }

        assert_eq!(doublings, vec![Difficulty::from(16), Difficulty::from(32)]);
    }

    #[test]
    fn clamps_to_configured_minimum() {
        let vardiff = Vardiff::new(
            Difficulty::from(1),
            VardiffConfig {
                min: Difficulty::from(1),
                max: Difficulty::from(1_000_000),
                target_seconds: 10.0,
                retarget_seconds: 10.0,
                variance_percent: 10.0,
            },
        );
        let mut now = Instant::now();
        vardiff.on_share(now);
        now += Duration::from_secs(100);
        // already at the minimum: halving is suppressed by the `old > min` guard
        assert_eq!(vardiff.on_share(now), None);
    }

    #[test]
    fn holds_steady_when_within_target_band() {
        let vardiff = controller();
        let mut now = Instant::now();
        vardiff.on_share(now);
        for _ in 0..9 {
            now += Duration::from_secs(10);
            vardiff.on_share(now);
        }
        now += Duration::from_secs(10);
        assert_eq!(vardiff.on_share(now), None);
    }
}

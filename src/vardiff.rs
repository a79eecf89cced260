use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VardiffOptions {
    /// Seconds between shares the controller aims for.
    pub target_time: f64,
    pub variance_percent: f64,
    /// Seconds between difficulty decisions.
    pub retarget_time: f64,
    pub min_diff: f64,
    pub max_diff: f64,
    #[serde(default)]
    pub x2mode: bool,
}

impl Default for VardiffOptions {
    fn default() -> Self {
        Self {
            target_time: 15.0,
            variance_percent: 30.0,
            retarget_time: 60.0,
            min_diff: 0.01,
            max_diff: 512.0,
            x2mode: false,
        }
    }
}

/// Per-port difficulty controller. Connection state lives in [`VardiffTracker`].
#[derive(Debug, Clone)]
pub struct Vardiff {
    options: VardiffOptions,
    t_min: f64,
    t_max: f64,
    retarget: Duration,
    buffer_size: usize,
}

impl Vardiff {
    pub fn new(options: VardiffOptions) -> Self {
        let variance = options.target_time * options.variance_percent / 100.0;

        Self {
            t_min: options.target_time - variance,
            t_max: options.target_time + variance,
            retarget: Duration::try_from_secs_f64(options.retarget_time).unwrap_or_default(),
            buffer_size: ((options.retarget_time / options.target_time * 4.0).round() as usize).max(1),
            options,
        }
    }

    pub fn options(&self) -> &VardiffOptions {
        &self.options
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn tracker(&self) -> VardiffTracker {
        VardiffTracker {
            last_submit: None,
            next_retarget: None,
            samples: RingBuffer::new(self.buffer_size),
        }
    }

    /// Records a submit at `now` and returns the difficulty to apply with the next job, if
    /// the average share interval left the target band.
    pub fn record_submit(
        &self,
        tracker: &mut VardiffTracker,
        current: Difficulty,
        now: Instant,
    ) -> Option<Difficulty> {
        let Some(last_submit) = tracker.last_submit.replace(now) else {
            tracker.next_retarget = Some(now + self.retarget / 2);
            return None;
        };

        tracker
            .samples
            .push(now.saturating_duration_since(last_submit).as_secs_f64());

        if tracker.next_retarget.is_some_and(|due| now < due) && !tracker.samples.is_empty() {
            return None;
        }

        tracker.next_retarget = Some(now + self.retarget);

        let average = tracker.samples.average();
        let current = current.as_f64();
        let VardiffOptions {
            target_time,
            min_diff,
            max_diff,
            x2mode,
            ..
        } = self.options;

        let mut ratio = target_time / average;

        if average > self.t_max && current > min_diff {
            if x2mode {
                ratio = 0.5;
            }
            if ratio * current < min_diff {
                ratio = min_diff / current;
            }
        } else if average < self.t_min {
            if x2mode {
                ratio = 2.0;
            }
            if ratio * current > max_diff {
                ratio = max_diff / current;
            }
        } else {
            debug!(
                "Vardiff average {average:.3}s inside [{:.3}, {:.3}]",
                self.t_min, self.t_max
            );
            return None;
        }

        tracker.samples.clear();

        let next = Difficulty::new(current * ratio);

        debug!("Vardiff average {average:.3}s moves difficulty {current} -> {next}");

        (next.as_f64() != current).then_some(next)
    }
}

/// Submit timing for one connection.
#[derive(Debug, Clone)]
pub struct VardiffTracker {
    last_submit: Option<Instant>,
    next_retarget: Option<Instant>,
    samples: RingBuffer,
}

#[derive(Debug, Clone)]
struct RingBuffer {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn average(&self) -> f64 {
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> VardiffOptions {
        VardiffOptions {
            target_time: 15.0,
            variance_percent: 30.0,
            retarget_time: 60.0,
            min_diff: 1.0,
            max_diff: 1000.0,
            x2mode: false,
        }
    }

    /// Submits every `interval` seconds until a decision comes back.
    fn run(vardiff: &Vardiff, current: f64, interval: u64) -> Option<Difficulty> {
        let mut tracker = vardiff.tracker();
        let start = Instant::now();

        (0..100).find_map(|i| {
            vardiff.record_submit(
                &mut tracker,
                Difficulty::new(current),
                start + Duration::from_secs(i * interval),
            )
        })
    }

    #[test]
    fn derived_constants() {
        let vardiff = Vardiff::new(options());
        assert_eq!(vardiff.t_min, 10.5);
        assert_eq!(vardiff.t_max, 19.5);
        assert_eq!(vardiff.buffer_size(), 16);
    }

    #[test]
    fn slow_shares_lower_difficulty() {
        assert_eq!(run(&Vardiff::new(options()), 10.0, 30), Some(Difficulty::new(5.0)));
    }

    #[test]
    fn fast_shares_raise_difficulty() {
        assert_eq!(run(&Vardiff::new(options()), 10.0, 5), Some(Difficulty::new(30.0)));
    }

    #[test]
    fn raise_clamps_at_max() {
        assert_eq!(
            run(&Vardiff::new(options()), 500.0, 5),
            Some(Difficulty::new(1000.0))
        );
    }

    #[test]
    fn lower_clamps_at_min() {
        assert_eq!(run(&Vardiff::new(options()), 1.5, 60), Some(Difficulty::new(1.0)));
    }

    #[test]
    fn at_min_never_lowers() {
        assert_eq!(run(&Vardiff::new(options()), 1.0, 60), None);
    }

    #[test]
    fn inside_band_keeps_difficulty() {
        assert_eq!(run(&Vardiff::new(options()), 10.0, 15), None);
    }

    #[test]
    fn x2mode_steps_by_two() {
        let vardiff = Vardiff::new(VardiffOptions {
            x2mode: true,
            ..options()
        });

        assert_eq!(run(&vardiff, 10.0, 5), Some(Difficulty::new(20.0)));
        assert_eq!(run(&vardiff, 10.0, 40), Some(Difficulty::new(5.0)));
    }

    #[test]
    fn first_submit_only_starts_the_window() {
        let vardiff = Vardiff::new(options());
        let mut tracker = vardiff.tracker();
        let start = Instant::now();

        assert_eq!(
            vardiff.record_submit(&mut tracker, Difficulty::new(10.0), start),
            None
        );
        assert!(tracker.samples.is_empty());
        assert_eq!(tracker.next_retarget, Some(start + Duration::from_secs(30)));
    }

    #[test]
    fn first_decision_after_half_a_retarget() {
        let vardiff = Vardiff::new(options());
        let mut tracker = vardiff.tracker();
        let start = Instant::now();
        let difficulty = Difficulty::new(10.0);

        for i in 0..6 {
            assert_eq!(
                vardiff.record_submit(&mut tracker, difficulty, start + Duration::from_secs(i * 5)),
                None
            );
        }

        assert_eq!(
            vardiff.record_submit(&mut tracker, difficulty, start + Duration::from_secs(30)),
            Some(Difficulty::new(30.0))
        );
        assert!(tracker.samples.is_empty());
    }

    #[test]
    fn ring_buffer_averages_held_samples() {
        let mut buffer = RingBuffer::new(3);
        buffer.push(1.0);
        assert_eq!(buffer.average(), 1.0);

        buffer.push(2.0);
        buffer.push(3.0);
        buffer.push(10.0);
        assert_eq!(buffer.average(), 5.0);
    }

    #[test]
    fn options_from_toml() {
        let options: VardiffOptions = toml::from_str(
            "target_time = 15\nvariance_percent = 30\nretarget_time = 60\nmin_diff = 1\nmax_diff = 1000\n",
        )
        .unwrap();
        assert_eq!(options, self::options());
    }
}

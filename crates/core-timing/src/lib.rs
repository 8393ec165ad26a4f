//! Timing accumulation and the three-line report printed at job end.

/// Non-negative wall-clock accumulators owned by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingAccumulator {
    computation: f64,
    communication: f64,
}

impl TimingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds wall-clock shading time (the coordinator's own, or a worker's
    /// self-reported trailing float).
    pub fn add_computation(&mut self, seconds: f64) {
        debug_assert!(seconds >= 0.0, "compute time must be non-negative");
        self.computation += seconds.max(0.0);
    }

    /// Adds a span of coordinator-observed blocking time inside
    /// probe/recv/send.
    pub fn add_communication(&mut self, seconds: f64) {
        debug_assert!(seconds >= 0.0, "communication time must be non-negative");
        self.communication += seconds.max(0.0);
    }

    pub fn computation(&self) -> f64 {
        self.computation
    }

    pub fn communication(&self) -> f64 {
        self.communication
    }

    /// `communication / computation`. Sequential mode (`computation == 0`
    /// when there is nothing to shade) naturally yields Rust's `f64` answer
    /// for `0.0/0.0` (`NaN`) rather than a synthesized `inf`.
    pub fn c_to_c_ratio(&self) -> f64 {
        self.communication / self.computation
    }

    /// Times a closure, adding its wall-clock duration to `computation`, and
    /// returns the closure's result.
    pub fn time_computation<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = std::time::Instant::now();
        let out = f();
        self.add_computation(start.elapsed().as_secs_f64());
        out
    }

    /// Times a closure, adding its wall-clock duration to `communication`,
    /// and returns the closure's result.
    pub fn time_communication<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = std::time::Instant::now();
        let out = f();
        self.add_communication(start.elapsed().as_secs_f64());
        out
    }

    /// Renders the exact three-line report, in order. This is the
    /// wire-visible stdout contract and must not be reformatted through
    /// `tracing`.
    pub fn report(&self) -> String {
        format!(
            "Total Computation Time: {} seconds\nTotal Communication Time: {} seconds\nC-to-C Ratio: {}",
            self.computation,
            self.communication,
            self.c_to_c_ratio()
        )
    }

    /// Prints [`Self::report`] to stdout and mirrors the same figures to
    /// `tracing` under target `timing` for operators who redirect stdout
    /// elsewhere (additive ambient instrumentation, not a replacement).
    pub fn emit_report(&self) {
        println!("{}", self.report());
        tracing::info!(
            target: "timing",
            computation_seconds = self.computation,
            communication_seconds = self.communication,
            c_to_c_ratio = self.c_to_c_ratio(),
            "job_complete"
        );
    }
}

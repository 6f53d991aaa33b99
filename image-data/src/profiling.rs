//! Accumulated stage timing, reported at debug level.

use crate::common::*;

#[derive(Debug)]
pub struct Timing {
    name: &'static str,
    start: Instant,
    stages: Vec<(&'static str, Duration)>,
}

impl Timing {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
            stages: vec![],
        }
    }

    /// Run `f` and add its running time to `stage`.
    pub fn measure<T>(&mut self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        let instant = Instant::now();
        let output = f();
        self.add(stage, instant.elapsed());
        output
    }

    /// Add to the elapsed time of `stage`. Repeated stages accumulate.
    pub fn add(&mut self, stage: &'static str, elapsed: Duration) {
        match self.stages.iter_mut().find(|(name, _)| *name == stage) {
            Some((_, total)) => *total += elapsed,
            None => self.stages.push((stage, elapsed)),
        }
    }

    pub fn stage(&self, stage: &'static str) -> Option<Duration> {
        self.stages
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, elapsed)| *elapsed)
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn report(&self) {
        debug!("{}: {:?}", self.name, self.total());
        self.stages.iter().for_each(|(name, elapsed)| {
            debug!("- {}\t{:?}", name, elapsed);
        });
    }
}

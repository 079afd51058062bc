//! Simulated herd for demos and tests.

use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Frame, FrameSource, SourceError};
use crate::membership::SampleRecord;
use crate::BoxFuture;

/// Frames produced before a mock session completes.
pub const DEFAULT_MOCK_FRAME_LIMIT: u64 = 200;

/// Random-walk parameters.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Up to this many animals are visible in any one frame.
    pub max_entities: usize,
    /// Stop after this many frames; `None` runs until cancelled.
    pub frame_limit: Option<u64>,
    /// Fixed seed for reproducible walks.
    pub seed: Option<u64>,
    /// Walkers bounce inside `[min_x, max_x] x [min_y, max_y]`.
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    /// Chance per frame that a walker changes heading.
    pub turn_probability: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            max_entities: 3,
            frame_limit: Some(DEFAULT_MOCK_FRAME_LIMIT),
            seed: None,
            min_x: 10.0,
            max_x: 400.0,
            min_y: 10.0,
            max_y: 300.0,
            turn_probability: 0.1,
        }
    }
}

impl MockConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_frame_limit(mut self, limit: Option<u64>) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn with_max_entities(mut self, max: usize) -> Self {
        self.max_entities = max.max(1);
        self
    }
}

#[derive(Debug, Clone)]
struct Walker {
    x: f64,
    y: f64,
    heading: f64,
    speed: f64,
}

/// Generates wandering animals.
///
/// Each frame shows animals `1..=n` for a random `n` up to
/// [`MockConfig::max_entities`]; animals keep their position while hidden.
#[derive(Debug)]
pub struct MockSource {
    config: MockConfig,
    rng: StdRng,
    walkers: BTreeMap<i64, Walker>,
    frame_number: u64,
}

impl MockSource {
    pub fn new(config: MockConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        Self {
            config,
            rng,
            walkers: BTreeMap::new(),
            frame_number: 0,
        }
    }

    /// Number of distinct animals generated so far.
    pub fn entities_seen(&self) -> usize {
        self.walkers.len()
    }

    fn step(&mut self, id: i64) -> SampleRecord {
        let config = &self.config;
        let rng = &mut self.rng;
        let walker = self.walkers.entry(id).or_insert_with(|| Walker {
            x: rng.random_range(50.0..=300.0),
            y: rng.random_range(50.0..=200.0),
            heading: rng.random_range(0.0..TAU),
            speed: rng.random_range(1.0..3.0),
        });

        if rng.random_bool(config.turn_probability) {
            walker.heading += rng.random_range(-0.5..0.5);
        }
        walker.x += walker.speed * walker.heading.cos();
        walker.y += walker.speed * walker.heading.sin();

        if walker.x < config.min_x || walker.x > config.max_x {
            walker.heading = PI - walker.heading;
            walker.x = walker.x.clamp(config.min_x, config.max_x);
        }
        if walker.y < config.min_y || walker.y > config.max_y {
            walker.heading = -walker.heading;
            walker.y = walker.y.clamp(config.min_y, config.max_y);
        }

        SampleRecord {
            confidence: Some((rng.random_range(0.70..0.95) * 100.0_f64).round() / 100.0),
            object_type: Some("elephant".to_string()),
            ..SampleRecord::new(id, walker.x.trunc(), walker.y.trunc())
        }
    }

    fn generate(&mut self) -> Frame {
        self.frame_number += 1;
        let now = crate::now_millis();
        let visible = self.rng.random_range(1..=self.config.max_entities.max(1)) as i64;
        let objects = (1..=visible)
            .map(|id| {
                let mut record = self.step(id);
                record.timestamp = Some(now);
                record
            })
            .collect();
        Frame::new(self.frame_number, now, objects)
    }
}

impl FrameSource for MockSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<Frame>, SourceError>> {
        let exhausted = self
            .config
            .frame_limit
            .is_some_and(|limit| self.frame_number >= limit);
        let next = (!exhausted).then(|| self.generate());
        Box::pin(async move { Ok(next) })
    }

    fn total_frames(&self) -> Option<u64> {
        self.config.frame_limit
    }

    fn name(&self) -> &str {
        "mock"
    }
}

use anyhow::{anyhow, bail, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, trace};

use crate::config::*;
use crate::image::Image;
use crate::my_types::*;
use crate::particle::*;
use crate::region::Region;
use crate::signature::Signature;

/// Particle swarm tracking a single object
#[derive(Debug)]
pub struct ParticleFilter {
    id: ObjectId,
    /// Object size at scale 1
    reference_size: Vector2i,
    signature: Signature,
    particles: Box<[Particle]>,
    /// Pre-resample copy of the swarm, kept to avoid allocating every frame
    previous: Box<[Particle]>,
    cumulative: Vec<f64>,
    samples: Vec<f64>,
    position_noise: Normal<f64>,
    scale_noise: Normal<f64>,
    min_scale: f64,
    max_scale: f64,
    min_size: i32,
    strategy: ResampleStrategy,
}

impl ParticleFilter {
    /// Start tracking the object inside `region` of an HSV frame
    pub fn new(id: ObjectId, region: &Region, frame: &Image, config: &Config) -> Result<Self> {
        if region.is_degenerate() {
            bail!(
                "cannot track object {id} from degenerate region {} x {}",
                region.width,
                region.height
            );
        }
        if config.particle_count == 0 {
            bail!("particle count must be positive");
        }
        if config.depth == 0 {
            bail!("signature depth must be positive");
        }
        // level sizes are the reference size shifted right by the level
        if config.depth > i32::BITS as usize - 1 {
            bail!("signature depth {} is too large", config.depth);
        }
        if config.bins().contains(&0) {
            bail!("histogram bin counts must be positive, got {:?}", config.bins());
        }
        if !(config.level_alpha.is_finite() && config.level_alpha > 1.) {
            bail!("level alpha must be finite and above 1, got {}", config.level_alpha);
        }
        if !config.score_scale.is_finite() {
            bail!("invalid score scale {}", config.score_scale);
        }
        if !(config.min_scale > 0. && config.min_scale <= config.max_scale) {
            bail!(
                "invalid scale range [{}, {}]",
                config.min_scale,
                config.max_scale
            );
        }
        let position_noise = Normal::new(0., config.position_sigma)
            .map_err(|e| anyhow!("invalid position sigma {}: {e}", config.position_sigma))?;
        let scale_noise = Normal::new(0., config.scale_sigma)
            .map_err(|e| anyhow!("invalid scale sigma {}: {e}", config.scale_sigma))?;

        let reference_size = region.size();
        let center = region.center();
        let signature = Signature::compute(
            frame,
            center,
            reference_size,
            config.depth,
            config.bins(),
            config.level_alpha,
            config.score_scale,
        );

        let n = config.particle_count;
        let particles = vec![Particle::new(center, 1., 1. / n as f64); n].into_boxed_slice();

        Ok(Self {
            id,
            reference_size,
            signature,
            previous: particles.clone(),
            particles,
            cumulative: Vec::with_capacity(n),
            samples: Vec::with_capacity(n),
            position_noise,
            scale_noise,
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            min_size: config.min_size,
            strategy: config.resample,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn reference_size(&self) -> Vector2i {
        self.reference_size
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The whole swarm, for drawing
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Propagate, report and resample for one frame.
    ///
    /// The returned estimate is taken before resampling.
    pub fn step<R: Rng + ?Sized>(&mut self, frame: &Image, rng: &mut R) -> Estimate {
        self.propagate(frame, rng);
        let estimate = self.estimate();
        debug!(
            id = %self.id,
            x = estimate.x,
            y = estimate.y,
            scale = estimate.scale,
            weight = estimate.weight,
            "best particle"
        );
        self.resample(rng);
        estimate
    }

    /// Move every particle by a random offset and rescore it against the frame.
    ///
    /// Returns the number of particles whose move was rejected; those keep
    /// their previous position, scale and weight.
    pub fn propagate<R: Rng + ?Sized>(&mut self, frame: &Image, rng: &mut R) -> usize {
        let mut rejected = 0;
        for i in 0..self.particles.len() {
            let particle = self.particles[i];
            let offset = Vector2d::new(
                self.position_noise.sample(rng),
                self.position_noise.sample(rng),
            );
            let position = particle
                .position
                .zip_map(&offset, |p, o| p.saturating_add(o.round() as i32));
            let scale = (particle.scale + self.scale_noise.sample(rng))
                .abs()
                .clamp(self.min_scale, self.max_scale);
            if !self.try_move(i, position, scale, frame) {
                rejected += 1;
            }
        }
        trace!(id = %self.id, rejected, "propagated swarm");
        rejected
    }

    /// Commit a candidate for particle `index` if it is large enough and fits the frame
    fn try_move(&mut self, index: usize, position: Vector2i, scale: f64, frame: &Image) -> bool {
        let size = scaled_size(self.reference_size, scale);
        if size.x < self.min_size || size.y < self.min_size {
            return false;
        }
        match self.signature.compare(frame, position, size) {
            Some(weight) => {
                self.particles[index] = Particle::new(position, scale, weight);
                true
            }
            None => false,
        }
    }

    /// Highest-weight particle, the first one on ties
    pub fn best(&self) -> &Particle {
        let mut best = &self.particles[0];
        for particle in self.particles.iter().skip(1) {
            if best.weight < particle.weight {
                best = particle;
            }
        }
        best
    }

    pub fn estimate(&self) -> Estimate {
        Estimate::new(self.best(), self.reference_size)
    }

    /// Redistribute the swarm towards heavy particles and zero every weight.
    pub fn resample<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n = self.particles.len();
        self.previous.copy_from_slice(&self.particles);

        self.cumulative.clear();
        let mut total = 0.;
        for particle in self.previous.iter() {
            total += particle.weight;
            self.cumulative.push(total);
        }

        // with no weight every sample is 0 and the swarm collapses onto the first particle
        let drawn = match self.strategy {
            ResampleStrategy::Legacy => n / 2,
            ResampleStrategy::Weighted => n,
        };
        self.samples.clear();
        for _ in 0..drawn {
            self.samples.push(rng.gen_range(0.0..=total));
        }
        self.samples.sort_by(|a, b| a.total_cmp(b));

        // both the samples and the cumulative weights are increasing
        let mut j = 0;
        for (i, &sample) in self.samples.iter().enumerate() {
            while j < n - 1 && self.cumulative[j] < sample {
                j += 1;
            }
            self.particles[i].position = self.previous[j].position;
            self.particles[i].scale = self.previous[j].scale;
        }

        if self.strategy == ResampleStrategy::Legacy {
            // shift-copy of the freshly drawn half, independent of weight
            let mut j = 0;
            for i in n / 2..n {
                j = (j + 1).min(n - 1);
                self.particles[i].position = self.particles[j].position;
                self.particles[i].scale = self.particles[j].scale;
            }
        }

        for particle in self.particles.iter_mut() {
            particle.weight = 0.;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    const BACKGROUND: [u8; 3] = [60, 200, 200];
    const TARGET: [u8; 3] = [120, 255, 255];

    /// 300 x 300 HSV frame with a 50 x 50 target centered at (100, 100)
    fn target_frame() -> Image {
        let mut frame = Image::filled(300, 300, BACKGROUND);
        frame.fill_rect(75, 75, 50, 50, TARGET);
        frame
    }

    fn target_region() -> Region {
        Region::new(75, 75, 50, 50)
    }

    fn make_filter(strategy: ResampleStrategy) -> (ParticleFilter, Image) {
        let frame = target_frame();
        let config = Config {
            resample: strategy,
            ..Config::default()
        };
        let filter = ParticleFilter::new(ObjectId(1), &target_region(), &frame, &config).unwrap();
        (filter, frame)
    }

    #[test]
    fn test_initial_swarm() {
        let (filter, _) = make_filter(ResampleStrategy::Legacy);
        assert_eq!(filter.id(), ObjectId(1));
        assert_eq!(filter.reference_size(), Vector2i::new(50, 50));
        assert_eq!(filter.signature().depth(), 2);
        assert_eq!(filter.particles().len(), 100);
        for particle in filter.particles() {
            assert_eq!(particle.position, Vector2i::new(100, 100));
            assert_eq!(particle.scale, 1.);
            assert_eq!(particle.weight, 1. / 100.);
        }
    }

    #[test]
    fn test_invalid_input() {
        let frame = target_frame();
        let config = Config::default();
        for region in [Region::new(10, 10, 0, 20), Region::new(10, 10, 20, -3)] {
            assert!(ParticleFilter::new(ObjectId(0), &region, &frame, &config).is_err());
        }
        let empty = Config {
            particle_count: 0,
            ..Config::default()
        };
        assert!(ParticleFilter::new(ObjectId(0), &target_region(), &frame, &empty).is_err());
        let no_levels = Config {
            depth: 0,
            ..Config::default()
        };
        assert!(ParticleFilter::new(ObjectId(0), &target_region(), &frame, &no_levels).is_err());

        let invalid = [
            Config { depth: 32, ..Config::default() },
            Config { depth: 64, ..Config::default() },
            Config { hue_bins: 0, ..Config::default() },
            Config { saturation_bins: 0, ..Config::default() },
            Config { value_bins: 0, ..Config::default() },
            Config { level_alpha: 1., ..Config::default() },
            Config { level_alpha: 0.5, ..Config::default() },
            Config { level_alpha: f64::INFINITY, ..Config::default() },
            Config { level_alpha: f64::NAN, ..Config::default() },
            Config { score_scale: f64::NAN, ..Config::default() },
            Config { position_sigma: -1., ..Config::default() },
            Config { min_scale: 2., max_scale: 1., ..Config::default() },
        ];
        for config in &invalid {
            assert!(
                ParticleFilter::new(ObjectId(0), &target_region(), &frame, config).is_err(),
                "accepted {config:?}"
            );
        }

        let deep = Config { depth: 31, ..Config::default() };
        let filter = ParticleFilter::new(ObjectId(0), &target_region(), &frame, &deep).unwrap();
        assert_eq!(filter.signature().depth(), 31);
    }

    #[test]
    fn test_region_partially_outside_is_accepted() {
        let frame = target_frame();
        let region = Region::new(-20, 280, 50, 50);
        let filter = ParticleFilter::new(ObjectId(0), &region, &frame, &Config::default()).unwrap();
        for level in &filter.signature().levels {
            assert!((level.sum() - 1.).abs() < 1e-5);
        }
    }

    #[test]
    fn test_step_on_static_frame() {
        let (mut filter, frame) = make_filter(ResampleStrategy::Legacy);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let estimate = filter.step(&frame, &mut rng);

        let max = filter.signature().max_score();
        assert!(estimate.weight >= 0.85 * max, "best weight {}", estimate.weight);
        assert!(estimate.weight <= max + 1e-9);
        let distance = (estimate.position() - Vector2i::new(100, 100)).map(|v| v as f64).norm();
        assert!(distance <= 60., "best particle {distance} px away");
        assert!(estimate.is_confident(0.4));
    }

    #[test]
    fn test_tracks_moving_target() {
        let (mut filter, _) = make_filter(ResampleStrategy::Legacy);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut estimate = None;
        for shift in 0..10 {
            let mut frame = Image::filled(300, 300, BACKGROUND);
            frame.fill_rect(75 + 5 * shift, 75, 50, 50, TARGET);
            estimate = Some(filter.step(&frame, &mut rng));
        }
        let estimate = estimate.unwrap();
        assert!(estimate.is_confident(0.4));
        assert!((estimate.x - 145).abs() <= 25, "x = {}", estimate.x);
        assert!((estimate.y - 100).abs() <= 25, "y = {}", estimate.y);
    }

    #[test]
    fn test_left_edge_candidate_rejected() {
        let (mut filter, frame) = make_filter(ResampleStrategy::Legacy);
        let before = filter.particles()[0];
        assert!(!filter.try_move(0, Vector2i::new(0, 150), 1., &frame));
        assert_eq!(filter.particles()[0], before);
    }

    #[test]
    fn test_small_candidate_rejected() {
        let (mut filter, frame) = make_filter(ResampleStrategy::Legacy);
        let before = filter.particles()[3];
        // 50 * 0.15 truncates to 7 pixels
        assert!(!filter.try_move(3, Vector2i::new(150, 150), 0.15, &frame));
        assert_eq!(filter.particles()[3], before);

        assert!(filter.try_move(3, Vector2i::new(150, 150), 0.2, &frame));
        let moved = filter.particles()[3];
        assert_eq!(moved.position, Vector2i::new(150, 150));
        assert_eq!(moved.scale, 0.2);
        assert!(moved.weight < 0.1);
    }

    #[test]
    fn test_propagate_keeps_candidates_in_frame() {
        let mut frame = Image::filled(120, 120, BACKGROUND);
        frame.fill_rect(5, 5, 40, 40, TARGET);
        let mut filter =
            ParticleFilter::new(ObjectId(2), &Region::new(5, 5, 40, 40), &frame, &Config::default()).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);

        let mut total_rejected = 0;
        for _ in 0..5 {
            let before = filter.particles().to_vec();
            total_rejected += filter.propagate(&frame, &mut rng);
            for (old, new) in before.iter().zip(filter.particles()) {
                if old == new {
                    continue;
                }
                let size = new.size(filter.reference_size());
                assert!(size.x >= 8 && size.y >= 8);
                assert!(new.region(filter.reference_size()).is_inside(&frame));
            }
            filter.resample(&mut rng);
        }
        // the object touches the border, so plenty of proposals leave the frame
        assert!(total_rejected > 0);
    }

    #[test]
    fn test_selection_far_outside_frame() {
        let frame = target_frame();
        let region = Region::new(i32::MAX - 10, i32::MAX - 10, 50, 50);
        let mut filter = ParticleFilter::new(ObjectId(0), &region, &frame, &Config::default()).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let before = filter.particles().to_vec();
        assert_eq!(filter.propagate(&frame, &mut rng), before.len());
        assert_eq!(filter.particles(), &before[..]);
        filter.resample(&mut rng);
    }

    #[test]
    fn test_best_prefers_first_on_ties() {
        let (mut filter, _) = make_filter(ResampleStrategy::Legacy);
        for (i, particle) in filter.particles.iter_mut().enumerate() {
            particle.position = Vector2i::new(i as i32, 0);
            particle.weight = 0.1;
        }
        filter.particles[4].weight = 0.7;
        filter.particles[9].weight = 0.7;
        assert_eq!(filter.best().position, Vector2i::new(4, 0));
        assert_eq!(filter.estimate().weight, 0.7);

        for particle in filter.particles.iter_mut() {
            particle.weight = 0.;
        }
        assert_eq!(filter.best().position, Vector2i::new(0, 0));
    }

    fn spread(filter: &mut ParticleFilter) {
        for (i, particle) in filter.particles.iter_mut().enumerate() {
            particle.position = Vector2i::new(i as i32, 2 * i as i32);
            particle.scale = 1. + i as f64 / 100.;
            particle.weight = 0.;
        }
    }

    #[test]
    fn test_resample_resets_weights() {
        for strategy in [ResampleStrategy::Legacy, ResampleStrategy::Weighted] {
            let (mut filter, frame) = make_filter(strategy);
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
            filter.propagate(&frame, &mut rng);
            filter.resample(&mut rng);
            assert_eq!(filter.particles().len(), 100);
            assert!(filter.particles().iter().all(|p| p.weight == 0.));
        }
    }

    #[test]
    fn test_resample_concentrates_on_weight() {
        for strategy in [ResampleStrategy::Legacy, ResampleStrategy::Weighted] {
            let (mut filter, _) = make_filter(strategy);
            spread(&mut filter);
            filter.particles[17].weight = 0.9;
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
            filter.resample(&mut rng);
            for particle in filter.particles() {
                assert_eq!(particle.position, Vector2i::new(17, 34), "{strategy:?}");
                assert_eq!(particle.scale, 1. + 17. / 100.);
            }
        }
    }

    #[test]
    fn test_weighted_resample_is_proportional() {
        let (mut filter, _) = make_filter(ResampleStrategy::Weighted);
        spread(&mut filter);
        filter.particles[10].weight = 1.;
        filter.particles[60].weight = 3.;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(21);
        filter.resample(&mut rng);

        let heavy = filter
            .particles()
            .iter()
            .filter(|p| p.position == Vector2i::new(60, 120))
            .count();
        let light = filter
            .particles()
            .iter()
            .filter(|p| p.position == Vector2i::new(10, 20))
            .count();
        assert_eq!(heavy + light, 100);
        assert!(heavy > 55 && heavy < 95, "heavy = {heavy}");
        // samples are sorted, so the swarm stays ordered by source index
        assert!(filter.particles()[..light].iter().all(|p| p.position.x == 10));
    }

    #[test]
    fn test_legacy_resample_shift_copies_second_half() {
        let (mut filter, _) = make_filter(ResampleStrategy::Legacy);
        spread(&mut filter);
        for (i, particle) in filter.particles.iter_mut().enumerate() {
            particle.weight = i as f64;
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(13);
        filter.resample(&mut rng);

        let particles = filter.particles();
        let half = particles.len() / 2;
        for i in half..particles.len() {
            assert_eq!(particles[i].position, particles[i - half + 1].position);
            assert_eq!(particles[i].scale, particles[i - half + 1].scale);
        }
        // the drawn half follows the sorted samples
        for pair in particles[..half].windows(2) {
            assert!(pair[0].position.x <= pair[1].position.x);
        }
    }

    #[test]
    fn test_resample_without_weight_collapses_onto_first() {
        for strategy in [ResampleStrategy::Legacy, ResampleStrategy::Weighted] {
            let (mut filter, _) = make_filter(strategy);
            spread(&mut filter);
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
            filter.resample(&mut rng);
            for particle in filter.particles() {
                assert_eq!(particle.position, Vector2i::new(0, 0), "{strategy:?}");
                assert_eq!(particle.scale, 1.);
                assert_eq!(particle.weight, 0.);
            }
        }
    }

    #[test]
    fn test_single_particle_swarm() {
        let frame = target_frame();
        let config = Config {
            particle_count: 1,
            ..Config::default()
        };
        let mut filter = ParticleFilter::new(ObjectId(0), &target_region(), &frame, &config).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        for _ in 0..3 {
            filter.step(&frame, &mut rng);
        }
        assert_eq!(filter.particles().len(), 1);
    }
}

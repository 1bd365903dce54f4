use std::collections::BTreeMap;

use anyhow::{bail, Result};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{info, instrument};

use crate::config::Config;
use crate::image::Image;
use crate::my_types::*;
use crate::particle::Estimate;
use crate::particle_filter::ParticleFilter;
use crate::region::Region;

/// Registry of tracked objects.
///
/// Objects never share state; the only common resource is the random
/// generator, which is owned here and lent to one filter at a time.
pub struct Tracker {
    config: Config,
    filters: BTreeMap<ObjectId, ParticleFilter>,
    next_id: ObjectId,
    rng: Xoshiro256PlusPlus,
}

impl Tracker {
    pub fn new(config: Config) -> Self {
        let rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        Self {
            config,
            filters: BTreeMap::new(),
            next_id: ObjectId(1),
            rng,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start tracking the region of an HSV frame under a fresh id
    pub fn select(&mut self, region: &Region, frame: &Image) -> Result<ObjectId> {
        let id = self.next_id;
        self.insert(id, region, frame)?;
        Ok(id)
    }

    /// Start tracking the region under a caller-chosen id
    pub fn insert(&mut self, id: ObjectId, region: &Region, frame: &Image) -> Result<()> {
        if self.filters.contains_key(&id) {
            bail!("object {id} is already tracked");
        }
        let filter = ParticleFilter::new(id, region, frame, &self.config)?;
        self.filters.insert(id, filter);
        if id >= self.next_id {
            self.next_id = ObjectId(id.0 + 1);
        }
        info!(%id, ?region, "tracking new object");
        Ok(())
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<ParticleFilter> {
        let removed = self.filters.remove(&id);
        if removed.is_some() {
            info!(%id, "stopped tracking object");
        }
        removed
    }

    pub fn get(&self, id: ObjectId) -> Option<&ParticleFilter> {
        self.filters.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &ParticleFilter)> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Propagate and rescore every swarm against the frame
    #[instrument(skip_all)]
    pub fn update(&mut self, frame: &Image) {
        for filter in self.filters.values_mut() {
            filter.propagate(frame, &mut self.rng);
        }
    }

    /// Best particle of every object, ordered by id
    pub fn estimates(&self) -> Vec<(ObjectId, Estimate)> {
        self.filters
            .iter()
            .map(|(id, filter)| (*id, filter.estimate()))
            .collect()
    }

    #[instrument(skip_all)]
    pub fn resample(&mut self) {
        for filter in self.filters.values_mut() {
            filter.resample(&mut self.rng);
        }
    }

    /// One full frame: update, report, resample
    pub fn process(&mut self, frame: &Image) -> Vec<(ObjectId, Estimate)> {
        self.update(frame);
        let estimates = self.estimates();
        self.resample();
        estimates
    }
}

use clap::Parser;
use serde::Serialize;

/// How the second half of the swarm is refilled after the weighted draw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResampleStrategy {
    /// Draw half the swarm by weight, fill the rest by shift-copying the drawn half
    Legacy,
    /// Draw the whole swarm by weight
    Weighted,
}

#[derive(Clone, Debug, Serialize)]
#[derive(clap::Parser)]
pub struct Config {
    #[clap(long, default_value = "0")]
    pub seed: u64,

    /// Particles per tracked object
    #[clap(long, default_value = "100")]
    pub particle_count: usize,

    /// Number of signature levels
    #[clap(long, default_value = "2")]
    pub depth: usize,

    /// Standard deviation of the position perturbation, in pixels
    #[clap(long, default_value = "20")]
    pub position_sigma: f64,

    /// Standard deviation of the scale perturbation
    #[clap(long, default_value = "0.1")]
    pub scale_sigma: f64,

    #[clap(long, default_value = "0.3")]
    pub min_scale: f64,

    #[clap(long, default_value = "3.0")]
    pub max_scale: f64,

    /// Candidates narrower or shorter than this are rejected
    #[clap(long, default_value = "8")]
    pub min_size: i32,

    /// Best weights below this are not reported as located
    #[clap(long, default_value = "0.4")]
    pub confidence_threshold: f64,

    /// Growth factor of the level weights
    #[clap(long, default_value = "4")]
    pub level_alpha: f64,

    #[clap(long, default_value = "3")]
    pub score_scale: f64,

    #[clap(long, default_value = "32")]
    pub hue_bins: usize,

    #[clap(long, default_value = "16")]
    pub saturation_bins: usize,

    #[clap(long, default_value = "32")]
    pub value_bins: usize,

    #[clap(long, value_enum, default_value = "legacy")]
    pub resample: ResampleStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from([env!("CARGO_PKG_NAME")])
    }
}

impl Config {
    pub fn bins(&self) -> [usize; 3] {
        [self.hue_bins, self.saturation_bins, self.value_bins]
    }
}

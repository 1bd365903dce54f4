pub mod config;
pub mod dataset;
pub mod frame;
pub mod histogram;
pub mod image;
pub mod my_types;
pub mod particle;
pub mod particle_filter;
pub mod region;
pub mod signature;
pub mod tracker;
#[cfg(feature = "video")]
pub mod video;
pub mod visualization;

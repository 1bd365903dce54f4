use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use serde::Serialize;

use indicatif::ProgressStyle;
use tracing::{info, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::LevelFilter;

use particle_tracker::config::*;
use particle_tracker::dataset::*;
use particle_tracker::frame::Frame;
use particle_tracker::my_types::*;
use particle_tracker::particle::Estimate;
use particle_tracker::tracker::Tracker;
use particle_tracker::visualization::*;

#[derive(Parser)]
pub struct Args {
    #[clap(short, default_value = "./data/sequence")]
    pub input_folder: String,
    /// Write estimates as JSON lines here instead of stdout
    #[clap(short, long)]
    pub output: Option<String>,
    /// Save annotated frames into this folder
    #[clap(long)]
    pub annotated_folder: Option<String>,
    /// Also draw every particle of located objects
    #[clap(long)]
    pub show_all: bool,
    /// Save a rerun recording of the annotated frames
    #[cfg(feature = "rerun")]
    #[clap(long)]
    pub recording: Option<String>,
    #[clap(short, long)]
    pub verbose: bool,
    #[clap(flatten)]
    pub config: Config,
}

#[derive(Serialize)]
struct EstimateRecord<'a> {
    time: f64,
    frame: usize,
    id: ObjectId,
    #[serde(flatten)]
    estimate: &'a Estimate,
    confident: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // setup logging, estimates go to stdout
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .with(level)
        .init();
    info!(config = %serde_json::to_string(&args.config)?, "starting");

    // load dataset
    let dataset_folder_path = Path::new(&args.input_folder);
    let mut dataset = Dataset::new(dataset_folder_path)?;

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    header_span.pb_set_length(dataset.length);
    let header_span_enter = header_span.enter();

    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {path}"))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    if let Some(folder) = &args.annotated_folder {
        std::fs::create_dir_all(folder).with_context(|| format!("cannot create {folder}"))?;
    }
    let renderer = Renderer::new(args.show_all)?;
    let annotate = args.annotated_folder.is_some();

    #[cfg(feature = "rerun")]
    let recorder = args
        .recording
        .as_ref()
        .map(|path| Recorder::new(Path::new(path)))
        .transpose()?;
    #[cfg(feature = "rerun")]
    let annotate = annotate || recorder.is_some();

    let threshold = args.config.confidence_threshold;
    let mut tracker = Tracker::new(args.config);
    let mut frame: Option<Frame> = None;
    let mut frame_number = 0;

    while let Some(input) = dataset.next()? {
        let current = Frame::new(&input.image, frame.take());

        // objects selected on a frame are tracked from that same frame on
        for region in &input.selections {
            if let Err(err) = tracker.select(region, &current.hsv) {
                warn!("ignoring selection: {err:#}");
            }
        }

        tracker.update(&current.hsv);
        let estimates = tracker.estimates();
        for (id, estimate) in &estimates {
            let record = EstimateRecord {
                time: input.time,
                frame: frame_number,
                id: *id,
                estimate,
                confident: estimate.is_confident(threshold),
            };
            serde_json::to_writer(&mut output, &record)?;
            writeln!(output)?;
        }

        if annotate {
            let annotated = renderer.draw(&current.image, &tracker, &estimates)?;
            if let Some(folder) = &args.annotated_folder {
                save_image(&annotated, &Path::new(folder).join(format!("{frame_number:06}.png")))?;
            }
            #[cfg(feature = "rerun")]
            if let Some(recorder) = &recorder {
                recorder.log_frame(frame_number, &annotated, &estimates, threshold)?;
            }
        }

        tracker.resample();

        header_span.pb_inc(1);
        frame = Some(current);
        frame_number += 1;
    }
    output.flush()?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    info!(frames = frame_number, objects = tracker.len(), "finished");
    Ok(())
}

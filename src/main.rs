// this_file: src/main.rs
//! Textsynth CLI - batch generation of labeled text images

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use textsynth::{
    logging, BackgroundPool, EffectToggles, FontLibrary, OutputMode, Renderer, WarpBackend,
    WordList,
};

/// Textsynth - labeled text-image generator for recognition training
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing .ttf/.otf font files
    #[arg(long)]
    fonts: PathBuf,

    /// Newline-separated word corpus file
    #[arg(long)]
    corpus: PathBuf,

    /// Optional directory of stock background images
    #[arg(long)]
    bg: Option<PathBuf>,

    /// Number of samples to generate
    #[arg(short, long, default_value_t = 100)]
    num: usize,

    /// Output directory
    #[arg(short, long, default_value = "./output")]
    out: PathBuf,

    /// Output image width
    #[arg(long, default_value_t = 256)]
    width: u32,

    /// Output image height
    #[arg(long, default_value_t = 32)]
    height: u32,

    /// Base seed; sample i uses stream seed + i
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Overlay tracked boxes instead of cropping
    #[arg(long)]
    debug_boxes: bool,

    /// Use the row-parallel warp backend
    #[arg(long)]
    parallel_warp: bool,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Enable the decorative line effect
    #[arg(long)]
    line: bool,

    /// Disable additive noise
    #[arg(long)]
    no_noise: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Enable quiet mode (only errors)
    #[arg(short, long, conflicts_with = "log_level")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.quiet);

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("configuring worker pool")?;
    }

    let fonts = FontLibrary::load_dir(&cli.fonts)
        .with_context(|| format!("loading fonts from {}", cli.fonts.display()))?;
    info!("Loaded {} fonts", fonts.len());

    let corpus = WordList::from_file(&cli.corpus)
        .with_context(|| format!("loading corpus from {}", cli.corpus.display()))?;

    let backgrounds = match &cli.bg {
        Some(dir) => BackgroundPool::load_dir(dir)
            .with_context(|| format!("loading backgrounds from {}", dir.display()))?,
        None => BackgroundPool::empty(),
    };

    let toggles = EffectToggles {
        line: cli.line,
        noise: !cli.no_noise,
        ..EffectToggles::default()
    };

    let renderer = Renderer::builder()
        .corpus(corpus)
        .fonts(fonts)
        .backgrounds(backgrounds)
        .toggles(toggles)
        .output_size(cli.width, cli.height)
        .mode(if cli.debug_boxes {
            OutputMode::Debug
        } else {
            OutputMode::Production
        })
        .warp_backend(if cli.parallel_warp {
            WarpBackend::Parallel
        } else {
            WarpBackend::Direct
        })
        .build()?;

    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("creating output directory {}", cli.out.display()))?;

    info!("Generating {} samples into {}", cli.num, cli.out.display());
    let t0 = std::time::Instant::now();

    // Each sample owns an independent random stream, so generation order
    // does not affect results.
    let labels: Vec<(usize, String)> = (0..cli.num)
        .into_par_iter()
        .filter_map(|index| {
            let mut rng = StdRng::seed_from_u64(cli.seed.wrapping_add(index as u64));
            match renderer.gen_img(&mut rng) {
                Ok((image, word)) => {
                    let path = cli.out.join(format!("{:08}.png", index));
                    if let Err(e) = image.save(&path) {
                        warn!("failed to save sample {}: {}", index, e);
                        return None;
                    }
                    Some((index, word))
                }
                Err(e) => {
                    warn!("skipping sample {}: {}", index, e);
                    None
                }
            }
        })
        .collect();

    let labels_path = cli.out.join("labels.txt");
    let mut file = std::fs::File::create(&labels_path)
        .with_context(|| format!("creating {}", labels_path.display()))?;
    let mut sorted = labels;
    sorted.sort_by_key(|(index, _)| *index);
    for (index, word) in &sorted {
        writeln!(file, "{:08}.png\t{}", index, word)?;
    }

    info!(
        "Generated {}/{} samples in {:.2}s",
        sorted.len(),
        cli.num,
        t0.elapsed().as_secs_f64()
    );
    Ok(())
}

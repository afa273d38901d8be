use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use gallery_curator::curation::{ScoredCandidate, Stage, TieredMatches};
use gallery_curator::decode::{self, AnalysisJob, AnalysisOutcome};
use gallery_curator::state::{
    ImageId, ImageRecord, Library, RatingBook, Sentiment, TagGroup, Tier, TierRound,
};
use gallery_curator::Config;

/// Curate an artist's gallery from client feedback
#[derive(Parser, Debug)]
#[command(name = "curator", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database to use instead of the configured one
    #[arg(long, global = true, env = "CURATOR_CATALOG")]
    catalog: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add every supported image under a folder to the catalog
    Import { folder: PathBuf },
    /// Extract visual tags for images that have not been analyzed yet
    Analyze {
        /// Re-analyze every image, not just new ones
        #[arg(long)]
        force: bool,
        #[arg(long, default_value_t = 10_000)]
        limit: usize,
    },
    /// List catalogued images with their flags and tags
    List,
    /// Show curation progress
    Status,
    /// Toggle eligibility flags on an image
    Flags {
        id: i64,
        #[arg(long)]
        scrape: Option<bool>,
        #[arg(long)]
        gallery: Option<bool>,
        #[arg(long)]
        sample: Option<bool>,
    },
    /// Attach descriptive tags to an image
    Tag {
        id: i64,
        #[arg(required = true)]
        tags: Vec<String>,
        /// Replace the image's existing manual tags
        #[arg(long)]
        replace: bool,
    },
    /// Rate a sample image: love, like or less
    Rate { id: i64, sentiment: Sentiment },
    /// Round 1: rank unrated gallery images into strong/medium/weak tiers
    Match,
    /// Round 2: surface a shuffled set of uncertain candidates
    Explore {
        /// Seed the shuffle for a reproducible set
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Rate a round-1 or round-2 candidate: 0 = less, 1 = maybe, 2 = yes
    Tier {
        round: TierRound,
        id: i64,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=2))]
        tier: u8,
    },
    /// Confirm the current stage and move on to the next round
    Confirm,
    /// Round 3: write the final gallery as JSON
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let default_level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let catalog_path = match &cli.catalog {
        Some(path) => path.clone(),
        None => config.catalog_path()?,
    };
    let mut library = Library::open(&catalog_path).context("Failed to open catalog")?;

    match cli.command {
        Command::Import { folder } => import_folder(&library, &folder),
        Command::Analyze { force, limit } => analyze(&library, &config, force, limit).await,
        Command::List => list(&library),
        Command::Status => status(&library),
        Command::Flags {
            id,
            scrape,
            gallery,
            sample,
        } => {
            let image = library.get_image(ImageId(id))?;
            let mut flags = image.eligibility;
            flags.scrape_eligible = scrape.unwrap_or(flags.scrape_eligible);
            flags.gallery_eligible = gallery.unwrap_or(flags.gallery_eligible);
            flags.sample_eligible = sample.unwrap_or(flags.sample_eligible);
            library.set_eligibility(image.id, flags)?;
            println!(
                "{}: scrape={} gallery={} sample={}",
                image.id, flags.scrape_eligible, flags.gallery_eligible, flags.sample_eligible
            );
            Ok(())
        }
        Command::Tag { id, tags, replace } => {
            let image = library.get_image(ImageId(id))?;
            let mut metadata = image.metadata;
            let tags = tags.iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
            if replace {
                metadata.set_group(TagGroup::Image, tags);
            } else {
                metadata.extend_group(TagGroup::Image, tags);
            }
            library.update_metadata(image.id, &metadata, false)?;
            println!("{}: {}", image.id, join(metadata.tags().iter()));
            Ok(())
        }
        Command::Rate { id, sentiment } => {
            let image = library.get_image(ImageId(id))?;
            if !image.eligibility.sample_eligible {
                bail!("image {} is not a sample; enable it with `flags {} --sample true`", id, id);
            }
            let mut ratings = library.load_ratings()?;
            ratings.rate_sample(image.id, sentiment);
            library.save_ratings(&ratings)?;
            println!("{} rated {}", image.name, sentiment);
            Ok(())
        }
        Command::Match => round_one(&library, &config),
        Command::Explore { seed } => explore(&mut library, &config, seed),
        Command::Tier { round, id, tier } => {
            let needed = match round {
                TierRound::Round1 => Stage::TieredMatch,
                TierRound::Round2 => Stage::Exploration,
            };
            library.load_stage()?.require(needed)?;
            let image = library.get_image(ImageId(id))?;
            let tier = Tier::try_from(tier).map_err(anyhow::Error::msg)?;

            let images = library.get_all_images()?;
            let mut ratings = library.load_ratings()?;
            config
                .pipeline()
                .rate_tier(&images, &mut ratings, round, image.id, tier)?;
            library.save_ratings(&ratings)?;
            println!("{} {} -> {}", round.as_str(), image.name, tier);
            Ok(())
        }
        Command::Confirm => {
            let stage = library.load_stage()?;
            let ratings = library.load_ratings()?;
            let next = config.pipeline().confirm(stage, &ratings)?;
            library.save_stage(next)?;
            info!("Stage {} -> {}", stage, next);
            println!("Now at stage: {}", next);
            Ok(())
        }
        Command::Export { output } => export(&library, &config, output.as_deref()),
    }
}

/// Walk `folder` recursively and catalog every supported image
fn import_folder(library: &Library, folder: &Path) -> Result<()> {
    if !folder.is_dir() {
        bail!("{} is not a directory", folder.display());
    }

    let mut imported_count = 0;
    let mut skipped_count = 0;
    info!("Scanning folder: {}", folder.display());

    for entry in WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !decode::is_supported(path) {
            continue;
        }

        let path_str = path.to_string_lossy().to_string();
        let filename = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        match library.import_image(&path_str, &filename) {
            Ok(Some(_)) => {
                imported_count += 1;
                if imported_count % 100 == 0 {
                    info!("Imported {} files...", imported_count);
                }
            }
            Ok(None) => skipped_count += 1,
            Err(e) => warn!("Error importing {}: {}", filename, e),
        }
    }

    info!("Import complete: {} new, {} skipped", imported_count, skipped_count);
    println!(
        "Added {} images, skipped {} duplicates. Catalog holds {} images.",
        imported_count,
        skipped_count,
        library.image_count()?
    );
    Ok(())
}

async fn analyze(library: &Library, config: &Config, force: bool, limit: usize) -> Result<()> {
    let images = if force {
        library.get_all_images()?
    } else {
        library.get_pending_analysis(limit)?
    };

    if images.is_empty() {
        println!("Nothing to analyze.");
        return Ok(());
    }

    let jobs = images
        .iter()
        .map(|img| AnalysisJob {
            id: img.id,
            path: PathBuf::from(&img.source),
        })
        .collect();
    let outcomes =
        decode::analyze_batch(jobs, config.analysis.max_dimension, config.analysis.workers).await;

    let mut outcomes: HashMap<ImageId, AnalysisOutcome> =
        outcomes.into_iter().map(|o| (o.id, o)).collect();

    let mut analyzed = 0;
    let mut failed = 0;
    let mut kept = 0;
    for image in images {
        let Some(outcome) = outcomes.remove(&image.id) else {
            warn!("No analysis result for image {}", image.id);
            continue;
        };
        if !outcome.succeeded() {
            failed += 1;
        }
        let mut metadata = image.metadata;
        if !outcome.merge_into(&mut metadata) {
            kept += 1;
        }
        library.update_metadata(image.id, &metadata, true)?;
        analyzed += 1;
    }

    println!(
        "Analyzed {} images ({} failed, {} of those kept earlier tags).",
        analyzed, failed, kept
    );
    Ok(())
}

fn list(library: &Library) -> Result<()> {
    let ratings = library.load_ratings()?;
    for image in library.get_all_images()? {
        let e = image.eligibility;
        let flags = format!(
            "{}{}{}",
            if e.scrape_eligible { 's' } else { '-' },
            if e.gallery_eligible { 'g' } else { '-' },
            if e.sample_eligible { 'S' } else { '-' },
        );
        let rating = ratings
            .sentiment(image.id)
            .map(|s| format!(" [{}]", s))
            .unwrap_or_default();
        let hue = image
            .metadata
            .dominant_hue()
            .map(|h| format!(" hue={}", h))
            .unwrap_or_default();
        println!(
            "{:>5} {} {}{}{}: {}",
            image.id,
            flags,
            image.name,
            rating,
            hue,
            join(image.metadata.tags().iter())
        );
    }
    Ok(())
}

fn status(library: &Library) -> Result<()> {
    let images = library.get_all_images()?;
    let ratings = library.load_ratings()?;
    let stage = library.load_stage()?;

    let samples = images.iter().filter(|i| i.eligibility.sample_eligible).count();
    let gallery = images.iter().filter(|i| i.eligibility.gallery_eligible).count();

    println!("Catalog:  {}", library.path().display());
    println!("Stage:    {}", stage);
    println!("Images:   {} ({} gallery, {} samples)", images.len(), gallery, samples);
    println!("Rated:    {} samples", ratings.samples().len());
    println!(
        "Tiered:   {} in round 1, {} in round 2",
        ratings.tiers(TierRound::Round1).len(),
        ratings.tiers(TierRound::Round2).len()
    );
    println!("Revision: {}", ratings.revision());
    Ok(())
}

fn round_one(library: &Library, config: &Config) -> Result<()> {
    library.load_stage()?.require(Stage::TieredMatch)?;
    let images = library.get_all_images()?;
    let ratings = library.load_ratings()?;

    let matches = config
        .pipeline()
        .tiered_match(&images, &ratings)
        .context("Round 1 failed; no tiers were produced")?;

    if matches.is_empty() {
        println!("No unrated gallery images to match.");
        return Ok(());
    }
    print_tiers(&matches, &ratings);
    Ok(())
}

fn print_tiers(matches: &TieredMatches, ratings: &RatingBook) {
    for (label, tier) in [
        ("Strong", &matches.strong),
        ("Medium", &matches.medium),
        ("Weak", &matches.weak),
    ] {
        println!("{} ({})", label, tier.len());
        for candidate in tier {
            print_candidate(candidate, ratings.tier(TierRound::Round1, candidate.image.id));
        }
    }
}

fn print_candidate(candidate: &ScoredCandidate, tier: Option<Tier>) {
    let tier = tier.map(|t| format!(" -> {}", t)).unwrap_or_default();
    println!(
        "  {:>5} {:>4}  {}{}",
        candidate.image.id, candidate.score, candidate.image.name, tier
    );
}

fn explore(library: &mut Library, config: &Config, seed: Option<u64>) -> Result<()> {
    library.load_stage()?.require(Stage::Exploration)?;
    let images = library.get_all_images()?;
    let mut ratings = library.load_ratings()?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let revision = ratings.revision();
    let set = config
        .pipeline()
        .surface(&images, &mut ratings, &mut rng)
        .context("Round 2 failed; nothing was surfaced")?;

    // Surfaced items start at "maybe" until the client toggles them
    if ratings.revision() != revision {
        library.save_ratings(&ratings)?;
    }

    println!("Explore ({})", set.items.len());
    for candidate in &set.items {
        print_candidate(candidate, set.tier(candidate.image.id));
    }
    Ok(())
}

fn export(library: &Library, config: &Config, output: Option<&Path>) -> Result<()> {
    let stage = library.load_stage()?;
    stage.require(Stage::Final)?;

    let images = library.get_all_images()?;
    let ratings = library.load_ratings()?;
    let selected: Vec<ImageRecord> = config.pipeline().final_selection(&images, &ratings);
    let json = serde_json::to_string_pretty(&selected)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} images to {}", selected.len(), path.display());
        }
        None => println!("{}", json),
    }

    if stage == Stage::Final {
        library.save_stage(Stage::Exported)?;
    }
    Ok(())
}

fn join<'a>(tags: impl Iterator<Item = &'a String>) -> String {
    tags.map(String::as_str).collect::<Vec<_>>().join(", ")
}

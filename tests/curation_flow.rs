use std::path::Path;

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

use gallery_curator::analysis::Features;
use gallery_curator::curation::{CurationError, CurationPipeline, ScoredCandidate, Stage};
use gallery_curator::decode::{analyze_batch, AnalysisJob};
use gallery_curator::state::{
    Eligibility, ImageId, ImageRecord, Library, RatingBook, Sentiment, TagGroup, Tier, TierRound,
};

const SAMPLE: Eligibility = Eligibility {
    scrape_eligible: true,
    gallery_eligible: false,
    sample_eligible: true,
};

fn tag_image(library: &Library, id: ImageId, tags: &[&str]) {
    let mut metadata = library.get_image(id).unwrap().metadata;
    metadata.set_group(TagGroup::Image, tags.iter().copied());
    library.update_metadata(id, &metadata, false).unwrap();
}

fn ids(records: &[ImageRecord]) -> Vec<i64> {
    records.iter().map(|r| r.id.0).collect()
}

async fn analyze_pending(library: &Library, force: bool) {
    let images = if force {
        library.get_all_images().unwrap()
    } else {
        library.get_pending_analysis(100).unwrap()
    };
    let jobs = images
        .iter()
        .map(|img| AnalysisJob {
            id: img.id,
            path: img.source.clone().into(),
        })
        .collect();
    let outcomes = analyze_batch(jobs, 64, 2).await;

    for (image, outcome) in images.into_iter().zip(outcomes) {
        assert_eq!(image.id, outcome.id);
        let mut metadata = image.metadata;
        outcome.merge_into(&mut metadata);
        library.update_metadata(image.id, &metadata, true).unwrap();
    }
}

fn scores(tier: &[ScoredCandidate]) -> Vec<(i64, i64)> {
    tier.iter().map(|c| (c.image.id.0, c.score)).collect()
}

fn write_png(dir: &Path, name: &str, color: [u8; 3]) -> String {
    let path = dir.join(name);
    RgbImage::from_pixel(24, 24, Rgb(color)).save(&path).unwrap();
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn analysis_results_persist_in_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("catalog.db");

    let red = write_png(dir.path(), "IMG_0001.png", [220, 20, 20]);
    let white = write_png(dir.path(), "IMG_0002.png", [245, 245, 245]);
    let missing = dir.path().join("IMG_0003.png").to_string_lossy().to_string();

    {
        let library = Library::open(&db).unwrap();
        let red_id = library.import_image(&red, "IMG_0001.png").unwrap().unwrap();
        library.import_image(&white, "IMG_0002.png").unwrap().unwrap();
        library.import_image(&missing, "IMG_0003.png").unwrap().unwrap();
        assert_eq!(library.import_image(&red, "IMG_0001.png").unwrap(), None);

        tag_image(&library, red_id, &["client pick"]);
        analyze_pending(&library, false).await;
    }

    let library = Library::open(&db).unwrap();
    assert!(library.get_pending_analysis(100).unwrap().is_empty());

    let images = library.get_all_images().unwrap();
    assert_eq!(images.len(), 3);

    let red = &images[0].metadata;
    assert!(red.tags().contains("warm tones"));
    assert!(red.tags().contains("client pick"));
    assert_eq!(red.dominant_hue(), Some(0));

    assert!(images[1].metadata.tags().contains("high-key"));

    // Undecodable files fall back to no visual tags
    assert!(images[2].metadata.tags().is_empty());
    assert_eq!(images[2].metadata.dominant_hue(), None);

    // Re-analysis replaces visual tags but keeps manual ones
    analyze_pending(&library, true).await;
    let red = library.get_image(images[0].id).unwrap().metadata;
    assert!(red.tags().contains("client pick"));
    assert_eq!(red.group(TagGroup::Palette), images[0].metadata.group(TagGroup::Palette));
}

#[tokio::test]
async fn failed_reanalysis_keeps_visual_tags() {
    let dir = tempfile::tempdir().unwrap();
    let library = Library::open(&dir.path().join("catalog.db")).unwrap();

    let blue = write_png(dir.path(), "blue_sea.png", [20, 60, 200]);
    let id = library.import_image(&blue, "blue_sea.png").unwrap().unwrap();
    analyze_pending(&library, false).await;

    let before = library.get_image(id).unwrap().metadata;
    assert!(before.tags().contains("cool tones"));
    assert_eq!(before.dominant_hue(), Some(228));

    std::fs::remove_file(&blue).unwrap();
    analyze_pending(&library, true).await;

    let after = library.get_image(id).unwrap().metadata;
    assert_eq!(after, before);
    assert!(after.tags().contains("sea"));
    assert!(library.get_pending_analysis(10).unwrap().is_empty());
}

#[test]
fn curation_session_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("catalog.db");
    let pipeline = CurationPipeline::default();

    let mut library = Library::open(&db).unwrap();
    let tags: [&[&str]; 7] = [
        &["portrait", "studio", "film"],
        &["crowd"],
        &["portrait", "studio", "film"],
        &["portrait"],
        &["studio", "crowd"],
        &["landscape"],
        &["film", "portrait"],
    ];
    for (n, tags) in tags.iter().enumerate() {
        let name = format!("IMG_{:04}.jpg", n + 1);
        let id = library
            .import_image(&format!("/photos/{}", name), &name)
            .unwrap()
            .unwrap();
        tag_image(&library, id, tags);
    }
    library.set_eligibility(ImageId(1), SAMPLE).unwrap();
    library.set_eligibility(ImageId(2), SAMPLE).unwrap();

    // Sampling
    let stage = library.load_stage().unwrap();
    assert_eq!(stage, Stage::Sampling);
    assert!(matches!(
        stage.require(Stage::TieredMatch),
        Err(CurationError::StageNotReached { .. })
    ));
    assert!(pipeline.confirm(stage, &RatingBook::new()).is_err());

    let mut ratings = library.load_ratings().unwrap();
    ratings.rate_sample(ImageId(1), Sentiment::Love);
    ratings.rate_sample(ImageId(2), Sentiment::Less);
    library.save_ratings(&ratings).unwrap();
    library.save_stage(pipeline.confirm(stage, &ratings).unwrap()).unwrap();

    // Round 1
    let images = library.get_all_images().unwrap();
    let ratings = library.load_ratings().unwrap();
    let matches = pipeline.tiered_match(&images, &ratings).unwrap();

    assert_eq!(scores(&matches.strong), vec![(3, 9), (7, 6)]);
    assert_eq!(scores(&matches.medium), vec![(4, 3)]);
    assert_eq!(scores(&matches.weak), vec![(6, 0), (5, -2)]);
    assert!(!matches.is_stale(&ratings));

    let mut changed = ratings.clone();
    changed.rate_sample(ImageId(2), Sentiment::Like);
    assert!(matches.is_stale(&changed));

    // Samples never appear in a round, so they cannot be tiered there
    let mut ratings = ratings;
    assert_eq!(
        pipeline.rate_tier(&images, &mut ratings, TierRound::Round1, ImageId(1), Tier::Yes),
        Err(CurationError::NotCandidate {
            id: ImageId(1),
            round: TierRound::Round1
        })
    );
    pipeline
        .rate_tier(&images, &mut ratings, TierRound::Round1, ImageId(7), Tier::Yes)
        .unwrap();
    library.save_ratings(&ratings).unwrap();
    let stage = library.load_stage().unwrap();
    library.save_stage(pipeline.confirm(stage, &ratings).unwrap()).unwrap();

    // Round 2: only image 4 is veto-free, unrated and inside the window
    let mut ratings = library.load_ratings().unwrap();
    assert!(pipeline
        .rate_tier(&images, &mut ratings, TierRound::Round2, ImageId(4), Tier::Yes)
        .is_err());
    let set = pipeline
        .surface(&images, &mut ratings, &mut StdRng::seed_from_u64(42))
        .unwrap();
    let surfaced: Vec<ImageId> = set.items.iter().map(|c| c.image.id).collect();
    assert_eq!(surfaced, vec![ImageId(4)]);
    assert_eq!(set.tier(ImageId(4)), Some(Tier::Maybe));
    assert!(!set.is_stale(&ratings));
    assert!(pipeline
        .rate_tier(&images, &mut ratings, TierRound::Round2, ImageId(6), Tier::Yes)
        .is_err());

    pipeline
        .rate_tier(&images, &mut ratings, TierRound::Round2, ImageId(4), Tier::Yes)
        .unwrap();
    library.save_ratings(&ratings).unwrap();
    let stage = library.load_stage().unwrap();
    library.save_stage(pipeline.confirm(stage, &ratings).unwrap()).unwrap();

    // Round 3
    assert_eq!(library.load_stage().unwrap(), Stage::Final);
    let ratings = library.load_ratings().unwrap();
    let selected = pipeline.final_selection(&images, &ratings);
    assert_eq!(ids(&selected), vec![1, 4, 7]);

    let json = serde_json::to_string(&selected).unwrap();
    let exported: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(exported[0]["id"], 1);
    assert_eq!(exported[0]["name"], "IMG_0001.jpg");
    assert_eq!(exported[0]["sampleEligible"], true);

    let exported_stage = pipeline.confirm(Stage::Final, &ratings).unwrap();
    assert_eq!(exported_stage, Stage::Exported);
    library.save_stage(exported_stage).unwrap();
    assert!(matches!(
        pipeline.confirm(Stage::Exported, &ratings),
        Err(CurationError::Transition { .. })
    ));

    // Everything survives a reopen
    let revision = ratings.revision();
    drop(library);
    let library = Library::open(&db).unwrap();
    assert_eq!(library.load_stage().unwrap(), Stage::Exported);
    let reloaded = library.load_ratings().unwrap();
    assert_eq!(reloaded.revision(), revision);
    assert_eq!(reloaded.sentiment(ImageId(1)), Some(Sentiment::Love));
    assert_eq!(reloaded.tier(TierRound::Round2, ImageId(4)), Some(Tier::Yes));
}

#[test]
fn empty_features_clear_visual_groups_only() {
    let mut record = ImageRecord::new(ImageId(1), "sunset_beach.jpg", "/photos/sunset_beach.jpg");
    record.metadata.extend_group(TagGroup::Image, ["golden hour"]);
    record.metadata.apply_features(&Features::empty());

    let tags: Vec<&str> = record.metadata.tags().iter().map(String::as_str).collect();
    assert_eq!(tags, vec!["beach", "golden hour", "sunset"]);
}

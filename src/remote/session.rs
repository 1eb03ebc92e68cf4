//! Blocking drivers for one remote generation, meant to run inside a worker job.

use crate::config::PollingConfig;
use crate::geometry::{ImageBounds, Rect};
use crate::pixels::{
    encode_image, merge_tiles, process_variant, resize_to, split_image, AlphaSource,
    EncodeFormat, RgbaImage, TileLayout, VariantJob,
};
use crate::worker::JobContext;

use super::{
    rank_by_score, Clock, GenerationKind, GenerationPayload, GenerationRequest,
    GenerationTracker, ImageId, ImageRecord, ImageStatus, NotificationHub, PixelSource,
    RemoteError, RemoteGenerator, RemoteResult, Settlement, StagingHandle, TrackerTimeouts,
};

/// Progress reported back to the owning tool while a generation runs.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMessage {
    UploadProgress(f32),
    /// The request was accepted; the tool moves on to processing.
    Submitted { images: usize },
    Progress(f32),
}

/// How each returned variant is fitted into the selection.
#[derive(Debug, Clone)]
pub struct VariantProcessing {
    pub region: Rect,
    pub image: ImageBounds,
    pub feather: bool,
    pub feather_width: Option<u32>,
    pub alpha: AlphaSource,
    pub spread: u32,
    pub color_reference: Option<RgbaImage>,
}

impl VariantProcessing {
    fn job(&self, pixels: RgbaImage) -> VariantJob {
        VariantJob {
            pixels,
            region: self.region,
            image: self.image,
            feather_width: self.feather_width,
            feather: self.feather,
            alpha: self.alpha.clone(),
            spread: self.spread,
            color_reference: self.color_reference.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub kind: GenerationKind,
    pub payload: GenerationPayload,
    pub parent: Option<ImageId>,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub denoising_strength: f32,
    pub model: String,
    pub processing: VariantProcessing,
}

#[derive(Debug, Clone)]
pub struct RankedVariant {
    pub record: ImageRecord,
    pub pixels: RgbaImage,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Best first.
    pub variants: Vec<RankedVariant>,
    pub timed_out: bool,
    /// Requested images that never completed or could not be loaded.
    pub dropped: usize,
}

/// Collaborators a generation talks to.
pub struct Services<'a> {
    pub generator: &'a dyn RemoteGenerator,
    pub pixels: &'a dyn PixelSource,
    pub notifications: Option<&'a NotificationHub>,
    pub clock: &'a dyn Clock,
    pub polling: &'a PollingConfig,
}

fn ensure_running<M>(context: &JobContext<M>) -> RemoteResult<()> {
    if context.is_cancelled() {
        return Err(RemoteError::Cancelled);
    }
    Ok(())
}

fn stage(
    generator: &dyn RemoteGenerator,
    what: &'static str,
    bytes: &[u8],
    format: EncodeFormat,
    progress: &mut dyn FnMut(f32),
) -> RemoteResult<StagingHandle> {
    generator
        .upload_staging(bytes, format, progress)
        .map_err(|err| match err {
            RemoteError::Staging { .. } => err,
            other => RemoteError::Staging {
                what,
                message: other.to_string(),
            },
        })
}

/// Uploads, submits, then waits for the variants through push updates with a periodic
/// fallback poll. Completed variants are loaded, fitted and ranked by score.
pub fn run_generation(
    services: &Services<'_>,
    plan: GenerationPlan,
    context: &JobContext<GenerationMessage>,
) -> RemoteResult<GenerationOutcome> {
    let GenerationPlan {
        kind,
        payload,
        parent,
        prompt,
        negative_prompt,
        width,
        height,
        count,
        denoising_strength,
        model,
        processing,
    } = plan;

    context.send(GenerationMessage::UploadProgress(0.0));
    let has_mask = payload.mask.is_some();
    let image_share = if has_mask { 0.5 } else { 1.0 };
    let image = stage(
        services.generator,
        "image",
        &payload.image,
        payload.image_format,
        &mut |fraction| context.send(GenerationMessage::UploadProgress(fraction * image_share)),
    )?;
    ensure_running(context)?;
    let mask = match &payload.mask {
        Some(mask) => {
            let handle = stage(services.generator, "mask", mask, EncodeFormat::Png, &mut |fraction| {
                context.send(GenerationMessage::UploadProgress(0.5 + fraction * 0.5))
            })?;
            ensure_running(context)?;
            Some(handle)
        }
        None => None,
    };

    let request = GenerationRequest {
        kind,
        image,
        mask,
        parent,
        prompt,
        negative_prompt,
        width,
        height,
        count,
        denoising_strength,
        model,
    };
    let subscription = services.notifications.map(NotificationHub::subscribe);
    let images = services
        .generator
        .submit_generation(&request)
        .map_err(|err| match err {
            RemoteError::Submission(_) => err,
            other => RemoteError::Submission(other.to_string()),
        })?;
    if images.is_empty() {
        return Err(RemoteError::NoImages);
    }
    tracing::info!(?kind, images = images.len(), "generation submitted");
    context.send(GenerationMessage::Submitted { images: images.len() });
    ensure_running(context)?;

    let mut tracker = GenerationTracker::new(
        images,
        services.clock.now(),
        TrackerTimeouts::from_config(services.polling),
    );
    let mut reported = tracker.progress();
    context.send(GenerationMessage::Progress(reported));

    let settlement = loop {
        let now = services.clock.now();
        if let Some(subscription) = &subscription {
            for update in subscription.drain() {
                tracker.apply(&update, now);
            }
        }
        if tracker.fallback_poll_due(now) {
            for id in tracker.pending_ids() {
                match services.generator.poll_status(&id) {
                    Ok(record) => {
                        tracker.apply(&record, now);
                    }
                    Err(err) => tracing::warn!(?err, %id, "fallback status poll failed"),
                }
            }
            tracker.mark_polled(now);
        }
        if tracker.progress() != reported {
            reported = tracker.progress();
            context.send(GenerationMessage::Progress(reported));
        }

        match tracker.settlement(now) {
            Settlement::Running => {}
            settled => break settled,
        }
        ensure_running(context)?;
        services.clock.sleep(services.polling.tick());
    };

    let timed_out = settlement == Settlement::TimedOut;
    if timed_out {
        tracing::warn!(
            pending = tracker.pending_ids().len(),
            "generation timed out; keeping completed variants"
        );
    }

    let requested = tracker.images().len();
    let mut variants = Vec::new();
    for record in tracker.completed() {
        ensure_running(context)?;
        let pixels = match services.pixels.load_pixels(&record.id) {
            Ok(pixels) => pixels,
            Err(err) => {
                tracing::warn!(?err, id = %record.id, "skipping variant that failed to load");
                continue;
            }
        };
        match process_variant(processing.job(pixels)) {
            Ok(pixels) => variants.push(RankedVariant {
                record: record.clone(),
                pixels,
            }),
            Err(err) => tracing::warn!(?err, id = %record.id, "skipping variant that failed to process"),
        }
    }

    if variants.is_empty() {
        return Err(if timed_out {
            RemoteError::TimedOut
        } else {
            RemoteError::NoImages
        });
    }
    rank_by_score(&mut variants, |variant| &variant.record);
    let dropped = requested - variants.len();
    tracing::info!(variants = variants.len(), dropped, timed_out, "generation finished");
    Ok(GenerationOutcome {
        variants,
        timed_out,
        dropped,
    })
}

#[derive(Debug, Clone)]
pub struct AugmentPlan {
    pub kind: GenerationKind,
    pub image: RgbaImage,
    pub parent: Option<ImageId>,
    pub prompt: String,
    pub negative_prompt: String,
    /// Output size relative to the input.
    pub scale: u32,
    /// Tiles larger images when set.
    pub tiling: Option<TileLayout>,
    pub seam_feather: u32,
}

#[derive(Debug, Clone)]
pub struct AugmentOutcome {
    pub pixels: RgbaImage,
    pub tiles: usize,
}

/// Runs an upscale or face restore, tile by tile when the image is larger than one tile.
pub fn run_augmentation(
    services: &Services<'_>,
    plan: AugmentPlan,
    context: &JobContext<GenerationMessage>,
) -> RemoteResult<AugmentOutcome> {
    let scale = plan.scale.max(1);
    let grid = plan.tiling.and_then(|layout| split_image(&plan.image, layout));
    let Some(mut grid) = grid else {
        let pixels = augment_single(services, &plan, &plan.image, context)?;
        context.send(GenerationMessage::Progress(1.0));
        return Ok(AugmentOutcome { pixels, tiles: 1 });
    };

    let total = grid.tiles.len();
    tracing::info!(tiles = total, ?plan.kind, "augmenting image in tiles");
    for (index, tile) in grid.tiles.iter_mut().enumerate() {
        tile.pixels = augment_single(services, &plan, &tile.pixels, context)?;
        context.send(GenerationMessage::Progress((index + 1) as f32 / total as f32));
    }
    let pixels = merge_tiles(&grid, scale, Some(plan.seam_feather))?;
    Ok(AugmentOutcome {
        pixels,
        tiles: total,
    })
}

fn augment_single(
    services: &Services<'_>,
    plan: &AugmentPlan,
    image: &RgbaImage,
    context: &JobContext<GenerationMessage>,
) -> RemoteResult<RgbaImage> {
    let encoded = encode_image(image, EncodeFormat::Png)?;
    let staged = stage(services.generator, "image", &encoded, EncodeFormat::Png, &mut |fraction| {
        context.send(GenerationMessage::UploadProgress(fraction))
    })?;
    ensure_running(context)?;

    let request = GenerationRequest {
        kind: plan.kind,
        image: staged,
        mask: None,
        parent: plan.parent.clone(),
        prompt: plan.prompt.clone(),
        negative_prompt: plan.negative_prompt.clone(),
        width: image.width(),
        height: image.height(),
        count: 1,
        denoising_strength: 0.05,
        model: String::new(),
    };
    let mut record = services
        .generator
        .submit_generation(&request)?
        .into_iter()
        .next()
        .ok_or(RemoteError::NoImages)?;
    context.send(GenerationMessage::Submitted { images: 1 });

    let started = services.clock.now();
    let interval = services.polling.augment_poll();
    while record.status != ImageStatus::Completed {
        if record.status == ImageStatus::Error {
            return Err(RemoteError::GenerationFailed("augmentation failed".to_string()));
        }
        ensure_running(context)?;
        if services.clock.now().saturating_duration_since(started) >= services.polling.absolute_timeout() {
            return Err(RemoteError::TimedOut);
        }
        services.clock.sleep(interval);
        record = services.generator.poll_status(&record.id)?;
    }

    let pixels = services.pixels.load_pixels(&record.id)?;
    let (width, height) = (image.width() * plan.scale.max(1), image.height() * plan.scale.max(1));
    Ok(resize_to(&pixels, width, height))
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::pixels::Rgba;

    /// Generator whose images complete on scripted poll counts.
    #[derive(Debug, Default)]
    pub struct ScriptedGenerator {
        pub records: Vec<ImageRecord>,
        /// Poll count after which an image reports its final status; absent ids stay
        /// processing forever.
        pub finish_after: HashMap<ImageId, (u32, ImageStatus)>,
        pub fail_upload: bool,
        /// Published to this hub from inside `submit_generation`.
        pub push_on_submit: Option<(NotificationHub, Vec<ImageRecord>)>,
        pub polls: Mutex<HashMap<ImageId, u32>>,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl RemoteGenerator for ScriptedGenerator {
        fn upload_staging(
            &self,
            bytes: &[u8],
            _format: EncodeFormat,
            progress: &mut dyn FnMut(f32),
        ) -> RemoteResult<StagingHandle> {
            if self.fail_upload {
                return Err(RemoteError::Staging {
                    what: "image",
                    message: "connection reset".to_string(),
                });
            }
            progress(0.5);
            progress(1.0);
            Ok(StagingHandle(format!("staged-{}", bytes.len())))
        }

        fn submit_generation(&self, request: &GenerationRequest) -> RemoteResult<Vec<ImageRecord>> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            if let Some((hub, updates)) = &self.push_on_submit {
                for update in updates {
                    hub.publish(update.clone());
                }
            }
            Ok(self.records.clone())
        }

        fn poll_status(&self, id: &ImageId) -> RemoteResult<ImageRecord> {
            let mut polls = self.polls.lock().expect("polls lock");
            let count = polls.entry(id.clone()).or_insert(0);
            *count += 1;
            let base = self
                .records
                .iter()
                .find(|record| &record.id == id)
                .cloned()
                .ok_or_else(|| RemoteError::Status(format!("unknown image {id}")))?;
            let status = match self.finish_after.get(id) {
                Some((after, status)) if *count >= *after => *status,
                _ => ImageStatus::Processing,
            };
            Ok(ImageRecord { status, ..base })
        }
    }

    /// Serves a solid image per id, sized on request.
    #[derive(Debug, Default)]
    pub struct SolidPixels {
        pub size: (u32, u32),
        pub colors: HashMap<ImageId, Rgba<u8>>,
    }

    impl PixelSource for SolidPixels {
        fn load_pixels(&self, id: &ImageId) -> RemoteResult<RgbaImage> {
            let color = self.colors.get(id).copied().ok_or_else(|| RemoteError::PixelLoad {
                id: id.clone(),
                message: "not found".to_string(),
            })?;
            Ok(RgbaImage::from_pixel(self.size.0, self.size.1, color))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::fakes::{ScriptedGenerator, SolidPixels};
    use super::*;
    use crate::pixels::Rgba;
    use crate::remote::ManualClock;

    fn record(id: &str, score: f64) -> ImageRecord {
        ImageRecord {
            score,
            prompt: "a lake".to_string(),
            ..ImageRecord::new(ImageId::new(id), ImageStatus::Pending)
        }
    }

    fn plan(mask: bool) -> GenerationPlan {
        GenerationPlan {
            kind: GenerationKind::Inpaint,
            payload: GenerationPayload {
                image: vec![1, 2, 3],
                image_format: EncodeFormat::Jpeg,
                mask: mask.then(|| vec![4, 5]),
            },
            parent: None,
            prompt: "a lake".to_string(),
            negative_prompt: String::new(),
            width: 64,
            height: 64,
            count: 2,
            denoising_strength: 1.0,
            model: "inpainting".to_string(),
            processing: VariantProcessing {
                region: Rect::new(0, 0, 64, 64),
                image: ImageBounds::new(64, 64),
                feather: false,
                feather_width: None,
                alpha: AlphaSource::None,
                spread: 0,
                color_reference: None,
            },
        }
    }

    fn pixels_for(ids: &[(&str, u8)]) -> SolidPixels {
        SolidPixels {
            size: (32, 32),
            colors: ids
                .iter()
                .map(|(id, shade)| (ImageId::new(*id), Rgba([*shade, *shade, *shade, 255])))
                .collect(),
        }
    }

    fn run(
        generator: &ScriptedGenerator,
        pixels: &SolidPixels,
        hub: Option<&NotificationHub>,
        plan: GenerationPlan,
    ) -> (RemoteResult<GenerationOutcome>, Vec<GenerationMessage>) {
        let clock = ManualClock::new();
        let polling = PollingConfig::default();
        let services = Services {
            generator,
            pixels,
            notifications: hub,
            clock: &clock,
            polling: &polling,
        };
        let (context, messages) = JobContext::detached();
        let result = run_generation(&services, plan, &context);
        (result, messages.try_iter().collect())
    }

    #[test]
    fn fallback_polls_collect_completed_variants_by_score() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.3), record("b", 0.8)],
            finish_after: HashMap::from([
                (ImageId::new("a"), (1, ImageStatus::Completed)),
                (ImageId::new("b"), (2, ImageStatus::Completed)),
            ]),
            ..ScriptedGenerator::default()
        };
        let pixels = pixels_for(&[("a", 10), ("b", 20)]);

        let (result, messages) = run(&generator, &pixels, None, plan(false));
        let outcome = result.expect("generation should succeed");

        let order: Vec<&str> = outcome
            .variants
            .iter()
            .map(|variant| variant.record.id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "a"]);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.variants[0].pixels.dimensions(), (64, 64));
        assert!(messages.contains(&GenerationMessage::Submitted { images: 2 }));
        assert_eq!(messages.last(), Some(&GenerationMessage::Progress(1.0)));
    }

    #[test]
    fn push_updates_settle_before_any_fallback_poll() {
        let hub = NotificationHub::new();
        let completed = ImageRecord {
            status: ImageStatus::Completed,
            ..record("a", 0.5)
        };
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.5)],
            push_on_submit: Some((hub.clone(), vec![completed])),
            ..ScriptedGenerator::default()
        };
        let pixels = pixels_for(&[("a", 10)]);

        let (result, _) = run(&generator, &pixels, Some(&hub), plan(false));
        let outcome = result.expect("pushed completion should settle the generation");

        assert_eq!(outcome.variants.len(), 1);
        assert!(generator.polls.lock().expect("polls lock").is_empty());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn upload_failure_is_reported_as_staging_error() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.5)],
            fail_upload: true,
            ..ScriptedGenerator::default()
        };
        let pixels = pixels_for(&[]);

        let (result, _) = run(&generator, &pixels, None, plan(true));

        assert!(matches!(result, Err(RemoteError::Staging { what: "image", .. })));
        assert!(generator.requests.lock().expect("requests lock").is_empty());
    }

    #[test]
    fn mask_upload_takes_second_half_of_progress() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.5)],
            finish_after: HashMap::from([(ImageId::new("a"), (1, ImageStatus::Completed))]),
            ..ScriptedGenerator::default()
        };
        let pixels = pixels_for(&[("a", 1)]);

        let (result, messages) = run(&generator, &pixels, None, plan(true));
        result.expect("generation should succeed");

        let uploads: Vec<f32> = messages
            .iter()
            .filter_map(|message| match message {
                GenerationMessage::UploadProgress(fraction) => Some(*fraction),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let requests = generator.requests.lock().expect("requests lock");
        assert!(requests[0].mask.is_some());
    }

    #[test]
    fn all_errors_report_no_images() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.5)],
            finish_after: HashMap::from([(ImageId::new("a"), (1, ImageStatus::Error))]),
            ..ScriptedGenerator::default()
        };
        let pixels = pixels_for(&[]);

        let (result, _) = run(&generator, &pixels, None, plan(false));

        assert!(matches!(result, Err(RemoteError::NoImages)));
    }

    #[test]
    fn nothing_completed_before_timeout_is_a_failure() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.5)],
            ..ScriptedGenerator::default()
        };
        let pixels = pixels_for(&[("a", 1)]);

        let (result, _) = run(&generator, &pixels, None, plan(false));

        assert!(matches!(result, Err(RemoteError::TimedOut)));
    }

    fn augment_plan(image: RgbaImage, tiling: Option<TileLayout>) -> AugmentPlan {
        AugmentPlan {
            kind: GenerationKind::Upscale,
            image,
            parent: Some(ImageId::new("parent")),
            prompt: String::new(),
            negative_prompt: String::new(),
            scale: 2,
            tiling,
            seam_feather: 8,
        }
    }

    fn augment(generator: &ScriptedGenerator, plan: AugmentPlan) -> RemoteResult<AugmentOutcome> {
        let pixels = SolidPixels {
            size: (16, 16),
            colors: HashMap::from([(ImageId::new("a"), Rgba([90, 90, 90, 255]))]),
        };
        let clock = ManualClock::new();
        let polling = PollingConfig::default();
        let services = Services {
            generator,
            pixels: &pixels,
            notifications: None,
            clock: &clock,
            polling: &polling,
        };
        let (context, _messages) = JobContext::detached();
        run_augmentation(&services, plan, &context)
    }

    #[test]
    fn small_image_is_augmented_in_one_request() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.0)],
            finish_after: HashMap::from([(ImageId::new("a"), (1, ImageStatus::Completed))]),
            ..ScriptedGenerator::default()
        };

        let outcome = augment(&generator, augment_plan(RgbaImage::new(8, 8), Some(TileLayout::default())))
            .expect("augmentation should succeed");

        assert_eq!(outcome.tiles, 1);
        assert_eq!(outcome.pixels.dimensions(), (16, 16));
        let requests = generator.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].count, 1);
        assert_eq!(requests[0].parent, Some(ImageId::new("parent")));
    }

    #[test]
    fn large_image_is_augmented_per_tile_and_merged() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.0)],
            finish_after: HashMap::from([(ImageId::new("a"), (1, ImageStatus::Completed))]),
            ..ScriptedGenerator::default()
        };

        let outcome = augment(
            &generator,
            augment_plan(RgbaImage::new(600, 300), Some(TileLayout::new(256, 32))),
        )
        .expect("tiled augmentation should succeed");

        assert_eq!(outcome.tiles, 6);
        assert_eq!(outcome.pixels.dimensions(), (1200, 600));
        assert_eq!(generator.requests.lock().expect("requests lock").len(), 6);
    }

    #[test]
    fn augmentation_error_status_fails() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.0)],
            finish_after: HashMap::from([(ImageId::new("a"), (1, ImageStatus::Error))]),
            ..ScriptedGenerator::default()
        };

        let result = augment(&generator, augment_plan(RgbaImage::new(8, 8), None));

        assert!(matches!(result, Err(RemoteError::GenerationFailed(_))));
    }

    #[test]
    fn augmentation_that_never_finishes_times_out() {
        let generator = ScriptedGenerator {
            records: vec![record("a", 0.0)],
            ..ScriptedGenerator::default()
        };

        let result = augment(&generator, augment_plan(RgbaImage::new(8, 8), None));

        assert!(matches!(result, Err(RemoteError::TimedOut)));
    }
}

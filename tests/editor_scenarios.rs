use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use brushcanvas::config::{EditorConfig, PollingConfig};
use brushcanvas::editor::{
    PointerEvent, RemoteServices, ToolCommand, ToolController, ToolEnvironment, ToolKind,
};
use brushcanvas::geometry::{CanvasPoint, ImageBounds, Rect};
use brushcanvas::pixels::{AlphaSource, EncodeFormat, Rgba, RgbaImage};
use brushcanvas::remote::{
    run_generation, GenerationKind, GenerationPayload, GenerationPlan, GenerationRequest, ImageId,
    ImageRecord, ImageStatus, ManualClock, NotificationHub, PixelSource, RemoteGenerator,
    RemoteError, RemoteResult, Services, StagingHandle, VariantProcessing,
};
use brushcanvas::render::{LayerKind, Renderer};
use brushcanvas::viewport::CanvasGeometry;
use brushcanvas::worker::{JobContext, JobExecutor};
use serde_json::json;

const BASE: Rgba<u8> = Rgba([40, 80, 120, 255]);
const EDIT: Rgba<u8> = Rgba([200, 10, 10, 255]);

/// Images listed in `completes` report completed on their first status poll; the rest
/// stay processing forever. `pushed` ids are also announced through the hub on submit.
struct StallingGenerator {
    records: Vec<ImageRecord>,
    completes: Vec<ImageId>,
    pushed: Option<(NotificationHub, Vec<ImageId>)>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl StallingGenerator {
    fn new(records: Vec<ImageRecord>, completes: &[&str]) -> Self {
        Self {
            records,
            completes: completes.iter().map(|id| ImageId::new(*id)).collect(),
            pushed: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_push(mut self, hub: NotificationHub, ids: &[&str]) -> Self {
        self.pushed = Some((hub, ids.iter().map(|id| ImageId::new(*id)).collect()));
        self
    }

    fn record(&self, id: &ImageId) -> RemoteResult<ImageRecord> {
        self.records
            .iter()
            .find(|record| &record.id == id)
            .cloned()
            .ok_or_else(|| RemoteError::Status(format!("unknown image {id}")))
    }
}

impl RemoteGenerator for StallingGenerator {
    fn upload_staging(
        &self,
        bytes: &[u8],
        _format: EncodeFormat,
        progress: &mut dyn FnMut(f32),
    ) -> RemoteResult<StagingHandle> {
        progress(1.0);
        Ok(StagingHandle(format!("staged-{}", bytes.len())))
    }

    fn submit_generation(&self, request: &GenerationRequest) -> RemoteResult<Vec<ImageRecord>> {
        self.requests
            .lock()
            .expect("requests lock should not be poisoned")
            .push(request.clone());
        if let Some((hub, ids)) = &self.pushed {
            for id in ids {
                let record = self.record(id)?;
                hub.publish(ImageRecord {
                    status: ImageStatus::Completed,
                    ..record
                });
            }
        }
        Ok(self.records.clone())
    }

    fn poll_status(&self, id: &ImageId) -> RemoteResult<ImageRecord> {
        let record = self.record(id)?;
        let status = if self.completes.contains(id) {
            ImageStatus::Completed
        } else {
            ImageStatus::Processing
        };
        Ok(ImageRecord { status, ..record })
    }
}

struct SolidSource {
    size: (u32, u32),
    colors: HashMap<ImageId, Rgba<u8>>,
}

impl PixelSource for SolidSource {
    fn load_pixels(&self, id: &ImageId) -> RemoteResult<RgbaImage> {
        let color = self.colors.get(id).copied().ok_or_else(|| RemoteError::PixelLoad {
            id: id.clone(),
            message: "not found".to_string(),
        })?;
        Ok(RgbaImage::from_pixel(self.size.0, self.size.1, color))
    }
}

fn processing(id: &str, score: f64) -> ImageRecord {
    ImageRecord {
        score,
        prompt: "a lighthouse".to_string(),
        ..ImageRecord::new(ImageId::new(id), ImageStatus::Processing)
    }
}

fn four_variants() -> Vec<ImageRecord> {
    vec![
        processing("a", 0.2),
        processing("b", 0.9),
        processing("c", 0.8),
        processing("d", 0.5),
    ]
}

fn solid_source(size: (u32, u32)) -> SolidSource {
    let colors = [
        ("a", Rgba([10, 10, 10, 255])),
        ("b", Rgba([20, 20, 20, 255])),
        ("c", Rgba([30, 30, 30, 255])),
        ("d", Rgba([40, 40, 40, 255])),
    ];
    SolidSource {
        size,
        colors: colors
            .into_iter()
            .map(|(id, color)| (ImageId::new(id), color))
            .collect(),
    }
}

fn renderer_with(width: u32, height: u32) -> Renderer {
    let mut renderer = Renderer::new(
        CanvasGeometry::new(256, 256),
        EditorConfig::default().renderer_settings(),
    );
    renderer.set_base_image(RgbaImage::from_pixel(width, height, BASE));
    renderer
}

fn base(renderer: &Renderer) -> RgbaImage {
    renderer
        .image_data(None, LayerKind::Base)
        .expect("base layer should be readable")
}

#[test]
fn committed_selection_changes_only_the_selected_region_and_undoes() {
    let mut renderer = renderer_with(512, 512);
    renderer.set_selection_overlay(Some(Rect::new(128, 128, 256, 256)));

    renderer
        .set_edit_image(Some(&RgbaImage::from_pixel(256, 256, EDIT)))
        .expect("edit image should fit the selection");
    renderer.commit_selection();

    let committed = base(&renderer);
    assert_eq!(*committed.get_pixel(128, 128), EDIT);
    assert_eq!(*committed.get_pixel(383, 383), EDIT);
    assert_eq!(*committed.get_pixel(127, 200), BASE);
    assert_eq!(*committed.get_pixel(384, 200), BASE);
    assert_eq!(*committed.get_pixel(10, 10), BASE);

    assert!(renderer.undo());
    assert!(base(&renderer).pixels().all(|pixel| *pixel == BASE));
    assert!(renderer.can_redo());
}

#[test]
fn timed_out_generation_keeps_completed_variants_best_first() {
    let generator = StallingGenerator::new(four_variants(), &["a", "b"]);
    let pixels = solid_source((64, 64));
    let clock = ManualClock::new();
    let polling = PollingConfig::default();
    let services = Services {
        generator: &generator,
        pixels: &pixels,
        notifications: None,
        clock: &clock,
        polling: &polling,
    };
    let image = RgbaImage::from_pixel(64, 64, BASE);
    let plan = GenerationPlan {
        kind: GenerationKind::Inpaint,
        payload: GenerationPayload {
            image: brushcanvas::pixels::encode_image(&image, EncodeFormat::Jpeg)
                .expect("jpeg should encode"),
            image_format: EncodeFormat::Jpeg,
            mask: None,
        },
        parent: None,
        prompt: "a lighthouse".to_string(),
        negative_prompt: String::new(),
        width: 64,
        height: 64,
        count: 4,
        denoising_strength: 0.75,
        model: "stable_diffusion_inpainting".to_string(),
        processing: VariantProcessing {
            region: Rect::new(0, 0, 64, 64),
            image: ImageBounds::new(64, 64),
            feather: false,
            feather_width: None,
            alpha: AlphaSource::None,
            spread: 0,
            color_reference: None,
        },
    };
    let (context, _messages) = JobContext::detached();

    let outcome = run_generation(&services, plan, &context).expect("partial results should resolve");

    assert!(outcome.timed_out);
    assert_eq!(outcome.dropped, 2);
    let ids: Vec<&str> = outcome
        .variants
        .iter()
        .map(|variant| variant.record.id.as_str())
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert!(clock.elapsed() >= polling.idle_timeout());
    assert!(clock.elapsed() < polling.absolute_timeout());
}

#[test]
fn outpaint_expansion_offsets_content_and_leaves_a_transparent_strip() {
    let mut renderer = renderer_with(512, 512);
    renderer.set_selection_overlay(Some(Rect::new(-64, 0, 512, 512)));

    renderer
        .expand_to_overlay()
        .expect("expansion should succeed with a selection");

    assert!(renderer.width() >= 576);
    assert_eq!(renderer.height(), 512);
    let expanded = base(&renderer);
    for y in [0, 255, 511] {
        for x in [0, 31, 63] {
            assert_eq!(expanded.get_pixel(x, y)[3], 0, "strip pixel ({x},{y}) should be clear");
        }
        assert_eq!(*expanded.get_pixel(64, y), BASE);
        assert_eq!(*expanded.get_pixel(575, y), BASE);
    }
    assert_eq!(renderer.selection(), Some(Rect::new(0, 0, 512, 512)));
    assert!(renderer.can_undo());
}

#[test]
fn controller_runs_an_inpaint_session_with_pushed_and_polled_results() {
    let hub = NotificationHub::new();
    let generator = Arc::new(
        StallingGenerator::new(four_variants(), &["a"]).with_push(hub.clone(), &["c"]),
    );
    let remote = RemoteServices::new(generator.clone(), Arc::new(solid_source((512, 512))))
        .with_notifications(hub)
        .with_clock(Arc::new(ManualClock::new()))
        .with_executor(JobExecutor::Inline);
    let env = ToolEnvironment::new(EditorConfig::default()).with_remote(remote);
    let mut controller = ToolController::new(renderer_with(512, 512), env);

    assert!(controller.select_tool(ToolKind::Inpaint, &mut || true));
    assert_eq!(controller.tool().state_name(), "erase");
    let point = controller
        .renderer()
        .viewport()
        .to_screen(CanvasPoint::new(256.0, 256.0));
    controller.pointer_down(PointerEvent::primary(point.x, point.y));
    controller.pointer_up(PointerEvent::primary(point.x, point.y));
    controller
        .update_args(&json!({ "prompt": "a lighthouse" }))
        .expect("prompt should update");
    controller
        .command(ToolCommand::BeginPrompt)
        .expect("prompt step should begin");
    controller
        .command(ToolCommand::Submit)
        .expect("submit should start");

    assert!(controller.poll());
    assert_eq!(controller.tool().state_name(), "confirm");
    let requests = generator
        .requests
        .lock()
        .expect("requests lock should not be poisoned");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "a lighthouse");
    assert_eq!((requests[0].width, requests[0].height), (512, 512));
    drop(requests);

    controller.confirm().expect("confirm should commit the best variant");

    assert_eq!(*base(controller.renderer()).get_pixel(256, 256), Rgba([30, 30, 30, 255]));
    assert_eq!(*base(controller.renderer()).get_pixel(10, 10), BASE);
    assert!(controller.undo());
    assert_eq!(*base(controller.renderer()).get_pixel(256, 256), BASE);
}

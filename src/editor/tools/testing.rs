//! Fixtures shared by the tool tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::EditorConfig;
use crate::editor::{RemoteServices, ToolEnvironment};
use crate::pixels::{Rgba, RgbaImage};
use crate::remote::fakes::{ScriptedGenerator, SolidPixels};
use crate::remote::{ImageId, ImageRecord, ImageStatus, ManualClock};
use crate::render::Renderer;
use crate::viewport::CanvasGeometry;
use crate::worker::JobExecutor;

pub const BASE_COLOR: Rgba<u8> = Rgba([40, 80, 120, 255]);

pub fn renderer(width: u32, height: u32) -> Renderer {
    let config = EditorConfig::default();
    let mut renderer = Renderer::new(CanvasGeometry::new(512, 512), config.renderer_settings());
    renderer.set_base_image(RgbaImage::from_pixel(width, height, BASE_COLOR));
    renderer
}

pub fn environment() -> ToolEnvironment {
    ToolEnvironment::new(EditorConfig::default())
}

pub fn completed(id: &str, score: f64) -> ImageRecord {
    ImageRecord {
        score,
        ..ImageRecord::new(ImageId::new(id), ImageStatus::Pending)
    }
}

/// Remote services whose images all complete on the first fallback poll. Each id is
/// served as a solid image of the given colour.
pub fn remote(records: &[(ImageRecord, Rgba<u8>)], size: (u32, u32)) -> (RemoteServices, Arc<ScriptedGenerator>) {
    let generator = Arc::new(ScriptedGenerator {
        records: records.iter().map(|(record, _)| record.clone()).collect(),
        finish_after: records
            .iter()
            .map(|(record, _)| (record.id.clone(), (1, ImageStatus::Completed)))
            .collect(),
        ..ScriptedGenerator::default()
    });
    let pixels = SolidPixels {
        size,
        colors: records
            .iter()
            .map(|(record, color)| (record.id.clone(), *color))
            .collect::<HashMap<_, _>>(),
    };
    let services = RemoteServices::new(generator.clone(), Arc::new(pixels))
        .with_clock(Arc::new(ManualClock::new()))
        .with_executor(JobExecutor::Inline);
    (services, generator)
}

/// Remote services whose every upload fails.
pub fn failing_remote() -> RemoteServices {
    let generator = ScriptedGenerator {
        fail_upload: true,
        ..ScriptedGenerator::default()
    };
    RemoteServices::new(Arc::new(generator), Arc::new(SolidPixels::default()))
        .with_clock(Arc::new(ManualClock::new()))
        .with_executor(JobExecutor::Inline)
}

/// Records every value a listener receives.
pub fn recorder<T: 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(T) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    (seen, move |value| sink.borrow_mut().push(value))
}

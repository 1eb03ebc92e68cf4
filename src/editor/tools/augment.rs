use std::sync::Arc;

use serde_json::Value;

use super::{GenerationUpdate, PendingGeneration, Tool, ToolCommand, ToolCore, ToolListeners};
use crate::config::EditorConfig;
use crate::editor::{
    ImageContext, PointerEvent, RemoteServices, ToolEnvironment, ToolError, ToolResult, WheelEvent,
};
use crate::pixels::{decode_image, fix_image_size, EncodeFormat};
use crate::remote::{AugmentOutcome, AugmentPlan, GenerationKind};
use crate::render::{LayerKind, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentState {
    Default,
    Busy,
    /// The base image was replaced; revert or save.
    Done,
}

impl AugmentState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Busy => "busy",
            Self::Done => "done",
        }
    }
}

/// Whole-image upscale and face restore. The image before the first operation is kept
/// encoded so a chain of operations can be reverted in one step.
pub struct AugmentTool {
    core: ToolCore,
    config: Arc<EditorConfig>,
    remote: Option<RemoteServices>,
    image: ImageContext,
    state: AugmentState,
    resume: AugmentState,
    backup: Option<Vec<u8>>,
    pending: Option<PendingGeneration<AugmentOutcome>>,
}

impl AugmentTool {
    pub const NAME: &'static str = "augment";

    pub fn new(env: &ToolEnvironment) -> Self {
        Self {
            core: ToolCore::new(Self::NAME, env.args.clone()),
            config: Arc::clone(&env.config),
            remote: env.remote.clone(),
            image: env.image.clone(),
            state: AugmentState::Default,
            resume: AugmentState::Default,
            backup: None,
            pending: None,
        }
    }

    pub const fn state(&self) -> AugmentState {
        self.state
    }

    fn set_state(&mut self, state: AugmentState) {
        self.state = state;
        self.core.report_state(state.name());
    }

    fn start(&mut self, renderer: &mut Renderer, kind: GenerationKind) -> ToolResult<()> {
        if self.state == AugmentState::Busy {
            return Err(ToolError::Busy { tool: Self::NAME });
        }
        let remote = self.remote.clone().ok_or(ToolError::RemoteUnavailable)?;
        self.core.report_error(None);
        if self.backup.is_none() {
            self.backup = Some(renderer.encoded_image(None, EncodeFormat::Png)?);
        }

        let image = renderer.image_data(None, LayerKind::Base)?;
        let upscale = &self.config.upscale;
        let plan = match kind {
            GenerationKind::Upscale => AugmentPlan {
                kind,
                image: fix_image_size(&image, upscale.size_multiple),
                parent: self.image.id.clone(),
                prompt: self.image.prompt.clone(),
                negative_prompt: self.image.negative_prompt.clone(),
                scale: upscale.scale,
                tiling: Some(upscale.tile_layout()),
                seam_feather: upscale.seam_feather,
            },
            _ => AugmentPlan {
                kind,
                image,
                parent: self.image.id.clone(),
                prompt: self.image.prompt.clone(),
                negative_prompt: self.image.negative_prompt.clone(),
                scale: 1,
                tiling: None,
                seam_feather: 0,
            },
        };
        tracing::info!(
            ?kind,
            width = plan.image.width(),
            height = plan.image.height(),
            "starting augmentation"
        );

        self.resume = self.state;
        self.set_state(AugmentState::Busy);
        let job = remote.spawn_augmentation(plan, self.config.polling.clone());
        self.pending = Some(PendingGeneration::new(job));
        Ok(())
    }

    fn revert(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        let Some(backup) = self.backup.take() else {
            return Ok(());
        };
        let original = decode_image(&backup)?;
        renderer.replace_base_image(original, false);
        self.core.set_dirty(false);
        self.set_state(AugmentState::Default);
        Ok(())
    }
}

impl Tool for AugmentTool {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn is_dirty(&self) -> bool {
        self.core.is_dirty()
    }

    fn is_busy(&self) -> bool {
        self.state == AugmentState::Busy
    }

    fn on_pointer_down(&mut self, _renderer: &mut Renderer, event: PointerEvent) {
        self.core.pan_start(event);
    }

    fn on_pointer_move(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if !self.core.pan_move(renderer, event) {
            ToolCore::show_crosshairs(renderer, event.position);
        }
    }

    fn on_pointer_up(&mut self, _renderer: &mut Renderer, _event: PointerEvent) {
        self.core.pan_end();
    }

    fn on_pointer_leave(&mut self, renderer: &mut Renderer) {
        self.core.pan_end();
        renderer.set_cursor(None);
    }

    fn on_wheel(&mut self, renderer: &mut Renderer, event: WheelEvent) {
        ToolCore::zoom(renderer, event);
    }

    fn get_args(&self) -> Value {
        Value::Object(Default::default())
    }

    fn update_args(&mut self, _renderer: &mut Renderer, _patch: &Value) -> ToolResult<()> {
        Ok(())
    }

    fn command(&mut self, renderer: &mut Renderer, command: ToolCommand) -> ToolResult<()> {
        match command {
            ToolCommand::Upscale => self.start(renderer, GenerationKind::Upscale),
            ToolCommand::FaceRestore => self.start(renderer, GenerationKind::FaceRestore),
            ToolCommand::Revert => self.revert(renderer),
            ToolCommand::Save => self.confirm(renderer),
            command => Err(ToolError::Unsupported {
                tool: Self::NAME,
                command,
            }),
        }
    }

    fn confirm(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        if self.state != AugmentState::Done {
            return Err(ToolError::NothingToConfirm { tool: Self::NAME });
        }
        let saved = ToolCore::save_png(renderer)?;
        self.core.emit_save(saved);
        self.backup = None;
        self.core.set_dirty(false);
        self.set_state(AugmentState::Default);
        Ok(())
    }

    fn cancel(&mut self, renderer: &mut Renderer) {
        match self.state {
            AugmentState::Busy => {
                if let Some(pending) = self.pending.take() {
                    pending.cancel();
                }
                self.set_state(self.resume);
            }
            AugmentState::Done => {
                if let Err(err) = self.revert(renderer) {
                    tracing::warn!(?err, "failed to restore image before augmentation");
                }
            }
            AugmentState::Default => {}
        }
    }

    fn poll(&mut self, renderer: &mut Renderer) -> bool {
        let Some(pending) = self.pending.as_ref() else {
            return false;
        };
        let updates = pending.poll();
        let changed = !updates.is_empty();
        for update in updates {
            match update {
                GenerationUpdate::UploadProgress(fraction) | GenerationUpdate::Progress(fraction) => {
                    self.core.report_progress(fraction);
                }
                GenerationUpdate::Submitted => {}
                GenerationUpdate::Finished(Ok(outcome)) => {
                    self.pending = None;
                    tracing::info!(
                        tiles = outcome.tiles,
                        width = outcome.pixels.width(),
                        height = outcome.pixels.height(),
                        "augmentation finished"
                    );
                    renderer.replace_base_image(outcome.pixels, false);
                    self.core.report_progress(1.0);
                    self.core.set_dirty(true);
                    self.set_state(AugmentState::Done);
                }
                GenerationUpdate::Finished(Err(err)) => {
                    self.pending = None;
                    tracing::warn!(?err, "augmentation failed");
                    self.core.report_error(Some(err.to_string()));
                    self.set_state(self.resume);
                }
            }
        }
        changed
    }

    fn destroy(&mut self, _renderer: &mut Renderer, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.core.is_dirty() && !confirm_discard() {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        true
    }

    fn listeners_mut(&mut self) -> &mut ToolListeners {
        self.core.listeners_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::tools::testing::{
        completed, environment, failing_remote, recorder, remote, renderer, BASE_COLOR,
    };
    use crate::pixels::Rgba;

    const SHARP: Rgba<u8> = Rgba([90, 140, 30, 255]);

    fn tool(renderer_size: u32) -> (AugmentTool, Renderer) {
        let (services, _) = remote(&[(completed("up", 0.5), SHARP)], (renderer_size, renderer_size));
        (AugmentTool::new(&environment().with_remote(services)), renderer(renderer_size, renderer_size))
    }

    fn base_pixel(renderer: &Renderer, x: u32, y: u32) -> Rgba<u8> {
        *renderer
            .image_data(None, LayerKind::Base)
            .expect("base should be readable")
            .get_pixel(x, y)
    }

    #[test]
    fn upscale_doubles_the_image_as_an_undoable_step() {
        let (mut tool, mut renderer) = tool(64);

        tool.command(&mut renderer, ToolCommand::Upscale)
            .expect("upscale should start");
        assert!(tool.is_busy());
        assert!(tool.poll(&mut renderer));

        assert_eq!(tool.state(), AugmentState::Done);
        assert_eq!((renderer.width(), renderer.height()), (128, 128));
        assert_eq!(base_pixel(&renderer, 100, 100), SHARP);
        assert!(renderer.can_undo());
        assert!(tool.is_dirty());
    }

    #[test]
    fn face_restore_keeps_the_size() {
        let (mut tool, mut renderer) = tool(64);

        tool.command(&mut renderer, ToolCommand::FaceRestore)
            .expect("face restore should start");
        tool.poll(&mut renderer);

        assert_eq!((renderer.width(), renderer.height()), (64, 64));
        assert_eq!(base_pixel(&renderer, 10, 10), SHARP);
    }

    #[test]
    fn revert_restores_the_backup_after_chained_operations() {
        let (mut tool, mut renderer) = tool(64);
        tool.command(&mut renderer, ToolCommand::FaceRestore)
            .expect("face restore should start");
        tool.poll(&mut renderer);
        tool.command(&mut renderer, ToolCommand::Upscale)
            .expect("upscale should start");
        tool.poll(&mut renderer);

        tool.command(&mut renderer, ToolCommand::Revert)
            .expect("revert should succeed");

        assert_eq!(tool.state(), AugmentState::Default);
        assert_eq!((renderer.width(), renderer.height()), (64, 64));
        assert_eq!(base_pixel(&renderer, 10, 10), BASE_COLOR);
        assert!(!tool.is_dirty());
    }

    #[test]
    fn save_emits_and_clears_the_backup() {
        let (mut tool, mut renderer) = tool(64);
        let (saved, on_save) = recorder();
        tool.listeners_mut().on_save(on_save);
        assert!(matches!(
            tool.confirm(&mut renderer),
            Err(ToolError::NothingToConfirm { .. })
        ));

        tool.command(&mut renderer, ToolCommand::FaceRestore)
            .expect("face restore should start");
        tool.poll(&mut renderer);
        tool.command(&mut renderer, ToolCommand::Save)
            .expect("save should succeed");

        assert_eq!(saved.borrow().len(), 1);
        tool.command(&mut renderer, ToolCommand::Revert)
            .expect("revert without backup is a no-op");
        assert_eq!(base_pixel(&renderer, 10, 10), SHARP);
    }

    #[test]
    fn failure_reports_and_returns_to_the_previous_state() {
        let mut renderer = renderer(64, 64);
        let mut tool = AugmentTool::new(&environment().with_remote(failing_remote()));
        let (errors, on_error) = recorder();
        tool.listeners_mut().on_error(on_error);

        tool.command(&mut renderer, ToolCommand::Upscale)
            .expect("upscale should start");
        tool.poll(&mut renderer);

        assert_eq!(tool.state(), AugmentState::Default);
        assert_eq!((renderer.width(), renderer.height()), (64, 64));
        assert!(matches!(errors.borrow().last(), Some(Some(_))));
    }
}

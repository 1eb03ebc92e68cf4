use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    GenerationUpdate, PencilTool, PendingGeneration, SavedImage, SelectionHandler, Tool,
    ToolCommand, ToolCore, ToolListeners, VariantDirection, VariantSet,
};
use crate::config::EditorConfig;
use crate::editor::{
    ImageContext, PointerButton, PointerEvent, RemoteServices, ToolEnvironment, ToolError,
    ToolResult, WheelEvent,
};
use crate::geometry::{round_up_to_multiple, CanvasPoint, Rect};
use crate::pixels::{soft_erase, AlphaSource, EncodeFormat, RgbaImage};
use crate::remote::{
    GenerationKind, GenerationOutcome, GenerationPayload, GenerationPlan, VariantProcessing,
};
use crate::render::{Cursor, LayerKind, MaskSource, RenderError, Renderer};
use crate::state::{EnhanceEffect, EnhanceEvent, EnhanceMachine, EnhanceState, StateError};

const ENHANCE_MODEL: &str = "stable_diffusion";
/// Eraser radius as a fraction of the selection's short side, before the width modifier.
const ERASER_DIVISOR: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceArgs {
    pub prompt: String,
    pub negative_prompt: String,
    pub count: u32,
    pub variation_strength: f32,
}

/// Regenerates a region with low denoising, optionally limited to a painted mask. The
/// chosen variant can be partly erased to let the original show through before saving.
pub struct EnhanceTool {
    core: ToolCore,
    config: Arc<EditorConfig>,
    remote: Option<RemoteServices>,
    image: ImageContext,
    machine: EnhanceMachine,
    selection: SelectionHandler,
    mask_painter: PencilTool,
    args: EnhanceArgs,
    variants: VariantSet,
    pending: Option<PendingGeneration<GenerationOutcome>>,
    /// Selected variant with the erasures made so far.
    erased: Option<RgbaImage>,
    erasing: bool,
    pointer: Option<CanvasPoint>,
}

impl EnhanceTool {
    pub const NAME: &'static str = "enhance";

    pub fn new(env: &ToolEnvironment, renderer: &mut Renderer) -> Self {
        let config = Arc::clone(&env.config);
        let core = ToolCore::new(Self::NAME, env.args.clone());
        let args = core.load_args(EnhanceArgs {
            prompt: String::new(),
            negative_prompt: String::new(),
            count: config.enhance.count,
            variation_strength: config.enhance.variation_strength,
        });

        let size = config.selection.default_size;
        let select_supported = renderer.width() > size || renderer.height() > size;
        let mut selection = SelectionHandler::new(config.enhance.grid_step, size, size);
        if select_supported {
            selection.reset(renderer, size);
        } else {
            renderer.set_selection_overlay(Some(Rect::from_bounds(renderer.bounds())));
        }

        let mut tool = Self {
            core,
            config,
            remote: env.remote.clone(),
            image: env.image.clone(),
            machine: EnhanceMachine::for_enhance(select_supported),
            selection,
            mask_painter: PencilTool::for_mask(env),
            args,
            variants: VariantSet::default(),
            pending: None,
            erased: None,
            erasing: false,
            pointer: None,
        };
        tool.core.report_state(tool.state_name());
        tool
    }

    pub fn state(&self) -> EnhanceState {
        self.machine.state()
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    fn transition(&mut self, renderer: &mut Renderer, event: EnhanceEvent) -> ToolResult<()> {
        let effects = self.machine.transition(event)?;
        for effect in effects {
            self.apply(renderer, effect)?;
        }
        self.core.report_state(self.state_name());
        Ok(())
    }

    fn apply(&mut self, renderer: &mut Renderer, effect: EnhanceEffect) -> ToolResult<()> {
        match effect {
            EnhanceEffect::FinishSelection => self.selection.finish(renderer),
            EnhanceEffect::ClearCursor => {
                self.erasing = false;
                renderer.set_cursor(None);
            }
            EnhanceEffect::ResetSelection => {
                self.selection.set_outpaint(false);
                self.selection.reset(renderer, self.config.selection.default_size);
            }
            EnhanceEffect::ShowSelectionControls(show) => {
                self.core.listeners_mut().notify_selection_controls(show);
            }
            EnhanceEffect::CreateMask => {
                renderer.create_mask();
                self.core.listeners_mut().notify_mask_change(true);
            }
            EnhanceEffect::DeleteMask => {
                if renderer.is_masked() {
                    renderer.delete_mask();
                    self.core.listeners_mut().notify_mask_change(false);
                }
            }
            EnhanceEffect::ClearVariants => {
                renderer.set_edit_image(None)?;
                self.variants.clear();
                self.erased = None;
                self.core.set_dirty(false);
            }
            EnhanceEffect::StopGeneration => {
                if let Some(pending) = self.pending.take() {
                    pending.cancel();
                }
            }
            EnhanceEffect::ShowFirstVariant => {
                self.show_selected(renderer)?;
                self.core.set_dirty(true);
            }
            EnhanceEffect::ShowSelectedVariant => {
                self.erased = None;
                self.show_selected(renderer)?;
            }
            EnhanceEffect::CommitVariant => {
                renderer.commit_selection();
                let saved = ToolCore::save_png(renderer)?;
                self.core.emit_save(SavedImage {
                    prompt: Some(self.prompt()),
                    negative_prompt: Some(self.negative_prompt()),
                    model: Some(self.model()),
                    ..saved
                });
                self.variants.clear();
                self.erased = None;
                self.core.set_dirty(false);
            }
        }
        Ok(())
    }

    fn show_selected(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        let pixels = self.variants.selected().map(|variant| &variant.pixels);
        renderer.set_edit_image(pixels)?;
        Ok(())
    }

    fn prompt(&self) -> String {
        if self.args.prompt.is_empty() {
            self.image.prompt.clone()
        } else {
            self.args.prompt.clone()
        }
    }

    fn negative_prompt(&self) -> String {
        if self.args.negative_prompt.is_empty() {
            self.image.negative_prompt.clone()
        } else {
            self.args.negative_prompt.clone()
        }
    }

    fn model(&self) -> String {
        if self.image.model.is_empty() {
            ENHANCE_MODEL.to_string()
        } else {
            self.image.model.clone()
        }
    }

    fn eraser_radius(&self, selection: Rect) -> f64 {
        let short_side = f64::from(selection.width.min(selection.height));
        (short_side / ERASER_DIVISOR * self.config.enhance.eraser_width_modifier).floor()
    }

    /// Softly erases the shown variant around `point`, revealing the original beneath.
    fn erase(&mut self, renderer: &mut Renderer, point: CanvasPoint) -> ToolResult<()> {
        let selection = renderer.selection().ok_or(RenderError::NoSelection)?;
        if self.erased.is_none() {
            self.erased = self.variants.selected().map(|variant| variant.pixels.clone());
        }
        let radius = self.eraser_radius(selection);
        let modifier = self.config.enhance.eraser_width_modifier;
        let Some(erased) = self.erased.as_mut() else {
            return Ok(());
        };
        let local = CanvasPoint::new(
            point.x - f64::from(selection.x),
            point.y - f64::from(selection.y),
        );
        soft_erase(erased, local, radius, modifier);
        renderer.set_edit_image(Some(&*erased))?;
        self.core.set_dirty(true);
        Ok(())
    }

    fn sync_cursor(&self, renderer: &mut Renderer) {
        let cursor = self.pointer.and_then(|point| match self.machine.state() {
            EnhanceState::Select | EnhanceState::Mask => None,
            _ => Some(Cursor::crosshairs(point)),
        });
        renderer.set_cursor(cursor);
    }

    fn submit(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        let state = self.machine.state();
        if state.is_busy() {
            return Err(ToolError::Busy { tool: Self::NAME });
        }
        if state == EnhanceState::Mask {
            self.transition(renderer, EnhanceEvent::FinishMask)?;
        }
        if !self.machine.can_transition(EnhanceEvent::Submit) {
            return Err(StateError::InvalidEnhanceTransition {
                from: self.machine.state(),
                event: EnhanceEvent::Submit,
            }
            .into());
        }
        let remote = self.remote.clone().ok_or(ToolError::RemoteUnavailable)?;
        self.core.report_error(None);

        let region = renderer.selection().ok_or(RenderError::NoSelection)?;
        let image = renderer.encoded_image(Some(region), EncodeFormat::Jpeg)?;
        let (mask, alpha) = if renderer.is_masked() {
            (
                Some(renderer.encoded_mask(Some(region), MaskSource::MaskLayer)?),
                AlphaSource::Painted(renderer.image_data(Some(region), LayerKind::Mask)?),
            )
        } else {
            (None, AlphaSource::None)
        };

        let color_reference = if self.config.enhance.color_balance {
            Some(renderer.image_data(Some(region), LayerKind::Base)?)
        } else {
            None
        };

        let multiple = self.config.enhance.size_multiple;
        let plan = GenerationPlan {
            kind: GenerationKind::Enhance,
            payload: GenerationPayload {
                image,
                image_format: EncodeFormat::Jpeg,
                mask,
            },
            parent: self.image.id.clone(),
            prompt: self.prompt(),
            negative_prompt: self.negative_prompt(),
            width: round_up_to_multiple(region.width, multiple),
            height: round_up_to_multiple(region.height, multiple),
            count: self.args.count,
            denoising_strength: self.args.variation_strength,
            model: self.model(),
            processing: VariantProcessing {
                region,
                image: renderer.bounds(),
                feather: true,
                feather_width: self.config.enhance.feather_width,
                alpha,
                spread: self.config.enhance.mask_spread,
                color_reference,
            },
        };
        tracing::info!(
            ?region,
            count = plan.count,
            masked = plan.payload.mask.is_some(),
            "submitting enhance request"
        );

        self.transition(renderer, EnhanceEvent::Submit)?;
        let job = remote.spawn_generation(plan, self.config.polling.clone());
        self.pending = Some(PendingGeneration::new(job));
        Ok(())
    }

    fn mask_command(&mut self, renderer: &mut Renderer, command: ToolCommand) -> ToolResult<()> {
        if !renderer.is_masked() {
            return Err(RenderError::NoMask.into());
        }
        match command {
            ToolCommand::InvertMask => renderer.invert_mask(),
            _ => renderer.reset_mask(),
        }
        self.core.listeners_mut().notify_mask_change(true);
        Ok(())
    }
}

impl Tool for EnhanceTool {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn state_name(&self) -> &'static str {
        match self.machine.state() {
            EnhanceState::Select => "select",
            EnhanceState::Default => "default",
            EnhanceState::Mask => "mask",
            EnhanceState::Erase => "erase",
            EnhanceState::Uploading => "uploading",
            EnhanceState::Processing => "processing",
            EnhanceState::Confirm => "confirm",
        }
    }

    fn is_dirty(&self) -> bool {
        self.core.is_dirty()
    }

    fn is_busy(&self) -> bool {
        self.machine.state().is_busy()
    }

    fn on_pointer_down(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        match self.machine.state() {
            EnhanceState::Mask => self.mask_painter.on_pointer_down(renderer, event),
            state => {
                if self.core.pan_start(event) || event.button != PointerButton::Primary {
                    return;
                }
                let point = ToolCore::to_canvas(renderer, event.position);
                if state == EnhanceState::Select {
                    self.selection.pointer_down(renderer, point);
                } else if state == EnhanceState::Erase {
                    self.erasing = true;
                    if let Err(err) = self.erase(renderer, point) {
                        tracing::warn!(?err, "enhance erase failed");
                    }
                }
            }
        }
    }

    fn on_pointer_move(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.machine.state() == EnhanceState::Mask {
            self.mask_painter.on_pointer_move(renderer, event);
            return;
        }
        if self.core.pan_move(renderer, event) {
            return;
        }
        let point = ToolCore::to_canvas(renderer, event.position);
        self.pointer = Some(point);
        match self.machine.state() {
            EnhanceState::Select => self.selection.pointer_move(renderer, point),
            EnhanceState::Erase if self.erasing => {
                if let Err(err) = self.erase(renderer, point) {
                    tracing::warn!(?err, "enhance erase failed");
                }
            }
            _ => {}
        }
        self.sync_cursor(renderer);
    }

    fn on_pointer_up(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.machine.state() == EnhanceState::Mask {
            self.mask_painter.on_pointer_up(renderer, event);
            return;
        }
        if self.core.pan_end() {
            return;
        }
        self.erasing = false;
        if self.machine.state() == EnhanceState::Select {
            self.selection.pointer_up(renderer);
        }
    }

    fn on_pointer_leave(&mut self, renderer: &mut Renderer) {
        if self.machine.state() == EnhanceState::Mask {
            self.mask_painter.on_pointer_leave(renderer);
            return;
        }
        self.core.pan_end();
        self.erasing = false;
        self.pointer = None;
        if self.machine.state() == EnhanceState::Select {
            self.selection.finish(renderer);
        }
        renderer.set_cursor(None);
    }

    fn on_wheel(&mut self, renderer: &mut Renderer, event: WheelEvent) {
        ToolCore::zoom(renderer, event);
        self.sync_cursor(renderer);
    }

    fn get_args(&self) -> Value {
        self.core.args_value(&self.args)
    }

    fn update_args(&mut self, _renderer: &mut Renderer, patch: &Value) -> ToolResult<()> {
        self.args = self.core.update_args(&self.args, patch)?;
        Ok(())
    }

    fn select(&mut self, renderer: &mut Renderer, direction: VariantDirection) {
        if self.machine.state() != EnhanceState::Confirm {
            return;
        }
        self.variants.step(direction);
        if let Err(err) = self.show_selected(renderer) {
            tracing::warn!(?err, "failed to show enhance variant");
        }
    }

    fn command(&mut self, renderer: &mut Renderer, command: ToolCommand) -> ToolResult<()> {
        match command {
            ToolCommand::Continue => self.transition(renderer, EnhanceEvent::Continue),
            ToolCommand::BeginMask => self.transition(renderer, EnhanceEvent::BeginMask),
            ToolCommand::FinishMask => self.transition(renderer, EnhanceEvent::FinishMask),
            ToolCommand::DeleteMask => self.transition(renderer, EnhanceEvent::DeleteMask),
            ToolCommand::InvertMask | ToolCommand::ResetMask => self.mask_command(renderer, command),
            ToolCommand::BeginErase => self.transition(renderer, EnhanceEvent::BeginErase),
            ToolCommand::Submit => self.submit(renderer),
            ToolCommand::Save => self.confirm(renderer),
            ToolCommand::Revert => {
                self.cancel(renderer);
                Ok(())
            }
            command => Err(ToolError::Unsupported {
                tool: Self::NAME,
                command,
            }),
        }
    }

    fn confirm(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        if !self.machine.can_transition(EnhanceEvent::Confirm) {
            return Err(ToolError::NothingToConfirm { tool: Self::NAME });
        }
        self.transition(renderer, EnhanceEvent::Confirm)
    }

    fn cancel(&mut self, renderer: &mut Renderer) {
        if !self.machine.can_transition(EnhanceEvent::Cancel) {
            return;
        }
        if let Err(err) = self.transition(renderer, EnhanceEvent::Cancel) {
            tracing::warn!(?err, "enhance cancel failed");
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
                GenerationUpdate::Submitted => {
                    self.core.report_progress(0.0);
                    if let Err(err) = self.transition(renderer, EnhanceEvent::UploadFinished) {
                        tracing::warn!(?err, "unexpected upload completion");
                    }
                }
                GenerationUpdate::Finished(Ok(outcome)) => {
                    self.pending = None;
                    if outcome.timed_out {
                        tracing::warn!(
                            variants = outcome.variants.len(),
                            dropped = outcome.dropped,
                            "enhance timed out, offering completed variants"
                        );
                    }
                    self.variants = VariantSet::new(outcome.variants);
                    self.core.report_progress(1.0);
                    if let Err(err) = self.transition(renderer, EnhanceEvent::VariantsReady) {
                        tracing::warn!(?err, "failed to show enhance variants");
                    }
                }
                GenerationUpdate::Finished(Err(err)) => {
                    self.pending = None;
                    tracing::warn!(?err, "enhance generation failed");
                    self.core.report_error(Some(err.to_string()));
                    if let Err(err) = self.transition(renderer, EnhanceEvent::Failed) {
                        tracing::warn!(?err, "failed to recover from enhance failure");
                    }
                }
            }
        }
        changed
    }

    fn destroy(&mut self, renderer: &mut Renderer, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        let showing = matches!(self.machine.state(), EnhanceState::Confirm | EnhanceState::Erase);
        if (self.core.is_dirty() || showing) && !confirm_discard() {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if let Err(err) = renderer.set_edit_image(None) {
            tracing::warn!(?err, "failed to clear enhance variant");
        }
        renderer.delete_mask();
        self.selection.finish(renderer);
        renderer.set_cursor(None);
        true
    }

    fn listeners_mut(&mut self) -> &mut ToolListeners {
        self.core.listeners_mut()
    }
}

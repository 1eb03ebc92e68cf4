use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    GenerationUpdate, PendingGeneration, SavedImage, SelectionHandler, Tool, ToolCommand,
    ToolCore, ToolListeners, VariantDirection, VariantSet,
};
use crate::config::EditorConfig;
use crate::editor::{
    ImageContext, PointerButton, PointerEvent, RemoteServices, ToolEnvironment, ToolError,
    ToolResult, WheelEvent,
};
use crate::geometry::{round_up_to_multiple, CanvasPoint, Color, Rect};
use crate::input::{ShortcutKey, ShortcutModifiers};
use crate::pixels::{encode_image, erasure_to_mask, AlphaSource, EncodeFormat};
use crate::remote::{
    GenerationKind, GenerationOutcome, GenerationPayload, GenerationPlan, VariantProcessing,
};
use crate::render::{Cursor, CursorShape, LayerKind, RenderError, Renderer};
use crate::state::{InpaintEffect, InpaintEvent, InpaintMachine, InpaintState, StateError};

const INPAINT_MODEL: &str = "stable_diffusion_inpainting";
const DEFAULT_VARIATION_STRENGTH: f32 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InpaintArgs {
    pub prompt: String,
    pub negative_prompt: String,
    pub count: u32,
    pub variation_strength: f32,
    pub brush_size: u32,
    pub outpaint: bool,
}

/// Select a region, erase what should change, describe it, then pick one of the
/// generated variants. With outpainting on, the region may hang past the image and the
/// canvas grows to hold it on submit.
pub struct InpaintTool {
    core: ToolCore,
    config: Arc<EditorConfig>,
    remote: Option<RemoteServices>,
    image: ImageContext,
    machine: InpaintMachine,
    selection: SelectionHandler,
    args: InpaintArgs,
    variants: VariantSet,
    pending: Option<PendingGeneration<GenerationOutcome>>,
    /// Selection as placed before the canvas grew for an outpaint that is still pending.
    expanded_from: Option<Rect>,
    erasing: bool,
    pointer: Option<CanvasPoint>,
}

impl InpaintTool {
    pub const NAME: &'static str = "inpaint";

    pub fn new(env: &ToolEnvironment, renderer: &mut Renderer) -> Self {
        let config = Arc::clone(&env.config);
        let core = ToolCore::new(Self::NAME, env.args.clone());
        let args = core.load_args(InpaintArgs {
            prompt: String::new(),
            negative_prompt: String::new(),
            count: config.inpaint.count,
            variation_strength: DEFAULT_VARIATION_STRENGTH,
            brush_size: config.inpaint.brush_size,
            outpaint: false,
        });

        let size = config.selection.default_size;
        let select_supported = renderer.width() > size || renderer.height() > size;
        let mut selection = SelectionHandler::new(config.inpaint.grid_step, size, size);
        selection.set_outpaint(args.outpaint);
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
            machine: InpaintMachine::for_inpaint(select_supported),
            selection,
            args,
            variants: VariantSet::default(),
            pending: None,
            expanded_from: None,
            erasing: false,
            pointer: None,
        };
        tool.core.report_state(tool.state_name());
        tool
    }

    pub fn state(&self) -> InpaintState {
        self.machine.state()
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    fn transition(&mut self, renderer: &mut Renderer, event: InpaintEvent) -> ToolResult<()> {
        let effects = self.machine.transition(event)?;
        for effect in effects {
            self.apply(renderer, effect)?;
        }
        self.core.report_state(self.state_name());
        Ok(())
    }

    fn apply(&mut self, renderer: &mut Renderer, effect: InpaintEffect) -> ToolResult<()> {
        match effect {
            InpaintEffect::FinishSelection => self.selection.finish(renderer),
            InpaintEffect::ClearCursor => {
                self.erasing = false;
                renderer.set_cursor(None);
            }
            InpaintEffect::ResetSelection => {
                self.selection.reset(renderer, self.config.selection.default_size);
            }
            InpaintEffect::ShowSelectionControls(show) => {
                self.core.listeners_mut().notify_selection_controls(show);
            }
            InpaintEffect::RevertEdits => {
                renderer.discard_uncommitted();
                renderer.set_edit_image(None)?;
                self.collapse_expansion(renderer);
                self.variants.clear();
                self.core.set_dirty(false);
            }
            InpaintEffect::StopGeneration => {
                if let Some(pending) = self.pending.take() {
                    pending.cancel();
                }
            }
            InpaintEffect::ShowFirstVariant => {
                self.show_selected(renderer)?;
                self.core.set_dirty(true);
            }
            InpaintEffect::CommitVariant => {
                self.expanded_from = None;
                renderer.commit_selection();
                let saved = ToolCore::save_png(renderer)?;
                self.core.emit_save(SavedImage {
                    prompt: Some(self.prompt()),
                    negative_prompt: Some(self.negative_prompt()),
                    model: Some(INPAINT_MODEL.to_string()),
                    ..saved
                });
                self.variants.clear();
                self.core.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Undoes the outpaint growth of an abandoned submit and puts the selection back
    /// where it hung past the image.
    fn collapse_expansion(&mut self, renderer: &mut Renderer) {
        let Some(selection) = self.expanded_from.take() else {
            return;
        };
        if renderer.undo() {
            renderer.clear_redo();
            renderer.set_selection_overlay(Some(selection));
        } else {
            tracing::warn!("could not shrink canvas after abandoned outpaint");
        }
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

    fn erase(&mut self, renderer: &mut Renderer, point: CanvasPoint) {
        let barrier = self.config.inpaint.erase_barrier;
        match renderer.erase_point(point, self.args.brush_size, barrier) {
            Ok(()) => self.core.set_dirty(true),
            Err(err) => tracing::warn!(?err, "erase skipped"),
        }
    }

    fn sync_cursor(&self, renderer: &mut Renderer) {
        let cursor = self.pointer.and_then(|point| match self.machine.state() {
            InpaintState::Erase => Some(Cursor::new(
                CursorShape::Circle,
                point,
                f64::from(self.args.brush_size) / 2.0,
                Color::WHITE,
            )),
            InpaintState::Select => None,
            _ => Some(Cursor::crosshairs(point)),
        });
        renderer.set_cursor(cursor);
    }

    /// Encodes the erased region, grows the canvas for outpainting and starts the
    /// generation job.
    fn submit(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        let state = self.machine.state();
        if state.is_busy() {
            return Err(ToolError::Busy { tool: Self::NAME });
        }
        if !self.machine.can_transition(InpaintEvent::Submit) {
            return Err(StateError::InvalidInpaintTransition {
                from: state,
                event: InpaintEvent::Submit,
            }
            .into());
        }
        let remote = self.remote.clone().ok_or(ToolError::RemoteUnavailable)?;
        self.core.report_error(None);

        let selected = renderer.selection().ok_or(RenderError::NoSelection)?;
        let erased = renderer.image_data(Some(selected), LayerKind::Base)?;
        let mask = encode_image(&erasure_to_mask(&erased), EncodeFormat::Png)?;
        renderer.discard_uncommitted();
        if self.args.outpaint && !selected.is_within(renderer.bounds()) {
            renderer.expand_to_overlay()?;
            self.expanded_from = Some(selected);
        }
        let region = renderer.selection().ok_or(RenderError::NoSelection)?;
        let image = match renderer.encoded_image(Some(region), EncodeFormat::Jpeg) {
            Ok(image) => image,
            Err(err) => {
                self.collapse_expansion(renderer);
                return Err(err.into());
            }
        };

        let multiple = self.config.inpaint.size_multiple;
        let plan = GenerationPlan {
            kind: GenerationKind::Inpaint,
            payload: GenerationPayload {
                image,
                image_format: EncodeFormat::Jpeg,
                mask: Some(mask),
            },
            parent: self.image.id.clone(),
            prompt: self.prompt(),
            negative_prompt: self.negative_prompt(),
            width: round_up_to_multiple(region.width, multiple),
            height: round_up_to_multiple(region.height, multiple),
            count: self.args.count,
            denoising_strength: self.args.variation_strength,
            model: INPAINT_MODEL.to_string(),
            processing: VariantProcessing {
                region,
                image: renderer.bounds(),
                feather: true,
                feather_width: Some(self.config.inpaint.feather_width),
                alpha: AlphaSource::Erasure(erased),
                spread: self.config.inpaint.mask_spread,
                color_reference: None,
            },
        };
        tracing::info!(
            ?region,
            count = plan.count,
            outpaint = self.args.outpaint,
            "submitting inpaint request"
        );

        self.transition(renderer, InpaintEvent::Submit)?;
        let job = remote.spawn_generation(plan, self.config.polling.clone());
        self.pending = Some(PendingGeneration::new(job));
        Ok(())
    }

    fn finish_generation(&mut self, renderer: &mut Renderer, outcome: GenerationOutcome) {
        if outcome.timed_out {
            tracing::warn!(
                variants = outcome.variants.len(),
                dropped = outcome.dropped,
                "inpaint timed out, offering completed variants"
            );
        }
        self.variants = VariantSet::new(outcome.variants);
        self.core.report_progress(1.0);
        if let Err(err) = self.transition(renderer, InpaintEvent::VariantsReady) {
            tracing::warn!(?err, "failed to show inpaint variants");
        }
    }

    fn fail_generation(&mut self, renderer: &mut Renderer, message: String) {
        tracing::warn!(%message, "inpaint generation failed");
        self.core.report_error(Some(message));
        if let Err(err) = self.transition(renderer, InpaintEvent::Failed) {
            tracing::warn!(?err, "failed to revert after inpaint failure");
        }
    }
}

impl Tool for InpaintTool {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn state_name(&self) -> &'static str {
        match self.machine.state() {
            InpaintState::Select => "select",
            InpaintState::Erase => "erase",
            InpaintState::Inpaint => "inpaint",
            InpaintState::Uploading => "uploading",
            InpaintState::Processing => "processing",
            InpaintState::Confirm => "confirm",
        }
    }

    fn is_dirty(&self) -> bool {
        self.core.is_dirty()
    }

    fn is_busy(&self) -> bool {
        self.machine.state().is_busy()
    }

    fn on_pointer_down(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.core.pan_start(event) || event.button != PointerButton::Primary {
            return;
        }
        let point = ToolCore::to_canvas(renderer, event.position);
        match self.machine.state() {
            InpaintState::Select => self.selection.pointer_down(renderer, point),
            InpaintState::Erase => {
                self.erasing = true;
                self.erase(renderer, point);
            }
            _ => {}
        }
    }

    fn on_pointer_move(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.core.pan_move(renderer, event) {
            return;
        }
        let point = ToolCore::to_canvas(renderer, event.position);
        self.pointer = Some(point);
        match self.machine.state() {
            InpaintState::Select => self.selection.pointer_move(renderer, point),
            InpaintState::Erase if self.erasing => self.erase(renderer, point),
            _ => {}
        }
        self.sync_cursor(renderer);
    }

    fn on_pointer_up(&mut self, renderer: &mut Renderer, _event: PointerEvent) {
        if self.core.pan_end() {
            return;
        }
        self.erasing = false;
        if self.machine.state() == InpaintState::Select {
            self.selection.pointer_up(renderer);
        }
    }

    fn on_pointer_leave(&mut self, renderer: &mut Renderer) {
        self.core.pan_end();
        self.erasing = false;
        self.pointer = None;
        if self.machine.state() == InpaintState::Select {
            self.selection.finish(renderer);
        }
        renderer.set_cursor(None);
    }

    fn on_wheel(&mut self, renderer: &mut Renderer, event: WheelEvent) {
        ToolCore::zoom(renderer, event);
        self.sync_cursor(renderer);
    }

    fn on_key_down(&mut self, renderer: &mut Renderer, key: ShortcutKey, _modifiers: ShortcutModifiers) -> bool {
        match (key, self.machine.state()) {
            (ShortcutKey::Enter, InpaintState::Select) => {
                self.transition(renderer, InpaintEvent::BeginErase).is_ok()
            }
            (ShortcutKey::Enter, InpaintState::Erase) => {
                self.transition(renderer, InpaintEvent::BeginPrompt).is_ok()
            }
            _ => false,
        }
    }

    fn get_args(&self) -> Value {
        self.core.args_value(&self.args)
    }

    fn update_args(&mut self, renderer: &mut Renderer, patch: &Value) -> ToolResult<()> {
        self.args = self.core.update_args(&self.args, patch)?;
        self.selection.set_outpaint(self.args.outpaint);
        self.sync_cursor(renderer);
        Ok(())
    }

    fn select(&mut self, renderer: &mut Renderer, direction: VariantDirection) {
        if self.machine.state() != InpaintState::Confirm {
            return;
        }
        self.variants.step(direction);
        if let Err(err) = self.show_selected(renderer) {
            tracing::warn!(?err, "failed to show inpaint variant");
        }
    }

    fn command(&mut self, renderer: &mut Renderer, command: ToolCommand) -> ToolResult<()> {
        match command {
            ToolCommand::BeginErase => self.transition(renderer, InpaintEvent::BeginErase),
            ToolCommand::BeginPrompt => self.transition(renderer, InpaintEvent::BeginPrompt),
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
        if self.machine.state() != InpaintState::Confirm {
            return Err(ToolError::NothingToConfirm { tool: Self::NAME });
        }
        self.transition(renderer, InpaintEvent::Confirm)
    }

    fn cancel(&mut self, renderer: &mut Renderer) {
        if !self.machine.can_transition(InpaintEvent::Cancel) {
            return;
        }
        if let Err(err) = self.transition(renderer, InpaintEvent::Cancel) {
            tracing::warn!(?err, "inpaint cancel failed");
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
                    if let Err(err) = self.transition(renderer, InpaintEvent::UploadFinished) {
                        tracing::warn!(?err, "unexpected upload completion");
                    }
                }
                GenerationUpdate::Finished(result) => {
                    self.pending = None;
                    match result {
                        Ok(outcome) => self.finish_generation(renderer, outcome),
                        Err(err) => self.fail_generation(renderer, err.to_string()),
                    }
                }
            }
        }
        changed
    }

    fn destroy(&mut self, renderer: &mut Renderer, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        let unsaved = self.core.is_dirty() || self.machine.state() == InpaintState::Confirm;
        if unsaved && !confirm_discard() {
            return false;
        }
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if self.core.is_dirty() {
            renderer.discard_uncommitted();
        }
        if let Err(err) = renderer.set_edit_image(None) {
            tracing::warn!(?err, "failed to clear inpaint variant");
        }
        self.selection.finish(renderer);
        renderer.set_cursor(None);
        true
    }

    fn listeners_mut(&mut self) -> &mut ToolListeners {
        self.core.listeners_mut()
    }
}

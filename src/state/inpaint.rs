use super::machine::{StateMachine, TransitionTable};
use super::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InpaintState {
    Select,
    Erase,
    Inpaint,
    Uploading,
    Processing,
    Confirm,
}

impl InpaintState {
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InpaintEvent {
    BeginErase,
    BeginPrompt,
    Submit,
    UploadFinished,
    VariantsReady,
    Failed,
    Cancel,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InpaintEffect {
    /// Drop the selection tool's drag preview.
    FinishSelection,
    ClearCursor,
    /// Put a square selection of `min(width, height, 512)` at the origin.
    ResetSelection,
    ShowSelectionControls(bool),
    /// Restore erased pixels, clear the edit layer and forget variants.
    RevertEdits,
    /// Stop listening to the in-flight generation; its result is ignored.
    StopGeneration,
    ShowFirstVariant,
    /// Commit the shown variant and emit the saved image.
    CommitVariant,
}

/// `home` is where the tool rests between cycles: `Select`, or `Erase` when region
/// selection is unsupported for the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InpaintTransitions {
    home: InpaintState,
}

impl InpaintTransitions {
    pub const fn new(select_supported: bool) -> Self {
        let home = if select_supported {
            InpaintState::Select
        } else {
            InpaintState::Erase
        };
        Self { home }
    }

    pub const fn home(&self) -> InpaintState {
        self.home
    }
}

impl TransitionTable for InpaintTransitions {
    type State = InpaintState;
    type Event = InpaintEvent;
    type Effect = InpaintEffect;

    fn next(&self, from: InpaintState, event: InpaintEvent) -> Option<(InpaintState, Vec<InpaintEffect>)> {
        use InpaintEvent as E;
        use InpaintState as S;

        let (to, mut specific) = match (from, event) {
            (S::Select, E::BeginErase) => (S::Erase, vec![]),
            (S::Erase, E::BeginPrompt) => (S::Inpaint, vec![]),
            (S::Inpaint, E::Submit) => (S::Uploading, vec![]),
            (S::Uploading, E::UploadFinished) => (S::Processing, vec![]),
            (S::Processing, E::VariantsReady) => (S::Confirm, vec![InpaintEffect::ShowFirstVariant]),
            (S::Uploading | S::Processing, E::Failed) => (self.home, vec![InpaintEffect::RevertEdits]),
            (S::Uploading | S::Processing, E::Cancel) => (
                self.home,
                vec![InpaintEffect::StopGeneration, InpaintEffect::RevertEdits],
            ),
            (S::Erase | S::Inpaint | S::Confirm, E::Cancel) => {
                (self.home, vec![InpaintEffect::RevertEdits])
            }
            (S::Confirm, E::Confirm) => (self.home, vec![InpaintEffect::CommitVariant]),
            _ => return None,
        };

        if to == from {
            return Some((to, specific));
        }
        let mut effects = Vec::with_capacity(specific.len() + 3);
        match from {
            S::Select => effects.push(InpaintEffect::FinishSelection),
            S::Erase => effects.push(InpaintEffect::ClearCursor),
            _ => {}
        }
        effects.append(&mut specific);
        effects.push(InpaintEffect::ShowSelectionControls(to == S::Confirm));
        if to == S::Select {
            effects.push(InpaintEffect::ResetSelection);
        }
        Some((to, effects))
    }

    fn invalid(from: InpaintState, event: InpaintEvent) -> StateError {
        StateError::InvalidInpaintTransition { from, event }
    }
}

pub type InpaintMachine = StateMachine<InpaintTransitions>;

impl InpaintMachine {
    pub fn for_inpaint(select_supported: bool) -> Self {
        let table = InpaintTransitions::new(select_supported);
        StateMachine::new(table, table.home())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateTransition;

    fn machine_in(state_path: &[InpaintEvent]) -> InpaintMachine {
        let mut machine = InpaintMachine::for_inpaint(true);
        for event in state_path {
            machine
                .transition(*event)
                .expect("path transition should be valid");
        }
        machine
    }

    #[test]
    fn full_cycle_walks_select_to_confirm_and_back() {
        let mut machine = machine_in(&[
            InpaintEvent::BeginErase,
            InpaintEvent::BeginPrompt,
            InpaintEvent::Submit,
            InpaintEvent::UploadFinished,
        ]);
        assert_eq!(machine.state(), InpaintState::Processing);

        let effects = machine
            .transition(InpaintEvent::VariantsReady)
            .expect("processing -> confirm should transition");
        assert_eq!(
            effects,
            vec![
                InpaintEffect::ShowFirstVariant,
                InpaintEffect::ShowSelectionControls(true)
            ]
        );

        let effects = machine
            .transition(InpaintEvent::Confirm)
            .expect("confirm -> select should transition");
        assert_eq!(machine.state(), InpaintState::Select);
        assert_eq!(
            effects,
            vec![
                InpaintEffect::CommitVariant,
                InpaintEffect::ShowSelectionControls(false),
                InpaintEffect::ResetSelection
            ]
        );
        assert_eq!(machine.history().len(), 6);
        assert_eq!(
            machine.history()[0],
            StateTransition::new(InpaintState::Select, InpaintEvent::BeginErase, InpaintState::Erase)
        );
    }

    #[test]
    fn leaving_select_and_erase_emit_exit_effects() {
        let mut machine = InpaintMachine::for_inpaint(true);
        let effects = machine
            .transition(InpaintEvent::BeginErase)
            .expect("select -> erase should transition");
        assert_eq!(
            effects,
            vec![
                InpaintEffect::FinishSelection,
                InpaintEffect::ShowSelectionControls(false)
            ]
        );

        let effects = machine
            .transition(InpaintEvent::BeginPrompt)
            .expect("erase -> inpaint should transition");
        assert_eq!(effects[0], InpaintEffect::ClearCursor);
    }

    #[test]
    fn second_submit_while_in_flight_is_rejected() {
        let mut machine = machine_in(&[
            InpaintEvent::BeginErase,
            InpaintEvent::BeginPrompt,
            InpaintEvent::Submit,
        ]);

        let err = machine
            .transition(InpaintEvent::Submit)
            .expect_err("uploading -> submit should fail");
        assert_eq!(
            err,
            StateError::InvalidInpaintTransition {
                from: InpaintState::Uploading,
                event: InpaintEvent::Submit
            }
        );
        assert_eq!(machine.state(), InpaintState::Uploading);
    }

    #[test]
    fn cancel_while_processing_stops_generation_and_reverts() {
        let mut machine = machine_in(&[
            InpaintEvent::BeginErase,
            InpaintEvent::BeginPrompt,
            InpaintEvent::Submit,
            InpaintEvent::UploadFinished,
        ]);

        let effects = machine
            .transition(InpaintEvent::Cancel)
            .expect("processing -> cancel should transition");

        assert_eq!(machine.state(), InpaintState::Select);
        assert!(effects.contains(&InpaintEffect::StopGeneration));
        assert!(effects.contains(&InpaintEffect::RevertEdits));
    }

    #[test]
    fn unsupported_selection_keeps_erase_as_home() {
        let mut machine = InpaintMachine::for_inpaint(false);
        assert_eq!(machine.state(), InpaintState::Erase);
        assert!(!machine.can_transition(InpaintEvent::BeginErase));

        let effects = machine
            .transition(InpaintEvent::Cancel)
            .expect("erase -> cancel should stay in erase");
        assert_eq!(machine.state(), InpaintState::Erase);
        assert_eq!(effects, vec![InpaintEffect::RevertEdits]);
    }

    #[test]
    fn cancel_in_select_is_invalid() {
        let machine = InpaintMachine::for_inpaint(true);
        assert!(!machine.can_transition(InpaintEvent::Cancel));
        assert!(!machine.can_transition(InpaintEvent::Confirm));
    }
}

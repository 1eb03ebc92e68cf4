use super::machine::{StateMachine, TransitionTable};
use super::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhanceState {
    Select,
    Default,
    Mask,
    Erase,
    Uploading,
    Processing,
    Confirm,
}

impl EnhanceState {
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhanceEvent {
    Continue,
    BeginMask,
    FinishMask,
    DeleteMask,
    Submit,
    UploadFinished,
    VariantsReady,
    Failed,
    BeginErase,
    Cancel,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhanceEffect {
    FinishSelection,
    ClearCursor,
    /// Re-enable selecting with outpainting off.
    ResetSelection,
    ShowSelectionControls(bool),
    /// Replace any mask layer with a fresh one.
    CreateMask,
    DeleteMask,
    /// Clear the edit layer and forget variants.
    ClearVariants,
    StopGeneration,
    ShowFirstVariant,
    /// Show the selected variant again, dropping unsaved erasures.
    ShowSelectedVariant,
    CommitVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhanceTransitions {
    home: EnhanceState,
}

impl EnhanceTransitions {
    pub const fn new(select_supported: bool) -> Self {
        let home = if select_supported {
            EnhanceState::Select
        } else {
            EnhanceState::Default
        };
        Self { home }
    }

    pub const fn home(&self) -> EnhanceState {
        self.home
    }
}

impl TransitionTable for EnhanceTransitions {
    type State = EnhanceState;
    type Event = EnhanceEvent;
    type Effect = EnhanceEffect;

    fn next(&self, from: EnhanceState, event: EnhanceEvent) -> Option<(EnhanceState, Vec<EnhanceEffect>)> {
        use EnhanceEvent as E;
        use EnhanceState as S;

        let (to, mut specific) = match (from, event) {
            (S::Select, E::Continue) => (S::Default, vec![]),
            (S::Default | S::Mask, E::BeginMask) => (S::Mask, vec![EnhanceEffect::CreateMask]),
            (S::Mask, E::FinishMask) => (S::Default, vec![]),
            (S::Default | S::Mask, E::DeleteMask) => (S::Default, vec![EnhanceEffect::DeleteMask]),
            (S::Default, E::Submit) => (S::Uploading, vec![]),
            (S::Uploading, E::UploadFinished) => (S::Processing, vec![]),
            (S::Processing, E::VariantsReady) => (
                S::Confirm,
                vec![EnhanceEffect::ShowFirstVariant, EnhanceEffect::DeleteMask],
            ),
            (S::Uploading | S::Processing, E::Failed) => {
                (S::Default, vec![EnhanceEffect::ClearVariants])
            }
            (S::Confirm, E::BeginErase) => (S::Erase, vec![]),
            (S::Erase, E::Cancel) => (S::Confirm, vec![EnhanceEffect::ShowSelectedVariant]),
            (S::Uploading | S::Processing, E::Cancel) => (
                self.home,
                vec![EnhanceEffect::StopGeneration, EnhanceEffect::ClearVariants],
            ),
            (S::Confirm, E::Cancel) => (self.home, vec![EnhanceEffect::ClearVariants]),
            (S::Default, E::Cancel) if self.home == S::Select => {
                (S::Select, vec![EnhanceEffect::ClearVariants])
            }
            (S::Confirm | S::Erase, E::Confirm) => (self.home, vec![EnhanceEffect::CommitVariant]),
            _ => return None,
        };

        if to == from {
            return Some((to, specific));
        }
        let mut effects = Vec::with_capacity(specific.len() + 4);
        effects.push(EnhanceEffect::ClearCursor);
        if from == S::Select {
            effects.push(EnhanceEffect::FinishSelection);
        }
        effects.append(&mut specific);
        effects.push(EnhanceEffect::ShowSelectionControls(to == S::Confirm));
        if to == S::Select {
            effects.push(EnhanceEffect::ResetSelection);
        }
        Some((to, effects))
    }

    fn invalid(from: EnhanceState, event: EnhanceEvent) -> StateError {
        StateError::InvalidEnhanceTransition { from, event }
    }
}

pub type EnhanceMachine = StateMachine<EnhanceTransitions>;

impl EnhanceMachine {
    pub fn for_enhance(select_supported: bool) -> Self {
        let table = EnhanceTransitions::new(select_supported);
        StateMachine::new(table, table.home())
    }
}

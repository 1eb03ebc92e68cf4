use super::enhance::{EnhanceEvent, EnhanceState};
use super::inpaint::{InpaintEvent, InpaintState};
use thiserror::Error;

pub type StateResult<T> = std::result::Result<T, StateError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid inpaint transition: from {from:?} using event {event:?}")]
    InvalidInpaintTransition {
        from: InpaintState,
        event: InpaintEvent,
    },
    #[error("invalid enhance transition: from {from:?} using event {event:?}")]
    InvalidEnhanceTransition {
        from: EnhanceState,
        event: EnhanceEvent,
    },
}

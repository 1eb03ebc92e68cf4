//! Pure tool state machines. A transition yields the next state plus the effects the
//! owning tool must run against the renderer afterwards.

pub mod enhance;
pub mod error;
pub mod inpaint;
pub mod machine;

pub use enhance::{EnhanceEffect, EnhanceEvent, EnhanceMachine, EnhanceState, EnhanceTransitions};
pub use error::{StateError, StateResult};
pub use inpaint::{InpaintEffect, InpaintEvent, InpaintMachine, InpaintState, InpaintTransitions};
pub use machine::{StateMachine, StateTransition, TransitionTable};

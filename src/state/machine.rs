use std::fmt;

use super::error::StateResult;
use super::StateError;

/// Pure `(state, event) -> (state, effects)` table for one tool.
pub trait TransitionTable {
    type State: Copy + fmt::Debug + PartialEq;
    type Event: Copy + fmt::Debug;
    type Effect: fmt::Debug + PartialEq;

    fn next(&self, from: Self::State, event: Self::Event) -> Option<(Self::State, Vec<Self::Effect>)>;

    fn invalid(from: Self::State, event: Self::Event) -> StateError;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition<S, E> {
    pub from: S,
    pub event: E,
    pub to: S,
}

impl<S, E> StateTransition<S, E> {
    pub const fn new(from: S, event: E, to: S) -> Self {
        Self { from, event, to }
    }
}

#[derive(Debug)]
pub struct StateMachine<T: TransitionTable> {
    table: T,
    state: T::State,
    transition_history: Vec<StateTransition<T::State, T::Event>>,
}

impl<T: TransitionTable> StateMachine<T> {
    pub fn new(table: T, initial: T::State) -> Self {
        Self {
            table,
            state: initial,
            transition_history: Vec::new(),
        }
    }

    pub fn state(&self) -> T::State {
        self.state
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn can_transition(&self, event: T::Event) -> bool {
        self.table.next(self.state, event).is_some()
    }

    /// Applies `event` and returns the effects to run, in order.
    pub fn transition(&mut self, event: T::Event) -> StateResult<Vec<T::Effect>> {
        tracing::debug!(from = ?self.state, event = ?event, "request state transition");
        let (next, effects) = self.table.next(self.state, event).ok_or_else(|| {
            let from = self.state;
            tracing::warn!(from = ?from, event = ?event, "invalid state transition requested");
            T::invalid(from, event)
        })?;

        self.transition_history
            .push(StateTransition::new(self.state, event, next));
        self.state = next;
        Ok(effects)
    }
}

#[cfg(test)]
impl<T: TransitionTable> StateMachine<T> {
    pub(crate) fn history(&self) -> &[StateTransition<T::State, T::Event>] {
        &self.transition_history
    }
}

impl<T: TransitionTable> fmt::Display for StateMachine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.state)
    }
}

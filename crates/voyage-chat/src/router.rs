//! Dialogue state machine.
//!
//! One request walks a short path through these states:
//! Summarize -> Evaluate -> AnswerGeneral
//!                       -> AssignVehicle -> GenerateItinerary
//!                       -> Finalize
//!                       -> AwaitMoreInput
//!
//! Leaves end the request. `AwaitMoreInput` hands control back to the user;
//! their next request starts again at [`DialogueState::INITIAL`].

use voyage_core::types::IntentConditions;

use crate::error::ChatError;

/// A step of the per-request dialogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DialogueState {
    Summarize,
    Evaluate,
    AnswerGeneral,
    AssignVehicle,
    GenerateItinerary,
    Finalize,
    AwaitMoreInput,
}

impl DialogueState {
    /// Where every request starts.
    pub const INITIAL: DialogueState = DialogueState::Summarize;

    /// The state that follows `self` given the evaluated conditions, or
    /// `None` when `self` ends the request.
    pub fn next(self, conditions: &IntentConditions) -> Option<DialogueState> {
        match self {
            DialogueState::Summarize => Some(DialogueState::Evaluate),
            DialogueState::Evaluate => Some(route(conditions)),
            DialogueState::AssignVehicle => Some(DialogueState::GenerateItinerary),
            DialogueState::AnswerGeneral
            | DialogueState::GenerateItinerary
            | DialogueState::Finalize
            | DialogueState::AwaitMoreInput => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DialogueState::AnswerGeneral
                | DialogueState::GenerateItinerary
                | DialogueState::Finalize
                | DialogueState::AwaitMoreInput
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DialogueState::Summarize => "summarize",
            DialogueState::Evaluate => "evaluate",
            DialogueState::AnswerGeneral => "answer_general",
            DialogueState::AssignVehicle => "assign_vehicle",
            DialogueState::GenerateItinerary => "generate_itinerary",
            DialogueState::Finalize => "finalize",
            DialogueState::AwaitMoreInput => "await_more_input",
        }
    }
}

/// Choose the branch after evaluation. Finalization wins over planning;
/// planning needs every required parameter, otherwise the user is asked
/// for more input.
pub fn route(conditions: &IntentConditions) -> DialogueState {
    if conditions.wants_finalize {
        DialogueState::Finalize
    } else if conditions.wants_itinerary && conditions.ready_for_itinerary() {
        DialogueState::AssignVehicle
    } else if conditions.wants_itinerary {
        DialogueState::AwaitMoreInput
    } else {
        DialogueState::AnswerGeneral
    }
}

/// Validate that a transition is allowed.
///
/// Valid transitions:
/// - Summarize -> Evaluate
/// - Evaluate -> AnswerGeneral | AssignVehicle | Finalize | AwaitMoreInput
/// - AssignVehicle -> GenerateItinerary
pub fn validate_transition(from: DialogueState, to: DialogueState) -> Result<(), ChatError> {
    let valid = matches!(
        (from, to),
        (DialogueState::Summarize, DialogueState::Evaluate)
            | (DialogueState::Evaluate, DialogueState::AnswerGeneral)
            | (DialogueState::Evaluate, DialogueState::AssignVehicle)
            | (DialogueState::Evaluate, DialogueState::Finalize)
            | (DialogueState::Evaluate, DialogueState::AwaitMoreInput)
            | (DialogueState::AssignVehicle, DialogueState::GenerateItinerary)
    );

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition(from, to))
    }
}

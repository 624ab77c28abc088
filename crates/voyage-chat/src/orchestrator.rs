//! Chat orchestrator: runs one request through the dialogue state machine.
//!
//! Every request starts at [`DialogueState::INITIAL`], walks the path chosen
//! by [`DialogueState::next`], and reports everything it produces on an
//! [`EventSink`]. The stream always opens with `start` and, unless the
//! client went away, closes with `end`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info};

use voyage_core::config::{ChatConfig, VoyageConfig};
use voyage_core::events::StreamEvent;
use voyage_core::types::{
    ConversationTurn, IntentConditions, ItineraryItem, RecipientIdentity, Speaker,
    VehicleAssignment,
};
use voyage_inference::InferenceGateway;
use voyage_vector::AttractionStore;

use crate::answerer::GeneralAnswerer;
use crate::error::ChatError;
use crate::evaluator::IntentEvaluator;
use crate::finalizer::{FinalizeOutcome, Finalizer, ItineraryDispatcher};
use crate::planner::ItineraryPlanner;
use crate::router::{validate_transition, DialogueState};
use crate::sink::EventSink;
use crate::summarizer::ConversationSummarizer;
use crate::vehicle;

pub const MORE_INPUT_MESSAGE: &str = "To generate your itinerary, please provide number of days, \
number of people, preferred transport, and whether you're traveling with a disabled person.";

pub const EMPTY_ITINERARY_MESSAGE: &str = "I couldn't put together an itinerary from the \
attractions I know about. Could you try different preferences?";

/// Everything one request needs. The client resubmits the history and the
/// conditions it was last given on every request.
#[derive(Debug, Clone)]
pub struct ConversationRequest {
    pub turns: Vec<ConversationTurn>,
    pub prior: IntentConditions,
    pub draft: Vec<ItineraryItem>,
    pub identity: RecipientIdentity,
    pub today: NaiveDate,
}

impl ConversationRequest {
    pub fn new(turns: Vec<ConversationTurn>, today: NaiveDate) -> Self {
        Self {
            turns,
            prior: IntentConditions::default(),
            draft: Vec::new(),
            identity: RecipientIdentity::default(),
            today,
        }
    }

    /// Text of the most recent user turn.
    pub fn latest_user_message(&self) -> &str {
        self.turns
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::User)
            .map(|t| t.text.as_str())
            .unwrap_or_default()
    }
}

/// What a completed request produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub final_state: DialogueState,
    pub conditions: IntentConditions,
    pub vehicle: Option<VehicleAssignment>,
    pub itinerary: Vec<ItineraryItem>,
    pub finalize: Option<FinalizeOutcome>,
}

/// Working state carried between steps of one request.
struct StepContext {
    summary: String,
    outcome: TurnOutcome,
}

/// Central coordinator for the dialogue engine.
pub struct ChatOrchestrator {
    summarizer: ConversationSummarizer,
    evaluator: IntentEvaluator,
    answerer: GeneralAnswerer,
    planner: ItineraryPlanner,
    finalizer: Finalizer,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        gateway: Arc<dyn InferenceGateway>,
        store: Arc<AttractionStore>,
        dispatcher: Arc<dyn ItineraryDispatcher>,
        config: &VoyageConfig,
    ) -> Self {
        Self {
            summarizer: ConversationSummarizer::new(gateway.clone()),
            evaluator: IntentEvaluator::new(gateway.clone()),
            answerer: GeneralAnswerer::new(gateway.clone()),
            planner: ItineraryPlanner::new(gateway, store, &config.retrieval),
            finalizer: Finalizer::new(dispatcher),
            config: config.chat.clone(),
        }
    }

    /// Reject requests that must not start streaming.
    pub fn validate(&self, request: &ConversationRequest) -> Result<(), ChatError> {
        if request.turns.iter().all(|t| t.text.trim().is_empty()) {
            return Err(ChatError::EmptyConversation);
        }
        if request.turns.len() > self.config.max_turns {
            return Err(ChatError::TooManyTurns(self.config.max_turns));
        }
        if request
            .turns
            .iter()
            .any(|t| t.text.chars().count() > self.config.max_message_length)
        {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }
        Ok(())
    }

    /// Run one request, reporting on `sink`.
    ///
    /// Failures after `start` are reported as an `error` frame followed by
    /// `end` and then returned. [`ChatError::Cancelled`] is returned without
    /// further output.
    pub async fn handle(
        &self,
        request: &ConversationRequest,
        sink: &EventSink,
    ) -> Result<TurnOutcome, ChatError> {
        self.validate(request)?;
        sink.emit(StreamEvent::Start).await?;

        match self.run(request, sink).await {
            Ok(outcome) => {
                sink.emit(StreamEvent::End).await?;
                info!(state = outcome.final_state.as_str(), "Request completed");
                Ok(outcome)
            }
            Err(ChatError::Cancelled) => {
                debug!("Client disconnected, request abandoned");
                Err(ChatError::Cancelled)
            }
            Err(e) => {
                error!(error = %e, "Request failed");
                sink.emit(StreamEvent::Error(e.to_string())).await?;
                sink.emit(StreamEvent::End).await?;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &ConversationRequest,
        sink: &EventSink,
    ) -> Result<TurnOutcome, ChatError> {
        let mut ctx = StepContext {
            summary: String::new(),
            outcome: TurnOutcome {
                final_state: DialogueState::INITIAL,
                conditions: request.prior.clone(),
                vehicle: None,
                itinerary: Vec::new(),
                finalize: None,
            },
        };

        let mut visited = HashSet::new();
        let mut state = DialogueState::INITIAL;
        loop {
            if !visited.insert(state) {
                return Err(ChatError::Internal(format!(
                    "dialogue revisited state {}",
                    state.as_str()
                )));
            }
            debug!(state = state.as_str(), "Dialogue step");
            self.step(state, request, &mut ctx, sink).await?;
            ctx.outcome.final_state = state;

            match state.next(&ctx.outcome.conditions) {
                Some(next) => {
                    validate_transition(state, next)?;
                    state = next;
                }
                None => break,
            }
        }

        Ok(ctx.outcome)
    }

    async fn step(
        &self,
        state: DialogueState,
        request: &ConversationRequest,
        ctx: &mut StepContext,
        sink: &EventSink,
    ) -> Result<(), ChatError> {
        match state {
            DialogueState::Summarize => {
                ctx.summary = self.summarizer.summarize(&request.turns).await?;
            }
            DialogueState::Evaluate => {
                ctx.outcome.conditions = self
                    .evaluator
                    .evaluate(&ctx.summary, &request.turns, &request.prior)
                    .await?;
            }
            DialogueState::AnswerGeneral => {
                self.answerer
                    .answer(&ctx.summary, request.latest_user_message(), sink)
                    .await?;
            }
            DialogueState::AssignVehicle => {
                let conditions = &ctx.outcome.conditions;
                let assignment =
                    vehicle::assign(conditions.party_size, conditions.has_accessibility_need);
                sink.text(vehicle::recommendation_message(&assignment)).await?;
                ctx.outcome.vehicle = Some(assignment);
            }
            DialogueState::GenerateItinerary => {
                let items = self
                    .planner
                    .plan(&ctx.outcome.conditions, request.today)
                    .await?;
                if items.is_empty() {
                    sink.text(EMPTY_ITINERARY_MESSAGE).await?;
                } else {
                    sink.emit(StreamEvent::ItineraryResult(items.clone())).await?;
                }
                ctx.outcome.itinerary = items;
            }
            DialogueState::Finalize => {
                let outcome = self
                    .finalizer
                    .finalize(
                        &ctx.summary,
                        &request.turns,
                        &request.draft,
                        &request.identity,
                        sink,
                    )
                    .await?;
                ctx.outcome.finalize = Some(outcome);
            }
            DialogueState::AwaitMoreInput => {
                debug!(
                    missing = ?ctx.outcome.conditions.missing_parameters(),
                    "Requesting more input"
                );
                sink.text(MORE_INPUT_MESSAGE).await?;
                sink.emit(StreamEvent::RequestMoreInput(ctx.outcome.conditions.clone()))
                    .await?;
            }
        }
        Ok(())
    }
}

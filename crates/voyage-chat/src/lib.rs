//! Dialogue engine for the trip-planning assistant.
//!
//! Summarizes the conversation, extracts trip conditions, and routes each
//! request through a small state machine: answer a question, ask for missing
//! trip details, plan an itinerary from the attraction knowledge base, or
//! dispatch a finished plan. Output is reported as ordered stream events.

pub mod answerer;
pub mod error;
pub mod evaluator;
pub mod finalizer;
pub mod orchestrator;
pub mod planner;
pub mod router;
pub mod sink;
pub mod summarizer;
pub mod vehicle;

pub use answerer::GeneralAnswerer;
pub use error::{ChatError, DispatchError};
pub use evaluator::IntentEvaluator;
pub use finalizer::{
    DispatchReceipt, DispatchRequest, FinalizeOutcome, Finalizer, HttpDispatcher,
    ItineraryDispatcher, RecordingDispatcher,
};
pub use orchestrator::{ChatOrchestrator, ConversationRequest, TurnOutcome};
pub use planner::{AttractionRetriever, ItineraryPlanner, QueryFormulator, ScheduleSynthesizer};
pub use router::{route, validate_transition, DialogueState};
pub use sink::EventSink;
pub use summarizer::ConversationSummarizer;

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use codec::{
    decode_frame, encode_frame, parse_itinerary_payload, DecodeError, EventDispatcher,
    FrameParser, RawFrame, StreamTranscript,
};
pub use config::VoyageConfig;
pub use error::{Result, VoyageError};
pub use events::{EventKind, StreamEvent};
pub use types::*;

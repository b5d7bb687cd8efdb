//! Translation from the character-chat client format to the upstream
//! Chat Completions format.
//!
//! Only requests are translated. All functions here are pure (no I/O).

pub mod inbound_types;
pub mod openai_types;
pub mod request;

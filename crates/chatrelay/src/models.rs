//! These models represent the objects passed around by the relay
//!
//! There are several different related formats we need to interact with:
//! - ui messages (id, role, parts), sent from the chat client to the relay
//! - ui message-stream parts, sent from the relay back to the chat client
//! - openai messages/tools, sent from the agent to the LLM
//! - tool calls, sent from the agent to the toolkits providing capabilities
//!
//! These all overlap to varying degrees. We always immediately convert those data models
//! into the internal structs using to/from helpers. Because of the need for compatibility,
//! the internal models are not an exact match to any of these formats.
pub mod message;
pub mod role;
pub mod tool;
pub mod ui;

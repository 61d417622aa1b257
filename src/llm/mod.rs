// LLM abstraction layer

pub mod provider;
pub mod openai;
pub mod google;
pub mod structured;

pub use provider::*;
pub use structured::{generate_structured, StructuredOptions, StructuredOutput};

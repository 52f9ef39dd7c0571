//! Concrete LLM providers

mod gemini;
mod groq;

pub use gemini::GeminiProvider;
pub use groq::GroqProvider;

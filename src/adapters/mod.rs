// Adapters layer: concrete implementations for external systems.
// Storage backends live under src/config (LocalStorage) next to the CLI config.

pub mod gemini;

pub use gemini::{GeminiClient, GeminiConnector};

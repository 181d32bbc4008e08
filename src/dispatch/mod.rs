// Dispatch Module - hybrid fast/fallback binding and the uniform call surface

pub mod hybrid;
pub mod provider;

pub use hybrid::{Dispatcher, DispatcherBuilder, DispatcherStatus};
pub use provider::{default_providers, fast_compiled, EngineProvider, FallbackProvider, FastProvider};

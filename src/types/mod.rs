// Public modules
pub mod completion;
pub mod message;
pub mod overrides;

// Re-exports
pub use completion::{CompletionEvent, Pricing, UsageEvent};
pub use message::{Message, Role};
pub use overrides::{ModelOverrides, OverrideKey, RawOverrides};

// unicache-common - Shared types, codecs, and the unified error for UniCache
//
// Every driver in unicache-client builds on these definitions, so they stay
// free of any transport concerns.

pub mod codec;
pub mod error;
pub mod script;
pub mod types;

// Re-export for convenience
pub use codec::*;
pub use error::*;
pub use script::*;
pub use types::*;

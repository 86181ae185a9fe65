pub mod cache;
pub mod citation;
pub mod classify;
pub mod fallback;
pub mod language;
pub mod lexicon;
pub mod normalize;
pub mod orchestrator;
pub mod policy;
pub mod rewrite;
pub mod scorer;
pub mod types;

pub use cache::*;
pub use citation::*;
pub use classify::*;
pub use fallback::*;
pub use normalize::*;
pub use orchestrator::*;
pub use policy::*;
pub use rewrite::*;
pub use scorer::*;
pub use types::*;

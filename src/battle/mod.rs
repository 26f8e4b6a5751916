pub mod config;
mod engine;
mod outcome;
mod stats;

pub use config::{BattleConfig, NarrationPolicy};
pub use engine::{BattleEngine, CycleReport};
pub use outcome::{classify, classify_strict, clean_narration};
pub use stats::apply_outcome;

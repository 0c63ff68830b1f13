pub mod completion;
pub mod directory;
pub mod engine;

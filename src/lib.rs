pub mod backend;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod normalize;
pub mod progress;
pub mod prompts;

pub mod bitmap_cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod debug;
pub mod error;
pub mod events;
pub mod input;
pub mod interpreter;
pub mod map;
pub mod overlay;
pub mod plugins;
pub mod reload;
pub mod runtime;
pub mod scene;
pub mod watch;

pub use error::FieldError;
pub use runtime::{run_with_overrides, FieldRuntime};

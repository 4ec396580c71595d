#![allow(dead_code)] // each test binary uses a different slice of the helpers

pub mod harness;
pub mod jobs;
pub mod strategies;

pub use harness::*;
pub use jobs::*;
pub use strategies::*;

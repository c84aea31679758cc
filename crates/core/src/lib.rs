#![forbid(unsafe_code)]

pub mod model;
pub mod profile;
pub mod scoring;
pub mod time;

pub use time::Clock;

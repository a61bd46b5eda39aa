//! Parallel growth driver for the book engine: expander workers, value
//! refresher, trace import, bonus SGF scanning and run configuration.

pub mod config;
pub mod driver;
pub mod expand;
pub mod html;
pub mod refresh;
pub mod sgf;
pub mod shared;
pub mod trace;

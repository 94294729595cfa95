pub mod error;
pub mod output;
pub mod parallel;
pub mod config;
pub mod vocab;
pub mod codec;
pub mod reweight;
pub mod table;
pub mod dump;
pub mod merge;
pub mod pieces;
pub mod aggregate;
pub mod attention;
pub mod inference;
pub mod convert;

pub use error::{CoocError, LineError, Result};

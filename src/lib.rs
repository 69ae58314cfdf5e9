//! # giftsmith
//!
//! Turns a YAML question bank into a GIFT file ready for Moodle import.
//!
//! The interesting work happens in the transform pipeline: every text field
//! of every question is folded through an ordered list of rewriting stages
//! (diagram compilation, image hosting or embedding, line breaks, LaTeX
//! handling) before the GIFT block is assembled. See [`processor::wrap`] for
//! the entry point.

pub mod bank;
pub mod config;
pub mod error;
pub mod gift;
pub mod image;
pub mod latex;
pub mod processor;
pub mod question;
pub mod remote;
pub mod transform;

pub use error::WrapError;
pub use processor::{wrap, WrapOptions};

//! Text extraction, document link discovery and field extraction.

pub mod extract;
pub mod links;
pub mod text;

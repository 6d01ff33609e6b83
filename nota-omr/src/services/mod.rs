//! External service clients

pub mod summarizer;

//! One targeted question at a time, and the parser for its answer

pub mod parser;
pub mod strategy;

pub use parser::parse_reply;
pub use strategy::{ClarificationQuestion, SelectableOption, next_question, question_for};

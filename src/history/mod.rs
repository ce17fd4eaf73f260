//! Undo/redo history of reversible events.

mod stack;

pub use stack::HistoryStack;

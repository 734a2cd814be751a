/// State management module
///
/// This module handles all application state, including:
/// - The capture workflow controller (workflow.rs)
/// - Shared data structures and the persisted record (data.rs)
/// - Date/time picker events and dismissal strategy (picker.rs)
/// - The key-value record store (store.rs)

pub mod data;
pub mod picker;
pub mod store;
pub mod workflow;

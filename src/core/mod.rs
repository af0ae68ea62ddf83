pub mod app_state;
pub mod catalog;
pub mod command_builder;
pub mod context_tree;
pub mod store;
pub mod theme;
pub mod token_budget;

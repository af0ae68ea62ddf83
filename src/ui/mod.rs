pub mod context_view;

//! Built-in tool implementations.
//!
//! Each sub-module implements one tool and a `register()` that adds it to a
//! [`ToolRegistry`](crate::tools::ToolRegistry).

pub mod fetch_url;
pub mod python_repl;
pub mod read_file;
pub mod search_knowledge;
pub mod terminal;

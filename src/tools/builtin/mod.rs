//! Built-in tools shipped with this crate. Each is a self-contained module
//! implementing the `Tool` trait; registered at startup via
//! `ToolRegistry::register`.

mod calculator;
mod read_file;
mod summarize_text;
mod web_search;

pub use calculator::CalculatorTool;
pub use read_file::ReadFileTool;
pub use summarize_text::SummarizeTextTool;
pub use web_search::WebSearchTool;

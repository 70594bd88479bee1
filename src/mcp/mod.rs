pub mod types;
pub mod transport;
pub mod client;

pub use client::McpClient;
pub use types::{McpTool, CallToolResult, McpContent};

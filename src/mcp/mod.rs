// MCP protocol surface: JSON-RPC stdio server and tool handlers

pub mod server;
pub mod tools;

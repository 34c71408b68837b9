#![allow(clippy::missing_errors_doc)]

//! # Engram MCP
//!
//! JSON-RPC tool dispatcher for the Engram memory engine.
//!
//! Exposes four coarse tools (`memory_store`, `memory_retrieve`,
//! `memory_analyze`, `memory_system`), each with an internal operation
//! selector, shared parameter validation, and per-scope access rules.
//! Transport framing beyond line-delimited stdio lives outside this
//! crate; anything that can deliver a JSON-RPC request can drive
//! [`EngramMcpServer::handle_request`].

pub mod jsonrpc;
pub mod protocol;
pub mod server;
pub mod tools;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::{EngramMcpServer, OperationCall, OperationRegistry, ServerState};

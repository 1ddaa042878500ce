//! `ag-gateway`: the agent loop, the OpenAI-compatible HTTP surface and the
//! `agentgate` CLI.

pub mod api;
pub mod cli;
pub mod runtime;
pub mod state;

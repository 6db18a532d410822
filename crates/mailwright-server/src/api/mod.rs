//! HTTP API handlers.
//!
//! - `GET /tools` lists tool definitions
//! - `GET /tools/{name}` returns one definition
//! - `POST /tools/{name}` invokes a tool with a JSON arguments object

pub mod tools;

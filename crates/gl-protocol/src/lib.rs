//! gl-protocol: Wire protocol for the guider event server
//!
//! The guider listens on a TCP port and speaks line-delimited JSON:
//! JSON-RPC style requests and responses, interleaved with unsolicited
//! event notifications. This crate defines those messages and a tokio
//! codec that splits the byte stream into them.

pub mod codec;
pub mod error;
pub mod event;
pub mod rpc;

pub use codec::{GuiderCodec, GuiderMessage, MAX_LINE_LENGTH};
pub use error::{ProtocolError, RpcError, RpcErrorKind};
pub use event::{GuideStep, GuiderEvent};
pub use rpc::{RpcErrorObject, RpcRequest, RpcResponse, JSONRPC_VERSION};

/// First port of the guider event server; instance `n` listens on
/// `BASE_PORT + n - 1`.
pub const BASE_PORT: u16 = 4400;

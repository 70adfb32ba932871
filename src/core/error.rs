use thiserror::Error;
use serde::{Serialize, Deserialize};
use std::result::Result;
use super::ring::Digest;
use crate::rpc::RpcError;

/// Declined key operations, sent back to remote callers as values
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyError {
	#[error("key {0:?} doesn't exist")]
	NotFound(String),
	#[error("key {key:?} (digest {digest}) is not owned by {addr}")]
	NotResponsible {
		key: String,
		digest: Digest,
		addr: String
	}
}

#[derive(Error, Debug)]
pub enum DhtError {
	#[error("RPC error: {0}")]
	RpcError(#[from] RpcError),
	#[error("{0}")]
	KeyError(#[from] KeyError),
	#[error("ring connectivity lost while looking up digest {id}: {message}")]
	RingDisconnected {
		id: Digest,
		message: String
	},
	#[error("peer {addr} unreachable: {message}")]
	PeerUnreachable {
		addr: String,
		message: String
	},
	#[error("failed to join ring via {addr}: {message}")]
	JoinFailure {
		addr: String,
		message: String
	},
	#[error("invalid config: {0}")]
	InvalidConfig(String),
	#[error("IO error")]
	IoError(#[from] std::io::Error),
	#[error("task failed: {0}")]
	JoinError(#[from] tokio::task::JoinError),
	#[error("shutdown signal lost")]
	ShutdownError(#[from] tokio::sync::watch::error::SendError<bool>)
}

pub type DhtResult<T> = Result<T, DhtError>;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
	#[error("{method} call to {addr} timed out after {timeout:?}")]
	Timeout {
		method: &'static str,
		addr: String,
		timeout: Duration
	},
	#[error("all {0} call ids are in use")]
	CallIdExhausted(u64),
	#[error("call already forwarded {0} times")]
	HopLimit(u32),
	#[error("caller is not started")]
	NotStarted,
	#[error("caller stopped before the reply arrived")]
	Disconnected,
	#[error("unexpected reply for {got} (expecting {expected})")]
	UnexpectedReply {
		expected: &'static str,
		got: String
	},
	#[error("codec error: {0}")]
	CodecError(#[from] bincode::Error),
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error)
}

pub type RpcResult<T> = Result<T, RpcError>;

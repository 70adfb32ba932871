//! Correlated request/reply calls over the framed TCP transport.
//!
//! A [`Caller`] declares remote functions and waits for their replies.
//! A [`Callee`] maps each method tag to exactly one handler. Forwarding
//! handlers may relay an in-flight call to another callee, which then
//! replies straight to the original caller.

pub mod caller;
pub mod callee;
pub mod error;
pub mod transport;

pub use caller::*;
pub use callee::*;
pub use error::*;

use serde::{Serialize, Deserialize, de::DeserializeOwned};

pub type CallId = u64;

/// A remote function: the argument type names the method and fixes the reply type
pub trait Request: Serialize + DeserializeOwned + Send + 'static {
	type Reply: Serialize + DeserializeOwned + Send + 'static;
	/// Tag used to pick the handler on the callee side
	const METHOD: &'static str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
	pub id: CallId,
	// replies always go back to this address, even after forwarding
	pub caller_addr: String,
	pub method: String,
	// number of times this call has been forwarded
	pub hops: u32,
	pub arg: Vec<u8>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
	pub id: CallId,
	pub method: String,
	pub value: Vec<u8>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Envelope {
	Call(Call),
	Reply(Reply)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> RpcResult<Vec<u8>> {
	Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> RpcResult<T> {
	Ok(bincode::deserialize(bytes)?)
}

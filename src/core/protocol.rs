// Arguments and replies of the remote functions exposed by a ring node
use serde::{Serialize, Deserialize};
use crate::rpc::Request;
use super::{
	ring::Digest,
	data_store::{Entry, Key, Value},
	error::KeyError,
	Node
};

// Heartbeat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsAlive;

impl Request for IsAlive {
	type Reply = bool;
	const METHOD: &'static str = "is_alive";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notify {
	pub node: Node
}

impl Request for Notify {
	type Reply = ();
	const METHOD: &'static str = "notify";
}

// Forwarded along the ring until the successor of id is known
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSuccessor {
	pub id: Digest
}

impl Request for FindSuccessor {
	type Reply = Node;
	const METHOD: &'static str = "find_successor";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPredecessor;

impl Request for GetPredecessor {
	type Reply = Node;
	const METHOD: &'static str = "get_predecessor";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSuccessor;

impl Request for GetSuccessor {
	type Reply = Node;
	const METHOD: &'static str = "get_successor";
}

// Entries whose bucket lies in (start, end]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetKeyRange {
	pub start: Digest,
	pub end: Digest
}

impl Request for GetKeyRange {
	type Reply = Vec<Entry>;
	const METHOD: &'static str = "get_key_range";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFingers;

impl Request for GetFingers {
	type Reply = Vec<Node>;
	const METHOD: &'static str = "get_fingers";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Get {
	pub key: Key
}

impl Request for Get {
	type Reply = Result<Value, KeyError>;
	const METHOD: &'static str = "get";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Put {
	pub key: Key,
	pub value: Value
}

impl Request for Put {
	type Reply = Result<(), KeyError>;
	const METHOD: &'static str = "put";
}

// Store a copy without the ownership check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutBackup {
	pub key: Key,
	pub value: Value
}

impl Request for PutBackup {
	type Reply = ();
	const METHOD: &'static str = "put_backup";
}

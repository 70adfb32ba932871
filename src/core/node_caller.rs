use crate::rpc::{Caller, RemoteFn};
use super::{
	protocol::*,
	ring::Digest,
	data_store::{Entry, Key, Value},
	config::Config,
	error::DhtResult,
	Node
};

/// Typed wrappers for all remote calls to a ring node
///
/// All the functions below are RPCs.
/// Target nodes are given by their callee address (`<host>:<port>`).
#[derive(Clone)]
pub struct NodeCaller {
	caller: Caller,
	is_alive: RemoteFn<IsAlive>,
	notify: RemoteFn<Notify>,
	find_successor: RemoteFn<FindSuccessor>,
	get_predecessor: RemoteFn<GetPredecessor>,
	get_successor: RemoteFn<GetSuccessor>,
	get_key_range: RemoteFn<GetKeyRange>,
	get_fingers: RemoteFn<GetFingers>,
	get: RemoteFn<Get>,
	put: RemoteFn<Put>,
	put_backup: RemoteFn<PutBackup>
}

impl NodeCaller {
	pub fn new(caller: Caller, config: &Config) -> Self {
		let topology = config.topology_timeout();
		let data = config.data_timeout();
		NodeCaller {
			is_alive: caller.declare(topology),
			notify: caller.declare(topology),
			find_successor: caller.declare(topology),
			get_predecessor: caller.declare(topology),
			get_successor: caller.declare(topology),
			get_key_range: caller.declare(config.key_range_timeout()),
			get_fingers: caller.declare(topology),
			get: caller.declare(data),
			put: caller.declare(data),
			put_backup: caller.declare(data),
			caller
		}
	}

	pub fn caller(&self) -> &Caller {
		&self.caller
	}

	/// False on any failure
	pub async fn is_alive(&self, addr: &str) -> bool {
		self.is_alive.call(addr, IsAlive).await.unwrap_or(false)
	}

	pub async fn notify(&self, addr: &str, node: Node) -> DhtResult<()> {
		Ok(self.notify.call(addr, Notify { node }).await?)
	}

	pub async fn find_successor(&self, addr: &str, id: Digest) -> DhtResult<Node> {
		Ok(self.find_successor.call(addr, FindSuccessor { id }).await?)
	}

	pub async fn get_predecessor(&self, addr: &str) -> DhtResult<Node> {
		Ok(self.get_predecessor.call(addr, GetPredecessor).await?)
	}

	pub async fn get_successor(&self, addr: &str) -> DhtResult<Node> {
		Ok(self.get_successor.call(addr, GetSuccessor).await?)
	}

	pub async fn get_key_range(&self, addr: &str, start: Digest, end: Digest) -> DhtResult<Vec<Entry>> {
		Ok(self.get_key_range.call(addr, GetKeyRange { start, end }).await?)
	}

	pub async fn get_fingers(&self, addr: &str) -> DhtResult<Vec<Node>> {
		Ok(self.get_fingers.call(addr, GetFingers).await?)
	}

	pub async fn get(&self, addr: &str, key: Key) -> DhtResult<Value> {
		Ok(self.get.call(addr, Get { key }).await??)
	}

	pub async fn put(&self, addr: &str, key: Key, value: Value) -> DhtResult<()> {
		Ok(self.put.call(addr, Put { key, value }).await??)
	}

	pub async fn put_backup(&self, addr: &str, key: Key, value: Value) -> DhtResult<()> {
		Ok(self.put_backup.call(addr, PutBackup { key, value }).await?)
	}
}

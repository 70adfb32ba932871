use log::debug;
use tokio::sync::watch;
use crate::{
	core::{
		ring::{Digest, KeySpace},
		data_store::{Key, Value},
		Config,
		DhtError,
		DhtResult,
		KeyError,
		Node,
		NodeCaller
	},
	rpc::Caller
};

/// Client that reaches the ring through one entry node
pub struct DhtClient {
	caller: NodeCaller,
	entry: String,
	keyspace: KeySpace,
	// replies stop being received once dropped
	_tx: watch::Sender<bool>
}

/// Connect to the ring via entry, receiving replies at bind_addr
pub async fn setup_client(entry: &str, bind_addr: &str, config: &Config) -> DhtResult<DhtClient> {
	let keyspace = config.keyspace()?;
	let caller = Caller::new(bind_addr, config.max_pending_calls);
	let (tx, rx) = watch::channel(false);
	caller.start(rx).await?;

	Ok(DhtClient {
		caller: NodeCaller::new(caller, config),
		entry: entry.to_string(),
		keyspace,
		_tx: tx
	})
}

fn is_misrouted<T>(result: &DhtResult<T>) -> bool {
	matches!(result, Err(DhtError::KeyError(KeyError::NotResponsible { .. })))
}

impl DhtClient {
	pub fn entry(&self) -> &str {
		&self.entry
	}

	pub fn caller(&self) -> &NodeCaller {
		&self.caller
	}

	pub fn digest(&self, key: &str) -> Digest {
		self.keyspace.hash(key.as_bytes())
	}

	/// Node currently owning key
	pub async fn locate(&self, key: &str) -> DhtResult<Node> {
		self.caller.find_successor(&self.entry, self.digest(key)).await
	}

	// Ownership may move between lookup and access, so a misrouted
	// access is looked up again once.
	pub async fn get(&self, key: &str) -> DhtResult<Value> {
		let node = self.locate(key).await?;
		let result = self.caller.get(&node.addr, key.to_string()).await;
		if !is_misrouted(&result) {
			return result;
		}
		debug!("{} declined {:?}, locating again", node, key);
		let node = self.locate(key).await?;
		self.caller.get(&node.addr, key.to_string()).await
	}

	pub async fn put(&self, key: Key, value: Value) -> DhtResult<()> {
		let node = self.locate(&key).await?;
		let result = self.caller.put(&node.addr, key.clone(), value.clone()).await;
		if !is_misrouted(&result) {
			return result;
		}
		debug!("{} declined {:?}, locating again", node, key);
		let node = self.locate(&key).await?;
		self.caller.put(&node.addr, key, value).await
	}

	pub async fn fingers(&self, addr: &str) -> DhtResult<Vec<Node>> {
		self.caller.get_fingers(addr).await
	}

	pub async fn successor(&self, addr: &str) -> DhtResult<Node> {
		self.caller.get_successor(addr).await
	}

	pub async fn predecessor(&self, addr: &str) -> DhtResult<Node> {
		self.caller.get_predecessor(addr).await
	}
}

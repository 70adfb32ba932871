use std::{
	future::Future,
	net::SocketAddr,
	sync::{Arc, RwLock},
	time::Duration
};
use futures::future;
use serde::{Serialize, Deserialize};
use tokio::{sync::watch, task::JoinHandle};
use log::{info, warn, debug, error};
use super::{
	ring::*,
	config::*,
	data_store::*,
	protocol::*,
	node_caller::NodeCaller,
	error::{
		DhtResult,
		KeyError,
		DhtError::{InvalidConfig, JoinFailure, PeerUnreachable, RingDisconnected}
	}
};
use crate::{
	rpc::{Caller, Callee, Forward, Handled},
	server::ServerManager
};

// Data part of the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
	pub id: Digest,
	pub addr: String
}

impl std::fmt::Display for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Node({}, {})", self.id, self.addr)
	}
}

// Neighbor pointers, guarded together
#[derive(Debug)]
struct RingState {
	// None means unknown
	predecessor: Option<Node>,
	// successor of the successor, used when the successor dies
	double_successor: Option<Node>,
	// finger_table[i] approximates the successor of id + 2^i,
	// finger_table[0] is the successor
	finger_table: Vec<Node>
}

#[derive(Clone)]
pub struct NodeServer {
	node: Node,
	keyspace: KeySpace,
	store: DataStore,
	config: Config,
	state: Arc<RwLock<RingState>>,
	caller: NodeCaller
}

// Caller listens on the same host as the callee
fn caller_bind_addr(callee_addr: &str, port: u16) -> String {
	let host = match callee_addr.rsplit_once(':') {
		Some((host, _)) => host,
		None => callee_addr
	};
	format!("{}:{}", host, port)
}

impl NodeServer {
	pub fn new(node: Node, config: Config) -> DhtResult<Self> {
		let keyspace = config.keyspace()?;
		if node.id >= keyspace.size() {
			return Err(InvalidConfig(format!("{} lies outside a ring of size {}", node, keyspace.size())));
		}
		// peers send replies to the caller on the same host
		if let Ok(addr) = node.addr.parse::<SocketAddr>() {
			if addr.ip().is_unspecified() {
				return Err(InvalidConfig(format!("{} is not reachable by peers", node.addr)));
			}
		}

		// init a ring with only one node
		// (see second part of n.join in Figure 6)
		let finger_table = vec![node.clone(); keyspace.num_fingers()];
		let caller = Caller::new(
			&caller_bind_addr(&node.addr, config.caller_port),
			config.max_pending_calls
		);

		Ok(NodeServer {
			store: DataStore::new(keyspace),
			caller: NodeCaller::new(caller, &config),
			state: Arc::new(RwLock::new(RingState {
				predecessor: None,
				double_successor: None,
				finger_table
			})),
			node,
			keyspace,
			config
		})
	}

	pub fn node(&self) -> &Node {
		&self.node
	}

	pub fn keyspace(&self) -> &KeySpace {
		&self.keyspace
	}

	pub fn store(&self) -> &DataStore {
		&self.store
	}

	pub fn caller(&self) -> &NodeCaller {
		&self.caller
	}

	fn is_self(&self, node: &Node) -> bool {
		node.addr == self.node.addr
	}

	pub fn get_successor(&self) -> Node {
		self.state.read().unwrap().finger_table[0].clone()
	}

	fn set_successor(&self, node: Node) {
		self.state.write().unwrap().finger_table[0] = node;
	}

	pub fn get_predecessor(&self) -> Option<Node> {
		self.state.read().unwrap().predecessor.clone()
	}

	pub fn set_predecessor(&self, node: Option<Node>) {
		self.state.write().unwrap().predecessor = node;
	}

	pub fn get_double_successor(&self) -> Option<Node> {
		self.state.read().unwrap().double_successor.clone()
	}

	pub fn get_finger_table(&self) -> Vec<Node> {
		self.state.read().unwrap().finger_table.clone()
	}

	/// Start the server
	/// Returns once the listeners are up and the node has joined
	pub async fn start(&self, introducer: Option<&str>) -> DhtResult<ServerManager> {
		// channel used to shutdown (true means shutdown)
		// Dropping tx on an early return stops everything started so far.
		let (tx, rx) = watch::channel(false);

		// Listen locally first
		let listener = self.callee().start(&self.node.addr, rx.clone()).await?;
		let caller_handle = self.caller.caller().start(rx.clone()).await?;
		debug!("{}: receiving replies at {:?}", self.node, self.caller.caller().addr());

		// Join node after server starts
		if let Some(addr) = introducer {
			if let Err(e) = self.join(addr).await {
				return Err(JoinFailure {
					addr: addr.to_string(),
					message: e.to_string()
				});
			}
		}

		// Periodically stabilize
		let server = self.clone();
		let interval = Duration::from_millis(self.config.stabilize_interval);
		let backoff = Duration::from_millis(self.config.stabilize_backoff);
		let stabilize_handle = self.spawn_periodic("stabilize", self.config.stabilize_interval, rx.clone(), move || {
			let server = server.clone();
			async move {
				match server.stabilize().await {
					Ok(_) => interval,
					Err(e) => {
						warn!("{}: stabilize failed, retrying in {:?}: {}", server.node, backoff, e);
						backoff
					}
				}
			}
		});

		// Periodically refresh finger table
		let server = self.clone();
		let interval = Duration::from_millis(self.config.fix_finger_interval);
		let num_fingers = self.keyspace.num_fingers();
		let mut index = 0;
		let fix_finger_handle = self.spawn_periodic("fix_finger", self.config.fix_finger_interval, rx.clone(), move || {
			// rotate over [1, num_fingers)
			index = if index + 1 >= num_fingers { 1 } else { index + 1 };
			let server = server.clone();
			let i = index;
			async move {
				if let Err(e) = server.fix_finger(i).await {
					error!("{}: failed to fix finger {}: {}", server.node, i, e);
				}
				interval
			}
		});

		// Periodically probe the predecessor
		let server = self.clone();
		let interval = Duration::from_millis(self.config.check_predecessor_interval);
		let check_predecessor_handle = self.spawn_periodic("check_predecessor", self.config.check_predecessor_interval, rx.clone(), move || {
			let server = server.clone();
			async move {
				server.check_predecessor().await;
				interval
			}
		});

		info!("{}: listening at {}", self.node, listener.addr);
		// An aggregated handle for all tasks
		let joined_handle = future::join_all(vec![
			listener.handle,
			caller_handle,
			stabilize_handle,
			fix_finger_handle,
			check_predecessor_handle
		]);

		Ok(ServerManager {
			handle: joined_handle,
			tx
		})
	}

	// Dispatch table for all remote functions
	fn callee(&self) -> Callee {
		let mut callee = Callee::new(self.config.max_forward_hops);

		callee.implement(|_: IsAlive| future::ready(true));

		let server = self.clone();
		callee.implement(move |req: Notify| {
			let server = server.clone();
			async move { server.notify(req.node).await }
		});

		let server = self.clone();
		callee.implement_forwarding(move |req: FindSuccessor, forward: Forward<FindSuccessor>| {
			let server = server.clone();
			async move { server.find_successor_rpc(req, forward).await }
		});

		let server = self.clone();
		callee.implement(move |_: GetPredecessor| {
			// answer ourselves when the predecessor is unknown
			future::ready(server.get_predecessor().unwrap_or_else(|| server.node.clone()))
		});

		let server = self.clone();
		callee.implement(move |_: GetSuccessor| future::ready(server.get_successor()));

		let server = self.clone();
		callee.implement(move |req: GetKeyRange| future::ready(server.get_key_range(req.start, req.end)));

		let server = self.clone();
		callee.implement(move |_: GetFingers| future::ready(server.get_finger_table()));

		let server = self.clone();
		callee.implement(move |req: Get| future::ready(server.get(&req.key)));

		let server = self.clone();
		callee.implement(move |req: Put| {
			let server = server.clone();
			async move { server.put(req.key, req.value).await }
		});

		let server = self.clone();
		callee.implement(move |req: PutBackup| future::ready(server.put_backup(req.key, req.value)));

		callee
	}

	// Run task every interval until shutdown
	// task returns the delay before its next run (0 interval disables it)
	fn spawn_periodic<F, Fut>(
		&self,
		name: &'static str,
		interval: u64,
		mut shutdown: watch::Receiver<bool>,
		mut task: F
	) -> JoinHandle<()>
	where
		F: FnMut() -> Fut + Send + 'static,
		Fut: Future<Output = Duration> + Send + 'static
	{
		let node = self.node.clone();
		tokio::spawn(async move {
			if interval == 0 {
				return;
			}
			let mut delay = Duration::from_millis(interval);
			loop {
				tokio::select! {
					_ = tokio::time::sleep(delay) => (),
					_ = shutdown.changed() => {
						debug!("{}: {} task stopped gracefully", node, name);
						break;
					}
				};
				delay = task().await;
			}
		})
	}

	// Figure 7: n.join
	pub async fn join(&self, introducer: &str) -> DhtResult<()> {
		debug!("{}: joining {}", self.node, introducer);
		self.set_predecessor(None);
		let succ = self.caller.find_successor(introducer, self.node.id).await?;
		if succ.id == self.node.id && !self.is_self(&succ) {
			return Err(InvalidConfig(format!("digest {} is already taken by {}", succ.id, succ)));
		}
		self.set_successor(succ);
		self.update_double_successor().await;
		info!("{}: joined via {}, keyspace is ({}, {}]", self.node, introducer, self.node.id, self.get_successor().id);
		Ok(())
	}

	// Figure 7: n.stabilize
	// An error means the successor was found dead and has been replaced.
	pub async fn stabilize(&self) -> DhtResult<()> {
		let (succ, pred) = {
			let mut state = self.state.write().unwrap();
			let succ = state.finger_table[0].clone();
			if state.predecessor.is_none() {
				debug!("{}: empty predecessor, defaulting to successor {}", self.node, succ);
			}
			let pred = state.predecessor.get_or_insert_with(|| succ.clone()).clone();
			(succ, pred)
		};

		let x = if self.is_self(&succ) {
			// Avoid making an RPC call to ourselves
			pred
		}
		else {
			match self.caller.get_predecessor(&succ.addr).await {
				Ok(x) => x,
				Err(e) => {
					error!("{}: successor {} failed to respond: {}", self.node, succ, e);
					self.replace_dead_successor(&succ).await;
					return Err(PeerUnreachable {
						addr: succ.addr,
						message: e.to_string()
					});
				}
			}
		};

		if in_range(x.id, self.node.id, succ.id) && !self.is_self(&x) {
			if self.caller.is_alive(&x.addr).await {
				info!("{}: new successor {}", self.node, x);
				self.set_successor(x);
			}
			else {
				warn!("{}: ignoring unresponsive successor candidate {}", self.node, x);
			}
		}

		let succ = self.get_successor();
		if self.is_self(&succ) {
			self.notify(self.node.clone()).await;
		}
		else if let Err(e) = self.caller.notify(&succ.addr, self.node.clone()).await {
			// can only be fixed by stabilizing again
			warn!("{}: failed to notify successor {}: {}", self.node, succ, e);
		}
		// the successor's own successor may have moved too
		self.update_double_successor().await;
		Ok(())
	}

	// Skip a dead successor without waiting for the ring to re-stabilize
	async fn replace_dead_successor(&self, dead: &Node) {
		let new_succ = {
			let mut state = self.state.write().unwrap();
			let new_succ = state.double_successor.clone()
				.filter(|n| n.addr != dead.addr)
				.or_else(|| state.finger_table.iter().find(|f| f.addr != dead.addr).cloned())
				.unwrap_or_else(|| self.node.clone());

			for finger in state.finger_table.iter_mut() {
				if finger.addr == dead.addr {
					*finger = new_succ.clone();
				}
			}
			state.finger_table[0] = new_succ.clone();
			if state.predecessor.as_ref().map_or(false, |p| p.addr == dead.addr) {
				state.predecessor = None;
			}
			state.double_successor = None;
			new_succ
		};

		warn!("{}: replaced dead successor {} with {}", self.node, dead, new_succ);
		self.update_double_successor().await;
	}

	// Ask the successor for the node right after it
	pub async fn update_double_successor(&self) {
		let succ = self.get_successor();
		let id = self.keyspace.add(succ.id, 1);
		let result = if self.is_self(&succ) {
			self.find_successor(id).await
		}
		else {
			self.caller.find_successor(&succ.addr, id).await
		};

		match result {
			Ok(n) => {
				debug!("{}: double successor is {}", self.node, n);
				self.state.write().unwrap().double_successor = Some(n);
			},
			Err(e) => warn!("{}: failed to find double successor: {}", self.node, e)
		};
	}

	// Figure 7: n.fix_fingers
	// finger 0 is maintained by stabilize
	pub async fn fix_finger(&self, index: usize) -> DhtResult<()> {
		if index == 0 || index >= self.keyspace.num_fingers() {
			return Ok(());
		}
		let start = self.keyspace.finger_start(self.node.id, index);
		let n = self.find_successor(start).await?;

		let mut state = self.state.write().unwrap();
		if state.finger_table[index] != n {
			debug!("{}: finger {} (start {}) now points to {}", self.node, index, start, n);
			state.finger_table[index] = n;
		}
		Ok(())
	}

	// Health check of the predecessor
	pub async fn check_predecessor(&self) {
		let pred = match self.get_predecessor() {
			Some(p) if !self.is_self(&p) => p,
			_ => return
		};
		if self.caller.is_alive(&pred.addr).await {
			return;
		}

		warn!("{}: predecessor {} failed a health check", self.node, pred);
		{
			let mut state = self.state.write().unwrap();
			// it may have been replaced during the probe
			if state.predecessor.as_ref() == Some(&pred) {
				state.predecessor = None;
			}
		}
		self.update_double_successor().await;
	}

	// Figure 4: n.closest_preceding_finger
	// finger 0 is not considered
	pub fn closest_preceding_node(&self, id: Digest) -> Node {
		let state = self.state.read().unwrap();
		for finger in state.finger_table.iter().skip(1).rev() {
			if in_range(finger.id, self.node.id, id) {
				return finger.clone();
			}
		}
		self.node.clone()
	}

	// Closest preceding node, or the successor when the table points back at us
	fn next_hop(&self, id: Digest, succ: &Node) -> Node {
		let target = self.closest_preceding_node(id);
		if self.is_self(&target) {
			debug!("{}: no finger precedes {}, using successor {}", self.node, id, succ);
			succ.clone()
		}
		else {
			target
		}
	}

	// Figure 4: n.find_successor
	pub async fn find_successor(&self, id: Digest) -> DhtResult<Node> {
		let succ = self.get_successor();
		if in_range_end_inclusive(id, self.node.id, succ.id) {
			return Ok(succ);
		}

		let target = self.next_hop(id, &succ);
		match self.caller.find_successor(&target.addr, id).await {
			Ok(n) => Ok(n),
			Err(e) => {
				warn!("{}: find_successor({}) via {} failed, retrying via successor: {}", self.node, id, target, e);
				self.caller.find_successor(&succ.addr, id).await
					.map_err(|e| RingDisconnected {
						id,
						message: e.to_string()
					})
			}
		}
	}

	// Remote find_successor: the call is passed along the ring
	// and the node knowing the answer replies to the original caller
	async fn find_successor_rpc(&self, req: FindSuccessor, forward: Forward<FindSuccessor>) -> Handled<Node> {
		let id = req.id;
		let succ = self.get_successor();
		if in_range_end_inclusive(id, self.node.id, succ.id) {
			return Handled::Reply(succ);
		}

		let target = self.next_hop(id, &succ);
		debug!("{}: passing find_successor({}) from {} to {}", self.node, id, forward.caller_addr(), target);
		if let Err(e) = forward.forward(&target.addr, req.clone()).await {
			warn!("{}: failed to pass find_successor({}) to {}: {}", self.node, id, target, e);
			if target.addr == succ.addr || forward.forward(&succ.addr, req).await.is_err() {
				error!("{}: find_successor({}) can't make progress, dropping it", self.node, id);
			}
		}
		Handled::Forwarded
	}

	// Figure 7: n.notify
	// The accepted predecessor's keys are copied here as a backup.
	pub async fn notify(&self, node: Node) {
		{
			let mut state = self.state.write().unwrap();
			if let Some(p) = state.predecessor.as_ref() {
				if !in_range(node.id, p.id, self.node.id) {
					return;
				}
			}
			state.predecessor = Some(node.clone());
		}
		info!("{}: new predecessor set in notify: {}", self.node, node);

		if !self.is_self(&node) {
			match self.caller.get_key_range(&node.addr, self.node.id, node.id).await {
				Ok(entries) => {
					debug!("{}: copied {} entries from {}", self.node, entries.len(), node);
					self.store.merge(entries);
				},
				Err(e) => error!("{}: failed to copy keys from {}: {}", self.node, node, e)
			};
		}
		self.update_double_successor().await;
	}

	pub fn is_local_responsible(&self, id: Digest) -> bool {
		match self.get_predecessor() {
			Some(p) => in_range_end_inclusive(id, p.id, self.node.id),
			None => false
		}
	}

	fn check_responsible(&self, key: &str) -> Result<(), KeyError> {
		let digest = self.store.bucket_of(key);
		if self.is_local_responsible(digest) {
			Ok(())
		}
		else {
			debug!("{}: key digest {} is none of my business", self.node, digest);
			Err(KeyError::NotResponsible {
				key: key.to_string(),
				digest,
				addr: self.node.addr.clone()
			})
		}
	}

	// Get key stored at this node
	pub fn get(&self, key: &str) -> Result<Value, KeyError> {
		self.check_responsible(key)?;
		self.store.get(key)
	}

	// Set key at this node and back it up at the successor
	pub async fn put(&self, key: Key, value: Value) -> Result<(), KeyError> {
		self.check_responsible(&key)?;
		self.store.put(key.clone(), value.clone());

		let succ = self.get_successor();
		if !self.is_self(&succ) {
			if let Err(e) = self.caller.put_backup(&succ.addr, key, value).await {
				// the next notify from us copies it again
				warn!("{}: failed to back up key at {}: {}", self.node, succ, e);
			}
		}
		Ok(())
	}

	pub fn put_backup(&self, key: Key, value: Value) {
		self.store.put(key, value);
	}

	pub fn get_key_range(&self, start: Digest, end: Digest) -> Vec<Entry> {
		self.store.get_range(start, end)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::error::DhtError;

	fn server(id: Digest, bits: u32) -> NodeServer {
		let node = Node {
			id,
			addr: format!("127.0.0.1:{}", 19000 + id)
		};
		let config = Config {
			bits,
			..Config::default()
		};
		NodeServer::new(node, config).unwrap()
	}

	fn node(id: Digest) -> Node {
		Node {
			id,
			addr: format!("127.0.0.1:{}", 19000 + id)
		}
	}

	#[test]
	fn test_invalid_config() {
		let config = Config {
			bits: 0,
			..Config::default()
		};
		assert!(NodeServer::new(node(0), config).is_err());
		let config = Config {
			bits: 3,
			..Config::default()
		};
		assert!(NodeServer::new(node(8), config).is_err());
		let unspecified = Node {
			id: 1,
			addr: "0.0.0.0:2001".to_string()
		};
		assert!(matches!(
			NodeServer::new(unspecified, Config::default()),
			Err(DhtError::InvalidConfig(_))
		));
		assert_eq!(caller_bind_addr("10.0.0.1:2001", 2000), "10.0.0.1:2000");
		assert_eq!(caller_bind_addr("[::1]:2001", 0), "[::1]:0");
	}

	/// A stabilized one-node ring owns the whole key space
	#[tokio::test]
	async fn test_solo_ring() -> DhtResult<()> {
		let s = server(5, 4);
		assert!(!s.is_local_responsible(5));
		// no RPC is needed on a solo ring
		s.stabilize().await?;
		assert_eq!(s.get_predecessor(), Some(node(5)));
		assert_eq!(s.get_successor(), node(5));
		for id in 0..16 {
			assert!(s.is_local_responsible(id));
			assert_eq!(s.find_successor(id).await?, node(5));
		}

		s.put("k".to_string(), vec![7]).await?;
		assert_eq!(s.get("k")?, vec![7]);
		assert_eq!(s.get("missing"), Err(KeyError::NotFound("missing".to_string())));

		// converged already
		s.stabilize().await?;
		assert_eq!(s.get_predecessor(), Some(node(5)));
		assert_eq!(s.get_finger_table(), vec![node(5); 3]);
		Ok(())
	}

	#[test]
	fn test_closest_preceding_node() {
		let s = server(0, 3);
		{
			let mut state = s.state.write().unwrap();
			state.finger_table = vec![node(1), node(3)];
		}
		assert_eq!(s.closest_preceding_node(6), node(3));
		assert_eq!(s.closest_preceding_node(0), node(3));
		// finger 0 is never chosen
		assert_eq!(s.closest_preceding_node(2), node(0));
		assert_eq!(s.next_hop(2, &node(1)), node(1));
	}

	#[tokio::test]
	async fn test_local_lookup() -> DhtResult<()> {
		let s = server(0, 3);
		s.set_successor(node(3));
		assert_eq!(s.get_finger_table()[0], node(3));
		assert_eq!(s.find_successor(1).await?, node(3));
		assert_eq!(s.find_successor(3).await?, node(3));
		Ok(())
	}

	/// Lookups fail once neither the closest finger nor the successor answers
	#[tokio::test]
	async fn test_ring_disconnected() -> DhtResult<()> {
		// nothing listens at the ports of node 1 and node 3
		let s = server(0, 3);
		let (_tx, rx) = watch::channel(false);
		s.caller().caller().start(rx).await?;
		{
			let mut state = s.state.write().unwrap();
			state.finger_table = vec![node(1), node(3)];
		}
		match s.find_successor(5).await {
			Err(DhtError::RingDisconnected { id, .. }) => assert_eq!(id, 5),
			r => panic!("unexpected result {:?}", r)
		};
		// answered locally without contacting anyone
		assert_eq!(s.find_successor(1).await?, node(1));
		Ok(())
	}

	#[tokio::test]
	async fn test_ownership() {
		let s = server(4, 3);
		s.set_predecessor(Some(node(1)));
		assert!(s.is_local_responsible(2));
		assert!(s.is_local_responsible(4));
		assert!(!s.is_local_responsible(1));
		assert!(!s.is_local_responsible(6));

		let key = (0..)
			.map(|i| format!("key-{}", i))
			.find(|k| !s.is_local_responsible(s.store().bucket_of(k)))
			.unwrap();
		assert!(matches!(s.get(&key), Err(KeyError::NotResponsible { .. })));
		assert!(matches!(s.put(key.clone(), vec![1]).await, Err(KeyError::NotResponsible { .. })));
		// backups skip the check
		s.put_backup(key.clone(), vec![1]);
		assert_eq!(s.store().get(&key), Ok(vec![1]));
	}
}

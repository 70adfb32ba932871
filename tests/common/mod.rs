#![allow(dead_code)]

use chord_kv::{
	core::{
		ring::{KeySpace, Digest, in_range_end_inclusive},
		Config,
		DhtResult,
		Node,
		NodeServer
	},
	server::ServerManager
};
use rand::Rng;

pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

// Disable auto fix_finger, stabilize and check_predecessor
pub fn manual_config(bits: u32) -> Config {
	Config {
		bits,
		stabilize_interval: 0,
		fix_finger_interval: 0,
		check_predecessor_interval: 0,
		..Config::default()
	}
}

pub fn local_node(id: Digest, port: u16) -> Node {
	Node {
		id,
		addr: format!("127.0.0.1:{}", port)
	}
}

pub async fn start_server(node: &Node, config: &Config, introducer: Option<&Node>) -> DhtResult<(NodeServer, ServerManager)> {
	let server = NodeServer::new(node.clone(), config.clone())?;
	let manager = server.start(introducer.map(|n| n.addr.as_str())).await?;
	Ok((server, manager))
}

pub async fn stabilize_all(servers: &[&NodeServer], rounds: usize) -> DhtResult<()> {
	for _ in 0..rounds {
		for s in servers {
			s.stabilize().await?;
		}
	}
	Ok(())
}

pub async fn fix_all_fingers(server: &NodeServer) -> DhtResult<()> {
	for i in 1..server.keyspace().num_fingers() {
		server.fix_finger(i).await?;
	}
	Ok(())
}

// Generate key whose digest is in range (start, end]
pub fn generate_key_in_range<T: Rng>(rng: &mut T, keyspace: &KeySpace, start: Digest, end: Digest) -> String {
	loop {
		let key = format!("key-{:016x}", rng.gen::<u64>());
		if in_range_end_inclusive(keyspace.hash(key.as_bytes()), start, end) {
			return key;
		}
	}
}

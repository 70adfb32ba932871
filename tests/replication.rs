use chord_kv::core::{
	data_store::KVStore,
	ring::in_range_end_inclusive
};
use rand::{rngs::StdRng, Rng, SeedableRng};

mod common;
use common::*;

/// A node accepting a predecessor copies the keys
/// the predecessor owns
#[tokio::test]
async fn test_replica_handoff() -> anyhow::Result<()> {
	init_logger();
	let config = manual_config(7);
	let keyspace = config.keyspace()?;
	let p = local_node(20, 9820);
	let n = local_node(80, 9821);

	// P owns the whole ring at first
	let (sp, _mp) = start_server(&p, &config, None).await?;
	sp.stabilize().await?;
	let mut rng = StdRng::seed_from_u64(7);
	let keys: Vec<String> = (0..64)
		.map(|_| format!("key-{:016x}", rng.gen::<u64>()))
		.collect();
	for k in &keys {
		sp.put(k.clone(), k.as_bytes().to_vec()).await?;
	}
	assert_eq!(sp.store().len(), keys.len());

	let (sn, _mn) = start_server(&n, &config, Some(&p)).await?;
	assert_eq!(sn.get_successor(), p);
	assert!(sn.store().is_empty());
	sn.notify(p.clone()).await;
	assert_eq!(sn.get_predecessor(), Some(p.clone()));

	// exactly the keys P owns once N sits before it
	let expected: Vec<&String> = keys.iter()
		.filter(|k| in_range_end_inclusive(keyspace.hash(k.as_bytes()), n.id, p.id))
		.collect();
	assert!(!expected.is_empty());
	assert_eq!(sn.store().len(), expected.len());
	for k in expected {
		assert_eq!(sn.store().get(k), Ok(k.as_bytes().to_vec()));
	}

	// a candidate outside (pred, self) is ignored
	sn.notify(local_node(100, 9829)).await;
	assert_eq!(sn.get_predecessor(), Some(p.clone()));
	Ok(())
}

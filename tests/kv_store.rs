use chord_kv::{
	client::setup_client,
	core::{
		data_store::{Entry, KVStore},
		DhtError,
		KeyError
	}
};
use rand::{rngs::StdRng, SeedableRng};

mod common;
use common::*;

/// Test kv store operations on a ring of nodes 10, 40 and 90
#[tokio::test]
async fn test_kv_store() -> anyhow::Result<()> {
	init_logger();
	let config = manual_config(7);
	let keyspace = config.keyspace()?;
	let n10 = local_node(10, 9810);
	let n40 = local_node(40, 9811);
	let n90 = local_node(90, 9812);

	let (s10, _m10) = start_server(&n10, &config, None).await?;
	let (s40, _m40) = start_server(&n40, &config, Some(&n10)).await?;
	let (s90, _m90) = start_server(&n90, &config, Some(&n40)).await?;
	let servers = [&s10, &s40, &s90];
	stabilize_all(&servers, 6).await?;
	for s in servers {
		fix_all_fingers(s).await?;
	}
	assert_eq!(s40.get_successor(), n90);
	assert_eq!(s90.get_predecessor(), Some(n40.clone()));

	let mut rng = StdRng::seed_from_u64(3);
	let key = generate_key_in_range(&mut rng, &keyspace, 40, 90);
	let value = b"value".to_vec();

	let client = setup_client(&n10.addr, "127.0.0.1:0", &config).await?;
	assert_eq!(client.locate(&key).await?, n90);
	client.put(key.clone(), value.clone()).await?;

	// stored at the owner and backed up at its successor
	assert_eq!(s90.store().get(&key), Ok(value.clone()));
	assert_eq!(s10.store().get(&key), Ok(value.clone()));
	assert!(s40.store().get(&key).is_err());
	assert_eq!(client.get(&key).await?, value);

	// the same key through another entry
	let client2 = setup_client(&n40.addr, "127.0.0.1:0", &config).await?;
	assert_eq!(client2.get(&key).await?, value);
	let value2 = b"value2".to_vec();
	client2.put(key.clone(), value2.clone()).await?;
	assert_eq!(client.get(&key).await?, value2);

	// non-owners decline
	assert!(matches!(s40.get(&key), Err(KeyError::NotResponsible { .. })));
	match s40.caller().get(&n40.addr, key.clone()).await {
		Err(DhtError::KeyError(KeyError::NotResponsible { addr, .. })) => assert_eq!(addr, n40.addr),
		r => panic!("unexpected result {:?}", r)
	};

	let missing = generate_key_in_range(&mut rng, &keyspace, 90, 10);
	match client.get(&missing).await {
		Err(DhtError::KeyError(KeyError::NotFound(k))) => assert_eq!(k, missing),
		r => panic!("unexpected result {:?}", r)
	};

	let range = s40.caller().get_key_range(&n90.addr, 40, 90).await?;
	assert!(range.contains(&Entry {
		key: key.clone(),
		value: value2.clone()
	}));
	assert!(s40.caller().get_key_range(&n90.addr, 90, 40).await?.is_empty());

	let fingers = client.fingers(&n10.addr).await?;
	assert_eq!(fingers, s10.get_finger_table());
	assert_eq!(client.successor(&n40.addr).await?, n90);
	assert_eq!(client.predecessor(&n40.addr).await?, n10);
	Ok(())
}

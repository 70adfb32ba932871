use chord_kv::core::ring::in_range_end_inclusive;

mod common;
use common::*;

/// Test the ring of figure 3b in the Chord paper
/// (nodes 0, 1, 3 and 6 in a 3-bit key space)
#[tokio::test]
async fn test_figure_3b() -> anyhow::Result<()> {
	init_logger();
	let config = manual_config(3);
	let n0 = local_node(0, 9800);
	let n1 = local_node(1, 9801);
	let n3 = local_node(3, 9803);
	let n6 = local_node(6, 9806);

	// Node 0 initializes and the others join through it
	let (s0, _m0) = start_server(&n0, &config, None).await?;
	let (s1, _m1) = start_server(&n1, &config, Some(&n0)).await?;
	let (s3, _m3) = start_server(&n3, &config, Some(&n0)).await?;
	let (s6, _m6) = start_server(&n6, &config, Some(&n0)).await?;
	let servers = [&s0, &s1, &s3, &s6];

	stabilize_all(&servers, 5).await?;
	for s in servers {
		fix_all_fingers(s).await?;
	}

	let check = || {
		assert_eq!(s0.get_successor(), n1);
		assert_eq!(s1.get_successor(), n3);
		assert_eq!(s3.get_successor(), n6);
		assert_eq!(s6.get_successor(), n0);

		assert_eq!(s0.get_predecessor(), Some(n6.clone()));
		assert_eq!(s1.get_predecessor(), Some(n0.clone()));
		assert_eq!(s3.get_predecessor(), Some(n1.clone()));
		assert_eq!(s6.get_predecessor(), Some(n3.clone()));

		// finger 1 starts at id + 2
		assert_eq!(s0.get_finger_table()[1], n3);
		assert_eq!(s1.get_finger_table()[1], n3);
		assert_eq!(s3.get_finger_table()[1], n6);
		assert_eq!(s6.get_finger_table()[1], n0);
	};
	check();

	// a converged ring stays unchanged
	stabilize_all(&servers, 2).await?;
	for s in servers {
		fix_all_fingers(s).await?;
	}
	check();

	assert_eq!(s0.get_double_successor(), Some(n3.clone()));
	assert_eq!(s6.get_double_successor(), Some(n1.clone()));

	// every id has exactly one owner, found by lookups from any node
	for id in 0..8 {
		let owners: Vec<_> = servers.iter()
			.filter(|s| s.is_local_responsible(id))
			.map(|s| s.node().clone())
			.collect();
		assert_eq!(owners.len(), 1, "id {} owned by {:?}", id, owners);
		let pred = servers.iter()
			.find(|s| s.node() == &owners[0])
			.and_then(|s| s.get_predecessor())
			.unwrap();
		assert!(in_range_end_inclusive(id, pred.id, owners[0].id));

		for s in servers {
			assert_eq!(s.find_successor(id).await?, owners[0]);
		}
		// through the forwarding path too
		assert_eq!(s0.caller().find_successor(&n3.addr, id).await?, owners[0]);
	}

	Ok(())
}

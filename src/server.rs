use crate::core::error::*;
use futures::future;
use log::info;
use tokio::{sync::watch, task::JoinHandle};

/// Handle to all tasks of a running node
/// Dropping it also stops the node.
pub struct ServerManager {
	pub handle: future::JoinAll<JoinHandle<()>>,
	pub tx: watch::Sender<bool>
}

impl ServerManager {
	/// Wait for the server to terminate
	pub async fn wait(self) -> DhtResult<()> {
		self.handle.await
			.into_iter()
			.collect::<Result<Vec<_>, tokio::task::JoinError>>()?;

		Ok(())
	}

	/// Stop the server gracefully
	pub async fn stop(self) -> DhtResult<()> {
		self.tx.send(true)?;
		self.wait().await
	}

	/// Serve until ctrl-c, then stop gracefully
	pub async fn run_until_ctrl_c(self) -> DhtResult<()> {
		let ServerManager { handle, tx } = self;
		tokio::pin!(handle);
		tokio::select! {
			results = &mut handle => {
				results.into_iter().collect::<Result<Vec<_>, tokio::task::JoinError>>()?;
				return Ok(());
			},
			signal = tokio::signal::ctrl_c() => signal?
		};

		info!("shutting down");
		tx.send(true)?;
		handle.await
			.into_iter()
			.collect::<Result<Vec<_>, tokio::task::JoinError>>()?;
		Ok(())
	}
}

use std::{
	collections::HashMap,
	io,
	net::SocketAddr,
	sync::{Arc, RwLock}
};
use futures::prelude::*;
use log::{debug, warn};
use tarpc::{
	serde_transport::{self, tcp},
	tokio_serde::formats::Bincode
};
use tokio::{
	net::TcpStream,
	sync::{watch, Mutex},
	task::JoinHandle
};
use super::{Envelope, RpcResult};

pub type WireTransport = serde_transport::Transport<TcpStream, Envelope, Envelope, Bincode<Envelope, Envelope>>;
type Connection = Arc<Mutex<WireTransport>>;

fn codec() -> Bincode<Envelope, Envelope> {
	Bincode::default()
}

/// Sends envelopes to remote addresses, reusing one connection per address
#[derive(Clone, Default)]
pub struct Sender {
	connection_map: Arc<RwLock<HashMap<String, Connection>>>
}

impl Sender {
	pub fn new() -> Self {
		Self::default()
	}

	async fn connect(&self, addr: &str) -> io::Result<Connection> {
		debug!("connecting to {}", addr);
		let mut connect = tcp::connect(addr, codec);
		connect.config_mut().max_frame_length(usize::MAX);
		let transport: WireTransport = connect.await?;
		let conn = Arc::new(Mutex::new(transport));
		self.connection_map.write().unwrap().insert(addr.to_string(), conn.clone());
		debug!("connected to {}", addr);
		Ok(conn)
	}

	// Only remove the entry if nobody replaced it yet
	fn evict(&self, addr: &str, conn: &Connection) {
		let mut map = self.connection_map.write().unwrap();
		if map.get(addr).map_or(false, |c| Arc::ptr_eq(c, conn)) {
			map.remove(addr);
		}
	}

	pub async fn send(&self, addr: &str, envelope: Envelope) -> RpcResult<()> {
		let cached = self.connection_map.read().unwrap().get(addr).cloned();
		if let Some(conn) = cached {
			let result = conn.lock().await.send(envelope.clone()).await;
			match result {
				Ok(_) => return Ok(()),
				Err(e) => {
					debug!("dropping stale connection to {}: {}", addr, e);
					self.evict(addr, &conn);
				}
			};
		}

		let conn = self.connect(addr).await?;
		let result = conn.lock().await.send(envelope).await;
		if let Err(e) = result {
			self.evict(addr, &conn);
			return Err(e.into());
		}
		Ok(())
	}
}

pub struct Listener {
	pub addr: SocketAddr,
	pub handle: JoinHandle<()>
}

/// Listen at addr and invoke handler once per inbound envelope
/// until the shutdown signal fires
pub async fn listen<F>(addr: &str, shutdown: watch::Receiver<bool>, handler: F) -> io::Result<Listener>
where
	F: Fn(Envelope) + Send + Sync + 'static
{
	let mut incoming = tcp::listen(addr, codec).await?;
	incoming.config_mut().max_frame_length(usize::MAX);
	let local_addr = incoming.local_addr();
	let handler = Arc::new(handler);
	let mut listener_rx = shutdown.clone();

	let handle = tokio::spawn(async move {
		debug!("{}: listening", local_addr);
		loop {
			tokio::select! {
				conn = incoming.next() => match conn {
					Some(Ok(transport)) => {
						tokio::spawn(serve_connection(transport, handler.clone(), shutdown.clone()));
					},
					Some(Err(e)) => warn!("{}: failed to accept connection: {}", local_addr, e),
					None => {
						warn!("{}: listener terminated", local_addr);
						break;
					}
				},
				_ = listener_rx.changed() => {
					debug!("{}: listener stopped gracefully", local_addr);
					break;
				}
			};
		}
	});

	Ok(Listener {
		addr: local_addr,
		handle
	})
}

async fn serve_connection<F>(mut transport: WireTransport, handler: Arc<F>, mut shutdown: watch::Receiver<bool>)
where
	F: Fn(Envelope) + Send + Sync + 'static
{
	loop {
		tokio::select! {
			msg = transport.next() => match msg {
				Some(Ok(envelope)) => (*handler)(envelope),
				Some(Err(e)) => {
					debug!("connection closed: {}", e);
					break;
				},
				None => break
			},
			_ = shutdown.changed() => break
		};
	}
}

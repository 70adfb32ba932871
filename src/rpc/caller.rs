use std::{
	collections::HashMap,
	marker::PhantomData,
	sync::{Arc, Mutex, RwLock},
	time::Duration
};
use log::debug;
use tokio::{
	sync::{oneshot, watch},
	task::JoinHandle
};
use super::{
	transport::{self, Sender},
	encode,
	decode,
	Call,
	CallId,
	Envelope,
	Reply,
	Request,
	RpcError,
	RpcResult
};

// Completion slots keyed by call id
// Ids are never reused, so a late reply can't resolve a newer call.
// capacity only bounds the number of calls in flight.
struct PendingCalls {
	slots: HashMap<CallId, Option<oneshot::Sender<Reply>>>,
	next: CallId,
	capacity: u64
}

impl PendingCalls {
	fn allocate(&mut self, tx: oneshot::Sender<Reply>) -> RpcResult<CallId> {
		if self.slots.len() as u64 >= self.capacity {
			return Err(RpcError::CallIdExhausted(self.capacity));
		}
		let id = self.next;
		self.next = self.next.wrapping_add(1);
		self.slots.insert(id, Some(tx));
		Ok(id)
	}
}

struct CallerInner {
	bind_addr: String,
	// address replies are sent to (known once started)
	addr: RwLock<Option<String>>,
	sender: Sender,
	pending: Mutex<PendingCalls>
}

impl CallerInner {
	fn resolve(&self, reply: Reply) {
		let tx = self.pending.lock().unwrap()
			.slots
			.get_mut(&reply.id)
			.and_then(Option::take);
		match tx {
			// the receiver may have timed out meanwhile
			Some(tx) => tx.send(reply).unwrap_or(()),
			None => debug!("dropping late reply {} ({})", reply.id, reply.method)
		};
	}

	fn release(&self, id: CallId) {
		self.pending.lock().unwrap().slots.remove(&id);
	}
}

// Frees the call id on every exit path
struct PendingSlot {
	inner: Arc<CallerInner>,
	id: CallId
}

impl Drop for PendingSlot {
	fn drop(&mut self) {
		self.inner.release(self.id);
	}
}

/// Caller service where remote functions are declared
#[derive(Clone)]
pub struct Caller {
	inner: Arc<CallerInner>
}

impl Caller {
	/// max_pending bounds the number of calls in flight
	pub fn new(bind_addr: &str, max_pending: u64) -> Self {
		Caller {
			inner: Arc::new(CallerInner {
				bind_addr: bind_addr.to_string(),
				addr: RwLock::new(None),
				sender: Sender::new(),
				pending: Mutex::new(PendingCalls {
					slots: HashMap::new(),
					next: 0,
					capacity: max_pending.max(1)
				})
			})
		}
	}

	/// Start receiving replies
	pub async fn start(&self, shutdown: watch::Receiver<bool>) -> RpcResult<JoinHandle<()>> {
		let inner = self.inner.clone();
		let listener = transport::listen(&self.inner.bind_addr, shutdown, move |envelope| {
			match envelope {
				Envelope::Reply(reply) => inner.resolve(reply),
				Envelope::Call(call) => debug!("caller ignores call {} ({})", call.id, call.method)
			};
		}).await?;
		*self.inner.addr.write().unwrap() = Some(listener.addr.to_string());
		Ok(listener.handle)
	}

	/// Address replies are sent to (None until started)
	pub fn addr(&self) -> Option<String> {
		self.inner.addr.read().unwrap().clone()
	}

	pub fn pending_calls(&self) -> usize {
		self.inner.pending.lock().unwrap().slots.len()
	}

	/// Declare a remote function that fails if no reply arrives within timeout
	pub fn declare<A: Request>(&self, timeout: Duration) -> RemoteFn<A> {
		RemoteFn {
			caller: self.clone(),
			timeout,
			_request: PhantomData
		}
	}
}

pub struct RemoteFn<A> {
	caller: Caller,
	timeout: Duration,
	_request: PhantomData<fn(A)>
}

impl<A> Clone for RemoteFn<A> {
	fn clone(&self) -> Self {
		RemoteFn {
			caller: self.caller.clone(),
			timeout: self.timeout,
			_request: PhantomData
		}
	}
}

impl<A: Request> RemoteFn<A> {
	/// Send the call to addr and block until the reply or the timeout
	pub async fn call(&self, addr: &str, arg: A) -> RpcResult<A::Reply> {
		let inner = &self.caller.inner;
		let caller_addr = inner.addr.read().unwrap().clone().ok_or(RpcError::NotStarted)?;

		// prepare a slot to receive the reply
		let (tx, rx) = oneshot::channel();
		let id = inner.pending.lock().unwrap().allocate(tx)?;
		let _slot = PendingSlot {
			inner: inner.clone(),
			id
		};

		let call = Call {
			id,
			caller_addr,
			method: A::METHOD.to_string(),
			hops: 0,
			arg: encode(&arg)?
		};
		let exchange = async {
			inner.sender.send(addr, Envelope::Call(call)).await?;
			rx.await.map_err(|_| RpcError::Disconnected)
		};

		let reply = match tokio::time::timeout(self.timeout, exchange).await {
			Ok(reply) => reply?,
			Err(_) => return Err(RpcError::Timeout {
				method: A::METHOD,
				addr: addr.to_string(),
				timeout: self.timeout
			})
		};
		if reply.method != A::METHOD {
			return Err(RpcError::UnexpectedReply {
				expected: A::METHOD,
				got: reply.method
			});
		}
		decode(&reply.value)
	}
}

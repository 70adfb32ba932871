use std::{
	collections::HashMap,
	marker::PhantomData,
	sync::Arc
};
use futures::{future::BoxFuture, prelude::*};
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::watch;
use super::{
	transport::{self, Listener, Sender},
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

type BoxedHandler = Arc<dyn Fn(Call, Sender) -> BoxFuture<'static, RpcResult<()>> + Send + Sync>;

/// Result of a forwarding handler
pub enum Handled<R> {
	/// Send this value back to the original caller
	Reply(R),
	/// The call was passed on and someone else replies
	Forwarded
}

/// Passes the in-flight call to another callee.
/// The call keeps its id and original caller address.
pub struct Forward<A> {
	id: CallId,
	caller_addr: String,
	hops: u32,
	max_hops: u32,
	sender: Sender,
	_request: PhantomData<fn(A)>
}

impl<A: Request> Forward<A> {
	pub fn caller_addr(&self) -> &str {
		&self.caller_addr
	}

	/// Number of times the call was forwarded before reaching this callee
	pub fn hops(&self) -> u32 {
		self.hops
	}

	pub async fn forward(&self, addr: &str, arg: A) -> RpcResult<()> {
		if self.hops >= self.max_hops {
			return Err(RpcError::HopLimit(self.max_hops));
		}
		let call = Call {
			id: self.id,
			caller_addr: self.caller_addr.clone(),
			method: A::METHOD.to_string(),
			hops: self.hops + 1,
			arg: encode(&arg)?
		};
		debug!("forwarding call {} ({}) from {} to {}", self.id, A::METHOD, self.caller_addr, addr);
		self.sender.send(addr, Envelope::Call(call)).await
	}
}

/// Callee service where remote functions are implemented
pub struct Callee {
	handlers: HashMap<&'static str, BoxedHandler>,
	sender: Sender,
	max_hops: u32
}

// Encoded before sending so no reference to the value is held across an await
fn reply_to<R: Serialize>(call: &Call, ret: &R) -> RpcResult<Envelope> {
	Ok(Envelope::Reply(Reply {
		id: call.id,
		method: call.method.clone(),
		value: encode(ret)?
	}))
}

impl Callee {
	/// Calls that were already forwarded max_hops times can't be forwarded again
	pub fn new(max_hops: u32) -> Self {
		Callee {
			handlers: HashMap::new(),
			sender: Sender::new(),
			max_hops
		}
	}

	fn register(&mut self, method: &'static str, handler: BoxedHandler) {
		assert!(!self.handlers.contains_key(method), "method {} implemented twice", method);
		self.handlers.insert(method, handler);
	}

	/// Implement A with a handler whose result is always sent back
	pub fn implement<A, F, Fut>(&mut self, handler: F)
	where
		A: Request,
		F: Fn(A) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = A::Reply> + Send + 'static
	{
		let handler = Arc::new(handler);
		self.register(A::METHOD, Arc::new(move |call: Call, sender: Sender| {
			let handler = handler.clone();
			async move {
				let arg: A = decode(&call.arg)?;
				let ret = (*handler)(arg).await;
				let reply = reply_to(&call, &ret)?;
				sender.send(&call.caller_addr, reply).await
			}.boxed()
		}));
	}

	/// Implement A with a handler that may forward the call instead of replying
	pub fn implement_forwarding<A, F, Fut>(&mut self, handler: F)
	where
		A: Request,
		F: Fn(A, Forward<A>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Handled<A::Reply>> + Send + 'static
	{
		let handler = Arc::new(handler);
		let max_hops = self.max_hops;
		self.register(A::METHOD, Arc::new(move |call: Call, sender: Sender| {
			let handler = handler.clone();
			async move {
				let arg: A = decode(&call.arg)?;
				let forward = Forward {
					id: call.id,
					caller_addr: call.caller_addr.clone(),
					hops: call.hops,
					max_hops,
					sender: sender.clone(),
					_request: PhantomData
				};
				let reply = match (*handler)(arg, forward).await {
					Handled::Reply(ret) => reply_to(&call, &ret)?,
					Handled::Forwarded => return Ok(())
				};
				sender.send(&call.caller_addr, reply).await
			}.boxed()
		}));
	}

	/// Start serving calls at addr
	/// Every call runs in its own task.
	pub async fn start(self, addr: &str, shutdown: watch::Receiver<bool>) -> RpcResult<Listener> {
		let handlers = Arc::new(self.handlers);
		let sender = self.sender;
		let listener = transport::listen(addr, shutdown, move |envelope| {
			match envelope {
				Envelope::Call(call) => {
					let handler = handlers.get(call.method.as_str()).cloned();
					match handler {
						Some(handler) => {
							let id = call.id;
							let fut = (*handler)(call, sender.clone());
							tokio::spawn(async move {
								if let Err(e) = fut.await {
									warn!("failed to handle call {}: {}", id, e);
								}
							});
						},
						// the caller will time out
						None => debug!("no handler for {}, ignoring call {}", call.method, call.id)
					};
				},
				Envelope::Reply(reply) => debug!("callee ignores reply {} ({})", reply.id, reply.method)
			};
		}).await?;
		Ok(listener)
	}
}

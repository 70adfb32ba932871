use chord_kv::core::{
	self,
	Config,
	NodeServer
};
use clap::Parser;
use log::info;

#[derive(Parser)]
struct Args {
	/// Local host to bind, must be routable from peers (not 0.0.0.0)
	host: String,

	/// Keyspace exponent (ring size is 2^bits)
	#[clap(short = 'n', long, default_value_t = 32)]
	bits: u32,

	/// Port of the inbound RPC service (also part of the node identity)
	#[clap(long, default_value_t = 2001)]
	callee_port: u16,

	/// Port replies to our own calls are received at
	#[clap(long, default_value_t = 2000)]
	caller_port: u16,

	/// Join an existing node on init (<host>:<port>)
	#[clap(short = 'c', long)]
	join: Option<String>
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();

	let config = Config {
		bits: args.bits,
		caller_port: args.caller_port,
		..Config::default()
	};
	let addr = format!("{}:{}", args.host, args.callee_port);
	let node = core::construct_node(&addr, &config.keyspace()?);
	info!("starting {}", node);

	let s = NodeServer::new(node, config)?;
	let manager = s.start(args.join.as_deref()).await?;
	manager.run_until_ctrl_c().await?;
	Ok(())
}

use chord_kv::{
	client::{setup_client, DhtClient},
	core::{Config, DhtError, KeyError}
};
use clap::Parser;
use inquire::{Text, CustomUserError};
use anyhow::anyhow;

#[derive(Parser)]
struct Args {
	/// Server addr to connect to (<host>:<port>)
	addr: String,

	/// Keyspace exponent, must match the ring
	#[clap(short = 'n', long, default_value_t = 32)]
	bits: u32,

	/// Local addr to receive replies at
	#[clap(long, default_value = "127.0.0.1:0")]
	bind: String
}

const COMMANDS: [&str; 6] = [
	"get",
	"put",
	"locate",
	"fingers",
	"succ",
	"pred"
];

// Optional node address argument, defaulting to the entry node
fn target_addr(client: &DhtClient, words: &[&str]) -> anyhow::Result<String> {
	match words.len() {
		1 => Ok(client.entry().to_string()),
		2 => Ok(words[1].to_string()),
		_ => Err(anyhow!("{}: invalid number of arguments", words[0]))
	}
}

fn suggest_command(v: &str) -> Result<Vec<String>, CustomUserError> {
	let mut result = Vec::new();
	for command in COMMANDS {
		if !v.is_empty() && command.starts_with(v) {
			result.push(command.to_string());
		}
	}
	Ok(result)
}

fn complete_command(v: &str) -> Result<Option<String>, CustomUserError> {
	let result = suggest_command(v)?;
	let command = if !result.is_empty() {
		Some(result[0].clone() + " ")
	}
	else {
		None
	};
	Ok(command)
}

async fn execute_command(client: &DhtClient, command: &str) -> anyhow::Result<()> {
	// execute command
	let words: Vec<_> = command.split_whitespace().collect();
	if words.is_empty() {
		return Err(anyhow!("invalid command"));
	}

	match words[0] {
		"get" => {
			if words.len() != 2 {
				return Err(anyhow!("get: invalid number of arguments"));
			}
			match client.get(words[1]).await {
				Ok(v) => println!("{}", String::from_utf8_lossy(&v)),
				Err(DhtError::KeyError(KeyError::NotFound(_))) => return Err(anyhow!("get: key doesn't exist")),
				Err(e) => return Err(e.into())
			};
		},
		"put" => {
			if words.len() != 3 {
				return Err(anyhow!("put: invalid number of arguments"));
			}
			client.put(
				words[1].to_string(),
				words[2].as_bytes().to_vec()
			).await?;
		},
		"locate" => {
			if words.len() != 2 {
				return Err(anyhow!("locate: invalid number of arguments"));
			}
			let node = client.locate(words[1]).await?;
			println!("digest {} is owned by {}", client.digest(words[1]), node);
		},
		"fingers" => {
			let addr = target_addr(client, &words)?;
			for (i, finger) in client.fingers(&addr).await?.iter().enumerate() {
				println!("{}: {}", i, finger);
			}
		},
		"succ" => {
			let addr = target_addr(client, &words)?;
			println!("{}", client.successor(&addr).await?);
		},
		"pred" => {
			// a node with an unknown predecessor answers itself
			let addr = target_addr(client, &words)?;
			println!("{}", client.predecessor(&addr).await?);
		},
		_ => {
			return Err(anyhow!("invalid command"));
		}
	};
	Ok(())
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();
	let config = Config {
		bits: args.bits,
		..Config::default()
	};
	let client = setup_client(&args.addr, &args.bind, &config).await?;

	loop {
		let command = Text::new("")
			.with_suggester(&suggest_command)
			.with_completer(&complete_command)
			.prompt()?;

		match execute_command(&client, &command).await {
			Ok(_) => (),
			Err(e) => println!("Error: {}", e)
		};
	}
}

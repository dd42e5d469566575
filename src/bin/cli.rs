use bytes::Bytes;
use clap::{Parser, Subcommand};
use redic::{Client, Result};
use tracing::debug;

const PORT: u16 = 6379;

#[derive(Parser, Debug)]
struct Args {
    /// The host the Redis server is listening on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// The port the Redis server is listening on
    #[arg(short, long, default_value_t = PORT)]
    port: u16,
    /// Password sent as AUTH right after connecting
    #[arg(long, env = "REDIC_PASSWORD")]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Get the value of a key
    Get { key: String },
    /// Set a key to a value
    Set { key: String, value: String },
    /// Set a key to a value with an expiry in seconds
    Setex {
        key: String,
        seconds: u64,
        value: String,
    },
    /// Delete one or more keys
    Del { keys: Vec<String> },
    /// Set an expiry in seconds on an existing key
    Expire { key: String, seconds: u64 },
    /// Subscribe to channels and print published messages
    Subscribe { channels: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let args = Args::parse();

    let mut client = Client::new(args.host, args.port);
    if let Some(password) = args.password {
        client = client.password(password);
    }
    client.connect().await?;

    match args.command {
        Command::Subscribe { channels } => {
            let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
            let mut subscriber = client.subscribe(&channels).await?;
            loop {
                let message = subscriber.next_message().await?;
                println!(
                    "{} {}",
                    message.channel,
                    String::from_utf8_lossy(&message.payload)
                );
            }
        }
        command => {
            run_command(&client, command).await?;
            client.close().await;
            Ok(())
        }
    }
}

async fn run_command(client: &Client, command: Command) -> Result<()> {
    match command {
        Command::Get { key } => match client.get(&key).await? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Command::Set { key, value } => {
            client.set(&key, Bytes::from(value)).await?;
            println!("OK");
        }
        Command::Setex {
            key,
            seconds,
            value,
        } => {
            client.setex(&key, seconds, Bytes::from(value)).await?;
            println!("OK");
        }
        Command::Del { keys } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            println!("{}", client.del(&keys).await?);
        }
        Command::Expire { key, seconds } => {
            println!("{}", i64::from(client.expire(&key, seconds).await?));
        }
        Command::Subscribe { .. } => unreachable!("handled by the caller"),
    }
    Ok(())
}

mod client;
mod page;
mod session;

use anyhow::Result;
use clap::Parser;

use client::{Endpoint, RelayClient};
use page::ChatPage;
use session::ChatSession;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the relay server
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    url: String,

    /// Relay route to chat with
    #[arg(short, long, value_enum, default_value = "tools")]
    endpoint: Endpoint,

    /// Send a single message, print the reply and exit
    #[arg(short, long)]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with the transcript
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();

    let session = ChatSession::new(RelayClient::new(&cli.url, cli.endpoint));
    let page = ChatPage::new(session);

    match cli.message {
        Some(message) => page.send(&message).await,
        None => page.run().await?,
    }
    Ok(())
}

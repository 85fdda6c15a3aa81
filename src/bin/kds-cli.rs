use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use kds::resources::ResourceKind;

#[derive(Parser)]
#[command(name = "kds-cli")]
#[command(about = "Operator CLI for the kds control plane", long_about = None)]
struct Cli {
    #[arg(short, long, env = "KDS_URL", default_value = "http://localhost:4000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show scheduler state and the published version
    Status,
    /// List published snapshots per node
    Snapshots,
    /// Dump the full bundle published for a node
    Snapshot { node: String },
    /// Fetch one resource kind the way a proxy node would
    Fetch {
        /// endpoints, clusters, routes or listeners
        kind: ResourceKind,

        #[arg(short, long, default_value = "default")]
        node: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)).send().await?,
        Commands::Snapshots => client.get(format!("{}/admin/snapshots", base)).send().await?,
        Commands::Snapshot { node } => {
            client
                .get(format!("{}/admin/snapshots/{}", base, node))
                .send()
                .await?
        }
        Commands::Fetch { kind, node } => {
            let body = json!({
                "node": { "id": node },
                "type_url": kind.type_url(),
            });
            client
                .post(format!("{}/v2/discovery:{}", base, kind))
                .json(&body)
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{transaction::parse_amount, Keypair, Transaction};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "Wallet and explorer client for a ledger node")]
struct Cli {
    /// Node base URL
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:3000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a keypair; the public key is the address
    Keygen,
    /// Sign a transfer locally and submit it
    Transfer {
        /// Sender's hex secret key
        #[arg(long, env = "LEDGER_SECRET_KEY")]
        secret: String,
        /// Recipient address
        #[arg(long)]
        to: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: String,
    },
    /// Sign a burn of the sender's own funds and submit it
    Burn {
        #[arg(long, env = "LEDGER_SECRET_KEY")]
        secret: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: String,
    },
    /// Ask the node to queue a mint
    Mint {
        #[arg(long)]
        to: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: i64,
    },
    /// Confirmed balance of an address
    Balance { address: String },
    /// Chain summary
    Info,
    /// Block by index or hash
    Block { identifier: String },
    /// Confirmed transaction by id
    Tx { id: String },
    /// Transactions waiting to be mined
    Pending,
    /// Run chain validation on the node
    Validate,
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        debug!(%url, "GET");
        let res = self.http.get(&url).send().await.with_context(|| format!("GET {url}"))?;
        unwrap_envelope(res.json().await?)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        debug!(%url, "POST");
        let res = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        unwrap_envelope(res.json().await?)
    }
}

fn unwrap_envelope(body: Value) -> Result<Value> {
    if body["success"].as_bool() == Some(true) {
        return Ok(body["data"].clone());
    }
    match body["message"].as_str() {
        Some(message) => bail!("node rejected request: {message}"),
        None => bail!("unexpected response: {body}"),
    }
}

fn build_transfer(secret: &str, to: &str, amount: &str) -> Result<Transaction> {
    let keys = Keypair::from_secret_hex(secret)?;
    let mut tx = Transaction::transfer(keys.address(), to, parse_amount(amount)?);
    tx.sign(&keys)?;
    Ok(tx)
}

fn build_burn(secret: &str, amount: &str) -> Result<Transaction> {
    let keys = Keypair::from_secret_hex(secret)?;
    let mut tx = Transaction::burn(keys.address(), parse_amount(amount)?);
    tx.sign(&keys)?;
    Ok(tx)
}

fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.node);
    match cli.cmd {
        Command::Keygen => {
            let keys = Keypair::generate();
            print(&json!({ "address": keys.address(), "secretKey": keys.secret_hex() }))?;
        }
        Command::Transfer { secret, to, amount } => {
            let tx = build_transfer(&secret, &to, &amount)?;
            print(&client.post("/api/transactions", &serde_json::to_value(&tx)?).await?)?;
        }
        Command::Burn { secret, amount } => {
            let tx = build_burn(&secret, &amount)?;
            print(&client.post("/api/transactions", &serde_json::to_value(&tx)?).await?)?;
        }
        Command::Mint { to, amount } => {
            let body = json!({ "address": to, "amount": amount });
            print(&client.post("/api/mint", &body).await?)?;
        }
        Command::Balance { address } => {
            print(&client.get(&format!("/api/balance/{address}")).await?)?;
        }
        Command::Info => print(&client.get("/api/chain/info").await?)?,
        Command::Block { identifier } => {
            print(&client.get(&format!("/api/blocks/{identifier}")).await?)?;
        }
        Command::Tx { id } => print(&client.get(&format!("/api/transactions/{id}")).await?)?,
        Command::Pending => print(&client.get("/api/pending-transactions").await?)?,
        Command::Validate => {
            let report = client.get("/api/validate").await?;
            print(&report)?;
            if report["isValid"].as_bool() != Some(true) {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::TxKind;

    #[test]
    fn transfer_is_signed_by_the_secret_holder() {
        let keys = Keypair::generate();
        let tx = build_transfer(&keys.secret_hex(), "bob", "25").unwrap();
        assert_eq!(tx.from_address(), Some(keys.address().as_str()));
        assert_eq!(tx.amount(), 25);
        assert_eq!(tx.kind(), TxKind::Transfer);
        assert!(tx.verify().unwrap());
    }

    #[test]
    fn transfer_rejects_bad_amounts() {
        let keys = Keypair::generate();
        assert!(build_transfer(&keys.secret_hex(), "bob", "-3").is_err());
        assert!(build_transfer(&keys.secret_hex(), "bob", "ten").is_err());
        assert!(build_transfer("not-hex", "bob", "3").is_err());
    }

    #[test]
    fn burn_targets_the_sender() {
        let keys = Keypair::generate();
        let tx = build_burn(&keys.secret_hex(), "5").unwrap();
        assert_eq!(tx.kind(), TxKind::Burn);
        assert_eq!(tx.to_address(), keys.address());
        assert!(tx.verify().unwrap());
    }

    #[test]
    fn envelope_is_unwrapped() {
        let data = unwrap_envelope(json!({ "success": true, "data": { "length": 3 } })).unwrap();
        assert_eq!(data["length"], 3);

        let err = unwrap_envelope(json!({ "success": false, "message": "nope" })).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn node_flag_is_global() {
        let cli = Cli::try_parse_from(["ledger-cli", "info", "--node", "http://node:9000"]).unwrap();
        assert_eq!(cli.node, "http://node:9000");
        assert!(matches!(cli.cmd, Command::Info));
    }

    #[test]
    fn mint_accepts_negative_amount_for_server_side_rejection() {
        let cli =
            Cli::try_parse_from(["ledger-cli", "mint", "--to", "alice", "--amount", "-5"]).unwrap();
        match cli.cmd {
            Command::Mint { to, amount } => {
                assert_eq!(to, "alice");
                assert_eq!(amount, -5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

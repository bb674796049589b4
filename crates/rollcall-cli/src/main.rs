use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{AttendanceReport, AttendanceSheet, Bucket, IdentitySummary};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// `#[zbus::proxy]` generates `AttendanceProxy` (async) and `AttendanceProxyBlocking`.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn register_identity(&self, name: &str, signature: &[f64]) -> zbus::Result<u64>;
    async fn take_attendance(&self, signatures: &[Vec<f64>]) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn get_series(&self, identity_id: u64, granularity: &str) -> zbus::Result<String>;
    async fn get_summary_report(&self, identity_id: u64, recipient: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    /// Print raw JSON replies
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a person from an extracted signature
    Register {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// JSON file holding the signature as an array of numbers
        /// (`null` or `[]` when no face was found)
        #[arg(short, long)]
        signature: PathBuf,
    },
    /// Take today's attendance from the signatures found in one frame
    Take {
        /// JSON file holding an array of signatures
        #[arg(short, long)]
        frame: PathBuf,
    },
    /// List registered identities
    List,
    /// Show daily or monthly attendance counts for one identity
    Series {
        #[arg(long)]
        id: u64,
        /// "daily" or "monthly"
        #[arg(long, default_value = "daily")]
        view: String,
    },
    /// Print an attendance report for one identity
    Report {
        #[arg(long)]
        id: u64,
        /// "parent" or "management"
        #[arg(long, default_value = "management")]
        recipient: String,
    },
    /// Show daemon status
    Status,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_series(buckets: &[Bucket]) {
    if buckets.is_empty() {
        println!("No attendance recorded");
        return;
    }
    println!("{:<10}  {:>7}  {:>6}", "period", "present", "absent");
    for b in buckets {
        println!(
            "{:<10}  {:>7}  {:>6}  {}{}",
            b.label,
            b.present,
            b.absent,
            "#".repeat(b.present as usize),
            ".".repeat(b.absent as usize)
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn).await?;

    match cli.command {
        Commands::Register { name, signature } => {
            let values: Option<Vec<f64>> = read_json(&signature)?;
            let id = proxy
                .register_identity(&name, &values.unwrap_or_default())
                .await?;
            println!("{name} registered with id {id}");
        }
        Commands::Take { frame } => {
            let signatures: Vec<Vec<f64>> = read_json(&frame)?;
            let reply = proxy.take_attendance(&signatures).await?;
            if cli.json {
                println!("{reply}");
            } else {
                let sheet: AttendanceSheet = serde_json::from_str(&reply)?;
                println!("Attendance for {}", sheet.date);
                println!("  present: {}", sheet.present.join(", "));
                println!("  absent:  {}", sheet.absent.join(", "));
            }
        }
        Commands::List => {
            let reply = proxy.list_identities().await?;
            if cli.json {
                println!("{reply}");
            } else {
                let identities: Vec<IdentitySummary> = serde_json::from_str(&reply)?;
                if identities.is_empty() {
                    println!("No identities registered");
                }
                for identity in identities {
                    println!("{:>4}  {}", identity.id, identity.name);
                }
            }
        }
        Commands::Series { id, view } => {
            let reply = proxy.get_series(id, &view).await?;
            if cli.json {
                println!("{reply}");
            } else {
                let buckets: Vec<Bucket> = serde_json::from_str(&reply)?;
                print_series(&buckets);
            }
        }
        Commands::Report { id, recipient } => {
            let reply = proxy.get_summary_report(id, &recipient).await?;
            if cli.json {
                println!("{reply}");
            } else {
                let report: AttendanceReport = serde_json::from_str(&reply)?;
                print!("{}", report.to_text());
            }
        }
        Commands::Status => {
            println!("{}", proxy.status().await?);
        }
    }

    Ok(())
}

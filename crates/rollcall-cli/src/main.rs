use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn start(&self) -> zbus::Result<String>;
    fn stop(&self) -> zbus::Result<String>;
    fn current_frame(&self) -> zbus::Result<(Vec<u8>, String)>;
    fn today_count(&self) -> zbus::Result<u32>;
    fn distinct_identity_count(&self) -> zbus::Result<u32>;
    fn status(&self) -> zbus::Result<String>;
    fn stats(&self) -> zbus::Result<String>;
    fn attendance_records(&self, date: &str) -> zbus::Result<String>;
    fn list_employees(&self) -> zbus::Result<String>;
    fn add_employee(&self, name: &str, department: &str, position: &str) -> zbus::Result<i64>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the recognition loop
    Start,
    /// Stop the recognition loop
    Stop,
    /// Show daemon status
    Status,
    /// Show employee and attendance totals
    Stats,
    /// List attendance records, newest first
    Attendance {
        /// Only show one day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Manage employees
    Employees {
        #[command(subcommand)]
        command: EmployeeCommands,
    },
    /// Save the latest annotated frame as JPEG
    Snapshot {
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum EmployeeCommands {
    /// List registered employees
    List,
    /// Register a new employee
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        department: String,
        #[arg(short, long, default_value = "")]
        position: String,
    },
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn).await?;
    tracing::debug!(system = cli.system, "connected to rollcalld");

    match cli.command {
        Commands::Start => println!("{}", proxy.start().await?),
        Commands::Stop => println!("{}", proxy.stop().await?),
        Commands::Status => print_json(&proxy.status().await?)?,
        Commands::Stats => print_json(&proxy.stats().await?)?,
        Commands::Attendance { date } => {
            let raw = proxy.attendance_records(date.as_deref().unwrap_or("")).await?;
            print_json(&raw)?;
        }
        Commands::Employees { command: EmployeeCommands::List } => {
            print_json(&proxy.list_employees().await?)?;
        }
        Commands::Employees {
            command: EmployeeCommands::Add { name, department, position },
        } => {
            let id = proxy.add_employee(&name, &department, &position).await?;
            println!("Added {name} (id {id})");
        }
        Commands::Snapshot { output } => {
            let (jpeg, meta) = proxy.current_frame().await?;
            if jpeg.is_empty() {
                bail!("no frame available; is the recognition loop running?");
            }
            std::fs::write(&output, &jpeg)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote {} bytes to {}", jpeg.len(), output.display());
            print_json(&meta)?;
        }
    }

    Ok(())
}

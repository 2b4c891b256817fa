//! CLI entry point for the fund operator.

use std::io;
use std::path::PathBuf;
use std::process;

use basketfund::{AccountId, AssetId, FundError};
use clap::{Parser, Subcommand, ValueEnum};

use basketfund_operator::audit;
use basketfund_operator::commands::{self, RebalanceOptions};
use basketfund_operator::config::Config;
use basketfund_operator::error::{Error, Result};
use basketfund_operator::session::Session;

#[derive(Parser)]
#[command(name = "fundctl")]
#[command(about = "Operate a basketfund pooled-asset fund against paper custody")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Fund clock in unix seconds (defaults to the system clock)
    #[arg(long, global = true)]
    now: Option<u64>,

    /// Account performing privileged commands (defaults to the manager)
    #[arg(long = "as", global = true)]
    caller: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the fund state from config.toml
    Init,

    /// Credit an investor wallet (paper faucet)
    FundWallet {
        holder: String,
        asset: String,
        amount: String,
    },

    /// Deposit base asset and mint shares
    Deposit { investor: String, amount: String },

    /// Burn shares for a pro-rata slice of the basket ("all" for everything)
    Redeem { investor: String, shares: String },

    /// Burn shares and convert the payout into one asset
    RedeemTo {
        investor: String,
        shares: String,
        asset: String,
    },

    /// Price-free pro-rata redemption while in emergency mode
    EmergencyRedeem { investor: String, shares: String },

    /// Accrue management and performance fees
    Accrue,

    /// Show drift, plan trades, confirm and rebalance
    Rebalance {
        /// Show plan without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Show NAV, share price and per-asset values
    Nav,

    /// Show fund state, prices, holders and drift
    Status,

    /// Halt deposits and rebalancing
    Pause,

    /// Resume normal operation
    Unpause,

    /// Enter or leave emergency mode
    Emergency {
        #[arg(value_enum)]
        mode: Switch,
    },

    /// Enter emergency mode if any price is older than the heartbeat
    Heartbeat,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Init => "init",
            Command::FundWallet { .. } => "fund-wallet",
            Command::Deposit { .. } => "deposit",
            Command::Redeem { .. } => "redeem",
            Command::RedeemTo { .. } => "redeem-to",
            Command::EmergencyRedeem { .. } => "emergency-redeem",
            Command::Accrue => "accrue",
            Command::Rebalance { .. } => "rebalance",
            Command::Nav => "nav",
            Command::Status => "status",
            Command::Pause => "pause",
            Command::Unpause => "unpause",
            Command::Emergency { .. } => "emergency",
            Command::Heartbeat => "heartbeat",
        }
    }
}

fn dispatch(s: &mut Session, caller: &AccountId, command: Command) -> Result<()> {
    let out = &mut io::stdout();
    match command {
        // Refuses: the state file this session loaded already exists.
        Command::Init => commands::init(&s.config, s.now, out),
        Command::FundWallet {
            holder,
            asset,
            amount,
        } => commands::fund_wallet(
            s,
            &AccountId::new(&holder),
            &AssetId::new(&asset),
            &amount,
            out,
        ),
        Command::Deposit { investor, amount } => {
            commands::deposit(s, &AccountId::new(&investor), &amount, out)
        }
        Command::Redeem { investor, shares } => {
            commands::redeem(s, &AccountId::new(&investor), &shares, out)
        }
        Command::RedeemTo {
            investor,
            shares,
            asset,
        } => commands::redeem_to(
            s,
            &AccountId::new(&investor),
            &shares,
            &AssetId::new(&asset),
            out,
        ),
        Command::EmergencyRedeem { investor, shares } => {
            commands::emergency_redeem(s, &AccountId::new(&investor), &shares, out)
        }
        Command::Accrue => commands::accrue(s, out),
        Command::Rebalance { dry_run, force } => {
            commands::rebalance(s, caller, RebalanceOptions { dry_run, force }, out)
        }
        Command::Nav => commands::nav(s, out),
        Command::Status => commands::status(s, out),
        Command::Pause => commands::pause(s, caller, out),
        Command::Unpause => commands::unpause(s, caller, out),
        Command::Emergency { mode } => {
            commands::emergency(s, caller, matches!(mode, Switch::On), out)
        }
        Command::Heartbeat => commands::heartbeat(s, out),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let now = cli
        .now
        .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);

    if let Command::Init = cli.command {
        return commands::init(&config, now, &mut io::stdout());
    }

    let caller = cli
        .caller
        .as_deref()
        .map(AccountId::new)
        .unwrap_or_else(|| config.manager());
    let name = cli.command.name();
    let mut session = Session::open(config, now)?;
    let result = dispatch(&mut session, &caller, cli.command);
    if let Err(e) = &result {
        // The failed operation left the persisted state untouched.
        if let Err(log_err) = audit::log_failure(&mut session.audit, name, &e.to_string()) {
            log::error!("failed to record failure in audit log: {log_err}");
        }
    }
    result
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match &e {
            Error::Aborted(msg) => {
                eprintln!("Aborted: {msg}");
                process::exit(0);
            }
            Error::Fund(FundError::Unauthorized(_)) => {
                eprintln!("Error: {e}");
                process::exit(3);
            }
            Error::Fund(_) => {
                eprintln!("Rejected: {e}");
                process::exit(2);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}

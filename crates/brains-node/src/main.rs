//! brains-node
//!
//! Operator CLI for a BRAINS staking ledger kept in a local state database.
//! Every mutating command is applied through the atomic state engine and
//! committed as a new height; queries can read any past height or time.
//!
//! Usage:
//!   brains-node init           [--config <json>]
//!   brains-node --as <addr> deposit        --amount <tokens> --round <round> [--beneficiary <addr>]
//!   brains-node --as <addr> withdraw       [--chunk <id>] [--with-fee]
//!   brains-node --as <addr> transfer-chunk --id <id> --to <addr>
//!   brains-node --as <addr> approve-chunk  --id <id> [--delegate <addr>]
//!   brains-node --as <addr> set-operator   --operator <addr> [--revoke]
//!   brains-node --as <addr> set-threshold  --amount <tokens>
//!   brains-node --as <addr> withdraw-fees  --to <addr> --amount <tokens>
//!   brains-node --as <addr> mint           --to <addr> --amount <tokens>
//!   brains-node --as <addr> burn           --amount <tokens>
//!   brains-node --as <addr> transfer       --to <addr> --amount <tokens>
//!   brains-node --as <addr> batch-transfer --to <a,b,..> --amounts <x,y,..>
//!   brains-node --as <addr> approve        --spender <addr> --amount <tokens>
//!   brains-node position       --address <addr> [--height <h> | --at <unix>]
//!   brains-node stakers        [--height <h> | --at <unix>]
//!   brains-node airdrop        --total <tokens> [--aux <json>] [--height <h> | --at <unix>]
//!   brains-node info           [--height <h> | --at <unix>]
//!
//! Addresses are base-58, or `@label` for a deterministic test address.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use brains_airdrop::allocate;
use brains_core::call::{Call, Receipt};
use brains_core::position::Round;
use brains_core::types::{Address, Amount, Height, PositionId, Timestamp};
use brains_fees::WithdrawalDecision;
use brains_genesis::{deploy, DeploymentConfig};
use brains_state::{LedgerState, StakeQuery, StateDb, StateEngine};

mod units;
use units::{format_tokens, parse_tokens};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "brains-node",
    version,
    about = "BRAINS staking ledger: deposits, chunk positions and vesting fees"
)]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, global = true, default_value = "~/.brains/data")]
    data_dir: PathBuf,

    /// Address the call is submitted as.
    #[arg(long = "as", global = true)]
    caller: Option<String>,

    /// Override the clock (Unix seconds). Defaults to now.
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a fresh ledger into an empty data directory.
    Init {
        /// Deployment config (JSON). Omitted fields take production defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Stake tokens. The caller must have approved the staking address.
    Deposit {
        #[arg(long)]
        amount: String,
        /// public, pre_sale, seed, strategic_or_private or founder.
        #[arg(long, default_value = "public")]
        round: Round,
        /// Who receives the position. Defaults to the caller.
        #[arg(long)]
        beneficiary: Option<String>,
    },

    /// Withdraw the caller's accumulator, or one chunk with `--chunk`.
    Withdraw {
        #[arg(long)]
        chunk: Option<PositionId>,
        /// Pay the early-exit fee instead of requiring maturity.
        #[arg(long)]
        with_fee: bool,
    },

    /// Give a chunk to another address.
    TransferChunk {
        #[arg(long)]
        id: PositionId,
        #[arg(long)]
        to: String,
    },

    /// Let one address move a chunk. Omit `--delegate` to clear.
    ApproveChunk {
        #[arg(long)]
        id: PositionId,
        #[arg(long)]
        delegate: Option<String>,
    },

    /// Allow an operator to move all of the caller's chunks.
    SetOperator {
        #[arg(long)]
        operator: String,
        #[arg(long)]
        revoke: bool,
    },

    /// Change the chunk size for future deposits (manager only).
    SetThreshold {
        #[arg(long)]
        amount: String,
    },

    /// Pay out of the collected-fee pool (manager only).
    WithdrawFees {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
    },

    /// Mint under the yearly ceiling (token owner only).
    Mint {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
    },

    Burn {
        #[arg(long)]
        amount: String,
    },

    Transfer {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
    },

    /// Pairwise transfers, all or nothing.
    BatchTransfer {
        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        amounts: Vec<String>,
    },

    Approve {
        #[arg(long)]
        spender: String,
        #[arg(long)]
        amount: String,
    },

    /// Show an address's positions and what withdrawing them would cost.
    Position {
        #[arg(long)]
        address: String,
        #[command(flatten)]
        snapshot: Snapshot,
    },

    /// List every staker with their total stake.
    Stakers {
        #[command(flatten)]
        snapshot: Snapshot,
    },

    /// Compute an airdrop split over the stakers.
    Airdrop {
        #[arg(long)]
        total: String,
        /// JSON map of address to auxiliary balance (base units, 1e18 = 1x).
        #[arg(long)]
        aux: Option<PathBuf>,
        #[command(flatten)]
        snapshot: Snapshot,
    },

    /// Print ledger parameters and totals.
    Info {
        #[command(flatten)]
        snapshot: Snapshot,
    },
}

/// Which committed state a query reads. Defaults to the head.
#[derive(clap::Args, Debug)]
struct Snapshot {
    /// Read the state as committed at this height.
    #[arg(long, conflicts_with = "at")]
    height: Option<Height>,
    /// Read the newest state committed at or before this unix time.
    #[arg(long)]
    at: Option<Timestamp>,
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "warn,brains_node=info,brains_state=info,brains_token=info,brains_genesis=info",
                )
            }),
        )
        .init();

    let args = Args::parse();
    let now = args.now.unwrap_or_else(|| chrono::Utc::now().timestamp());

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);

    let caller = args.caller.as_deref().map(parse_address).transpose()?;

    let call = match args.command {
        Command::Init { config } => return cmd_init(db, config.as_deref(), now),

        Command::Position { address, snapshot } => {
            let state = load_state(&db, &snapshot)?;
            return cmd_position(&state, &parse_address(&address)?, now);
        }
        Command::Stakers { snapshot } => {
            let state = load_state(&db, &snapshot)?;
            return cmd_stakers(&state);
        }
        Command::Airdrop { total, aux, snapshot } => {
            let state = load_state(&db, &snapshot)?;
            return cmd_airdrop(&state, parse_tokens(&total)?, aux.as_deref());
        }
        Command::Info { snapshot } => {
            let state = load_state(&db, &snapshot)?;
            return cmd_info(&state, now);
        }

        Command::Deposit { amount, round, beneficiary } => {
            let beneficiary = match beneficiary {
                Some(b) => parse_address(&b)?,
                None => require_caller(caller)?,
            };
            Call::Deposit { beneficiary, amount: parse_tokens(&amount)?, round }
        }
        Command::Withdraw { chunk, with_fee } => match (chunk, with_fee) {
            (None, false) => Call::WithdrawAccumulator,
            (None, true) => Call::WithdrawAccumulatorWithFee,
            (Some(position_id), false) => Call::WithdrawChunk { position_id },
            (Some(position_id), true) => Call::WithdrawChunkWithFee { position_id },
        },
        Command::TransferChunk { id, to } => Call::TransferChunk { position_id: id, to: parse_address(&to)? },
        Command::ApproveChunk { id, delegate } => Call::ApproveChunk {
            position_id: id,
            delegate: delegate.as_deref().map(parse_address).transpose()?,
        },
        Command::SetOperator { operator, revoke } => Call::SetChunkOperator {
            operator: parse_address(&operator)?,
            approved: !revoke,
        },
        Command::SetThreshold { amount } => Call::SetLiquidStakeThreshold { threshold: parse_tokens(&amount)? },
        Command::WithdrawFees { to, amount } => Call::WithdrawCollectedFees {
            to: parse_address(&to)?,
            amount: parse_tokens(&amount)?,
        },
        Command::Mint { to, amount } => Call::Mint { to: parse_address(&to)?, amount: parse_tokens(&amount)? },
        Command::Burn { amount } => Call::Burn { amount: parse_tokens(&amount)? },
        Command::Transfer { to, amount } => Call::Transfer { to: parse_address(&to)?, amount: parse_tokens(&amount)? },
        Command::BatchTransfer { to, amounts } => Call::BatchTransfer {
            recipients: to.iter().map(|a| parse_address(a)).collect::<anyhow::Result<_>>()?,
            amounts: amounts.iter().map(|a| parse_tokens(a)).collect::<anyhow::Result<_>>()?,
        },
        Command::Approve { spender, amount } => Call::Approve {
            spender: parse_address(&spender)?,
            amount: parse_tokens(&amount)?,
        },
    };

    let caller = require_caller(caller)?;
    let mut engine = StateEngine::open(Arc::clone(&db)).context("loading ledger state")?;
    let receipt = engine
        .apply(&caller, call, now)
        .map_err(|e| anyhow::anyhow!("rejected ({:?}): {e}", e.kind()))?;
    db.flush().context("flushing state database")?;
    print_receipt(&receipt);
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn cmd_init(db: Arc<StateDb>, config: Option<&Path>, now: Timestamp) -> anyhow::Result<()> {
    if db.height()?.is_some() {
        bail!("data directory already holds a deployed ledger");
    }
    let config = match config {
        Some(path) => {
            let path = expand_tilde(path);
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            DeploymentConfig::from_json(&json)?
        }
        None => DeploymentConfig::default(),
    };

    let state = deploy(&config, now).context("deploying ledger")?;
    StateEngine::with_db(state, db).context("writing genesis state")?;
    info!(owner = %config.owner, "ledger deployed");
    println!("Owner:            {}", config.owner);
    println!("Staking address:  {}", config.staking_address);
    println!("Initial supply:   {} {}", format_tokens(config.initial_supply), config.symbol);
    Ok(())
}

fn cmd_position(state: &LedgerState, who: &Address, now: Timestamp) -> anyhow::Result<()> {
    let q = StakeQuery::new(state);
    println!("Address:       {}", who);
    println!("Token balance: {}", format_tokens(state.token.balance_of(who)));
    println!("Total staked:  {}", format_tokens(q.total_staked(who)));
    for view in q.positions_of(who, now) {
        let status = match view.decision {
            WithdrawalDecision::Forbidden { .. } => "locked".to_string(),
            WithdrawalDecision::Allowed { fee_bps: 0 } => "free".to_string(),
            WithdrawalDecision::Allowed { fee_bps } => format!("fee {fee_bps} bps"),
        };
        println!(
            "  {:<11} #{:<5} {:>24}  {:<20} {:>3} months  {}",
            view.kind,
            view.position.id,
            format_tokens(view.position.amount),
            view.position.round,
            view.months_elapsed,
            status,
        );
    }
    Ok(())
}

fn cmd_stakers(state: &LedgerState) -> anyhow::Result<()> {
    let q = StakeQuery::new(state);
    println!("Height {}: {} stakers", q.height(), q.stakers_count());
    for staker in q.stakers() {
        println!("  {}  {}", staker, format_tokens(q.total_staked(&staker)));
    }
    Ok(())
}

fn cmd_airdrop(state: &LedgerState, total: Amount, aux: Option<&Path>) -> anyhow::Result<()> {
    let aux: BTreeMap<Address, Amount> = match aux {
        Some(path) => {
            let path = expand_tilde(path);
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&json).context("parsing auxiliary balances")?
        }
        None => BTreeMap::new(),
    };

    let q = StakeQuery::new(state);
    let rows = allocate(&q, &aux, total)?;
    for row in &rows {
        println!(
            "  {}  staked {}  x{}  -> {}",
            row.staker,
            format_tokens(row.staked),
            format_tokens(row.multiplier),
            format_tokens(row.amount),
        );
    }
    let paid: Amount = rows.iter().map(|r| r.amount).sum();
    println!("Distributed {} of {}", format_tokens(paid), format_tokens(total));
    Ok(())
}

fn cmd_info(state: &LedgerState, now: Timestamp) -> anyhow::Result<()> {
    let q = StakeQuery::new(state);
    let token = &state.token;
    let supply = token.supply();
    println!("Height:             {}", state.height);
    println!("Committed at:       {}", format_timestamp(state.committed_at));
    println!("Token:              {} ({}, {} decimals)", token.name, token.symbol, token.decimals);
    println!("Owner:              {}", token.owner());
    println!("Total supply:       {}", format_tokens(token.total_supply()));
    println!("Mintable now:       {}", format_tokens(supply.remaining(now)));
    println!("Minting ends at:    {}", format_timestamp(supply.mint_ends_at()));
    println!("Staking address:    {}", state.staking.address());
    println!("Chunk threshold:    {}", format_tokens(q.threshold()));
    println!("Total locked:       {}", format_tokens(q.total_locked()));
    println!("Collected fees:     {}", format_tokens(q.collected_fees()));
    println!("Stakers:            {}", q.stakers_count());
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn load_state(db: &StateDb, snapshot: &Snapshot) -> anyhow::Result<LedgerState> {
    let state = match (snapshot.height, snapshot.at) {
        (Some(h), _) => db.state_at(h)?,
        (None, Some(t)) => db.state_at_time(t)?,
        (None, None) => db.latest_state()?,
    };
    state.context("no ledger deployed in this data directory; run `init` first")
}

fn require_caller(caller: Option<Address>) -> anyhow::Result<Address> {
    caller.context("this command needs --as <address>")
}

fn parse_address(s: &str) -> anyhow::Result<Address> {
    match s.strip_prefix('@') {
        Some(label) => Ok(Address::from_label(label)),
        None => Address::from_b58(s).map_err(|e| anyhow::anyhow!("invalid address: {e}")),
    }
}

fn print_receipt(receipt: &Receipt) {
    println!("Committed at height {}", receipt.height);
    for event in &receipt.events {
        println!("  {:?}", event);
    }
}

fn format_timestamp(ts: Timestamp) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

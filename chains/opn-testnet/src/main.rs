use opn_testnet::captcha::NoCaptchaSolver;
use opn_testnet::claim::ClaimOperation;
use opn_testnet::config::OpnConfig;
use opn_testnet::faucet::FaucetOperation;
use opn_testnet::{client, preflight, wallets};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use core_logic::{
    setup_logger, BatchConfig, BatchRunner, Entity, Operation, ProxyManager, ReportWriter,
    WalletManager,
};
use dialoguer::{theme::ColorfulTheme, Password};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,
    /// Key file (JSON array or one key per line)
    #[arg(short, long, global = true)]
    wallets: Option<String>,
    #[arg(short, long, global = true)]
    proxies: Option<String>,
    /// Report path (wallet file path for `generate`)
    #[arg(short, long, global = true)]
    output: Option<String>,
    #[arg(long, global = true)]
    workers: Option<usize>,
    #[arg(long, global = true)]
    max_attempts: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send the reward claim transaction from every wallet
    Claim,
    /// Request testnet funds from the faucet for every wallet
    Faucet,
    /// Create fresh wallets
    Generate {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG from it reaches the filter; keep guard alive for file logging
    dotenv().ok();
    let _log_guard = setup_logger();

    let args = Args::parse();

    if let Command::Generate { count, force } = &args.command {
        return generate(*count, args.output.as_deref().unwrap_or("wallet.json"), *force);
    }

    info!(target: "batch", "Loading config from: {}", args.config);
    let mut config = OpnConfig::load(&args.config).context("Failed to load config")?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    match args.command {
        Command::Claim => run_claim(&config, &args).await,
        Command::Faucet => run_faucet(&config, &args).await,
        Command::Generate { .. } => Ok(()),
    }
}

fn apply_overrides(config: &mut OpnConfig, args: &Args) {
    if args.wallets.is_some() {
        config.wallet_file = args.wallets.clone();
    }
    if args.proxies.is_some() {
        config.proxy_file = args.proxies.clone();
    }

    let batch = match args.command {
        Command::Faucet => &mut config.faucet.batch,
        _ => &mut config.claim.batch,
    };
    if let Some(workers) = args.workers {
        *batch = batch.clone().with_concurrency(workers);
    }
    if let Some(max_attempts) = args.max_attempts {
        *batch = batch.clone().with_max_attempts(max_attempts);
    }
}

fn load_entities(config: &OpnConfig) -> Result<Vec<Entity>> {
    let path = WalletManager::resolve_path(config.wallet_file.as_deref());
    info!(target: "batch", "Loading wallets from: {}", path.display());

    let loaded = WalletManager::load(&path)?;

    let entities = wallets::into_entities(&loaded);
    info!(target: "batch", "Loaded {} wallets", entities.len());
    Ok(entities)
}

async fn run_claim(config: &OpnConfig, args: &Args) -> Result<()> {
    info!(target: "batch", "Network: {} (chain {})", config.network_name, config.chain_id);

    let proxies = ProxyManager::load(config.proxy_file.as_deref())?;
    let proxy = proxies.pick().map(|(_, p)| p.clone());
    let provider = client::build_provider(&config.rpc_url, proxy.as_ref())?;

    if let Err(e) = preflight::check_rpc(&provider, &config.rpc_url, config.chain_id).await {
        error!(target: "batch", "RPC check failed: {:#}", e);
        return Err(e);
    }

    let entities = load_entities(config)?;
    let entities = wallets::with_balances(&provider, entities, "OPN").await;
    if entities.is_empty() {
        bail!("No usable wallets found");
    }

    let operation: Arc<dyn Operation> = Arc::new(ClaimOperation::new(config, provider)?);
    let output = args.output.as_deref().unwrap_or(config.claim.output.as_str());
    run_batch(operation, &config.claim.batch, entities, output).await
}

async fn run_faucet(config: &OpnConfig, args: &Args) -> Result<()> {
    let user_token = match &config.faucet.user_token {
        Some(token) => token.clone(),
        None => prompt_user_token()?,
    };

    let entities = load_entities(config)?;
    if entities.is_empty() {
        bail!("No usable wallets found");
    }

    let proxies = ProxyManager::load(config.proxy_file.as_deref())?;
    if !proxies.is_empty() {
        info!(target: "batch", "Loaded {} proxies for rotation.", proxies.len());
    }

    let solver = Arc::new(NoCaptchaSolver::new(&config.faucet, user_token)?);
    let operation: Arc<dyn Operation> =
        Arc::new(FaucetOperation::new(&config.faucet, solver, proxies));
    let output = args.output.as_deref().unwrap_or(config.faucet.output.as_str());
    run_batch(operation, &config.faucet.batch, entities, output).await
}

fn prompt_user_token() -> Result<String> {
    error!(target: "batch", "USER_TOKEN is not set.");
    match Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter captcha service user token")
        .interact()
    {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Ok(_) => bail!("Empty captcha user token"),
        Err(_) => bail!("Cannot prompt for USER_TOKEN (not a terminal). Set it in .env or config."),
    }
}

async fn run_batch(
    operation: Arc<dyn Operation>,
    batch: &BatchConfig,
    entities: Vec<Entity>,
    output: &str,
) -> Result<()> {
    let runner = BatchRunner::from_config(operation, batch);
    let token = BatchRunner::shutdown_on_ctrl_c();

    let report = runner.run(entities, token).await;

    let writer = ReportWriter::new(output);
    writer.write(&report).await?;
    Ok(())
}

fn generate(count: usize, output: &str, force: bool) -> Result<()> {
    let generated = wallets::generate(count);
    let detail = wallets::write_generated(Path::new(output), &generated, force)?;

    for w in &generated {
        info!(target: "batch", "  [{}] {}", w.index, w.address);
    }
    info!(
        target: "batch",
        "Generated {} wallets -> {} (details: {})",
        generated.len(),
        output,
        detail.display()
    );
    Ok(())
}

use account_service::{Bank, BankConfig};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use common::decimal::Amount;
use common::model::{AccountId, ClientId, NewClient};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bank ledger CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database URL (defaults to DATABASE_URL)
    #[arg(short, long)]
    database_url: Option<String>,

    /// Database pool size
    #[arg(short, long)]
    pool_size: Option<u32>,

    /// Log every recorded operation
    #[arg(short, long)]
    transaction_logging: bool,

    /// Commands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the database migrations
    Migrate,
    /// Register a client
    RegisterClient {
        #[arg(long)]
        national_id: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        phone: String,
        /// Birth date, YYYY-MM-DD
        #[arg(long)]
        birth_date: NaiveDate,
    },
    /// Open a checking account
    OpenChecking {
        #[arg(long)]
        client: ClientId,
    },
    /// Open a savings account
    OpenSavings {
        #[arg(long)]
        client: ClientId,
        #[arg(long)]
        passbook: bool,
    },
    /// Deposit into an account
    Deposit {
        #[arg(long)]
        client: ClientId,
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: Amount,
        #[arg(long, default_value = "Deposit")]
        description: String,
    },
    /// Debit an account
    Debit {
        #[arg(long)]
        client: ClientId,
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: Amount,
        #[arg(long, default_value = "Withdrawal")]
        description: String,
    },
    /// Transfer between two accounts
    Transfer {
        #[arg(long)]
        from_client: ClientId,
        #[arg(long)]
        to_client: ClientId,
        #[arg(long)]
        from_account: AccountId,
        #[arg(long)]
        to_account: AccountId,
        #[arg(long)]
        amount: Amount,
    },
    /// Close an account and delete its operations
    Close {
        #[arg(long)]
        client: ClientId,
        #[arg(long)]
        account: AccountId,
    },
    /// Charge maintenance fees to checking accounts below the threshold
    ApplyFees,
    /// Pay interest to savings accounts
    ApplyInterest,
    /// Show the accounts of a client
    Show {
        #[arg(long)]
        client: ClientId,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "account_service={level},common={level}",
            level = cli.log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = BankConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(pool_size) = cli.pool_size {
        config.db_pool_size = pool_size;
    }
    config.transaction_logging |= cli.transaction_logging;

    info!(
        "Starting bank '{}' with database pool size: {}, transaction logging: {}",
        config.bank_name, config.db_pool_size, config.transaction_logging
    );

    let bank = Bank::with_config(&config).await?;

    let result = match cli.command {
        Commands::Migrate => {
            let pool = common::db::init_db_pool(&config.database_url, 1).await?;
            common::db::run_migrations(&pool).await
        }
        Commands::RegisterClient { national_id, first_name, last_name, phone, birth_date } => {
            let client = NewClient { national_id, first_name, last_name, phone, birth_date };
            bank.register_client(client).await
                .map(|id| println!("Registered client {}", id))
        }
        Commands::OpenChecking { client } => {
            bank.open_checking_account(client).await
                .map(|id| println!("Opened checking account {}", id))
        }
        Commands::OpenSavings { client, passbook } => {
            bank.open_savings_account(client, passbook).await
                .map(|id| println!("Opened savings account {}", id))
        }
        Commands::Deposit { client, account, amount, description } => {
            bank.deposit(client, account, amount, &description).await
                .map(|account| print!("{}", account))
        }
        Commands::Debit { client, account, amount, description } => {
            bank.debit(client, account, amount, &description).await
                .map(|account| print!("{}", account))
        }
        Commands::Transfer { from_client, to_client, from_account, to_account, amount } => {
            bank.transfer(from_client, to_client, from_account, to_account, amount).await
                .map(|outcome| print!("{}\n{}", outcome.source, outcome.destination))
        }
        Commands::Close { client, account } => {
            bank.close_account(client, account).await
                .map(|()| println!("Closed account {}", account))
        }
        Commands::ApplyFees => {
            bank.apply_fees_to_all_checking(bank.fee_config()).await
                .map(|report| println!("Charged {} accounts, total {}", report.affected.len(), report.total))
        }
        Commands::ApplyInterest => {
            bank.apply_interest_to_all_savings(bank.interest_config()).await
                .map(|report| println!("Credited {} accounts, total {}", report.affected.len(), report.total))
        }
        Commands::Show { client, json } => {
            match bank.client_accounts(client).await {
                Ok(accounts) if json => {
                    println!("{}", serde_json::to_string_pretty(&accounts)?);
                    Ok(())
                }
                Ok(accounts) => {
                    for account in accounts {
                        println!("{}", account);
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_recoverable() => {
            warn!("{}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

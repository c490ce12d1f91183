//! Multisig CLI Application
//!
//! A command-line interface for registries, multisig wallets and tokens.

use clap::{Parser, Subcommand};
use multisig_registry::api::{create_router, ApiState, WsBroadcaster};
use multisig_registry::cli::{self, AppState};
use multisig_registry::core::{Address, AdminAction};
use multisig_registry::multisig::{CreateWallet, Proposal, TxFilter, TxQuery};
use multisig_registry::storage::{Storage, StorageConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Parser)]
#[command(name = "multisig")]
#[command(version = "0.1.0")]
#[command(about = "Multisig wallets with a registry and member index", long_about = None)]
struct Cli {
    /// Data directory for runtime state
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new data directory
    Init {
        /// Delete existing state first
        #[arg(long)]
        force: bool,
    },

    /// Show runtime status
    Status,

    /// External account operations
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Credit native value to an address
    Fund {
        #[arg(short, long)]
        address: String,

        #[arg(long)]
        amount: u128,
    },

    /// Show the native balance of an address
    Balance {
        #[arg(short, long)]
        address: String,
    },

    /// Transfer native value
    Transfer {
        #[arg(short, long)]
        from: String,

        #[arg(short, long)]
        to: String,

        #[arg(long)]
        amount: u128,
    },

    /// Registry operations
    Registry {
        #[command(subcommand)]
        action: RegistryCommands,
    },

    /// Multisig wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Token operations
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },

    /// Show recorded events
    Events {
        /// Only events after this sequence number
        #[arg(long)]
        since: Option<u64>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export state to file
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import state from file
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List backups, or restore one (0 is the newest)
    Restore {
        index: Option<usize>,
    },

    /// REST API server
    Api {
        #[command(subcommand)]
        action: ApiCommands,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Create a random account address
    New {
        /// Fund the new account with this amount
        #[arg(long)]
        fund: Option<u128>,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// Deploy a registry administered by the deployer
    Deploy {
        #[arg(long)]
        deployer: String,
    },

    /// Show a registry, or one of its wallets
    Info {
        #[arg(short, long)]
        registry: String,

        #[arg(short, long)]
        wallet: Option<String>,
    },

    /// Rename a wallet (registry admin only)
    Rename {
        #[arg(long)]
        caller: String,

        #[arg(short, long)]
        registry: String,

        #[arg(short, long)]
        wallet: String,

        #[arg(short, long)]
        name: String,
    },

    /// Change a wallet description (registry admin only)
    Describe {
        #[arg(long)]
        caller: String,

        #[arg(short, long)]
        registry: String,

        #[arg(short, long)]
        wallet: String,

        #[arg(short, long)]
        description: String,
    },

    /// List the wallets a member belongs to
    MemberWallets {
        #[arg(short, long)]
        registry: String,

        #[arg(short, long)]
        member: String,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a wallet through a registry
    Create {
        #[arg(long)]
        creator: String,

        #[arg(short, long)]
        registry: String,

        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Member addresses (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        members: Vec<Address>,

        #[arg(long)]
        required: usize,

        /// Seed for a predictable address
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Deploy a wallet outside of any registry
    Deploy {
        #[arg(long)]
        deployer: String,

        #[arg(short, long, value_delimiter = ',')]
        members: Vec<Address>,

        #[arg(long)]
        required: usize,
    },

    /// Show wallet details
    Info {
        #[arg(short, long)]
        wallet: String,
    },

    /// Submit a transaction
    Submit {
        #[arg(long)]
        caller: String,

        #[arg(short, long)]
        wallet: String,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        destination: String,

        #[arg(long, default_value = "0")]
        value: u128,

        /// Hex-encoded call data
        #[arg(long)]
        data: Option<String>,
    },

    /// Propose a membership change
    Propose {
        #[arg(long)]
        caller: String,

        #[arg(short, long)]
        wallet: String,

        #[command(subcommand)]
        action: ProposeCommands,
    },

    /// Confirm a transaction
    Confirm {
        #[arg(long)]
        caller: String,

        #[arg(short, long)]
        wallet: String,

        #[arg(long)]
        id: u64,
    },

    /// Revoke a confirmation
    Revoke {
        #[arg(long)]
        caller: String,

        #[arg(short, long)]
        wallet: String,

        #[arg(long)]
        id: u64,
    },

    /// Execute a confirmed transaction
    Execute {
        #[arg(long)]
        caller: String,

        #[arg(short, long)]
        wallet: String,

        #[arg(long)]
        id: u64,
    },

    /// List transactions
    Txs {
        #[arg(short, long)]
        wallet: String,

        /// Only pending transactions
        #[arg(long)]
        pending: bool,

        /// Only executed transactions
        #[arg(long)]
        executed: bool,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ProposeCommands {
    AddMember {
        #[arg(long)]
        member: String,
    },
    RemoveMember {
        #[arg(long)]
        member: String,
    },
    ReplaceMember {
        #[arg(long)]
        member: String,

        #[arg(long)]
        new_member: String,
    },
    ChangeRequirement {
        #[arg(long)]
        required: usize,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Deploy a token owned by a wallet
    Deploy {
        #[arg(long)]
        deployer: String,

        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        symbol: String,

        #[arg(long, default_value = "18")]
        decimals: u8,

        /// Owning wallet
        #[arg(long)]
        owner: String,

        #[arg(long, default_value = "0")]
        supply: u128,
    },

    /// Show a token balance
    Balance {
        #[arg(short, long)]
        token: String,

        #[arg(long)]
        holder: String,
    },

    /// Print transfer call data for `wallet submit --data`
    TransferPayload {
        #[arg(long)]
        to: String,

        #[arg(long)]
        amount: u128,
    },
}

#[derive(Subcommand)]
enum ApiCommands {
    /// Start the REST API server
    Start {
        /// Port to listen on for REST API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Handle init command separately (doesn't need full state)
    if let Commands::Init { force } = &cli.command {
        return cli::cmd_init(&cli.data_dir, *force);
    }

    // Handle API commands with tokio runtime
    if let Commands::Api { ref action } = cli.command {
        return run_api_command(action, &cli.data_dir);
    }

    if let Commands::Token {
        action: TokenCommands::TransferPayload { ref to, amount },
    } = cli.command
    {
        return cli::cmd_token_transfer_payload(to, amount);
    }

    // Initialize application state
    let mut state = AppState::new(cli.data_dir.clone())?;

    // Process commands
    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Api { .. } => unreachable!(),

        Commands::Status => {
            cli::cmd_status(&state)?;
        }

        Commands::Account { action } => match action {
            AccountCommands::New { fund } => {
                cli::cmd_account_new(&mut state, fund)?;
            }
        },

        Commands::Fund { address, amount } => {
            cli::cmd_fund(&mut state, &address, amount)?;
        }

        Commands::Balance { address } => {
            cli::cmd_balance(&state, &address)?;
        }

        Commands::Transfer { from, to, amount } => {
            cli::cmd_transfer(&mut state, &from, &to, amount)?;
        }

        Commands::Registry { action } => match action {
            RegistryCommands::Deploy { deployer } => {
                cli::cmd_registry_deploy(&mut state, &deployer)?;
            }
            RegistryCommands::Info { registry, wallet } => {
                cli::cmd_registry_info(&state, &registry, wallet.as_deref())?;
            }
            RegistryCommands::Rename {
                caller,
                registry,
                wallet,
                name,
            } => {
                cli::cmd_registry_rename(&mut state, &caller, &registry, &wallet, &name)?;
            }
            RegistryCommands::Describe {
                caller,
                registry,
                wallet,
                description,
            } => {
                cli::cmd_registry_describe(&mut state, &caller, &registry, &wallet, &description)?;
            }
            RegistryCommands::MemberWallets {
                registry,
                member,
                offset,
                limit,
            } => {
                cli::cmd_registry_member_wallets(&state, &registry, &member, offset, limit)?;
            }
        },

        Commands::Wallet { action } => run_wallet_command(&mut state, action)?,

        Commands::Token { action } => match action {
            TokenCommands::Deploy {
                deployer,
                name,
                symbol,
                decimals,
                owner,
                supply,
            } => {
                cli::cmd_token_deploy(&mut state, &deployer, &name, &symbol, decimals, &owner, supply)?;
            }
            TokenCommands::Balance { token, holder } => {
                cli::cmd_token_balance(&state, &token, &holder)?;
            }
            TokenCommands::TransferPayload { .. } => unreachable!(),
        },

        Commands::Events { since, limit } => {
            cli::cmd_events(&state, since, limit)?;
        }

        Commands::Export { output } => {
            cli::cmd_export(&state, &output)?;
        }

        Commands::Import { input } => {
            cli::cmd_import(&mut state, &input)?;
        }

        Commands::Restore { index } => {
            cli::cmd_restore(&mut state, index)?;
        }
    }

    Ok(())
}

fn run_wallet_command(state: &mut AppState, action: WalletCommands) -> cli::CliResult<()> {
    match action {
        WalletCommands::Create {
            creator,
            registry,
            name,
            description,
            members,
            required,
            seed,
        } => {
            let request = CreateWallet {
                name,
                description,
                members,
                required,
                seed,
            };
            cli::cmd_wallet_create(state, &creator, &registry, request)
        }
        WalletCommands::Deploy {
            deployer,
            members,
            required,
        } => cli::cmd_wallet_deploy(state, &deployer, members, required),
        WalletCommands::Info { wallet } => cli::cmd_wallet_info(state, &wallet),
        WalletCommands::Submit {
            caller,
            wallet,
            title,
            description,
            destination,
            value,
            data,
        } => {
            let data = cli::parse_data(data.as_deref())?;
            let proposal = Proposal::new(title, description, Address::new(destination), value, data);
            cli::cmd_wallet_submit(state, &caller, &wallet, proposal)
        }
        WalletCommands::Propose {
            caller,
            wallet,
            action,
        } => {
            let action = match action {
                ProposeCommands::AddMember { member } => AdminAction::AddMember {
                    member: Address::new(member),
                },
                ProposeCommands::RemoveMember { member } => AdminAction::RemoveMember {
                    member: Address::new(member),
                },
                ProposeCommands::ReplaceMember { member, new_member } => {
                    AdminAction::ReplaceMember {
                        member: Address::new(member),
                        new_member: Address::new(new_member),
                    }
                }
                ProposeCommands::ChangeRequirement { required } => {
                    AdminAction::ChangeRequirement { required }
                }
            };
            cli::cmd_wallet_propose(state, &caller, &wallet, action)
        }
        WalletCommands::Confirm { caller, wallet, id } => {
            cli::cmd_wallet_confirm(state, &caller, &wallet, id)
        }
        WalletCommands::Revoke { caller, wallet, id } => {
            cli::cmd_wallet_revoke(state, &caller, &wallet, id)
        }
        WalletCommands::Execute { caller, wallet, id } => {
            cli::cmd_wallet_execute(state, &caller, &wallet, id)
        }
        WalletCommands::Txs {
            wallet,
            pending,
            executed,
            offset,
            limit,
        } => {
            // Neither flag means both
            let filter = if pending || executed {
                TxFilter::from_flags(pending, executed)
            } else {
                TxFilter::all()
            };
            cli::cmd_wallet_txs(state, &wallet, TxQuery::new(filter, offset, limit))
        }
    }
}

fn run_api_command(
    action: &ApiCommands,
    data_dir: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            ApiCommands::Start { port } => {
                // Initialize storage
                let storage_config = StorageConfig {
                    data_dir: data_dir.clone(),
                    ..Default::default()
                };
                let storage = Arc::new(Storage::new(storage_config)?);

                if storage.exists() {
                    println!("📂 Loading existing state...");
                } else {
                    println!("📂 Creating new state...");
                }
                let runtime = storage.load_or_default()?;
                storage.save(&runtime)?;

                let state = ApiState {
                    runtime: Arc::new(RwLock::new(runtime)),
                    storage: storage.clone(),
                    ws_broadcaster: Arc::new(WsBroadcaster::new()),
                };

                // Clone state for shutdown handler
                let shutdown_state = state.clone();

                let app = create_router(state);

                let addr = format!("0.0.0.0:{}", port);
                println!("🚀 REST API server starting on http://localhost:{}", port);
                println!();
                println!("📖 Available endpoints:");
                println!("   GET  /health                                  - Health check");
                println!("   GET  /ws                                      - WebSocket events");
                println!("   POST /api/registries                          - Deploy registry");
                println!("   POST /api/registries/{{addr}}/wallets           - Create wallet");
                println!("   GET  /api/registries/{{addr}}/wallets/{{w}}       - Wallet entry");
                println!("   GET  /api/registries/{{addr}}/members/{{m}}       - Member wallets");
                println!("   GET  /api/wallets/{{addr}}                      - Wallet details");
                println!("   POST /api/wallets/{{addr}}/submit               - Submit transaction");
                println!("   POST /api/wallets/{{addr}}/confirm              - Confirm transaction");
                println!("   POST /api/wallets/{{addr}}/revoke               - Revoke confirmation");
                println!("   POST /api/wallets/{{addr}}/execute              - Execute transaction");
                println!("   GET  /api/wallets/{{addr}}/transactions         - List transactions");
                println!("   GET  /api/wallets/{{addr}}/transactions/{{id}}    - Get transaction");
                println!("   GET  /api/events                              - Event log");
                println!();

                // Handle Ctrl+C with graceful shutdown
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    println!("\n📴 Shutting down API server...");
                    println!("💾 Saving data...");

                    let runtime = shutdown_state.runtime.read().await;
                    if let Err(e) = shutdown_state.storage.save(&runtime) {
                        log::error!("Failed to save state: {}", e);
                    }

                    println!("✅ Data saved. Goodbye!");
                    std::process::exit(0);
                });

                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;

                Ok(())
            }
        }
    })
}

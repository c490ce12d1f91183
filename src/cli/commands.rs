//! CLI commands for the multisig runtime
//!
//! Every command loads the runtime from the data directory, applies one
//! operation and writes the state back.

use crate::core::call::TxId;
use crate::core::{Address, AdminAction, EventRecord, TokenCall};
use crate::multisig::{CreateWallet, Proposal, TxFilter, TxQuery};
use crate::runtime::{Receipt, Runtime};
use crate::storage::{Storage, StorageConfig};
use std::path::PathBuf;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub runtime: Runtime,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize application state
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let storage_config = StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        };

        let storage = Storage::new(storage_config)?;

        let runtime = if storage.exists() {
            log::debug!("Loading runtime state from {:?}", data_dir);
            storage.load()?
        } else {
            println!("🆕 Creating new runtime state...");
            let runtime = Runtime::new();
            storage.save(&runtime)?;
            runtime
        };

        Ok(Self {
            runtime,
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.runtime)?;
        Ok(())
    }

    /// Print every event recorded after `seq`
    fn print_events_since(&self, seq: u64) {
        for record in self.runtime.events_since(seq) {
            print_record(record);
        }
    }
}

fn print_record(record: &EventRecord) {
    println!(
        "   #{} {} {}",
        record.seq,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.event
    );
}

fn print_receipt(receipt: &Receipt) {
    match &receipt.execution {
        Some(outcome) if outcome.is_success() => {
            println!("   ✅ Transaction #{} executed", receipt.id)
        }
        Some(_) => println!("   ❌ Transaction #{} execution failed (can be retried)", receipt.id),
        None => println!("   ⏳ Transaction #{} awaiting confirmations", receipt.id),
    }
}

/// Decode optional `0x`-prefixed hex call data
pub fn parse_data(data: Option<&str>) -> CliResult<Vec<u8>> {
    match data {
        Some(hex_str) => Ok(hex::decode(hex_str.trim_start_matches("0x"))?),
        None => Ok(Vec::new()),
    }
}

/// Initialize a new data directory
pub fn cmd_init(data_dir: &PathBuf, force: bool) -> CliResult<()> {
    let storage_config = StorageConfig {
        data_dir: data_dir.clone(),
        ..Default::default()
    };

    let storage = Storage::new(storage_config)?;

    if storage.exists() {
        if !force {
            println!("⚠️  State already exists at {:?}", data_dir);
            println!("   Use --force to reinitialize (this will delete existing data)");
            return Ok(());
        }
        storage.delete()?;
    }

    storage.save(&Runtime::new())?;

    println!("✅ Runtime initialized!");
    println!("   📁 Data directory: {:?}", data_dir);

    Ok(())
}

/// Display runtime status
pub fn cmd_status(state: &AppState) -> CliResult<()> {
    let stats = state.storage.stats()?;

    println!("📊 Runtime Status");
    println!("   ├─ Registries: {}", state.runtime.registries().count());
    println!("   ├─ Wallets: {}", state.runtime.wallets().count());
    println!("   ├─ Tokens: {}", state.runtime.tokens().count());
    println!("   ├─ Events: {}", state.runtime.events().len());
    println!("   ├─ State file: {} bytes", stats.file_size);
    println!("   └─ Backups: {}", stats.backup_count);

    Ok(())
}

/// Create a fresh external account
pub fn cmd_account_new(state: &mut AppState, fund: Option<u128>) -> CliResult<()> {
    let account = Address::random();

    println!("🔐 New account created!");
    println!("   📍 Address: {}", account);
    if let Some(amount) = fund {
        let balance = state.runtime.fund(&account, amount);
        state.save()?;
        println!("   💰 Balance: {}", balance);
    }

    Ok(())
}

/// Credit native value to an account
pub fn cmd_fund(state: &mut AppState, account: &str, amount: u128) -> CliResult<()> {
    let balance = state.runtime.fund(&Address::new(account), amount);
    state.save()?;

    println!("💰 Funded {} with {}", account, amount);
    println!("   New balance: {}", balance);

    Ok(())
}

pub fn cmd_balance(state: &AppState, address: &str) -> CliResult<()> {
    let balance = state.runtime.balance_of(&Address::new(address));
    println!("💰 Balance for {}: {}", address, balance);
    Ok(())
}

/// Move native value between accounts
pub fn cmd_transfer(state: &mut AppState, from: &str, to: &str, amount: u128) -> CliResult<()> {
    let seq = state.runtime.events().last_seq();
    state
        .runtime
        .transfer(&Address::new(from), &Address::new(to), amount)?;
    state.save()?;

    println!("📤 Transferred {} from {} to {}", amount, from, to);
    state.print_events_since(seq);

    Ok(())
}

// ============================================================================
// Registry
// ============================================================================

pub fn cmd_registry_deploy(state: &mut AppState, deployer: &str) -> CliResult<()> {
    let address = state.runtime.deploy_registry(&Address::new(deployer));
    state.save()?;

    println!("🏛️  Registry deployed!");
    println!("   📍 Address: {}", address);
    println!("   👤 Admin: {}", deployer);

    Ok(())
}

pub fn cmd_registry_info(state: &AppState, registry: &str, wallet: Option<&str>) -> CliResult<()> {
    let registry = state.runtime.registry(&Address::new(registry))?;

    if let Some(wallet) = wallet {
        let info = registry.wallet_info(&Address::new(wallet))?;
        println!("📋 Wallet {}", info.wallet);
        println!("   ├─ Name: {}", info.name);
        println!("   ├─ Description: {}", info.description);
        println!("   ├─ Creator: {}", info.creator);
        println!("   └─ Created: {}", info.created_at.format("%Y-%m-%d %H:%M:%S"));
        return Ok(());
    }

    println!("🏛️  Registry {}", registry.address);
    println!("   ├─ Admin: {}", registry.admin);
    println!("   └─ Wallets: {}", registry.wallet_count());
    for info in registry.wallets() {
        println!("      └─ {} {:?}", info.wallet, info.name);
    }

    Ok(())
}

pub fn cmd_registry_rename(
    state: &mut AppState,
    caller: &str,
    registry: &str,
    wallet: &str,
    name: &str,
) -> CliResult<()> {
    state.runtime.change_name(
        &Address::new(caller),
        &Address::new(registry),
        &Address::new(wallet),
        name,
    )?;
    state.save()?;

    println!("✏️  Wallet {} renamed to {:?}", wallet, name);
    Ok(())
}

pub fn cmd_registry_describe(
    state: &mut AppState,
    caller: &str,
    registry: &str,
    wallet: &str,
    description: &str,
) -> CliResult<()> {
    state.runtime.change_description(
        &Address::new(caller),
        &Address::new(registry),
        &Address::new(wallet),
        description,
    )?;
    state.save()?;

    println!("✏️  Description of {} updated", wallet);
    Ok(())
}

/// List the wallets a member belongs to
pub fn cmd_registry_member_wallets(
    state: &AppState,
    registry: &str,
    member: &str,
    offset: usize,
    limit: usize,
) -> CliResult<()> {
    let registry = state.runtime.registry(&Address::new(registry))?;
    let member = Address::new(member);
    let total = registry.number_of_wallets_for_member(&member);
    let page = registry.wallets_for_member(&member, offset, limit);

    if total == 0 {
        println!("📭 {} is not a member of any wallet in this registry", member);
        return Ok(());
    }

    println!("📋 Wallets for {} ({} total):", member, total);
    for info in &page {
        println!("   {} ({}) - {}", info.wallet, info.name, info.description);
    }

    Ok(())
}

// ============================================================================
// Wallets
// ============================================================================

/// Create a wallet through a registry
pub fn cmd_wallet_create(
    state: &mut AppState,
    creator: &str,
    registry: &str,
    request: CreateWallet,
) -> CliResult<()> {
    let name = request.name.clone();
    let address =
        state
            .runtime
            .create_wallet(&Address::new(creator), &Address::new(registry), request)?;
    state.save()?;

    let wallet = state.runtime.wallet(&address)?;
    println!("🔐 Multisig wallet created!");
    println!("   📍 Address: {}", address);
    println!("   🏷️  Name: {}", name);
    println!("   🔢 Policy: {}", wallet.description());

    Ok(())
}

/// Deploy a wallet outside of any registry
pub fn cmd_wallet_deploy(
    state: &mut AppState,
    deployer: &str,
    members: Vec<Address>,
    required: usize,
) -> CliResult<()> {
    let address = state
        .runtime
        .deploy_wallet(&Address::new(deployer), members, required)?;
    state.save()?;

    println!("🔐 Standalone wallet deployed!");
    println!("   📍 Address: {}", address);
    println!("   🔢 Policy: {}", state.runtime.wallet(&address)?.description());

    Ok(())
}

pub fn cmd_wallet_info(state: &AppState, wallet: &str) -> CliResult<()> {
    let address = Address::new(wallet);
    let wallet = state.runtime.wallet(&address)?;

    println!("🔐 Wallet {}", wallet.address);
    println!("   ├─ Policy: {}", wallet.description());
    println!("   ├─ Balance: {}", state.runtime.balance_of(&address));
    if let Some(registry) = wallet.registry() {
        println!("   ├─ Registry: {}", registry);
    }
    println!(
        "   ├─ Transactions: {} pending, {} executed",
        wallet.transaction_count(TxFilter::PENDING),
        wallet.transaction_count(TxFilter::EXECUTED)
    );
    println!("   └─ Members:");
    for member in wallet.members() {
        println!("      └─ {}", member);
    }

    Ok(())
}

/// Submit an arbitrary transaction
pub fn cmd_wallet_submit(
    state: &mut AppState,
    caller: &str,
    wallet: &str,
    proposal: Proposal,
) -> CliResult<()> {
    let seq = state.runtime.events().last_seq();
    let receipt = state
        .runtime
        .submit(&Address::new(caller), &Address::new(wallet), proposal)?;
    state.save()?;

    println!("📝 Transaction #{} submitted", receipt.id);
    print_receipt(&receipt);
    state.print_events_since(seq);

    Ok(())
}

/// Submit a membership change addressed to the wallet itself
pub fn cmd_wallet_propose(
    state: &mut AppState,
    caller: &str,
    wallet: &str,
    action: AdminAction,
) -> CliResult<()> {
    let title = match &action {
        AdminAction::AddMember { member } => format!("Add member {}", member),
        AdminAction::RemoveMember { member } => format!("Remove member {}", member),
        AdminAction::ReplaceMember { member, new_member } => {
            format!("Replace member {} with {}", member, new_member)
        }
        AdminAction::ChangeRequirement { required } => format!("Change requirement to {}", required),
    };
    let proposal = Proposal::new(title, "", Address::new(wallet), 0, action.encode());
    cmd_wallet_submit(state, caller, wallet, proposal)
}

pub fn cmd_wallet_confirm(state: &mut AppState, caller: &str, wallet: &str, id: TxId) -> CliResult<()> {
    let seq = state.runtime.events().last_seq();
    let receipt = state
        .runtime
        .confirm(&Address::new(caller), &Address::new(wallet), id)?;
    state.save()?;

    println!("✍️  Transaction #{} confirmed by {}", id, caller);
    print_receipt(&receipt);
    state.print_events_since(seq);

    Ok(())
}

pub fn cmd_wallet_revoke(state: &mut AppState, caller: &str, wallet: &str, id: TxId) -> CliResult<()> {
    state
        .runtime
        .revoke(&Address::new(caller), &Address::new(wallet), id)?;
    state.save()?;

    println!("↩️  Confirmation of #{} revoked by {}", id, caller);
    Ok(())
}

pub fn cmd_wallet_execute(state: &mut AppState, caller: &str, wallet: &str, id: TxId) -> CliResult<()> {
    let seq = state.runtime.events().last_seq();
    let receipt = state
        .runtime
        .execute(&Address::new(caller), &Address::new(wallet), id)?;
    state.save()?;

    print_receipt(&receipt);
    state.print_events_since(seq);

    Ok(())
}

/// List transactions of a wallet
pub fn cmd_wallet_txs(state: &AppState, wallet: &str, query: TxQuery) -> CliResult<()> {
    let wallet = state.runtime.wallet(&Address::new(wallet))?;
    let ids = wallet.transaction_ids(&query);

    if ids.is_empty() {
        println!("📭 No matching transactions");
        return Ok(());
    }

    println!("📋 Transactions of {}:", wallet.address);
    for id in ids {
        let tx = wallet.transaction(id)?;
        println!(
            "   #{} [{:?}] {} → {} value {} | {}/{} confirmations",
            tx.id,
            tx.status(),
            tx.title,
            tx.destination,
            tx.value,
            tx.confirmation_count(),
            wallet.required()
        );
        if let Some(reason) = &tx.last_failure {
            println!("      └─ last failure: {}", reason);
        }
    }

    Ok(())
}

// ============================================================================
// Tokens
// ============================================================================

pub fn cmd_token_deploy(
    state: &mut AppState,
    deployer: &str,
    name: &str,
    symbol: &str,
    decimals: u8,
    owner: &str,
    supply: u128,
) -> CliResult<()> {
    let address = state.runtime.deploy_token(
        &Address::new(deployer),
        name,
        symbol,
        decimals,
        &Address::new(owner),
        supply,
    )?;
    state.save()?;

    println!("🪙 Token created!");
    println!("   📍 Address: {}", address);
    println!("   🏷️  {} ({}), {} decimals", name, symbol, decimals);
    println!("   👤 Owner: {}", owner);
    println!("   💰 Initial supply: {}", supply);

    Ok(())
}

pub fn cmd_token_balance(state: &AppState, token: &str, holder: &str) -> CliResult<()> {
    let token = state.runtime.token(&Address::new(token))?;
    let balance = token.balance_of(&Address::new(holder));
    println!("🪙 {} balance of {}: {}", token.symbol(), holder, balance);
    Ok(())
}

/// Print the call data of a token transfer, for use with `wallet submit --data`
pub fn cmd_token_transfer_payload(to: &str, amount: u128) -> CliResult<()> {
    let payload = TokenCall::Transfer {
        to: Address::new(to),
        amount,
    }
    .encode();
    println!("0x{}", hex::encode(payload));
    Ok(())
}

// ============================================================================
// Events and state files
// ============================================================================

pub fn cmd_events(state: &AppState, since: Option<u64>, limit: usize) -> CliResult<()> {
    let records = match since {
        Some(seq) => state.runtime.events_since(seq),
        None => state.runtime.events().latest(limit),
    };

    if records.is_empty() {
        println!("📭 No events");
        return Ok(());
    }

    println!("📜 Events:");
    for record in records.iter().take(limit) {
        print_record(record);
    }

    Ok(())
}

/// Export runtime state to file
pub fn cmd_export(state: &AppState, path: &PathBuf) -> CliResult<()> {
    crate::storage::save_to_file(&state.runtime, path)?;
    println!("📦 State exported to {:?}", path);
    Ok(())
}

/// Import runtime state from file
pub fn cmd_import(state: &mut AppState, path: &PathBuf) -> CliResult<()> {
    state.runtime = crate::storage::load_from_file(path)?;
    state.save()?;

    println!("📥 State imported from {:?}", path);
    println!("   Wallets: {}", state.runtime.wallets().count());

    Ok(())
}

/// List backups, or roll the state back to backup `index` (0 is the newest)
pub fn cmd_restore(state: &mut AppState, index: Option<usize>) -> CliResult<()> {
    let Some(index) = index else {
        let backups = state.storage.list_backups();
        if backups.is_empty() {
            println!("📭 No backups in {:?}", state.data_dir);
        } else {
            println!("🗄️  Backups (newest first):");
            for i in backups {
                println!("   └─ {}", i);
            }
        }
        return Ok(());
    };

    state.runtime = state.storage.restore_backup(index)?;
    // The replaced state becomes the newest backup
    state.save()?;

    println!("⏪ Restored backup {}", index);
    println!("   Events: {}", state.runtime.events().len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_data() {
        assert!(parse_data(None).unwrap().is_empty());
        assert_eq!(parse_data(Some("0x0a0b")).unwrap(), vec![0x0a, 0x0b]);
        assert_eq!(parse_data(Some("ff")).unwrap(), vec![0xff]);
        assert!(parse_data(Some("0xzz")).is_err());
    }

    #[test]
    fn test_state_survives_commands() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        cmd_init(&data_dir, false).unwrap();

        let alice = "0xalice";
        let bob = "0xbob";
        let registry = {
            let mut state = AppState::new(data_dir.clone()).unwrap();
            cmd_registry_deploy(&mut state, alice).unwrap();
            let address = state.runtime.registries().next().unwrap().address.clone();
            address
        };

        let mut state = AppState::new(data_dir.clone()).unwrap();
        let request = CreateWallet {
            name: "Team".to_string(),
            description: "ops".to_string(),
            members: vec![Address::new(alice), Address::new(bob)],
            required: 2,
            seed: Some(1),
        };
        cmd_wallet_create(&mut state, alice, registry.as_str(), request).unwrap();
        let wallet = state.runtime.wallets().next().unwrap().address.clone();
        cmd_fund(&mut state, wallet.as_str(), 50).unwrap();

        let proposal = Proposal::new("pay", "", Address::new("0xcarol"), 20, Vec::new());
        cmd_wallet_submit(&mut state, alice, wallet.as_str(), proposal).unwrap();

        let mut state = AppState::new(data_dir).unwrap();
        cmd_wallet_confirm(&mut state, bob, wallet.as_str(), 1).unwrap();
        assert_eq!(state.runtime.balance_of(&Address::new("0xcarol")), 20);
        assert_eq!(state.runtime.balance_of(&wallet), 30);
    }

    #[test]
    fn test_init_force_resets_state() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        cmd_init(&data_dir, false).unwrap();
        {
            let mut state = AppState::new(data_dir.clone()).unwrap();
            cmd_registry_deploy(&mut state, "0xalice").unwrap();
        }

        cmd_init(&data_dir, false).unwrap();
        assert_eq!(AppState::new(data_dir.clone()).unwrap().runtime.registries().count(), 1);

        cmd_init(&data_dir, true).unwrap();
        assert_eq!(AppState::new(data_dir).unwrap().runtime.registries().count(), 0);
    }

    #[test]
    fn test_restore_rolls_back_last_command() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        cmd_init(&data_dir, false).unwrap();

        let mut state = AppState::new(data_dir.clone()).unwrap();
        cmd_fund(&mut state, "0xalice", 10).unwrap();
        cmd_fund(&mut state, "0xalice", 5).unwrap();
        assert_eq!(state.storage.list_backups(), vec![0, 1]);
        cmd_restore(&mut state, None).unwrap();

        cmd_restore(&mut state, Some(0)).unwrap();
        assert_eq!(state.runtime.balance_of(&Address::new("0xalice")), 10);
        let reloaded = AppState::new(data_dir).unwrap();
        assert_eq!(reloaded.runtime.balance_of(&Address::new("0xalice")), 10);

        assert!(cmd_restore(&mut state, Some(4)).is_err());
    }
}

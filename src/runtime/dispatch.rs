//! Call dispatch and transaction execution
//!
//! Every call goes through `Runtime::invoke`: value moves first, then the
//! target handles the payload. A failed call leaves no trace. Ledger entries
//! are journaled before they change, and a failure replays the journal back to
//! the checkpoint taken when the call started.

use crate::core::call::{AdminAction, RegistryCall, TokenCall, TxId, WalletRequest};
use crate::core::{Address, Event};
use crate::multisig::{Dispatch, ExecutionOutcome, MembershipChange, MultisigError, Proposal};
use crate::multisig::{MultiSigWallet, Registry};
use crate::runtime::endpoint::{CallFrame, EndpointContext, InvokeError, MAX_CALL_DEPTH};
use crate::runtime::runtime::Runtime;
use crate::token::Token;
use std::collections::HashMap;

/// Kind of ledger entry about to change
#[derive(Clone, Copy, Debug)]
pub(crate) enum Entry {
    Balance,
    Registry,
    Wallet,
    Token,
}

/// Prior value of a ledger entry; `None` when it did not exist
#[derive(Debug)]
pub(crate) enum Undo {
    Balance(Address, Option<u128>),
    Registry(Address, Option<Registry>),
    Wallet(Address, Option<MultiSigWallet>),
    Token(Address, Option<Token>),
}

/// Journal and event-log lengths when a call started
struct Checkpoint {
    journal: usize,
    events: usize,
}

fn put_back<V>(map: &mut HashMap<Address, V>, address: Address, prior: Option<V>) {
    match prior {
        Some(value) => {
            map.insert(address, value);
        }
        None => {
            map.remove(&address);
        }
    }
}

impl Runtime {
    /// Journal the current value of an entry before it changes
    ///
    /// Outside a call there is nothing to roll back to.
    pub(crate) fn touch(&mut self, entry: Entry, address: &Address) {
        if self.depth == 0 {
            return;
        }
        let ledger = &self.ledger;
        let key = address.clone();
        let undo = match entry {
            Entry::Balance => Undo::Balance(key, ledger.balances.get(address).copied()),
            Entry::Registry => Undo::Registry(key, ledger.registries.get(address).cloned()),
            Entry::Wallet => Undo::Wallet(key, ledger.wallets.get(address).cloned()),
            Entry::Token => Undo::Token(key, ledger.tokens.get(address).cloned()),
        };
        self.journal.push(undo);
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            journal: self.journal.len(),
            events: self.events.len(),
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        let undone = self.journal.split_off(checkpoint.journal);
        for undo in undone.into_iter().rev() {
            let ledger = &mut self.ledger;
            match undo {
                Undo::Balance(address, prior) => put_back(&mut ledger.balances, address, prior),
                Undo::Registry(address, prior) => put_back(&mut ledger.registries, address, prior),
                Undo::Wallet(address, prior) => put_back(&mut ledger.wallets, address, prior),
                Undo::Token(address, prior) => put_back(&mut ledger.tokens, address, prior),
            }
        }
        self.events.truncate(checkpoint.events);
    }

    /// Invoke `target` with `value` and `payload` on behalf of `caller`
    ///
    /// Atomic: on error nothing the call did is kept.
    pub(crate) fn invoke(
        &mut self,
        caller: &Address,
        target: &Address,
        value: u128,
        payload: &[u8],
    ) -> Result<(), InvokeError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(InvokeError::CallDepthExceeded);
        }

        let checkpoint = self.checkpoint();
        self.depth += 1;
        let result = self
            .move_value(caller, target, value)
            .and_then(|()| self.dispatch(caller, target, value, payload));
        self.depth -= 1;

        match &result {
            Err(err) => {
                log::debug!("Call from {} to {} reverted: {}", caller, target, err);
                self.rollback(checkpoint);
            }
            // Top-level call committed
            Ok(()) if self.depth == 0 => self.journal.clear(),
            Ok(()) => {}
        }
        result
    }

    fn move_value(&mut self, from: &Address, to: &Address, value: u128) -> Result<(), InvokeError> {
        if value == 0 {
            return Ok(());
        }
        let have = self.balance_of(from);
        if have < value {
            return Err(InvokeError::InsufficientBalance { have, need: value });
        }
        if from == to {
            return Ok(());
        }

        self.touch(Entry::Balance, from);
        self.touch(Entry::Balance, to);
        let balances = &mut self.ledger.balances;
        *balances.entry(from.clone()).or_insert(0) -= value;
        let credit = balances.entry(to.clone()).or_insert(0);
        *credit = credit.saturating_add(value);
        Ok(())
    }

    fn dispatch(
        &mut self,
        caller: &Address,
        target: &Address,
        value: u128,
        payload: &[u8],
    ) -> Result<(), InvokeError> {
        if self.ledger.registries.contains_key(target) {
            let call = RegistryCall::decode(payload)
                .ok_or_else(|| InvokeError::UnknownCall(target.clone()))?;
            self.touch(Entry::Registry, target);
            if let Some(registry) = self.ledger.registries.get_mut(target) {
                registry.handle(caller, &call)?;
            }
            return Ok(());
        }

        if self.ledger.wallets.contains_key(target) {
            return self.dispatch_wallet(caller, target, value, payload);
        }

        if self.ledger.tokens.contains_key(target) {
            let call =
                TokenCall::decode(payload).ok_or_else(|| InvokeError::UnknownCall(target.clone()))?;
            self.touch(Entry::Token, target);
            if let Some(token) = self.ledger.tokens.get_mut(target) {
                let event = token.handle(caller, &call)?;
                self.events.push(event);
            }
            return Ok(());
        }

        if self.endpoints.contains_key(target) {
            let frame = CallFrame {
                caller: caller.clone(),
                target: target.clone(),
                value,
                payload: payload.to_vec(),
                depth: self.depth,
            };
            return self.dispatch_endpoint(&frame);
        }

        // Plain account
        if payload.is_empty() {
            Ok(())
        } else {
            Err(InvokeError::NotAContract(target.clone()))
        }
    }

    fn dispatch_wallet(
        &mut self,
        caller: &Address,
        wallet: &Address,
        value: u128,
        payload: &[u8],
    ) -> Result<(), InvokeError> {
        if value > 0 {
            self.events.push(Event::Deposit {
                wallet: wallet.clone(),
                sender: caller.clone(),
                value,
            });
        }
        if payload.is_empty() {
            return Ok(());
        }

        if let Some(action) = AdminAction::decode(payload) {
            if caller != wallet {
                return Err(MultisigError::Unauthorized(format!(
                    "{} cannot change the membership of {}",
                    caller, wallet
                ))
                .into());
            }
            return self
                .run_admin(wallet, &action)
                .map_err(|reason| InvokeError::Reverted(wallet.clone(), reason));
        }

        match WalletRequest::decode(payload) {
            Some(WalletRequest::Submit {
                title,
                description,
                destination,
                value,
                data,
            }) => {
                let proposal = Proposal::new(title, description, destination, value, data);
                self.submit_as(caller, wallet, proposal)?;
            }
            Some(WalletRequest::Confirm { id }) => {
                self.confirm_as(caller, wallet, id)?;
            }
            Some(WalletRequest::Revoke { id }) => self.revoke_as(caller, wallet, id)?,
            Some(WalletRequest::Execute { id }) => {
                self.execute_as(caller, wallet, id)?;
            }
            None => return Err(InvokeError::UnknownCall(wallet.clone())),
        }
        Ok(())
    }

    fn dispatch_endpoint(&mut self, frame: &CallFrame) -> Result<(), InvokeError> {
        let mut endpoint = self
            .endpoints
            .get_mut(&frame.target)
            .and_then(Option::take)
            .ok_or_else(|| InvokeError::EndpointBusy(frame.target.clone()))?;

        let mut ctx = EndpointContext::new(self, frame.target.clone());
        let result = endpoint.invoke(&mut ctx, frame);
        self.endpoints.insert(frame.target.clone(), Some(endpoint));
        result
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Shared by implicit (confirm) and explicit (execute) triggers
    ///
    /// A failing call is not an error here: it is recorded on the transaction
    /// and reported through the returned outcome.
    pub(crate) fn attempt_execution(
        &mut self,
        wallet: &Address,
        id: TxId,
    ) -> Result<ExecutionOutcome, MultisigError> {
        let dispatch = self.wallet_mut(wallet)?.begin_execution(id)?;
        log::debug!("Executing #{} on {}", id, wallet);

        let result = match dispatch {
            Dispatch::Admin(action) => self.run_admin(wallet, &action),
            Dispatch::Invoke {
                destination,
                value,
                data,
            } => self
                .invoke(wallet, &destination, value, &data)
                .map_err(|err| err.to_string()),
        };

        let outcome = self.wallet_mut(wallet)?.finish_execution(id, result);
        match &outcome {
            ExecutionOutcome::Executed => {
                self.events.push(Event::Execution {
                    wallet: wallet.clone(),
                    id,
                });
            }
            ExecutionOutcome::Failed(reason) => {
                log::warn!("Execution of #{} on {} failed: {}", id, wallet, reason);
                self.events.push(Event::ExecutionFailure {
                    wallet: wallet.clone(),
                    id,
                    reason: reason.clone(),
                });
            }
        }
        Ok(outcome)
    }

    /// Apply a membership change and report it to the wallet's registry
    ///
    /// Both sides change or neither does.
    fn run_admin(&mut self, wallet: &Address, action: &AdminAction) -> Result<(), String> {
        let w = self.wallet_mut(wallet).map_err(|e| e.to_string())?;
        let snapshot = w.membership();
        let registry = w.registry().cloned();
        let change = w.apply_admin(action).map_err(|e| e.to_string())?;

        if let Some(registry) = registry {
            if let Err(err) = self.report_to_registry(wallet, &registry, &change) {
                if let Ok(w) = self.wallet_mut(wallet) {
                    w.restore_membership(snapshot);
                }
                return Err(err.to_string());
            }
        }

        for member in &change.removed {
            self.events.push(Event::MemberRemoval {
                wallet: wallet.clone(),
                member: member.clone(),
            });
        }
        for member in &change.added {
            self.events.push(Event::MemberAddition {
                wallet: wallet.clone(),
                member: member.clone(),
            });
        }
        if let Some(required) = change.required {
            self.events.push(Event::RequirementChange {
                wallet: wallet.clone(),
                required,
            });
        }
        Ok(())
    }

    /// Issue the registry callbacks for `change`, with `wallet` as caller
    fn report_to_registry(
        &mut self,
        wallet: &Address,
        registry: &Address,
        change: &MembershipChange,
    ) -> Result<(), InvokeError> {
        let calls: Vec<RegistryCall> = change
            .removed
            .iter()
            .map(|member| RegistryCall::RemoveMember {
                member: member.clone(),
                wallet: wallet.clone(),
            })
            .chain(change.added.iter().map(|member| RegistryCall::AddMember {
                member: member.clone(),
                wallet: wallet.clone(),
            }))
            .collect();

        let saved = self.ledger.registries.get(registry).cloned();
        for call in calls {
            if let Err(err) = self.invoke(wallet, registry, 0, &call.encode()) {
                if let Some(saved) = saved {
                    self.touch(Entry::Registry, registry);
                    self.ledger.registries.insert(registry.clone(), saved);
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multisig::{CreateWallet, TxFilter, TxQuery};
    use crate::runtime::{Endpoint, EndpointContext, Receipt, RuntimeError};
    use crate::token::TokenError;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::sync::{Arc, Mutex};

    /// Registry, a 2-of-3 wallet with members A, B, C and a funded wallet
    struct Fixture {
        runtime: Runtime,
        deployer: Address,
        registry: Address,
        wallet: Address,
        a: Address,
        b: Address,
        c: Address,
    }

    impl Fixture {
        fn new() -> Self {
            let mut runtime = Runtime::new();
            let deployer = Address::random();
            let (a, b, c) = (Address::random(), Address::random(), Address::random());
            let registry = runtime.deploy_registry(&deployer);
            let wallet = runtime
                .create_wallet(
                    &deployer,
                    &registry,
                    CreateWallet {
                        name: "Treasury".to_string(),
                        description: "Team funds".to_string(),
                        members: vec![a.clone(), b.clone(), c.clone()],
                        required: 2,
                        seed: None,
                    },
                )
                .unwrap();
            runtime.fund(&deployer, 1_000);
            runtime.transfer(&deployer, &wallet, 100).unwrap();

            Self {
                runtime,
                deployer,
                registry,
                wallet,
                a,
                b,
                c,
            }
        }

        fn pay(&self, to: &Address, value: u128) -> Proposal {
            Proposal::new("pay", "payment", to.clone(), value, vec![])
        }

        fn admin(&self, action: AdminAction) -> Proposal {
            Proposal::new("admin", "membership", self.wallet.clone(), 0, action.encode())
        }

        fn submit(&mut self, caller: &Address, proposal: Proposal) -> Receipt {
            let wallet = self.wallet.clone();
            self.runtime.submit(caller, &wallet, proposal).unwrap()
        }

        fn confirm(&mut self, caller: &Address, id: TxId) -> Receipt {
            let wallet = self.wallet.clone();
            self.runtime.confirm(caller, &wallet, id).unwrap()
        }

        /// Submit by A, confirm by B
        fn pass(&mut self, proposal: Proposal) -> Receipt {
            let (a, b) = (self.a.clone(), self.b.clone());
            let id = self.submit(&a, proposal).id;
            self.confirm(&b, id)
        }

        fn wallets_of(&self, member: &Address) -> Vec<Address> {
            self.runtime
                .registry(&self.registry)
                .unwrap()
                .wallets_for_member(member, 0, 100)
                .into_iter()
                .map(|info| info.wallet)
                .collect()
        }
    }

    /// Endpoint running a closure
    struct Hook<F>(F);

    impl<F> Endpoint for Hook<F>
    where
        F: FnMut(&mut EndpointContext<'_>, &CallFrame) -> Result<(), InvokeError> + Send + Sync,
    {
        fn invoke(&mut self, ctx: &mut EndpointContext<'_>, frame: &CallFrame) -> Result<(), InvokeError> {
            (self.0)(ctx, frame)
        }
    }

    fn hook<F>(f: F) -> Box<dyn Endpoint>
    where
        F: FnMut(&mut EndpointContext<'_>, &CallFrame) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        Box::new(Hook(f))
    }

    #[test]
    fn test_confirm_reaching_quorum_executes() {
        let mut f = Fixture::new();
        let x = Address::random();

        let id = f.submit(&f.a.clone(), f.pay(&x, 10)).id;
        assert_eq!(id, 1);
        assert_eq!(f.runtime.wallet(&f.wallet).unwrap().confirmations(1).unwrap(), &[f.a.clone()]);

        let receipt = f.confirm(&f.b.clone(), id);
        assert!(receipt.executed());
        assert!(f.runtime.wallet(&f.wallet).unwrap().transaction(1).unwrap().executed);
        assert_eq!(f.runtime.balance_of(&x), 10);
        assert_eq!(f.runtime.balance_of(&f.wallet), 90);

        let tail: Vec<&Event> = f.runtime.events().iter().skip(2).collect();
        assert_eq!(
            tail,
            vec![
                &Event::Submission { wallet: f.wallet.clone(), id },
                &Event::Confirmation { wallet: f.wallet.clone(), id, member: f.a.clone() },
                &Event::Confirmation { wallet: f.wallet.clone(), id, member: f.b.clone() },
                &Event::Execution { wallet: f.wallet.clone(), id },
            ]
        );
    }

    #[test]
    fn test_execution_after_requirement_lowered() {
        let mut f = Fixture::new();
        let (a, b) = (f.a.clone(), f.b.clone());
        let x = Address::random();

        let pending = f.submit(&a, f.pay(&x, 5)).id;
        let change = f.submit(&a, f.admin(AdminAction::ChangeRequirement { required: 1 })).id;

        let all = TxFilter::PENDING | TxFilter::EXECUTED;
        let wallet = f.runtime.wallet(&f.wallet).unwrap();
        assert_eq!(wallet.transaction_ids(&TxQuery::new(TxFilter::PENDING, 0, 100)), vec![pending, change]);
        assert!(matches!(
            f.runtime.execute(&a, &f.wallet.clone(), pending),
            Err(RuntimeError::Multisig(MultisigError::InsufficientConfirmations { have: 1, need: 2 }))
        ));

        assert!(f.confirm(&b, change).executed());
        let wallet = f.runtime.wallet(&f.wallet).unwrap();
        assert_eq!(wallet.required(), 1);
        assert_eq!(wallet.transaction_ids(&TxQuery::new(TxFilter::EXECUTED, 0, 100)), vec![change]);

        let receipt = f.runtime.execute(&a, &f.wallet.clone(), pending).unwrap();
        assert!(receipt.executed());
        let wallet = f.runtime.wallet(&f.wallet).unwrap();
        assert_eq!(wallet.transaction_ids(&TxQuery::new(all, 0, 100)), vec![pending, change]);
        assert_eq!(wallet.transaction_count(TxFilter::EXECUTED), 2);
        assert_eq!(f.runtime.balance_of(&x), 5);
    }

    #[test]
    fn test_failed_transfer_is_soft_and_retryable() {
        let mut f = Fixture::new();
        let (a, b) = (f.a.clone(), f.b.clone());
        let x = Address::random();

        let id = f.submit(&a, f.pay(&x, 1_000)).id;
        let receipt = f.confirm(&b, id);

        assert!(matches!(receipt.execution, Some(ExecutionOutcome::Failed(_))));
        let tx = f.runtime.wallet(&f.wallet).unwrap().transaction(id).unwrap();
        assert!(!tx.executed);
        assert_eq!(tx.confirmations(), &[a.clone(), b.clone()]);
        assert!(tx.last_failure.is_some());
        assert!(matches!(
            f.runtime.events().iter().last(),
            Some(Event::ExecutionFailure { .. })
        ));
        assert_eq!(f.runtime.balance_of(&f.wallet), 100);

        // Anyone may retry once the wallet can pay
        f.runtime.fund(&f.wallet.clone(), 900);
        let outsider = Address::random();
        let retry = f.runtime.execute(&outsider, &f.wallet.clone(), id).unwrap();
        assert!(retry.executed());
        assert_eq!(f.runtime.balance_of(&x), 1_000);
    }

    #[test]
    fn test_executed_at_most_once() {
        let mut f = Fixture::new();
        let (a, c) = (f.a.clone(), f.c.clone());
        let x = Address::random();
        let receipt = f.pass(f.pay(&x, 10));
        let id = receipt.id;

        // Late confirmation is recorded but inert
        let late = f.confirm(&c, id);
        assert_eq!(late.execution, None);
        assert_eq!(f.runtime.wallet(&f.wallet).unwrap().confirmation_count(id).unwrap(), 3);
        assert_eq!(f.runtime.balance_of(&x), 10);

        let wallet = f.wallet.clone();
        assert_eq!(
            f.runtime.execute(&a, &wallet, id),
            Err(RuntimeError::Multisig(MultisigError::AlreadyExecuted(id)))
        );
        assert_eq!(
            f.runtime.revoke(&a, &wallet, id),
            Err(RuntimeError::Multisig(MultisigError::AlreadyExecuted(id)))
        );
    }

    #[test]
    fn test_double_confirm_and_revoke_rules() {
        let mut f = Fixture::new();
        let (a, b) = (f.a.clone(), f.b.clone());
        let wallet = f.wallet.clone();
        let id = f.submit(&a, f.pay(&Address::random(), 1)).id;

        assert_eq!(
            f.runtime.confirm(&a, &wallet, id),
            Err(RuntimeError::Multisig(MultisigError::AlreadyConfirmed(id)))
        );
        assert_eq!(
            f.runtime.revoke(&b, &wallet, id),
            Err(RuntimeError::Multisig(MultisigError::NotConfirmed(id)))
        );
        f.runtime.revoke(&a, &wallet, id).unwrap();
        assert!(matches!(
            f.runtime.events().iter().last(),
            Some(Event::Revocation { .. })
        ));
        assert!(matches!(
            f.runtime.confirm(&Address::random(), &wallet, id),
            Err(RuntimeError::Multisig(MultisigError::Unauthorized(_)))
        ));
    }

    #[test]
    fn test_submit_executes_when_submitter_meets_threshold() {
        let mut runtime = Runtime::new();
        let member = Address::random();
        let wallet = runtime.deploy_wallet(&member, vec![member.clone()], 1).unwrap();
        runtime.fund(&wallet, 10);

        let x = Address::random();
        let receipt = runtime
            .submit(&member, &wallet, Proposal::new("pay", "", x.clone(), 3, vec![]))
            .unwrap();
        assert!(receipt.executed());
        assert_eq!(runtime.balance_of(&x), 3);
    }

    #[test]
    fn test_membership_changes_sync_registry() {
        let mut f = Fixture::new();
        let (a, b, c) = (f.a.clone(), f.b.clone(), f.c.clone());
        let d = Address::random();
        let e = Address::random();

        assert!(f.pass(f.admin(AdminAction::AddMember { member: d.clone() })).executed());
        assert_eq!(f.wallets_of(&d), vec![f.wallet.clone()]);
        assert!(f.runtime.wallet(&f.wallet).unwrap().is_member(&d));

        assert!(f
            .pass(f.admin(AdminAction::ReplaceMember { member: c.clone(), new_member: e.clone() }))
            .executed());
        assert!(f.wallets_of(&c).is_empty());
        assert_eq!(f.wallets_of(&e), vec![f.wallet.clone()]);
        assert_eq!(
            f.runtime.wallet(&f.wallet).unwrap().members(),
            &[a.clone(), b.clone(), e.clone(), d.clone()]
        );

        assert!(f.pass(f.admin(AdminAction::RemoveMember { member: d.clone() })).executed());
        assert!(f.wallets_of(&d).is_empty());
        assert!(f.runtime.events().iter().any(|ev| matches!(ev, Event::MemberRemoval { member, .. } if *member == d)));
    }

    #[test]
    fn test_remove_member_clamps_requirement() {
        let mut f = Fixture::new();
        let (a, b, c) = (f.a.clone(), f.b.clone(), f.c.clone());

        // 3-of-3 then drop C
        assert!(f.pass(f.admin(AdminAction::ChangeRequirement { required: 3 })).executed());
        let id = f.submit(&a, f.admin(AdminAction::RemoveMember { member: c.clone() })).id;
        assert!(!f.confirm(&b, id).executed());
        assert!(f.confirm(&c, id).executed());

        let wallet = f.runtime.wallet(&f.wallet).unwrap();
        assert_eq!(wallet.required(), 2);
        assert_eq!(wallet.members().len(), 2);
        assert!(f.runtime.events().iter().any(|ev| {
            matches!(ev, Event::RequirementChange { required: 2, .. })
        }));
    }

    #[test]
    fn test_invalid_admin_action_fails_execution() {
        let mut f = Fixture::new();
        let receipt = f.pass(f.admin(AdminAction::ChangeRequirement { required: 5 }));
        assert!(matches!(receipt.execution, Some(ExecutionOutcome::Failed(_))));
        assert_eq!(f.runtime.wallet(&f.wallet).unwrap().required(), 2);
    }

    #[test]
    fn test_rejected_callback_rolls_back_membership() {
        let mut f = Fixture::new();
        let d = Address::random();
        let wallet = f.wallet.clone();

        // Corrupt the index so the registry refuses the duplicate entry
        f.runtime
            .ledger
            .registries
            .get_mut(&f.registry)
            .unwrap()
            .add_member(&wallet, &d, &wallet)
            .unwrap();
        let before = f.runtime.events().len();

        let receipt = f.pass(f.admin(AdminAction::AddMember { member: d.clone() }));
        assert!(matches!(receipt.execution, Some(ExecutionOutcome::Failed(_))));

        let w = f.runtime.wallet(&wallet).unwrap();
        assert!(!w.is_member(&d));
        assert_eq!(w.members().len(), 3);
        assert!(!f
            .runtime
            .events()
            .iter()
            .skip(before)
            .any(|ev| matches!(ev, Event::MemberAddition { .. })));
    }

    #[test]
    fn test_cross_wallet_guard() {
        let mut runtime = Runtime::new();
        let deployer = Address::random();
        let members: Vec<Address> = (0..3).map(|_| Address::random()).collect();
        let f0 = runtime.deploy_registry(&deployer);
        let f1 = runtime.deploy_registry(&deployer);
        let request = || CreateWallet {
            name: "w".to_string(),
            description: String::new(),
            members: members.clone(),
            required: 2,
            seed: None,
        };
        let w0 = runtime.create_wallet(&deployer, &f0, request()).unwrap();
        let w1 = runtime.create_wallet(&deployer, &f1, request()).unwrap();
        let x = Address::random();

        let to_other = RegistryCall::AddMember { member: x.clone(), wallet: w0.clone() }.encode();
        assert_eq!(
            runtime.submit(&members[0], &w0, Proposal::new("t", "d", f1.clone(), 0, to_other)),
            Err(RuntimeError::Multisig(MultisigError::InvalidFunctionCall))
        );
        let about_w1 = RegistryCall::RemoveMember { member: members[0].clone(), wallet: w1.clone() }.encode();
        assert_eq!(
            runtime.submit(&members[0], &w0, Proposal::new("t", "d", f1.clone(), 0, about_w1)),
            Err(RuntimeError::Multisig(MultisigError::InvalidFunctionCall))
        );
        assert_eq!(
            runtime.submit(&members[0], &w0, Proposal::new("t", "d", f0.clone(), 0, vec![])),
            Err(RuntimeError::Multisig(MultisigError::InvalidDestination(f0.clone())))
        );
        assert_eq!(runtime.wallet(&w0).unwrap().transactions().len(), 0);

        // Direct callbacks from anyone but the wallet itself are refused
        let forged = RegistryCall::AddMember { member: x.clone(), wallet: w1.clone() }.encode();
        assert!(matches!(
            runtime.call(&members[0], &f1, 0, &forged),
            Err(RuntimeError::Invoke(InvokeError::Multisig(MultisigError::Unauthorized(_))))
        ));
        assert_eq!(runtime.registry(&f1).unwrap().number_of_wallets_for_member(&x), 0);
    }

    #[test]
    fn test_endpoint_cannot_act_as_a_wallet() {
        let mut runtime = Runtime::new();
        let deployer = Address::random();
        let members = vec![Address::random(), Address::random()];
        let registry = runtime.deploy_registry(&deployer);
        let request = || CreateWallet {
            name: "w".to_string(),
            description: String::new(),
            members: members.clone(),
            required: 1,
            seed: None,
        };
        let w0 = runtime.create_wallet(&deployer, &registry, request()).unwrap();
        let w1 = runtime.create_wallet(&deployer, &registry, request()).unwrap();
        let x = Address::random();
        let endpoint = Address::random();
        let seen: Arc<Mutex<Vec<Result<(), InvokeError>>>> = Arc::default();

        let log = Arc::clone(&seen);
        let (to, member) = (registry.clone(), x.clone());
        let (on_behalf_of, caller) = ([w1.clone(), w0.clone()], w0.clone());
        runtime
            .register_endpoint(
                endpoint.clone(),
                hook(move |ctx, frame| {
                    assert_eq!(frame.caller, caller);
                    for wallet in &on_behalf_of {
                        let add = RegistryCall::AddMember { member: member.clone(), wallet: wallet.clone() };
                        let result = ctx.call(&to, 0, &add.encode());
                        log.lock().unwrap().push(result);
                    }
                    Ok(())
                }),
            )
            .unwrap();

        // W0 alone meets its threshold, so submit runs the endpoint
        let receipt = runtime
            .submit(&members[0], &w0, Proposal::new("t", "d", endpoint.clone(), 0, vec![]))
            .unwrap();
        assert!(receipt.executed());

        let results = seen.lock().unwrap();
        assert_eq!(results.len(), 2);
        for result in results.iter() {
            assert!(matches!(
                result,
                Err(InvokeError::Multisig(MultisigError::Unauthorized(_)))
            ));
        }
        let index = runtime.registry(&registry).unwrap();
        assert_eq!(index.number_of_wallets_for_member(&x), 0);
        assert!(!runtime.wallet(&w1).unwrap().is_member(&x));
    }

    #[test]
    fn test_endpoint_receives_call_frame() {
        let mut f = Fixture::new();
        let endpoint = Address::random();
        let seen: Arc<Mutex<Option<CallFrame>>> = Arc::default();

        let log = Arc::clone(&seen);
        f.runtime
            .register_endpoint(
                endpoint.clone(),
                hook(move |ctx, frame| {
                    assert_eq!(ctx.address(), &frame.target);
                    *log.lock().unwrap() = Some(frame.clone());
                    Ok(())
                }),
            )
            .unwrap();

        let receipt = f.pass(Proposal::new("t", "d", endpoint.clone(), 7, vec![1, 2, 3]));
        assert!(receipt.executed());

        let frame = seen.lock().unwrap().clone().unwrap();
        assert_eq!(frame.caller, f.wallet);
        assert_eq!(frame.target, endpoint);
        assert_eq!(frame.value, 7);
        assert_eq!(frame.payload, vec![1, 2, 3]);
        assert_eq!(frame.depth, 1);
        assert_eq!(f.runtime.balance_of(&endpoint), 7);
        assert_eq!(f.runtime.balance_of(&f.wallet), 93);
    }

    #[test]
    fn test_reentrant_confirm_is_blocked() {
        let mut runtime = Runtime::new();
        let a = Address::random();
        let hook = Address::random();
        let wallet = runtime.deploy_wallet(&a, vec![a.clone(), hook.clone()], 2).unwrap();
        let seen: Arc<Mutex<Vec<Result<(), InvokeError>>>> = Arc::default();

        let log = Arc::clone(&seen);
        let target = wallet.clone();
        runtime
            .register_endpoint(
                hook.clone(),
                self::hook(move |ctx, frame| {
                    // Confirm #2 and submit a fresh one while #1 is in flight
                    let confirm = ctx.call(&target, 0, &WalletRequest::Confirm { id: 2 }.encode());
                    let submit = ctx.call(
                        &target,
                        0,
                        &WalletRequest::Submit {
                            title: "nested".to_string(),
                            description: String::new(),
                            destination: frame.target.clone(),
                            value: 0,
                            data: vec![],
                        }
                        .encode(),
                    );
                    log.lock().unwrap().extend([confirm, submit]);
                    Ok(())
                }),
            )
            .unwrap();

        let first = runtime
            .submit(&a, &wallet, Proposal::new("call hook", "", hook.clone(), 0, vec![]))
            .unwrap()
            .id;
        runtime
            .submit(&a, &wallet, Proposal::new("second", "", Address::random(), 0, vec![]))
            .unwrap();

        assert!(seen.lock().unwrap().is_empty());

        // Second confirmation of #1 runs the hook
        let receipt = runtime.confirm(&hook, &wallet, first).unwrap();
        assert!(receipt.executed());

        let results = seen.lock().unwrap();
        assert_eq!(
            results[0],
            Err(InvokeError::Multisig(MultisigError::ReentrantCall(first)))
        );
        assert!(results[1].is_ok());
        let w = runtime.wallet(&wallet).unwrap();
        assert_eq!(w.transactions().len(), 3);
        assert_eq!(w.confirmation_count(2).unwrap(), 1);
        assert_eq!(w.executing(), None);
    }

    #[test]
    fn test_endpoint_busy_and_call_depth() {
        let mut runtime = Runtime::new();
        let caller = Address::random();
        let looping = Address::random();
        runtime
            .register_endpoint(
                looping.clone(),
                hook(|ctx, frame| ctx.call(&frame.target, 0, b"again")),
            )
            .unwrap();

        assert_eq!(
            runtime.call(&caller, &looping, 0, &[]),
            Err(RuntimeError::Invoke(InvokeError::EndpointBusy(looping.clone())))
        );
        // Endpoint is back in place afterwards
        assert!(matches!(runtime.endpoints.get(&looping), Some(Some(_))));

        runtime.depth = MAX_CALL_DEPTH;
        assert_eq!(
            runtime.invoke(&caller, &Address::random(), 0, &[]),
            Err(InvokeError::CallDepthExceeded)
        );
    }

    #[test]
    fn test_failed_call_reverts_everything() {
        let mut runtime = Runtime::new();
        let caller = Address::random();
        let sink = Address::random();
        let failing = Address::random();
        runtime.fund(&caller, 50);

        let to = sink.clone();
        runtime
            .register_endpoint(
                failing.clone(),
                hook(move |ctx, frame| {
                    ctx.call(&to, frame.value, &[])?;
                    Err(InvokeError::Reverted(frame.target.clone(), "nope".to_string()))
                }),
            )
            .unwrap();

        let events = runtime.events().len();
        assert!(runtime.call(&caller, &failing, 20, &[]).is_err());
        assert_eq!(runtime.balance_of(&caller), 50);
        assert_eq!(runtime.balance_of(&sink), 0);
        assert_eq!(runtime.balance_of(&failing), 0);
        assert_eq!(runtime.events().len(), events);
        assert!(runtime.journal.is_empty());
    }

    #[test]
    fn test_inner_failure_keeps_outer_changes() {
        let mut runtime = Runtime::new();
        let caller = Address::random();
        let (kept, dropped, failing) = (Address::random(), Address::random(), Address::random());
        runtime.fund(&caller, 50);

        let to = dropped.clone();
        runtime
            .register_endpoint(
                failing.clone(),
                hook(move |ctx, frame| {
                    ctx.call(&to, 5, &[])?;
                    Err(InvokeError::Reverted(frame.target.clone(), "nope".to_string()))
                }),
            )
            .unwrap();
        let (first, second) = (kept.clone(), failing.clone());
        let outer = Address::random();
        runtime
            .register_endpoint(
                outer.clone(),
                hook(move |ctx, _| {
                    ctx.call(&first, 10, &[])?;
                    assert!(ctx.call(&second, 10, &[]).is_err());
                    Ok(())
                }),
            )
            .unwrap();

        runtime.call(&caller, &outer, 30, &[]).unwrap();
        assert_eq!(runtime.balance_of(&kept), 10);
        assert_eq!(runtime.balance_of(&dropped), 0);
        assert_eq!(runtime.balance_of(&failing), 0);
        assert_eq!(runtime.balance_of(&outer), 20);
        assert_eq!(runtime.balance_of(&caller), 20);
        assert!(runtime.journal.is_empty());
    }

    #[test]
    fn test_plain_calls() {
        let mut f = Fixture::new();
        let deployer = f.deployer.clone();
        let account = Address::random();
        let wallet = f.wallet.clone();

        assert!(matches!(
            f.runtime.events().iter().nth(1),
            Some(Event::Deposit { value: 100, .. })
        ));
        assert_eq!(
            f.runtime.call(&deployer, &account, 0, b"data"),
            Err(RuntimeError::Invoke(InvokeError::NotAContract(account.clone())))
        );
        assert!(f.runtime.call(&deployer, &account, 1, &[]).is_ok());
        assert!(matches!(
            f.runtime.transfer(&account, &deployer, 5),
            Err(RuntimeError::Invoke(InvokeError::InsufficientBalance { have: 1, need: 5 }))
        ));
        assert_eq!(
            f.runtime.call(&deployer, &wallet, 0, b"garbage"),
            Err(RuntimeError::Invoke(InvokeError::UnknownCall(wallet.clone())))
        );
    }

    #[test]
    fn test_outside_admin_call_is_unauthorized() {
        let mut f = Fixture::new();
        let a = f.a.clone();
        let wallet = f.wallet.clone();
        let payload = AdminAction::AddMember { member: a.clone() }.encode();
        assert!(matches!(
            f.runtime.call(&a, &wallet, 0, &payload),
            Err(RuntimeError::Invoke(InvokeError::Multisig(MultisigError::Unauthorized(_))))
        ));
    }

    #[test]
    fn test_wallet_as_member_of_wallet() {
        let mut runtime = Runtime::new();
        let a = Address::random();
        let b = Address::random();
        let inner = runtime.deploy_wallet(&a, vec![a.clone()], 1).unwrap();
        let outer = runtime.deploy_wallet(&a, vec![b.clone(), inner.clone()], 2).unwrap();
        runtime.fund(&outer, 10);
        let x = Address::random();

        let id = runtime
            .submit(&b, &outer, Proposal::new("pay", "", x.clone(), 10, vec![]))
            .unwrap()
            .id;
        // The inner wallet confirms on the outer one through its own transaction
        let confirm = WalletRequest::Confirm { id }.encode();
        let receipt = runtime
            .submit(&a, &inner, Proposal::new("confirm", "", outer.clone(), 0, confirm))
            .unwrap();

        assert!(receipt.executed());
        assert!(runtime.wallet(&outer).unwrap().transaction(id).unwrap().executed);
        assert_eq!(runtime.balance_of(&x), 10);
    }

    #[test]
    fn test_wallet_moves_tokens() {
        let mut f = Fixture::new();
        let deployer = f.deployer.clone();
        let wallet = f.wallet.clone();
        let holder = Address::random();
        let token = f
            .runtime
            .deploy_token(&deployer, "Sample", "SAM", 18, &wallet, 1_000)
            .unwrap();

        let payload = TokenCall::Transfer { to: holder.clone(), amount: 250 }.encode();
        assert!(f.pass(Proposal::new("tokens", "", token.clone(), 0, payload)).executed());
        assert_eq!(f.runtime.token(&token).unwrap().balance_of(&holder), 250);

        let mint = TokenCall::Mint { to: holder.clone(), amount: 1 }.encode();
        assert_eq!(
            f.runtime.call(&holder, &token, 0, &mint),
            Err(RuntimeError::Invoke(InvokeError::Token(TokenError::NotOwner(holder.clone()))))
        );
        assert!(f.pass(Proposal::new("mint", "", token.clone(), 0, mint)).executed());
        assert_eq!(f.runtime.token(&token).unwrap().total_supply(), 1_001);
    }

    /// Departed members' confirmations keep counting toward quorum. This
    /// pins the current behavior; it is not necessarily the desired one.
    #[test]
    fn test_departed_member_confirmation_still_counts() {
        let mut f = Fixture::new();
        let (a, c) = (f.a.clone(), f.c.clone());
        let x = Address::random();

        let id = f.submit(&a, f.pay(&x, 1)).id;
        assert!(f.pass(f.admin(AdminAction::RemoveMember { member: a.clone() })).executed());
        assert!(!f.runtime.wallet(&f.wallet).unwrap().is_member(&a));

        assert!(f.confirm(&c, id).executed());
        assert_eq!(f.runtime.balance_of(&x), 1);
    }

    #[test]
    fn test_wallets_for_member_pagination() {
        let mut runtime = Runtime::new();
        let deployer = Address::random();
        let registry = runtime.deploy_registry(&deployer);
        let m = Address::random();
        let created: Vec<Address> = (0..7)
            .map(|i| {
                runtime
                    .create_wallet(
                        &deployer,
                        &registry,
                        CreateWallet {
                            name: format!("w{i}"),
                            description: String::new(),
                            members: vec![m.clone(), Address::random()],
                            required: 1,
                            seed: None,
                        },
                    )
                    .unwrap()
            })
            .collect();

        let registry = runtime.registry(&registry).unwrap();
        assert_eq!(registry.number_of_wallets_for_member(&m), 7);
        for k in 1..=7 {
            let mut joined: Vec<Address> = registry
                .wallets_for_member(&m, 0, k)
                .into_iter()
                .chain(registry.wallets_for_member(&m, k, 7))
                .map(|info| info.wallet)
                .collect();
            joined.truncate(7);
            assert_eq!(joined, created);
        }
    }

    #[test]
    fn test_threshold_invariant_under_random_membership_changes() {
        let mut f = Fixture::new();
        let mut rng = rand::thread_rng();
        let pool: Vec<Address> = (0..6).map(|_| Address::random()).collect();

        for _ in 0..60 {
            let members = f.runtime.wallet(&f.wallet).unwrap().members().to_vec();
            let action = match rng.gen_range(0..4) {
                0 => AdminAction::AddMember { member: pool.choose(&mut rng).unwrap().clone() },
                1 => AdminAction::RemoveMember { member: members.choose(&mut rng).unwrap().clone() },
                2 => AdminAction::ReplaceMember {
                    member: members.choose(&mut rng).unwrap().clone(),
                    new_member: pool.choose(&mut rng).unwrap().clone(),
                },
                _ => AdminAction::ChangeRequirement { required: rng.gen_range(0..=members.len() + 1) },
            };

            // Every current member confirms until the attempt happens
            let wallet = f.wallet.clone();
            let proposal = f.admin(action);
            let receipt = f.runtime.submit(&members[0], &wallet, proposal).unwrap();
            let mut attempted = receipt.execution.is_some();
            for member in members.iter().skip(1) {
                if attempted {
                    break;
                }
                attempted = f.runtime.confirm(member, &wallet, receipt.id).unwrap().execution.is_some();
            }

            let w = f.runtime.wallet(&wallet).unwrap();
            assert!(w.required() >= 1 && w.required() <= w.members().len());
            for member in w.members() {
                assert!(f.wallets_of(member).contains(&wallet));
            }
        }
    }
}

//! Test Utilities Module
//!
//! An in-memory ledger implementing [`NetworkClient`]. It decodes every
//! submitted envelope, checks signatures and sequence numbers the way the
//! real ledger does, and applies create-account, payment and contract
//! transfer operations to its own balances, so funding flows can be tested
//! end to end without a network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use parking_lot::Mutex;
use stellar_xdr::curr::{
    CreateAccountResult, ExtensionPoint, HostFunction, LedgerFootprint, Limits, MuxedAccount,
    Operation, OperationBody, OperationResult, OperationResultTr, PaymentResult, PublicKey,
    ReadXdr, ScAddress, ScVal, SorobanResources, SorobanTransactionData, Transaction,
    TransactionEnvelope, TransactionExt, TransactionResult, TransactionResultExt,
    TransactionResultResult, WriteXdr,
};

use crate::address::{encode_account, encode_contract};
use crate::ledger::{AccountDetails, NetworkClient, NetworkError, SimulationResult};
use crate::tx_builder::transaction_hash;

/// Resource fee reported by simulations
pub const MOCK_RESOURCE_FEE: i64 = 50_000;

/// A transaction the mock ledger accepted and applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTx {
    pub source: String,
    pub sequence: i64,
    pub operations: usize,
    pub kinds: Vec<&'static str>,
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<String, AccountDetails>,
    contracts: HashMap<String, i128>,
    applied: Vec<AppliedTx>,
    next_ledger: i64,
}

impl LedgerState {
    /// Starting sequence of accounts created in the next ledger
    fn fresh_sequence(&mut self) -> i64 {
        self.next_ledger += 1;
        self.next_ledger << 32
    }
}

/// In-memory ledger for deterministic tests
pub struct MockLedger {
    passphrase: String,
    state: Mutex<LedgerState>,
    scripted_submits: Mutex<VecDeque<Option<NetworkError>>>,
    simulation_supported: AtomicBool,
    submits: AtomicUsize,
    simulations: AtomicUsize,
    lookups: Mutex<HashMap<String, usize>>,
}

impl MockLedger {
    pub fn new(passphrase: &str) -> Self {
        Self {
            passphrase: passphrase.to_string(),
            state: Mutex::new(LedgerState {
                next_ledger: 1,
                ..Default::default()
            }),
            scripted_submits: Mutex::new(VecDeque::new()),
            simulation_supported: AtomicBool::new(true),
            submits: AtomicUsize::new(0),
            simulations: AtomicUsize::new(0),
            lookups: Mutex::new(HashMap::new()),
        }
    }

    /// Add an existing account with a balance in stroops
    pub fn with_account(self, address: &str, balance: i64, sequence: i64) -> Self {
        self.state
            .lock()
            .accounts
            .insert(address.to_string(), AccountDetails { sequence, balance });
        self
    }

    pub fn set_simulation_supported(&self, supported: bool) {
        self.simulation_supported.store(supported, Ordering::SeqCst);
    }

    /// Queue an outcome for an upcoming submission: `Some(err)` rejects it
    /// without touching the ledger, `None` lets it through normally
    pub fn script_submit(&self, outcome: Option<NetworkError>) {
        self.scripted_submits.lock().push_back(outcome);
    }

    pub fn fail_next_submit(&self, err: NetworkError) {
        self.script_submit(Some(err));
    }

    pub fn balance(&self, address: &str) -> Option<i64> {
        self.state.lock().accounts.get(address).map(|a| a.balance)
    }

    pub fn sequence(&self, address: &str) -> Option<i64> {
        self.state.lock().accounts.get(address).map(|a| a.sequence)
    }

    pub fn contract_balance(&self, address: &str) -> i128 {
        self.state.lock().contracts.get(address).copied().unwrap_or(0)
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().accounts.len()
    }

    pub fn applied(&self) -> Vec<AppliedTx> {
        self.state.lock().applied.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn simulate_count(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    /// How often `address` was looked up with `get_account_details`
    pub fn lookups(&self, address: &str) -> usize {
        self.lookups.lock().get(address).copied().unwrap_or(0)
    }

    fn decode(&self, envelope_xdr: &str) -> Result<TransactionEnvelope, NetworkError> {
        let raw = STANDARD
            .decode(envelope_xdr)
            .map_err(|e| NetworkError::other(format!("tx_malformed: {e}")))?;
        TransactionEnvelope::from_xdr(raw, Limits::none())
            .map_err(|e| NetworkError::other(format!("tx_malformed: {e}")))
    }

    fn apply(&self, envelope: TransactionEnvelope) -> Result<(), NetworkError> {
        let TransactionEnvelope::Tx(env) = envelope else {
            return Err(NetworkError::other("tx_not_supported: only v1 envelopes"));
        };
        let tx = env.tx;
        let source = muxed_address(&tx.source_account);
        let fee = i64::from(tx.fee);
        self.check_signatures(&tx, &source, &env.signatures)?;

        let mut state = self.state.lock();
        let Some(current) = state.accounts.get(&source).copied() else {
            return Err(NetworkError::other("tx_no_source_account"));
        };
        if tx.seq_num.0 != current.sequence + 1 {
            return Err(NetworkError::bad_sequence(format!(
                "tx_bad_seq: got {}, expected {}",
                tx.seq_num.0,
                current.sequence + 1
            ))
            .with_result_xdr(encode_result(fee, TransactionResultResult::TxBadSeq)));
        }

        // Sequence and fee are consumed even when an operation fails.
        if let Some(acc) = state.accounts.get_mut(&source) {
            acc.sequence = tx.seq_num.0;
            acc.balance -= fee;
        }

        let mut scratch_accounts = state.accounts.clone();
        let mut scratch_contracts = state.contracts.clone();
        let mut kinds = Vec::with_capacity(tx.operations.len());
        for op in tx.operations.iter() {
            let op_source = op
                .source_account
                .as_ref()
                .map(muxed_address)
                .unwrap_or_else(|| source.clone());
            let next_sequence = (state.next_ledger + 1) << 32;
            let applied = apply_operation(
                op,
                &op_source,
                &tx,
                next_sequence,
                &mut scratch_accounts,
                &mut scratch_contracts,
            );
            match applied {
                Ok(kind) => kinds.push(kind),
                Err(op_result) => {
                    let result = TransactionResultResult::TxFailed(
                        vec![op_result].try_into().unwrap_or_default(),
                    );
                    return Err(NetworkError::other("tx_failed")
                        .with_result_xdr(encode_result(fee, result)));
                }
            }
        }

        state.accounts = scratch_accounts;
        state.contracts = scratch_contracts;
        state.fresh_sequence();
        state.applied.push(AppliedTx {
            source,
            sequence: tx.seq_num.0,
            operations: tx.operations.len(),
            kinds,
        });
        Ok(())
    }

    /// The transaction source and every operation source must have signed
    fn check_signatures(
        &self,
        tx: &Transaction,
        source: &str,
        signatures: &[stellar_xdr::curr::DecoratedSignature],
    ) -> Result<(), NetworkError> {
        let hash = transaction_hash(tx, &self.passphrase)
            .map_err(|e| NetworkError::other(format!("tx_malformed: {e}")))?;
        let mut required = vec![source.to_string()];
        for op in tx.operations.iter() {
            if let Some(op_source) = &op.source_account {
                required.push(muxed_address(op_source));
            }
        }

        for signer in required {
            let key = crate::address::account_key_bytes(&signer)
                .map_err(|e| NetworkError::other(e.to_string()))?;
            let verifying = VerifyingKey::from_bytes(&key)
                .map_err(|e| NetworkError::other(format!("tx_bad_auth: {e}")))?;
            let signed = signatures.iter().any(|sig| {
                sig.hint.0 == key[28..]
                    && <[u8; 64]>::try_from(sig.signature.0.as_slice())
                        .map(|bytes| verifying.verify(&hash, &Signature::from_bytes(&bytes)).is_ok())
                        .unwrap_or(false)
            });
            if !signed {
                return Err(NetworkError::other(format!("tx_bad_auth: missing signature of {signer}")));
            }
        }
        Ok(())
    }
}

fn muxed_address(account: &MuxedAccount) -> String {
    match account {
        MuxedAccount::Ed25519(key) => encode_account(key.0),
        MuxedAccount::MuxedEd25519(muxed) => encode_account(muxed.ed25519.0),
    }
}

fn encode_result(fee: i64, result: TransactionResultResult) -> String {
    let result = TransactionResult {
        fee_charged: fee,
        result,
        ext: TransactionResultExt::V0,
    };
    result
        .to_xdr(Limits::none())
        .map(|bytes| STANDARD.encode(bytes))
        .unwrap_or_default()
}

fn debit(
    accounts: &mut HashMap<String, AccountDetails>,
    address: &str,
    amount: i64,
) -> Result<(), ()> {
    match accounts.get_mut(address) {
        Some(acc) if acc.balance >= amount => {
            acc.balance -= amount;
            Ok(())
        }
        _ => Err(()),
    }
}

fn apply_operation(
    op: &Operation,
    op_source: &str,
    tx: &Transaction,
    next_sequence: i64,
    accounts: &mut HashMap<String, AccountDetails>,
    contracts: &mut HashMap<String, i128>,
) -> Result<&'static str, OperationResult> {
    match &op.body {
        OperationBody::CreateAccount(create) => {
            let PublicKey::PublicKeyTypeEd25519(key) = &create.destination.0;
            let destination = encode_account(key.0);
            let fail = |r| OperationResult::OpInner(OperationResultTr::CreateAccount(r));
            if accounts.contains_key(&destination) {
                return Err(fail(CreateAccountResult::AlreadyExist));
            }
            debit(accounts, op_source, create.starting_balance)
                .map_err(|_| fail(CreateAccountResult::Underfunded))?;
            accounts.insert(
                destination,
                AccountDetails {
                    sequence: next_sequence,
                    balance: create.starting_balance,
                },
            );
            Ok("create_account")
        }
        OperationBody::Payment(payment) => {
            let destination = muxed_address(&payment.destination);
            let fail = |r| OperationResult::OpInner(OperationResultTr::Payment(r));
            if !accounts.contains_key(&destination) {
                return Err(fail(PaymentResult::NoDestination));
            }
            debit(accounts, op_source, payment.amount).map_err(|_| fail(PaymentResult::Underfunded))?;
            if let Some(acc) = accounts.get_mut(&destination) {
                acc.balance += payment.amount;
            }
            Ok("payment")
        }
        OperationBody::InvokeHostFunction(invoke) => {
            let HostFunction::InvokeContract(call) = &invoke.host_function else {
                return Err(OperationResult::OpNotSupported);
            };
            if !matches!(tx.ext, TransactionExt::V1(_)) {
                return Err(OperationResult::OpNotSupported);
            }
            let (Some(ScVal::Address(ScAddress::Contract(to))), Some(ScVal::I128(amount))) =
                (call.args.get(1), call.args.get(2))
            else {
                return Err(OperationResult::OpNotSupported);
            };
            let amount = (i128::from(amount.hi) << 64) | i128::from(amount.lo);
            let amount_i64 = i64::try_from(amount).map_err(|_| OperationResult::OpNotSupported)?;
            debit(accounts, op_source, amount_i64).map_err(|_| OperationResult::OpNotSupported)?;
            *contracts.entry(encode_contract(to.0)).or_default() += amount;
            Ok("contract_invoke")
        }
        _ => Err(OperationResult::OpNotSupported),
    }
}

#[async_trait]
impl NetworkClient for MockLedger {
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<(), NetworkError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(Some(err)) = self.scripted_submits.lock().pop_front() {
            return Err(err);
        }
        let envelope = self.decode(envelope_xdr)?;
        self.apply(envelope)
    }

    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails, NetworkError> {
        *self.lookups.lock().entry(account_id.to_string()).or_default() += 1;
        tokio::task::yield_now().await;
        self.state
            .lock()
            .accounts
            .get(account_id)
            .copied()
            .ok_or_else(|| NetworkError::not_found(format!("account {account_id} not found")))
    }

    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulationResult, NetworkError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if !self.simulation_supported.load(Ordering::SeqCst) {
            return Err(NetworkError::unsupported("simulation disabled"));
        }
        let TransactionEnvelope::Tx(env) = self.decode(envelope_xdr)? else {
            return Err(NetworkError::other("only v1 envelopes can be simulated"));
        };
        let invokes = env
            .tx
            .operations
            .iter()
            .all(|op| matches!(op.body, OperationBody::InvokeHostFunction(_)));
        if !invokes {
            return Err(NetworkError::other("simulation requires a host function invocation"));
        }
        Ok(SimulationResult {
            min_resource_fee: MOCK_RESOURCE_FEE,
            transaction_data: SorobanTransactionData {
                ext: ExtensionPoint::V0,
                resources: SorobanResources {
                    footprint: LedgerFootprint {
                        read_only: Default::default(),
                        read_write: Default::default(),
                    },
                    instructions: 1_000_000,
                    read_bytes: 1_000,
                    write_bytes: 1_000,
                },
                resource_fee: MOCK_RESOURCE_FEE,
            },
            auth: Vec::new(),
            result: Some(ScVal::Void),
        })
    }
}

type SubmitHook = Arc<dyn Fn(Result<(), NetworkError>) -> Result<(), NetworkError> + Send + Sync>;
type LookupHook = Arc<dyn Fn(&str) -> Option<NetworkError> + Send + Sync>;
type SimulateHook = Arc<dyn Fn() -> Option<NetworkError> + Send + Sync>;

/// Wraps any client and overrides single steps, so a test can fault one
/// step while every other call reaches the wrapped client unchanged.
pub struct StepOverrides<C> {
    inner: C,
    submit: Option<SubmitHook>,
    lookup: Option<LookupHook>,
    simulate: Option<SimulateHook>,
}

impl<C> StepOverrides<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            submit: None,
            lookup: None,
            simulate: None,
        }
    }

    /// Rewrite the outcome of every submission after the wrapped client ran it
    pub fn map_submit(
        mut self,
        hook: impl Fn(Result<(), NetworkError>) -> Result<(), NetworkError> + Send + Sync + 'static,
    ) -> Self {
        self.submit = Some(Arc::new(hook));
        self
    }

    /// Fail account lookups for which `hook` returns an error
    pub fn fault_lookup(
        mut self,
        hook: impl Fn(&str) -> Option<NetworkError> + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Some(Arc::new(hook));
        self
    }

    pub fn fault_simulate(
        mut self,
        hook: impl Fn() -> Option<NetworkError> + Send + Sync + 'static,
    ) -> Self {
        self.simulate = Some(Arc::new(hook));
        self
    }
}

impl<C: Clone> Clone for StepOverrides<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            submit: self.submit.clone(),
            lookup: self.lookup.clone(),
            simulate: self.simulate.clone(),
        }
    }
}

#[async_trait]
impl<C: NetworkClient> NetworkClient for StepOverrides<C> {
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<(), NetworkError> {
        let outcome = self.inner.submit_transaction(envelope_xdr).await;
        match &self.submit {
            Some(hook) => hook(outcome),
            None => outcome,
        }
    }

    async fn get_account_details(&self, account_id: &str) -> Result<AccountDetails, NetworkError> {
        if let Some(err) = self.lookup.as_ref().and_then(|hook| hook(account_id)) {
            return Err(err);
        }
        self.inner.get_account_details(account_id).await
    }

    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulationResult, NetworkError> {
        if let Some(err) = self.simulate.as_ref().and_then(|hook| hook()) {
            return Err(err);
        }
        self.inner.simulate_transaction(envelope_xdr).await
    }
}

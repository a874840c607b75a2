//! Operation constructors
//!
//! Every funding operation names the shared funder as its source account so
//! the funder supplies the value while the enclosing transaction's source
//! (a channel account) only supplies the sequence number.

use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    AccountId, Asset, ContractIdPreimage, CreateAccountOp, Hash, HashIdPreimage,
    HashIdPreimageContractId, HostFunction, Int128Parts, InvokeContractArgs, InvokeHostFunctionOp,
    Limits, MuxedAccount, Operation, OperationBody, PaymentOp, PublicKey, ScAddress, ScSymbol,
    ScVal, SorobanAuthorizationEntry, Uint256, WriteXdr,
};

use crate::address::{account_key_bytes, contract_id_bytes};
use crate::tx_builder::errors::TransactionBuilderError;

/// Function the native asset contract exposes for transfers
pub const TRANSFER_FN: &str = "transfer";

/// Network id: SHA-256 of the network passphrase
pub fn network_id(passphrase: &str) -> Hash {
    Hash(Sha256::digest(passphrase.as_bytes()).into())
}

/// Contract id of the native asset contract on the given network
pub fn native_asset_contract_id(passphrase: &str) -> Result<Hash, TransactionBuilderError> {
    let preimage = HashIdPreimage::ContractId(HashIdPreimageContractId {
        network_id: network_id(passphrase),
        contract_id_preimage: ContractIdPreimage::Asset(Asset::Native),
    });
    let bytes = preimage.to_xdr(Limits::none())?;
    Ok(Hash(Sha256::digest(&bytes).into()))
}

pub(crate) fn account_id(address: &str) -> Result<AccountId, TransactionBuilderError> {
    let key = account_key_bytes(address)
        .map_err(|e| TransactionBuilderError::invalid_address(address, e))?;
    Ok(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key))))
}

pub(crate) fn muxed_account(address: &str) -> Result<MuxedAccount, TransactionBuilderError> {
    let key = account_key_bytes(address)
        .map_err(|e| TransactionBuilderError::invalid_address(address, e))?;
    Ok(MuxedAccount::Ed25519(Uint256(key)))
}

/// Create `destination` with `starting_balance` stroops paid by `funder`
pub fn create_account_op(
    funder: Option<&str>,
    destination: &str,
    starting_balance: i64,
) -> Result<Operation, TransactionBuilderError> {
    Ok(Operation {
        source_account: funder.map(muxed_account).transpose()?,
        body: OperationBody::CreateAccount(CreateAccountOp {
            destination: account_id(destination)?,
            starting_balance,
        }),
    })
}

/// Native payment of `amount` stroops from `funder` to an existing account
pub fn payment_op(
    funder: &str,
    destination: &str,
    amount: i64,
) -> Result<Operation, TransactionBuilderError> {
    Ok(Operation {
        source_account: Some(muxed_account(funder)?),
        body: OperationBody::Payment(PaymentOp {
            destination: muxed_account(destination)?,
            asset: Asset::Native,
            amount,
        }),
    })
}

/// Invoke `transfer(funder, contract, amount)` on the native asset contract
pub fn invoke_transfer_op(
    passphrase: &str,
    funder: &str,
    contract: &str,
    amount: i64,
    auth: Vec<SorobanAuthorizationEntry>,
) -> Result<Operation, TransactionBuilderError> {
    let contract_id = contract_id_bytes(contract)
        .map_err(|e| TransactionBuilderError::invalid_address(contract, e))?;
    let args = vec![
        ScVal::Address(ScAddress::Account(account_id(funder)?)),
        ScVal::Address(ScAddress::Contract(Hash(contract_id))),
        i128_val(amount),
    ];
    Ok(Operation {
        source_account: Some(muxed_account(funder)?),
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function: HostFunction::InvokeContract(InvokeContractArgs {
                contract_address: ScAddress::Contract(native_asset_contract_id(passphrase)?),
                function_name: ScSymbol(TRANSFER_FN.try_into()?),
                args: args.try_into()?,
            }),
            auth: auth.try_into()?,
        }),
    })
}

fn i128_val(amount: i64) -> ScVal {
    let wide = i128::from(amount);
    ScVal::I128(Int128Parts {
        hi: (wide >> 64) as i64,
        lo: wide as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Keypair;

    const PASSPHRASE: &str = "Test SDF Network ; September 2015";

    #[test]
    fn test_network_id_is_passphrase_digest() {
        let id = network_id(PASSPHRASE);
        assert_eq!(
            hex::encode(id.0),
            "cee0302d59844d32bdca915c8203dd44b33fbb7edc19051ea37abedf28ecd472"
        );
    }

    #[test]
    fn test_native_contract_id_depends_on_network() {
        let testnet = native_asset_contract_id(PASSPHRASE).unwrap();
        let other = native_asset_contract_id("Standalone Network ; February 2017").unwrap();
        assert_ne!(testnet, other);
    }

    #[test]
    fn test_payment_op_sources_from_funder() {
        let funder = Keypair::random();
        let dest = Keypair::random();
        let op = payment_op(funder.address(), dest.address(), 42).unwrap();
        assert_eq!(
            op.source_account,
            Some(MuxedAccount::Ed25519(Uint256(funder.public_key_bytes())))
        );
        match op.body {
            OperationBody::Payment(p) => {
                assert_eq!(p.amount, 42);
                assert_eq!(p.asset, Asset::Native);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_invoke_transfer_args() {
        let funder = Keypair::random();
        let contract = crate::address::encode_contract([9u8; 32]);
        let op = invoke_transfer_op(PASSPHRASE, funder.address(), &contract, 5, vec![]).unwrap();
        let OperationBody::InvokeHostFunction(invoke) = op.body else {
            panic!("expected invoke host function");
        };
        let HostFunction::InvokeContract(args) = invoke.host_function else {
            panic!("expected contract invocation");
        };
        assert_eq!(args.function_name, ScSymbol(TRANSFER_FN.try_into().unwrap()));
        assert_eq!(args.args.len(), 3);
        assert_eq!(args.args[2], ScVal::I128(Int128Parts { hi: 0, lo: 5 }));
        assert_eq!(args.args[1], ScVal::Address(ScAddress::Contract(Hash([9u8; 32]))));
    }

    #[test]
    fn test_rejects_contract_as_account() {
        let contract = crate::address::encode_contract([1u8; 32]);
        let err = payment_op(Keypair::random().address(), &contract, 1).unwrap_err();
        assert!(matches!(err, TransactionBuilderError::InvalidAddress { .. }));
    }
}

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum SignerError {
    #[error("Unable to read private key file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid private key: {0}")]
    Key(#[from] alloy_signer_local::LocalSignerError),

    #[error("Signing failed: {0}")]
    Sign(#[from] alloy_signer::Error),
}

/// A signed value transfer, ready to persist and broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedTransfer {
    pub(crate) hash: B256,
    /// EIP-2718 encoding (plain RLP for legacy transactions)
    pub(crate) raw: Vec<u8>,
}

/// Signs EIP-155 legacy value transfers for the paying account.
#[derive(Debug, Clone)]
pub(crate) struct TransferSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl TransferSigner {
    pub(crate) fn new(signer: PrivateKeySigner, chain_id: u64) -> Self {
        Self { signer, chain_id }
    }

    /// Loads a hex private key (with or without `0x`) from a file.
    pub(crate) fn from_key_file(path: impl AsRef<Path>, chain_id: u64) -> Result<Self, SignerError> {
        let raw = std::fs::read_to_string(path)?;
        let signer = PrivateKeySigner::from_str(raw.trim().trim_start_matches("0x"))?;
        Ok(Self::new(signer, chain_id))
    }

    pub(crate) fn address(&self) -> Address {
        self.signer.address()
    }

    pub(crate) fn sign_transfer(
        &self,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        to: Address,
        value: U256,
    ) -> Result<SignedTransfer, SignerError> {
        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value,
            input: Bytes::new(),
        };
        let signature = self.signer.sign_transaction_sync(&mut tx)?;
        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::from(signed).encoded_2718();
        Ok(SignedTransfer { hash, raw })
    }
}

//! Settlement triggers
//!
//! The engine hands every sender -> recipient -> category transfer of a round to
//! a [`SettlementTrigger`]. The returned reference is opaque to the engine; it
//! only ends up in logs and status lines.

use std::collections::HashMap;

use async_trait::async_trait;
use ethers::prelude::{Http, LocalWallet, Middleware, Provider, Signer, SignerMiddleware};
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, U256};
use ethers::utils::parse_ether;
use tracing::{debug, info, instrument};
use zeroize::Zeroize;

use crate::config::SettlementConfig;
use crate::domain::{PlayerId, ResourceCategory};
use crate::error::{Result, SettlementError, TagTradeError};
use crate::registry::Player;

/// Opaque handle for a completed settlement (e.g. a transaction hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub reference: String,
}

impl SettlementReceipt {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

impl std::fmt::Display for SettlementReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reference)
    }
}

/// Performs the value transfer for one participant of a round
#[async_trait]
pub trait SettlementTrigger: Send + Sync {
    async fn settle(
        &self,
        sender: &PlayerId,
        recipient: &PlayerId,
        category: &ResourceCategory,
    ) -> std::result::Result<SettlementReceipt, SettlementError>;
}

/// Accepts every transfer without touching any backend
#[derive(Debug, Default, Clone)]
pub struct DryRunSettlement;

#[async_trait]
impl SettlementTrigger for DryRunSettlement {
    async fn settle(
        &self,
        sender: &PlayerId,
        recipient: &PlayerId,
        category: &ResourceCategory,
    ) -> std::result::Result<SettlementReceipt, SettlementError> {
        let reference = format!("dry-run-{}", uuid::Uuid::new_v4());
        info!(%sender, %recipient, %category, %reference, "[DRY RUN] settlement");
        Ok(SettlementReceipt::new(reference))
    }
}

/// Settles each transfer as an EIP-1559 transaction from the sender's wallet
/// to the recipient's address, with the trade described in the data field.
pub struct EvmSettlement {
    provider: Provider<Http>,
    wallets: HashMap<PlayerId, LocalWallet>,
    values: HashMap<ResourceCategory, U256>,
    chain_id: u64,
}

impl EvmSettlement {
    /// Connect to the RPC endpoint and load one signing key per roster player.
    ///
    /// Any missing key, bad value or unreachable endpoint is fatal here so the
    /// game never starts half-configured.
    pub async fn connect(config: &SettlementConfig, roster: &[Player]) -> Result<Self> {
        let rpc_url = config.rpc_url.as_deref().ok_or_else(|| {
            TagTradeError::InvalidConfig("settlement.rpc_url is required in evm mode".into())
        })?;

        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| SettlementError::Unreachable(format!("{rpc_url}: {e}")))?;

        let remote_chain = provider
            .get_chainid()
            .await
            .map_err(|e| SettlementError::Unreachable(e.to_string()))?;
        if remote_chain != U256::from(config.chain_id) {
            return Err(TagTradeError::InvalidConfig(format!(
                "RPC endpoint serves chain {remote_chain}, expected {}",
                config.chain_id
            )));
        }

        let mut wallets = HashMap::new();
        for (idx, player) in roster.iter().enumerate() {
            let env_var = config.key_env_for(&player.id, idx);
            let mut key = std::env::var(&env_var).map_err(|_| SettlementError::MissingKey {
                player: player.id.to_string(),
                env_var: env_var.clone(),
            })?;

            let parsed = key.trim().trim_start_matches("0x").parse::<LocalWallet>();
            key.zeroize();

            let wallet = parsed
                .map_err(|e| {
                    TagTradeError::InvalidConfig(format!("invalid key in {env_var}: {e}"))
                })?
                .with_chain_id(config.chain_id);
            info!(player = %player.id, address = ?wallet.address(), "Wallet loaded");
            wallets.insert(player.id.clone(), wallet);
        }

        let mut values = HashMap::new();
        for (category, eth) in &config.resource_values {
            let wei = parse_ether(eth.as_str()).map_err(|e| {
                TagTradeError::InvalidConfig(format!("resource value {category}={eth}: {e}"))
            })?;
            values.insert(ResourceCategory::new(category), wei);
        }

        Ok(Self {
            provider,
            wallets,
            values,
            chain_id: config.chain_id,
        })
    }

    pub fn address(&self, player: &PlayerId) -> Option<Address> {
        self.wallets.get(player).map(|w| w.address())
    }
}

#[async_trait]
impl SettlementTrigger for EvmSettlement {
    #[instrument(skip(self), fields(chain_id = self.chain_id))]
    async fn settle(
        &self,
        sender: &PlayerId,
        recipient: &PlayerId,
        category: &ResourceCategory,
    ) -> std::result::Result<SettlementReceipt, SettlementError> {
        let wallet = self
            .wallets
            .get(sender)
            .cloned()
            .ok_or_else(|| SettlementError::UnknownPlayer(sender.to_string()))?;
        let to = self
            .address(recipient)
            .ok_or_else(|| SettlementError::UnknownPlayer(recipient.to_string()))?;

        let value = self.values.get(category).copied().unwrap_or_default();
        let message = format!("{sender}→{recipient} traded {category}");

        let client = SignerMiddleware::new(self.provider.clone(), wallet);
        let tx = Eip1559TransactionRequest::new()
            .to(to)
            .value(value)
            .data(Bytes::from(message.into_bytes()))
            .chain_id(self.chain_id);

        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| SettlementError::Rejected(e.to_string()))?;
        let hash = pending.tx_hash();
        debug!(tx_hash = ?hash, value = %value, "Transaction broadcast");

        Ok(SettlementReceipt::new(format!("{hash:#x}")))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// One recorded settlement call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SettleCall {
        pub sender: PlayerId,
        pub recipient: PlayerId,
        pub category: ResourceCategory,
    }

    /// Records calls and fails the calls whose (1-based) ordinal was scripted to fail
    #[derive(Default)]
    pub struct ScriptedSettlement {
        calls: Mutex<Vec<SettleCall>>,
        fail_on: HashSet<usize>,
    }

    impl ScriptedSettlement {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(calls: &[usize]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: calls.iter().copied().collect(),
            }
        }

        pub fn calls(&self) -> Vec<SettleCall> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl SettlementTrigger for ScriptedSettlement {
        async fn settle(
            &self,
            sender: &PlayerId,
            recipient: &PlayerId,
            category: &ResourceCategory,
        ) -> std::result::Result<SettlementReceipt, SettlementError> {
            let ordinal = {
                let mut calls = self.calls.lock().map_err(|_| {
                    SettlementError::Unreachable("call log poisoned".to_string())
                })?;
                calls.push(SettleCall {
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                    category: category.clone(),
                });
                calls.len()
            };
            if self.fail_on.contains(&ordinal) {
                Err(SettlementError::Rejected(format!("scripted failure #{ordinal}")))
            } else {
                Ok(SettlementReceipt::new(format!("0x{ordinal:064x}")))
            }
        }
    }
}

//! Round commit: turns pending offers into settlement calls.
//!
//! This is the only place that talks to the settlement trigger.

use tracing::{error, info, warn};

use super::{Rejection, TradeEngine};
use crate::domain::{PendingResource, PlayerId, ResourceCategory, TagId};
use crate::error::SettlementError;
use crate::feedback::FeedbackEvent;
use crate::settlement::SettlementReceipt;

/// One sender -> recipient leg of a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub sender: PlayerId,
    pub recipient: PlayerId,
    pub category: ResourceCategory,
    /// Sender's card, burned once this leg settles
    pub tag: TagId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledTransfer {
    pub transfer: Transfer,
    pub receipt: SettlementReceipt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Not enough participants; nothing happened
    Rejected(Rejection),
    /// Forced with nothing pending: no transfers, the table was reset
    Cleared,
    /// Every leg settled
    Settled { transfers: Vec<SettledTransfer> },
    /// A leg failed; later legs were skipped, earlier ones stay settled
    Aborted {
        settled: Vec<SettledTransfer>,
        failed: Transfer,
        error: SettlementError,
        total: usize,
    },
}

impl CommitOutcome {
    /// Legs that settled (and whose tags were burned)
    pub fn settled(&self) -> &[SettledTransfer] {
        match self {
            CommitOutcome::Rejected(_) | CommitOutcome::Cleared => &[],
            CommitOutcome::Settled { transfers } => transfers,
            CommitOutcome::Aborted { settled, .. } => settled,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CommitOutcome::Settled { .. })
    }
}

/// Fixed rotation: participant i pays participant (i + 1) mod k.
///
/// `participants` must already be in roster order.
pub fn plan_round(participants: &[(PlayerId, PendingResource)]) -> Vec<Transfer> {
    let k = participants.len();
    participants
        .iter()
        .enumerate()
        .map(|(i, (sender, pending))| Transfer {
            sender: sender.clone(),
            recipient: participants[(i + 1) % k].0.clone(),
            category: pending.category.clone(),
            tag: pending.tag.clone(),
        })
        .collect()
}

impl TradeEngine {
    /// Commit the current round.
    ///
    /// A single participant is rejected whether forced or not, so a player
    /// never settles with themselves. Forcing an empty round just resets. Once
    /// settlement starts the round always ends in a reset, after the settle
    /// delay, however far it got.
    pub async fn attempt_commit(&mut self, force: bool) -> CommitOutcome {
        let participants = self.state.participants();
        if force && participants.is_empty() {
            info!("Forced confirm with no pending offers");
            self.finish_round().await;
            return CommitOutcome::Cleared;
        }
        if participants.len() < 2 {
            warn!(
                participants = participants.len(),
                forced = force,
                "Need at least 2 players with resources before confirm"
            );
            self.emit(FeedbackEvent::InsufficientParticipants {
                participants: participants.len(),
            });
            return CommitOutcome::Rejected(Rejection::InsufficientParticipants {
                participants: participants.len(),
            });
        }

        let transfers = plan_round(&participants);
        let total = transfers.len();
        info!(participants = total, forced = force, "Trade confirmed");
        for (player, pending) in &participants {
            info!("  {} trading: {}", player, pending.category);
        }
        self.emit(FeedbackEvent::CommitStarted {
            participants: total,
        });

        let mut settled = Vec::with_capacity(total);
        let mut failure = None;
        for transfer in transfers {
            match self.settle_transfer(&transfer).await {
                Ok(receipt) => {
                    info!(
                        "TX ({}→{}): {}",
                        transfer.sender, transfer.recipient, receipt
                    );
                    self.state.burn(transfer.tag.clone());
                    self.emit(FeedbackEvent::TransferSettled {
                        sender_label: self.registry.label(&transfer.sender).to_string(),
                        recipient_label: self.registry.label(&transfer.recipient).to_string(),
                        category: transfer.category.clone(),
                        reference: receipt.reference.clone(),
                    });
                    settled.push(SettledTransfer { transfer, receipt });
                    if !self.config.step_delay.is_zero() {
                        tokio::time::sleep(self.config.step_delay).await;
                    }
                }
                Err(e) => {
                    error!(
                        sender = %transfer.sender,
                        recipient = %transfer.recipient,
                        error = %e,
                        "Transaction failed, aborting remaining transfers"
                    );
                    failure = Some((transfer, e));
                    break;
                }
            }
        }

        let outcome = match failure {
            None => {
                self.emit(FeedbackEvent::CommitConfirmed { transfers: total });
                CommitOutcome::Settled { transfers: settled }
            }
            Some((failed, error)) => {
                self.emit(FeedbackEvent::CommitFailed {
                    settled: settled.len(),
                    total,
                    reason: error.to_string(),
                });
                CommitOutcome::Aborted {
                    settled,
                    failed,
                    error,
                    total,
                }
            }
        };

        self.finish_round().await;
        outcome
    }

    async fn finish_round(&mut self) {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
        self.reset();
    }

    async fn settle_transfer(
        &self,
        transfer: &Transfer,
    ) -> std::result::Result<SettlementReceipt, SettlementError> {
        let call = self
            .settlement
            .settle(&transfer.sender, &transfer.recipient, &transfer.category);
        match self.config.settlement_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| {
                    Err(SettlementError::Timeout {
                        elapsed_ms: limit.as_millis() as u64,
                    })
                }),
            None => call.await,
        }
    }
}

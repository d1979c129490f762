//! Periodic reconciliation
//!
//! Two sweeps, independent of any single checkout:
//!
//! 1. Pending transactions older than the configured age are re-queried at
//!    their settlement source (explorer for crypto, provider API for hosted)
//!    and resolved; manual and voucher stragglers are re-surfaced to admins.
//! 2. Orders stuck in `PendingPayment` are expired, including those whose
//!    in-memory timer was lost to a restart.
//!
//! The background loop follows the spawn/select/oneshot-stop shape used
//! across the engine's services.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vend_methods::{MethodKind, MethodRegistry};
use vend_orders::NotifierPort;
use vend_settlement::{ChainExplorer, ProviderMap, WebhookAdapter};
use vend_types::{
    ProviderPaymentStatus, Result, TransactionKind, TransactionStatus, VendError, WebhookEvent,
};

use crate::orchestrator::CheckoutEngine;

/// Background reconciliation service
#[derive(Clone)]
pub struct SweepService {
    engine: CheckoutEngine,
    webhooks: WebhookAdapter,
    registry: Arc<MethodRegistry>,
    providers: ProviderMap,
    explorer: Arc<dyn ChainExplorer>,
    notifier: Arc<dyn NotifierPort>,
    running: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    stop_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl SweepService {
    pub fn new(
        engine: CheckoutEngine,
        webhooks: WebhookAdapter,
        registry: Arc<MethodRegistry>,
        providers: ProviderMap,
        explorer: Arc<dyn ChainExplorer>,
        notifier: Arc<dyn NotifierPort>,
    ) -> Self {
        Self {
            engine,
            webhooks,
            registry,
            providers,
            explorer,
            notifier,
            running: Arc::new(AtomicBool::new(false)),
            task: Arc::new(Mutex::new(None)),
            stop_tx: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the background loop.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(VendError::internal("sweep is already running"));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_tx.lock().await = Some(stop_tx);
        self.running.store(true, Ordering::Relaxed);

        let service = self.clone();
        let interval = self.engine.config().sweep_interval;
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = service.check_pending_transactions().await {
                            warn!(error = %e, "pending-transaction sweep failed");
                        }
                        if let Err(e) = service.engine.expire_stale_orders().await {
                            warn!(error = %e, "order expiry sweep failed");
                        }
                    }
                }
            }
            running.store(false, Ordering::Relaxed);
        });

        *self.task.lock().await = Some(task);
        info!("reconciliation sweep started");
        Ok(())
    }

    /// Stop the background loop.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Err(VendError::internal("sweep is not running"));
        }
        if let Some(stop_tx) = self.stop_tx.lock().await.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        info!("reconciliation sweep stopped");
        Ok(())
    }

    /// Re-query every stale pending transaction at its settlement source.
    /// Returns how many were resolved (completed or failed) this pass.
    pub async fn check_pending_transactions(&self) -> Result<usize> {
        let stale = self
            .engine
            .ledger()
            .pending_older_than(self.engine.config().pending_tx_age)
            .await;

        let mut resolved = 0;
        for tx in stale {
            let method = match self.registry.get(&tx.method) {
                Ok(method) => method,
                Err(_) => {
                    warn!(tx = %tx.id, method = %tx.method, "stale transaction references unknown method");
                    continue;
                }
            };

            match method.kind {
                MethodKind::Crypto => {
                    let (Some(address), Some(hash)) = (
                        tx.details.wallet_address.clone(),
                        tx.details.external_tx_id.clone(),
                    ) else {
                        continue;
                    };
                    // Read-only check; a failure here just waits for the
                    // next pass.
                    match self.explorer.confirmations(&hash).await {
                        Ok(confirmations) => {
                            self.webhooks
                                .handle_payment_webhook(WebhookEvent::CryptoConfirmation {
                                    address,
                                    tx_hash: hash,
                                    confirmations,
                                })
                                .await?;
                            if self.is_resolved(&tx.id).await {
                                resolved += 1;
                            }
                        }
                        Err(e) => {
                            warn!(tx = %tx.id, error = %e, "explorer query failed");
                        }
                    }
                }
                MethodKind::Hosted(provider) => {
                    let Some(adapter) = self.providers.get(&provider) else {
                        warn!(tx = %tx.id, %provider, "no settlement adapter registered");
                        continue;
                    };
                    let Some(external_id) = tx.details.external_tx_id.clone() else {
                        continue;
                    };
                    match adapter.retrieve_status(&external_id).await {
                        Ok(ProviderPaymentStatus::Succeeded) => {
                            let event = match tx.kind {
                                TransactionKind::Payment => WebhookEvent::HostedPayment {
                                    provider: provider.to_string(),
                                    external_id,
                                    status: ProviderPaymentStatus::Succeeded,
                                    amount: tx.amount.total,
                                },
                                TransactionKind::Refund => WebhookEvent::HostedRefund {
                                    provider: provider.to_string(),
                                    external_id,
                                    status: ProviderPaymentStatus::Succeeded,
                                },
                            };
                            self.webhooks.handle_payment_webhook(event).await?;
                            if self.is_resolved(&tx.id).await {
                                resolved += 1;
                            }
                        }
                        Ok(ProviderPaymentStatus::Failed) => {
                            self.engine
                                .ledger()
                                .advance(
                                    &tx.id,
                                    TransactionStatus::Failed,
                                    "provider reported failure",
                                )
                                .await?;
                            resolved += 1;
                        }
                        Ok(ProviderPaymentStatus::Pending) => {}
                        Err(e) => {
                            warn!(tx = %tx.id, %provider, error = %e, "provider status query failed");
                        }
                    }
                }
                MethodKind::Voucher(_) | MethodKind::Manual => {
                    // Nothing external to query; surface to operators again.
                    if let Err(e) = self
                        .notifier
                        .notify_admins(&format!(
                            "Transaction {} for order {} still awaits manual handling",
                            tx.id, tx.order_id
                        ))
                        .await
                    {
                        warn!(tx = %tx.id, error = %e, "admin reminder failed");
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// Expire stale orders now; delegates to the orchestrator.
    pub async fn expire_stale_orders(&self) -> Result<usize> {
        self.engine.expire_stale_orders().await
    }

    async fn is_resolved(&self, tx_id: &vend_types::TransactionId) -> bool {
        self.engine
            .ledger()
            .get(tx_id)
            .await
            .map(|t| t.status.is_terminal())
            .unwrap_or(false)
    }
}

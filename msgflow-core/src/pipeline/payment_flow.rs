//! Supervision of the merged payment flow.
//!
//! Sources are never restarted. The first source that ends without being
//! cancelled takes the whole payment flow down with it: the flow is marked
//! failed and the shared shutdown signal cancels the remaining sources and
//! the forwarder. The user and address flows do not depend on it.

use super::health::FlowStatus;
use crate::stream::MergeHandle;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub(crate) struct PaymentSupervisor {
    pub(crate) merge: MergeHandle,
    pub(crate) shutdown_tx: Arc<watch::Sender<bool>>,
    pub(crate) status: Arc<watch::Sender<FlowStatus>>,
}

impl PaymentSupervisor {
    pub(crate) async fn run(mut self) {
        info!("Payment supervisor started");

        while let Some(outcome) = self.merge.next_exit().await {
            debug!(source = %outcome.source, result = ?outcome.result, "Payment source ended");
            if !outcome.is_failure() || *self.shutdown_tx.borrow() {
                continue;
            }

            let reason = outcome.reason();
            error!(reason = %reason, "Payment flow failed, cancelling remaining sources");
            self.status.send_replace(FlowStatus::Failed { reason });
            self.shutdown_tx.send_replace(true);
        }

        // every source is done; wait for the forwarder to drain
        self.merge.join().await;
        info!("Payment supervisor stopped");
    }
}

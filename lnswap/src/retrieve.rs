//! Recovering the preimage of an outbound payment after the fact, for
//! example after a restart while the payment was in flight.

use crate::{
    error::{Error, PermanentError, TransportError},
    node::{PaymentNode, PaymentStatus},
    tracing_ext::InstrumentSwap,
    Preimage, SwapHash,
};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls the payment node until the payment to `swap_hash` is decided.
///
/// A payment that was never attempted or that failed yields a
/// [`PermanentError`]. An in flight payment is polled again after
/// `poll_interval` until it completes or `cancel` fires. Completed payments
/// are matched by hash bytes, so the node's hex encoding and our Base64
/// encoding compare equal.
pub async fn get_preimage<N>(
    node: &N,
    swap_hash: SwapHash,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    poll(node, swap_hash, poll_interval, cancel)
        .instrument_swap(swap_hash, "get_preimage")
        .await
}

async fn poll<N>(
    node: &N,
    swap_hash: SwapHash,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    loop {
        let status = node.lookup_payment_status(swap_hash).await?;
        tracing::debug!("payment status: {}", status);

        match status {
            PaymentStatus::Grounded => {
                return Err(PermanentError::PaymentNotInitiated { swap_hash }.into())
            }
            PaymentStatus::Failed => return Err(PermanentError::PaymentFailed { swap_hash }.into()),
            PaymentStatus::Complete => return find_preimage(node, swap_hash).await,
            PaymentStatus::InFlight => {
                tokio::select! {
                    _ = sleep(poll_interval) => {}
                    _ = cancel.cancelled() => {
                        tracing::info!("stopped polling payment status");
                        return Err(TransportError::Cancelled.into());
                    }
                }
            }
        }
    }
}

async fn find_preimage<N>(node: &N, swap_hash: SwapHash) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    let preimage = node
        .list_completed_payments()
        .await?
        .into_iter()
        .find(|payment| payment.swap_hash.as_bytes() == swap_hash.as_bytes())
        .map(|payment| payment.preimage)
        .ok_or(PermanentError::PreimageNotFound { swap_hash })?;

    if !preimage.matches(&swap_hash) {
        return Err(PermanentError::PreimageMismatch { swap_hash }.into());
    }

    Ok(preimage)
}

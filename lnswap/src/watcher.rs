//! Waiting for the counterparty to lock its payment to our hold invoice.

use crate::{
    error::{Error, InvoiceError, TransportError},
    node::{InvoiceState, InvoiceUpdate, PaymentNode},
    tracing_ext::InstrumentSwap,
    SwapHash, Timestamp,
};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Resolves with the invoice's creation date once an inbound HTLC is locked
/// to it.
///
/// The invoice subscription races a timer armed from the invoice's own
/// expiry: whichever fires first decides the outcome. The timer is
/// authoritative even if the node sends no further events. Settled, canceled
/// and expired invoices end the wait with an [`InvoiceError`]; a stream that
/// closes early is a [`TransportError::StreamClosed`] and is not retried
/// here.
///
/// Once decided, the subscription is cancelled so the node stops streaming.
pub async fn wait_for_commitment<N>(node: &N, swap_hash: SwapHash) -> Result<Timestamp, Error>
where
    N: PaymentNode + ?Sized,
{
    watch(node, swap_hash)
        .instrument_swap(swap_hash, "wait_for_commitment")
        .await
}

async fn watch<N>(node: &N, swap_hash: SwapHash) -> Result<Timestamp, Error>
where
    N: PaymentNode + ?Sized,
{
    let mut subscription = node.subscribe_invoice(swap_hash).await?;

    let expiry_timer = sleep(Duration::from_secs(0));
    tokio::pin!(expiry_timer);
    let mut expiry: Option<Timestamp> = None;

    let outcome: Result<Timestamp, Error> = loop {
        let update = tokio::select! {
            update = subscription.next() => update,
            _ = &mut expiry_timer, if expiry.is_some() => {
                break Err(expired(swap_hash, expiry));
            }
        };

        let update = match update {
            Some(Ok(update)) => update,
            Some(Err(e)) => break Err(e.into()),
            None => break Err(TransportError::StreamClosed { swap_hash }.into()),
        };

        match next_step(swap_hash, update, Timestamp::now()) {
            Step::Accepted(creation_date) => break Ok(creation_date),
            Step::Failed(e) => break Err(e.into()),
            Step::Open {
                expires_at,
                remaining,
            } => {
                tracing::trace!("invoice open, expires at {}", expires_at);

                expiry = Some(expires_at);
                expiry_timer.as_mut().reset(Instant::now() + remaining);
            }
        }
    };

    subscription.cancel();

    match &outcome {
        Ok(_) => tracing::info!("inbound htlc accepted"),
        Err(e) => tracing::warn!("stopped waiting for commitment: {}", e),
    }

    outcome
}

#[derive(Debug, PartialEq)]
enum Step {
    Open {
        expires_at: Timestamp,
        remaining: Duration,
    },
    Accepted(Timestamp),
    Failed(InvoiceError),
}

fn next_step(swap_hash: SwapHash, update: InvoiceUpdate, now: Timestamp) -> Step {
    match update.state {
        InvoiceState::Open => {
            let expires_at = update.creation_date.add_relative(update.expiry);

            match now.duration_until(expires_at) {
                Some(remaining) => Step::Open {
                    expires_at,
                    remaining,
                },
                None => Step::Failed(InvoiceError::Expired {
                    swap_hash,
                    expired_at: expires_at,
                }),
            }
        }
        InvoiceState::Accepted => Step::Accepted(update.creation_date),
        InvoiceState::Settled => Step::Failed(InvoiceError::AlreadySettled { swap_hash }),
        InvoiceState::Canceled => Step::Failed(InvoiceError::Canceled { swap_hash }),
    }
}

fn expired(swap_hash: SwapHash, expiry: Option<Timestamp>) -> Error {
    InvoiceError::Expired {
        swap_hash,
        expired_at: expiry.unwrap_or_else(Timestamp::now),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        node::NodeError,
        test_harness::{swap_hash, MockNode},
        RelativeTime,
    };
    use spectral::prelude::*;

    fn update(state: InvoiceState, creation_date: Timestamp, expiry: u32) -> InvoiceUpdate {
        InvoiceUpdate {
            state,
            creation_date,
            expiry: RelativeTime::new(expiry),
        }
    }

    #[test]
    fn open_invoice_arms_timer_for_remaining_time() {
        let created = Timestamp::from(1_000);

        let step = next_step(
            swap_hash(),
            update(InvoiceState::Open, created, 3600),
            created.plus(600),
        );

        assert_eq!(step, Step::Open {
            expires_at: created.plus(3600),
            remaining: Duration::from_secs(3000),
        });
    }

    #[test]
    fn open_invoice_past_expiry_fails_immediately() {
        let created = Timestamp::from(1_000);

        let step = next_step(
            swap_hash(),
            update(InvoiceState::Open, created, 10),
            created.plus(10),
        );

        assert_eq!(
            step,
            Step::Failed(InvoiceError::Expired {
                swap_hash: swap_hash(),
                expired_at: created.plus(10),
            })
        );
    }

    #[tokio::test]
    async fn resolves_with_creation_date_once_accepted() {
        let created = Timestamp::now();
        let node = MockNode::default().with_invoice_updates(
            vec![
                Ok(update(InvoiceState::Open, created, 3600)),
                Ok(update(InvoiceState::Accepted, created, 3600)),
            ],
            true,
        );

        let result = wait_for_commitment(&node, swap_hash()).await;

        assert_that(&result).is_ok_containing(created);
        node.assert_subscriptions_cancelled(1);
    }

    #[tokio::test]
    async fn rejects_expired_invoice_without_waiting() {
        let created = Timestamp::now().minus(20);
        let node = MockNode::default()
            .with_invoice_updates(vec![Ok(update(InvoiceState::Open, created, 10))], true);

        let result = wait_for_commitment(&node, swap_hash()).await;

        assert!(matches!(
            result,
            Err(Error::Invoice(InvoiceError::Expired { .. }))
        ));
        node.assert_subscriptions_cancelled(1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expires_invoice_without_further_events() {
        let created = Timestamp::now();
        let node = MockNode::default()
            .with_invoice_updates(vec![Ok(update(InvoiceState::Open, created, 5))], true);

        let result = wait_for_commitment(&node, swap_hash()).await;

        assert!(matches!(
            result,
            Err(Error::Invoice(InvoiceError::Expired { .. }))
        ));
        node.assert_subscriptions_cancelled(1);
    }

    #[tokio::test]
    async fn rejects_already_settled_invoice() {
        let created = Timestamp::now();
        let node = MockNode::default()
            .with_invoice_updates(vec![Ok(update(InvoiceState::Settled, created, 3600))], true);

        let result = wait_for_commitment(&node, swap_hash()).await;

        assert!(matches!(
            result,
            Err(Error::Invoice(InvoiceError::AlreadySettled { .. }))
        ));
        node.assert_subscriptions_cancelled(1);
    }

    #[tokio::test]
    async fn rejects_canceled_invoice() {
        let created = Timestamp::now();
        let node = MockNode::default().with_invoice_updates(
            vec![
                Ok(update(InvoiceState::Open, created, 3600)),
                Ok(update(InvoiceState::Canceled, created, 3600)),
            ],
            true,
        );

        let result = wait_for_commitment(&node, swap_hash()).await;

        assert!(matches!(
            result,
            Err(Error::Invoice(InvoiceError::Canceled { .. }))
        ));
        node.assert_subscriptions_cancelled(1);
    }

    #[tokio::test]
    async fn stream_closing_early_is_a_transport_error() {
        let created = Timestamp::now();
        let node = MockNode::default()
            .with_invoice_updates(vec![Ok(update(InvoiceState::Open, created, 3600))], false);

        let result = wait_for_commitment(&node, swap_hash()).await;

        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::StreamClosed { .. }))
        ));
        assert!(result.unwrap_err().is_retryable());
        node.assert_subscriptions_cancelled(1);
    }

    #[tokio::test]
    async fn stream_error_is_surfaced() {
        let node = MockNode::default()
            .with_invoice_updates(vec![Err(NodeError::DeadlineExceeded)], true);

        let result = wait_for_commitment(&node, swap_hash()).await;

        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::DeadlineExceeded))
        ));
        node.assert_subscriptions_cancelled(1);
    }
}

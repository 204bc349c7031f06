//! The capabilities the swap coordinator needs from a payment node.
//!
//! Everything here is a thin request/response or stream contract; the
//! protocol logic lives in the modules using it.

use crate::{Preimage, RelativeTime, SwapHash, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait PaymentNode: Send + Sync {
    /// Fails with [`NodeError::HashAlreadyExists`] if an invoice for this hash
    /// was created before.
    async fn create_hold_invoice(&self, invoice: HoldInvoice) -> Result<PaymentRequest, NodeError>;

    async fn lookup_invoice(&self, swap_hash: SwapHash) -> Result<Invoice, NodeError>;

    /// Emits the current state of the invoice immediately, then every change.
    async fn subscribe_invoice(
        &self,
        swap_hash: SwapHash,
    ) -> Result<Subscription<InvoiceUpdate>, NodeError>;

    async fn send_payment(&self, payment: SendPayment) -> Result<PaymentResult, NodeError>;

    async fn send_to_route(
        &self,
        swap_hash: SwapHash,
        route: Route,
    ) -> Result<Subscription<PaymentResult>, NodeError>;

    async fn settle_invoice(&self, preimage: Preimage) -> Result<(), NodeError>;

    async fn cancel_invoice(&self, swap_hash: SwapHash) -> Result<(), NodeError>;

    async fn lookup_payment_status(&self, swap_hash: SwapHash) -> Result<PaymentStatus, NodeError>;

    async fn list_completed_payments(&self) -> Result<Vec<CompletedPayment>, NodeError>;
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum NodeError {
    #[error("invoice with this hash already exists")]
    HashAlreadyExists,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
}

/// A stream of events from the payment node that we can ask to stop.
///
/// Dropping a subscription also stops the producer, `cancel` makes it
/// explicit at the call site. Either way the producer is detached once.
pub struct Subscription<T> {
    receiver: mpsc::Receiver<Result<T, NodeError>>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::Receiver<Result<T, NodeError>>, cancel: CancellationToken) -> Self {
        Self::with_detach(receiver, move || cancel.cancel())
    }

    /// Runs `detach` instead of cancelling a token when the subscriber is
    /// done.
    pub fn with_detach<F>(receiver: mpsc::Receiver<Result<T, NodeError>>, detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            receiver,
            detach: Some(Box::new(detach)),
        }
    }

    /// `None` once the producer has closed the stream.
    pub async fn next(&mut self) -> Option<Result<T, NodeError>> {
        self.receiver.recv().await
    }

    pub fn cancel(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("detached", &self.detach.is_none())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PaymentRequest(pub String);

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HoldInvoice {
    pub memo: String,
    /// In the chain's base unit.
    pub amount: u64,
    pub expiry: RelativeTime,
    /// In blocks.
    pub final_cltv_expiry: u32,
    pub swap_hash: SwapHash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum InvoiceState {
    Open,
    Accepted,
    Settled,
    Canceled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Invoice {
    pub payment_request: PaymentRequest,
    pub final_cltv_expiry: u32,
    pub value: u64,
    pub state: InvoiceState,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvoiceUpdate {
    pub state: InvoiceState,
    pub creation_date: Timestamp,
    pub expiry: RelativeTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SendPayment {
    /// Public key of the counterparty node, hex encoded.
    pub destination: String,
    pub swap_hash: SwapHash,
    pub amount: u64,
    pub final_cltv_delta: u32,
    pub cltv_limit: Option<u32>,
}

/// What the payment node reports for one payment attempt. A non-empty
/// `payment_error` means the payment layer gave up.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PaymentResult {
    pub preimage: Option<Preimage>,
    pub payment_error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum PaymentStatus {
    Grounded,
    InFlight,
    Complete,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompletedPayment {
    pub swap_hash: SwapHash,
    pub preimage: Preimage,
}

/// A route as returned by the payment node's route query.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Route {
    pub total_time_lock: u32,
    #[serde(with = "crate::serde_str")]
    pub total_fees_msat: u64,
    #[serde(with = "crate::serde_str")]
    pub total_amt_msat: u64,
    pub hops: Vec<Hop>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Hop {
    #[serde(with = "crate::serde_str")]
    pub chan_id: u64,
    #[serde(with = "crate::serde_str")]
    pub amt_to_forward_msat: u64,
    #[serde(with = "crate::serde_str")]
    pub fee_msat: u64,
    pub expiry: u32,
    pub pub_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn dropping_a_subscription_stops_the_producer() {
        let (sender, receiver) = mpsc::channel::<Result<(), NodeError>>(1);
        let token = CancellationToken::new();

        let subscription = Subscription::new(receiver, token.clone());
        drop(subscription);

        assert!(token.is_cancelled());
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn cancelling_detaches_only_once() {
        let (_sender, receiver) = mpsc::channel::<Result<(), NodeError>>(1);
        let detached = Arc::new(AtomicUsize::new(0));

        let subscription = Subscription::with_detach(receiver, {
            let detached = detached.clone();
            move || {
                detached.fetch_add(1, Ordering::SeqCst);
            }
        });
        subscription.cancel();

        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn route_uses_string_encoded_64_bit_integers() {
        let json = r#"{
            "total_time_lock": 640,
            "total_fees_msat": "1000",
            "total_amt_msat": "100001000",
            "hops": [{
                "chan_id": "123456789012345678",
                "amt_to_forward_msat": "100000000",
                "fee_msat": "0",
                "expiry": 600,
                "pub_key": "02c2a8efce029526d364c2cf39d89e3cdda05e5df7b2cbfc098b4e3d02b70b5275"
            }]
        }"#;

        let route = serde_json::from_str::<Route>(json).unwrap();

        assert_eq!(route.hops[0].chan_id, 123_456_789_012_345_678);
        assert_eq!(route.total_amt_msat, 100_001_000);
        assert_eq!(
            serde_json::to_value(&route).unwrap()["total_fees_msat"],
            serde_json::json!("1000")
        );
    }
}

//! An in-memory payment node for unit tests.

use crate::{
    node::{
        CompletedPayment, HoldInvoice, Invoice, InvoiceState, InvoiceUpdate, NodeError,
        PaymentNode, PaymentRequest, PaymentResult, PaymentStatus, Route, SendPayment,
        Subscription,
    },
    Preimage, SwapHash,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn preimage() -> Preimage {
    Preimage::from(*b"hello world, you are beautiful!!")
}

pub fn swap_hash() -> SwapHash {
    preimage().hash()
}

#[derive(Debug, Default)]
pub struct MockNode {
    state: Mutex<State>,
}

/// How often the subscriber detached from one subscription.
#[derive(Debug)]
struct Detaches {
    token: CancellationToken,
    count: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
struct State {
    invoices: HashMap<SwapHash, HoldInvoice>,
    unknown_to_lookup: HashSet<SwapHash>,
    invoices_created: usize,
    invoice_updates: Vec<Result<InvoiceUpdate, NodeError>>,
    keep_updates_open: bool,
    subscriptions: Vec<Detaches>,
    payment_result: Option<Result<PaymentResult, NodeError>>,
    sent_payments: Vec<SendPayment>,
    sent_routes: Vec<(SwapHash, Route)>,
    settled: Vec<Preimage>,
    canceled: Vec<SwapHash>,
    cancel_error: Option<NodeError>,
    statuses: VecDeque<Result<PaymentStatus, NodeError>>,
    status_lookups: usize,
    completed_payments: Vec<CompletedPayment>,
}

impl MockNode {
    /// Events every invoice subscription emits. With `keep_open` the stream
    /// stays open until the subscriber cancels it, otherwise it closes once
    /// the events are sent.
    pub fn with_invoice_updates(
        self,
        updates: Vec<Result<InvoiceUpdate, NodeError>>,
        keep_open: bool,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.invoice_updates = updates;
            state.keep_updates_open = keep_open;
        }
        self
    }

    /// What `send_payment` returns and what `send_to_route` streams.
    pub fn with_payment_result(self, result: Result<PaymentResult, NodeError>) -> Self {
        self.state.lock().unwrap().payment_result = Some(result);
        self
    }

    /// Statuses returned by consecutive lookups, the last one repeats.
    pub fn with_payment_statuses(self, statuses: Vec<Result<PaymentStatus, NodeError>>) -> Self {
        self.state.lock().unwrap().statuses = statuses.into();
        self
    }

    pub fn with_cancel_error(self, error: NodeError) -> Self {
        self.state.lock().unwrap().cancel_error = Some(error);
        self
    }

    pub fn with_completed_payments(self, payments: Vec<CompletedPayment>) -> Self {
        self.state.lock().unwrap().completed_payments = payments;
        self
    }

    /// Makes creating an invoice for `swap_hash` fail as a duplicate while
    /// looking it up fails as well.
    pub fn insert_invoice_without_lookup(&self, swap_hash: SwapHash) {
        self.state.lock().unwrap().unknown_to_lookup.insert(swap_hash);
    }

    pub fn invoices_created(&self) -> usize {
        self.state.lock().unwrap().invoices_created
    }

    pub fn created_invoice(&self, swap_hash: SwapHash) -> Option<HoldInvoice> {
        self.state.lock().unwrap().invoices.get(&swap_hash).cloned()
    }

    pub fn sent_payments(&self) -> Vec<SendPayment> {
        self.state.lock().unwrap().sent_payments.clone()
    }

    pub fn sent_routes(&self) -> Vec<(SwapHash, Route)> {
        self.state.lock().unwrap().sent_routes.clone()
    }

    pub fn settled(&self) -> Vec<Preimage> {
        self.state.lock().unwrap().settled.clone()
    }

    pub fn canceled(&self) -> Vec<SwapHash> {
        self.state.lock().unwrap().canceled.clone()
    }

    pub fn status_lookups(&self) -> usize {
        self.state.lock().unwrap().status_lookups
    }

    pub fn assert_subscriptions_cancelled(&self, expected: usize) {
        let state = self.state.lock().unwrap();

        assert_eq!(state.subscriptions.len(), expected, "number of subscriptions");
        for subscription in &state.subscriptions {
            assert!(
                subscription.token.is_cancelled(),
                "all subscriptions must be cancelled"
            );
            assert_eq!(
                subscription.count.load(Ordering::SeqCst),
                1,
                "subscriptions must be detached exactly once"
            );
        }
    }

    fn subscribe<T>(&self, events: Vec<Result<T, NodeError>>, keep_open: bool) -> Subscription<T>
    where
        T: Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(events.len().max(1));
        let token = CancellationToken::new();
        let count = Arc::new(AtomicUsize::new(0));
        self.state.lock().unwrap().subscriptions.push(Detaches {
            token: token.clone(),
            count: count.clone(),
        });

        let producer_token = token.clone();
        tokio::spawn(async move {
            for event in events {
                if sender.send(event).await.is_err() {
                    return;
                }
            }
            if keep_open {
                producer_token.cancelled().await;
            }
        });

        Subscription::with_detach(receiver, move || {
            count.fetch_add(1, Ordering::SeqCst);
            token.cancel();
        })
    }
}

#[async_trait]
impl PaymentNode for MockNode {
    async fn create_hold_invoice(&self, invoice: HoldInvoice) -> Result<PaymentRequest, NodeError> {
        let mut state = self.state.lock().unwrap();

        if state.unknown_to_lookup.contains(&invoice.swap_hash)
            || state.invoices.contains_key(&invoice.swap_hash)
        {
            return Err(NodeError::HashAlreadyExists);
        }

        let payment_request = payment_request(&invoice.swap_hash);
        state.invoices.insert(invoice.swap_hash, invoice);
        state.invoices_created += 1;

        Ok(payment_request)
    }

    async fn lookup_invoice(&self, swap_hash: SwapHash) -> Result<Invoice, NodeError> {
        let state = self.state.lock().unwrap();

        let invoice = state
            .invoices
            .get(&swap_hash)
            .ok_or_else(|| NodeError::Rejected("unable to locate invoice".to_owned()))?;

        Ok(Invoice {
            payment_request: payment_request(&swap_hash),
            final_cltv_expiry: invoice.final_cltv_expiry,
            value: invoice.amount,
            state: InvoiceState::Open,
        })
    }

    async fn subscribe_invoice(
        &self,
        _: SwapHash,
    ) -> Result<Subscription<InvoiceUpdate>, NodeError> {
        let (events, keep_open) = {
            let state = self.state.lock().unwrap();
            (state.invoice_updates.clone(), state.keep_updates_open)
        };

        Ok(self.subscribe(events, keep_open))
    }

    async fn send_payment(&self, payment: SendPayment) -> Result<PaymentResult, NodeError> {
        let mut state = self.state.lock().unwrap();
        state.sent_payments.push(payment);

        state
            .payment_result
            .clone()
            .unwrap_or_else(|| Err(NodeError::Rejected("no payment result scripted".to_owned())))
    }

    async fn send_to_route(
        &self,
        swap_hash: SwapHash,
        route: Route,
    ) -> Result<Subscription<PaymentResult>, NodeError> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.sent_routes.push((swap_hash, route));
            state.payment_result.clone()
        };

        Ok(self.subscribe(result.into_iter().collect(), true))
    }

    async fn settle_invoice(&self, preimage: Preimage) -> Result<(), NodeError> {
        self.state.lock().unwrap().settled.push(preimage);
        Ok(())
    }

    async fn cancel_invoice(&self, swap_hash: SwapHash) -> Result<(), NodeError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.cancel_error.clone() {
            return Err(error);
        }

        state.canceled.push(swap_hash);
        Ok(())
    }

    async fn lookup_payment_status(&self, _: SwapHash) -> Result<PaymentStatus, NodeError> {
        let mut state = self.state.lock().unwrap();
        state.status_lookups += 1;

        let status = if state.statuses.len() > 1 {
            state.statuses.pop_front()
        } else {
            state.statuses.front().cloned()
        };

        status.unwrap_or(Ok(PaymentStatus::Grounded))
    }

    async fn list_completed_payments(&self) -> Result<Vec<CompletedPayment>, NodeError> {
        Ok(self.state.lock().unwrap().completed_payments.clone())
    }
}

fn payment_request(swap_hash: &SwapHash) -> PaymentRequest {
    PaymentRequest(format!("lnbcrt1{:x}", swap_hash))
}

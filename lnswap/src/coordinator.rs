//! One entry point per swap operation, configured once.

use crate::{
    commitment::{self, CommitmentOptions},
    config::Settings,
    error::Error,
    node::{PaymentNode, PaymentRequest, Route},
    payment, resolution, retrieve,
    timelock::{self, Chain, ForwardingPolicy, TimelockBudget},
    watcher, Preimage, RelativeTime, SwapHash, Timestamp,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drives the legs of swaps against one payment node.
///
/// Holds no per-swap state: every operation is addressed by its swap hash
/// and may be repeated after a restart.
#[derive(Debug)]
pub struct Coordinator<N> {
    node: N,
    chain: Chain,
    policy: ForwardingPolicy,
    invoice_expiry: RelativeTime,
    poll_interval: Duration,
}

impl<N> Coordinator<N>
where
    N: PaymentNode,
{
    pub fn new(node: N, settings: &Settings) -> Self {
        Coordinator {
            node,
            chain: settings.chain.clone(),
            policy: settings.forwarding,
            invoice_expiry: settings.swap.invoice_expiry,
            poll_interval: settings.swap.preimage_poll_interval,
        }
    }

    pub fn with_parameters(
        node: N,
        chain: Chain,
        policy: ForwardingPolicy,
        invoice_expiry: RelativeTime,
        poll_interval: Duration,
    ) -> Self {
        Coordinator {
            node,
            chain,
            policy,
            invoice_expiry,
            poll_interval,
        }
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn forwarding_policy(&self) -> &ForwardingPolicy {
        &self.policy
    }

    /// The budget an originating payment of this coordinator uses, useful to
    /// quote time locks to a counterparty before paying.
    pub fn direct_budget(&self) -> Result<TimelockBudget, Error> {
        Ok(TimelockBudget::direct(&self.chain, &self.policy)?)
    }

    /// See [`timelock::remove_forwarding_policy`].
    pub fn remove_forwarding_policy(
        &self,
        extended_time_lock_delta: u32,
        block_height: u32,
    ) -> Result<u32, Error> {
        Ok(timelock::remove_forwarding_policy(
            extended_time_lock_delta,
            self.chain.seconds_per_block,
            block_height,
            &self.policy,
        )?)
    }

    /// Registers the hold invoice for `swap_hash`. The configured invoice
    /// expiry applies unless `options` overrides it.
    pub async fn prepare_commitment(
        &self,
        swap_hash: SwapHash,
        amount: u64,
        memo: &str,
        options: CommitmentOptions,
    ) -> Result<PaymentRequest, Error> {
        let options = CommitmentOptions {
            expiry: options.expiry.or(Some(self.invoice_expiry)),
            ..options
        };

        commitment::prepare_commitment(
            &self.node,
            &self.chain,
            &self.policy,
            swap_hash,
            amount,
            memo,
            options,
        )
        .await
    }

    pub async fn wait_for_commitment(&self, swap_hash: SwapHash) -> Result<Timestamp, Error> {
        watcher::wait_for_commitment(&self.node, swap_hash).await
    }

    pub async fn send_direct(
        &self,
        destination: &str,
        swap_hash: SwapHash,
        amount: u64,
    ) -> Result<Preimage, Error> {
        payment::send_direct(
            &self.node,
            &self.chain,
            &self.policy,
            destination,
            swap_hash,
            amount,
        )
        .await
    }

    pub async fn send_translated(
        &self,
        destination: &str,
        swap_hash: SwapHash,
        amount: u64,
        absolute_max_time: Timestamp,
        final_delta: RelativeTime,
    ) -> Result<Preimage, Error> {
        payment::send_translated(
            &self.node,
            &self.chain,
            &self.policy,
            destination,
            swap_hash,
            amount,
            absolute_max_time,
            final_delta,
        )
        .await
    }

    pub async fn send_over_route(&self, payment_hash: &str, route: Route) -> Result<Preimage, Error> {
        payment::send_over_route(&self.node, payment_hash, route).await
    }

    pub async fn settle(&self, swap_hash: SwapHash, preimage: Preimage) -> Result<(), Error> {
        resolution::settle(&self.node, swap_hash, preimage).await
    }

    pub async fn cancel(&self, swap_hash: SwapHash) -> Result<(), Error> {
        resolution::cancel(&self.node, swap_hash).await
    }

    pub async fn get_preimage(
        &self,
        swap_hash: SwapHash,
        cancel: &CancellationToken,
    ) -> Result<Preimage, Error> {
        retrieve::get_preimage(&self.node, swap_hash, self.poll_interval, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ConfigError,
        node::{InvoiceState, InvoiceUpdate, PaymentResult, PaymentStatus},
        test_harness::{preimage, swap_hash, MockNode},
    };
    use spectral::prelude::*;

    fn coordinator(node: MockNode) -> Coordinator<MockNode> {
        Coordinator::with_parameters(
            node,
            Chain::known("BTC").unwrap(),
            ForwardingPolicy::default(),
            RelativeTime::new(600),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn removes_own_forwarding_delta() {
        let coordinator = coordinator(MockNode::default());

        assert_that(&coordinator.remove_forwarding_policy(146_400, 100)).is_ok_containing(200);
        assert!(matches!(
            coordinator.remove_forwarding_policy(86_300, 100),
            Err(Error::Config(ConfigError::InsufficientTimeLock { .. }))
        ));
    }

    #[tokio::test]
    async fn configured_invoice_expiry_is_used() {
        let coordinator = coordinator(MockNode::default());

        coordinator
            .prepare_commitment(swap_hash(), 10_000, "swap", CommitmentOptions::default())
            .await
            .unwrap();

        let invoice = coordinator.node().created_invoice(swap_hash()).unwrap();
        assert_eq!(invoice.expiry, RelativeTime::new(600));
    }

    #[tokio::test]
    async fn receiving_leg_end_to_end() {
        let created = Timestamp::now();
        let node = MockNode::default().with_invoice_updates(
            vec![Ok(InvoiceUpdate {
                state: InvoiceState::Accepted,
                creation_date: created,
                expiry: RelativeTime::new(600),
            })],
            true,
        );
        let coordinator = coordinator(node);

        coordinator
            .prepare_commitment(swap_hash(), 10_000, "swap", CommitmentOptions::default())
            .await
            .unwrap();
        let accepted = coordinator.wait_for_commitment(swap_hash()).await;
        coordinator.settle(swap_hash(), preimage()).await.unwrap();

        assert_that(&accepted).is_ok_containing(created);
        assert_eq!(coordinator.node().settled(), vec![preimage()]);
    }

    #[tokio::test(start_paused = true)]
    async fn originating_leg_recovers_preimage() {
        let node = MockNode::default()
            .with_payment_result(Ok(PaymentResult {
                preimage: Some(preimage()),
                payment_error: None,
            }))
            .with_payment_statuses(vec![Ok(PaymentStatus::InFlight), Ok(PaymentStatus::Complete)])
            .with_completed_payments(vec![crate::node::CompletedPayment {
                swap_hash: swap_hash(),
                preimage: preimage(),
            }]);
        let coordinator = coordinator(node);

        let paid = coordinator
            .send_direct("02aa", swap_hash(), 10_000)
            .await
            .unwrap();
        let recovered = coordinator
            .get_preimage(swap_hash(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(paid, recovered);
        assert_eq!(coordinator.node().status_lookups(), 2);
    }

    #[test]
    fn direct_budget_for_bitcoin_defaults() {
        let coordinator = coordinator(MockNode::default());

        assert_that(&coordinator.direct_budget()).is_ok_containing(TimelockBudget {
            final_cltv_delta: 294,
            cltv_limit: None,
        });
    }
}

//! Registering the hold invoice that commits us to receive a swap payment.

use crate::{
    error::{Error, PermanentError},
    node::{HoldInvoice, NodeError, PaymentNode, PaymentRequest},
    timelock::{Chain, ForwardingPolicy},
    tracing_ext::InstrumentSwap,
    RelativeTime, SwapHash,
};

/// The lightning invoice expiry tells our node until when a payment of the
/// invoice can be accepted. A payer attempting to pay an expired invoice is
/// rejected by the node.
///
/// One hour gives the counterparty time to lock its side without leaving the
/// commitment open for longer than the swap's time locks are sized for.
pub const INVOICE_EXPIRY_SECS: RelativeTime = RelativeTime::new(3600);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CommitmentOptions {
    pub expiry: Option<RelativeTime>,
    /// In blocks.
    pub final_cltv_expiry: Option<u32>,
}

/// Creates the hold invoice for `swap_hash`, or returns the payment request
/// of the one created earlier.
///
/// Calling this more than once for the same hash, for example after a
/// restart, yields the same payment request without creating a second
/// invoice. If the node refuses creation and the existing invoice cannot be
/// looked up either, the creation error is returned.
#[allow(clippy::too_many_arguments)]
pub async fn prepare_commitment<N>(
    node: &N,
    chain: &Chain,
    policy: &ForwardingPolicy,
    swap_hash: SwapHash,
    amount: u64,
    memo: &str,
    options: CommitmentOptions,
) -> Result<PaymentRequest, Error>
where
    N: PaymentNode + ?Sized,
{
    if amount == 0 {
        return Err(PermanentError::InvalidAmount.into());
    }

    let final_cltv_expiry = match options.final_cltv_expiry {
        Some(blocks) => blocks,
        None => chain.min_delta(policy.final_delta)?,
    };

    let invoice = HoldInvoice {
        memo: memo.to_owned(),
        amount,
        expiry: options.expiry.unwrap_or(INVOICE_EXPIRY_SECS),
        final_cltv_expiry,
        swap_hash,
    };

    create_or_look_up(node, invoice)
        .instrument_swap(swap_hash, "prepare_commitment")
        .await
}

async fn create_or_look_up<N>(node: &N, invoice: HoldInvoice) -> Result<PaymentRequest, Error>
where
    N: PaymentNode + ?Sized,
{
    let swap_hash = invoice.swap_hash;

    match node.create_hold_invoice(invoice).await {
        Ok(payment_request) => {
            tracing::info!("created hold invoice");
            Ok(payment_request)
        }
        Err(NodeError::HashAlreadyExists) => {
            tracing::debug!("hold invoice exists, looking it up");

            match node.lookup_invoice(swap_hash).await {
                Ok(invoice) => Ok(invoice.payment_request),
                Err(lookup_error) => {
                    tracing::warn!("failed to look up existing invoice: {}", lookup_error);
                    Err(NodeError::HashAlreadyExists.into())
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

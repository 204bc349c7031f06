//! Sending the outbound HTLC of a swap.
//!
//! All three entry points end in [`interpret_payment`], which turns what the
//! payment node reports into either the settlement preimage or a
//! [`PermanentError`]. Failures of the payment layer are permanent: the same
//! hash must not be attempted again blindly because the counterparty's
//! commitment may still hold the first attempt.

use crate::{
    error::{Error, PermanentError},
    node::{NodeError, PaymentNode, PaymentResult, Route, SendPayment},
    timelock::{Chain, ForwardingPolicy, TimelockBudget},
    tracing_ext::InstrumentSwap,
    Preimage, RelativeTime, SwapHash, Timestamp,
};

/// Pays `amount` to `destination`, originating a swap.
///
/// The final CLTV delta covers every known forwarding delta plus the end
/// node's settlement delta and the buffer, rounded up to blocks.
pub async fn send_direct<N>(
    node: &N,
    chain: &Chain,
    policy: &ForwardingPolicy,
    destination: &str,
    swap_hash: SwapHash,
    amount: u64,
) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    let budget = TimelockBudget::direct(chain, policy)?;

    send(node, destination, swap_hash, amount, budget)
        .instrument_swap(swap_hash, "send_direct")
        .await
}

/// Forwards a swap whose deadline was set by an upstream party.
///
/// The time left until `absolute_max_time` becomes the CLTV limit (rounded
/// down), `final_delta` becomes the final CLTV delta (rounded up).
#[allow(clippy::too_many_arguments)]
pub async fn send_translated<N>(
    node: &N,
    chain: &Chain,
    policy: &ForwardingPolicy,
    destination: &str,
    swap_hash: SwapHash,
    amount: u64,
    absolute_max_time: Timestamp,
    final_delta: RelativeTime,
) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    let budget = TimelockBudget::translated(
        chain,
        policy,
        absolute_max_time,
        final_delta,
        Timestamp::now(),
    )?;

    send(node, destination, swap_hash, amount, budget)
        .instrument_swap(swap_hash, "send_translated")
        .await
}

/// Pays over one explicit route, bypassing the node's pathfinding.
///
/// Only needed when the default final hop policy cannot satisfy a custom
/// CLTV delta. `payment_hash` is the Base64 encoding used on our public
/// surface; the node receives the decoded bytes.
pub async fn send_over_route<N>(
    node: &N,
    payment_hash: &str,
    route: Route,
) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    let swap_hash = SwapHash::from_base64(payment_hash).map_err(PermanentError::from)?;

    pay_route(node, swap_hash, route)
        .instrument_swap(swap_hash, "send_over_route")
        .await
}

async fn send<N>(
    node: &N,
    destination: &str,
    swap_hash: SwapHash,
    amount: u64,
    budget: TimelockBudget,
) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    if amount == 0 {
        return Err(PermanentError::InvalidAmount.into());
    }

    tracing::info!(
        final_cltv_delta = budget.final_cltv_delta,
        cltv_limit = ?budget.cltv_limit,
        "sending payment of {} to {}",
        amount,
        destination
    );

    let result = node
        .send_payment(SendPayment {
            destination: destination.to_owned(),
            swap_hash,
            amount,
            final_cltv_delta: budget.final_cltv_delta,
            cltv_limit: budget.cltv_limit,
        })
        .await
        .map_err(reject_as_permanent)?;

    interpret_payment(swap_hash, result)
}

async fn pay_route<N>(node: &N, swap_hash: SwapHash, route: Route) -> Result<Preimage, Error>
where
    N: PaymentNode + ?Sized,
{
    tracing::info!(
        total_time_lock = route.total_time_lock,
        hops = route.hops.len(),
        "sending payment over route"
    );

    let mut results = node
        .send_to_route(swap_hash, route)
        .await
        .map_err(reject_as_permanent)?;

    let result = results.next().await;
    results.cancel();

    match result {
        Some(Ok(result)) => interpret_payment(swap_hash, result),
        Some(Err(e)) => Err(reject_as_permanent(e)),
        None => Err(PermanentError::PaymentRejected(
            "payment stream closed without a result".to_owned(),
        )
        .into()),
    }
}

/// Turns the node's report of a payment attempt into the preimage.
///
/// The preimage is checked against the hash we paid to before it is handed
/// out.
pub fn interpret_payment(swap_hash: SwapHash, result: PaymentResult) -> Result<Preimage, Error> {
    if let Some(payment_error) = result.payment_error.filter(|e| !e.is_empty()) {
        tracing::warn!("payment failed: {}", payment_error);
        return Err(classify(payment_error).into());
    }

    let preimage = result
        .preimage
        .ok_or(PermanentError::MissingPreimage { swap_hash })?;

    if !preimage.matches(&swap_hash) {
        return Err(PermanentError::PreimageMismatch { swap_hash }.into());
    }

    tracing::info!("payment settled");

    Ok(preimage)
}

fn classify(payment_error: String) -> PermanentError {
    let lowercase = payment_error.to_lowercase();

    if lowercase.contains("exceed") && lowercase.contains("time lock") {
        PermanentError::TimeLockBudgetExceeded(payment_error)
    } else if lowercase.contains("unable to find a path") || lowercase.contains("no route") {
        PermanentError::NoRoute(payment_error)
    } else {
        PermanentError::PaymentRejected(payment_error)
    }
}

/// A refusal to dispatch is a payment layer failure, deadlines and broken
/// connections stay transport errors.
fn reject_as_permanent(error: NodeError) -> Error {
    match error {
        NodeError::Rejected(msg) => classify(msg).into(),
        other => other.into(),
    }
}

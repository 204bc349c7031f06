//! Releasing or abandoning the inbound HTLC held by our commitment.

use crate::{
    error::{Error, PermanentError},
    node::PaymentNode,
    tracing_ext::InstrumentSwap,
    Preimage, SwapHash,
};

/// Settles the hold invoice for `swap_hash`, claiming the inbound HTLC.
///
/// The preimage is verified locally first. A preimage for a different hash
/// is never sent to the node.
pub async fn settle<N>(node: &N, swap_hash: SwapHash, preimage: Preimage) -> Result<(), Error>
where
    N: PaymentNode + ?Sized,
{
    settle_verified(node, swap_hash, preimage)
        .instrument_swap(swap_hash, "settle")
        .await
}

async fn settle_verified<N>(node: &N, swap_hash: SwapHash, preimage: Preimage) -> Result<(), Error>
where
    N: PaymentNode + ?Sized,
{
    if !preimage.matches(&swap_hash) {
        tracing::error!("refusing to settle with a preimage for {}", preimage.hash());
        return Err(PermanentError::PreimageMismatch { swap_hash }.into());
    }

    node.settle_invoice(preimage).await?;
    tracing::info!("settled hold invoice");

    Ok(())
}

/// Cancels the hold invoice for `swap_hash`, releasing any inbound HTLC back
/// to the payer.
pub async fn cancel<N>(node: &N, swap_hash: SwapHash) -> Result<(), Error>
where
    N: PaymentNode + ?Sized,
{
    cancel_invoice(node, swap_hash)
        .instrument_swap(swap_hash, "cancel")
        .await
}

async fn cancel_invoice<N>(node: &N, swap_hash: SwapHash) -> Result<(), Error>
where
    N: PaymentNode + ?Sized,
{
    node.cancel_invoice(swap_hash).await?;
    tracing::info!("canceled hold invoice");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        node::NodeError,
        test_harness::{preimage, swap_hash, MockNode},
    };
    use spectral::prelude::*;

    #[tokio::test]
    async fn settles_with_matching_preimage() {
        let node = MockNode::default();

        let result = settle(&node, swap_hash(), preimage()).await;

        assert_that(&result).is_ok();
        assert_eq!(node.settled(), vec![preimage()]);
    }

    #[tokio::test]
    async fn wrong_preimage_never_reaches_the_node() {
        let node = MockNode::default();

        let result = settle(&node, swap_hash(), Preimage::from([1u8; 32])).await;

        assert!(matches!(
            result,
            Err(Error::Permanent(PermanentError::PreimageMismatch { .. }))
        ));
        assert!(node.settled().is_empty());
    }

    #[tokio::test]
    async fn cancels_by_hash() {
        let node = MockNode::default();

        cancel(&node, swap_hash()).await.unwrap();

        assert_eq!(node.canceled(), vec![swap_hash()]);
    }

    #[tokio::test]
    async fn failed_cancel_keeps_its_category() {
        let node = MockNode::default().with_cancel_error(NodeError::DeadlineExceeded);

        let result = cancel(&node, swap_hash()).await;

        assert!(result.unwrap_err().is_retryable());
        assert!(node.canceled().is_empty());
    }
}

use crate::SwapHash;
use tracing_futures::{Instrument, Instrumented};

/// Extension trait for easily applying a consistent span across all swap
/// operations.
pub trait InstrumentSwap: Sized {
    fn instrument_swap(self, swap_hash: SwapHash, operation: &'static str) -> Instrumented<Self> {
        self.instrument(tracing::error_span!("", swap_hash = %swap_hash, operation = %operation))
    }
}

impl<T> InstrumentSwap for T {}

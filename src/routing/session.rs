//! Debounced, supersedable quoting
//!
//! Each request bumps a generation and replaces the cancellation token of the
//! one before it. A request only commits its result if its generation is still
//! current once the quote resolves, so a slow stale quote can never overwrite
//! a newer one.

use alloy_primitives::{Address, U256};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::selector::{Quote, QuoteEngine};
use crate::error::SwapError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub amount_in: U256,
    pub token_in: Address,
    pub token_out: Address,
    pub intermediates: Vec<Address>,
}

impl QuoteRequest {
    fn key(&self) -> (U256, Address, Address) {
        (self.amount_in, self.token_in, self.token_out)
    }
}

struct SessionState {
    generation: u64,
    cancel: CancellationToken,
    /// Inputs of the most recently issued request
    issued_key: Option<(U256, Address, Address)>,
    /// Inputs behind the quote currently in `latest`
    committed_key: Option<(U256, Address, Address)>,
}

pub struct QuoteSession {
    engine: Arc<QuoteEngine>,
    debounce: Duration,
    state: Mutex<SessionState>,
    latest: watch::Sender<Option<Quote>>,
}

impl QuoteSession {
    pub fn new(engine: Arc<QuoteEngine>, debounce: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            engine,
            debounce,
            state: Mutex::new(SessionState {
                generation: 0,
                cancel: CancellationToken::new(),
                issued_key: None,
                committed_key: None,
            }),
            latest,
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Most recently committed quote
    pub fn latest(&self) -> Option<Quote> {
        self.latest.borrow().clone()
    }

    /// Receiver that observes every committed quote
    pub fn subscribe(&self) -> watch::Receiver<Option<Quote>> {
        self.latest.subscribe()
    }

    /// Abandon whatever is in flight
    pub fn cancel(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.cancel.cancel();
    }

    /// Issue a quote request.
    ///
    /// Returns `Ok(None)` when the request was superseded before it could
    /// commit, including when its quote failed after being superseded. When
    /// `(amountIn, tokenIn, tokenOut)` matches both the last issued request
    /// and the committed quote, that quote is reused without touching the
    /// oracle. Any other request supersedes whatever is in flight.
    pub async fn request(&self, req: QuoteRequest) -> Result<Option<Quote>, SwapError> {
        let key = req.key();
        let (generation, cancel) = {
            let mut state = self.state();
            if state.issued_key == Some(key) && state.committed_key == Some(key) {
                if let Some(quote) = self.latest() {
                    debug!("Quote inputs unchanged, reusing last result");
                    return Ok(Some(quote));
                }
            }
            state.cancel.cancel();
            state.generation += 1;
            state.cancel = CancellationToken::new();
            state.issued_key = Some(key);
            (state.generation, state.cancel.clone())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Quote request #{} superseded during debounce", generation);
                return Ok(None);
            }
            _ = tokio::time::sleep(self.debounce) => {}
        }

        let result = self
            .engine
            .quote_cancellable(
                req.amount_in,
                req.token_in,
                req.token_out,
                &req.intermediates,
                &cancel,
            )
            .await;

        let mut state = self.state();
        if state.generation != generation {
            debug!("Dropping stale quote #{} (current #{})", generation, state.generation);
            return Ok(None);
        }
        let quote = match result? {
            Some(quote) => quote,
            None => return Ok(None),
        };
        state.committed_key = Some(key);
        self.latest.send_replace(Some(quote.clone()));
        Ok(Some(quote))
    }
}

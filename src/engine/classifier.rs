//! Event classifier.
//!
//! Decides, for a single trade, which treatment path it receives. Pure:
//! no I/O, no state.
//!
//! Routing for a tracked trade with notional `v`, in order:
//! 1. `v < noise_floor` → dust, discarded
//! 2. `stream_min <= v < accumulation_floor` → visible flow
//! 3. `v >= accumulation_floor` → accumulation ladder
//!
//! Values in `[noise_floor, stream_min)` match no branch and are dropped.

use std::fmt;

use crate::config::Thresholds;
use crate::engine::catalog::MarketLookup;
use crate::types::TradeEvent;

/// Why a trade was not routed anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Market is not in the tracked catalog.
    Untracked,
    /// Below the noise floor.
    Dust,
    /// Between the noise floor and the stream minimum.
    BelowStream,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::Untracked => write!(f, "untracked"),
            DiscardReason::Dust => write!(f, "dust"),
            DiscardReason::BelowStream => write!(f, "below-stream"),
        }
    }
}

/// Treatment path for a trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route {
    Discard(DiscardReason),
    VisibleFlow { notional: f64 },
    Accumulate { notional: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    thresholds: Thresholds,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Route a trade, consulting `catalog` for relevance.
    pub fn route(&self, trade: &TradeEvent, catalog: &dyn MarketLookup) -> Route {
        self.route_value(trade.notional(), catalog.is_tracked(&trade.condition_id))
    }

    /// Route a bare notional given whether its market is tracked.
    pub fn route_value(&self, notional: f64, tracked: bool) -> Route {
        let t = &self.thresholds;

        if notional < t.noise_floor {
            return Route::Discard(DiscardReason::Dust);
        }
        if !tracked {
            return Route::Discard(DiscardReason::Untracked);
        }
        if notional >= t.stream_min && notional < t.accumulation_floor {
            return Route::VisibleFlow { notional };
        }
        if notional >= t.accumulation_floor {
            return Route::Accumulate { notional };
        }
        Route::Discard(DiscardReason::BelowStream)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Request throttling and deduplication
//!
//! Every viewport or dataset change proposes a [`RequestKey`]. The scheduler
//! decides whether that proposal becomes a network fetch:
//!
//! 1. while suspended, nothing is fetched;
//! 2. a key equal to the last accepted key is a duplicate;
//! 3. anything within the rate-limit window of the last accepted fetch is dropped.
//!
//! A one-shot force flag bypasses all three checks for exactly one submission.
//! Timestamps come from a monotonic clock, so there is no time-of-day wraparound.

use crate::{DatasetId, Extent};
use instant::{Duration, Instant};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a raster fetch, used for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// `"w,s,e,n"` in the data projection; empty means the whole dataset
    pub bbox: String,
    pub dataset: DatasetId,
    pub zoom: u8,
}

impl RequestKey {
    pub fn new(bbox: impl Into<String>, dataset: DatasetId, zoom: u8) -> Self {
        Self {
            bbox: bbox.into(),
            dataset,
            zoom,
        }
    }

    /// Key for the current viewport extent
    pub fn for_extent(extent: &Extent, dataset: DatasetId) -> Self {
        Self::new(extent.to_bbox_string(), dataset, extent.zoom)
    }

    /// Key asking for the dataset's full bounds
    pub fn whole_dataset(dataset: DatasetId, zoom: u8) -> Self {
        Self::new(String::new(), dataset, zoom)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bbox = if self.bbox.is_empty() {
            "<all>"
        } else {
            &self.bbox
        };
        write!(f, "{}@z{} [{}]", self.dataset, self.zoom, bbox)
    }
}

/// Why a proposal did not become a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Scheduling is suspended by the initialization handshake
    Suspended,
    /// Same key as the last accepted fetch
    Duplicate,
    /// Too soon after the last accepted fetch
    RateLimited,
}

/// An accepted fetch the caller must now send
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub key: RequestKey,
    pub forced: bool,
    pub issued_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept(FetchRequest),
    Reject(RejectReason),
}

impl Decision {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept(_))
    }

    pub fn into_fetch(self) -> Option<FetchRequest> {
        match self {
            Self::Accept(fetch) => Some(fetch),
            Self::Reject(_) => None,
        }
    }
}

/// Mutable scheduling state, owned by one [`RequestScheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerState {
    allow_requests: bool,
    force_request: bool,
    last_request_timestamp: Option<Instant>,
    last_request_key: Option<RequestKey>,
    last_request_extent: Option<Extent>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            allow_requests: true,
            force_request: false,
            last_request_timestamp: None,
            last_request_key: None,
            last_request_extent: None,
        }
    }
}

impl SchedulerState {
    #[inline]
    pub fn allow_requests(&self) -> bool {
        self.allow_requests
    }

    #[inline]
    pub fn force_request(&self) -> bool {
        self.force_request
    }

    #[inline]
    pub fn last_request_timestamp(&self) -> Option<Instant> {
        self.last_request_timestamp
    }

    #[inline]
    pub fn last_request_key(&self) -> Option<&RequestKey> {
        self.last_request_key.as_ref()
    }

    #[inline]
    pub fn last_request_extent(&self) -> Option<&Extent> {
        self.last_request_extent.as_ref()
    }
}

/// Counters of scheduler outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub accepted: usize,
    pub forced: usize,
    pub suspended: usize,
    pub duplicates: usize,
    pub rate_limited: usize,
}

impl SchedulerStats {
    pub fn rejected(&self) -> usize {
        self.suspended + self.duplicates + self.rate_limited
    }
}

/// The accept/reject state machine over [`SchedulerState`]
#[derive(Debug, Clone)]
pub struct RequestScheduler {
    state: SchedulerState,
    rate_limit: Duration,
    stats: SchedulerStats,
}

impl RequestScheduler {
    pub fn new(rate_limit: Duration) -> Self {
        Self {
            state: SchedulerState::default(),
            rate_limit,
            stats: SchedulerStats::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    #[inline]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    #[inline]
    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    /// Decide on a proposed fetch
    ///
    /// Consumes the force flag whatever the outcome. `extent` is recorded as
    /// the last requested extent when the fetch is accepted.
    pub fn submit(&mut self, key: RequestKey, extent: Option<Extent>, now: Instant) -> Decision {
        let forced = std::mem::replace(&mut self.state.force_request, false);

        if !forced {
            if let Some(reason) = self.rejection(&key, now) {
                match reason {
                    RejectReason::Suspended => self.stats.suspended += 1,
                    RejectReason::Duplicate => self.stats.duplicates += 1,
                    RejectReason::RateLimited => self.stats.rate_limited += 1,
                }
                tracing::trace!("Request {} rejected: {:?}", key, reason);
                return Decision::Reject(reason);
            }
        }

        self.stats.accepted += 1;
        if forced {
            self.stats.forced += 1;
        }
        tracing::debug!(
            "Request {} accepted{}",
            key,
            if forced { " (forced)" } else { "" }
        );

        self.state.last_request_key = Some(key.clone());
        self.state.last_request_timestamp = Some(now);
        if extent.is_some() {
            self.state.last_request_extent = extent;
        }
        Decision::Accept(FetchRequest {
            key,
            forced,
            issued_at: now,
        })
    }

    /// Submit with the force flag set for exactly this proposal
    pub fn submit_forced(
        &mut self,
        key: RequestKey,
        extent: Option<Extent>,
        now: Instant,
    ) -> Decision {
        self.force_next();
        self.submit(key, extent, now)
    }

    /// Arm the one-shot override for the next submission
    pub fn force_next(&mut self) {
        self.state.force_request = true;
    }

    /// Stop accepting unforced proposals
    pub fn suspend(&mut self) {
        tracing::debug!("Request scheduling suspended");
        self.state.allow_requests = false;
    }

    pub fn resume(&mut self) {
        tracing::debug!("Request scheduling resumed");
        self.state.allow_requests = true;
    }

    /// Drop the dedup key, e.g. on dataset switch
    pub fn clear_last_key(&mut self) {
        self.state.last_request_key = None;
    }

    /// Forget a failed fetch so an identical retry is not suppressed
    ///
    /// Returns whether `key` was still the last requested key.
    pub fn forget(&mut self, key: &RequestKey) -> bool {
        if self.state.last_request_key.as_ref() == Some(key) {
            self.state.last_request_key = None;
            true
        } else {
            false
        }
    }

    fn rejection(&self, key: &RequestKey, now: Instant) -> Option<RejectReason> {
        if !self.state.allow_requests {
            return Some(RejectReason::Suspended);
        }
        if self.state.last_request_key.as_ref() == Some(key) {
            return Some(RejectReason::Duplicate);
        }
        if let Some(last) = self.state.last_request_timestamp {
            let elapsed = if now >= last { now - last } else { last - now };
            if elapsed <= self.rate_limit {
                return Some(RejectReason::RateLimited);
            }
        }
        None
    }
}

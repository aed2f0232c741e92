//! Geofence evaluation with a hysteresis band.
//!
//! For every active geofence the engine measures the haversine distance from
//! the sample to the center. Only samples within [`BUFFER_METERS`] of the
//! boundary consult the last confirmed transition; everything further away
//! is assumed to be a continuation of the current state. That trades missed
//! transitions on large position jumps for far fewer history lookups.
//!
//! ```text
//!            radius - 5m      radius      radius + 5m
//!   inside  |-----------band--|--band------------|  outside
//!   (skip)  |  ENTER unless last == ENTER        |  (skip)
//!           |                 |  EXIT unless last == EXIT
//! ```
//!
//! The engine performs no writes. The only I/O is the injected
//! [`LastTransitionLookup`].

use async_trait::async_trait;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::geo::haversine_distance;
use crate::model::{Geofence, LocationSample, TransitionEvent, TransitionKind};
use crate::ports::TransitionStore;

/// Half-width of the band around the radius, in meters.
pub const BUFFER_METERS: f64 = 5.0;

/// Events produced by one evaluation; usually zero or one.
pub type Transitions = SmallVec<[TransitionEvent; 2]>;

/// Source of the last confirmed transition for a (vehicle, geofence) pair.
#[async_trait]
pub trait LastTransitionLookup: Send + Sync {
    async fn last_kind(
        &self,
        vehicle_id: &str,
        geofence_id: i64,
    ) -> anyhow::Result<Option<TransitionKind>>;
}

/// Lookup backed by the transition history.
pub struct StoreLookup<'a> {
    store: &'a dyn TransitionStore,
}

impl<'a> StoreLookup<'a> {
    pub fn new(store: &'a dyn TransitionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LastTransitionLookup for StoreLookup<'_> {
    async fn last_kind(
        &self,
        vehicle_id: &str,
        geofence_id: i64,
    ) -> anyhow::Result<Option<TransitionKind>> {
        self.store.last_transition_kind(vehicle_id, geofence_id).await
    }
}

/// Fixed lookup table, keyed by (vehicle id, geofence id).
#[async_trait]
impl LastTransitionLookup for HashMap<(String, i64), TransitionKind> {
    async fn last_kind(
        &self,
        vehicle_id: &str,
        geofence_id: i64,
    ) -> anyhow::Result<Option<TransitionKind>> {
        Ok(self.get(&(vehicle_id.to_string(), geofence_id)).copied())
    }
}

/// Where a sample sits relative to one geofence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub distance: f64,
    pub inside: bool,
    pub in_band: bool,
}

pub fn proximity(sample: &LocationSample, fence: &Geofence) -> Proximity {
    let distance = haversine_distance(
        sample.latitude,
        sample.longitude,
        fence.center_lat,
        fence.center_lng,
    );

    Proximity {
        distance,
        inside: distance <= fence.radius,
        in_band: distance >= fence.radius - BUFFER_METERS
            && distance <= fence.radius + BUFFER_METERS,
    }
}

/// Decide the transition, if any, given the current side and the last
/// confirmed kind.
pub fn decide(inside: bool, last: Option<TransitionKind>) -> Option<TransitionKind> {
    match (inside, last) {
        (true, Some(TransitionKind::Enter)) => None,
        (true, _) => Some(TransitionKind::Enter),
        (false, Some(TransitionKind::Exit)) => None,
        (false, _) => Some(TransitionKind::Exit),
    }
}

/// Evaluate one sample against a set of geofences.
///
/// Inactive or invalid geofences are skipped. At most one event is produced
/// per geofence. A failed lookup is treated as "no prior transition".
pub async fn evaluate<L>(
    sample: &LocationSample,
    geofences: &[Geofence],
    lookup: &L,
) -> Transitions
where
    L: LastTransitionLookup + ?Sized,
{
    let mut transitions = Transitions::new();

    for fence in geofences {
        if !fence.active {
            continue;
        }
        if !fence.is_valid() {
            warn!(
                geofence_id = fence.id,
                radius = fence.radius,
                "Skipping geofence with non-positive radius"
            );
            continue;
        }

        let p = proximity(sample, fence);
        if !p.in_band {
            continue;
        }

        let last = match lookup.last_kind(&sample.vehicle_id, fence.id).await {
            Ok(last) => last,
            Err(e) => {
                warn!(
                    vehicle_id = %sample.vehicle_id,
                    geofence_id = fence.id,
                    error = %e,
                    "Last transition lookup failed, assuming none"
                );
                None
            }
        };

        let Some(kind) = decide(p.inside, last) else {
            continue;
        };

        debug!(
            vehicle_id = %sample.vehicle_id,
            geofence_id = fence.id,
            distance = p.distance,
            kind = %kind,
            "Geofence transition detected"
        );

        transitions.push(TransitionEvent {
            vehicle_id: sample.vehicle_id.clone(),
            geofence_id: fence.id,
            geofence_name: fence.name.clone(),
            kind,
            timestamp: sample.timestamp,
            latitude: sample.latitude,
            longitude: sample.longitude,
        });
    }

    transitions
}

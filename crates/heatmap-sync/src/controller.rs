//! Viewport controller
//!
//! Owns every piece of synchronization state and is the only thing that
//! mutates it. The host application feeds it viewport events and server
//! responses; the controller answers through a [`Transport`] (requests to
//! send) and an [`Overlay`] (point clouds to draw, extents to fit).

use crate::geodesy::{bounding_box, zoom_to_fit};
use crate::protocol::parse_response;
use crate::{
    DatasetId, DatasetSelection, Extent, InitializationHandshake, OutgoingRequest, PointCloud,
    RasterPayload, RequestKey, RequestScheduler, Result, SchedulerStats, ServerMessage,
    SyncConfig, decode,
};
use instant::Instant;

/// Zoom assumed before the first viewport has been measured
const STARTUP_ZOOM: u8 = 6;

/// Viewport size assumed before the first viewport has been measured
const FALLBACK_VIEWPORT_PX: (f64, f64) = (1024.0, 768.0);

/// Sends requests to the server; responses come back through
/// [`ViewportController::handle_response`] in arrival order
pub trait Transport {
    fn send(&mut self, request: OutgoingRequest);
}

/// The drawing side of the map
pub trait Overlay {
    /// Replace the displayed point cloud
    fn apply(&mut self, update: OverlayUpdate);

    /// Move the map so that `extent` is visible at `zoom`
    fn fit_to(&mut self, extent: &Extent, zoom: u8);
}

/// Anything that produces viewport events, e.g. a map widget
pub trait ViewportEventSource {
    fn poll_event(&mut self) -> Option<ViewportEvent>;
}

/// What the map currently shows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub extent: Extent,
    /// Width and height of the map area in pixels
    pub pixel_size: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    /// Move-end or zoom-end
    ViewportChanged(ViewportState),
    DatasetChanged(DatasetId),
}

/// A decoded cloud plus everything needed to draw it
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayUpdate {
    pub dataset: DatasetId,
    pub cloud: PointCloud,
    pub radius_px: u32,
    /// Zoom-scaled maximum for color normalization
    pub displayed_max: f64,
}

/// Snapshot of controller counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerStats {
    pub scheduler: SchedulerStats,
    pub last_key: Option<RequestKey>,
    pub applied: usize,
    pub empty: usize,
    pub malformed: usize,
    pub stale: usize,
    pub centerings: usize,
    pub handshakes: usize,
    pub transport_failures: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    applied: usize,
    empty: usize,
    malformed: usize,
    stale: usize,
    centerings: usize,
    handshakes: usize,
    transport_failures: usize,
}

/// Single owner of scheduler, handshake and dataset state
#[derive(Debug, Clone)]
pub struct ViewportController {
    config: SyncConfig,
    scheduler: RequestScheduler,
    handshake: InitializationHandshake,
    selection: DatasetSelection,
    viewport: Option<ViewportState>,
    counters: Counters,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ViewportController {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            scheduler: RequestScheduler::new(config.rate_limit),
            handshake: InitializationHandshake::new(),
            selection: DatasetSelection::new(config.default_dataset),
            viewport: None,
            counters: Counters::default(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline]
    pub fn selection(&self) -> &DatasetSelection {
        &self.selection
    }

    #[inline]
    pub fn active_dataset(&self) -> DatasetId {
        self.selection.active()
    }

    #[inline]
    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn viewport(&self) -> Option<&ViewportState> {
        self.viewport.as_ref()
    }

    pub fn is_initializing(&self, dataset: DatasetId) -> bool {
        self.handshake.is_outstanding(dataset)
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            scheduler: self.scheduler.stats(),
            last_key: self.scheduler.state().last_request_key().cloned(),
            applied: self.counters.applied,
            empty: self.counters.empty,
            malformed: self.counters.malformed,
            stale: self.counters.stale,
            centerings: self.counters.centerings,
            handshakes: self.counters.handshakes,
            transport_failures: self.counters.transport_failures,
        }
    }

    /// Issue the initial whole-dataset fetch for the active dataset
    pub fn start(&mut self, transport: &mut impl Transport, now: Instant) {
        let key = RequestKey::whole_dataset(self.active_dataset(), self.current_zoom(None));
        tracing::info!("Loading initial data for {}", self.active_dataset());
        self.submit(key, None, false, transport, now);
    }

    /// Drain `source` and handle every event it yields
    pub fn pump(
        &mut self,
        source: &mut impl ViewportEventSource,
        transport: &mut impl Transport,
        now: Instant,
    ) {
        while let Some(event) = source.poll_event() {
            self.handle_event(event, transport, now);
        }
    }

    pub fn handle_event(
        &mut self,
        event: ViewportEvent,
        transport: &mut impl Transport,
        now: Instant,
    ) {
        match event {
            ViewportEvent::ViewportChanged(state) => {
                let zoom = self.config.clamp_zoom(state.extent.zoom);
                let state = ViewportState {
                    extent: state.extent.with_zoom(zoom),
                    ..state
                };
                self.viewport = Some(state);
                let key = RequestKey::for_extent(&state.extent, self.active_dataset());
                self.submit(key, Some(state.extent), false, transport, now);
            }
            ViewportEvent::DatasetChanged(dataset) => {
                self.selection.switch(dataset);
                self.scheduler.clear_last_key();
                transport.send(OutgoingRequest::DatasetBounds(dataset));
            }
        }
    }

    /// Re-fetch the current viewport, bypassing throttling once
    pub fn refresh(&mut self, transport: &mut impl Transport, now: Instant) {
        let (key, extent) = self.current_key();
        self.submit(key, extent, true, transport, now);
    }

    /// Parse a raw response body and handle it
    ///
    /// `origin` is the request this body answers. Unparseable bodies leave all
    /// state and the overlay untouched.
    pub fn handle_response(
        &mut self,
        origin: &OutgoingRequest,
        body: &str,
        transport: &mut impl Transport,
        overlay: &mut impl Overlay,
        now: Instant,
    ) -> Result<()> {
        match parse_response(body) {
            Ok(message) => self.handle_message(origin, message, transport, overlay, now),
            Err(e) => {
                self.counters.malformed += 1;
                tracing::warn!("Ignoring unparseable {} response: {}", origin.kind(), e);
                Err(e)
            }
        }
    }

    pub fn handle_message(
        &mut self,
        origin: &OutgoingRequest,
        message: ServerMessage,
        transport: &mut impl Transport,
        overlay: &mut impl Overlay,
        now: Instant,
    ) -> Result<()> {
        let dataset = origin.dataset();
        match message {
            ServerMessage::Raster(payload) => self.apply_raster(origin, &payload, overlay),
            ServerMessage::InitializeMe(signal) => {
                let bounds = signal.to_extent(self.current_zoom(Some(origin)))?;
                let viewport_px = self.viewport_px();
                if let Some(request) = self.handshake.begin(
                    dataset,
                    &bounds,
                    viewport_px,
                    &mut self.scheduler,
                    &self.config,
                ) {
                    self.counters.handshakes += 1;
                    transport.send(OutgoingRequest::Initialization(request));
                }
                Ok(())
            }
            ServerMessage::InitializationComplete => {
                if !self.handshake.complete(dataset) {
                    return Ok(());
                }
                if dataset != self.active_dataset() {
                    return Ok(());
                }
                // The first forced fetch can come back one frame stale, the second corrects it
                for _ in 0..2 {
                    let (key, extent) = self.current_key();
                    self.submit(key, extent, true, transport, now);
                }
                Ok(())
            }
            ServerMessage::DatasetBounds(bounds) => {
                if dataset != self.active_dataset() {
                    self.counters.stale += 1;
                    tracing::debug!("Dropping bounds of inactive dataset {}", dataset);
                    return Ok(());
                }
                let extent = bounds.to_extent(0)?;
                let zoom = zoom_to_fit(
                    &extent,
                    self.viewport_px(),
                    self.config.min_zoom,
                    self.config.max_zoom,
                );
                let extent = extent.with_zoom(zoom);
                tracing::debug!("Zoom level for first request of {} is {}", dataset, zoom);
                overlay.fit_to(&extent, zoom);
                // The switch usually lands inside the rate-limit window of the previous fetch
                let key = RequestKey::for_extent(&extent, dataset);
                self.submit(key, Some(extent), true, transport, now);
                Ok(())
            }
        }
    }

    /// Forget a failed raster fetch so an identical retry is not suppressed
    pub fn handle_transport_failure(&mut self, key: &RequestKey) {
        self.counters.transport_failures += 1;
        if self.scheduler.forget(key) {
            tracing::debug!("Cleared dedup key {} after transport failure", key);
        }
    }

    /// Transport failure for any kind of request
    pub fn handle_request_failure(&mut self, request: &OutgoingRequest) {
        match request {
            OutgoingRequest::Raster(fetch) => self.handle_transport_failure(&fetch.key),
            OutgoingRequest::Initialization(init) => {
                self.counters.transport_failures += 1;
                self.handshake.abandon(init.dataset);
            }
            OutgoingRequest::DatasetBounds(_) => self.counters.transport_failures += 1,
        }
    }

    fn apply_raster(
        &mut self,
        origin: &OutgoingRequest,
        payload: &RasterPayload,
        overlay: &mut impl Overlay,
    ) -> Result<()> {
        let dataset = origin.dataset();
        if dataset != self.active_dataset() {
            self.counters.stale += 1;
            tracing::debug!("Dropping raster of inactive dataset {}", dataset);
            return Ok(());
        }

        let zoom = self.current_zoom(Some(origin));
        let cloud = match decode(payload, zoom, self.config.default_radius) {
            Ok(cloud) => cloud,
            Err(e) => {
                self.counters.malformed += 1;
                tracing::warn!("Ignoring malformed raster for {}: {}", dataset, e);
                return Err(e);
            }
        };
        tracing::debug!("Received raster with {} samples", cloud.len());
        if cloud.is_empty() {
            self.counters.empty += 1;
            return Ok(());
        }

        let radius_px = match &self.viewport {
            Some(viewport) => self.config.radius.scale(
                cloud.suggested_radius,
                viewport.extent.to_data_projection().height(),
                viewport.pixel_size.1,
                zoom,
            ),
            None => 1,
        };

        let centering = if self.config.auto_center && self.selection.take_centering() {
            bounding_box(&cloud.samples, zoom)
        } else {
            None
        };

        overlay.apply(OverlayUpdate {
            dataset,
            displayed_max: cloud.maximum_weight,
            cloud,
            radius_px,
        });
        self.counters.applied += 1;

        if let Some(bbox) = centering {
            let fit_zoom = zoom_to_fit(
                &bbox,
                self.viewport_px(),
                self.config.min_zoom,
                self.config.max_zoom,
            );
            tracing::info!("Centering on {} data at zoom {}", dataset, fit_zoom);
            overlay.fit_to(&bbox.with_zoom(fit_zoom), fit_zoom);
            self.counters.centerings += 1;
        }
        Ok(())
    }

    fn submit(
        &mut self,
        key: RequestKey,
        extent: Option<Extent>,
        forced: bool,
        transport: &mut impl Transport,
        now: Instant,
    ) {
        let decision = if forced {
            self.scheduler.submit_forced(key, extent, now)
        } else {
            self.scheduler.submit(key, extent, now)
        };
        if let Some(fetch) = decision.into_fetch() {
            transport.send(OutgoingRequest::Raster(fetch));
        }
    }

    /// Key for the current viewport, or the whole dataset before the first viewport
    fn current_key(&self) -> (RequestKey, Option<Extent>) {
        let dataset = self.active_dataset();
        match &self.viewport {
            Some(viewport) => (
                RequestKey::for_extent(&viewport.extent, dataset),
                Some(viewport.extent),
            ),
            None => (
                RequestKey::whole_dataset(dataset, self.current_zoom(None)),
                None,
            ),
        }
    }

    fn current_zoom(&self, origin: Option<&OutgoingRequest>) -> u8 {
        if let Some(viewport) = &self.viewport {
            return viewport.extent.zoom;
        }
        match origin {
            Some(OutgoingRequest::Raster(fetch)) => fetch.key.zoom,
            _ => self.config.clamp_zoom(STARTUP_ZOOM),
        }
    }

    fn viewport_px(&self) -> (f64, f64) {
        self.viewport
            .map(|viewport| viewport.pixel_size)
            .unwrap_or(FALLBACK_VIEWPORT_PX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Datapoints, FetchRequest, Projection, Scalar};
    use instant::Duration;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<OutgoingRequest>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, request: OutgoingRequest) {
            self.sent.push(request);
        }
    }

    impl RecordingTransport {
        fn rasters(&self) -> Vec<&RequestKey> {
            self.sent
                .iter()
                .filter_map(|r| match r {
                    OutgoingRequest::Raster(fetch) => Some(&fetch.key),
                    _ => None,
                })
                .collect()
        }
    }

    #[derive(Default)]
    struct RecordingOverlay {
        updates: Vec<OverlayUpdate>,
        fits: Vec<(Extent, u8)>,
    }

    impl Overlay for RecordingOverlay {
        fn apply(&mut self, update: OverlayUpdate) {
            self.updates.push(update);
        }

        fn fit_to(&mut self, extent: &Extent, zoom: u8) {
            self.fits.push((*extent, zoom));
        }
    }

    struct QueuedEvents(VecDeque<ViewportEvent>);

    impl ViewportEventSource for QueuedEvents {
        fn poll_event(&mut self) -> Option<ViewportEvent> {
            self.0.pop_front()
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn viewport(west: f64, south: f64, zoom: u8) -> ViewportEvent {
        ViewportEvent::ViewportChanged(ViewportState {
            extent: Extent::new(
                west,
                south,
                west + 1.0,
                south + 1.0,
                Projection::Geographic,
                zoom,
            )
            .unwrap(),
            pixel_size: (800.0, 800.0),
        })
    }

    fn raster(max: f64, values: &[f64]) -> ServerMessage {
        ServerMessage::Raster(RasterPayload {
            datacount: (values.len() / 3) as f64,
            max,
            radius: Some(0.001),
            datapoints: Datapoints::List(values.iter().copied().map(Scalar::Number).collect()),
        })
    }

    fn controller_for(dataset: DatasetId) -> ViewportController {
        ViewportController::new(SyncConfig {
            default_dataset: dataset,
            ..Default::default()
        })
    }

    #[test]
    fn test_start_requests_whole_dataset() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        controller.start(&mut transport, Instant::now());
        assert_eq!(
            transport.rasters(),
            vec![&RequestKey::whole_dataset(DatasetId::Ro, 6)]
        );
        assert_eq!(
            transport.sent[0].url("http://localhost:8080/"),
            "http://localhost:8080/?heatmapRasterRequest=&dataset=ro&zoomlevel=6"
        );
    }

    #[test]
    fn test_same_viewport_twice_within_window_fetches_once() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let t0 = Instant::now();
        controller.handle_event(viewport(10.0, 40.0, 8), &mut transport, t0);
        controller.handle_event(viewport(10.0, 40.0, 8), &mut transport, t0 + ms(100));
        assert_eq!(transport.rasters().len(), 1);
        assert_eq!(controller.stats().scheduler.duplicates, 1);
    }

    #[test]
    fn test_pump_drains_event_source() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut events = QueuedEvents(VecDeque::from([
            viewport(10.0, 40.0, 8),
            viewport(11.0, 40.0, 8),
            ViewportEvent::DatasetChanged(DatasetId::Ch),
        ]));
        controller.pump(&mut events, &mut transport, Instant::now());
        assert!(events.0.is_empty());
        // Second viewport is rate limited, bounds request is not scheduled
        assert_eq!(transport.rasters().len(), 1);
        assert_eq!(
            transport.sent.last(),
            Some(&OutgoingRequest::DatasetBounds(DatasetId::Ch))
        );
    }

    #[test]
    fn test_viewport_zoom_is_clamped() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        controller.handle_event(viewport(10.0, 40.0, 2), &mut transport, Instant::now());
        assert_eq!(transport.rasters()[0].zoom, 5);
        assert_eq!(controller.viewport().unwrap().extent.zoom, 5);
    }

    #[test]
    fn test_dataset_switch_centers_exactly_once() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();

        controller.handle_event(viewport(25.0, 44.0, 8), &mut transport, t0);
        let first = transport.sent[0].clone();
        controller
            .handle_message(
                &first,
                raster(5.0, &[44.5, 25.5, 1.0]),
                &mut transport,
                &mut overlay,
                t0 + ms(50),
            )
            .unwrap();
        assert_eq!(overlay.fits.len(), 1);
        assert!(!controller.selection().centering_pending());

        controller.handle_event(
            ViewportEvent::DatasetChanged(DatasetId::De),
            &mut transport,
            t0 + ms(100),
        );
        assert_eq!(controller.active_dataset(), DatasetId::De);
        assert!(controller.scheduler().state().last_request_key().is_none());
        assert!(controller.selection().centering_pending());
        assert_eq!(
            transport.sent.last(),
            Some(&OutgoingRequest::DatasetBounds(DatasetId::De))
        );

        // Bounds answer: fit to them and fetch for them
        let bounds_request = OutgoingRequest::DatasetBounds(DatasetId::De);
        controller
            .handle_message(
                &bounds_request,
                ServerMessage::DatasetBounds(crate::DatasetBounds {
                    min_lon: 5.9,
                    min_lat: 47.3,
                    max_lon: 15.0,
                    max_lat: 55.0,
                }),
                &mut transport,
                &mut overlay,
                t0 + ms(700),
            )
            .unwrap();
        assert_eq!(overlay.fits.len(), 2);
        let key = transport.rasters().last().copied().unwrap().clone();
        assert_eq!(key.dataset, DatasetId::De);
        assert_eq!(key.bbox, "5.9,47.3,15,55");

        let de_fetch = OutgoingRequest::Raster(FetchRequest {
            key,
            forced: false,
            issued_at: t0 + ms(700),
        });
        for step in 0..2u64 {
            controller
                .handle_message(
                    &de_fetch,
                    raster(5.0, &[50.0, 10.0, 2.0, 52.0, 12.0, 3.0]),
                    &mut transport,
                    &mut overlay,
                    t0 + ms(800 + step),
                )
                .unwrap();
        }
        assert_eq!(overlay.updates.len(), 3);
        // One fit for the bounds, then exactly one auto-center
        assert_eq!(overlay.fits.len(), 3);
        let (centered, _) = overlay.fits[2];
        assert_eq!(centered.west, 10.0);
        assert_eq!(centered.north, 52.0);
        assert_eq!(controller.stats().centerings, 2);
    }

    #[test]
    fn test_cold_cache_handshake_flow() {
        let mut controller = controller_for(DatasetId::At);
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();

        controller.start(&mut transport, t0);
        let origin = transport.sent[0].clone();
        controller
            .handle_message(
                &origin,
                ServerMessage::InitializeMe(crate::ColdCacheSignal {
                    minimum_longitude: 10.0,
                    minimum_latitude: 40.0,
                    maximum_longitude: 15.0,
                    maximum_latitude: 45.0,
                }),
                &mut transport,
                &mut overlay,
                t0 + ms(20),
            )
            .unwrap();

        let Some(OutgoingRequest::Initialization(init)) = transport.sent.last() else {
            panic!("expected initialization request");
        };
        assert_eq!(init.dataset, DatasetId::At);
        assert_eq!(init.levels.len(), 10);
        assert!(init.levels.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(controller.is_initializing(DatasetId::At));
        assert!(controller.scheduler().state().allow_requests());

        // Repeated cold-cache signal while outstanding is ignored
        controller
            .handle_message(
                &origin,
                ServerMessage::InitializeMe(crate::ColdCacheSignal {
                    minimum_longitude: 10.0,
                    minimum_latitude: 40.0,
                    maximum_longitude: 15.0,
                    maximum_latitude: 45.0,
                }),
                &mut transport,
                &mut overlay,
                t0 + ms(30),
            )
            .unwrap();
        assert_eq!(controller.stats().handshakes, 1);

        let init_request = transport.sent.last().cloned().unwrap();
        let before = transport.rasters().len();
        controller
            .handle_message(
                &init_request,
                ServerMessage::InitializationComplete,
                &mut transport,
                &mut overlay,
                t0 + ms(40),
            )
            .unwrap();
        // Two forced fetches back-to-back despite dedup and rate limit
        assert_eq!(transport.rasters().len(), before + 2);
        assert!(!controller.is_initializing(DatasetId::At));
        assert!(!controller.scheduler().state().force_request());
    }

    #[test]
    fn test_bounds_fetch_bypasses_rate_limit() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();

        controller.handle_event(viewport(25.0, 44.0, 8), &mut transport, t0);
        controller.handle_event(
            ViewportEvent::DatasetChanged(DatasetId::De),
            &mut transport,
            t0 + ms(50),
        );
        controller
            .handle_message(
                &OutgoingRequest::DatasetBounds(DatasetId::De),
                ServerMessage::DatasetBounds(crate::DatasetBounds {
                    min_lon: 5.9,
                    min_lat: 47.3,
                    max_lon: 15.0,
                    max_lat: 55.0,
                }),
                &mut transport,
                &mut overlay,
                t0 + ms(200),
            )
            .unwrap();

        let de_rasters: Vec<_> = transport
            .rasters()
            .into_iter()
            .filter(|key| key.dataset == DatasetId::De)
            .collect();
        assert_eq!(de_rasters.len(), 1);
        assert_eq!(controller.stats().scheduler.forced, 1);
        assert!(!controller.scheduler().state().force_request());
    }

    #[test]
    fn test_unexpected_initialization_ack_is_ignored() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();
        controller.handle_event(viewport(25.0, 44.0, 8), &mut transport, t0);
        let origin = transport.sent[0].clone();

        controller
            .handle_message(
                &origin,
                ServerMessage::InitializationComplete,
                &mut transport,
                &mut overlay,
                t0 + ms(10),
            )
            .unwrap();
        assert_eq!(transport.rasters().len(), 1);
        assert_eq!(controller.stats().scheduler.forced, 0);
    }

    #[test]
    fn test_last_arriving_response_wins() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();

        controller.handle_event(viewport(25.0, 44.0, 8), &mut transport, t0);
        let request_a = transport.sent[0].clone();

        controller.handle_event(viewport(26.0, 44.0, 8), &mut transport, t0 + ms(10));
        assert_eq!(transport.rasters().len(), 1);
        controller.refresh(&mut transport, t0 + ms(10));
        let request_b = transport.sent[1].clone();
        assert!(matches!(&request_b, OutgoingRequest::Raster(f) if f.forced));

        // B arrives first, then the delayed A
        controller
            .handle_message(
                &request_b,
                raster(2.0, &[44.5, 26.5, 2.0]),
                &mut transport,
                &mut overlay,
                t0 + ms(50),
            )
            .unwrap();
        controller
            .handle_message(
                &request_a,
                raster(1.0, &[44.5, 25.5, 1.0]),
                &mut transport,
                &mut overlay,
                t0 + ms(900),
            )
            .unwrap();

        assert_eq!(overlay.updates.len(), 2);
        let last = overlay.updates.last().unwrap();
        assert_eq!(last.cloud.samples[0].lon, 25.5);
        assert_eq!(last.displayed_max, 1.0);
    }

    #[test]
    fn test_malformed_payload_leaves_overlay_unchanged() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();
        controller.start(&mut transport, t0);
        let origin = transport.sent[0].clone();

        let short = ServerMessage::Raster(RasterPayload {
            datacount: 3.0,
            max: 1.0,
            radius: None,
            datapoints: Datapoints::Joined("1,2,3".into()),
        });
        assert!(
            controller
                .handle_message(&origin, short, &mut transport, &mut overlay, t0)
                .is_err()
        );
        assert!(
            controller
                .handle_response(&origin, "not jsonp", &mut transport, &mut overlay, t0)
                .is_err()
        );
        assert!(overlay.updates.is_empty());
        assert!(overlay.fits.is_empty());
        assert_eq!(controller.stats().malformed, 2);
        assert!(controller.selection().centering_pending());
    }

    #[test]
    fn test_response_body_is_parsed_and_applied() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();
        controller.handle_event(viewport(25.0, 44.0, 13), &mut transport, t0);
        let origin = transport.sent[0].clone();

        let body = "heatmap_request_callback({\r\n    datacount: 2,\r\n    max : 10,\r\n    \
                    radius : 0.001,\r\n    datapoints: [10,20,5,11,21,8]\r\n})";
        controller
            .handle_response(&origin, body, &mut transport, &mut overlay, t0)
            .unwrap();
        let update = &overlay.updates[0];
        assert_eq!(update.cloud.len(), 2);
        assert!((update.displayed_max - 10.0 * 2f64.sqrt()).abs() < 1e-12);
        // base = 0.001 / 1 * 800 = 0.8, s = 7 -> ceil(0.8 + 1.87 - 1) * 1.5 = 3
        assert_eq!(update.radius_px, 3);
    }

    #[test]
    fn test_empty_cloud_is_not_applied() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();
        controller.start(&mut transport, t0);
        let origin = transport.sent[0].clone();
        controller
            .handle_message(&origin, raster(1.0, &[]), &mut transport, &mut overlay, t0)
            .unwrap();
        assert!(overlay.updates.is_empty());
        assert_eq!(controller.stats().empty, 1);
        assert!(controller.selection().centering_pending());
    }

    #[test]
    fn test_inactive_dataset_response_dropped() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();
        controller.start(&mut transport, t0);
        let origin = transport.sent[0].clone();
        controller.handle_event(
            ViewportEvent::DatasetChanged(DatasetId::Ch),
            &mut transport,
            t0,
        );
        controller
            .handle_message(
                &origin,
                raster(1.0, &[44.0, 25.0, 1.0]),
                &mut transport,
                &mut overlay,
                t0,
            )
            .unwrap();
        assert!(overlay.updates.is_empty());
        assert_eq!(controller.stats().stale, 1);
    }

    #[test]
    fn test_transport_failure_unblocks_retry() {
        let mut controller = ViewportController::new(SyncConfig::default());
        let mut transport = RecordingTransport::default();
        let t0 = Instant::now();
        controller.handle_event(viewport(10.0, 40.0, 8), &mut transport, t0);
        let failed = transport.sent[0].clone();

        controller.handle_event(viewport(10.0, 40.0, 8), &mut transport, t0 + ms(600));
        assert_eq!(transport.rasters().len(), 1);

        controller.handle_request_failure(&failed);
        controller.handle_event(viewport(10.0, 40.0, 8), &mut transport, t0 + ms(1200));
        assert_eq!(transport.rasters().len(), 2);
        assert_eq!(controller.stats().transport_failures, 1);
    }

    #[test]
    fn test_auto_center_disabled() {
        let mut controller = ViewportController::new(SyncConfig {
            auto_center: false,
            ..Default::default()
        });
        let mut transport = RecordingTransport::default();
        let mut overlay = RecordingOverlay::default();
        let t0 = Instant::now();
        controller.start(&mut transport, t0);
        let origin = transport.sent[0].clone();
        controller
            .handle_message(
                &origin,
                raster(1.0, &[44.0, 25.0, 1.0]),
                &mut transport,
                &mut overlay,
                t0,
            )
            .unwrap();
        assert_eq!(overlay.updates.len(), 1);
        assert!(overlay.fits.is_empty());
    }
}

//! Page-load recorder.
//!
//! Drives one navigation while collecting screencast frames and network
//! telemetry over the devtools protocol. Protocol events arrive on
//! independent streams; thin forwarder tasks stamp them and push them into
//! a single ordered channel consumed by one collector task that owns all
//! recording state. Nothing here is shared mutably across tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetCpuThrottlingRateParams, SetDeviceMetricsOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EmulateNetworkConditionsParams, EnableParams, EventLoadingFailed, EventLoadingFinished,
    EventResponseReceived, GetResponseBodyParams, Headers, RequestId, SetCacheDisabledParams,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, EventJavascriptDialogOpening, EventLoadEventFired,
    EventScreencastFrame, HandleJavaScriptDialogParams, ScreencastFrameAckParams,
    StartScreencastFormat, StartScreencastParams, StopScreencastParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt as _;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use loadcast_common::{LoadcastError, LoadcastResult, RecordingClock};
use loadcast_spec_model::{
    RawFrame, Recording, RecordingSpec, ResourceSample, ResourceSnapshot, ScrollSize, Timing,
};

use crate::session::BrowserSession;

/// Pause after the load event so late frames and response bodies land.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Deadline for fetching a single response body.
const BODY_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Device emulation derived from the layout's capture size.
///
/// The page renders at the spec's CSS viewport width; the scale factor
/// blows the capture up (or down) to exactly the scroll width the
/// compositor slices from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureViewport {
    /// CSS viewport width.
    pub width: i64,
    /// CSS viewport height.
    pub height: i64,
    /// Scale from CSS pixels to captured device pixels.
    pub scale_factor: f64,
}

impl CaptureViewport {
    pub fn from_scroll(viewport_width: i64, scroll: ScrollSize) -> Self {
        let scale_factor = scroll.width as f64 / viewport_width as f64;
        let height = (scroll.height as f64 / scale_factor).ceil() as i64;
        Self {
            width: viewport_width,
            height,
            scale_factor,
        }
    }
}

/// Everything the event pipeline can tell the collector.
enum CaptureEvent {
    Response {
        event: Arc<EventResponseReceived>,
        at_ms: i64,
    },
    BodyFinished {
        request_id: RequestId,
    },
    BodyFailed {
        request_id: RequestId,
    },
    BodyResolved {
        size: u64,
        is_image: bool,
        at_ms: i64,
    },
    Frame {
        time_offset_ms: i64,
        image: Vec<u8>,
    },
    DomContentFired {
        at_ms: i64,
    },
    LoadFired {
        at_ms: i64,
    },
    /// Recording is over; the collector drops its own sender so the
    /// channel drains once outstanding body fetches resolve.
    Finish,
}

/// Record `url` loading: screencast frames, resource history, milestones.
///
/// The screencast always runs in jpeg at `screencast_quality`; captured
/// frames keep their browser encoding until composition re-encodes them.
/// Navigation failures and timeouts are not fatal: the recording keeps
/// whatever frames and telemetry arrived, and only a capture with no
/// frames at all is an error.
pub async fn record_page_load(
    session: &BrowserSession,
    url: &str,
    spec: &RecordingSpec,
    screencast_quality: u8,
    scroll: ScrollSize,
) -> LoadcastResult<Recording> {
    let page = session.new_page().await?;
    let viewport = CaptureViewport::from_scroll(spec.viewport_width, scroll);
    tracing::info!(
        url,
        viewport_width = viewport.width,
        viewport_height = viewport.height,
        scale_factor = viewport.scale_factor,
        "Preparing page for recording"
    );

    apply_emulation(&page, spec, viewport).await?;

    let streams = attach_streams(&page).await?;

    let start = StartScreencastParams::builder()
        .format(StartScreencastFormat::Jpeg)
        .quality(i64::from(screencast_quality))
        .every_nth_frame(1)
        .build();
    page.execute(start)
        .await
        .map_err(|e| LoadcastError::recording(format!("Failed to start screencast: {e}")))?;

    // The epoch anchors every timestamp in the recording, so it starts the
    // moment the screencast is live, right before navigation.
    let clock = RecordingClock::start();
    let (tx, rx) = mpsc::unbounded_channel();
    let forwarders = spawn_forwarders(streams, &page, &clock, &tx);
    let collector = Collector::new(rx, tx.clone(), page.clone(), clock.clone());
    let collector_task = tokio::spawn(collector.run());

    if let Err(e) = drive_navigation(&page, url, spec.timeout_ms, &clock).await {
        // Timeouts and navigation failures keep whatever was captured; an
        // empty capture is rejected below.
        tracing::error!(error = %e, "Navigation did not complete, keeping partial capture");
    }

    if let Err(e) = page.execute(StopScreencastParams::default()).await {
        tracing::warn!(error = %e, "Failed to stop screencast");
    }
    tokio::time::sleep(SETTLE_DELAY).await;

    let _ = tx.send(CaptureEvent::Finish);
    drop(tx);
    if let Err(e) = page.close().await {
        tracing::debug!(error = %e, "Failed to close recording page");
    }
    for task in forwarders {
        task.abort();
    }

    let collected = match collector_task.await {
        Ok(collected) => Some(collected),
        Err(e) => {
            tracing::warn!(error = %e, "Recording collector task failed");
            None
        }
    };

    let collected = collected
        .ok_or_else(|| LoadcastError::recording("Recording collector task failed"))?;

    if collected.frames.is_empty() {
        return Err(LoadcastError::recording(format!(
            "No screencast frames were captured for {url}"
        )));
    }

    let frames = correlate_frames(collected.frames, &collected.history, collected.totals);
    tracing::info!(
        frames = frames.len(),
        resource_bytes = collected.totals.all,
        image_bytes = collected.totals.images,
        "Page load recorded"
    );

    Ok(Recording {
        frames,
        title: collected.title,
        timing: collected.timing,
        total_resources: collected.totals,
    })
}

/// Apply device metrics, network shaping, CPU throttling, and headers.
async fn apply_emulation(
    page: &Page,
    spec: &RecordingSpec,
    viewport: CaptureViewport,
) -> LoadcastResult<()> {
    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(viewport.width)
        .height(viewport.height)
        .device_scale_factor(viewport.scale_factor)
        .mobile(false)
        .build()
        .map_err(|e| LoadcastError::recording(format!("Invalid device metrics: {e}")))?;
    page.execute(metrics)
        .await
        .map_err(|e| LoadcastError::recording(format!("Failed to apply device metrics: {e}")))?;

    page.execute(EnableParams::default())
        .await
        .map_err(|e| LoadcastError::recording(format!("Failed to enable network domain: {e}")))?;

    let cache = SetCacheDisabledParams::builder()
        .cache_disabled(true)
        .build()
        .map_err(|e| LoadcastError::recording(format!("Invalid cache setting: {e}")))?;
    page.execute(cache)
        .await
        .map_err(|e| LoadcastError::recording(format!("Failed to disable cache: {e}")))?;

    let conditions = EmulateNetworkConditionsParams::builder()
        .offline(false)
        .latency(spec.network.latency_ms)
        .download_throughput(spec.network.download_throughput_bps())
        .upload_throughput(spec.network.upload_throughput_bps())
        .build()
        .map_err(|e| LoadcastError::recording(format!("Invalid network conditions: {e}")))?;
    page.execute(conditions).await.map_err(|e| {
        LoadcastError::recording(format!("Failed to apply network conditions: {e}"))
    })?;

    let throttling = SetCpuThrottlingRateParams::builder()
        .rate(spec.cpu_throttling)
        .build()
        .map_err(|e| LoadcastError::recording(format!("Invalid CPU throttling rate: {e}")))?;
    page.execute(throttling)
        .await
        .map_err(|e| LoadcastError::recording(format!("Failed to throttle CPU: {e}")))?;

    if !spec.headers.is_empty() {
        let map: serde_json::Map<String, serde_json::Value> = spec
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let headers = SetExtraHttpHeadersParams::builder()
            .headers(Headers::new(serde_json::Value::Object(map)))
            .build()
            .map_err(|e| LoadcastError::recording(format!("Invalid extra headers: {e}")))?;
        page.execute(headers)
            .await
            .map_err(|e| LoadcastError::recording(format!("Failed to set extra headers: {e}")))?;
    }

    Ok(())
}

struct EventStreams {
    responses: EventStream<EventResponseReceived>,
    finished: EventStream<EventLoadingFinished>,
    failed: EventStream<EventLoadingFailed>,
    frames: EventStream<EventScreencastFrame>,
    dom_content: EventStream<EventDomContentEventFired>,
    load: EventStream<EventLoadEventFired>,
    dialogs: EventStream<EventJavascriptDialogOpening>,
}

async fn attach_streams(page: &Page) -> LoadcastResult<EventStreams> {
    Ok(EventStreams {
        responses: page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(listener_error)?,
        finished: page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(listener_error)?,
        failed: page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(listener_error)?,
        frames: page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(listener_error)?,
        dom_content: page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(listener_error)?,
        load: page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(listener_error)?,
        dialogs: page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(listener_error)?,
    })
}

fn listener_error(e: CdpError) -> LoadcastError {
    LoadcastError::recording(format!("Failed to attach protocol listener: {e}"))
}

/// One small task per protocol stream, each stamping events and pushing
/// them into the collector's channel.
fn spawn_forwarders(
    streams: EventStreams,
    page: &Page,
    clock: &RecordingClock,
    tx: &UnboundedSender<CaptureEvent>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    {
        let (tx, clock) = (tx.clone(), clock.clone());
        let mut stream = streams.responses;
        tasks.push(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let at_ms = clock.elapsed_ms();
                if tx.send(CaptureEvent::Response { event, at_ms }).is_err() {
                    break;
                }
            }
        }));
    }

    {
        let tx = tx.clone();
        let mut stream = streams.finished;
        tasks.push(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let request_id = event.request_id.clone();
                if tx.send(CaptureEvent::BodyFinished { request_id }).is_err() {
                    break;
                }
            }
        }));
    }

    {
        let tx = tx.clone();
        let mut stream = streams.failed;
        tasks.push(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let request_id = event.request_id.clone();
                if tx.send(CaptureEvent::BodyFailed { request_id }).is_err() {
                    break;
                }
            }
        }));
    }

    {
        let (tx, clock, page) = (tx.clone(), clock.clone(), page.clone());
        let mut stream = streams.frames;
        tasks.push(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                forward_screencast_frame(&event, &page, &clock, &tx).await;
            }
        }));
    }

    {
        let (tx, clock) = (tx.clone(), clock.clone());
        let mut stream = streams.dom_content;
        tasks.push(tokio::spawn(async move {
            while let Some(_event) = stream.next().await {
                let at_ms = clock.elapsed_ms();
                if tx.send(CaptureEvent::DomContentFired { at_ms }).is_err() {
                    break;
                }
            }
        }));
    }

    {
        let (tx, clock) = (tx.clone(), clock.clone());
        let mut stream = streams.load;
        tasks.push(tokio::spawn(async move {
            while let Some(_event) = stream.next().await {
                let at_ms = clock.elapsed_ms();
                if tx.send(CaptureEvent::LoadFired { at_ms }).is_err() {
                    break;
                }
            }
        }));
    }

    {
        // Dialogs would stall the load forever, so dismiss them outright.
        let page = page.clone();
        let mut stream = streams.dialogs;
        tasks.push(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                tracing::info!(message = %event.message, "Dismissing page dialog");
                let params = match HandleJavaScriptDialogParams::builder()
                    .accept(false)
                    .build()
                {
                    Ok(params) => params,
                    Err(e) => {
                        tracing::debug!(error = %e, "Invalid dialog parameters");
                        continue;
                    }
                };
                if let Err(e) = page.execute(params).await {
                    tracing::debug!(error = %e, "Failed to dismiss dialog");
                }
            }
        }));
    }

    tasks
}

/// Decode, stamp, forward, and always acknowledge a screencast frame.
async fn forward_screencast_frame(
    event: &EventScreencastFrame,
    page: &Page,
    clock: &RecordingClock,
    tx: &UnboundedSender<CaptureEvent>,
) {
    // Clamped at zero: browser timestamps can land a hair before the epoch.
    let time_offset_ms = match event.metadata.timestamp.as_ref() {
        Some(timestamp) => clock.offset_from_epoch_secs(*timestamp.inner()).max(0),
        None => {
            tracing::debug!("Screencast frame without timestamp, using elapsed time");
            clock.elapsed_ms()
        }
    };

    let data: &str = event.data.as_ref();
    match BASE64_STANDARD.decode(data) {
        Ok(image) => {
            let _ = tx.send(CaptureEvent::Frame {
                time_offset_ms,
                image,
            });
        }
        Err(e) => tracing::debug!(error = %e, "Dropping undecodable screencast frame"),
    }

    // Unacknowledged frames stop the screencast, even dropped ones.
    match ScreencastFrameAckParams::builder()
        .session_id(event.session_id)
        .build()
    {
        Ok(ack) => {
            if let Err(e) = page.execute(ack).await {
                tracing::debug!(error = %e, "Failed to acknowledge screencast frame");
            }
        }
        Err(e) => tracing::debug!(error = %e, "Invalid screencast acknowledgement"),
    }
}

async fn drive_navigation(
    page: &Page,
    url: &str,
    timeout_ms: u64,
    clock: &RecordingClock,
) -> LoadcastResult<()> {
    let navigation = async {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        Ok::<_, CdpError>(())
    };
    match tokio::time::timeout(Duration::from_millis(timeout_ms), navigation).await {
        Ok(Ok(())) => {
            tracing::info!(url, elapsed_ms = clock.elapsed_ms(), "Page finished loading");
            Ok(())
        }
        Ok(Err(e)) => Err(LoadcastError::recording(format!(
            "Failed to load {url}: {e}"
        ))),
        Err(_) => Err(LoadcastError::recording(format!(
            "Page did not finish loading within {timeout_ms} ms: {url}"
        ))),
    }
}

/// Fetch one response body and report its decoded size.
async fn resolve_body_size(
    page: &Page,
    request_id: RequestId,
    is_image: bool,
    clock: &RecordingClock,
    tx: &UnboundedSender<CaptureEvent>,
) {
    let params = match GetResponseBodyParams::builder().request_id(request_id).build() {
        Ok(params) => params,
        Err(e) => {
            tracing::debug!(error = %e, "Invalid response body request");
            return;
        }
    };
    let response = match tokio::time::timeout(BODY_FETCH_TIMEOUT, page.execute(params)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            // Bodies evicted from the browser cache are not an error worth
            // surfacing; the history just misses this response.
            tracing::debug!(error = %e, "Response body unavailable");
            return;
        }
        Err(_) => {
            tracing::debug!("Response body fetch timed out");
            return;
        }
    };

    let size = if response.base64_encoded {
        match BASE64_STANDARD.decode(response.body.as_bytes()) {
            Ok(decoded) => decoded.len(),
            Err(e) => {
                tracing::debug!(error = %e, "Response body is not valid base64");
                return;
            }
        }
    } else {
        response.body.len()
    };

    let _ = tx.send(CaptureEvent::BodyResolved {
        size: size as u64,
        is_image,
        at_ms: clock.elapsed_ms(),
    });
}

/// Owns every piece of recording state; sole consumer of the channel.
struct Collector {
    rx: UnboundedReceiver<CaptureEvent>,
    resolve_tx: Option<UnboundedSender<CaptureEvent>>,
    page: Page,
    clock: RecordingClock,
    frames: Vec<(i64, Vec<u8>)>,
    history: Vec<ResourceSample>,
    totals: ResourceSnapshot,
    timing: Timing,
    title: Option<String>,
    pending_bodies: HashMap<RequestId, bool>,
}

struct Collected {
    frames: Vec<(i64, Vec<u8>)>,
    history: Vec<ResourceSample>,
    totals: ResourceSnapshot,
    timing: Timing,
    title: Option<String>,
}

impl Collector {
    fn new(
        rx: UnboundedReceiver<CaptureEvent>,
        resolve_tx: UnboundedSender<CaptureEvent>,
        page: Page,
        clock: RecordingClock,
    ) -> Self {
        Self {
            rx,
            resolve_tx: Some(resolve_tx),
            page,
            clock,
            frames: Vec::new(),
            // The history starts with a zero sample so frames captured
            // before the first response correlate to empty totals.
            history: vec![ResourceSample {
                timestamp_ms: 0,
                all: 0,
                images: 0,
            }],
            totals: ResourceSnapshot::default(),
            timing: Timing::default(),
            title: None,
            pending_bodies: HashMap::new(),
        }
    }

    async fn run(mut self) -> Collected {
        while let Some(event) = self.rx.recv().await {
            self.handle(event).await;
        }
        Collected {
            frames: self.frames,
            history: self.history,
            totals: self.totals,
            timing: self.timing,
            title: self.title,
        }
    }

    async fn handle(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Response { event, at_ms } => {
                if self.timing.ttfr_ms.is_none() {
                    self.timing.ttfr_ms = Some(at_ms);
                    self.timing.ttfr_url = Some(event.response.url.clone());
                    tracing::debug!(url = %event.response.url, at_ms, "First response");
                }
                if (200..300).contains(&event.response.status) {
                    let is_image = event.response.mime_type.starts_with("image/");
                    self.pending_bodies
                        .insert(event.request_id.clone(), is_image);
                }
            }
            CaptureEvent::BodyFinished { request_id } => {
                let Some(is_image) = self.pending_bodies.remove(&request_id) else {
                    return;
                };
                let Some(tx) = self.resolve_tx.clone() else {
                    return;
                };
                let page = self.page.clone();
                let clock = self.clock.clone();
                tokio::spawn(async move {
                    resolve_body_size(&page, request_id, is_image, &clock, &tx).await;
                });
            }
            CaptureEvent::BodyFailed { request_id } => {
                self.pending_bodies.remove(&request_id);
            }
            CaptureEvent::BodyResolved {
                size,
                is_image,
                at_ms,
            } => {
                self.totals.all += size;
                if is_image {
                    self.totals.images += size;
                }
                self.history.push(ResourceSample {
                    timestamp_ms: at_ms,
                    all: self.totals.all,
                    images: self.totals.images,
                });
            }
            CaptureEvent::Frame {
                time_offset_ms,
                image,
            } => {
                self.timing.screen_fix_ms = Some(time_offset_ms);
                self.frames.push((time_offset_ms, image));
            }
            CaptureEvent::DomContentFired { at_ms } => {
                self.timing.on_dcl_ms = Some(at_ms);
                match self.page.get_title().await {
                    Ok(title) => self.title = title.filter(|t| !t.is_empty()),
                    Err(e) => tracing::warn!(error = %e, "Failed to read page title"),
                }
            }
            CaptureEvent::LoadFired { at_ms } => {
                self.timing.on_load_ms = Some(at_ms);
            }
            CaptureEvent::Finish => {
                self.resolve_tx = None;
            }
        }
    }
}

/// Assign each frame the latest resource sample at or before its capture
/// time. The last frame always carries the grand totals so the final
/// composited image reports the complete page weight.
fn correlate_frames(
    frames: Vec<(i64, Vec<u8>)>,
    history: &[ResourceSample],
    totals: ResourceSnapshot,
) -> Vec<RawFrame> {
    let count = frames.len();
    frames
        .into_iter()
        .enumerate()
        .map(|(index, (time_offset_ms, image))| {
            let resources = if index + 1 == count {
                totals
            } else {
                history
                    .iter()
                    .rev()
                    .find(|sample| sample.timestamp_ms <= time_offset_ms)
                    .map(ResourceSample::snapshot)
                    .unwrap_or_default()
            };
            RawFrame {
                time_offset_ms,
                image,
                resources,
            }
        })
        .collect()
}

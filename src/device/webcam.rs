/// Still capture from a live camera through GStreamer
///
/// Every capture runs a one-shot pipeline:
/// `<source> ! videoconvert ! jpegenc ! appsink`. The first frames are
/// dropped while the sensor settles exposure, the next JPEG is kept.
use std::fs;
use std::time::Duration;

use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info, warn};

use super::camera::{capture_path, finish_capture, jpeg_quality, prepare_capture_dir};
use super::{CameraCapture, CaptureOptions};
use crate::error::CaptureError;
use crate::state::data::{CaptureResult, CapturedImage};

/// Source used when none is configured; PipeWire hands out the default camera
pub const DEFAULT_SOURCE: &str = "pipewiresrc";

/// Camera backed by a GStreamer video source
#[derive(Debug, Clone)]
pub struct WebcamCamera {
    /// Source element description, e.g. `pipewiresrc` or `v4l2src device=/dev/video0`
    source: String,
    /// Frames discarded before the kept one
    warmup_frames: u32,
    /// How long to wait for each frame
    frame_timeout: Duration,
}

impl WebcamCamera {
    pub fn new(source: impl Into<String>, warmup_frames: u32, frame_timeout: Duration) -> Self {
        Self {
            source: source.into(),
            warmup_frames,
            frame_timeout,
        }
    }

    fn pipeline_description(&self, quality: u8) -> String {
        format!(
            "{} ! videoconvert ! jpegenc quality={} ! \
             appsink name=sink max-buffers=1 drop=true sync=false",
            self.source, quality
        )
    }

    /// Run the pipeline until one frame is kept and store it
    fn capture_still(&self, options: &CaptureOptions) -> Result<CapturedImage, CaptureError> {
        gst::init().map_err(|e| CaptureError::Pipeline(format!("failed to initialize GStreamer: {e}")))?;

        let quality = jpeg_quality(options.quality);
        let description = self.pipeline_description(quality);
        debug!(pipeline = %description, "Launching capture pipeline");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| CaptureError::Pipeline(e.to_string()))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| CaptureError::Pipeline("launch did not produce a pipeline".into()))?;

        let sink = pipeline
            .by_name("sink")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| CaptureError::Pipeline("pipeline has no appsink".into()))?;

        let frame = match pipeline.set_state(gst::State::Playing) {
            Ok(_) => self.pull_frame(&pipeline, &sink),
            Err(e) => Err(CaptureError::Pipeline(
                bus_error(&pipeline).unwrap_or_else(|| e.to_string()),
            )),
        };

        // Release the device before touching the disk
        if let Err(e) = pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to stop capture pipeline");
        }

        let jpeg = frame?;

        prepare_capture_dir(&options.temp_dir, options.exclude_from_backup)?;
        let target = capture_path(&options.temp_dir);
        fs::write(&target, &jpeg)?;

        finish_capture(&target, None, quality)
    }

    /// Skip the warm-up frames and return the bytes of the next one
    fn pull_frame(
        &self,
        pipeline: &gst::Pipeline,
        sink: &gst_app::AppSink,
    ) -> Result<Vec<u8>, CaptureError> {
        let timeout = gst::ClockTime::from_mseconds(
            u64::try_from(self.frame_timeout.as_millis()).unwrap_or(u64::MAX),
        );

        let mut skipped = 0;
        loop {
            // None on timeout or end of stream
            let Some(sample) = sink.try_pull_sample(timeout) else {
                return Err(match bus_error(pipeline) {
                    Some(reason) => CaptureError::Pipeline(reason),
                    None => CaptureError::NoFrame(self.frame_timeout),
                });
            };

            if skipped < self.warmup_frames {
                skipped += 1;
                continue;
            }

            let buffer = sample
                .buffer()
                .ok_or_else(|| CaptureError::Pipeline("sample without buffer".into()))?;
            let map = buffer
                .map_readable()
                .map_err(|e| CaptureError::Pipeline(e.to_string()))?;

            info!(bytes = map.len(), skipped, "Camera frame captured");
            return Ok(map.as_slice().to_vec());
        }
    }
}

#[async_trait]
impl CameraCapture for WebcamCamera {
    async fn capture(&self, options: &CaptureOptions) -> CaptureResult {
        let camera = self.clone();
        let options = options.clone();

        // Pulling frames blocks until the device delivers them
        let stored = tokio::task::spawn_blocking(move || camera.capture_still(&options))
            .await
            .map_err(|e| CaptureError::Join(e.to_string()));

        match stored {
            Ok(Ok(image)) => CaptureResult::Succeeded(image),
            Ok(Err(err)) | Err(err) => CaptureResult::Failed(err.to_string()),
        }
    }
}

/// First error posted on the pipeline bus, if any
fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;

    match message.view() {
        gst::MessageView::Error(err) => Some(err.error().to_string()),
        _ => None,
    }
}

//! Per-stream decoder session.
//!
//! A session owns one hardware decoder instance and turns container frames
//! into hardware submissions. The first frame bootstraps the hardware: it is
//! combined with the out-of-band codec data, used to query the stream layout
//! and to size the output pool. Every later frame waits for a free output
//! buffer before it is decoded.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::avcc::{ParameterSet, StreamFormat};
use crate::codec::{CodecKind, StreamInfo};
use crate::config::DecoderConfig;
use crate::credit::CreditGate;
use crate::device::{DecodeInput, OutputSettings, VpuDevice, VpuDriver};
use crate::ledger::{FrameFlags, PendingTimestamp, TimestampLedger};
use crate::nal;
use crate::reframe::{ReframeBuffer, reframe_access_unit};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Hardware is open but has not seen a sequence header yet.
    Uninitialized,
    Initialized,
    Closed,
}

/// One compressed access unit from the container.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame<'a> {
    pub data: &'a [u8],
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub flags: FrameFlags,
}

impl<'a> InputFrame<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pts: None,
            dts: None,
            flags: FrameFlags::empty(),
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Presentation time if known, otherwise the decode time.
    pub fn timestamp(&self) -> Option<i64> {
        self.pts.or(self.dts)
    }
}

/// A decoded picture ready for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFrame {
    pub buffer_index: usize,
    /// `None` when no pending timestamp was left to match.
    pub timestamp: Option<PendingTimestamp>,
}

/// Result of submitting one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    /// This frame configured the hardware.
    pub bootstrapped: bool,
    pub keyframe: bool,
    pub display: Option<DisplayFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// Frames that passed framing checks and were handed on for decode.
    pub frames_submitted: u64,
    pub frames_decoded: u64,
    pub frames_displayed: u64,
    pub decode_errors: u64,
    pub timestamps_dropped: u64,
    pub timestamps_missing: u64,
}

/// Where the bytes for the next hardware call live.
#[derive(Clone, Copy)]
enum Prepared {
    Scratch,
    Input,
}

/// Feeds one compressed video stream to a hardware decoder.
pub struct VideoDecoder<D: VpuDevice> {
    codec: CodecKind,
    info: StreamInfo,
    config: DecoderConfig,
    device: Option<Arc<D>>,
    state: SessionState,
    parameter_set: Option<ParameterSet>,
    extra_data: Vec<u8>,
    scratch: ReframeBuffer,
    ledger: TimestampLedger,
    credits: Option<CreditGate>,
    flush_pending: bool,
    stats: SessionStats,
}

impl<D: VpuDevice> VideoDecoder<D> {
    /// Open a hardware decoder for `codec`.
    ///
    /// The stream resolution is checked against the configured limits before
    /// the driver is touched.
    pub fn open<V>(
        driver: &V,
        codec: CodecKind,
        info: StreamInfo,
        config: DecoderConfig,
    ) -> Result<Self>
    where
        V: VpuDriver<Device = D>,
    {
        let info = info.normalized();
        if !config.within_limits(&info) {
            warn!(
                %codec,
                width = info.width,
                height = info.height,
                max_width = config.max_width,
                max_height = config.max_height,
                "stream resolution out of range"
            );
            return Err(Error::ResolutionOutOfRange {
                width: info.width,
                height: info.height,
                max_width: config.max_width,
                max_height: config.max_height,
            });
        }

        let device = driver
            .open(codec)
            .map_err(|source| Error::DeviceOpenFailed { codec, source })?;

        info!(
            %codec,
            width = info.width,
            height = info.height,
            fps_num = info.fps_num,
            fps_den = info.fps_den,
            "opened hardware decoder"
        );

        Ok(Self {
            codec,
            info,
            scratch: ReframeBuffer::new(config.input_buffer_size),
            ledger: TimestampLedger::new(config.ledger_capacity),
            config,
            device: Some(Arc::new(device)),
            state: SessionState::Uninitialized,
            parameter_set: None,
            extra_data: Vec::new(),
            credits: None,
            flush_pending: false,
            stats: SessionStats::default(),
        })
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn parameter_set(&self) -> Option<&ParameterSet> {
        self.parameter_set.as_ref()
    }

    /// Install the container's out-of-band codec data.
    ///
    /// H.264 data is parsed into a [`ParameterSet`], replacing any previous
    /// one. Other codecs keep the bytes verbatim and prepend them to the first
    /// frame. A rejected blob closes the session, and every error returned
    /// here is [fatal](Error::is_fatal).
    pub fn set_codec_data(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if data.is_empty() {
            debug!(codec = %self.codec, "empty codec data");
            return Ok(());
        }

        let capacity = self.config.parameter_set_capacity;
        let result = match self.codec {
            CodecKind::H264 => ParameterSet::parse(data, capacity)
                .map(|params| {
                    self.parameter_set = Some(params);
                })
                .map_err(|err| match err {
                    Error::BufferTooSmall { needed, capacity } => {
                        Error::CodecDataTooLarge { needed, capacity }
                    }
                    err => err,
                }),
            CodecKind::Mpeg2 | CodecKind::Mpeg4 | CodecKind::H263 => {
                if data.len() > capacity {
                    Err(Error::CodecDataTooLarge {
                        needed: data.len(),
                        capacity,
                    })
                } else {
                    self.extra_data.clear();
                    self.extra_data.extend_from_slice(data);
                    debug!(codec = %self.codec, len = data.len(), "stored codec extra data");
                    Ok(())
                }
            }
        };

        if let Err(err) = &result {
            warn!(codec = %self.codec, %err, "rejected codec data");
            self.close();
        }
        result
    }

    /// Request a flush. It takes effect at the start of the next
    /// [`submit_frame`](Self::submit_frame).
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_pending = true;
        debug!(codec = %self.codec, "flush requested");
        Ok(())
    }

    /// Submit one access unit.
    ///
    /// Blocks while every hardware output buffer is held for display. A wait
    /// cancelled through [`DisplayReleaser::shutdown`] closes the session.
    pub fn submit_frame(&mut self, frame: &InputFrame<'_>) -> Result<FrameOutcome> {
        self.ensure_open()?;
        if self.flush_pending {
            self.flush_pending = false;
            self.apply_flush();
        }

        match self.state {
            SessionState::Uninitialized => self.submit_first_frame(frame),
            SessionState::Initialized => self.submit_next_frame(frame),
            SessionState::Closed => Err(Error::Closed),
        }
    }

    fn submit_first_frame(&mut self, frame: &InputFrame<'_>) -> Result<FrameOutcome> {
        self.scratch.clear();
        let keyframe = match self.codec {
            CodecKind::H264 => {
                let blob = self
                    .parameter_set
                    .as_ref()
                    .map(ParameterSet::blob)
                    .unwrap_or_default();
                self.scratch.extend(blob)?;
                match self.parameter_set.as_ref().map(|params| params.format) {
                    Some(StreamFormat::LengthPrefixed { nal_length_size }) => {
                        reframe_access_unit(frame.data, nal_length_size, &mut self.scratch)?
                            .keyframe
                    }
                    Some(StreamFormat::AnnexB) | None => {
                        self.scratch.extend(frame.data)?;
                        nal::annexb_contains_idr(frame.data)
                    }
                }
            }
            CodecKind::Mpeg2 | CodecKind::Mpeg4 | CodecKind::H263 => {
                self.scratch.extend(&self.extra_data)?;
                self.scratch.extend(frame.data)?;
                !frame.flags.contains(FrameFlags::DELTA_UNIT)
            }
        };
        self.stats.frames_submitted += 1;

        let timestamp = self.record_timestamp(frame);
        self.bootstrap()?;

        let display = match self.codec {
            CodecKind::H264 => self.decode(Prepared::Scratch, frame.data, timestamp)?,
            // the sequence header query consumes the first frame
            CodecKind::Mpeg2 | CodecKind::Mpeg4 | CodecKind::H263 => None,
        };

        Ok(FrameOutcome {
            bootstrapped: true,
            keyframe,
            display,
        })
    }

    fn submit_next_frame(&mut self, frame: &InputFrame<'_>) -> Result<FrameOutcome> {
        let (prepared, keyframe) = match self.codec {
            CodecKind::H264 => match self.parameter_set.as_ref().map(|params| params.format) {
                Some(StreamFormat::LengthPrefixed { nal_length_size }) => {
                    self.scratch.clear();
                    let reframed =
                        reframe_access_unit(frame.data, nal_length_size, &mut self.scratch)?;
                    (Prepared::Scratch, reframed.keyframe)
                }
                Some(StreamFormat::AnnexB) | None => {
                    (Prepared::Input, nal::annexb_contains_idr(frame.data))
                }
            },
            CodecKind::Mpeg2 | CodecKind::Mpeg4 | CodecKind::H263 => {
                (Prepared::Input, !frame.flags.contains(FrameFlags::DELTA_UNIT))
            }
        };
        self.stats.frames_submitted += 1;

        let timestamp = self.record_timestamp(frame);
        let display = self.decode(prepared, frame.data, timestamp)?;
        Ok(FrameOutcome {
            bootstrapped: false,
            keyframe,
            display,
        })
    }

    /// Record the frame's timestamp and return the value to hand the hardware.
    fn record_timestamp(&mut self, frame: &InputFrame<'_>) -> i64 {
        let timestamp = frame.timestamp();
        if self.ledger.record(timestamp, frame.flags).is_err() {
            self.stats.timestamps_dropped += 1;
        }
        timestamp.unwrap_or(0)
    }

    fn bootstrap(&mut self) -> Result<()> {
        let device = Arc::clone(self.device()?);

        let query =
            device.query_stream_config(self.info.width, self.info.height, self.scratch.as_slice());
        let stream = match query {
            Ok(stream) => stream,
            Err(err) => {
                warn!(codec = %self.codec, %err, "stream config query failed");
                self.close();
                return Err(Error::BootstrapFailed(err));
            }
        };

        let settings = OutputSettings {
            width: stream.width,
            height: stream.height,
            buffer_count: self.config.output_buffers(self.codec, &self.info),
            plane_count: self.config.plane_count,
            pixel_format: stream.pixel_format,
        };
        if let Err(err) = device.configure(&settings) {
            warn!(codec = %self.codec, %err, "hardware configuration failed");
            self.close();
            return Err(Error::BootstrapFailed(err));
        }

        self.credits = Some(CreditGate::new(settings.buffer_count as usize));
        self.state = SessionState::Initialized;
        info!(
            codec = %self.codec,
            width = stream.width,
            height = stream.height,
            min_buffers = stream.min_buffers,
            buffer_count = settings.buffer_count,
            pixel_format = stream.pixel_format,
            "hardware decoder initialized"
        );
        Ok(())
    }

    fn decode(
        &mut self,
        prepared: Prepared,
        input: &[u8],
        timestamp: i64,
    ) -> Result<Option<DisplayFrame>> {
        let device = Arc::clone(self.device()?);
        let credits = self.credits.clone().ok_or(Error::Closed)?;

        let acquired = match self.config.credit_timeout {
            Some(timeout) => credits.acquire_timeout(timeout),
            None => credits.acquire(),
        };
        if let Err(err) = acquired {
            if err == Error::Cancelled {
                info!(codec = %self.codec, "output buffer wait cancelled");
                self.close();
            }
            return Err(err);
        }

        let data = match prepared {
            Prepared::Scratch => self.scratch.as_slice(),
            Prepared::Input => input,
        };
        let result = device.decode_frame(&DecodeInput {
            data,
            timestamp,
            end_of_stream: false,
        });

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                credits.release();
                self.stats.decode_errors += 1;
                warn!(codec = %self.codec, %err, timestamp, "frame decode failed");
                return Err(Error::Decode(err));
            }
        };
        self.stats.frames_decoded += 1;

        let Some(buffer_index) = output.display_index else {
            credits.release();
            trace!(timestamp, "no picture ready");
            return Ok(None);
        };

        self.stats.frames_displayed += 1;
        let timestamp = match self.ledger.consume() {
            Ok(pending) => Some(pending),
            Err(_) => {
                self.stats.timestamps_missing += 1;
                warn!(buffer_index, "no timestamp for decoded picture");
                None
            }
        };
        trace!(buffer_index, ?timestamp, "picture ready");
        Ok(Some(DisplayFrame {
            buffer_index,
            timestamp,
        }))
    }

    fn apply_flush(&mut self) {
        self.ledger.reset();
        if let Some(device) = &self.device {
            if let Err(err) = device.flush() {
                warn!(codec = %self.codec, %err, "hardware flush failed");
            }
        }
        debug!(codec = %self.codec, "flushed decoder");
    }

    /// Hand a displayed output buffer back to the hardware.
    ///
    /// Ignored until the hardware has been initialized.
    pub fn notify_display_done(&self, buffer_index: usize) -> Result<()> {
        match self.display_releaser() {
            Some(releaser) => releaser.release(buffer_index),
            None if self.state == SessionState::Closed => Err(Error::Closed),
            None => {
                debug!(buffer_index, "display done before initialization, ignoring");
                Ok(())
            }
        }
    }

    /// A handle the display thread can use to return output buffers.
    ///
    /// `None` until the hardware has been initialized.
    pub fn display_releaser(&self) -> Option<DisplayReleaser<D>> {
        Some(DisplayReleaser {
            device: Arc::clone(self.device.as_ref()?),
            credits: self.credits.clone()?,
        })
    }

    /// Take the earliest pending timestamp directly.
    pub fn pop_timestamp(&mut self) -> Result<PendingTimestamp> {
        self.ledger.consume()
    }

    /// Release the hardware and every buffer. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(credits) = self.credits.take() {
            credits.close();
        }
        if let Some(device) = self.device.take() {
            device.close();
        }
        self.parameter_set = None;
        self.extra_data = Vec::new();
        self.scratch.release();
        self.ledger.reset();
        self.flush_pending = false;
        self.state = SessionState::Closed;
        info!(codec = %self.codec, stats = ?self.stats, "closed hardware decoder");
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            SessionState::Closed => Err(Error::Closed),
            SessionState::Uninitialized | SessionState::Initialized => Ok(()),
        }
    }

    fn device(&self) -> Result<&Arc<D>> {
        self.device.as_ref().ok_or(Error::Closed)
    }
}

impl<D: VpuDevice> Drop for VideoDecoder<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Returns displayed output buffers from the display thread.
pub struct DisplayReleaser<D: VpuDevice> {
    device: Arc<D>,
    credits: CreditGate,
}

impl<D: VpuDevice> Clone for DisplayReleaser<D> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            credits: self.credits.clone(),
        }
    }
}

impl<D: VpuDevice> DisplayReleaser<D> {
    /// Clear the buffer's display flag and free one output credit.
    ///
    /// Returns `Closed` once the session has closed. A release that started
    /// first finishes before the hardware is closed.
    pub fn release(&self, buffer_index: usize) -> Result<()> {
        self.credits
            .release_with(|| self.device.clear_display_flag(buffer_index))?;
        trace!(buffer_index, "output buffer returned");
        Ok(())
    }

    /// Cancel a submission blocked on a free output buffer.
    ///
    /// The blocked `submit_frame` returns `Cancelled` and the session closes.
    /// Later releases return `Closed`.
    pub fn shutdown(&self) {
        debug!("display side requested shutdown");
        self.credits.close();
    }
}

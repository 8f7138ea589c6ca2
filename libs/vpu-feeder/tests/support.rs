use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use vpu_feeder::{
    CodecKind, DecodeInput, DecodeOutput, DeviceError, OutputSettings, StreamConfig, VpuDevice,
    VpuDriver,
};

/// `YV12` fourcc reported by the mock hardware.
#[allow(dead_code)]
pub const PIXEL_FORMAT_YV12: u32 = u32::from_le_bytes(*b"YV12");

/// A driver call observed by the mock hardware.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    QueryStreamConfig {
        width: u32,
        height: u32,
        config: Vec<u8>,
    },
    Configure(OutputSettings),
    Decode {
        data: Vec<u8>,
        timestamp: i64,
    },
    ClearDisplayFlag(usize),
    Flush,
    Close,
}

#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<Call>,
    pub opened: Vec<CodecKind>,
    pub open_error: Option<DeviceError>,
    pub query_error: Option<DeviceError>,
    pub configure_error: Option<DeviceError>,
    /// Results for upcoming decode calls. Once empty every decode displays
    /// into the next buffer index.
    pub decode_script: VecDeque<Result<DecodeOutput, DeviceError>>,
    pub next_display: usize,
}

/// Driver handing out devices that share one recorded call log.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

#[allow(dead_code)]
impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn decode_calls(&self) -> Vec<(Vec<u8>, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Decode { data, timestamp } => Some((data, timestamp)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|call| pred(call)).count()
    }

    pub fn script_decode(&self, result: Result<DecodeOutput, DeviceError>) {
        self.state().decode_script.push_back(result);
    }

    /// Queue `n` decode calls that produce no displayable picture.
    pub fn script_no_output(&self, n: usize) {
        for _ in 0..n {
            self.script_decode(Ok(DecodeOutput::default()));
        }
    }
}

impl VpuDriver for MockDriver {
    type Device = MockDevice;

    fn open(&self, codec: CodecKind) -> Result<MockDevice, DeviceError> {
        let mut state = self.state();
        state.opened.push(codec);
        if let Some(err) = state.open_error {
            return Err(err);
        }
        Ok(MockDevice {
            state: self.state.clone(),
        })
    }
}

#[allow(dead_code)]
#[derive(Debug)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl VpuDevice for MockDevice {
    fn query_stream_config(
        &self,
        width: u32,
        height: u32,
        config: &[u8],
    ) -> Result<StreamConfig, DeviceError> {
        let mut state = self.state();
        state.calls.push(Call::QueryStreamConfig {
            width,
            height,
            config: config.to_vec(),
        });
        if let Some(err) = state.query_error {
            return Err(err);
        }
        Ok(StreamConfig {
            width,
            height,
            min_buffers: 4,
            pixel_format: PIXEL_FORMAT_YV12,
        })
    }

    fn configure(&self, settings: &OutputSettings) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.push(Call::Configure(*settings));
        match state.configure_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn decode_frame(&self, input: &DecodeInput<'_>) -> Result<DecodeOutput, DeviceError> {
        let mut state = self.state();
        state.calls.push(Call::Decode {
            data: input.data.to_vec(),
            timestamp: input.timestamp,
        });
        if let Some(result) = state.decode_script.pop_front() {
            return result;
        }
        let index = state.next_display;
        state.next_display += 1;
        Ok(DecodeOutput {
            display_index: Some(index),
            decoded_index: Some(index),
        })
    }

    fn clear_display_flag(&self, buffer_index: usize) {
        self.state().calls.push(Call::ClearDisplayFlag(buffer_index));
    }

    fn flush(&self) -> Result<(), DeviceError> {
        self.state().calls.push(Call::Flush);
        Ok(())
    }

    fn close(&self) {
        self.state().calls.push(Call::Close);
    }
}

/// 10-byte High profile SPS.
#[allow(dead_code)]
pub const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1f, 0xac, 0xd9, 0x40, 0x50, 0x05, 0xbb];
/// 4-byte PPS.
#[allow(dead_code)]
pub const PPS: &[u8] = &[0x68, 0xeb, 0xe3, 0xcb];

/// Build an `avcC` record with the given NAL length width.
#[allow(dead_code)]
pub fn avcc_record(length_size: u8, sps: &[&[u8]], pps: &[&[u8]]) -> Vec<u8> {
    let mut out = vec![
        0x01,
        0x64,
        0x00,
        0x1f,
        0xfc | (length_size - 1),
        0xe0 | sps.len() as u8,
    ];
    for unit in sps {
        out.extend_from_slice(&(unit.len() as u16).to_be_bytes());
        out.extend_from_slice(unit);
    }
    out.push(pps.len() as u8);
    for unit in pps {
        out.extend_from_slice(&(unit.len() as u16).to_be_bytes());
        out.extend_from_slice(unit);
    }
    out
}

/// Frame NAL units with big-endian length fields of `width` bytes.
#[allow(dead_code)]
pub fn length_prefixed(width: usize, units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        let len = (unit.len() as u32).to_be_bytes();
        out.extend_from_slice(&len[4 - width..]);
        out.extend_from_slice(unit);
    }
    out
}

/// Prefix every NAL unit with a 4-byte start code.
#[allow(dead_code)]
pub fn annexb(units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(unit);
    }
    out
}

/// IDR slice NAL of `len` bytes.
#[allow(dead_code)]
pub fn idr_slice(len: usize) -> Vec<u8> {
    let mut nal = vec![0x65];
    nal.resize(len, 0x88);
    nal
}

/// Non-IDR slice NAL of `len` bytes.
#[allow(dead_code)]
pub fn p_slice(len: usize) -> Vec<u8> {
    let mut nal = vec![0x41];
    nal.resize(len, 0x9a);
    nal
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

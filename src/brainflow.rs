use anyhow::{anyhow, Context, Result};
use libloading::Library;
use log::{debug, info, trace, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::os::raw::{c_char, c_double, c_int};
use std::thread;
use std::time::{Duration, Instant};

use crate::drivers::source::{SignalChunk, SignalSource};
use crate::drivers::NeuroError;

const PRESET_DEFAULT: c_int = 0;
const STREAM_RINGBUF_PACKETS: c_int = 450_000;
const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// BrainFlow id of the Muse 2 headset over native BLE.
pub const BOARD_ID_MUSE_2: c_int = 38;

/// Board selection and connection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainFlowSettings {
    pub board_id: i32,
    pub serial_port: String,
    pub mac_address: String,
    pub serial_number: String,
}

impl Default for BrainFlowSettings {
    fn default() -> Self {
        Self {
            board_id: BOARD_ID_MUSE_2,
            serial_port: String::new(),
            mac_address: String::new(),
            serial_number: String::new(),
        }
    }
}

#[derive(Serialize)]
struct BrainFlowInputParams {
    serial_port: String,
    mac_address: String,
    ip_address: String,
    ip_address_aux: String,
    ip_address_anc: String,
    ip_port: i32,
    ip_port_aux: i32,
    ip_port_anc: i32,
    ip_protocol: i32,
    other_info: String,
    timeout: i32,
    serial_number: String,
    file: String,
    file_aux: String,
    file_anc: String,
    master_board: i32,
}

impl BrainFlowInputParams {
    fn from_settings(settings: &BrainFlowSettings, discovery_timeout: Duration) -> Self {
        Self {
            serial_port: settings.serial_port.clone(),
            mac_address: settings.mac_address.clone(),
            ip_address: String::new(),
            ip_address_aux: String::new(),
            ip_address_anc: String::new(),
            ip_port: 0,
            ip_port_aux: 0,
            ip_port_anc: 0,
            ip_protocol: 0,
            other_info: String::new(),
            timeout: discovery_timeout.as_secs().max(1) as i32,
            serial_number: settings.serial_number.clone(),
            file: String::new(),
            file_aux: String::new(),
            file_anc: String::new(),
            master_board: -100, // NO_BOARD
        }
    }
}

struct BrainFlowApi {
    #[allow(dead_code)]
    lib: Library,
    prepare_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    start_stream: unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char) -> c_int,
    stop_stream: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    release_session: unsafe extern "C" fn(c_int, *const c_char) -> c_int,
    get_sampling_rate: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_num_rows: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_eeg_channels: unsafe extern "C" fn(c_int, c_int, *mut c_int, *mut c_int) -> c_int,
    get_timestamp_channel: unsafe extern "C" fn(c_int, c_int, *mut c_int) -> c_int,
    get_board_data_count: unsafe extern "C" fn(c_int, *mut c_int, c_int, *const c_char) -> c_int,
    get_board_data:
        unsafe extern "C" fn(c_int, c_int, *mut c_double, c_int, *const c_char) -> c_int,
}

impl BrainFlowApi {
    fn load() -> Result<Self> {
        let name = libloading::library_filename("BoardController");
        let lib = unsafe { Library::new(&name) }
            .with_context(|| format!("{} not found on the library path", name.to_string_lossy()))?;
        // Safety: signatures follow the BrainFlow board_controller C API.
        unsafe {
            Ok(Self {
                prepare_session: *lib.get(b"prepare_session\0")?,
                start_stream: *lib.get(b"start_stream\0")?,
                stop_stream: *lib.get(b"stop_stream\0")?,
                release_session: *lib.get(b"release_session\0")?,
                get_sampling_rate: *lib.get(b"get_sampling_rate\0")?,
                get_num_rows: *lib.get(b"get_num_rows\0")?,
                get_eeg_channels: *lib.get(b"get_eeg_channels\0")?,
                get_timestamp_channel: *lib.get(b"get_timestamp_channel\0")?,
                get_board_data_count: *lib.get(b"get_board_data_count\0")?,
                get_board_data: *lib.get(b"get_board_data\0")?,
                lib,
            })
        }
    }

    fn instance() -> Result<&'static BrainFlowApi> {
        static API: OnceCell<BrainFlowApi> = OnceCell::new();
        API.get_or_try_init(Self::load)
    }

    fn check(code: c_int, ctx: &str) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(anyhow!("{ctx} failed (BrainFlow code {code})"))
        }
    }

    fn prepare(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.prepare_session)(board_id, input.as_ptr()) },
            "prepare_session",
        )
    }

    fn start_stream(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe {
                (self.start_stream)(
                    STREAM_RINGBUF_PACKETS,
                    std::ptr::null(),
                    board_id,
                    input.as_ptr(),
                )
            },
            "start_stream",
        )
    }

    fn stop_stream(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.stop_stream)(board_id, input.as_ptr()) },
            "stop_stream",
        )
    }

    fn release(&self, board_id: c_int, input: &CString) -> Result<()> {
        Self::check(
            unsafe { (self.release_session)(board_id, input.as_ptr()) },
            "release_session",
        )
    }

    fn sampling_rate(&self, board_id: c_int) -> Result<c_int> {
        let mut rate: c_int = 0;
        Self::check(
            unsafe { (self.get_sampling_rate)(board_id, PRESET_DEFAULT, &mut rate as *mut c_int) },
            "get_sampling_rate",
        )?;
        Ok(rate)
    }

    fn num_rows(&self, board_id: c_int) -> Result<c_int> {
        let mut rows: c_int = 0;
        Self::check(
            unsafe { (self.get_num_rows)(board_id, PRESET_DEFAULT, &mut rows as *mut c_int) },
            "get_num_rows",
        )?;
        Ok(rows)
    }

    fn eeg_channels(&self, board_id: c_int, max_channels: usize) -> Result<Vec<c_int>> {
        let mut out_len: c_int = 0;
        let mut buf = vec![0 as c_int; max_channels.max(32)];
        Self::check(
            unsafe {
                (self.get_eeg_channels)(
                    board_id,
                    PRESET_DEFAULT,
                    buf.as_mut_ptr(),
                    &mut out_len as *mut c_int,
                )
            },
            "get_eeg_channels",
        )?;
        buf.truncate(out_len.max(0) as usize);
        Ok(buf)
    }

    fn timestamp_channel(&self, board_id: c_int) -> Result<c_int> {
        let mut row: c_int = 0;
        Self::check(
            unsafe {
                (self.get_timestamp_channel)(board_id, PRESET_DEFAULT, &mut row as *mut c_int)
            },
            "get_timestamp_channel",
        )?;
        Ok(row)
    }

    fn data_count(&self, board_id: c_int, input: &CString) -> Result<usize> {
        let mut count: c_int = 0;
        Self::check(
            unsafe {
                (self.get_board_data_count)(
                    PRESET_DEFAULT,
                    &mut count as *mut c_int,
                    board_id,
                    input.as_ptr(),
                )
            },
            "get_board_data_count",
        )?;
        Ok(count.max(0) as usize)
    }

    /// Removes `count` samples from the board ring buffer into `buffer`
    /// (row-major, `num_rows x count`).
    fn take_board_data(
        &self,
        board_id: c_int,
        input: &CString,
        count: usize,
        buffer: &mut [f64],
    ) -> Result<()> {
        Self::check(
            unsafe {
                (self.get_board_data)(
                    count as c_int,
                    PRESET_DEFAULT,
                    buffer.as_mut_ptr(),
                    board_id,
                    input.as_ptr(),
                )
            },
            "get_board_data",
        )
    }
}

/// BrainFlow-backed headset session, pulled chunk by chunk.
///
/// The board controller library is loaded on first use; failing to load it
/// or to prepare the session within the discovery timeout is reported as
/// [`NeuroError::SourceUnavailable`].
pub struct BrainFlowSource {
    api: &'static BrainFlowApi,
    board_id: c_int,
    input_json: CString,
    eeg_channels: Vec<c_int>,
    timestamp_row: Option<usize>,
    num_rows: usize,
    sample_rate_hz: u32,
    is_streaming: bool,
    released: bool,
}

impl BrainFlowSource {
    pub fn connect(settings: &BrainFlowSettings, discovery_timeout: Duration) -> Result<Self, NeuroError> {
        info!("Looking for a BrainFlow board (id {})...", settings.board_id);
        let mut source = Self::open(settings, discovery_timeout)
            .map_err(|e| NeuroError::SourceUnavailable(format!("{e:#}")))?;
        source
            .start_stream()
            .map_err(|e| NeuroError::SourceUnavailable(format!("{e:#}")))?;
        info!(
            "Start acquiring data: {} EEG channel(s) at {} Hz",
            source.eeg_channels.len(),
            source.sample_rate_hz
        );
        Ok(source)
    }

    fn open(settings: &BrainFlowSettings, discovery_timeout: Duration) -> Result<Self> {
        let api = BrainFlowApi::instance()?;
        let board_id = settings.board_id as c_int;
        let params = BrainFlowInputParams::from_settings(settings, discovery_timeout);
        let json = serde_json::to_string(&params)?;
        let input_json =
            CString::new(json).context("failed to encode BrainFlow input params to C string")?;
        api.prepare(board_id, &input_json)?;
        let sample_rate_hz = api.sampling_rate(board_id)?;
        if sample_rate_hz <= 0 {
            return Err(anyhow!("board reported sampling rate {sample_rate_hz}"));
        }
        let num_rows = api.num_rows(board_id)? as usize;
        let eeg_channels = api.eeg_channels(board_id, num_rows)?;
        let timestamp_row = match api.timestamp_channel(board_id) {
            Ok(row) if (row as usize) < num_rows => Some(row as usize),
            Ok(_) => None,
            Err(e) => {
                debug!("no timestamp row: {e:#}");
                None
            }
        };
        Ok(Self {
            api,
            board_id,
            input_json,
            eeg_channels,
            timestamp_row,
            num_rows,
            sample_rate_hz: sample_rate_hz as u32,
            is_streaming: false,
            released: false,
        })
    }

    fn start_stream(&mut self) -> Result<()> {
        if !self.is_streaming {
            self.api.start_stream(self.board_id, &self.input_json)?;
            self.is_streaming = true;
        }
        Ok(())
    }

    pub fn stop_stream(&mut self) -> Result<()> {
        if !self.released {
            if self.is_streaming {
                self.api.stop_stream(self.board_id, &self.input_json)?;
                self.is_streaming = false;
            }
            self.api.release(self.board_id, &self.input_json)?;
            self.released = true;
        }
        Ok(())
    }

    fn wait_for_data(&self, timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            let count = self.api.data_count(self.board_id, &self.input_json)?;
            if count > 0 || Instant::now() >= deadline {
                return Ok(count);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn read_chunk(&self, timeout: Duration, max_samples: usize) -> Result<SignalChunk> {
        let available = self.wait_for_data(timeout)?;
        let take = available.min(max_samples.max(1));
        if take == 0 {
            return Ok(SignalChunk::empty(self.eeg_channels.len()));
        }
        let mut buf = vec![0.0f64; self.num_rows * take];
        self.api
            .take_board_data(self.board_id, &self.input_json, take, &mut buf)?;
        trace!("pulled {take} of {available} buffered sample(s)");
        Ok(chunk_from_board_data(
            &buf,
            take,
            &self.eeg_channels,
            self.timestamp_row,
        ))
    }
}

/// Splits a row-major `rows x count` board buffer into per-channel samples.
/// Channels whose row lies outside the buffer stay empty.
fn chunk_from_board_data(
    buf: &[f64],
    count: usize,
    eeg_channels: &[c_int],
    timestamp_row: Option<usize>,
) -> SignalChunk {
    let row = |index: usize| -> Option<Vec<f64>> {
        let start = index.checked_mul(count)?;
        let end = start.checked_add(count)?;
        buf.get(start..end).map(|r| r.to_vec())
    };
    let mut chunk = SignalChunk::empty(eeg_channels.len());
    for (channel, &ch) in chunk.samples.iter_mut().zip(eeg_channels) {
        if let Some(samples) = usize::try_from(ch).ok().and_then(row) {
            *channel = samples;
        }
    }
    if let Some(timestamps) = timestamp_row.and_then(row) {
        chunk.timestamps = timestamps;
    }
    chunk
}

impl SignalSource for BrainFlowSource {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn channel_count(&self) -> usize {
        self.eeg_channels.len()
    }

    fn pull_chunk(
        &mut self,
        timeout: Duration,
        max_samples: usize,
    ) -> Result<Option<SignalChunk>, NeuroError> {
        if self.released {
            return Ok(None);
        }
        self.read_chunk(timeout, max_samples)
            .map(Some)
            .map_err(|e| NeuroError::Source(format!("{e:#}")))
    }
}

impl Drop for BrainFlowSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop_stream() {
            warn!("failed to release BrainFlow session: {e:#}");
        }
    }
}

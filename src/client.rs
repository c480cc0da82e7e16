//! Client side of the device: a connection to the device host and the
//! write-then-read echo loop driven from standard input.

use std::io::{BufRead, BufReader, Write};

use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

use crate::device::{Session, UserDest, UserSource, BUF_LEN};
use crate::ipc::protocol::{trim_padding, DeviceRequest, DeviceResponse};
use crate::{AppError, Result};

/// Number of write/read rounds the echo loop performs by default.
pub const DEFAULT_ITERATIONS: usize = 11;

/// Bytes handed back by a device read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Transferred bytes without trailing zero padding.
    pub data: Vec<u8>,
    /// Reported count returned by the device.
    pub count: usize,
}

/// Anything that behaves like an open character device.
pub trait CharDevice {
    /// Write `data` to the device, returning the reported count.
    ///
    /// # Errors
    ///
    /// Returns the device error for the failed operation.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `len` bytes from the device.
    ///
    /// # Errors
    ///
    /// Returns the device error for the failed operation.
    fn read(&mut self, len: usize) -> Result<ReadOutcome>;
}

impl CharDevice for Session {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Session::write(self, &UserSource::new(data), data.len())
    }

    fn read(&mut self, len: usize) -> Result<ReadOutcome> {
        let mut receive = vec![0_u8; len];
        let count = Session::read(self, &mut UserDest::new(&mut receive), len)?;
        Ok(ReadOutcome {
            data: trim_padding(&receive).to_vec(),
            count,
        })
    }
}

/// Open connection to a device host.
pub struct DeviceClient {
    reader: BufReader<Stream>,
    session: String,
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl DeviceClient {
    /// Connect to the device published as `name` and open it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the device host is unreachable and
    /// `AppError::DeviceBusy` if another client holds the device.
    pub fn open(name: &str) -> Result<Self> {
        let ns_name = name
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Ipc(format!("invalid device name '{name}': {err}")))?;
        let stream = Stream::connect(ns_name)
            .map_err(|err| AppError::Ipc(format!("failed to connect to '{name}': {err}")))?;

        let mut reader = BufReader::new(stream);
        let response = call(&mut reader, &DeviceRequest::Open)?;
        let session = response
            .session
            .ok_or_else(|| AppError::Protocol("open response missing session".into()))?;

        Ok(Self { reader, session })
    }

    /// Session identifier assigned by the device.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Write with an explicit byte count, which may exceed `data`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidAddress` when `length` exceeds the bytes
    /// supplied, or any transport error.
    pub fn write_with_length(&mut self, data: &[u8], length: usize) -> Result<usize> {
        let response = call(
            &mut self.reader,
            &DeviceRequest::Write {
                data: data.to_vec(),
                length: Some(length),
            },
        )?;
        response
            .count
            .ok_or_else(|| AppError::Protocol("write response missing count".into()))
    }

    /// Release the device and close the connection.
    ///
    /// # Errors
    ///
    /// Returns any transport error from the close request.
    pub fn close(mut self) -> Result<()> {
        call(&mut self.reader, &DeviceRequest::Close).map(|_| ())
    }
}

impl CharDevice for DeviceClient {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        // The device keeps at most BUF_LEN bytes; sending more only grows the
        // request line.
        let data = &data[..data.len().min(BUF_LEN)];
        self.write_with_length(data, data.len())
    }

    fn read(&mut self, len: usize) -> Result<ReadOutcome> {
        let response = call(&mut self.reader, &DeviceRequest::Read { length: len })?;
        let count = response
            .count
            .ok_or_else(|| AppError::Protocol("read response missing count".into()))?;
        Ok(ReadOutcome {
            data: response.data.unwrap_or_default(),
            count,
        })
    }
}

/// Send one request line and read one response line.
fn call(reader: &mut BufReader<Stream>, request: &DeviceRequest) -> Result<DeviceResponse> {
    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');

    let stream = reader.get_mut();
    stream
        .write_all(request_line.as_bytes())
        .and_then(|()| stream.flush())
        .map_err(|err| AppError::Ipc(format!("failed to send request: {err}")))?;

    let mut response_line = String::new();
    let read = reader
        .read_line(&mut response_line)
        .map_err(|err| AppError::Ipc(format!("failed to read response: {err}")))?;
    if read == 0 {
        return Err(AppError::Ipc("device host closed the connection".into()));
    }

    let response: DeviceResponse = serde_json::from_str(response_line.trim())?;
    response.into_result()
}

/// Run the echo loop: for up to `iterations` lines of `input`, write the line
/// and immediately read the buffer back, printing `"<text>(<n> letters)"`.
///
/// A failed write or read is reported on `errors` and the loop moves on to
/// the next line. Stops early at end of input.
///
/// Returns the number of lines processed.
///
/// # Errors
///
/// Returns `AppError::Io` if reading `input` or writing to `output` or
/// `errors` fails.
pub fn run_echo_loop<D, R, W, E>(
    device: &mut D,
    device_path: &str,
    mut input: R,
    mut output: W,
    mut errors: E,
    iterations: usize,
) -> Result<usize>
where
    D: CharDevice + ?Sized,
    R: BufRead,
    W: Write,
    E: Write,
{
    let mut line = String::new();
    let mut processed = 0;

    while processed < iterations {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        processed += 1;

        if let Err(err) = device.write(line.as_bytes()) {
            writeln!(errors, "writing {device_path}: {err}")?;
        }

        match device.read(BUF_LEN) {
            Ok(outcome) => {
                let text = String::from_utf8_lossy(&outcome.data);
                let text = text.strip_suffix('\n').unwrap_or(&*text);
                writeln!(output, "{text}({} letters)", outcome.count)?;
            }
            Err(err) => {
                writeln!(errors, "reading {device_path}: {err}")?;
            }
        }
    }

    output.flush()?;
    Ok(processed)
}

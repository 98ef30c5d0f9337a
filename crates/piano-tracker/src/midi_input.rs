/// MIDI keyboard input using ALSA rawmidi on Linux.
/// Reads raw bytes from the configured capture device, decodes them into
/// note events and feeds them straight into the aggregator, which stamps
/// each event with the session clock.
///
/// Includes a supervised retry loop for hot-plug reconnection: when the
/// keyboard is unplugged, the reader retries with exponential backoff until
/// it comes back or the session is cancelled.
///
/// On non-Linux platforms, this module provides a stub implementation.

/// Backoff configuration for hot-plug reconnection.
#[cfg(target_os = "linux")]
const RETRY_INITIAL_MS: u64 = 100;
#[cfg(target_os = "linux")]
const RETRY_MAX_MS: u64 = 5000;
#[cfg(target_os = "linux")]
const RETRY_MULTIPLIER: f64 = 2.0;

#[cfg(target_os = "linux")]
pub mod platform {
    use alsa::rawmidi::Rawmidi;
    use alsa::Direction;
    use piano_metrics::aggregator::Aggregator;
    use piano_metrics::decode::MidiDecoder;
    use std::ffi::CString;
    use std::io::{ErrorKind, Read};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, error, info, warn};

    use super::{RETRY_INITIAL_MS, RETRY_MAX_MS, RETRY_MULTIPLIER};

    /// Supervised MIDI reader with hot-plug reconnection.
    ///
    /// The retry loop runs inside a single `spawn_blocking` call. The device
    /// is opened non-blocking so the loop can notice cancellation between
    /// reads. Returns `Ok` once `cancel` fires, or the first error the
    /// aggregator reports for a decoded event.
    pub async fn run_midi_reader(
        device: &str,
        aggregator: Arc<Aggregator>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let device_owned = device.to_string();

        tokio::task::spawn_blocking(move || {
            let device_cstr = CString::new(device_owned.as_str())
                .map_err(|e| anyhow::anyhow!("Invalid device name: {}", e))?;
            let mut backoff_ms = RETRY_INITIAL_MS;

            loop {
                if cancel.is_cancelled() {
                    info!(device = %device_owned, "Session cancelled, reader exiting");
                    return Ok(());
                }

                // --- Try to open the device ---
                let rawmidi = match Rawmidi::open(&device_cstr, Direction::Capture, true) {
                    Ok(r) => r,
                    Err(e) => {
                        debug!(device = %device_owned, "Device not available: {}", e);
                        std::thread::sleep(Duration::from_millis(backoff_ms));
                        backoff_ms = ((backoff_ms as f64 * RETRY_MULTIPLIER) as u64)
                            .min(RETRY_MAX_MS);
                        continue;
                    }
                };

                info!(device = %device_owned, "MIDI device opened for reading");
                backoff_ms = RETRY_INITIAL_MS;

                // Running status does not survive a reconnect
                let mut decoder = MidiDecoder::new();
                let mut buf = [0u8; 256];

                // --- Read loop ---
                let read_err = loop {
                    if cancel.is_cancelled() {
                        info!(device = %device_owned, "Session cancelled, reader exiting");
                        return Ok(());
                    }

                    match rawmidi.io().read(&mut buf) {
                        Ok(n) if n > 0 => {
                            debug!(bytes = n, "Read MIDI data");
                            let mut result = Ok(());
                            decoder.feed(&buf[..n], |kind, key| {
                                if result.is_ok() {
                                    result = aggregator.ingest(kind, key);
                                }
                            });
                            result?;
                        }
                        Ok(_) => {
                            std::thread::sleep(Duration::from_millis(1));
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(1));
                        }
                        Err(e) => {
                            break e;
                        }
                    }
                };

                error!(device = %device_owned, "MIDI read error: {}", read_err);
                warn!(
                    device = %device_owned,
                    backoff_ms = backoff_ms,
                    "Will retry in {}ms", backoff_ms
                );

                // Close the ALSA handle before sleeping
                drop(rawmidi);

                std::thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms = ((backoff_ms as f64 * RETRY_MULTIPLIER) as u64).min(RETRY_MAX_MS);
            }
        })
        .await?
    }
}

#[cfg(not(target_os = "linux"))]
pub mod platform {
    use piano_metrics::aggregator::Aggregator;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tracing::warn;

    /// Stub for non-Linux platforms. Waits for cancellation without
    /// producing events; use `--demo` to exercise the tracker.
    pub async fn run_midi_reader(
        device: &str,
        _aggregator: Arc<Aggregator>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        warn!(
            device = device,
            "ALSA MIDI input is only available on Linux, no events will be recorded"
        );
        cancel.cancelled().await;
        Ok(())
    }
}

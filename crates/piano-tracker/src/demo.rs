/// Synthetic practice session.
///
/// Plays short scale phrases through the same byte decoder the ALSA reader
/// uses, with a sustain pedal press around each phrase. Phrases are
/// separated by short pauses, and every fourth one by a long pause, so the
/// playing-time and intensity metrics have something to show.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use piano_metrics::aggregator::Aggregator;
use piano_metrics::decode::MidiDecoder;

use crate::DemoSection;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CONTROL_CHANGE: u8 = 0xB0;
const SUSTAIN_PEDAL: u8 = 64;

/// C major, one octave up from middle C and back.
const SCALE: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];

const NOTE_HOLD: Duration = Duration::from_millis(180);
const NOTE_GAP: Duration = Duration::from_millis(40);
const SHORT_PAUSE: Duration = Duration::from_secs(2);
const LONG_PAUSE: Duration = Duration::from_secs(8);

/// Raw MIDI bytes followed by a wait.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub bytes: Vec<u8>,
    pub then: Duration,
}

impl Step {
    fn new(bytes: Vec<u8>, then: Duration) -> Self {
        Self { bytes, then }
    }
}

/// The steps making up phrase `index`, including the pause after it.
///
/// Odd phrases descend and close on a two-note chord sent with running
/// status.
pub fn phrase(index: u64) -> Vec<Step> {
    let transpose = (index % 3) as u8 * 2;
    let mut keys: Vec<u8> = SCALE.iter().map(|k| k + transpose).collect();
    if index % 2 == 1 {
        keys.reverse();
    }

    let mut steps = vec![Step::new(
        vec![CONTROL_CHANGE, SUSTAIN_PEDAL, 127],
        Duration::ZERO,
    )];
    for key in &keys {
        steps.push(Step::new(vec![NOTE_ON, *key, 90], NOTE_HOLD));
        steps.push(Step::new(vec![NOTE_OFF, *key, 0], NOTE_GAP));
    }

    if index % 2 == 1 {
        let root = keys[keys.len() - 1];
        steps.push(Step::new(vec![NOTE_ON, root, 80, root + 4, 80], NOTE_HOLD * 3));
        // Velocity zero releases
        steps.push(Step::new(vec![NOTE_ON, root, 0, root + 4, 0], NOTE_GAP));
    }

    let pause = if index % 4 == 3 { LONG_PAUSE } else { SHORT_PAUSE };
    steps.push(Step::new(vec![CONTROL_CHANGE, SUSTAIN_PEDAL, 0], pause));
    steps
}

/// Play phrases into `aggregator` until `config.duration_secs` elapse
/// (0 = until cancelled).
pub async fn run(
    aggregator: Arc<Aggregator>,
    config: DemoSection,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let limit = (config.duration_secs > 0).then(|| Duration::from_secs(config.duration_secs));
    let start = tokio::time::Instant::now();
    let mut decoder = MidiDecoder::new();

    info!(duration_secs = config.duration_secs, "Demo performance started");

    let mut index = 0u64;
    'session: loop {
        for step in phrase(index) {
            if limit.is_some_and(|limit| start.elapsed() >= limit) {
                break 'session;
            }

            let mut result = Ok(());
            decoder.feed(&step.bytes, |kind, key| {
                if result.is_ok() {
                    result = aggregator.ingest(kind, key);
                }
            });
            result?;

            tokio::select! {
                _ = cancel.cancelled() => break 'session,
                _ = tokio::time::sleep(step.then) => {}
            }
        }
        debug!(phrase = index, "Phrase finished");
        index += 1;
    }

    info!(phrases = index, "Demo performance finished");
    Ok(())
}

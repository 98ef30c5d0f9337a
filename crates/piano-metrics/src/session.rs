/// Periodic sampling task.
///
/// Polls the aggregator's live stats on a fixed interval and feeds them to
/// the sampler. When the session is cancelled, the accumulated samples are
/// turned into the intensity series and handed over exactly once through a
/// oneshot channel; the receiving side blocks until it arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::sampler::{Granularity, IntensitySeries, TimeBucketedSampler};

/// Run the sampling loop until `cancel` fires, then deliver the results
/// through `handoff`.
pub async fn run_sampler(
    aggregator: Arc<Aggregator>,
    sampler: Arc<TimeBucketedSampler>,
    interval: Duration,
    granularity: Option<Granularity>,
    cancel: CancellationToken,
    handoff: oneshot::Sender<IntensitySeries>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                let stats = aggregator.stats();
                if let Err(e) = sampler.push(&stats) {
                    warn!(error = %e, "Skipping sample");
                } else {
                    debug!(samples = sampler.len(), "sample recorded");
                }
            }
        }
    }

    let series = sampler.results(granularity);
    info!(
        samples = sampler.len(),
        buckets = series.len(),
        "Sampler stopped, handing over intensity series"
    );

    if handoff.send(series).is_err() {
        warn!("Intensity series receiver dropped before handoff");
    }
}

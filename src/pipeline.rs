//! Line-by-line pipeline from journal JSON to GELF delivery

use crate::config::Config;
use crate::dispatcher::TransportDispatcher;
use crate::errors::Result;
use crate::filter::Filter;
use crate::mapper::FieldMapper;
use crate::record::RecordDecoder;
use crate::tagger::EnvironmentTagger;
use crate::transport::GelfTransport;
use std::io::ErrorKind;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Waiting for the next input line
    Idle,
    /// Holding the text of the current record
    Buffering,
    /// Running decode, map, filter, tag and send
    Dispatching,
    /// Terminal
    ShuttingDown,
}

/// What happened to a single input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Sent,
    /// Rejected by the filter
    Filtered,
    /// Dropped by json-only mode
    Dropped,
    DecodeFailed,
    DeliveryFailed,
    /// Blank line
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines_read: u64,
    pub sent: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub decode_failures: u64,
    pub delivery_failures: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: LineOutcome) {
        self.lines_read += 1;
        match outcome {
            LineOutcome::Sent => self.sent += 1,
            LineOutcome::Filtered => self.filtered += 1,
            LineOutcome::Dropped => self.dropped += 1,
            LineOutcome::DecodeFailed => self.decode_failures += 1,
            LineOutcome::DeliveryFailed => self.delivery_failures += 1,
            LineOutcome::Skipped => {}
        }
    }
}

/// Drives decoder, mapper, filter, tagger and dispatcher for each input line
pub struct PipelineRunner {
    decoder: RecordDecoder,
    mapper: FieldMapper,
    filter: Filter,
    tagger: EnvironmentTagger,
    dispatcher: TransportDispatcher,
    buffer: String,
    state: PipelineState,
    stats: PipelineStats,
}

impl PipelineRunner {
    pub fn new(config: &Config, transport: Box<dyn GelfTransport>) -> Result<Self> {
        let filter = Filter::new(config.filter_spec()?);
        if filter.is_enabled() {
            debug!("Filtering records with {:?}", config.filters);
        }

        Ok(Self {
            decoder: RecordDecoder::new(),
            mapper: FieldMapper::new(config.json_only),
            filter,
            tagger: EnvironmentTagger::new(config.environment.clone()),
            dispatcher: TransportDispatcher::new(config.protocol, transport),
            buffer: String::new(),
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Process lines until end of input or until `shutdown` is cancelled.
    /// Cancellation abandons a record whose dispatch is still pending.
    #[instrument(skip_all)]
    pub async fn run<R>(&mut self, mut input: R, shutdown: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            self.state = PipelineState::Idle;
            self.buffer.clear();

            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping input processing");
                    break;
                }
                read = input.read_line(&mut self.buffer) => read,
            };

            match read {
                Ok(0) => {
                    info!("End of input reached");
                    break;
                }
                Ok(_) => {
                    self.state = PipelineState::Buffering;
                    let line = std::mem::take(&mut self.buffer);
                    let outcome = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => None,
                        outcome = self.process_line(&line) => Some(outcome),
                    };
                    self.buffer = line;

                    match outcome {
                        Some(outcome) => self.stats.record(outcome),
                        None => {
                            info!("Shutdown requested, abandoning in-flight record");
                            break;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    error!("Skipping input line that is not valid UTF-8: {}", e);
                    self.stats.record(LineOutcome::DecodeFailed);
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }

        self.state = PipelineState::Idle;
        Ok(())
    }

    /// Run one line through the pipeline
    pub async fn process_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Skipped;
        }

        self.state = PipelineState::Dispatching;
        let outcome = self.dispatch_line(line).await;
        self.state = PipelineState::Idle;

        debug!("Line outcome: {:?}", outcome);
        outcome
    }

    async fn dispatch_line(&mut self, line: &str) -> LineOutcome {
        let Some(record) = self.decoder.decode(line) else {
            return LineOutcome::DecodeFailed;
        };

        let Some(mut message) = self.mapper.map(&record).into_message() else {
            return LineOutcome::Dropped;
        };

        if !self.filter.accepts(&record) {
            return LineOutcome::Filtered;
        }

        self.tagger.tag(&mut message);

        if self.dispatcher.dispatch(&message).await {
            LineOutcome::Sent
        } else {
            LineOutcome::DeliveryFailed
        }
    }

    /// Flush and close the transport. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.state == PipelineState::ShuttingDown {
            return;
        }
        self.state = PipelineState::ShuttingDown;

        info!("Performing graceful shutdown");
        self.dispatcher.shutdown().await;

        info!(
            "Final pipeline stats - Lines: {}, Sent: {}, Filtered: {}, Dropped: {}, Decode failures: {}, Delivery failures: {}",
            self.stats.lines_read,
            self.stats.sent,
            self.stats.filtered,
            self.stats.dropped,
            self.stats.decode_failures,
            self.stats.delivery_failures
        );
    }
}

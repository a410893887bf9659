//! The paginated fetch loop.
//!
//! [`Fetcher::fetch`] checks the API health, reads the first page to learn
//! the totals, then walks the remaining pages into an in-memory buffer. The
//! buffer is flushed to the [`OutputSink`] whenever it reaches the configured
//! capacity and once more when the walk ends. If a page or a flush fails, the
//! buffer is flushed once more on a best-effort basis and the failure is
//! returned as [`FetcherError::FetchFailed`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::domain::{DateRange, PageWindow, Patent};
use crate::error::FetcherError;
use crate::gateway::{HealthStatus, PatentGateway};
use crate::sink::{OutputKind, OutputSink, SinkOutcome};

/// Caller-supplied knobs for a fetch. `None` means "use the default".
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub start_page: Option<u32>,
    pub num_pages: Option<u32>,
    pub page_size: Option<u32>,
    pub output: OutputKind,
}

/// A validated, immutable fetch request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    range: DateRange,
    window: PageWindow,
    output: OutputKind,
    num_pages: Option<u32>,
}

impl FetchRequest {
    pub fn new(
        range: DateRange,
        options: FetchOptions,
        max_page_size: u32,
    ) -> Result<Self, FetcherError> {
        let page_size = options.page_size.unwrap_or(max_page_size);
        let window = PageWindow::new(options.start_page.unwrap_or(1), page_size, max_page_size)?;

        if options.num_pages == Some(0) {
            return Err(FetcherError::InvalidPageCount(
                "num_pages must be at least 1 when given".to_string(),
            ));
        }

        Ok(Self {
            range,
            window,
            output: options.output,
            num_pages: options.num_pages,
        })
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn start_page(&self) -> u32 {
        self.window.page()
    }

    pub fn page_size(&self) -> u32 {
        self.window.page_size()
    }

    pub fn output(&self) -> OutputKind {
        self.output
    }

    pub fn num_pages(&self) -> Option<u32> {
        self.num_pages
    }

    pub fn window_for(&self, page: u32) -> PageWindow {
        self.window.with_page(page)
    }

    /// Whether the walk should request `page`.
    ///
    /// A page-count limit replaces the server total entirely, so a limit larger
    /// than the remaining pages requests pages past `total_pages`.
    pub fn wants_page(&self, page: u32, pages_fetched: u32, total_pages: u32) -> bool {
        match self.num_pages {
            None => page <= total_pages,
            Some(limit) => pages_fetched < limit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub total_items_found: u64,
    pub total_items_fetched: u64,
    pub total_pages_fetched: u32,
    pub total_items_outputted: u64,
    pub output_info: Vec<SinkOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPhase {
    HealthCheck,
    InitialPage,
    Paging,
    Draining,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPhase::HealthCheck => write!(f, "health-check"),
            FetchPhase::InitialPage => write!(f, "initial-page"),
            FetchPhase::Paging => write!(f, "paging"),
            FetchPhase::Draining => write!(f, "draining"),
        }
    }
}

/// Mutable state of one `fetch` call.
struct FetchRun {
    phase: FetchPhase,
    page: u32,
    buffer: Vec<Patent>,
    items_fetched: u64,
    pages_fetched: u32,
    outputs: Vec<SinkOutcome>,
}

impl FetchRun {
    fn new(start_page: u32) -> Self {
        Self {
            phase: FetchPhase::HealthCheck,
            page: start_page,
            buffer: Vec::new(),
            items_fetched: 0,
            pages_fetched: 0,
            outputs: Vec::new(),
        }
    }

    fn absorb(&mut self, patents: Vec<Patent>) -> usize {
        let count = patents.len();
        self.buffer.extend(patents);
        self.items_fetched += count as u64;
        self.pages_fetched += 1;
        count
    }

    /// Moves to the next page. Returns `false` once the page number is exhausted.
    fn advance(&mut self) -> bool {
        match self.page.checked_add(1) {
            Some(next) => {
                self.page = next;
                true
            }
            None => {
                warn!(page = self.page, "page number cannot advance further; stopping");
                false
            }
        }
    }
}

pub struct Fetcher<G: PatentGateway> {
    gateway: G,
    buffer_size: usize,
}

impl<G: PatentGateway> Fetcher<G> {
    pub fn new(gateway: G, buffer_size: usize) -> Self {
        Self {
            gateway,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn check_health(&self) -> Result<HealthStatus, FetcherError> {
        self.gateway.probe_health()
    }

    pub fn fetch(
        &self,
        request: &FetchRequest,
        sink: &dyn OutputSink,
    ) -> Result<FetchOutcome, FetcherError> {
        info!(
            range = %request.range(),
            start_page = request.start_page(),
            page_size = request.page_size(),
            num_pages = ?request.num_pages(),
            output = sink.name(),
            "beginning patent fetch"
        );

        let mut run = FetchRun::new(request.start_page());
        match self.walk(request, sink, &mut run) {
            Ok(outcome) => Ok(outcome),
            Err(err @ FetcherError::HealthCheckFailed { .. }) => Err(err),
            Err(err) => {
                error!(
                    phase = %run.phase,
                    page = run.page,
                    buffered = run.buffer.len(),
                    error = %err,
                    "patent fetch failed; flushing buffered patents"
                );
                // A failing recovery flush replaces the original error.
                self.flush(sink, &mut run.buffer)?;
                Err(FetcherError::FetchFailed {
                    page: run.page,
                    source: Box::new(err),
                })
            }
        }
    }

    fn walk(
        &self,
        request: &FetchRequest,
        sink: &dyn OutputSink,
        run: &mut FetchRun,
    ) -> Result<FetchOutcome, FetcherError> {
        run.phase = FetchPhase::HealthCheck;
        let health = self.gateway.probe_health()?;
        if !health.is_healthy() {
            warn!(status = %health.status, service = %health.service, "patent API is not healthy");
            return Err(FetcherError::HealthCheckFailed {
                status: health.status,
                service: health.service,
            });
        }

        run.phase = FetchPhase::InitialPage;
        let first = self
            .gateway
            .fetch_page(request.range(), request.window_for(run.page))?;
        let total_pages = first.pagination.total_pages;
        let total_items = first.pagination.total_items;
        if total_pages == 0 || total_items == 0 {
            info!(range = %request.range(), "no patents found");
            return Ok(FetchOutcome::default());
        }

        let count = run.absorb(first.patents);
        info!(
            page = run.page,
            count,
            total_pages,
            total_items,
            "fetched initial page"
        );
        let mut more = run.advance();

        run.phase = FetchPhase::Paging;
        while more && request.wants_page(run.page, run.pages_fetched, total_pages) {
            let response = self
                .gateway
                .fetch_page(request.range(), request.window_for(run.page))?;
            let count = run.absorb(response.patents);
            info!(page = run.page, count, buffered = run.buffer.len(), "fetched page");

            if run.buffer.len() >= self.buffer_size {
                let outcome = self.flush(sink, &mut run.buffer)?;
                run.outputs.push(outcome);
            }
            more = run.advance();
        }

        run.phase = FetchPhase::Draining;
        let outcome = self.flush(sink, &mut run.buffer)?;
        run.outputs.push(outcome);

        let outputs = std::mem::take(&mut run.outputs);
        let total_items_outputted = outputs.iter().map(|outcome| outcome.items_written).sum();
        let result = FetchOutcome {
            total_items_found: total_items,
            total_items_fetched: run.items_fetched,
            total_pages_fetched: run.pages_fetched,
            total_items_outputted,
            output_info: outputs,
        };
        info!(
            found = result.total_items_found,
            fetched = result.total_items_fetched,
            pages = result.total_pages_fetched,
            outputted = result.total_items_outputted,
            "patent fetch completed"
        );
        Ok(result)
    }

    /// Hands the buffer to `sink`. The buffer is only cleared once the write succeeds.
    fn flush(
        &self,
        sink: &dyn OutputSink,
        buffer: &mut Vec<Patent>,
    ) -> Result<SinkOutcome, FetcherError> {
        if buffer.is_empty() {
            info!("no patents to flush");
            return Ok(SinkOutcome::default());
        }

        info!(count = buffer.len(), output = sink.name(), "flushing patents");
        let outcome = sink.write(buffer)?;
        if (outcome.items_written as usize) < buffer.len() {
            warn!(
                count = buffer.len(),
                written = outcome.items_written,
                output = sink.name(),
                "sink wrote fewer patents than flushed"
            );
        }
        buffer.clear();
        Ok(outcome)
    }
}

//! Frame-budgeted table rendering.
//!
//! A render pass walks the view in chunks. Each [`Renderer::step`] materializes one chunk,
//! hands it to the [`RowSink`], measures how long that took and resizes the next chunk so
//! a step stays inside the frame budget. Between steps the caller yields to its own loop
//! through a [`FrameScheduler`]; nothing here blocks.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::normalize::{Transaction, TxId};

pub const MIN_CHUNK_SIZE: usize = 80;
pub const MAX_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_TARGET_FRAMES: usize = 70;

/// Display width at which merchant and comment cells are truncated.
pub const TEXT_COLUMN_WIDTH: usize = 32;

/// First chunk size: small lists finish in one step, large ones spread over roughly
/// `target_frames` steps. `target_frames == 0` means the default.
pub fn compute_initial_chunk_size(total: usize, target_frames: usize) -> usize {
    let frames = if target_frames == 0 {
        DEFAULT_TARGET_FRAMES
    } else {
        target_frames
    };
    MIN_CHUNK_SIZE.max(total.div_ceil(frames))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPolicy {
    pub target_frames: usize,
    pub floor: usize,
    pub ceiling: usize,
    pub grow_below: Duration,
    pub shrink_above: Duration,
    pub grow_factor: f64,
    pub shrink_factor: f64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            target_frames: DEFAULT_TARGET_FRAMES,
            floor: MIN_CHUNK_SIZE,
            ceiling: MAX_CHUNK_SIZE,
            grow_below: Duration::from_millis(6),
            shrink_above: Duration::from_millis(18),
            grow_factor: 1.15,
            shrink_factor: 0.8,
        }
    }
}

impl ChunkPolicy {
    pub fn with_target_frames(mut self, target_frames: usize) -> Self {
        self.target_frames = target_frames;
        self
    }

    pub fn initial(&self, total: usize) -> usize {
        compute_initial_chunk_size(total, self.target_frames)
    }

    /// Next chunk size given how long the last step took.
    pub fn adapt(&self, chunk_size: usize, elapsed: Duration) -> usize {
        if elapsed < self.grow_below && chunk_size < self.ceiling {
            let grown = (chunk_size as f64 * self.grow_factor).round() as usize;
            grown.clamp(chunk_size + 1, self.ceiling)
        } else if elapsed > self.shrink_above && chunk_size > self.floor {
            let shrunk = (chunk_size as f64 * self.shrink_factor).round() as usize;
            shrunk.max(self.floor)
        } else {
            chunk_size
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountTone {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCell {
    pub text: String,
    /// Untruncated text when `text` was shortened to fit its column.
    pub full_text: Option<String>,
}

impl RowCell {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            full_text: None,
        }
    }

    fn truncated(text: &str, max_width: usize) -> Self {
        if text.width() <= max_width {
            return Self::plain(text);
        }
        let mut out = String::new();
        let mut width = 0;
        for ch in text.chars() {
            let w = ch.width().unwrap_or(0);
            if width + w + 1 > max_width {
                break;
            }
            out.push(ch);
            width += w;
        }
        out.push('…');
        Self {
            text: out,
            full_text: Some(text.to_string()),
        }
    }
}

/// One materialized table row: date, merchant, amount, currency, comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub tx: TxId,
    pub date: RowCell,
    pub merchant: RowCell,
    pub amount: RowCell,
    pub tone: AmountTone,
    pub currency: RowCell,
    pub comment: RowCell,
}

impl RowView {
    pub fn build(tx: &Transaction) -> Self {
        let tone = match tx.amount_cents() {
            Some(c) if c > 0 => AmountTone::Positive,
            Some(c) if c < 0 => AmountTone::Negative,
            _ => AmountTone::Neutral,
        };
        Self {
            tx: tx.id(),
            date: RowCell::plain(tx.date_formatted()),
            merchant: RowCell::truncated(tx.merchant(), TEXT_COLUMN_WIDTH),
            amount: RowCell::plain(tx.amount_formatted()),
            tone,
            currency: RowCell::plain(tx.currency()),
            comment: RowCell::truncated(tx.comment(), TEXT_COLUMN_WIDTH),
        }
    }
}

/// A row together with its position in the view, so activating it can be mapped back.
#[derive(Debug, Clone)]
pub struct PlacedRow {
    pub index: usize,
    pub row: Rc<RowView>,
}

/// Output container rows are appended into.
pub trait RowSink {
    fn clear(&mut self);
    fn append(&mut self, rows: &[PlacedRow]);
}

/// Surface for human-readable progress text. An empty string clears it.
pub trait StatusSurface {
    fn set_text(&mut self, text: &str);
}

/// Host hook called between steps.
pub trait FrameScheduler {
    fn next_frame(&mut self);
}

/// Runs the next step straight away.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl FrameScheduler for Immediate {
    fn next_frame(&mut self) {}
}

/// Gives other threads a turn between steps.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadYield;

impl FrameScheduler for ThreadYield {
    fn next_frame(&mut self) {
        std::thread::yield_now();
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("render started before a row target was configured")]
    MissingRowTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Rendering,
}

/// Handle for a render pass; it goes stale once another pass starts or the renderer resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More rows remain; schedule another step.
    Continue,
    Finished,
    /// The ticket was superseded; nothing was touched.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProgress {
    pub rendered: usize,
    pub total: usize,
    pub percent: usize,
    pub chunk_size: usize,
    pub frames_done: usize,
    pub frames_estimated: usize,
    pub frames_left: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RenderProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rendering {}/{} ({}%) • chunk {} • frame {}/{} • {} left • {}ms elapsed",
            self.rendered,
            self.total,
            self.percent,
            self.chunk_size,
            self.frames_done,
            self.frames_estimated,
            self.frames_left,
            self.elapsed.as_millis().max(1),
        )
    }
}

#[derive(Debug)]
struct RenderTask {
    generation: u64,
    items: Vec<Rc<Transaction>>,
    cursor: usize,
    chunk_size: usize,
    frames_done: usize,
    started: Instant,
}

impl RenderTask {
    fn progress(&self) -> RenderProgress {
        let total = self.items.len();
        let remaining = total - self.cursor;
        let frames_left = remaining.div_ceil(self.chunk_size.max(1));
        let percent = if total == 0 {
            100
        } else {
            self.cursor * 100 / total
        };
        RenderProgress {
            rendered: self.cursor,
            total,
            percent,
            chunk_size: self.chunk_size,
            frames_done: self.frames_done,
            frames_estimated: self.frames_done + frames_left,
            frames_left,
            elapsed: self.started.elapsed(),
        }
    }
}

pub struct Renderer<R, S> {
    rows: Option<R>,
    status: Option<S>,
    policy: ChunkPolicy,
    cache: HashMap<TxId, Rc<RowView>>,
    generation: u64,
    task: Option<RenderTask>,
}

impl<R: RowSink, S: StatusSurface> Renderer<R, S> {
    pub fn new(policy: ChunkPolicy) -> Self {
        Self {
            rows: None,
            status: None,
            policy,
            cache: HashMap::new(),
            generation: 0,
            task: None,
        }
    }

    /// Rows are required before rendering; the status surface is optional.
    ///
    /// Redirecting the output cancels a pass in flight, so its ticket goes stale instead of
    /// appending the rest of its rows into the new sink.
    pub fn set_targets(&mut self, rows: R, status: Option<S>) {
        if let Some(task) = self.task.take() {
            tracing::debug!(
                rendered = task.cursor,
                total = task.items.len(),
                "render cancelled by retarget"
            );
            self.generation += 1;
            if let Some(old) = self.status.as_mut() {
                old.set_text("");
            }
        }
        self.rows = Some(rows);
        if status.is_some() {
            self.status = status;
        }
    }

    pub fn rows(&self) -> Option<&R> {
        self.rows.as_ref()
    }

    pub fn status(&self) -> Option<&S> {
        self.status.as_ref()
    }

    pub fn state(&self) -> RenderState {
        if self.task.is_some() {
            RenderState::Rendering
        } else {
            RenderState::Idle
        }
    }

    pub fn cached_rows(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached row. Call when the transaction list is replaced wholesale.
    pub fn evict_cache(&mut self) {
        self.cache.clear();
    }

    /// Supersedes any pass in flight, clears the output and schedules a pass over `items`.
    pub fn start(&mut self, items: Vec<Rc<Transaction>>) -> Result<RenderTicket, RenderError> {
        let rows = self.rows.as_mut().ok_or(RenderError::MissingRowTarget)?;
        rows.clear();
        self.generation += 1;

        let chunk_size = self.policy.initial(items.len());
        tracing::debug!(
            total = items.len(),
            chunk_size,
            generation = self.generation,
            "render started"
        );
        self.task = Some(RenderTask {
            generation: self.generation,
            items,
            cursor: 0,
            chunk_size,
            frames_done: 0,
            started: Instant::now(),
        });
        Ok(RenderTicket {
            generation: self.generation,
        })
    }

    /// Renders one chunk for `ticket`. Stale tickets are a no-op.
    pub fn step(&mut self, ticket: RenderTicket) -> Result<StepOutcome, RenderError> {
        if ticket.generation != self.generation {
            return Ok(StepOutcome::Stale);
        }
        let Some(task) = self.task.as_mut().filter(|t| t.generation == ticket.generation) else {
            return Ok(StepOutcome::Stale);
        };
        let rows = self.rows.as_mut().ok_or(RenderError::MissingRowTarget)?;

        let frame_start = Instant::now();
        let start = task.cursor;
        let end = (start + task.chunk_size).min(task.items.len());
        let mut placed = Vec::with_capacity(end - start);
        for (offset, tx) in task.items[start..end].iter().enumerate() {
            let row = self
                .cache
                .entry(tx.id())
                .or_insert_with(|| Rc::new(RowView::build(tx)))
                .clone();
            placed.push(PlacedRow {
                index: start + offset,
                row,
            });
        }
        if !placed.is_empty() {
            rows.append(&placed);
        }

        task.cursor = end;
        task.frames_done += 1;
        let elapsed = frame_start.elapsed();
        task.chunk_size = self.policy.adapt(task.chunk_size, elapsed);
        tracing::trace!(
            rendered = end,
            total = task.items.len(),
            chunk_size = task.chunk_size,
            elapsed_us = elapsed.as_micros() as u64,
            "render step"
        );

        if task.cursor < task.items.len() {
            let progress = task.progress();
            if let Some(status) = self.status.as_mut() {
                status.set_text(&progress.to_string());
            }
            return Ok(StepOutcome::Continue);
        }

        tracing::debug!(
            total = task.items.len(),
            frames = task.frames_done,
            elapsed_ms = task.started.elapsed().as_millis() as u64,
            "render finished"
        );
        self.task = None;
        if let Some(status) = self.status.as_mut() {
            status.set_text("");
        }
        Ok(StepOutcome::Finished)
    }

    /// Steps `ticket` until it finishes or goes stale, yielding between steps.
    pub fn run_to_completion(
        &mut self,
        ticket: RenderTicket,
        scheduler: &mut dyn FrameScheduler,
    ) -> Result<StepOutcome, RenderError> {
        loop {
            match self.step(ticket)? {
                StepOutcome::Continue => scheduler.next_frame(),
                done => return Ok(done),
            }
        }
    }

    /// Cancels any pass in flight and blanks both targets.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.task = None;
        if let Some(rows) = self.rows.as_mut() {
            rows.clear();
        }
        if let Some(status) = self.status.as_mut() {
            status.set_text("");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Default)]
    pub struct RecordingRows {
        pub rows: Vec<PlacedRow>,
        pub clears: usize,
        pub appends: usize,
    }

    impl RowSink for RecordingRows {
        fn clear(&mut self) {
            self.rows.clear();
            self.clears += 1;
        }

        fn append(&mut self, rows: &[PlacedRow]) {
            self.rows.extend_from_slice(rows);
            self.appends += 1;
        }
    }

    #[derive(Debug, Default)]
    pub struct RecordingStatus {
        pub history: Vec<String>,
    }

    impl StatusSurface for RecordingStatus {
        fn set_text(&mut self, text: &str) {
            self.history.push(text.to_string());
        }
    }
}

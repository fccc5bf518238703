use std::rc::Rc;

use crate::normalize::{Normalizer, RawRecord, Transaction};
use crate::render::{
    FrameScheduler, RenderError, RenderTicket, Renderer, RowSink, StatusSurface, StepOutcome,
};
use crate::summary::{Summary, summarize};
use crate::types::{SortKey, SortSpec, SortType};
use crate::view;

/// Owns the transaction list, the current view over it and the renderer that draws it.
///
/// Every input (a fetch, a created record, a search or sort change) rebuilds the view and
/// starts a fresh render pass; [`TransactionsController::run_render`] drives that pass.
pub struct TransactionsController<R, S> {
    normalizer: Normalizer,
    all: Vec<Rc<Transaction>>,
    view: Vec<Rc<Transaction>>,
    query: String,
    sort: Option<SortSpec>,
    renderer: Renderer<R, S>,
    ticket: Option<RenderTicket>,
}

impl<R: RowSink, S: StatusSurface> TransactionsController<R, S> {
    pub fn new(renderer: Renderer<R, S>) -> Self {
        Self {
            normalizer: Normalizer::new(),
            all: Vec::new(),
            view: Vec::new(),
            query: String::new(),
            sort: None,
            renderer,
            ticket: None,
        }
    }

    /// Replaces the whole list with freshly fetched records.
    pub fn load(&mut self, records: Vec<RawRecord>) -> Result<(), RenderError> {
        let normalizer = &mut self.normalizer;
        self.all = records
            .into_iter()
            .map(|r| Rc::new(normalizer.normalize(r)))
            .collect();
        self.renderer.evict_cache();
        tracing::debug!(total = self.all.len(), "transactions loaded");
        self.refresh()
    }

    /// Prepends a just-created record without refetching.
    pub fn insert_created(&mut self, record: RawRecord) -> Result<Rc<Transaction>, RenderError> {
        let tx = Rc::new(self.normalizer.normalize(record));
        self.all.insert(0, Rc::clone(&tx));
        self.refresh()?;
        Ok(tx)
    }

    /// Forgets everything, as on logout.
    pub fn clear(&mut self) {
        self.all.clear();
        self.view.clear();
        self.query.clear();
        self.sort = None;
        self.ticket = None;
        self.renderer.reset();
        self.renderer.evict_cache();
    }

    pub fn on_search_changed(&mut self, text: &str) -> Result<(), RenderError> {
        self.query = text.to_string();
        self.refresh()
    }

    pub fn on_sort_requested(
        &mut self,
        key: SortKey,
        sort_type: SortType,
    ) -> Result<SortSpec, RenderError> {
        let spec = SortSpec::toggled(self.sort.as_ref(), key, sort_type);
        self.sort = Some(spec);
        self.refresh()?;
        Ok(spec)
    }

    /// The transaction behind the row at `index` of the current view.
    pub fn on_row_activated(&self, index: usize) -> Option<Rc<Transaction>> {
        self.view.get(index).cloned()
    }

    pub fn all(&self) -> &[Rc<Transaction>] {
        &self.all
    }

    pub fn view(&self) -> &[Rc<Transaction>] {
        &self.view
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn sort_spec(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn summary(&self) -> Summary {
        summarize(&self.view)
    }

    pub fn renderer(&self) -> &Renderer<R, S> {
        &self.renderer
    }

    /// Drives the pending render pass to the end.
    pub fn run_render(&mut self, scheduler: &mut dyn FrameScheduler) -> Result<(), RenderError> {
        let Some(ticket) = self.ticket.take() else {
            return Ok(());
        };
        match self.renderer.run_to_completion(ticket, scheduler)? {
            StepOutcome::Stale => tracing::debug!("render pass superseded"),
            StepOutcome::Continue | StepOutcome::Finished => {}
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), RenderError> {
        let filtered = view::filter(&self.all, &self.query);
        self.view = match &self.sort {
            Some(spec) => view::sort_by_spec(&filtered, spec),
            None => filtered,
        };
        self.ticket = Some(self.renderer.start(self.view.clone())?);
        Ok(())
    }
}

//! The Ajax runtime: queue, debounce timers, the single-in-flight request
//! loop, and the response lifecycle.
//!
//! At most one request is outstanding at any time. Events fired while a
//! request is in flight stay queued; the completion path schedules a
//! follow-up flush, so nothing is ever lost and nothing ever interleaves.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use liveform_core::wire::{parse_response, EventRequest, ServerResponse};
use liveform_core::{EventName, FormState, RepeatTree, UiEvent};

use crate::config::ClientConfig;
use crate::dom::{ClientObserver, ControlKind, FormDom};
use crate::indicator::{IndicatorController, IndicatorSink};
use crate::interpreter::{Interpreter, ScheduledEvents};
use crate::queue::{batch_is_activating, collapse, split_first_form, BatchTraits, CollapseLookup};
use crate::transport::{exchange_with_retry, Transport};

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Everything the runtime needs to take over one form at page load.
#[derive(Debug, Clone)]
pub struct FormInit {
    pub form_id: String,
    /// Session token; minted client-side when the server did not embed one.
    pub uuid: Option<Uuid>,
    pub sequence: u64,
    pub static_state: String,
    pub dynamic_state: String,
    /// Repeated-section hierarchy, from the page's bootstrap blob.
    pub repeat_tree: RepeatTree,
    /// Endpoint receiving this form's `event-request` documents.
    pub server_url: String,
}

struct FormEntry {
    state: Mutex<FormState>,
    repeat_tree: Arc<RepeatTree>,
    server_url: String,
}

// ---------------------------------------------------------------------------
// AjaxClient
// ---------------------------------------------------------------------------

/// The per-page runtime. Shared behind an `Arc`; every entry point is safe
/// to call from any task.
pub struct AjaxClient {
    config: ClientConfig,
    dom: Arc<dyn FormDom>,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn ClientObserver>,
    indicator: Arc<IndicatorController>,
    forms: DashMap<String, FormEntry>,
    queue: Mutex<VecDeque<UiEvent>>,
    /// When the oldest still-queued event was fired; drives the incremental
    /// force threshold.
    first_event_at: Mutex<Option<Instant>>,
    /// Debounce timers still pending; only the last one to fire flushes.
    pending_flushes: AtomicU32,
    request_in_progress: AtomicBool,
    /// Set once a `load` replaced the page; the runtime goes quiet.
    page_replaced: AtomicBool,
    /// Pending discardable replay timers, keyed by form. A non-heartbeat
    /// request for the form makes them obsolete.
    discardable_timers: Mutex<Vec<(String, tokio::task::JoinHandle<()>)>>,
}

impl AjaxClient {
    #[must_use]
    pub fn new(
        config: ClientConfig,
        dom: Arc<dyn FormDom>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn ClientObserver>,
        indicator_sink: Arc<dyn IndicatorSink>,
    ) -> Arc<Self> {
        let indicator = IndicatorController::new(indicator_sink, config.indicator_delay);
        Arc::new(Self {
            config,
            dom,
            transport,
            observer,
            indicator,
            forms: DashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            first_event_at: Mutex::new(None),
            pending_flushes: AtomicU32::new(0),
            request_in_progress: AtomicBool::new(false),
            page_replaced: AtomicBool::new(false),
            discardable_timers: Mutex::new(Vec::new()),
        })
    }

    /// Registers a form. Events targeting unregistered forms are dropped at
    /// flush time with a warning.
    pub fn register_form(&self, init: FormInit) {
        let state = FormState::new(
            init.uuid.unwrap_or_else(Uuid::new_v4),
            init.sequence,
            init.static_state,
            init.dynamic_state,
        );
        self.forms.insert(
            init.form_id,
            FormEntry {
                state: Mutex::new(state),
                repeat_tree: Arc::new(init.repeat_tree),
                server_url: init.server_url,
            },
        );
    }

    /// Snapshot of a form's state, for hosts and tests.
    #[must_use]
    pub fn form_state(&self, form_id: &str) -> Option<FormState> {
        self.forms.get(form_id).map(|e| e.state.lock().clone())
    }

    #[must_use]
    pub fn indicator(&self) -> &Arc<IndicatorController> {
        &self.indicator
    }

    #[must_use]
    pub fn has_pending_events(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    // -- event entry points --

    /// The user committed a new value. `incremental` marks keystroke-grade
    /// events that debounce on the long delay.
    pub fn value_changed(self: &Arc<Self>, control_id: &str, value: &str, incremental: bool) {
        let form_id = self.dom.nearest_form(control_id);
        self.fire_events(
            vec![UiEvent::value_change(form_id, control_id, value)],
            incremental,
        );
    }

    /// The user activated a trigger.
    pub fn activated(self: &Arc<Self>, control_id: &str) {
        let form_id = self.dom.nearest_form(control_id);
        self.fire_events(vec![UiEvent::activate(form_id, control_id)], false);
    }

    /// Session keep-alive; never advances the sequence, never shows the
    /// indicator.
    pub fn send_heartbeat(self: &Arc<Self>, form_id: &str) {
        self.fire_events(vec![UiEvent::heartbeat(form_id)], false);
    }

    /// Enqueues a batch and arms a debounced flush.
    ///
    /// Non-incremental batches coalesce on the short delay, letting the
    /// browser's near-simultaneous change/blur/click bursts merge into one
    /// request. Incremental batches wait the long delay, unless the oldest
    /// queued event has been waiting past the force threshold.
    pub fn fire_events(self: &Arc<Self>, events: Vec<UiEvent>, incremental: bool) {
        if events.is_empty() || self.page_replaced.load(Ordering::SeqCst) {
            return;
        }

        let now = Instant::now();
        let oldest = {
            let mut first = self.first_event_at.lock();
            *first.get_or_insert(now)
        };
        for event in &events {
            if event.name == EventName::ValueChange {
                if let Some(form_id) = &event.form_id {
                    if let Some(entry) = self.forms.get(form_id) {
                        entry.state.lock().mark_changed(&event.target_id);
                    }
                }
            }
        }
        self.queue.lock().extend(events);

        let delay = if incremental
            && now.duration_since(oldest) < self.config.force_incremental_threshold
        {
            self.config.incremental_delay
        } else {
            self.config.coalesce_delay
        };

        self.pending_flushes.fetch_add(1, Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.pending_flushes.fetch_sub(1, Ordering::SeqCst) == 1 {
                this.flush().await;
            }
        });
    }

    // -- request cycle --

    /// Runs one request cycle if none is in flight. A no-op otherwise; the
    /// in-flight cycle's completion schedules the follow-up.
    pub async fn flush(self: Arc<Self>) {
        if self.page_replaced.load(Ordering::SeqCst) {
            return;
        }
        if self
            .request_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.execute_next_request().await;
    }

    async fn execute_next_request(self: &Arc<Self>) {
        let (drained, first_fired_at) = {
            let mut queue = self.queue.lock();
            let drained: Vec<UiEvent> = queue.drain(..).collect();
            let first_fired_at = self.first_event_at.lock().take();
            (drained, first_fired_at)
        };

        let lookup = ClientLookup {
            client: self.as_ref(),
        };
        let collapsed = collapse(drained, &self.config, &lookup);
        if collapsed.is_empty() {
            self.request_in_progress.store(false, Ordering::SeqCst);
            return;
        }
        if self.config.deferred_mode && !batch_is_activating(&collapsed, self.dom.as_ref()) {
            // Nothing justifies a round trip yet; hold the batch.
            self.requeue_front(collapsed, first_fired_at);
            self.request_in_progress.store(false, Ordering::SeqCst);
            return;
        }

        let Some((form_id, batch, rest)) = split_first_form(collapsed) else {
            self.request_in_progress.store(false, Ordering::SeqCst);
            return;
        };
        if !rest.is_empty() {
            self.requeue_front(rest, first_fired_at);
        }
        if batch.iter().any(|e| e.name != EventName::Heartbeat) {
            // This form is about to make a substantive round trip; its
            // pending discardable replays are stale.
            self.discardable_timers.lock().retain(|(form, timer)| {
                if *form == form_id {
                    timer.abort();
                    false
                } else {
                    true
                }
            });
        }

        let traits = BatchTraits::of(&batch);
        let Some((body, url)) = self.encode(&form_id, batch) else {
            tracing::warn!(%form_id, "dropping batch for unregistered form");
            self.finish_cycle(false);
            return;
        };

        self.indicator
            .request_started(traits.show_progress, traits.progress_message.clone());
        tracing::debug!(%form_id, bytes = body.len(), "sending request");

        let outcome = exchange_with_retry(
            self.transport.as_ref(),
            &url,
            &body,
            &self.config,
            parse_response,
        )
        .await;

        let page_replaced = match outcome {
            Ok(ServerResponse::Success(doc)) => self.handle_success(&form_id, &doc, &traits),
            Ok(ServerResponse::Error { title, body }) => {
                self.surface_failure(&traits, &title, &body);
                false
            }
            Ok(ServerResponse::Exception { message }) => {
                self.surface_failure(&traits, "Server exception", &message);
                false
            }
            Err(err) => {
                self.surface_failure(&traits, "Request failed", &err.to_string());
                false
            }
        };
        self.finish_cycle(page_replaced);
    }

    /// Encodes the batch, consuming a sequence slot when it deserves one.
    /// Sending a control's value change releases its locally-edited mark;
    /// edits made while the request is in flight re-mark it.
    fn encode(&self, form_id: &str, batch: Vec<UiEvent>) -> Option<(String, String)> {
        let entry = self.forms.get(form_id)?;
        let mut state = entry.state.lock();
        for event in &batch {
            if event.name == EventName::ValueChange {
                state.unmark_changed(&event.target_id);
            }
        }
        let body = EventRequest::assemble(&mut state, batch).to_xml();
        Some((body, entry.server_url.clone()))
    }

    fn handle_success(
        self: &Arc<Self>,
        form_id: &str,
        doc: &liveform_core::wire::ResponseDocument,
        traits: &BatchTraits,
    ) -> bool {
        let applied = {
            let Some(entry) = self.forms.get(form_id) else {
                return false;
            };
            let interpreter = Interpreter {
                dom: self.dom.as_ref(),
                observer: self.observer.as_ref(),
                repeat_tree: &entry.repeat_tree,
            };
            let mut state = entry.state.lock();
            interpreter.apply(form_id, &mut state, doc)
        };
        match applied {
            Ok(applied) => {
                for scheduled in applied.scheduled {
                    self.schedule_server_events(form_id, scheduled);
                }
                if applied.page_replaced {
                    self.page_replaced.store(true, Ordering::SeqCst);
                } else {
                    self.indicator.request_finished();
                }
                self.observer.on_response_processed(form_id);
                applied.page_replaced
            }
            Err(err) => {
                self.surface_failure(traits, "Failed to apply response", &err.to_string());
                false
            }
        }
    }

    fn surface_failure(&self, traits: &BatchTraits, title: &str, body: &str) {
        if traits.ignore_errors {
            tracing::debug!(%title, %body, "suppressing failure for error-tolerant batch");
            self.indicator.request_finished();
        } else {
            tracing::error!(%title, %body, "request cycle failed");
            self.indicator.show_error(title, body);
            self.observer.on_error(title, body);
        }
    }

    /// Releases the single-flight slot and arms the follow-up flush.
    fn finish_cycle(self: &Arc<Self>, page_replaced: bool) {
        self.request_in_progress.store(false, Ordering::SeqCst);
        if page_replaced || self.queue.lock().is_empty() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.flush().await;
        });
    }

    /// Puts events back at the head of the queue, restoring the age of the
    /// oldest one so the force-incremental threshold keeps measuring from
    /// the original firing.
    fn requeue_front(&self, events: Vec<UiEvent>, fired_at: Option<Instant>) {
        {
            let mut queue = self.queue.lock();
            for event in events.into_iter().rev() {
                queue.push_front(event);
            }
        }
        let restored = fired_at.unwrap_or_else(Instant::now);
        let mut first = self.first_event_at.lock();
        *first = Some(first.map_or(restored, |existing| existing.min(restored)));
    }

    fn schedule_server_events(self: &Arc<Self>, form_id: &str, scheduled: ScheduledEvents) {
        let this = Arc::clone(self);
        let form_key = form_id.to_string();
        let form_id = form_id.to_string();
        let discardable = scheduled.discardable;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(scheduled.delay_ms)).await;
            let mut event = UiEvent::new(
                Some(form_id.clone()),
                form_id,
                EventName::ServerEvents,
                Some(scheduled.payload),
            );
            event.show_progress = scheduled.show_progress;
            this.fire_events(vec![event], false);
        });
        if discardable {
            self.discardable_timers.lock().push((form_key, handle));
        }
    }
}

/// Collapse-pass view over the runtime's DOM and per-form state.
struct ClientLookup<'a> {
    client: &'a AjaxClient,
}

impl CollapseLookup for ClientLookup<'_> {
    fn server_value(&self, control_id: &str) -> Option<String> {
        let form_id = self.client.dom.nearest_form(control_id)?;
        let entry = self.client.forms.get(&form_id)?;
        let state = entry.state.lock();
        state.server_value(control_id).map(ToString::to_string)
    }

    fn control_kind(&self, control_id: &str) -> Option<ControlKind> {
        self.client.dom.control_kind(control_id)
    }
}

//! One browsing session: startup gate, inbound navigation, searches,
//! variants and the message list, on top of a filter surface and a token
//! store.

pub mod messages;

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value;
use time::Date;

use crate::appstate::variant::{FilterBarVariant, VariantContext};
use crate::appstate::AppStateCodec;
use crate::config::AppConfig;
use crate::error::{MessageKey, NavigationError};
use crate::navigation::{
    row_details_link, table_cell_link, AppData, GateState, InboundNavigation, NavType,
    NavigationResolver, Readiness, ReadinessSender, Resolution, SmartLinkOutcome,
    StartupBarrier, TableVariantDirective,
};
use crate::query::{Projection, QuerySynthesizer, ReadDescriptor};
use crate::snapshot::FilterSnapshot;
use crate::status::{ItemStatus, LayoutMode, StatusPolicy};
use crate::store::TokenStore;
use crate::surface::FilterSurface;

pub use messages::{Message, MessageLog, Severity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The table is bound to this read.
    Bound(ReadDescriptor),
    /// Waiting for the surface to settle.
    Deferred,
    Rejected(MessageKey),
}

pub struct BrowserSession<S, T> {
    surface: S,
    store: T,
    today: Date,
    default_rate_type: String,
    snapshot: FilterSnapshot,
    projection: Projection,
    synthesizer: QuerySynthesizer,
    codec: AppStateCodec,
    resolver: NavigationResolver,
    barrier: StartupBarrier,
    messages: MessageLog,
    leading_ledger: Option<String>,
    inbound: Option<InboundNavigation>,
    resolution: Option<Resolution>,
    bound: Option<ReadDescriptor>,
    deferred_search: bool,
    initial_search_triggered: bool,
    search_before_navigation: bool,
    responder: bool,
    last_token: Option<String>,
}

impl<S, T> BrowserSession<S, T>
where
    S: FilterSurface,
    T: TokenStore,
{
    pub fn new(config: &AppConfig, surface: S, store: T, today: Date) -> Self {
        let codec = AppStateCodec::new(&config.defaults);
        let mut session = Self {
            surface,
            store,
            today,
            default_rate_type: config.defaults.exchange_rate_type.clone(),
            snapshot: FilterSnapshot::initial(today, &config.defaults.exchange_rate_type),
            projection: Projection::default(),
            synthesizer: QuerySynthesizer::new(config.query.clone()),
            resolver: NavigationResolver::new(codec.clone(), &config.navigation),
            codec,
            barrier: StartupBarrier::new(),
            messages: MessageLog::new(),
            leading_ledger: None,
            inbound: None,
            resolution: None,
            bound: None,
            deferred_search: false,
            initial_search_triggered: false,
            search_before_navigation: false,
            responder: false,
            last_token: None,
        };
        session.snapshot.expand_level = config.defaults.expand_level;
        session.change_status(config.defaults.status);
        session
    }

    /// Navigation to resolve once the startup gate opens.
    pub fn set_inbound(&mut self, inbound: InboundNavigation) {
        self.responder |= inbound.is_responder();
        self.inbound = Some(inbound);
        if self.barrier.gate().is_open() {
            self.resolve_inbound();
        }
    }

    /// Sets a startup latch; the last one resolves the pending navigation.
    pub fn signal(&mut self, flag: Readiness) -> GateState {
        let state = self.barrier.latch(flag);
        if state == GateState::Opened {
            self.resolve_inbound();
        }
        state
    }

    /// Handle for loaders that finish on other threads. Their latches take
    /// effect on the next `poll_readiness`.
    pub fn readiness_sender(&self) -> ReadinessSender {
        self.barrier.sender()
    }

    pub fn poll_readiness(&mut self) -> GateState {
        let state = self.barrier.drain();
        if state == GateState::Opened {
            self.resolve_inbound();
        }
        state
    }

    pub fn leading_ledger_fetched(&mut self, ledger: impl Into<String>) -> GateState {
        let ledger = ledger.into();
        self.snapshot.fill_ledger(&ledger);
        self.leading_ledger = Some(ledger);
        self.signal(Readiness::LEADING_LEDGER)
    }

    fn resolve_inbound(&mut self) {
        let inbound = self.inbound.take().unwrap_or_default();
        match self.try_resolve(inbound) {
            Ok(resolution) => {
                self.snapshot = resolution.snapshot.clone();
                let auto_search = resolution.auto_search;
                self.resolution = Some(resolution);
                if auto_search {
                    self.auto_search();
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "inbound navigation failed, using defaults");
                self.messages.report(err.message_key(), Some(err.to_string()));
                let mut snapshot = FilterSnapshot::initial(self.today, &self.default_rate_type);
                if let Some(ledger) = &self.leading_ledger {
                    snapshot.fill_ledger(ledger);
                }
                StatusPolicy::layout(
                    ItemStatus::Open,
                    LayoutMode::Defaults,
                    self.surface.has_fiscal_year_variant(),
                )
                .apply(&mut snapshot, &mut self.surface, self.today);
                self.resolution = Some(Resolution::unchanged(&snapshot));
                self.snapshot = snapshot;
            }
        }
    }

    fn try_resolve(&mut self, mut inbound: InboundNavigation) -> Result<Resolution, NavigationError> {
        if let Some(token) = inbound.app_state_key.take() {
            let state = self
                .store
                .retrieve(&token)
                .map_err(|err| {
                    tracing::warn!(error = %err, "token store lookup failed");
                    NavigationError::UnknownToken(token.clone())
                })?
                .ok_or_else(|| NavigationError::UnknownToken(token.clone()))?;
            inbound.app_data = AppData::from(state);
            if !inbound.nav_type.is_inbound() {
                inbound.nav_type = NavType::IAppState;
            }
        }
        self.resolver.resolve(
            inbound,
            &self.snapshot,
            &mut self.surface,
            self.leading_ledger.as_deref(),
            self.today,
        )
    }

    /// Searches once the surface is settled, else waits for the next
    /// pending change.
    fn auto_search(&mut self) -> SearchOutcome {
        if self.surface.is_pending() {
            tracing::debug!("surface pending, search deferred");
            self.deferred_search = true;
            return SearchOutcome::Deferred;
        }
        self.search()
    }

    /// Pending-change notification from the surface.
    pub fn on_pending_change(&mut self) -> Option<SearchOutcome> {
        if !self.deferred_search || self.surface.is_pending() {
            return None;
        }
        self.deferred_search = false;
        // a search the user started after navigation already wins
        if self.initial_search_triggered && !self.search_before_navigation {
            return None;
        }
        Some(self.search())
    }

    /// User-triggered search: validate, remember the state and bind the
    /// table to a freshly synthesized read.
    pub fn search(&mut self) -> SearchOutcome {
        self.messages.user_action();

        let policy = StatusPolicy::from_snapshot(&self.snapshot);
        if let Err(err) = policy.validate() {
            self.messages.report(err.message_key(), None);
            return SearchOutcome::Rejected(err.message_key());
        }
        if self.responder {
            tracing::debug!("responder launch, app state not stored");
        } else if self.barrier.gate().is_open() {
            if let Err(err) = self.store_app_state() {
                tracing::warn!(error = %err, "app state could not be stored");
            }
            self.search_before_navigation = false;
        } else {
            self.search_before_navigation = true;
        }

        match self
            .synthesizer
            .synthesize(&self.snapshot, &self.projection, self.today)
        {
            Ok(descriptor) => {
                self.initial_search_triggered = true;
                tracing::info!(path = %descriptor.path(), "table bound");
                self.bound = Some(descriptor.clone());
                SearchOutcome::Bound(descriptor)
            }
            Err(err) => {
                self.messages.report(err.message_key(), Some(err.to_string()));
                SearchOutcome::Rejected(err.message_key())
            }
        }
    }

    pub fn change_status(&mut self, status: ItemStatus) {
        StatusPolicy::layout(status, LayoutMode::Defaults, self.surface.has_fiscal_year_variant())
            .apply(&mut self.snapshot, &mut self.surface, self.today);
        tracing::debug!(status = %status, "status switched");
    }

    pub fn store_app_state(&mut self) -> Result<String> {
        let state = self.codec.serialize(&self.snapshot, &self.surface);
        let token = self.store.store(&state)?;
        self.last_token = Some(token.clone());
        Ok(token)
    }

    /// Resumes a stored state; an unknown token is reported and leaves the
    /// defaults in place.
    pub fn restore_app_state(&mut self, token: &str) -> Option<&Resolution> {
        self.inbound = Some(InboundNavigation {
            nav_type: NavType::IAppState,
            app_state_key: Some(token.to_string()),
            ..InboundNavigation::default()
        });
        self.resolve_inbound();
        self.resolution.as_ref()
    }

    pub fn save_variant(&self, context: VariantContext) -> FilterBarVariant {
        FilterBarVariant::capture(&self.snapshot, &self.surface, context)
    }

    pub fn load_variant(&mut self, variant: &FilterBarVariant) {
        variant.apply(&mut self.snapshot, &mut self.surface, self.today);
        if let Some(ledger) = &self.leading_ledger {
            self.snapshot.fill_ledger(ledger);
        }
        if self.barrier.gate().is_open() {
            if let Err(err) = self.store_app_state() {
                tracing::warn!(error = %err, "app state could not be stored");
            }
        }
    }

    pub fn report_transport_failure(&mut self, status_text: Option<&str>, detail: Option<String>) -> bool {
        self.messages.report_transport(status_text, detail)
    }

    pub fn dismiss_messages(&mut self) {
        self.messages.dismiss();
    }

    /// Smart link from the row-details popup.
    pub fn smart_link(&mut self, row: &IndexMap<String, Value>, link_field: &str) -> SmartLinkOutcome {
        let outcome = row_details_link(row, link_field, &self.snapshot.to_variant());
        self.note_suppressed(&outcome);
        outcome
    }

    pub fn table_link(
        &mut self,
        semantic_object: &str,
        original_id: &str,
        attributes: &IndexMap<String, Value>,
    ) -> SmartLinkOutcome {
        let outcome = table_cell_link(
            semantic_object,
            original_id,
            attributes,
            &self.snapshot.to_variant(),
        );
        self.note_suppressed(&outcome);
        outcome
    }

    fn note_suppressed(&mut self, outcome: &SmartLinkOutcome) {
        if let SmartLinkOutcome::Suppressed { message } = outcome {
            self.messages.report(*message, None);
        }
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    pub fn snapshot(&self) -> &FilterSnapshot {
        &self.snapshot
    }

    pub fn snapshot_mut(&mut self) -> &mut FilterSnapshot {
        &mut self.snapshot
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn table_variant(&self) -> Option<&TableVariantDirective> {
        self.resolution.as_ref().map(|resolution| &resolution.table_variant)
    }

    pub fn bound(&self) -> Option<&ReadDescriptor> {
        self.bound.as_ref()
    }

    pub fn last_token(&self) -> Option<&str> {
        self.last_token.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.barrier.gate().is_open()
    }
}

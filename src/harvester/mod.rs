// Ticket learning: discover finished helpdesk tickets and turn them into knowledge

#[cfg(test)]
mod tests;

pub mod cache;
pub mod records;

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::database::sqlite::models::Tenant;
use crate::helpdesk::{
    HelpdeskApi, HelpdeskCredentials, STATUS_CLOSED, STATUS_RESOLVED, Ticket, TicketFilter,
};
use crate::knowledge::KnowledgeService;
use crate::{Result, SupportError};

pub use cache::LearningCache;
pub use records::{LearningRecord, RecordMatch, combine_records, match_records};

/// Fixed page size of the helpdesk search endpoint
const SEARCH_PAGE_SIZE: usize = 30;

/// Empty pages in a row that end the full scan
const EMPTY_PAGES_TO_STOP: u32 = 2;

/// How a batch of tickets was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscoveryStrategy {
    Filter,
    Search,
    FullScan,
}

impl std::fmt::Display for DiscoveryStrategy {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Filter => "status filters",
            Self::Search => "status search",
            Self::FullScan => "full ticket scan",
        })
    }
}

/// Progress notifications emitted while a harvest runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HarvestProgress {
    Discovered {
        strategy: DiscoveryStrategy,
        found: usize,
        target: usize,
    },
    Fetched {
        index: usize,
        total: usize,
    },
    Indexing {
        conversations: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub tickets_scanned: usize,
    pub conversations_learned: usize,
    pub chunks_created: usize,
    /// Absent when no ticket produced a learning record
    pub document_id: Option<i64>,
}

/// Finished tickets found so far, unique by id
struct Discovery {
    seen: HashSet<u64>,
    tickets: Vec<Ticket>,
    target: usize,
}

impl Discovery {
    fn new(target: usize) -> Self {
        Self {
            seen: HashSet::new(),
            tickets: Vec::new(),
            target,
        }
    }

    fn is_full(&self) -> bool {
        self.tickets.len() >= self.target
    }

    /// Add finished tickets not seen before; returns how many were new
    fn absorb(&mut self, page: Vec<Ticket>) -> usize {
        let mut added = 0;
        for ticket in page {
            if self.is_full() {
                break;
            }
            if ticket.is_finished() && self.seen.insert(ticket.id) {
                self.tickets.push(ticket);
                added += 1;
            }
        }
        added
    }
}

pub struct Harvester {
    helpdesk: Arc<dyn HelpdeskApi>,
    knowledge: Arc<KnowledgeService>,
    cache: Arc<LearningCache>,
    config: HarvestConfig,
    max_document_bytes: usize,
    /// Tenants with a cache warm-up in flight
    warming: Mutex<HashSet<i64>>,
}

impl Harvester {
    #[inline]
    pub fn new(
        helpdesk: Arc<dyn HelpdeskApi>,
        knowledge: Arc<KnowledgeService>,
        cache: Arc<LearningCache>,
        config: HarvestConfig,
        max_document_bytes: usize,
    ) -> Self {
        Self {
            helpdesk,
            knowledge,
            cache,
            config,
            max_document_bytes,
            warming: Mutex::new(HashSet::new()),
        }
    }

    #[inline]
    pub fn cache(&self) -> &Arc<LearningCache> {
        &self.cache
    }

    /// Learn from up to `target_count` finished tickets of a tenant.
    ///
    /// `credentials` overrides the ones stored on the tenant. Fewer tickets
    /// than requested is a normal outcome; the report carries the real counts.
    #[inline]
    pub async fn harvest(
        &self,
        tenant_id: i64,
        credentials: Option<HelpdeskCredentials>,
        target_count: usize,
        progress: Option<&UnboundedSender<HarvestProgress>>,
    ) -> Result<HarvestReport> {
        let tenant = self.knowledge.require_tenant(tenant_id).await?;
        let credentials = credentials
            .or_else(|| tenant.helpdesk_credentials())
            .ok_or_else(|| {
                SupportError::NotConfigured(format!(
                    "tenant {} has no helpdesk credentials",
                    tenant.id
                ))
            })?;
        let target = self.config.clamp_target(target_count);

        info!(
            "Harvesting up to {} tickets for tenant {} from {}",
            target,
            tenant.id,
            credentials.base_url()
        );

        let tickets = self.discover(&credentials, target, progress).await;
        let tickets_scanned = tickets.len();
        let records = self.fetch_records(&credentials, &tickets, progress).await;
        let conversations_learned = records.len();

        let (content, included) = combine_records(&records, self.max_document_bytes);
        if included < records.len() {
            warn!(
                "Learned document for tenant {} holds {} of {} conversations (size limit)",
                tenant.id,
                included,
                records.len()
            );
        }
        self.cache.store(tenant.id, records);

        if included == 0 {
            info!(
                "No learnable conversations among {} tickets for tenant {}",
                tickets_scanned, tenant.id
            );
            return Ok(HarvestReport {
                tickets_scanned,
                conversations_learned,
                chunks_created: 0,
                document_id: None,
            });
        }

        emit(progress, HarvestProgress::Indexing { conversations: included });
        let outcome = self
            .knowledge
            .replace_learned(tenant.id, &content)
            .await
            .map_err(|e| SupportError::Harvest {
                tickets_scanned,
                conversations_learned,
                message: e.to_string(),
            })?;

        info!(
            "Harvest for tenant {} learned {} conversations from {} tickets ({} chunks)",
            tenant.id, conversations_learned, tickets_scanned, outcome.chunk_count
        );

        Ok(HarvestReport {
            tickets_scanned,
            conversations_learned,
            chunks_created: outcome.chunk_count,
            document_id: Some(outcome.document_id),
        })
    }

    /// Cached learning records for a tenant; never calls the helpdesk.
    ///
    /// A miss returns an empty list and starts at most one background
    /// warm-up per tenant, so a later call finds the cache filled.
    #[inline]
    pub fn learning_records(self: &Arc<Self>, tenant: &Tenant) -> Arc<Vec<LearningRecord>> {
        if let Some(records) = self.cache.get(tenant.id) {
            return records;
        }
        if let Some(credentials) = tenant.helpdesk_credentials() {
            self.spawn_warm_up(tenant.id, credentials);
        }
        Arc::new(Vec::new())
    }

    fn spawn_warm_up(self: &Arc<Self>, tenant_id: i64, credentials: HelpdeskCredentials) {
        {
            let mut warming = self.warming.lock().unwrap_or_else(PoisonError::into_inner);
            if !warming.insert(tenant_id) {
                debug!("Learning cache warm-up already running for tenant {}", tenant_id);
                return;
            }
        }

        let harvester = Arc::clone(self);
        tokio::spawn(async move {
            harvester.warm_cache(tenant_id, &credentials).await;
            harvester
                .warming
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&tenant_id);
        });
    }

    /// Fill the cache from the first page of each status filter
    async fn warm_cache(&self, tenant_id: i64, credentials: &HelpdeskCredentials) {
        debug!("Warming learning cache for tenant {}", tenant_id);
        let mut discovery = Discovery::new(self.config.cache_warm_count);
        let mut calls = 0;
        self.scan_filters(credentials, &mut discovery, &mut calls, 1).await;
        let records = self
            .fetch_records(credentials, &discovery.tickets, None)
            .await;

        // A harvest that finished meanwhile stored fresher records
        if self.cache.get(tenant_id).is_none() {
            self.cache.store(tenant_id, records);
        }
    }

    async fn pause(&self, calls: &mut u32) {
        if *calls > 0 && self.config.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }
        *calls += 1;
    }

    async fn discover(
        &self,
        credentials: &HelpdeskCredentials,
        target: usize,
        progress: Option<&UnboundedSender<HarvestProgress>>,
    ) -> Vec<Ticket> {
        let mut discovery = Discovery::new(target);
        let mut calls = 0;

        let strategies = [
            DiscoveryStrategy::Filter,
            DiscoveryStrategy::Search,
            DiscoveryStrategy::FullScan,
        ];
        for strategy in strategies {
            if discovery.is_full() {
                break;
            }
            let before = discovery.tickets.len();
            match strategy {
                DiscoveryStrategy::Filter => {
                    self.scan_filters(
                        credentials,
                        &mut discovery,
                        &mut calls,
                        self.config.max_filter_pages,
                    )
                    .await;
                }
                DiscoveryStrategy::Search => {
                    self.scan_search(credentials, &mut discovery, &mut calls).await;
                }
                DiscoveryStrategy::FullScan => {
                    self.scan_all(credentials, &mut discovery, &mut calls).await;
                }
            }
            debug!(
                "{} added {} tickets ({} of {})",
                strategy,
                discovery.tickets.len() - before,
                discovery.tickets.len(),
                target
            );
            emit(
                progress,
                HarvestProgress::Discovered {
                    strategy,
                    found: discovery.tickets.len(),
                    target,
                },
            );
        }

        discovery.tickets
    }

    async fn scan_filters(
        &self,
        credentials: &HelpdeskCredentials,
        discovery: &mut Discovery,
        calls: &mut u32,
        max_pages: u32,
    ) {
        let per_page = self.config.per_page.max(1);
        for filter in [TicketFilter::Closed, TicketFilter::Resolved] {
            for page in 1..=max_pages {
                if discovery.is_full() {
                    return;
                }
                self.pause(calls).await;
                let tickets = match self
                    .helpdesk
                    .filtered_tickets(credentials, filter, page, per_page)
                    .await
                {
                    Ok(tickets) => tickets,
                    Err(e) => {
                        warn!("Filter '{}' page {} failed: {}", filter, page, e);
                        break;
                    }
                };

                let returned = tickets.len();
                discovery.absorb(tickets);
                if returned < per_page as usize {
                    break;
                }
            }
        }
    }

    async fn scan_search(
        &self,
        credentials: &HelpdeskCredentials,
        discovery: &mut Discovery,
        calls: &mut u32,
    ) {
        for status in [STATUS_RESOLVED, STATUS_CLOSED] {
            for page in 1..=self.config.search_pages_per_status {
                if discovery.is_full() {
                    return;
                }
                self.pause(calls).await;
                let tickets = match self
                    .helpdesk
                    .search_by_status(credentials, status, page)
                    .await
                {
                    Ok(tickets) => tickets,
                    Err(e) => {
                        warn!("Search for status {} page {} failed: {}", status, page, e);
                        break;
                    }
                };

                let returned = tickets.len();
                discovery.absorb(tickets);
                if returned < SEARCH_PAGE_SIZE {
                    break;
                }
            }
        }
    }

    async fn scan_all(
        &self,
        credentials: &HelpdeskCredentials,
        discovery: &mut Discovery,
        calls: &mut u32,
    ) {
        let per_page = self.config.per_page.max(1);
        let mut empty_pages = 0;

        for page in 1..=self.config.max_scan_pages {
            if discovery.is_full() {
                return;
            }
            self.pause(calls).await;
            let tickets = match self.helpdesk.list_recent(credentials, page, per_page).await {
                Ok(tickets) => tickets,
                Err(e) => {
                    warn!("Ticket scan page {} failed: {}", page, e);
                    continue;
                }
            };

            if tickets.is_empty() {
                empty_pages += 1;
                if empty_pages >= EMPTY_PAGES_TO_STOP {
                    debug!("Ticket scan reached the end at page {}", page);
                    return;
                }
                continue;
            }
            empty_pages = 0;
            discovery.absorb(tickets);
        }

        debug!(
            "Ticket scan stopped at the {} page cap",
            self.config.max_scan_pages
        );
    }

    /// Fetch each ticket's thread; a ticket that fails is skipped
    async fn fetch_records(
        &self,
        credentials: &HelpdeskCredentials,
        tickets: &[Ticket],
        progress: Option<&UnboundedSender<HarvestProgress>>,
    ) -> Vec<LearningRecord> {
        let pause_every = self.config.detail_pause_every.max(1);
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let mut records = Vec::with_capacity(tickets.len());

        for (index, ticket) in tickets.iter().enumerate() {
            if index > 0 && index % pause_every == 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.helpdesk.ticket_thread(credentials, ticket.id).await {
                Ok(thread) => {
                    if let Some(record) =
                        LearningRecord::from_thread(&thread, self.config.stub_min_chars)
                    {
                        records.push(record);
                    } else {
                        debug!("Ticket {} has nothing to learn from", ticket.id);
                    }
                }
                Err(e) => warn!("Skipping ticket {}: {}", ticket.id, e),
            }

            emit(
                progress,
                HarvestProgress::Fetched {
                    index: index + 1,
                    total: tickets.len(),
                },
            );
        }

        records
    }
}

fn emit(progress: Option<&UnboundedSender<HarvestProgress>>, event: HarvestProgress) {
    if let Some(sender) = progress {
        // The receiver going away only means nobody is watching
        let _ = sender.send(event);
    }
}

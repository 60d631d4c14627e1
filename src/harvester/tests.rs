use super::*;
use crate::config::{ChunkingConfig, IngestionConfig};
use crate::database::sqlite::models::{LEARNED_DOCUMENT_PREFIX, NewTenant};
use crate::helpdesk::{Conversation, TicketThread};
use crate::test_support::{KeywordEmbedder, MemoryIndex, database_with_tenant, named_tenant};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

fn ticket(id: u64, status: u8) -> Ticket {
    Ticket {
        id,
        subject: format!("Question {id}"),
        status,
        description_text: Some(format!("Customer asks about refund for order {id}")),
        tags: Vec::new(),
        updated_at: None,
    }
}

fn finished(ids: std::ops::RangeInclusive<u64>) -> Vec<Ticket> {
    ids.map(|id| ticket(id, STATUS_RESOLVED)).collect()
}

/// Helpdesk serving fixed pages and recording every call
#[derive(Default)]
struct FixtureHelpdesk {
    resolved: Vec<Ticket>,
    closed: Vec<Ticket>,
    search: HashMap<u8, Vec<Ticket>>,
    scan_pages: Vec<Vec<Ticket>>,
    /// Scan pages repeat forever instead of running out
    endless_scan: bool,
    failing_scan_pages: Vec<u32>,
    failing_threads: Vec<u64>,
    no_reply_threads: Vec<u64>,
    calls: Mutex<Vec<String>>,
}

impl FixtureHelpdesk {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

fn page_of(tickets: &[Ticket], page: u32, per_page: usize) -> Vec<Ticket> {
    tickets
        .iter()
        .skip((page as usize - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect()
}

#[async_trait]
impl HelpdeskApi for FixtureHelpdesk {
    async fn filtered_tickets(
        &self,
        _credentials: &HelpdeskCredentials,
        filter: TicketFilter,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Ticket>> {
        self.record(format!("filter:{filter}:{page}"));
        let source = match filter {
            TicketFilter::Closed => &self.closed,
            TicketFilter::Resolved => &self.resolved,
        };
        Ok(page_of(source, page, per_page as usize))
    }

    async fn search_by_status(
        &self,
        _credentials: &HelpdeskCredentials,
        status: u8,
        page: u32,
    ) -> Result<Vec<Ticket>> {
        self.record(format!("search:{status}:{page}"));
        let tickets = self.search.get(&status).cloned().unwrap_or_default();
        Ok(page_of(&tickets, page, 30))
    }

    async fn list_recent(
        &self,
        _credentials: &HelpdeskCredentials,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<Ticket>> {
        self.record(format!("scan:{page}"));
        if self.failing_scan_pages.contains(&page) {
            return Err(SupportError::Helpdesk("HTTP 502".to_string()));
        }
        if self.endless_scan {
            return Ok(self.scan_pages.first().cloned().unwrap_or_default());
        }
        Ok(self
            .scan_pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default())
    }

    async fn ticket_thread(
        &self,
        _credentials: &HelpdeskCredentials,
        ticket_id: u64,
    ) -> Result<TicketThread> {
        self.record(format!("thread:{ticket_id}"));
        if self.failing_threads.contains(&ticket_id) {
            return Err(SupportError::Helpdesk("HTTP 500".to_string()));
        }
        let conversations = if self.no_reply_threads.contains(&ticket_id) {
            Vec::new()
        } else {
            vec![Conversation {
                body_text: format!("Refund for order {ticket_id} has been issued."),
                incoming: false,
                private: false,
                created_at: None,
            }]
        };
        Ok(TicketThread {
            ticket: ticket(ticket_id, STATUS_RESOLVED),
            conversations,
        })
    }
}

fn fast_config() -> HarvestConfig {
    HarvestConfig {
        request_delay_ms: 0,
        ..HarvestConfig::default()
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    tenant_id: i64,
    database: crate::database::Database,
    helpdesk: Arc<FixtureHelpdesk>,
    harvester: Arc<Harvester>,
}

async fn fixture_with(helpdesk: FixtureHelpdesk, index: MemoryIndex, config: HarvestConfig) -> Fixture {
    let (dir, database, tenant) = database_with_tenant(NewTenant {
        helpdesk_domain: Some("acme".to_string()),
        helpdesk_api_key: Some("key".to_string()),
        ..named_tenant("Acme")
    })
    .await;
    let knowledge = Arc::new(KnowledgeService::new(
        database.clone(),
        Arc::new(index),
        Arc::new(KeywordEmbedder::default()),
        ChunkingConfig::default(),
        IngestionConfig::default(),
    ));
    let helpdesk = Arc::new(helpdesk);
    let harvester = Arc::new(Harvester::new(
        Arc::clone(&helpdesk) as Arc<dyn HelpdeskApi>,
        knowledge,
        Arc::new(LearningCache::new(Duration::from_secs(60))),
        config,
        IngestionConfig::default().max_learned_document_bytes,
    ));

    Fixture {
        _dir: dir,
        tenant_id: tenant.id,
        database,
        helpdesk,
        harvester,
    }
}

async fn fixture(helpdesk: FixtureHelpdesk) -> Fixture {
    fixture_with(helpdesk, MemoryIndex::default(), fast_config()).await
}

async fn learned_content(fixture: &Fixture) -> String {
    let documents = fixture
        .database
        .documents_with_prefix(fixture.tenant_id, LEARNED_DOCUMENT_PREFIX)
        .await
        .expect("should list learned documents");
    assert_eq!(documents.len(), 1, "exactly one learned document should exist");
    documents[0].content.clone()
}

#[tokio::test]
async fn overlapping_strategies_contribute_each_ticket_once() {
    // 30 from the filter, then 25 from search of which 10 are new
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=30),
        search: HashMap::from([(STATUS_RESOLVED, finished(16..=40))]),
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 50, None)
        .await
        .expect("harvest should succeed");

    assert_eq!(report.tickets_scanned, 40);
    assert_eq!(report.conversations_learned, 40);
    assert!(report.chunks_created >= 1);
    assert!(report.document_id.is_some());

    let content = learned_content(&fixture).await;
    for id in 1..=40 {
        assert_eq!(
            content.matches(&format!("Ticket #{id}:")).count(),
            1,
            "ticket {id} should appear exactly once"
        );
    }
    // The scan ran and stopped after two empty pages
    assert_eq!(fixture.helpdesk.calls_starting_with("scan:"), 2);
    assert_eq!(fixture.helpdesk.calls_starting_with("thread:"), 40);
}

#[tokio::test]
async fn filter_results_alone_can_fill_the_target() {
    let helpdesk = FixtureHelpdesk {
        closed: finished(1..=15),
        resolved: finished(100..=130),
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 20, None)
        .await
        .expect("harvest should succeed");

    assert_eq!(report.tickets_scanned, 20);
    assert_eq!(fixture.helpdesk.calls_starting_with("search:"), 0);
    assert_eq!(fixture.helpdesk.calls_starting_with("scan:"), 0);
}

#[tokio::test]
async fn full_scan_keeps_only_finished_tickets() {
    let helpdesk = FixtureHelpdesk {
        scan_pages: vec![
            vec![ticket(1, 2), ticket(2, STATUS_CLOSED), ticket(3, 3)],
            vec![ticket(4, STATUS_RESOLVED), ticket(2, STATUS_CLOSED)],
        ],
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("harvest should succeed");

    assert_eq!(report.tickets_scanned, 2);
    // Two data pages followed by two empty ones
    assert_eq!(fixture.helpdesk.calls_starting_with("scan:"), 4);
}

#[tokio::test]
async fn full_scan_stops_at_page_cap() {
    let helpdesk = FixtureHelpdesk {
        scan_pages: vec![vec![ticket(1, 2), ticket(2, 2)]],
        endless_scan: true,
        ..FixtureHelpdesk::default()
    };
    let config = HarvestConfig {
        max_scan_pages: 7,
        ..fast_config()
    };
    let fixture = fixture_with(helpdesk, MemoryIndex::default(), config).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("under-filled harvest is not an error");

    assert_eq!(report.tickets_scanned, 0);
    assert_eq!(report.document_id, None);
    assert_eq!(fixture.helpdesk.calls_starting_with("scan:"), 7);
}

#[tokio::test]
async fn failed_scan_page_does_not_end_the_scan() {
    let helpdesk = FixtureHelpdesk {
        scan_pages: vec![
            Vec::new(),
            vec![ticket(4, STATUS_RESOLVED), ticket(5, STATUS_CLOSED), ticket(6, 2)],
        ],
        failing_scan_pages: vec![1],
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("harvest should succeed");

    assert_eq!(report.tickets_scanned, 2);
    // Failed page, data page, then two empty ones
    assert_eq!(fixture.helpdesk.calls_starting_with("scan:"), 4);
}

#[tokio::test]
async fn failed_scan_pages_count_toward_page_cap() {
    let helpdesk = FixtureHelpdesk {
        failing_scan_pages: (1..=20).collect(),
        ..FixtureHelpdesk::default()
    };
    let config = HarvestConfig {
        max_scan_pages: 5,
        ..fast_config()
    };
    let fixture = fixture_with(helpdesk, MemoryIndex::default(), config).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("scan failures are not fatal");

    assert_eq!(report.tickets_scanned, 0);
    assert_eq!(fixture.helpdesk.calls_starting_with("scan:"), 5);
}

#[tokio::test]
async fn failing_ticket_is_skipped() {
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=12),
        failing_threads: vec![7],
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 12, None)
        .await
        .expect("one bad ticket must not abort the harvest");

    assert_eq!(report.tickets_scanned, 12);
    assert_eq!(report.conversations_learned, 11);
    assert!(!learned_content(&fixture).await.contains("Ticket #7:"));
}

#[tokio::test]
async fn short_questions_without_replies_are_skipped() {
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=10),
        no_reply_threads: vec![3],
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    let report = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("harvest should succeed");

    // "Customer asks about refund for order 3" is shorter than the stub threshold
    assert_eq!(report.conversations_learned, 9);
}

#[tokio::test]
async fn relearning_replaces_previous_document() {
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=10),
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    let first = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("first harvest");
    let second = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("second harvest");

    assert_ne!(first.document_id, second.document_id);
    learned_content(&fixture).await;
}

#[tokio::test]
async fn progress_events_are_emitted() {
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=10),
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;
    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();

    fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, Some(&sender))
        .await
        .expect("harvest should succeed");
    drop(sender);

    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }

    assert_eq!(
        events.first(),
        Some(&HarvestProgress::Discovered {
            strategy: DiscoveryStrategy::Filter,
            found: 10,
            target: 10,
        })
    );
    assert!(events.contains(&HarvestProgress::Fetched { index: 10, total: 10 }));
    assert_eq!(
        events.last(),
        Some(&HarvestProgress::Indexing { conversations: 10 })
    );
}

#[tokio::test]
async fn harvest_fills_learning_cache() {
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=10),
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;

    fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect("harvest should succeed");

    let cached = fixture
        .harvester
        .cache()
        .get(fixture.tenant_id)
        .expect("records should be cached");
    assert_eq!(cached.len(), 10);
}

#[tokio::test]
async fn learning_records_miss_warms_once_in_background() {
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=50),
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture(helpdesk).await;
    let tenant = fixture
        .database
        .get_tenant(fixture.tenant_id)
        .await
        .expect("should query")
        .expect("tenant exists");

    // Both misses return at once; the second finds the warm-up in flight
    assert!(fixture.harvester.learning_records(&tenant).is_empty());
    assert!(fixture.harvester.learning_records(&tenant).is_empty());
    assert_eq!(fixture.helpdesk.calls_starting_with("thread:"), 0);

    let mut warmed = None;
    for _ in 0..200 {
        warmed = fixture.harvester.cache().get(fixture.tenant_id);
        if warmed.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let warmed = warmed.expect("background warm-up should fill the cache");

    assert_eq!(warmed.len(), HarvestConfig::default().cache_warm_count);
    // One page per filter, from a single warm-up
    assert_eq!(fixture.helpdesk.calls_starting_with("filter:closed:"), 1);
    assert_eq!(fixture.helpdesk.calls_starting_with("filter:resolved:"), 1);
    assert_eq!(
        fixture.helpdesk.calls_starting_with("thread:"),
        HarvestConfig::default().cache_warm_count
    );

    let again = fixture.harvester.learning_records(&tenant);
    assert_eq!(again.len(), warmed.len());
    assert_eq!(
        fixture.helpdesk.calls_starting_with("thread:"),
        HarvestConfig::default().cache_warm_count
    );
}

#[tokio::test]
async fn learning_records_without_helpdesk_are_empty() {
    let (_dir, database, tenant) = database_with_tenant(named_tenant("Plain")).await;
    let knowledge = Arc::new(KnowledgeService::new(
        database,
        Arc::new(MemoryIndex::default()),
        Arc::new(KeywordEmbedder::default()),
        ChunkingConfig::default(),
        IngestionConfig::default(),
    ));
    let helpdesk = Arc::new(FixtureHelpdesk::default());
    let harvester = Arc::new(Harvester::new(
        Arc::clone(&helpdesk) as Arc<dyn HelpdeskApi>,
        knowledge,
        Arc::new(LearningCache::new(Duration::from_secs(60))),
        fast_config(),
        1024,
    ));

    assert!(harvester.learning_records(&tenant).is_empty());
    tokio::task::yield_now().await;
    assert!(helpdesk.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_tenant_fails_before_any_call() {
    let fixture = fixture(FixtureHelpdesk::default()).await;

    let error = fixture
        .harvester
        .harvest(fixture.tenant_id + 1, None, 10, None)
        .await
        .expect_err("unknown tenant should fail");

    assert!(matches!(error, SupportError::TenantNotFound(_)));
    assert!(fixture.helpdesk.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tenant_without_credentials_is_not_configured() {
    let (_dir, database, tenant) = database_with_tenant(named_tenant("Bare")).await;
    let knowledge = Arc::new(KnowledgeService::new(
        database,
        Arc::new(MemoryIndex::default()),
        Arc::new(KeywordEmbedder::default()),
        ChunkingConfig::default(),
        IngestionConfig::default(),
    ));
    let harvester = Harvester::new(
        Arc::new(FixtureHelpdesk::default()),
        knowledge,
        Arc::new(LearningCache::new(Duration::from_secs(60))),
        fast_config(),
        1024,
    );

    let error = harvester
        .harvest(tenant.id, None, 10, None)
        .await
        .expect_err("missing credentials should fail");
    assert!(matches!(error, SupportError::NotConfigured(_)));
}

#[tokio::test]
async fn indexing_failure_reports_counts() {
    let helpdesk = FixtureHelpdesk {
        resolved: finished(1..=10),
        ..FixtureHelpdesk::default()
    };
    let fixture = fixture_with(helpdesk, MemoryIndex::failing_upsert(), fast_config()).await;

    let error = fixture
        .harvester
        .harvest(fixture.tenant_id, None, 10, None)
        .await
        .expect_err("indexing failure is fatal");

    match error {
        SupportError::Harvest {
            tickets_scanned,
            conversations_learned,
            ..
        } => {
            assert_eq!(tickets_scanned, 10);
            assert_eq!(conversations_learned, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(
        fixture
            .database
            .documents_with_prefix(fixture.tenant_id, LEARNED_DOCUMENT_PREFIX)
            .await
            .expect("should list")
            .is_empty()
    );
}

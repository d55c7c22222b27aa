//! End-to-end dispatch through an [`OrchestrationCore`].

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use seekd::config::IndexingConfig;
use seekd::loader::{BackendModule, FlavorEntry};
use seekd::{
    BackendError, BackendFlavor, ChangeData, DaemonConfig, DaemonError, Hit, HostCapabilities,
    OrchestrationCore, Query, QueryDomain, QueryEvent, QueryEvents, QueryPart, QueryResult,
    QueryWorker, Queryable,
};

// ---------------------------------------------------------------------------
// Test backends
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Decline {
    asked: AtomicUsize,
}

impl Queryable for Decline {
    fn accept_query(&self, _query: &Query) -> bool {
        false
    }

    fn do_query(
        &self,
        _query: Arc<Query>,
        worker: QueryWorker,
        _change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        worker.finish();
        Ok(())
    }
}

/// Answers synchronously with a fixed set of hits.
struct Fixed {
    uris: Vec<&'static str>,
    asked: AtomicUsize,
    changes: Mutex<Vec<ChangeData>>,
}

impl Fixed {
    fn new(uris: &[&'static str]) -> Self {
        Self {
            uris: uris.to_vec(),
            asked: AtomicUsize::new(0),
            changes: Mutex::new(Vec::new()),
        }
    }
}

impl Queryable for Fixed {
    fn do_query(
        &self,
        _query: Arc<Query>,
        worker: QueryWorker,
        change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        if let Some(change) = change {
            self.changes.lock().unwrap().push((*change).clone());
        }
        let hits = self.uris.iter().map(|uri| Hit::new(*uri, 1.0)).collect();
        worker
            .add_hits(hits)
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        worker.finish();
        Ok(())
    }
}

/// Answers from a background thread after a short delay.
struct Threaded {
    hits: usize,
}

impl Queryable for Threaded {
    fn do_query(
        &self,
        _query: Arc<Query>,
        worker: QueryWorker,
        _change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        let hits = self.hits;
        thread::spawn(move || {
            for i in 0..hits {
                thread::sleep(Duration::from_millis(1));
                let _ = worker.add_hit(Hit::new(format!("{}://{i}", worker.source()), i as f64));
            }
            worker.finish();
        });
        Ok(())
    }
}

/// Keeps its workers until the test releases them.
#[derive(Default)]
struct Holding {
    workers: Mutex<Vec<QueryWorker>>,
}

impl Holding {
    fn release(&self) {
        for worker in self.workers.lock().unwrap().drain(..) {
            worker.finish();
        }
    }
}

impl Queryable for Holding {
    fn do_query(
        &self,
        _query: Arc<Query>,
        worker: QueryWorker,
        _change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        self.workers.lock().unwrap().push(worker);
        Ok(())
    }
}

struct Failing;

impl Queryable for Failing {
    fn do_query(
        &self,
        _query: Arc<Query>,
        _worker: QueryWorker,
        _change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        Err(BackendError::Failed("index locked".into()))
    }
}

struct Panicking;

impl Queryable for Panicking {
    fn do_query(
        &self,
        _query: Arc<Query>,
        _worker: QueryWorker,
        _change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        panic!("corrupt segment");
    }
}

/// Panics when asked whether it wants a query.
#[derive(Default)]
struct Picky {
    asked: AtomicUsize,
}

impl Queryable for Picky {
    fn accept_query(&self, _query: &Query) -> bool {
        panic!("predicate blew up");
    }

    fn do_query(
        &self,
        _query: Arc<Query>,
        worker: QueryWorker,
        _change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        worker.finish();
        Ok(())
    }
}

/// One module per backend, registering it under `flavor`.
struct Single {
    flavor: BackendFlavor,
    backend: Arc<dyn Queryable>,
}

impl BackendModule for Single {
    fn id(&self) -> &str {
        self.flavor.name()
    }

    fn flavors(&self) -> Vec<FlavorEntry> {
        let backend = Arc::clone(&self.backend);
        vec![FlavorEntry::new(self.flavor.clone(), move |_| {
            Ok(Arc::clone(&backend))
        })]
    }
}

fn local(name: &str, backend: Arc<dyn Queryable>) -> Single {
    Single {
        flavor: BackendFlavor::new(name, QueryDomain::Local),
        backend,
    }
}

fn config() -> DaemonConfig {
    DaemonConfig {
        indexing: IndexingConfig {
            start_immediately: true,
            ..IndexingConfig::default()
        },
        ..DaemonConfig::default()
    }
}

fn core_with(modules: Vec<Single>) -> OrchestrationCore {
    let mut builder =
        OrchestrationCore::builder(config()).with_host_capabilities(HostCapabilities::all());
    for module in modules {
        builder = builder.with_module(module);
    }
    let core = builder.build();
    core.start();
    core
}

fn drain(rx: &mut QueryEvents) -> Vec<QueryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count(events: &[QueryEvent], pred: impl Fn(&QueryEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

fn started(e: &QueryEvent) -> bool {
    matches!(e, QueryEvent::Started)
}

fn finished(e: &QueryEvent) -> bool {
    matches!(e, QueryEvent::Finished { .. })
}

// ---------------------------------------------------------------------------
// Start/finish protocol
// ---------------------------------------------------------------------------

#[test]
fn all_declining_backends_still_start_and_finish() {
    for n in 0..4 {
        let backends: Vec<Arc<Decline>> = (0..n).map(|_| Arc::new(Decline::default())).collect();
        let core = core_with(
            backends
                .iter()
                .enumerate()
                .map(|(i, b)| local(&format!("decline-{i}"), b.clone()))
                .collect(),
        );

        let mut query = core.query("anything");
        let (result, mut rx) = QueryResult::new();
        core.dispatch(&mut query, &result).expect("dispatch");

        let events = drain(&mut rx);
        assert_eq!(count(&events, started), 1, "n = {n}");
        assert_eq!(count(&events, finished), 1, "n = {n}");
        assert_eq!(events.last(), Some(&QueryEvent::Finished { total_hits: 0 }));
        assert!(result.hits().is_empty());
        assert!(backends.iter().all(|b| b.asked.load(Ordering::SeqCst) == 0));
    }
}

#[test]
fn finished_waits_for_every_backend() {
    let backends: Vec<Arc<Holding>> = (0..3).map(|_| Arc::new(Holding::default())).collect();
    let core = core_with(
        backends
            .iter()
            .enumerate()
            .map(|(i, b)| local(&format!("hold-{i}"), b.clone()))
            .collect(),
    );

    let mut query = core.query("fox");
    let (result, mut rx) = QueryResult::new();
    core.dispatch(&mut query, &result).expect("dispatch");
    assert_eq!(result.active_workers(), 3);

    for backend in &backends[..2] {
        backend.release();
        assert!(!result.is_finished());
    }
    assert_eq!(count(&drain(&mut rx), finished), 0);

    backends[2].release();
    assert!(result.is_finished());
    assert_eq!(count(&drain(&mut rx), finished), 1);
}

#[tokio::test]
async fn background_backends_deliver_everything_before_finish() {
    let core = core_with(
        (0..4)
            .map(|i| local(&format!("bg-{i}"), Arc::new(Threaded { hits: 25 })))
            .collect(),
    );

    let mut query = core.query("fox");
    let (result, mut rx) = QueryResult::new();
    core.dispatch(&mut query, &result).expect("dispatch");

    let mut streamed = 0;
    let mut finished_with = None;
    while let Some(event) = rx.recv().await {
        match event {
            QueryEvent::HitsAdded { hits, .. } => {
                assert!(finished_with.is_none(), "hits after Finished");
                streamed += hits.len();
            }
            QueryEvent::Finished { total_hits } => {
                finished_with = Some(total_hits);
                break;
            }
            _ => {}
        }
    }

    assert_eq!(finished_with, Some(100));
    assert_eq!(streamed, 100);
    assert_eq!(result.hit_count(), 100);
}

#[test]
fn failing_backends_do_not_block_the_query() {
    let good = Arc::new(Fixed::new(&["file:///a", "file:///b", "file:///c"]));
    let core = core_with(vec![
        local("good", good.clone()),
        local("failing", Arc::new(Failing)),
        local("panicking", Arc::new(Panicking)),
    ]);

    let mut query = core.query("fox");
    let (result, mut rx) = QueryResult::new();
    core.dispatch(&mut query, &result).expect("dispatch");

    assert!(result.is_finished());
    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&QueryEvent::Finished { total_hits: 3 }));
    assert!(result.hits().iter().all(|h| h.source == "good"));
}

#[test]
fn panicking_accept_query_counts_as_declined() {
    let picky = Arc::new(Picky::default());
    let later = Arc::new(Fixed::new(&["file:///a"]));
    let core = core_with(vec![local("picky", picky.clone()), local("later", later.clone())]);

    let mut query = core.query("fox");
    let (result, mut rx) = QueryResult::new();
    core.dispatch(&mut query, &result).expect("dispatch");

    assert_eq!(picky.asked.load(Ordering::SeqCst), 0);
    assert_eq!(later.asked.load(Ordering::SeqCst), 1);
    let events = drain(&mut rx);
    assert_eq!(count(&events, started), 1);
    assert_eq!(events.last(), Some(&QueryEvent::Finished { total_hits: 1 }));
}

#[test]
fn search_terms_arrive_first() {
    let core = core_with(vec![local("good", Arc::new(Fixed::new(&["file:///a"])))]);

    let mut query = core.query("\"the quick fox\"");
    let (result, mut rx) = QueryResult::new();
    let summary = core.dispatch(&mut query, &result).expect("dispatch");
    assert_eq!(summary.exact, ["quick fox"]);
    assert_eq!(summary.stemmed.len(), 1);
    assert!(!query.has_human_parts());

    let events = drain(&mut rx);
    assert_eq!(events[0], QueryEvent::SearchTerms(summary));
    assert_eq!(events[1], QueryEvent::Started);
}

#[test]
fn human_text_inside_an_or_group_still_completes() {
    let core = core_with(vec![]);
    let mut query = Query::new().with_part(QueryPart::or(vec![
        QueryPart::human("quick fox"),
        QueryPart::text("dog"),
    ]));
    let (result, mut rx) = QueryResult::new();

    let summary = core.dispatch(&mut query, &result).expect("dispatch");
    assert!(!query.has_human_parts());
    assert_eq!(summary.exact, ["quick", "fox", "dog"]);

    let events = drain(&mut rx);
    assert_eq!(events[0], QueryEvent::SearchTerms(summary));
    assert_eq!(count(&events, started), 1);
    assert_eq!(events.last(), Some(&QueryEvent::Finished { total_hits: 0 }));
    assert!(result.is_finished());
}

#[test]
fn reusing_a_finished_result_is_rejected() {
    let core = core_with(vec![]);
    let (result, _rx) = QueryResult::new();
    core.dispatch(&mut core.query("a"), &result).expect("first dispatch");
    let err = core.dispatch(&mut core.query("b"), &result).unwrap_err();
    assert!(matches!(err, DaemonError::DispatchProtocol(_)));
}

// ---------------------------------------------------------------------------
// Who gets asked
// ---------------------------------------------------------------------------

#[test]
fn denied_backends_are_skipped_until_allowed() {
    let a = Arc::new(Fixed::new(&["a://1"]));
    let b = Arc::new(Fixed::new(&["b://1"]));
    let core = core_with(vec![local("a", a.clone()), local("b", b.clone())]);

    core.deny("B");
    let (result, _rx) = QueryResult::new();
    core.dispatch(&mut core.query("x"), &result).expect("dispatch");
    assert_eq!(a.asked.load(Ordering::SeqCst), 1);
    assert_eq!(b.asked.load(Ordering::SeqCst), 0);

    core.allow("b");
    let (result, _rx) = QueryResult::new();
    core.dispatch(&mut core.query("x"), &result).expect("dispatch");
    assert_eq!(b.asked.load(Ordering::SeqCst), 1);
    assert_eq!(result.hit_count(), 2);
}

#[test]
fn query_domains_gate_backends() {
    let local_backend = Arc::new(Fixed::new(&["file:///a"]));
    let network_backend = Arc::new(Fixed::new(&["http://b"]));
    let core = core_with(vec![
        local("files", local_backend.clone()),
        Single {
            flavor: BackendFlavor::new("web", QueryDomain::Network),
            backend: network_backend.clone(),
        },
    ]);

    let (result, _rx) = QueryResult::new();
    core.dispatch(&mut core.query("x"), &result).expect("dispatch");
    assert_eq!(network_backend.asked.load(Ordering::SeqCst), 0);

    let mut query = core.query("x");
    query.allow_domain(QueryDomain::Network);
    let (result, _rx) = QueryResult::new();
    core.dispatch(&mut query, &result).expect("dispatch");
    assert_eq!(network_backend.asked.load(Ordering::SeqCst), 1);
    assert_eq!(local_backend.asked.load(Ordering::SeqCst), 2);
}

#[test]
fn nothing_is_asked_before_start() {
    let backend = Arc::new(Fixed::new(&["file:///a"]));
    let core = OrchestrationCore::builder(config())
        .with_module(local("files", backend.clone()))
        .build();

    let (result, mut rx) = QueryResult::new();
    core.dispatch(&mut core.query("x"), &result).expect("dispatch");
    assert_eq!(backend.asked.load(Ordering::SeqCst), 0);
    let events = drain(&mut rx);
    assert_eq!(count(&events, started), 1);
    assert_eq!(count(&events, finished), 1);
}

// ---------------------------------------------------------------------------
// Single-backend re-runs
// ---------------------------------------------------------------------------

#[test]
fn dispatch_one_passes_change_data() {
    let backend = Arc::new(Fixed::new(&["file:///new"]));
    let core = core_with(vec![
        local("files", backend.clone()),
        local("other", Arc::new(Fixed::new(&["x://1"]))),
    ]);

    let change = Arc::new(ChangeData {
        added: vec!["file:///new".into()],
        removed: Vec::new(),
    });
    let query = Arc::new(core.query("new"));
    let (result, mut rx) = QueryResult::new();
    let guard = result.attach_worker("live-query").expect("attach");
    let asked = core
        .dispatch_one("FILES", query, &result, Some(change))
        .expect("dispatch_one");
    guard.finish();

    assert!(asked);
    assert_eq!(backend.changes.lock().unwrap()[0].added, ["file:///new"]);
    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&QueryEvent::Finished { total_hits: 1 }));
}

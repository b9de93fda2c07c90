//! Integration tests for the crawler
//!
//! Most tests drive the crawl engine with an in-memory, deterministic
//! fetcher. The last ones use wiremock to stand in for the panorama
//! service and run the full crawl cycle end-to-end.

use async_trait::async_trait;
use panocrawl::area::{Admission, LatLng};
use panocrawl::config::parse_config;
use panocrawl::crawler::{
    crawl, CrawlStatus, Crawler, CrawlerSettings, FetchError, FetchOutcome, Fetcher, HttpFetcher,
    Panorama,
};
use panocrawl::state::{CrawlDatabase, NodeId, NodeRecord};
use panocrawl::storage::{read_snapshot, Checkpointer, LoadSource};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A fixed panorama graph served from memory
///
/// Every node sits at latitude 1.0 unless listed in `outside`, which puts
/// it at latitude -1.0. Unknown ids are missing.
struct GraphFetcher {
    links: HashMap<String, Vec<String>>,
    outside: HashSet<String>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl GraphFetcher {
    fn new(links: &[(&str, &[&str])]) -> Self {
        Self {
            links: links
                .iter()
                .map(|(id, ns)| (id.to_string(), ns.iter().map(|n| n.to_string()).collect()))
                .collect(),
            outside: HashSet::new(),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    fn outside(mut self, ids: &[&str]) -> Self {
        self.outside = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// A grid of `size` x `size` nodes linked to their four neighbours
    fn grid(size: usize) -> Self {
        let name = |r: usize, c: usize| format!("g{}_{}", r, c);
        let mut links = HashMap::new();
        for r in 0..size {
            for c in 0..size {
                let mut ns = Vec::new();
                if r > 0 {
                    ns.push(name(r - 1, c));
                }
                if r + 1 < size {
                    ns.push(name(r + 1, c));
                }
                if c > 0 {
                    ns.push(name(r, c - 1));
                }
                if c + 1 < size {
                    ns.push(name(r, c + 1));
                }
                links.insert(name(r, c), ns);
            }
        }
        Self {
            links,
            outside: HashSet::new(),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Fetcher for GraphFetcher {
    async fn fetch(&self, id: &NodeId) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let Some(links) = self.links.get(id.as_str()) else {
            return FetchOutcome::Missing;
        };
        let lat = if self.outside.contains(id.as_str()) {
            -1.0
        } else {
            1.0
        };

        FetchOutcome::Found(Panorama {
            id: id.clone(),
            record: NodeRecord {
                location: LatLng::new(lat, 0.0),
                date: None,
            },
            neighbours: links.iter().map(|n| NodeId::from(n.as_str())).collect(),
            recordable: true,
            raw: None,
        })
    }

    async fn locate(&self, _: LatLng, _: u32) -> Result<Option<NodeId>, FetchError> {
        Ok(None)
    }
}

fn northern_hemisphere() -> Arc<dyn Admission> {
    Arc::new(|p: &LatLng| p.lat >= 0.0)
}

fn checkpointer(dir: &TempDir) -> Checkpointer {
    Checkpointer::new(
        dir.path().join("db.sqlite"),
        dir.path().join("db.sqlite.bck"),
    )
}

fn new_crawler(dir: &TempDir, fetcher: Arc<GraphFetcher>, workers: usize) -> Crawler {
    let settings = CrawlerSettings {
        workers,
        backup_interval: Duration::from_secs(3600),
        report_interval: Duration::from_secs(3600),
    };
    Crawler::new(settings, fetcher, northern_hemisphere(), checkpointer(dir))
}

async fn run_to_completion(crawler: &mut Crawler) -> CrawlStatus {
    tokio::time::timeout(
        Duration::from_secs(10),
        crawler.run_until(std::future::pending::<()>()),
    )
    .await
    .expect("crawl should complete")
    .expect("crawl should succeed")
}

fn visited_ids(crawler: &Crawler) -> HashSet<NodeId> {
    crawler
        .database()
        .snapshot()
        .visited
        .into_keys()
        .collect()
}

fn ids(list: &[&str]) -> HashSet<NodeId> {
    list.iter().map(|id| NodeId::from(*id)).collect()
}

#[tokio::test]
async fn test_diamond_records_each_node_once() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(GraphFetcher::new(&[
        ("A", &["B", "C"]),
        ("B", &["A", "D"]),
        ("C", &[]),
        ("D", &[]),
    ]));
    let mut crawler = new_crawler(&dir, fetcher.clone(), 3);
    crawler.start(NodeId::from("A")).await.unwrap();

    let status = run_to_completion(&mut crawler).await;

    assert_eq!(visited_ids(&crawler), ids(&["A", "B", "C", "D"]));
    assert_eq!(status.visited, 4);
    // "A" is linked twice but fetched once
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 4);
    assert!(crawler.is_completed());
}

#[tokio::test]
async fn test_rejected_node_halts_expansion() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        GraphFetcher::new(&[("S", &["X"]), ("X", &["Y"]), ("Y", &[])]).outside(&["X"]),
    );
    let mut crawler = new_crawler(&dir, fetcher.clone(), 2);
    crawler.start(NodeId::from("S")).await.unwrap();

    run_to_completion(&mut crawler).await;

    let db = crawler.database();
    assert_eq!(visited_ids(&crawler), ids(&["S"]));
    assert!(db.has_seen(&NodeId::from("X")));
    assert!(!db.has_seen(&NodeId::from("Y")));
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_nodes_are_discarded() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(GraphFetcher::new(&[("A", &["gone", "B"]), ("B", &[])]));
    let mut crawler = new_crawler(&dir, fetcher, 2);
    crawler.start(NodeId::from("A")).await.unwrap();

    run_to_completion(&mut crawler).await;

    let counts = crawler.database().counts();
    assert_eq!(counts.visited, 2);
    assert_eq!(counts.seen, 3);
    assert_eq!(counts.discarded(), 1);
}

#[tokio::test]
async fn test_conservation_holds_while_running() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(GraphFetcher::grid(12).with_delay(Duration::from_millis(1)));
    let mut crawler = new_crawler(&dir, fetcher, 4);
    crawler.start(NodeId::from("g0_0")).await.unwrap();

    let db = crawler.database().clone();
    let watcher = tokio::spawn(async move {
        for _ in 0..50 {
            let c = db.counts();
            assert_eq!(c.queued + c.in_flight + c.visited + c.discarded(), c.seen);
            assert!(c.in_flight <= 4);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });

    let status = run_to_completion(&mut crawler).await;
    watcher.await.unwrap();

    assert_eq!(status.visited, 144);
    assert_eq!(crawler.database().counts().seen, 144);
}

#[tokio::test]
async fn test_shutdown_is_bounded_by_in_flight_fetches() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(GraphFetcher::grid(30).with_delay(Duration::from_millis(50)));
    let mut crawler = new_crawler(&dir, fetcher.clone(), 4);
    crawler.start(NodeId::from("g0_0")).await.unwrap();

    let started = std::time::Instant::now();
    let status = crawler
        .run_until(tokio::time::sleep(Duration::from_millis(120)))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Requested at ~120 ms; each worker finishes at most one 50 ms fetch
    assert!(elapsed < Duration::from_secs(2), "shutdown took {:?}", elapsed);
    assert_eq!(status.in_flight, 0);
    assert!(status.queued > 0);
    assert!(!crawler.is_completed());

    let (saved, _) = read_snapshot(&dir.path().join("db.sqlite")).unwrap();
    assert_eq!(saved, crawler.database().snapshot());
    assert_eq!(
        fetcher.fetches.load(Ordering::SeqCst),
        saved.visited.len(),
        "every started fetch was completed and recorded"
    );
}

#[tokio::test]
async fn test_resume_reaches_same_result_as_uninterrupted_crawl() {
    let graph = || {
        GraphFetcher::grid(8)
            .outside(&["g3_3", "g3_4", "g4_3"])
            .with_delay(Duration::from_millis(5))
    };

    // Uninterrupted
    let reference_dir = TempDir::new().unwrap();
    let mut reference = new_crawler(&reference_dir, Arc::new(graph()), 3);
    reference.start(NodeId::from("g0_0")).await.unwrap();
    run_to_completion(&mut reference).await;
    let expected = visited_ids(&reference);

    // Interrupted, then resumed by a new crawler
    let dir = TempDir::new().unwrap();
    {
        let mut first = new_crawler(&dir, Arc::new(graph()), 3);
        first.start(NodeId::from("g0_0")).await.unwrap();
        first
            .run_until(tokio::time::sleep(Duration::from_millis(40)))
            .await
            .unwrap();
        assert!(!first.is_completed());
    }

    let mut second = new_crawler(&dir, Arc::new(graph()), 3);
    let source = second.resume(NodeId::from("g0_0")).await.unwrap();
    assert_eq!(source, LoadSource::Primary);
    run_to_completion(&mut second).await;

    assert_eq!(visited_ids(&second), expected);
    assert_eq!(expected.len(), 64 - 3);
}

#[tokio::test]
async fn test_backup_fallback_after_corrupt_primary() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(GraphFetcher::grid(20).with_delay(Duration::from_millis(2)));
    let mut crawler = new_crawler(&dir, fetcher, 2);
    crawler.start(NodeId::from("g0_0")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    crawler.backup().await.unwrap();
    crawler.stop_and_save().await.unwrap();

    let (backup, _) = read_snapshot(&dir.path().join("db.sqlite.bck")).unwrap();
    std::fs::write(dir.path().join("db.sqlite"), b"truncated").unwrap();

    let mut resumed = new_crawler(&dir, Arc::new(GraphFetcher::grid(20)), 2);
    let source = resumed.resume(NodeId::from("g0_0")).await.unwrap();
    assert_eq!(source, LoadSource::Backup);
    assert_eq!(resumed.database().snapshot().visited.len(), backup.visited.len());

    let status = run_to_completion(&mut resumed).await;
    assert_eq!(status.visited, 400);
}

const METADATA_A: &str = r#"{
    "Data": {"image_date": "2017-05", "copyright": "© 2017 Google"},
    "Location": {"panoId": "A", "lat": "50.083300", "lng": "14.416700"},
    "Links": [{"panoId": "B"}, {"panoId": "FAR"}]
}"#;

const METADATA_B: &str = r#"{
    "Data": {"image_date": "2018-09", "copyright": "© 2018 Google"},
    "Location": {"panoId": "B", "lat": "50.083400", "lng": "14.416800"},
    "Links": [{"panoId": "A"}, {"panoId": "U"}]
}"#;

const METADATA_U: &str = r#"{
    "Data": {"image_date": "2019-01", "copyright": "© Local Photographer"},
    "Location": {"panoId": "U", "lat": "50.083500", "lng": "14.416900"},
    "Links": [{"panoId": "B"}]
}"#;

const METADATA_FAR: &str = r#"{
    "Data": {"image_date": "2017-05", "copyright": "© 2017 Google"},
    "Location": {"panoId": "FAR", "lat": "50.200000", "lng": "14.416700"},
    "Links": [{"panoId": "BEYOND"}]
}"#;

async fn mount_metadata(server: &MockServer, id: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/cbk"))
        .and(query_param("panoid", id))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn test_config(base: &str, output: &std::path::Path, seed: &str) -> String {
    format!(
        r#"
[crawler]
workers = 2
backup-interval = 3600

[area]
shape = "circle"
origin = {{ lat = 50.0833, lng = 14.4167 }}
radius = 500.0

[seed]
{seed}

[output]
directory = "{output}"
label = "prague"

[fetcher]
metadata-url = "{base}/cbk"
timemachine-url = "{base}/photometa"
locate-url = "{base}/locate"
max-attempts = 2
retry-delay-ms = 1
"#,
        seed = seed,
        output = output.display(),
        base = base
    )
}

#[tokio::test]
async fn test_full_crawl_against_mock_service() {
    let server = MockServer::start().await;
    mount_metadata(&server, "A", METADATA_A).await;
    mount_metadata(&server, "B", METADATA_B).await;
    mount_metadata(&server, "U", METADATA_U).await;
    mount_metadata(&server, "FAR", METADATA_FAR).await;
    Mock::given(method("GET"))
        .and(path("/locate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"Location": {"panoId": "A"}}"#),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = parse_config(&test_config(
        &server.uri(),
        dir.path(),
        "location = { lat = 50.0833, lng = 14.4167 }",
    ))
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/photometa"))
        .respond_with(ResponseTemplate::new(200).set_body_string(")]}'\n[[1],[]]"))
        .mount(&server)
        .await;

    let fetcher = Arc::new(
        HttpFetcher::new(config.fetcher.clone())
            .unwrap()
            .with_raw_metadata(config.output.save_metadata),
    );
    let checkpointer = Checkpointer::from_output(&config.output);
    let status = crawl(&config, fetcher, checkpointer.clone(), true)
        .await
        .unwrap();

    // A and B recorded; U crawled through but not kept; FAR outside the circle
    assert_eq!(status.visited, 2);
    let (saved, _) = read_snapshot(checkpointer.primary_path()).unwrap();
    let recorded: HashSet<NodeId> = saved.visited.keys().cloned().collect();
    assert_eq!(recorded, ids(&["A", "B"]));
    assert!(saved.seen.contains(&NodeId::from("U")));
    assert!(saved.seen.contains(&NodeId::from("FAR")));
    assert!(!saved.seen.contains(&NodeId::from("BEYOND")));
    assert!(saved.queue.is_empty());

    let a = &saved.visited[&NodeId::from("A")];
    assert_eq!(a.date.map(|d| d.to_string()), Some("2017-05".to_string()));
    assert!(dir.path().join("prague").join("db.sqlite").exists());

    // Raw responses are archived for recorded panoramas only
    let session = dir.path().join("prague");
    assert_eq!(
        std::fs::read_to_string(session.join("_A").join("A_meta.json")).unwrap(),
        METADATA_A
    );
    assert_eq!(
        std::fs::read_to_string(session.join("_A").join("A_time_meta.json")).unwrap(),
        "[[1],[]]"
    );
    assert!(session.join("_B").join("B_meta.json").exists());
    assert!(!session.join("_U").exists());
    assert!(!session.join("_FA").exists());
}

#[tokio::test]
async fn test_unresolvable_seed_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/locate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = parse_config(&test_config(
        &server.uri(),
        dir.path(),
        "location = { lat = 0.0, lng = 0.0 }",
    ))
    .unwrap();

    let fetcher = Arc::new(HttpFetcher::new(config.fetcher.clone()).unwrap());
    let result = crawl(&config, fetcher, Checkpointer::from_output(&config.output), true).await;
    assert!(matches!(
        result,
        Err(panocrawl::CrawlError::SeedNotFound { .. })
    ));
    assert!(!dir.path().join("prague").join("db.sqlite").exists());
}

#[tokio::test]
async fn test_resume_needs_no_seed_lookup() {
    let server = MockServer::start().await;
    mount_metadata(&server, "A", METADATA_A).await;
    Mock::given(method("GET"))
        .and(path("/locate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = parse_config(&test_config(
        &server.uri(),
        dir.path(),
        "location = { lat = 50.0833, lng = 14.4167 }",
    ))
    .unwrap();

    let checkpointer = Checkpointer::from_output(&config.output);
    checkpointer
        .save(&CrawlDatabase::seeded(NodeId::from("A")))
        .unwrap();

    let fetcher = Arc::new(HttpFetcher::new(config.fetcher.clone()).unwrap());
    let status = crawl(&config, fetcher, checkpointer.clone(), false)
        .await
        .unwrap();

    assert_eq!(status.visited, 1);
    let (saved, _) = read_snapshot(checkpointer.primary_path()).unwrap();
    assert!(saved.visited.contains_key(&NodeId::from("A")));
}

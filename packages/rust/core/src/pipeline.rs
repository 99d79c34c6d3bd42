//! End-to-end enrichment run: input → identifiers → checkpoint → fetch → extract → CSV.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use siren_enrich_fetcher::{Extraction, PageFetcher, extract_record};
use siren_enrich_input::{InputFormat, Normalizer, has_existing_output, read_checkpoint, read_rows};
use siren_enrich_shared::{EnrichError, FetchConfig, Result, Siren};

use crate::sink::CsvSink;

/// Parameters of one enrichment run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Input feed (CSV or JSON lines).
    pub input: PathBuf,
    /// Output CSV, doubling as the checkpoint on resume.
    pub output: PathBuf,
    /// How to read `input`.
    pub format: InputFormat,
    /// Number of concurrent workers. Must be at least 1.
    pub workers: usize,
    /// Skip identifiers already in `output` and append to it.
    pub resume: bool,
    /// HTTP settings shared by every worker's fetcher.
    pub fetch: FetchConfig,
}

impl RunRequest {
    /// A request with one worker, no resume, and default fetch settings.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            format: InputFormat::Auto,
            workers: 1,
            resume: false,
            fetch: FetchConfig::default(),
        }
    }
}

/// An identifier that could not be enriched in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub siren: Siren,
    pub error: String,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Where rows were written.
    pub output: PathBuf,
    /// Input rows inspected.
    pub rows_read: usize,
    /// Unique identifiers found in the input.
    pub unique_identifiers: usize,
    /// Identifiers skipped because the checkpoint already had them.
    pub skipped_completed: usize,
    /// Identifiers handed to workers.
    pub dispatched: usize,
    /// Rows appended to the output.
    pub written: usize,
    /// Identifiers with no company page or an empty payload.
    pub not_found: usize,
    /// Identifiers that failed and will be retried by a resumed run.
    pub failures: Vec<Failure>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl RunSummary {
    /// True when every identifier was already done (or none were found).
    pub fn nothing_to_do(&self) -> bool {
        self.dispatched == 0
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the identifiers to fetch are known.
    fn targets_resolved(&self, total: usize, skipped: usize);
    /// Called after each identifier has been handled, whatever the outcome.
    fn identifier_done(&self, siren: &Siren, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn targets_resolved(&self, _total: usize, _skipped: usize) {}
    fn identifier_done(&self, _siren: &Siren, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// What a worker learned about one identifier.
enum Outcome {
    /// HTTP 404.
    NotFound,
    /// Page fetched; payload extraction result.
    Page(Extraction),
}

type Report = (Siren, Result<Outcome>);

/// Run one enrichment pass.
///
/// 1. Read the input and resolve unique identifiers
/// 2. Subtract the checkpoint when resuming
/// 3. Open the output (header on a fresh file)
/// 4. Fan identifiers out to workers, each with its own fetcher
/// 5. Append every non-empty record as it arrives
///
/// Per-identifier failures are collected in the summary. Configuration and
/// output errors abort the run.
#[instrument(skip_all, fields(input = %request.input.display(), output = %request.output.display()))]
pub async fn run_enrichment(
    request: &RunRequest,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let start = Instant::now();

    if request.workers == 0 {
        return Err(EnrichError::config("worker count must be at least 1"));
    }

    // --- Phase 1: Identifiers ---
    progress.phase("Reading input");
    let rows = read_rows(&request.input, request.format)?;
    let mut targets = Normalizer::new().collect_targets(&rows);
    drop(rows);

    let mut summary = RunSummary {
        output: request.output.clone(),
        rows_read: targets.rows_read,
        unique_identifiers: targets.len(),
        ..RunSummary::default()
    };

    let append = request.resume && has_existing_output(&request.output);
    if append {
        progress.phase("Reading checkpoint");
        let done = read_checkpoint(&request.output)?;
        summary.skipped_completed = targets.subtract(&done);
    }

    info!(
        rows = summary.rows_read,
        unique = summary.unique_identifiers,
        skipped = summary.skipped_completed,
        pending = targets.len(),
        "targets resolved"
    );
    progress.targets_resolved(targets.len(), summary.skipped_completed);

    if targets.is_empty() {
        info!("nothing to do");
        summary.elapsed = start.elapsed();
        progress.done(&summary);
        return Ok(summary);
    }

    // --- Phase 2: Output ---
    let mut sink = CsvSink::open(&request.output, append)?;

    // --- Phase 3: Workers ---
    progress.phase("Fetching company pages");
    let mut pending: Vec<Siren> = targets.sirens.into_iter().collect();
    // Workers pop from the back; process in ascending order.
    pending.sort_unstable_by(|a, b| b.cmp(a));
    let total = pending.len();
    summary.dispatched = total;

    let worker_count = request.workers.min(total);
    let fetchers = (0..worker_count)
        .map(|_| PageFetcher::new(&request.fetch))
        .collect::<Result<Vec<_>>>()?;

    let queue = Arc::new(Mutex::new(pending));
    let (tx, mut rx) = mpsc::unbounded_channel::<Report>();
    let mut workers = JoinSet::new();
    for (id, fetcher) in fetchers.into_iter().enumerate() {
        workers.spawn(worker(id, fetcher, Arc::clone(&queue), tx.clone()));
    }
    drop(tx);

    info!(workers = worker_count, identifiers = total, "workers started");

    // --- Phase 4: Single writer ---
    let mut handled = 0;
    while let Some((siren, result)) = rx.recv().await {
        handled += 1;
        match result {
            Ok(Outcome::Page(Extraction::Record(record))) if !record.is_empty() => {
                sink.write(&record.with_siren(&siren))?;
                summary.written += 1;
            }
            Ok(Outcome::NotFound | Outcome::Page(Extraction::NoPayload | Extraction::Record(_))) => {
                debug!(%siren, "no company data");
                summary.not_found += 1;
            }
            Ok(Outcome::Page(Extraction::Malformed(reason))) => {
                let err = EnrichError::parse(format!("malformed page payload: {reason}"));
                warn!(%siren, error = %err, "enrichment failed");
                summary.failures.push(Failure {
                    siren: siren.clone(),
                    error: err.to_string(),
                });
            }
            Err(err) => {
                warn!(%siren, error = %err, "enrichment failed");
                summary.failures.push(Failure {
                    siren: siren.clone(),
                    error: err.to_string(),
                });
            }
        }
        progress.identifier_done(&siren, handled, total);
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "worker task ended abnormally");
        }
    }

    sink.finish()?;

    summary.elapsed = start.elapsed();
    info!(
        written = summary.written,
        not_found = summary.not_found,
        failed = summary.failures.len(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run complete"
    );

    progress.done(&summary);
    Ok(summary)
}

/// Pull identifiers until the queue is empty or the orchestrator goes away.
async fn worker(
    id: usize,
    fetcher: PageFetcher,
    queue: Arc<Mutex<Vec<Siren>>>,
    tx: mpsc::UnboundedSender<Report>,
) {
    loop {
        let next = queue.lock().await.pop();
        let Some(siren) = next else {
            break;
        };

        let result = fetcher.fetch(&siren).await.map(|page| match page {
            Some(html) => Outcome::Page(extract_record(&html)),
            None => Outcome::NotFound,
        });

        if tx.send((siren, result)).is_err() {
            break;
        }
    }
    debug!(worker = id, "worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use siren_enrich_shared::OUTPUT_COLUMNS;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("se-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn request(server: &MockServer, dir: &std::path::Path, input: &str) -> RunRequest {
        let input_path = dir.join("input.csv");
        std::fs::write(&input_path, input).unwrap();
        RunRequest {
            fetch: FetchConfig::default()
                .with_base_url(&format!("{}/entreprise/", server.uri()))
                .unwrap()
                .with_pace(Duration::ZERO),
            ..RunRequest::new(input_path, dir.join("out.csv"))
        }
    }

    async fn serve(server: &MockServer, siren: &str, status: u16, body: &str, expected: u64) {
        Mock::given(path(format!("/entreprise/{siren}")))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn output_sirens(path: &std::path::Path) -> Vec<String> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .unwrap();
        let mut ids: Vec<String> = rdr
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn mixed_outcomes_are_accounted_for() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        let company = load_fixture("company.html");
        serve(&server, "111111111", 200, &company, 1).await;
        serve(&server, "222222222", 404, "", 1).await;
        serve(&server, "333333333", 503, "", 1).await;
        serve(&server, "444444444", 200, &load_fixture("no_payload.html"), 1).await;
        serve(&server, "555555555", 200, &load_fixture("malformed.html"), 1).await;

        let mut req = request(
            &server,
            &dir,
            "siren,name\n111111111,a\n222222222,b\n333333333,c\n444444444,d\n555555555,e\nnope,f\n",
        );
        req.workers = 3;

        let summary = run_enrichment(&req, &SilentProgress).await.unwrap();

        assert_eq!(summary.rows_read, 6);
        assert_eq!(summary.unique_identifiers, 5);
        assert_eq!(summary.dispatched, 5);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.not_found, 2);
        assert_eq!(summary.failures.len(), 2);
        assert!(!summary.nothing_to_do());

        let mut failed: Vec<&str> = summary.failures.iter().map(|f| f.siren.as_str()).collect();
        failed.sort();
        assert_eq!(failed, ["333333333", "555555555"]);

        // The requested identifier is written, not the one in the payload.
        assert_eq!(output_sirens(&req.output), ["111111111"]);
        let content = std::fs::read_to_string(&req.output).unwrap();
        assert!(content.starts_with("siren,denomination,"));
        assert!(content.contains("DANONE"));
        assert!(content.contains("SAINT-AFFRIQUE; FABER"));
    }

    #[tokio::test]
    async fn resume_fetches_only_missing_identifiers() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        serve(&server, "552100554", 200, "", 0).await;
        serve(&server, "732829320", 200, &load_fixture("partial.html"), 1).await;

        let mut req = request(&server, &dir, "siren\n552100554\n732829320\n");
        req.resume = true;
        std::fs::write(
            &req.output,
            format!("{}\n552100554,ACME,,,,,,,\n", OUTPUT_COLUMNS.join(",")),
        )
        .unwrap();

        let summary = run_enrichment(&req, &SilentProgress).await.unwrap();

        assert_eq!(summary.skipped_completed, 1);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.written, 1);
        assert_eq!(output_sirens(&req.output), ["552100554", "732829320"]);
    }

    #[tokio::test]
    async fn resume_with_everything_done_touches_nothing() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        serve(&server, "123456789", 200, "", 0).await;

        let mut req = request(&server, &dir, "registration_number\n123456789123\n");
        req.resume = true;
        let existing = "siren,denomination\n123456789,ACME\n";
        std::fs::write(&req.output, existing).unwrap();

        let summary = run_enrichment(&req, &SilentProgress).await.unwrap();

        assert!(summary.nothing_to_do());
        assert_eq!(summary.skipped_completed, 1);
        assert_eq!(std::fs::read_to_string(&req.output).unwrap(), existing);
    }

    #[tokio::test]
    async fn input_without_identifiers_does_not_create_output() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        let req = request(&server, &dir, "siren,name\n12345,short\n");

        let summary = run_enrichment(&req, &SilentProgress).await.unwrap();

        assert!(summary.nothing_to_do());
        assert_eq!(summary.rows_read, 1);
        assert!(!req.output.exists());
    }

    #[tokio::test]
    async fn fresh_run_replaces_previous_output() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        serve(&server, "552100554", 200, &load_fixture("partial.html"), 1).await;

        let req = request(&server, &dir, "siren\n552100554\n");
        std::fs::write(&req.output, "siren,denomination\n999999999,OLD\n").unwrap();

        run_enrichment(&req, &SilentProgress).await.unwrap();

        assert_eq!(output_sirens(&req.output), ["552100554"]);
    }

    #[tokio::test]
    async fn duplicate_rows_are_fetched_once() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        serve(&server, "552100554", 200, &load_fixture("partial.html"), 1).await;

        let mut req = request(
            &server,
            &dir,
            "siren,siret\n552100554,\n,55210055400013\n552 100 554,\n",
        );
        req.workers = 4;

        let summary = run_enrichment(&req, &SilentProgress).await.unwrap();

        assert_eq!(summary.unique_identifiers, 1);
        assert_eq!(summary.written, 1);
        assert_eq!(output_sirens(&req.output), ["552100554"]);
    }

    #[tokio::test]
    async fn pacing_is_per_worker() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        for id in ["100000001", "100000002", "100000003", "100000004"] {
            serve(&server, id, 404, "", 1).await;
        }

        let mut req = request(
            &server,
            &dir,
            "siren\n100000001\n100000002\n100000003\n100000004\n",
        );
        req.workers = 2;
        let pace = Duration::from_millis(200);
        req.fetch = req.fetch.with_pace(pace);

        let started = Instant::now();
        let summary = run_enrichment(&req, &SilentProgress).await.unwrap();

        let elapsed = started.elapsed();
        assert_eq!(summary.not_found, 4);
        // Two workers each pause twice; one shared limiter would need four pauses.
        assert!(elapsed >= pace * 2, "finished too early: {elapsed:?}");
        assert!(elapsed < pace * 4, "pauses were serialized: {elapsed:?}");
    }

    #[tokio::test]
    async fn resume_into_foreign_output_fails_before_fetching() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        serve(&server, "732829320", 200, "", 0).await;

        let mut req = request(&server, &dir, "siren\n552100554\n732829320\n");
        req.resume = true;
        let existing = "siren,denomination\n552100554,ACME\n";
        std::fs::write(&req.output, existing).unwrap();

        let err = run_enrichment(&req, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, EnrichError::Validation { .. }));
        assert_eq!(std::fs::read_to_string(&req.output).unwrap(), existing);
    }

    #[tokio::test]
    async fn unwritable_output_fails_before_fetching() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        serve(&server, "552100554", 200, "", 0).await;

        let mut req = request(&server, &dir, "siren\n552100554\n");
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        req.output = blocker.join("out.csv");

        let err = run_enrichment(&req, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, EnrichError::Io { .. }));
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let dir = temp_dir();
        let req = RunRequest::new(dir.join("absent.csv"), dir.join("out.csv"));
        let err = run_enrichment(&req, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, EnrichError::Io { .. }));
        assert!(!req.output.exists());
    }

    #[tokio::test]
    async fn zero_workers_is_rejected() {
        let dir = temp_dir();
        let mut req = RunRequest::new(dir.join("in.csv"), dir.join("out.csv"));
        req.workers = 0;
        let err = run_enrichment(&req, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, EnrichError::Config { .. }));
    }

    #[derive(Default)]
    struct CountingProgress {
        resolved: AtomicUsize,
        done: AtomicUsize,
        last: AtomicUsize,
    }

    impl ProgressReporter for CountingProgress {
        fn phase(&self, _name: &str) {}
        fn targets_resolved(&self, total: usize, _skipped: usize) {
            self.resolved.store(total, Ordering::SeqCst);
        }
        fn identifier_done(&self, _siren: &Siren, current: usize, _total: usize) {
            self.last.store(current, Ordering::SeqCst);
        }
        fn done(&self, _summary: &RunSummary) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn progress_sees_every_identifier() {
        let server = MockServer::start().await;
        let dir = temp_dir();
        serve(&server, "100000001", 404, "", 1).await;
        serve(&server, "100000002", 500, "", 1).await;
        serve(&server, "100000003", 200, &load_fixture("no_company.html"), 1).await;

        let mut req = request(&server, &dir, "siren\n100000001\n100000002\n100000003\n");
        req.workers = 2;
        let progress = CountingProgress::default();

        let summary = run_enrichment(&req, &progress).await.unwrap();

        assert_eq!(progress.resolved.load(Ordering::SeqCst), 3);
        assert_eq!(progress.last.load(Ordering::SeqCst), 3);
        assert_eq!(progress.done.load(Ordering::SeqCst), 1);
        assert_eq!(summary.not_found, 2);
        assert_eq!(summary.failures.len(), 1);
        // Header only: nothing had data.
        assert!(output_sirens(&req.output).is_empty());
    }
}

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fmt,
    io::Cursor,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    Layer,
};
use vision_data::{
    dataset::{CephImageParser, ImageCephDataset, ManifestRecord, Parser, RandomAccessDataset},
    storage::{BackendConfig, Connector, StorageBackend},
    Error,
};

const ROOT: &str = "mem://bucket";

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("ceph_dataset")
}

fn encode_png(value: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(4, 4, Rgb([value, value, value]));
    let mut buf = Cursor::new(vec![]);
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// The in-memory object store shared by all clients of a test.
#[derive(Debug, Default)]
struct Store {
    objects: HashMap<String, Vec<u8>>,
    /// The number of remaining failures per location.
    failures: HashMap<String, usize>,
    requests: Vec<String>,
    connections: usize,
}

#[derive(Debug)]
struct FlakyBackend {
    store: Arc<Mutex<Store>>,
}

impl StorageBackend for FlakyBackend {
    fn get(&self, location: &str) -> anyhow::Result<Vec<u8>> {
        let mut store = self.store.lock().unwrap();
        store.requests.push(location.to_owned());

        if let Some(remaining) = store.failures.get_mut(location) {
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("timed out");
            }
        }

        store
            .objects
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow::format_err!("not found"))
    }
}

/// Creates a store holding a distinct gray image per manifest entry.
fn store_for(records: &[&str]) -> Arc<Mutex<Store>> {
    let objects = records
        .iter()
        .enumerate()
        .map(|(index, name)| (format!("{}/{}", ROOT, name), encode_png(index as u8 * 10)))
        .collect();
    Arc::new(Mutex::new(Store {
        objects,
        ..Default::default()
    }))
}

fn connector(store: &Arc<Mutex<Store>>) -> Connector {
    let store = store.clone();
    Arc::new(move |_config: &BackendConfig| {
        store.lock().unwrap().connections += 1;
        let backend = FlakyBackend {
            store: store.clone(),
        };
        Ok(Box::new(backend) as Box<dyn StorageBackend>)
    })
}

fn fail(store: &Arc<Mutex<Store>>, name: &str, times: usize) {
    store
        .lock()
        .unwrap()
        .failures
        .insert(format!("{}/{}", ROOT, name), times);
}

fn requests(store: &Arc<Mutex<Store>>) -> Vec<String> {
    store.lock().unwrap().requests.clone()
}

/// A parser over the fixture manifest, `a.jpg` to `e.jpg`.
fn fixture_parser(store: &Arc<Mutex<Store>>) -> CephImageParser {
    CephImageParser::new(ROOT, fixture_dir(), BackendConfig::new("memory"))
        .unwrap()
        .with_connector(connector(store))
}

fn fixture_store() -> Arc<Mutex<Store>> {
    store_for(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"])
}

#[derive(Debug, Clone, PartialEq)]
struct Warning {
    index: Option<u64>,
    location: Option<String>,
}

#[derive(Default)]
struct WarningVisitor {
    index: Option<u64>,
    location: Option<String>,
}

impl Visit for WarningVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "index" {
            self.index = Some(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "location" {
            self.location = Some(format!("{:?}", value));
        }
    }
}

/// Collects warning events emitted on the current thread.
#[derive(Debug, Clone, Default)]
struct WarningLog {
    warnings: Arc<Mutex<Vec<Warning>>>,
}

impl<S> Layer<S> for WarningLog
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut visitor = WarningVisitor::default();
        event.record(&mut visitor);
        self.warnings.lock().unwrap().push(Warning {
            index: visitor.index,
            location: visitor.location,
        });
    }
}

fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<Warning>) {
    let log = WarningLog::default();
    let subscriber = tracing_subscriber::registry().with(log.clone());
    let output = tracing::subscriber::with_default(subscriber, f);
    let warnings = log.warnings.lock().unwrap().clone();
    (output, warnings)
}

fn gray_value(image: &RgbImage) -> u8 {
    image.get_pixel(0, 0)[0]
}

#[test]
fn manifest_fixture_test() {
    let store = fixture_store();
    let parser = fixture_parser(&store);

    assert_eq!(parser.len(), 5);
    assert_eq!(parser.num_classes(), 3);
    assert_eq!(parser.class_to_idx()["bird"], 2);
    assert_eq!(
        parser.records()[4],
        ManifestRecord {
            path: "e.jpg".into(),
            label: "fish".into()
        }
    );
    assert_eq!(parser.max_retries(), 50);
    assert!(!parser.is_connected());
    assert_eq!(store.lock().unwrap().connections, 0);
}

#[test]
fn invalid_annotation_dir_test() {
    let new_parser = |dir: &Path| CephImageParser::new(ROOT, dir, BackendConfig::new("memory"));
    let dir = tempfile::tempdir().unwrap();

    // no manifest files at all
    let missing = dir.path().join("missing");
    assert!(matches!(new_parser(&missing), Err(Error::Configuration(_))));

    // class map without a label file
    std::fs::copy(
        fixture_dir().join("class_to_idx.json"),
        dir.path().join("class_to_idx.json"),
    )
    .unwrap();
    assert!(matches!(new_parser(dir.path()), Err(Error::Configuration(_))));

    // a label line without a class
    std::fs::write(dir.path().join("label.txt"), "a.jpg cat\nb.jpg\n").unwrap();
    assert!(matches!(new_parser(dir.path()), Err(Error::Configuration(_))));

    std::fs::write(dir.path().join("label.txt"), "a.jpg cat\n").unwrap();
    let parser = new_parser(dir.path()).unwrap();
    assert_eq!(parser.len(), 1);
}

#[test]
fn first_attempt_success_test() {
    let store = fixture_store();
    let mut parser = fixture_parser(&store);

    let (result, warnings) = capture_warnings(|| parser.get(1));
    let (image, class) = result.unwrap();

    assert_eq!(class, 1);
    assert_eq!(gray_value(&image), 10);
    assert_eq!(parser.consecutive_errors(), 0);
    assert!(warnings.is_empty());
    assert_eq!(requests(&store), vec![format!("{}/b.jpg", ROOT)]);
}

#[test]
fn connect_once_test() {
    let store = fixture_store();
    let mut parser = fixture_parser(&store);

    parser.ensure_connected().unwrap();
    parser.ensure_connected().unwrap();
    parser.get(0).unwrap();
    parser.get(1).unwrap();
    assert_eq!(store.lock().unwrap().connections, 1);

    // every worker opens its own client
    let mut worker = parser.clone();
    assert!(!worker.is_connected());
    worker.get(2).unwrap();
    assert_eq!(store.lock().unwrap().connections, 2);
}

#[test]
fn skip_failures_with_wraparound_test() {
    let store = fixture_store();
    fail(&store, "d.jpg", usize::MAX);
    fail(&store, "e.jpg", usize::MAX);
    let mut parser = fixture_parser(&store);

    let (result, warnings) = capture_warnings(|| parser.get(3));
    let (image, class) = result.unwrap();

    // d.jpg and e.jpg fail, then the scan wraps around to a.jpg
    assert_eq!(class, 0);
    assert_eq!(gray_value(&image), 0);
    assert_eq!(parser.consecutive_errors(), 0);
    assert_eq!(
        warnings,
        vec![
            Warning {
                index: Some(3),
                location: Some(format!("{}/d.jpg", ROOT)),
            },
            Warning {
                index: Some(4),
                location: Some(format!("{}/e.jpg", ROOT)),
            },
        ]
    );
}

#[test]
fn exhausted_retries_test() {
    let store = fixture_store();
    for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"] {
        fail(&store, name, usize::MAX);
    }
    let mut parser = fixture_parser(&store).with_max_retries(3);

    let (result, warnings) = capture_warnings(|| parser.get(1));
    let expected = format!("{}/d.jpg", ROOT);
    assert!(matches!(result, Err(Error::Fetch { ref location, .. }) if *location == expected));
    assert_eq!(warnings.len(), 3);
    assert_eq!(parser.consecutive_errors(), 3);
    assert_eq!(requests(&store).len(), 3);

    // the counter is only reset by a success
    let (result, warnings) = capture_warnings(|| parser.get(0));
    assert!(matches!(result, Err(Error::Fetch { .. })));
    assert_eq!(warnings.len(), 1);
    assert_eq!(parser.consecutive_errors(), 4);

    fail(&store, "a.jpg", 0);
    let (result, warnings) = capture_warnings(|| parser.get(0));
    assert_eq!(result.unwrap().1, 0);
    assert!(warnings.is_empty());
    assert_eq!(parser.consecutive_errors(), 0);
}

#[test]
fn decode_failure_is_retried_test() {
    let store = fixture_store();
    store
        .lock()
        .unwrap()
        .objects
        .insert(format!("{}/a.jpg", ROOT), b"not an image".to_vec());
    let mut parser = fixture_parser(&store);

    let (result, warnings) = capture_warnings(|| parser.get(0));
    assert_eq!(result.unwrap().1, 1);
    assert_eq!(warnings.len(), 1);

    let mut parser = fixture_parser(&store).with_max_retries(1);
    let result = parser.get(0);
    assert!(matches!(result, Err(Error::Decode { .. })));
    assert!(result.unwrap_err().is_retryable());
}

#[test]
fn unknown_label_test() {
    let store = fixture_store();
    let mut parser = fixture_parser(&store);

    let (result, warnings) = capture_warnings(|| parser.get(4));
    assert!(matches!(result, Err(Error::UnknownLabel { ref label }) if label == "fish"));
    assert!(warnings.is_empty());
    assert_eq!(parser.consecutive_errors(), 0);
    assert_eq!(requests(&store).len(), 1);
}

#[test]
fn out_of_range_test() {
    let store = fixture_store();
    let mut parser = fixture_parser(&store);

    let result = parser.get(5);
    assert!(matches!(
        result,
        Err(Error::IndexOutOfRange { index: 5, len: 5 })
    ));
    assert!(requests(&store).is_empty());
}

#[test]
fn filename_matches_fetched_location_test() {
    let store = fixture_store();
    let mut parser = fixture_parser(&store);

    for index in 0..4 {
        parser.get(index).unwrap();
        let fetched = requests(&store).last().cloned().unwrap();
        assert_eq!(parser.filename(index, false, false).unwrap(), fetched);
        assert_eq!(parser.filename(index, false, true).unwrap(), fetched);
    }

    assert_eq!(
        parser.filenames(true, false).unwrap(),
        vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]
    );
}

fn two_sample_parser(store: &Arc<Mutex<Store>>) -> CephImageParser {
    let class_to_idx: IndexMap<String, usize> = [("cat".to_owned(), 0), ("dog".to_owned(), 1)]
        .into_iter()
        .collect();
    let samples = ["a.jpg cat", "b.jpg dog"]
        .iter()
        .map(|line| line.parse().unwrap())
        .collect();
    CephImageParser::from_manifest(ROOT, class_to_idx, samples, BackendConfig::new("memory"))
        .with_connector(connector(store))
}

#[test]
fn transient_failure_scenario_test() {
    let store = store_for(&["a.jpg", "b.jpg"]);
    fail(&store, "a.jpg", 1);
    let mut parser = two_sample_parser(&store);

    let (result, warnings) = capture_warnings(|| parser.get(0));
    let (image, class) = result.unwrap();
    assert_eq!(class, 1);
    assert_eq!(gray_value(&image), 10);
    assert_eq!(parser.consecutive_errors(), 0);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].index, Some(0));

    // a.jpg recovered
    let (image, class) = parser.get(0).unwrap();
    assert_eq!((gray_value(&image), class), (0, 0));
}

#[test]
fn bounded_failure_scenario_test() {
    let store = store_for(&["a.jpg", "b.jpg"]);
    fail(&store, "a.jpg", usize::MAX);
    fail(&store, "b.jpg", usize::MAX);
    let mut parser = two_sample_parser(&store).with_max_retries(2);

    let (result, warnings) = capture_warnings(|| parser.get(0));
    assert!(matches!(result, Err(Error::Fetch { .. })));
    assert_eq!(warnings.len(), 2);
    assert_eq!(
        requests(&store),
        vec![format!("{}/a.jpg", ROOT), format!("{}/b.jpg", ROOT)]
    );
}

#[test]
fn dataset_adapter_test() {
    let store = fixture_store();
    fail(&store, "a.jpg", 1);
    let parser = fixture_parser(&store);
    let mut dataset = ImageCephDataset::with_parser(parser, None);

    assert_eq!(dataset.num_records(), 5);
    assert_eq!(
        RandomAccessDataset::filename(&dataset, 2),
        Some(format!("{}/c.jpg", ROOT))
    );

    let record = dataset.nth(0).unwrap();
    assert_eq!(record.target, 1);
    assert_eq!(record.image.shape(), &[3, 4, 4]);
    approx::assert_abs_diff_eq!(record.image[[1, 2, 3]], 10.0 / 255.0, epsilon = 1e-6);

    assert!(matches!(
        dataset.nth(4),
        Err(Error::UnknownLabel { .. })
    ));
}

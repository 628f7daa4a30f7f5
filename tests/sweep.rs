use anyhow::Result;
use bias_sweep::combinations::{generate_parameter_combinations, ParameterRecord};
use bias_sweep::output::ResultWriter;
use bias_sweep::runner::run_sweep;
use bias_sweep::scoring::{ScoreFailure, ScoreResult, Scorer};
use bias_sweep::template::Template;
use bias_sweep::words::{load_word_groups, WordGroup};
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const TEMPLATE: &str = "Dear professor, I am {name} from {country}. Regards, {name}";

/// Deterministic stand-in for the oracle: scores by message length, fails on
/// "Atlantis", panics on "Lemuria".
struct FakeScorer {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl FakeScorer {
    fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        }
    }
}

impl Scorer for FakeScorer {
    fn score(&self, message: &str) -> ScoreResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if message.contains("Lemuria") {
            panic!("fake oracle crashed");
        }
        if message.contains("Atlantis") {
            return Err(ScoreFailure::NoToolUse {
                stop_reason: Some("end_turn".to_string()),
            });
        }
        Ok((message.len() % 101) as i64)
    }
}

fn groups(sizes: &[usize], prefix: &str) -> Vec<WordGroup> {
    sizes
        .iter()
        .enumerate()
        .map(|(g, &n)| {
            WordGroup::new(
                format!("{prefix}_group{g}"),
                (0..n).map(|w| format!("{prefix}{g}_{w}")),
            )
        })
        .collect()
}

type Entry = (ParameterRecord, Option<i64>);

fn multiset(records: &[Entry]) -> HashMap<Entry, usize> {
    let mut counts = HashMap::new();
    for entry in records {
        *counts.entry(entry.clone()).or_insert(0) += 1;
    }
    counts
}

#[test]
fn record_count_is_product_of_word_totals() {
    let targets = groups(&[2, 3], "t");
    let attributes = groups(&[1, 2], "a");
    let records = generate_parameter_combinations("name", "country", &targets, &attributes);
    assert_eq!(records.len(), 15);
}

#[test]
fn every_record_yields_exactly_one_result_despite_failures() -> Result<()> {
    let targets = vec![WordGroup::new("names", ["Alex", "Sam"])];
    let attributes = vec![
        WordGroup::new("real", ["Bangladesh", "Peru"]),
        WordGroup::new("myth", ["Atlantis", "Lemuria"]),
    ];
    let records = generate_parameter_combinations("name", "country", &targets, &attributes);
    let template = Template::parse(TEMPLATE)?;
    let scorer = FakeScorer::new(Duration::ZERO);

    let report = run_sweep(records.clone(), &template, &scorer, 3, |_| {})?;

    assert_eq!(scorer.calls.load(Ordering::SeqCst), records.len());
    assert_eq!(report.results.len(), records.len());
    assert_eq!(report.scored, 4);
    assert_eq!(report.failed, 4);
    assert_eq!(report.failures_by_kind.get("no_tool_use"), Some(&2));
    assert_eq!(report.failures_by_kind.get("task_panicked"), Some(&2));

    for record in &records {
        let matching: Vec<_> = report
            .results
            .iter()
            .filter(|r| &r.params == record)
            .collect();
        assert_eq!(matching.len(), 1, "record {record:?}");
        let result = matching[0];
        match record.attribute_word.as_str() {
            "Atlantis" | "Lemuria" => assert_eq!(result.score_cell(), "NA"),
            _ => assert!(result.score().is_some()),
        }
    }

    let panicked = report
        .results
        .iter()
        .find(|r| r.params.attribute_word == "Lemuria")
        .unwrap();
    assert_eq!(
        panicked.outcome,
        Err(ScoreFailure::TaskPanicked("fake oracle crashed".to_string()))
    );
    Ok(())
}

#[test]
fn parallelism_does_not_change_result_multiset() -> Result<()> {
    let targets = groups(&[2], "t");
    let attributes = groups(&[3, 2], "a");
    let records = generate_parameter_combinations("name", "country", &targets, &attributes);
    assert_eq!(records.len(), 10);
    let template = Template::parse(TEMPLATE)?;

    let mut runs = Vec::new();
    for parallelism in [1, 5] {
        let scorer = FakeScorer::new(Duration::from_millis(2));
        let report = run_sweep(records.clone(), &template, &scorer, parallelism, |_| {})?;
        let entries: Vec<_> = report
            .results
            .iter()
            .map(|r| (r.params.clone(), r.score()))
            .collect();
        runs.push(multiset(&entries));
    }
    assert_eq!(runs[0], runs[1]);
    Ok(())
}

#[test]
fn in_flight_requests_never_exceed_parallelism() -> Result<()> {
    let targets = groups(&[4], "t");
    let attributes = groups(&[3], "a");
    let records = generate_parameter_combinations("name", "country", &targets, &attributes);
    let template = Template::parse(TEMPLATE)?;

    for parallelism in [1, 3] {
        let scorer = FakeScorer::new(Duration::from_millis(10));
        let report = run_sweep(records.clone(), &template, &scorer, parallelism, |_| {})?;
        assert_eq!(report.results.len(), 12);
        let peak = scorer.max_in_flight.load(Ordering::SeqCst);
        assert!(
            (1..=parallelism).contains(&peak),
            "peak={peak} parallelism={parallelism}"
        );
    }
    Ok(())
}

#[test]
fn files_to_csv_end_to_end() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let target_path = tmp.path().join("targets.json");
    let attribute_path = tmp.path().join("attributes.json");
    let template_path = tmp.path().join("template.txt");
    let csv_path = tmp.path().join("out/results.csv");
    fs::write(&target_path, r#"{"female": ["Mary"], "male": ["John", "Wei"]}"#)?;
    fs::write(
        &attribute_path,
        r#"{"north": ["Korea, Republic of"], "myth": ["Atlantis"]}"#,
    )?;
    fs::write(&template_path, TEMPLATE)?;

    let template = Template::load(&template_path)?;
    template.check_labels("name", "country")?;
    let records = generate_parameter_combinations(
        "name",
        "country",
        &load_word_groups(&target_path)?,
        &load_word_groups(&attribute_path)?,
    );
    let mut writer = ResultWriter::create(&csv_path)?;

    let scorer = FakeScorer::new(Duration::ZERO);
    let report = run_sweep(records, &template, &scorer, 2, |_| {})?;
    assert_eq!(writer.write_results(&report.results)?, 6);
    drop(writer);

    let csv = fs::read_to_string(&csv_path)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "target_type,attribute_type,target_word_name,attribute_word_name,target_word,attribute_word,score"
    );
    assert_eq!(lines.len(), 7);
    assert_eq!(lines.iter().filter(|l| l.ends_with(",NA")).count(), 3);
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.contains("\"Korea, Republic of\""))
            .count(),
        3
    );
    Ok(())
}

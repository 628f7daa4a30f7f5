use crate::combinations::ParameterRecord;
use crate::scoring::{ScoreFailure, ScoreResult, Scorer};
use crate::template::Template;
use anyhow::{anyhow, Context, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

/// Written to the score column when no score could be obtained.
pub const NA: &str = "NA";

/// A parameter record together with what the oracle made of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    pub params: ParameterRecord,
    pub outcome: ScoreResult,
}

impl ResultRecord {
    pub fn score(&self) -> Option<i64> {
        self.outcome.as_ref().ok().copied()
    }

    pub fn score_cell(&self) -> String {
        match &self.outcome {
            Ok(score) => score.to_string(),
            Err(_) => NA.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Clone, Debug)]
pub struct SweepReport {
    /// One entry per submitted record, in completion order.
    pub results: Vec<ResultRecord>,
    pub scored: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
}

/// Score every record on a pool of exactly `parallelism` threads.
///
/// Every prompt is rendered before the first request goes out, so a template problem
/// aborts the sweep up front. After that nothing aborts it: scorer failures and worker
/// panics are recorded against their record and the sweep continues. `on_progress` is
/// called on the calling thread after each completion.
pub fn run_sweep<S, F>(
    records: Vec<ParameterRecord>,
    template: &Template,
    scorer: &S,
    parallelism: usize,
    mut on_progress: F,
) -> Result<SweepReport>
where
    S: Scorer + ?Sized,
    F: FnMut(Progress),
{
    if parallelism == 0 {
        return Err(anyhow!("parallelism must be >= 1"));
    }

    let prompts = records
        .iter()
        .map(|record| {
            template.render_record(record).with_context(|| {
                format!(
                    "failed rendering template for {}={} {}={}",
                    record.target_type,
                    record.target_word,
                    record.attribute_type,
                    record.attribute_word
                )
            })
        })
        .collect::<Result<Vec<String>>>()?;

    let total = records.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .thread_name(|idx| format!("scorer-{idx}"))
        .build()
        .context("failed to build rayon threadpool")?;

    tracing::info!(total, parallelism, "starting sweep");

    let mut pending: Vec<Option<ParameterRecord>> = records.into_iter().map(Some).collect();
    let mut results = Vec::with_capacity(total);
    let (tx, rx) = mpsc::channel::<(usize, ScoreResult)>();

    pool.in_place_scope(|scope| {
        for (idx, prompt) in prompts.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| scorer.score(prompt)))
                    .unwrap_or_else(|payload| {
                        Err(ScoreFailure::TaskPanicked(panic_message(payload.as_ref())))
                    });
                // The receiver outlives every job in this scope.
                let _ = tx.send((idx, outcome));
            });
        }
        drop(tx);

        for (idx, outcome) in rx.iter() {
            let Some(params) = pending.get_mut(idx).and_then(Option::take) else {
                tracing::error!(idx, "duplicate completion for record");
                continue;
            };
            if let Err(failure) = &outcome {
                log_failure(&params, failure);
            }
            results.push(ResultRecord { params, outcome });
            on_progress(Progress {
                completed: results.len(),
                total,
            });
        }
    });

    debug_assert_eq!(results.len(), total);

    let mut failures_by_kind = BTreeMap::new();
    for result in &results {
        if let Err(failure) = &result.outcome {
            *failures_by_kind
                .entry(failure.kind().to_string())
                .or_insert(0usize) += 1;
        }
    }
    let failed = failures_by_kind.values().sum::<usize>();
    let scored = results.len() - failed;

    tracing::info!(total, scored, failed, "sweep finished");

    Ok(SweepReport {
        results,
        scored,
        failed,
        failures_by_kind,
    })
}

fn log_failure(params: &ParameterRecord, failure: &ScoreFailure) {
    match failure {
        ScoreFailure::TaskPanicked(_) => tracing::error!(
            target_word = %params.target_word,
            attribute_word = %params.attribute_word,
            "scoring task failed, recording {NA}: {failure}"
        ),
        _ => tracing::warn!(
            target_word = %params.target_word,
            attribute_word = %params.attribute_word,
            kind = failure.kind(),
            "no score, recording {NA}: {failure}"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: &str, attribute: &str) -> ParameterRecord {
        ParameterRecord {
            target_type: "name".into(),
            attribute_type: "country".into(),
            target_word_name: "t".into(),
            target_word: target.into(),
            attribute_word_name: "a".into(),
            attribute_word: attribute.into(),
        }
    }

    struct LengthScorer;

    impl Scorer for LengthScorer {
        fn score(&self, message: &str) -> ScoreResult {
            Ok(message.len() as i64)
        }
    }

    #[test]
    fn score_cell_uses_sentinel_for_failures() {
        let ok = ResultRecord {
            params: record("Alex", "Peru"),
            outcome: Ok(0),
        };
        assert_eq!(ok.score_cell(), "0");
        assert_eq!(ok.score(), Some(0));

        let failed = ResultRecord {
            params: record("Alex", "Peru"),
            outcome: Err(ScoreFailure::Transport("reset".into())),
        };
        assert_eq!(failed.score_cell(), "NA");
        assert_eq!(failed.score(), None);
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let template = Template::parse("{name}").unwrap();
        let err = run_sweep(vec![record("A", "B")], &template, &LengthScorer, 0, |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("parallelism"));
    }

    #[test]
    fn render_failure_aborts_before_scoring() {
        struct MustNotRun;
        impl Scorer for MustNotRun {
            fn score(&self, _: &str) -> ScoreResult {
                panic!("scorer must not be called");
            }
        }

        let template = Template::parse("{name} {city}").unwrap();
        assert!(run_sweep(vec![record("A", "B")], &template, &MustNotRun, 2, |_| {}).is_err());
    }

    #[test]
    fn progress_counts_up_to_total() {
        let template = Template::parse("{name}-{country}").unwrap();
        let records = vec![record("A", "B"), record("CC", "D"), record("E", "FFF")];
        let mut seen = Vec::new();
        let report = run_sweep(records, &template, &LengthScorer, 2, |p| seen.push(p)).unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.scored, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(
            seen.iter().map(|p| p.completed).collect::<Vec<_>>(),
            [1, 2, 3]
        );
        assert!(seen.iter().all(|p| p.total == 3));

        let mut scores: Vec<i64> = report.results.iter().filter_map(|r| r.score()).collect();
        scores.sort_unstable();
        assert_eq!(scores, [3, 4, 5]);
    }

    #[test]
    fn empty_sweep_completes() {
        let template = Template::parse("{name}").unwrap();
        let report = run_sweep(Vec::new(), &template, &LengthScorer, 3, |_| {}).unwrap();
        assert!(report.results.is_empty());
    }
}

use anyhow::{anyhow, Context, Result};
use bias_sweep::combinations::{generate_parameter_combinations, ParameterRecord};
use bias_sweep::output::ResultWriter;
use bias_sweep::runner::{run_sweep, Progress};
use bias_sweep::scenario::Scenario;
use bias_sweep::scoring::{ClientConfig, MessagesClient, Provider};
use bias_sweep::template::{Binding, Bindings, Template};
use bias_sweep::util::{ensure_parent_dir, parse_labels};
use bias_sweep::words::{load_word_groups, total_words};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bias-sweep")]
#[command(
    about = "Substitute target/attribute word combinations into a message template and record an LLM's likelihood score for each"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score every target x attribute combination and write a CSV
    Run {
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        scenario: ScenarioArgs,
        /// Number of parallel requests to make
        #[arg(long, default_value_t = 5)]
        parallel_requests: usize,
        /// Output CSV filename
        #[arg(long, default_value = "analysis_results.csv")]
        csv_filename: PathBuf,
        #[arg(long, value_enum, default_value_t = CliProvider::Bedrock)]
        provider: CliProvider,
        /// Model id (defaults per provider)
        #[arg(long)]
        model: Option<String>,
        /// Bedrock region (falls back to AWS_REGION, then us-west-2)
        #[arg(long)]
        region: Option<String>,
        /// Override the API base URL (e.g. a gateway or local mock)
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long, default_value_t = 500)]
        max_tokens: u32,
        /// Per-request timeout; the HTTP client default applies when unset
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print the ordered combination list as JSON
    Combinations {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Render the full user prompt for one target/attribute pair
    Render {
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        scenario: ScenarioArgs,
        #[arg(long)]
        target_word: String,
        #[arg(long)]
        attribute_word: String,
    },
    /// List built-in scenarios
    Scenarios,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Path to the message template file (matches the default cover-letter scenario)
    #[arg(long, default_value = "data/cover_letter_template.txt")]
    template_path: PathBuf,
    /// Path to the target words JSON file
    #[arg(long, default_value = "data/gender_target_words.json")]
    target_words_path: PathBuf,
    /// Path to the attribute words JSON file
    #[arg(long, default_value = "data/global_north_vs_south_attribute_words.json")]
    attribute_words_path: PathBuf,
    /// Template placeholder filled with target words
    #[arg(long, default_value = "name")]
    target_type: String,
    /// Template placeholder filled with attribute words
    #[arg(long, default_value = "country")]
    attribute_type: String,
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Built-in scenario preset
    #[arg(long, default_value = "cover-letter")]
    scenario: String,
    /// JSON scenario file; replaces the preset
    #[arg(long)]
    scenario_file: Option<PathBuf>,
    #[arg(long)]
    score_min: Option<i64>,
    #[arg(long)]
    score_max: Option<i64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliProvider {
    Anthropic,
    Bedrock,
}

impl From<CliProvider> for Provider {
    fn from(value: CliProvider) -> Self {
        match value {
            CliProvider::Anthropic => Provider::Anthropic,
            CliProvider::Bedrock => Provider::Bedrock,
        }
    }
}

impl ScenarioArgs {
    fn resolve(&self) -> Result<Scenario> {
        let scenario = match &self.scenario_file {
            Some(path) => Scenario::load(path)?,
            None => Scenario::preset(&self.scenario).ok_or_else(|| {
                anyhow!(
                    "unknown scenario '{}'. available: {}",
                    self.scenario,
                    Scenario::preset_ids().join(", ")
                )
            })?,
        };
        scenario.with_scale(self.score_min, self.score_max)
    }
}

struct Inputs {
    template: Template,
    records: Vec<ParameterRecord>,
    target_type: String,
    attribute_type: String,
}

impl InputArgs {
    fn load(&self) -> Result<Inputs> {
        let (target_type, attribute_type) =
            parse_labels(&self.target_type, &self.attribute_type)?;
        let template = Template::load(&self.template_path)?;
        template
            .check_labels(&target_type, &attribute_type)
            .with_context(|| {
                format!("template {} is unusable", self.template_path.display())
            })?;

        let target_groups = load_word_groups(&self.target_words_path)?;
        let attribute_groups = load_word_groups(&self.attribute_words_path)?;
        tracing::info!(
            target_groups = target_groups.len(),
            target_words = total_words(&target_groups),
            attribute_groups = attribute_groups.len(),
            attribute_words = total_words(&attribute_groups),
            "loaded word groups"
        );

        let records = generate_parameter_combinations(
            &target_type,
            &attribute_type,
            &target_groups,
            &attribute_groups,
        );
        Ok(Inputs {
            template,
            records,
            target_type,
            attribute_type,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Run {
            inputs,
            scenario,
            parallel_requests,
            csv_filename,
            provider,
            model,
            region,
            base_url,
            max_tokens,
            timeout_secs,
        } => {
            if parallel_requests == 0 {
                return Err(anyhow!("--parallel-requests must be >= 1"));
            }
            let Inputs {
                template, records, ..
            } = inputs.load()?;
            let scenario = scenario.resolve()?;

            let mut config = ClientConfig::from_env(provider.into())?;
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(region) = region {
                config.region = region;
            }
            config.base_url = base_url;
            config.max_tokens = max_tokens;
            config.timeout = timeout_secs.map(Duration::from_secs);
            let client = MessagesClient::new(config, scenario)?;

            let mut writer = ResultWriter::create(&csv_filename)?;

            let report = run_sweep(
                records,
                &template,
                &client,
                parallel_requests,
                print_progress,
            )?;
            eprintln!();

            let rows = writer.write_results(&report.results)?;

            println!("scenario={}", client.scenario().id);
            println!("rows={rows}");
            println!("scored={}", report.scored);
            println!("na={}", report.failed);
            for (kind, count) in &report.failures_by_kind {
                println!("na_{kind}={count}");
            }
            println!("output={}", csv_filename.display());
        }
        Commands::Combinations { inputs, output } => {
            let Inputs { records, .. } = inputs.load()?;
            let encoded = serde_json::to_vec_pretty(&records)?;
            if let Some(path) = output {
                ensure_parent_dir(&path)?;
                fs::write(&path, encoded)
                    .with_context(|| format!("failed writing {}", path.display()))?;
                println!("wrote={}", path.display());
                println!("combinations={}", records.len());
            } else {
                println!("{}", String::from_utf8_lossy(&encoded));
            }
        }
        Commands::Render {
            inputs,
            scenario,
            target_word,
            attribute_word,
        } => {
            let Inputs {
                template,
                target_type,
                attribute_type,
                ..
            } = inputs.load()?;
            let scenario = scenario.resolve()?;
            let message = template.render(&Bindings {
                target: Binding {
                    label: &target_type,
                    value: &target_word,
                },
                attribute: Binding {
                    label: &attribute_type,
                    value: &attribute_word,
                },
            })?;
            println!("--- system ---");
            println!("{}", scenario.system_prompt);
            println!("--- user ---");
            print!("{}", scenario.user_prompt(&message));
            println!("--- tool ---");
            println!("{}", serde_json::to_string_pretty(&scenario.tool())?);
        }
        Commands::Scenarios => {
            for scenario in Scenario::presets() {
                println!(
                    "{:14} scale={}..={} {}",
                    scenario.id, scenario.score_min, scenario.score_max, scenario.tool_description
                );
            }
        }
    }

    Ok(())
}

fn print_progress(progress: Progress) {
    let mut stderr = io::stderr().lock();
    let _ = write!(
        stderr,
        "\rProcessing prompts: {}/{}",
        progress.completed, progress.total
    );
    let _ = stderr.flush();
}

//! `taskloop run`: execute a task file as one batch.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::agents::{
    ChatCompletionsClient, ChatCompletionsConfig, CliAgentFactory, ScriptedAgentFactory,
    ScriptedEvaluator,
};
use crate::cli::output::{output, CommandOutput, ProgressReporter, TableFormatter};
use crate::domain::models::{AgentKind, Config, RunSummary, TaskOutcome, UsageReport};
use crate::domain::ports::{AgentFactory, Evaluator, StatusReporter};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::TracingStatusReporter;
use crate::infrastructure::task_source;
use crate::services::BatchRunner;

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Task file (defaults to `tasks_file` from config)
    #[arg(short, long)]
    pub tasks: Option<PathBuf>,

    /// Maximum number of tasks running at once
    #[arg(short = 'n', long)]
    pub concurrency: Option<usize>,

    /// Iteration cap per task
    #[arg(short = 'i', long)]
    pub max_iterations: Option<u32>,

    /// Where to write the run snapshot (defaults to `output_path` from config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run only the task at this index of the task file
    #[arg(long)]
    pub task: Option<usize>,

    /// Use scripted in-memory agents instead of real ones
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(tasks) = &self.tasks {
            config.tasks_file = tasks.display().to_string();
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent = concurrency;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        if let Some(output) = &self.output {
            config.output_path = output.display().to_string();
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub summary: RunSummary,
    pub results: Vec<TaskOutcome>,
    pub output_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut lines = vec![
            "Run summary:".to_string(),
            formatter.format_summary(&self.summary),
            String::new(),
            "Tasks:".to_string(),
            formatter.format_outcomes(&self.results),
            String::new(),
        ];
        match &self.persist_error {
            Some(err) => lines.push(format!(
                "{} results were not saved to {}: {err}",
                console::style("Warning:").yellow().bold(),
                self.output_path
            )),
            None => lines.push(format!("Results saved to {}", self.output_path)),
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, json: bool, config_path: Option<&Path>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    args.apply_overrides(&mut config);
    ConfigLoader::validate(&config).context("Invalid command-line overrides")?;

    let descriptors = match args.task {
        Some(index) => vec![task_source::load_task(&config.tasks_file, index)?],
        None => task_source::load_tasks(&config.tasks_file)?,
    };

    let (factory, evaluator) = collaborators(&config, args.dry_run)?;
    tracing::info!(
        agent = factory.name(),
        tasks = descriptors.len(),
        max_concurrent = config.max_concurrent,
        max_iterations = config.max_iterations,
        dry_run = args.dry_run,
        "starting batch"
    );

    let progress = Arc::new(if json {
        ProgressReporter::hidden(descriptors.len())
    } else {
        ProgressReporter::new(descriptors.len())
    });
    let reporter: Arc<dyn StatusReporter> = {
        let progress = Arc::clone(&progress);
        Arc::new(move |task_index: usize, message: &str| {
            progress.report(task_index, message);
            TracingStatusReporter.report(task_index, message);
        })
    };

    let runner = BatchRunner::from_config(&config, factory, evaluator, reporter);
    let run = runner.run(descriptors).await.context("Batch run failed")?;
    progress.finish();

    let persist_error = match run.persist(Path::new(&config.output_path)).await {
        Ok(_) => None,
        Err(err) => {
            tracing::error!(path = %config.output_path, error = %err, "failed to persist results");
            Some(err.to_string())
        }
    };

    output(
        &RunOutput {
            summary: run.summary,
            results: run.outcomes,
            output_path: config.output_path,
            persist_error,
        },
        json,
    );
    Ok(())
}

/// Build the agent factory and evaluator for this run.
fn collaborators(
    config: &Config,
    dry_run: bool,
) -> Result<(Arc<dyn AgentFactory>, Arc<dyn Evaluator>)> {
    if dry_run {
        let factory = ScriptedAgentFactory::new()
            .with_default_usage(UsageReport::new(150, 100, 50))
            .with_latency(Duration::from_millis(50));
        let evaluator = ScriptedEvaluator::complete_after(2);
        return Ok((Arc::new(factory), Arc::new(evaluator)));
    }

    let client = ChatCompletionsClient::new(ChatCompletionsConfig::from(&config.evaluator))
        .context("Failed to create evaluator client")?;

    let factory: Arc<dyn AgentFactory> = match config.agent.kind {
        AgentKind::Cli => Arc::new(CliAgentFactory::new(config.agent.clone())),
        AgentKind::Chat => {
            let mut chat = ChatCompletionsConfig::from(&config.evaluator);
            if let Some(model) = &config.agent.model {
                chat.model.clone_from(model);
            }
            Arc::new(
                ChatCompletionsClient::new(chat).context("Failed to create chat agent client")?,
            )
        }
    };

    Ok((factory, Arc::new(client)))
}

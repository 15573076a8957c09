use crate::{
    Result,
    config::Config,
    diagnostics::{DiagnosticsSink, DiscardSink, FileSink},
    model::RunResult,
    orchestrator::Harvester,
    output,
    profile::SiteProfile,
    renderer::ChromeRenderer,
    utils,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub profile: PathBuf,
    pub output: Option<PathBuf>,
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub result: RunResult,
    pub output: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub snapshots: usize,
}

impl RunSummary {
    pub fn all_completed(&self) -> bool {
        self.result.all_completed()
    }

    fn duration_ms(&self) -> u64 {
        self.result
            .finished_at
            .map(|end| (end - self.result.started_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }
}

impl output::OutputFormatter for RunSummary {
    fn format_text(&self) -> String {
        use crate::output::text;

        let headline = format!(
            "{} records from {} categories in {}",
            self.result.records.len(),
            self.result.categories.len(),
            text::format_duration_ms(self.duration_ms())
        );
        let mut lines = vec![if self.all_completed() {
            text::success(&headline)
        } else {
            text::warning(&headline)
        }];

        lines.push(output::category_table(&self.result));

        if !self.result.warnings.is_empty() {
            lines.push(text::key_value(
                "Warnings",
                &self.result.warnings.len().to_string(),
            ));
        }
        if let Some(path) = &self.output {
            lines.push(text::key_value("Records", &path.display().to_string()));
        }
        if let Some(path) = &self.ledger {
            lines.push(text::key_value("Ledger", &path.display().to_string()));
        }
        if self.snapshots > 0 {
            lines.push(text::key_value("Snapshots", &self.snapshots.to_string()));
        }
        lines.join("\n")
    }

    fn format_json(&self, pretty: bool) -> Result<String> {
        output::to_json(self, pretty)
    }
}

pub async fn handle_run(config: &Config, opts: &RunOptions) -> Result<RunSummary> {
    let profile = SiteProfile::from_file(&opts.profile)?;
    let categories = profile.select(&opts.categories)?;
    let harvester = Harvester::from_profile(config, &profile);

    let mut sink: Box<dyn DiagnosticsSink> = if config.diagnostics.enabled {
        Box::new(FileSink::new(config.diagnostics.resolved_dir())?)
    } else {
        Box::new(DiscardSink)
    };

    let cancel = utils::signal::cancel_on_interrupt();
    let mut renderer = ChromeRenderer::launch(&config.browser).await?;

    let harvest = harvester
        .run(&mut renderer, &categories, sink.as_mut(), &cancel)
        .await;

    if let Err(e) = renderer.close().await {
        tracing::warn!("{}", e);
    }

    if let Some(path) = &opts.output {
        output::write_result(path, &harvest.result, config.output.json_pretty)?;
    }

    let ledger_path = config.diagnostics.ledger_path.clone().or_else(|| {
        config.diagnostics.enabled.then(|| {
            config
                .diagnostics
                .resolved_dir()
                .join(format!("ledger_{}.ndjson", harvest.result.run_id))
        })
    });
    if let Some(path) = &ledger_path {
        harvest.ledger.write_ndjson(path)?;
    }

    Ok(RunSummary {
        snapshots: harvest.ledger.snapshots().count(),
        result: harvest.result,
        output: opts.output.clone(),
        ledger: ledger_path,
    })
}

// src/pipeline/mod.rs
use std::collections::HashSet;

use serde::Serialize;
use url::Url;

use crate::extractors::convert::{convert, NormalizedTable};
use crate::extractors::html::{decode, extract_first_table, extract_links, extract_title, file_stem, MAX_STEM_LEN};
use crate::periods::PeriodToken;
use crate::spensiones::client::Fetch;
use crate::spensiones::models::{DatasetDescriptor, FundType, LinkRule, SourceShape};
use crate::storage::StorageManager;
use crate::utils::error::{AppError, ExtractError, FetchError};
use crate::utils::html_debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOutcome {
    Succeeded,
    /// Tables were present but carried no data rows.
    Empty,
    /// No qualifying table (or no cuadro links) for the period.
    NotFound,
    /// A fetch, decode or storage failure.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentOutcome {
    Saved,
    Empty,
    NotFound,
    Failed,
}

impl PeriodOutcome {
    fn from_documents(outcomes: &[DocumentOutcome]) -> Self {
        let any = |o: DocumentOutcome| outcomes.contains(&o);
        if any(DocumentOutcome::Failed) {
            PeriodOutcome::Failed
        } else if any(DocumentOutcome::Saved) {
            PeriodOutcome::Succeeded
        } else if any(DocumentOutcome::Empty) {
            PeriodOutcome::Empty
        } else {
            PeriodOutcome::NotFound
        }
    }
}

/// Periods of one run, grouped by outcome, each in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: Vec<PeriodToken>,
    pub empty: Vec<PeriodToken>,
    pub not_found: Vec<PeriodToken>,
    pub failed: Vec<PeriodToken>,
}

impl RunSummary {
    fn record(&mut self, token: PeriodToken, outcome: PeriodOutcome) {
        match outcome {
            PeriodOutcome::Succeeded => self.succeeded.push(token),
            PeriodOutcome::Empty => self.empty.push(token),
            PeriodOutcome::NotFound => self.not_found.push(token),
            PeriodOutcome::Failed => self.failed.push(token),
        }
    }

    /// True when any period hit a fetch, decode or storage failure.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn log(&self) {
        tracing::info!(
            "Processing finished. Succeeded: {}, Empty: {}, Not found: {}, Failed: {}",
            self.succeeded.len(),
            self.empty.len(),
            self.not_found.len(),
            self.failed.len()
        );
        if !self.empty.is_empty() {
            tracing::warn!("Empty periods: {}", join_tokens(&self.empty));
        }
        if !self.not_found.is_empty() {
            tracing::warn!("Periods without data: {}", join_tokens(&self.not_found));
        }
        if !self.failed.is_empty() {
            tracing::error!("Failed periods: {}", join_tokens(&self.failed));
        }
    }
}

fn join_tokens(tokens: &[PeriodToken]) -> String {
    tokens.iter().map(PeriodToken::as_str).collect::<Vec<_>>().join(", ")
}

pub struct Pipeline<'a, F: Fetch> {
    fetcher: &'a F,
    storage: &'a StorageManager,
    dataset: &'static DatasetDescriptor,
    fund: FundType,
    debug: bool,
}

impl<'a, F: Fetch> Pipeline<'a, F> {
    pub fn new(fetcher: &'a F, storage: &'a StorageManager, dataset: &'static DatasetDescriptor) -> Self {
        Self {
            fetcher,
            storage,
            dataset,
            fund: FundType::default(),
            debug: false,
        }
    }

    pub fn with_fund(mut self, fund: FundType) -> Self {
        self.fund = fund;
        self
    }

    /// Also write annotated copies of every document.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Processes `tokens` sequentially, in the given order.
    pub async fn run(&self, tokens: &[PeriodToken]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = tokens.len();

        for (i, token) in tokens.iter().enumerate() {
            tracing::info!("[{} {}] Processing period {}/{}", self.dataset.name, token, i + 1, total);
            let outcome = self.process_period(token).await;
            match outcome {
                PeriodOutcome::Succeeded => tracing::info!("[{} {}] Done", self.dataset.name, token),
                PeriodOutcome::Empty => tracing::warn!("[{} {}] Tables carried no data", self.dataset.name, token),
                PeriodOutcome::NotFound => tracing::warn!("[{} {}] No data published", self.dataset.name, token),
                PeriodOutcome::Failed => tracing::error!("[{} {}] Failed", self.dataset.name, token),
            }
            summary.record(token.clone(), outcome);
        }

        summary
    }

    pub async fn process_period(&self, token: &PeriodToken) -> PeriodOutcome {
        let url = self.dataset.url_for(token, self.fund);
        let mut names = HashSet::new();

        match self.dataset.source {
            SourceShape::Direct => {
                let outcome = self.process_document(token, &url, 1, &mut names).await;
                PeriodOutcome::from_documents(&[outcome])
            }
            SourceShape::Index(rule) => {
                let links = match self.fetch_index(&url, &rule).await {
                    Ok(links) => links,
                    Err(e) => {
                        tracing::error!("[{} {}] Index page failed: {}", self.dataset.name, token, e);
                        return PeriodOutcome::Failed;
                    }
                };
                if links.is_empty() {
                    tracing::warn!("[{} {}] Index page lists no cuadros", self.dataset.name, token);
                    return PeriodOutcome::NotFound;
                }

                let total = links.len();
                let mut outcomes = Vec::with_capacity(total);
                for (i, link) in links.iter().enumerate() {
                    tracing::info!("[{} {}] Cuadro {}/{}", self.dataset.name, token, i + 1, total);
                    outcomes.push(self.process_document(token, link.as_str(), i + 1, &mut names).await);
                }
                PeriodOutcome::from_documents(&outcomes)
            }
        }
    }

    async fn fetch_index(&self, url: &str, rule: &LinkRule) -> Result<Vec<Url>, AppError> {
        let base = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let bytes = self.fetcher.fetch(url).await?;
        let html = decode(&bytes)?;
        Ok(extract_links(&html, rule, &base)?)
    }

    /// Output stem for a document: its slugged title, unique within the period.
    fn document_name(&self, html: &str, index: usize, used: &mut HashSet<String>) -> String {
        let stem = extract_title(html)
            .map(|title| file_stem(&title, MAX_STEM_LEN))
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| format!("cuadro_{index:02}"));

        let name = if used.contains(&stem) {
            format!("{stem}_{index:02}")
        } else {
            stem
        };
        used.insert(name.clone());
        name
    }

    async fn process_document(
        &self,
        token: &PeriodToken,
        url: &str,
        index: usize,
        used_names: &mut HashSet<String>,
    ) -> DocumentOutcome {
        let context = format!("{} {}", self.dataset.name, token);

        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("[{}] Failed to download {}: {}", context, url, e);
                return DocumentOutcome::Failed;
            }
        };
        tracing::info!("[{}] Downloaded document ({} bytes)", context, bytes.len());

        let html = match decode(&bytes) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("[{}] {}", context, e);
                return DocumentOutcome::Failed;
            }
        };

        let name = self.document_name(&html, index, used_names);

        // Raw document is kept whatever the table turns out to be.
        if let Err(e) = self.storage.write_raw(self.dataset, token, &name, &bytes) {
            tracing::error!("[{}] Failed to save raw document: {}", context, e);
            return DocumentOutcome::Failed;
        }

        let converted = extract_first_table(&html).and_then(|raw| convert(&raw));
        if self.debug {
            self.write_debug_copy(token, &name, &html, converted.as_ref().ok());
        }

        match converted {
            Ok(table) => match self.storage.write_table(self.dataset, token, &name, &table) {
                Ok(path) => {
                    tracing::info!("[{}] Saved {} rows to {}", context, table.rows.len(), path.display());
                    DocumentOutcome::Saved
                }
                Err(e) => {
                    tracing::error!("[{}] Failed to save table: {}", context, e);
                    DocumentOutcome::Failed
                }
            },
            Err(ExtractError::EmptyTable) => {
                tracing::warn!("[{}] '{}': table has no data rows", context, name);
                DocumentOutcome::Empty
            }
            Err(e) if e.is_informational() => {
                tracing::warn!("[{}] '{}': no qualifying table", context, name);
                DocumentOutcome::NotFound
            }
            Err(e) => {
                tracing::error!("[{}] '{}': {}", context, name, e);
                DocumentOutcome::Failed
            }
        }
    }

    fn write_debug_copy(&self, token: &PeriodToken, name: &str, html: &str, table: Option<&NormalizedTable>) {
        let unparsed: Vec<&str> = table.map(|t| t.unparsed_cells().collect()).unwrap_or_default();
        let result = self
            .storage
            .debug_path(self.dataset, token, name)
            .map_err(|e| e.to_string())
            .and_then(|path| html_debug::create_debug_html(html, &path, &unparsed).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!("Failed to create debug HTML: {}", e);
        }
    }
}

/// Runs each dataset over the same tokens, one after another, saving a run
/// summary per dataset. Summaries come back in dataset order.
pub async fn run_all<F: Fetch>(
    fetcher: &F,
    storage: &StorageManager,
    datasets: &[&'static DatasetDescriptor],
    tokens: &[PeriodToken],
    fund: FundType,
    debug: bool,
) -> Vec<RunSummary> {
    let mut summaries = Vec::with_capacity(datasets.len());

    for &dataset in datasets {
        tracing::info!("Starting dataset {} ({} period(s))", dataset.name, tokens.len());
        let summary = Pipeline::new(fetcher, storage, dataset)
            .with_fund(fund)
            .with_debug(debug)
            .run(tokens)
            .await;

        summary.log();
        if let Err(e) = storage.write_run_summary(dataset, &summary) {
            tracing::error!("Failed to save run summary for {}: {}", dataset.name, e);
        }
        summaries.push(summary);
    }

    summaries
}

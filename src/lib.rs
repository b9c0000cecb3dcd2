//! # Trial Balance Analytics
//!
//! Turns hierarchical trial-balance documents into a period-indexed table of financial
//! ratios, and forecasts any column of that table a few months ahead.
//!
//! ## Core Concepts
//!
//! - **Account tree**: synthetic (grouping) accounts containing analytic (leaf) accounts,
//!   held in an arena ([`AccountTree`]) and flattened depth-first into [`LeafRecord`]s
//! - **Classification**: leaves are credited to revenue, tax on sales, cost, expense and
//!   cash either by keyword heuristics (non-exclusive) or by literal hierarchy paths
//!   (exclusive); balance-sheet groups are assigned by path in both modes
//! - **Indicator table**: per-period totals joined with the balance-sheet pivot, plus the
//!   liquidity, solvency and profitability ratios
//! - **Recursive forecasting**: trend, yearly seasonality and two lags, where each
//!   multi-step prediction feeds the next one
//!
//! ## Example
//!
//! ```rust,ignore
//! use trial_balance_analytics::*;
//! use serde_json::json;
//!
//! let documents = vec![(
//!     "balancete_2023-01.json".to_string(),
//!     json!({"data": {"receitas": {"descricao": "RECEITAS", "children": [
//!         {"descricao": "Serviços Prestados a Prazo", "saldo_atual": 1000.0}
//!     ]}}}),
//! )];
//!
//! let pipeline = TrialBalancePipeline::new(PipelineConfig::default())?;
//! let run = pipeline.process_documents(&documents)?;
//! println!("{}", run.table.to_markdown());
//!
//! let forecast = pipeline.forecast(&run.table, Indicator::CurrentLiquidity)?;
//! ```

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod flatten;
pub mod forecast;
pub mod ingestion;
pub mod metrics;
pub mod period;
pub mod regression;
pub mod schema;
pub mod seasonality;
pub mod text_import;
pub mod tree;
pub mod utils;

pub use aggregator::{
    BatchSummary, DocumentSummary, Indicator, IndicatorAggregator, IndicatorSummary,
    IndicatorTable, NetProfitPolicy, PeriodIndicatorRow,
};
pub use classifier::{
    classifier_for, AccountClassifier, BalanceSheetCategory, Category, ClassificationMode,
    ClassifiedAmount, ExactPathClassifier, FuzzyClassifier,
};
pub use config::{ClassifierConfig, ForecastConfig, KeywordRule, PathRule, PipelineConfig};
pub use error::{AnalyticsError, Result};
pub use flatten::{
    backfill_synthetic_balances, AccountTreeFlattener, BackfillEntry, BackfillResult, LeafRecord,
};
pub use forecast::{
    BacktestPoint, ForecastEngine, ForecastMetrics, ForecastPoint, ForecastReport,
    ForecastResult, FutureForecast,
};
pub use ingestion::{BatchIngestion, DocumentIngestor, IngestedDocument, IngestionFailure};
pub use period::Period;
pub use schema::*;
pub use seasonality::SeasonalityMode;
pub use text_import::{import_trial_balance_text, TrialBalanceLine};
pub use tree::{AccountNode, AccountTree, NodeId, SkippedNode};

use log::{debug, info, warn};
use serde_json::Value;

/// Indicator table built from a batch of documents, with what could not be read.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub table: IndicatorTable,
    pub failures: Vec<IngestionFailure>,
    pub skipped_nodes: usize,
}

pub struct TrialBalancePipeline {
    config: PipelineConfig,
}

impl TrialBalancePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ingestor(&self) -> DocumentIngestor {
        DocumentIngestor::new(self.config.max_depth)
    }

    pub fn classify(&self, records: &[LeafRecord]) -> Vec<ClassifiedAmount> {
        classifier_for(self.config.classification_mode, &self.config.classifier).classify_all(records)
    }

    pub fn build_indicator_table(&self, records: &[LeafRecord]) -> Result<IndicatorTable> {
        let classified = self.classify(records);
        debug!(
            "Classified {} leaf records in {:?} mode",
            classified.len(),
            self.config.classification_mode
        );
        IndicatorAggregator::new(self.config.net_profit_policy).build_table(&classified)
    }

    /// Ingests every document, skipping the unreadable ones, and builds the table from
    /// the rest.
    pub fn process_documents(&self, documents: &[(String, Value)]) -> Result<PipelineRun> {
        info!("Processing {} trial-balance documents", documents.len());

        let batch = self.ingestor().ingest_values(documents);
        let skipped_nodes = batch.documents.iter().map(|d| d.skipped.len()).sum();
        if skipped_nodes > 0 {
            warn!("{} malformed account nodes were skipped", skipped_nodes);
        }

        let table = self.build_indicator_table(&batch.records())?;
        Ok(PipelineRun {
            table,
            failures: batch.failures,
            skipped_nodes,
        })
    }

    /// Backtest and projection of one column of the table.
    pub fn forecast(&self, table: &IndicatorTable, indicator: Indicator) -> Result<ForecastReport> {
        info!("Forecasting {} over {} periods", indicator, table.len());
        ForecastEngine::new(self.config.forecast.clone())?.run(&table.series(indicator))
    }

    /// Exploratory totals per document and combined. These always use the keyword
    /// heuristics and the full net-profit formula, whatever the configured mode.
    pub fn summarize_batch(&self, batch: &BatchIngestion) -> BatchSummary {
        let classifier = FuzzyClassifier::new(&self.config.classifier);
        let documents: Vec<(String, Vec<ClassifiedAmount>)> = batch
            .documents
            .iter()
            .map(|doc| (doc.identifier.clone(), classifier.classify_all(&doc.records)))
            .collect();
        IndicatorAggregator::new(NetProfitPolicy::Full).summarize_documents(&documents)
    }
}

/// Builds the indicator table of a batch of documents with the given settings.
pub fn build_indicator_table(documents: &[(String, Value)], config: &PipelineConfig) -> Result<IndicatorTable> {
    Ok(TrialBalancePipeline::new(config.clone())?
        .process_documents(documents)?
        .table)
}

use crate::aggregator::NetProfitPolicy;
use crate::classifier::{BalanceSheetCategory, Category, ClassificationMode};
use crate::error::{AnalyticsError, Result};
use crate::seasonality::SeasonalityMode;
use crate::tree::DEFAULT_MAX_DEPTH;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordRule {
    #[schemars(description = "Category credited when the rule matches.")]
    pub category: Category,

    #[serde(default)]
    #[schemars(description = "Substrings searched case-insensitively in the account label.")]
    pub keywords: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Accepted values for the first dot-segment of the account code.")]
    pub code_prefixes: Vec<String>,
}

impl KeywordRule {
    fn new(category: Category, keywords: &[&str], code_prefixes: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            code_prefixes: code_prefixes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A literal hierarchy path. `segments` must equal the leaf's ancestry labels starting at
/// `anchor_level` (0 = top of the tree).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PathRule<C> {
    pub category: C,

    #[serde(default)]
    #[schemars(description = "Hierarchy level where the first segment must appear (0 = top).")]
    pub anchor_level: usize,

    #[schemars(description = "Exact, case-sensitive account labels, read from the anchor level down.")]
    pub segments: Vec<String>,
}

impl<C> PathRule<C> {
    pub fn new(category: C, anchor_level: usize, segments: &[&str]) -> Self {
        Self {
            category,
            anchor_level,
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn matches(&self, path: &[String]) -> bool {
        let end = self.anchor_level + self.segments.len();
        !self.segments.is_empty()
            && path.len() >= end
            && path[self.anchor_level..end] == self.segments[..]
    }
}

/// Heuristics and literal paths used by both classification strategies.
///
/// Built once at start-up and shared read-only by every classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifierConfig {
    #[schemars(description = "Keyword/code-prefix rules for fuzzy classification. Evaluated independently.")]
    pub keyword_rules: Vec<KeywordRule>,

    #[schemars(description = "Literal paths for exact-path classification. First match wins.")]
    pub statement_paths: Vec<PathRule<Category>>,

    #[schemars(description = "Literal paths assigning balance-sheet categories. First match wins.")]
    pub balance_sheet_paths: Vec<PathRule<BalanceSheetCategory>>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keyword_rules: vec![
                KeywordRule::new(
                    Category::Revenue,
                    &["receita", "receitas", "venda", "vendas", "serviço", "serviços", "faturamento"],
                    &["3", "03"],
                ),
                KeywordRule::new(
                    Category::TaxOnSales,
                    &["iss", "icms", "pis", "cofins", "simples", "irrf", "imposto", "impostos", "retido"],
                    &[],
                ),
                KeywordRule::new(
                    Category::Cost,
                    &["custo", "custos", "cmv", "estoque", "mercadoria"],
                    &["4", "04"],
                ),
                KeywordRule::new(
                    Category::Expense,
                    &[
                        "despesa",
                        "despesas",
                        "juros",
                        "multas",
                        "salário",
                        "salários",
                        "frete",
                        "serviços de terceiros",
                        "deprecia",
                    ],
                    &["4", "04"],
                ),
                KeywordRule::new(
                    Category::CashEquivalent,
                    &["caixa", "banco", "conta", "aplica", "aplicação", "disponibilidades", "equivalente"],
                    &[],
                ),
            ],
            statement_paths: vec![
                PathRule::new(Category::Revenue, 0, &["RECEITAS", "Serviços Prestados a Prazo"]),
                PathRule::new(
                    Category::TaxOnSales,
                    0,
                    &["RECEITAS", "Simples Nacional sobre vendas e serviços"],
                ),
                PathRule::new(Category::Cost, 0, &["CUSTOS E DESPESAS"]),
                PathRule::new(Category::CashEquivalent, 1, &["ATIVO CIRCULANTE", "DISPONIBILIDADES"]),
            ],
            balance_sheet_paths: vec![
                PathRule::new(BalanceSheetCategory::CurrentAssets, 1, &["ATIVO CIRCULANTE"]),
                PathRule::new(BalanceSheetCategory::NonCurrentAssets, 1, &["ATIVO NÃO CIRCULANTE"]),
                PathRule::new(BalanceSheetCategory::CurrentLiabilities, 1, &["PASSIVO CIRCULANTE"]),
                PathRule::new(
                    BalanceSheetCategory::NonCurrentLiabilities,
                    1,
                    &["PASSIVO NÃO CIRCULANTE"],
                ),
                PathRule::new(BalanceSheetCategory::Equity, 1, &["PATRIMÔNIO LÍQUIDO"]),
            ],
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        for rule in &self.keyword_rules {
            if rule.keywords.is_empty() && rule.code_prefixes.is_empty() {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "keyword rule for {} has neither keywords nor code prefixes",
                    rule.category
                )));
            }
        }
        for rule in &self.statement_paths {
            if rule.segments.is_empty() {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "path rule for {} has no segments",
                    rule.category
                )));
            }
        }
        for rule in &self.balance_sheet_paths {
            if rule.segments.is_empty() {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "path rule for {} has no segments",
                    rule.category
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon")]
    #[schemars(description = "Number of periods held out for the backtest and projected into the future.")]
    pub horizon: usize,

    #[serde(default)]
    #[schemars(description = "Whether yearly Fourier terms enter the model.")]
    pub yearly_seasonality: SeasonalityMode,

    #[serde(default = "default_fourier_order")]
    #[schemars(description = "Number of sine/cosine pairs of the yearly seasonal component (1-6).")]
    pub fourier_order: usize,

    #[serde(default = "default_ridge_penalty")]
    #[schemars(description = "Ridge penalty on standardized regressors; keeps collinear lags solvable.")]
    pub ridge_penalty: f64,
}

fn default_horizon() -> usize {
    6
}

fn default_fourier_order() -> usize {
    3
}

fn default_ridge_penalty() -> f64 {
    1e-8
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            yearly_seasonality: SeasonalityMode::default(),
            fourier_order: default_fourier_order(),
            ridge_penalty: default_ridge_penalty(),
        }
    }
}

impl ForecastConfig {
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(AnalyticsError::InvalidHorizon(self.horizon));
        }
        if !(1..=6).contains(&self.fourier_order) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "fourier_order {} must be between 1 and 6",
                self.fourier_order
            )));
        }
        if !self.ridge_penalty.is_finite() || self.ridge_penalty < 0.0 {
            return Err(AnalyticsError::InvalidConfig(format!(
                "ridge_penalty {} must be a non-negative number",
                self.ridge_penalty
            )));
        }
        Ok(())
    }
}

/// Top-level settings for a full document-to-forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    pub classification_mode: ClassificationMode,

    #[serde(default)]
    pub net_profit_policy: NetProfitPolicy,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default = "default_max_depth")]
    #[schemars(description = "Depth at which account-tree traversal stops descending.")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classification_mode: ClassificationMode::default(),
            net_profit_policy: NetProfitPolicy::default(),
            classifier: ClassifierConfig::default(),
            forecast: ForecastConfig::default(),
            max_depth: default_max_depth(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        self.classifier.validate()?;
        self.forecast.validate()
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(PipelineConfig);
        serde_json::to_string_pretty(&schema)
    }
}

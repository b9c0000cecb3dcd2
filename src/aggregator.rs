use crate::classifier::{BalanceSheetCategory, Category, ClassifiedAmount};
use crate::error::{AnalyticsError, Result};
use crate::flatten::{backfill_synthetic_balances, BackfillEntry, BackfillResult, LeafRecord};
use crate::period::Period;
use crate::utils::{ancestor_codes, round2};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// How net profit is derived from gross profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum NetProfitPolicy {
    #[default]
    #[schemars(description = "Net profit = gross profit. Expenses are expected to be folded into costs.")]
    Simplified,
    #[schemars(description = "Net profit = gross profit - expenses.")]
    Full,
}

impl NetProfitPolicy {
    pub fn net_profit(&self, gross_profit: f64, expenses: f64) -> f64 {
        match self {
            Self::Simplified => gross_profit,
            Self::Full => gross_profit - expenses,
        }
    }
}

/// Every column of the indicator table, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    GrossRevenue,
    TaxOnSales,
    NetRevenue,
    TotalCost,
    Expenses,
    GrossProfit,
    NetProfit,
    CashEquivalents,
    CurrentAssets,
    NonCurrentAssets,
    CurrentLiabilities,
    NonCurrentLiabilities,
    Equity,
    TotalAssets,
    TotalLiabilities,
    CurrentLiquidity,
    ImmediateLiquidity,
    GeneralLiquidity,
    GeneralSolvency,
    Indebtedness,
    ProfitMargin,
    ReturnOnEquity,
}

impl Indicator {
    pub const ALL: [Indicator; 22] = [
        Indicator::GrossRevenue,
        Indicator::TaxOnSales,
        Indicator::NetRevenue,
        Indicator::TotalCost,
        Indicator::Expenses,
        Indicator::GrossProfit,
        Indicator::NetProfit,
        Indicator::CashEquivalents,
        Indicator::CurrentAssets,
        Indicator::NonCurrentAssets,
        Indicator::CurrentLiabilities,
        Indicator::NonCurrentLiabilities,
        Indicator::Equity,
        Indicator::TotalAssets,
        Indicator::TotalLiabilities,
        Indicator::CurrentLiquidity,
        Indicator::ImmediateLiquidity,
        Indicator::GeneralLiquidity,
        Indicator::GeneralSolvency,
        Indicator::Indebtedness,
        Indicator::ProfitMargin,
        Indicator::ReturnOnEquity,
    ];

    /// Stable column name used in every rendered output.
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::GrossRevenue => "gross_revenue",
            Self::TaxOnSales => "tax_on_sales",
            Self::NetRevenue => "net_revenue",
            Self::TotalCost => "total_cost",
            Self::Expenses => "expenses",
            Self::GrossProfit => "gross_profit",
            Self::NetProfit => "net_profit",
            Self::CashEquivalents => "cash_equivalents",
            Self::CurrentAssets => "current_assets",
            Self::NonCurrentAssets => "non_current_assets",
            Self::CurrentLiabilities => "current_liabilities",
            Self::NonCurrentLiabilities => "non_current_liabilities",
            Self::Equity => "equity",
            Self::TotalAssets => "total_assets",
            Self::TotalLiabilities => "total_liabilities",
            Self::CurrentLiquidity => "current_liquidity",
            Self::ImmediateLiquidity => "immediate_liquidity",
            Self::GeneralLiquidity => "general_liquidity",
            Self::GeneralSolvency => "general_solvency",
            Self::Indebtedness => "indebtedness",
            Self::ProfitMargin => "profit_margin",
            Self::ReturnOnEquity => "return_on_equity",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for Indicator {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.column_name() == s.trim())
            .ok_or_else(|| AnalyticsError::InvalidConfig(format!("unknown indicator column '{}'", s)))
    }
}

/// One period of the indicator table. Field names are the stable column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodIndicatorRow {
    pub period: Period,
    pub gross_revenue: f64,
    pub tax_on_sales: f64,
    pub net_revenue: f64,
    pub total_cost: f64,
    pub expenses: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    pub cash_equivalents: f64,
    pub current_assets: f64,
    pub non_current_assets: f64,
    pub current_liabilities: f64,
    pub non_current_liabilities: f64,
    pub equity: f64,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub current_liquidity: f64,
    pub immediate_liquidity: f64,
    pub general_liquidity: f64,
    pub general_solvency: f64,
    pub indebtedness: f64,
    pub profit_margin: f64,
    pub return_on_equity: f64,
}

impl PeriodIndicatorRow {
    pub fn value(&self, indicator: Indicator) -> f64 {
        match indicator {
            Indicator::GrossRevenue => self.gross_revenue,
            Indicator::TaxOnSales => self.tax_on_sales,
            Indicator::NetRevenue => self.net_revenue,
            Indicator::TotalCost => self.total_cost,
            Indicator::Expenses => self.expenses,
            Indicator::GrossProfit => self.gross_profit,
            Indicator::NetProfit => self.net_profit,
            Indicator::CashEquivalents => self.cash_equivalents,
            Indicator::CurrentAssets => self.current_assets,
            Indicator::NonCurrentAssets => self.non_current_assets,
            Indicator::CurrentLiabilities => self.current_liabilities,
            Indicator::NonCurrentLiabilities => self.non_current_liabilities,
            Indicator::Equity => self.equity,
            Indicator::TotalAssets => self.total_assets,
            Indicator::TotalLiabilities => self.total_liabilities,
            Indicator::CurrentLiquidity => self.current_liquidity,
            Indicator::ImmediateLiquidity => self.immediate_liquidity,
            Indicator::GeneralLiquidity => self.general_liquidity,
            Indicator::GeneralSolvency => self.general_solvency,
            Indicator::Indebtedness => self.indebtedness,
            Indicator::ProfitMargin => self.profit_margin,
            Indicator::ReturnOnEquity => self.return_on_equity,
        }
    }

    /// Copy rounded to the 2-decimal reporting precision. NaN and infinities pass through.
    pub fn rounded(&self) -> Self {
        Self {
            period: self.period,
            gross_revenue: round2(self.gross_revenue),
            tax_on_sales: round2(self.tax_on_sales),
            net_revenue: round2(self.net_revenue),
            total_cost: round2(self.total_cost),
            expenses: round2(self.expenses),
            gross_profit: round2(self.gross_profit),
            net_profit: round2(self.net_profit),
            cash_equivalents: round2(self.cash_equivalents),
            current_assets: round2(self.current_assets),
            non_current_assets: round2(self.non_current_assets),
            current_liabilities: round2(self.current_liabilities),
            non_current_liabilities: round2(self.non_current_liabilities),
            equity: round2(self.equity),
            total_assets: round2(self.total_assets),
            total_liabilities: round2(self.total_liabilities),
            current_liquidity: round2(self.current_liquidity),
            immediate_liquidity: round2(self.immediate_liquidity),
            general_liquidity: round2(self.general_liquidity),
            general_solvency: round2(self.general_solvency),
            indebtedness: round2(self.indebtedness),
            profit_margin: round2(self.profit_margin),
            return_on_equity: round2(self.return_on_equity),
        }
    }
}

/// Period-keyed indicator table, rows in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorTable {
    rows: Vec<PeriodIndicatorRow>,
}

impl IndicatorTable {
    pub fn rows(&self) -> &[PeriodIndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, period: Period) -> Option<&PeriodIndicatorRow> {
        self.rows
            .binary_search_by(|row| row.period.cmp(&period))
            .ok()
            .map(|idx| &self.rows[idx])
    }

    pub fn periods(&self) -> Vec<Period> {
        self.rows.iter().map(|r| r.period).collect()
    }

    /// One column as a period-ordered series, ready for forecasting.
    pub fn series(&self, indicator: Indicator) -> BTreeMap<Period, f64> {
        self.rows
            .iter()
            .map(|row| (row.period, row.value(indicator)))
            .collect()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        let rounded: Vec<PeriodIndicatorRow> = self.rows.iter().map(|r| r.rounded()).collect();
        serde_json::to_string_pretty(&rounded)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::from("period");
        for indicator in Indicator::ALL {
            output.push(',');
            output.push_str(indicator.column_name());
        }
        output.push('\n');

        for row in &self.rows {
            output.push_str(&row.period.to_string());
            for indicator in Indicator::ALL {
                output.push_str(&format!(",{:.2}", row.value(indicator)));
            }
            output.push('\n');
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Financial Indicators\n\n");

        output.push_str("| Indicator |");
        for row in &self.rows {
            output.push_str(&format!(" {} |", row.period));
        }
        output.push('\n');
        output.push_str("|---|");
        for _ in &self.rows {
            output.push_str("---:|");
        }
        output.push('\n');

        for indicator in Indicator::ALL {
            output.push_str(&format!("| {} |", indicator.column_name()));
            for row in &self.rows {
                output.push_str(&format!(" {:.2} |", row.value(indicator)));
            }
            output.push('\n');
        }

        output
    }
}

/// Per-period sums of the income-side and cash categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub gross_revenue: f64,
    pub tax_on_sales: f64,
    pub total_cost: f64,
    pub expenses: f64,
    pub cash_equivalents: f64,
}

impl CategoryTotals {
    fn add(&mut self, category: Category, amount: f64) {
        match category {
            Category::Revenue => self.gross_revenue += amount,
            Category::TaxOnSales => self.tax_on_sales += amount,
            Category::Cost => self.total_cost += amount,
            Category::Expense => self.expenses += amount,
            Category::CashEquivalent => self.cash_equivalents += amount,
        }
    }
}

pub type BalanceSheetPivot = BTreeMap<Period, BTreeMap<BalanceSheetCategory, f64>>;

/// Exploratory totals for one document or a whole batch, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSummary {
    pub gross_revenue: f64,
    pub tax_on_sales: f64,
    pub net_revenue: f64,
    pub total_cost: f64,
    pub gross_profit: f64,
    pub expenses: f64,
    pub net_profit: f64,
    pub cash_equivalents: f64,
}

impl IndicatorSummary {
    fn accumulate(&mut self, other: &IndicatorSummary) {
        self.gross_revenue += other.gross_revenue;
        self.tax_on_sales += other.tax_on_sales;
        self.net_revenue += other.net_revenue;
        self.total_cost += other.total_cost;
        self.gross_profit += other.gross_profit;
        self.expenses += other.expenses;
        self.net_profit += other.net_profit;
        self.cash_equivalents += other.cash_equivalents;
    }

    fn rounded(&self) -> Self {
        Self {
            gross_revenue: round2(self.gross_revenue),
            tax_on_sales: round2(self.tax_on_sales),
            net_revenue: round2(self.net_revenue),
            total_cost: round2(self.total_cost),
            gross_profit: round2(self.gross_profit),
            expenses: round2(self.expenses),
            net_profit: round2(self.net_profit),
            cash_equivalents: round2(self.cash_equivalents),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document: String,
    pub leaf_count: usize,
    pub indicators: IndicatorSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub per_document: Vec<DocumentSummary>,
    pub combined_totals: IndicatorSummary,
}

pub struct IndicatorAggregator {
    policy: NetProfitPolicy,
}

impl Default for IndicatorAggregator {
    fn default() -> Self {
        Self::new(NetProfitPolicy::default())
    }
}

impl IndicatorAggregator {
    pub fn new(policy: NetProfitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NetProfitPolicy {
        self.policy
    }

    /// Sums every tagged amount into its categories, per period. A multi-tagged amount
    /// counts once in each of its categories.
    pub fn category_totals(&self, amounts: &[ClassifiedAmount]) -> BTreeMap<Period, CategoryTotals> {
        let mut totals: BTreeMap<Period, CategoryTotals> = BTreeMap::new();
        for amount in amounts {
            if amount.categories.is_empty() {
                continue;
            }
            let entry = totals.entry(amount.record.period).or_default();
            for &category in &amount.categories {
                entry.add(category, amount.record.balance);
            }
        }
        totals
    }

    /// One value per (period, balance-sheet category).
    ///
    /// Amounts are first summed per source document. When several sources populate the
    /// same (period, category) cell, the first source encountered wins and later values
    /// are dropped.
    pub fn balance_sheet_pivot(&self, amounts: &[ClassifiedAmount]) -> BalanceSheetPivot {
        type CellKey<'a> = (Option<&'a str>, Period, BalanceSheetCategory);

        let mut order: Vec<CellKey> = Vec::new();
        let mut sums: HashMap<CellKey, f64> = HashMap::new();
        for amount in amounts {
            let Some(category) = amount.balance_sheet else {
                continue;
            };
            let key = (amount.record.source.as_deref(), amount.record.period, category);
            match sums.entry(key) {
                Entry::Occupied(mut sum) => *sum.get_mut() += amount.record.balance,
                Entry::Vacant(slot) => {
                    order.push(key);
                    slot.insert(amount.record.balance);
                }
            }
        }

        let mut pivot = BalanceSheetPivot::new();
        for key in order {
            let (source, period, category) = key;
            let value = sums[&key];
            let cells = pivot.entry(period).or_default();
            if let Some(existing) = cells.get(&category) {
                debug!(
                    "Duplicate {} for {} from {:?}: keeping first value {} and dropping {}",
                    category, period, source, existing, value
                );
                continue;
            }
            cells.insert(category, value);
        }
        pivot
    }

    /// Builds the period-indexed ratio table.
    ///
    /// Only periods present on both the income side and the balance-sheet side are kept.
    /// A kept period lacking a required balance-sheet category is an error; equity is
    /// optional and yields NaN when absent.
    pub fn build_table(&self, amounts: &[ClassifiedAmount]) -> Result<IndicatorTable> {
        let totals = self.category_totals(amounts);
        let pivot = self.balance_sheet_pivot(amounts);

        for period in totals.keys().filter(|p| !pivot.contains_key(*p)) {
            warn!("Period {} has no balance-sheet data and is dropped", period);
        }
        for period in pivot.keys().filter(|p| !totals.contains_key(*p)) {
            warn!("Period {} has no income-statement data and is dropped", period);
        }

        let mut rows = Vec::new();
        for (period, income) in &totals {
            let Some(cells) = pivot.get(period) else {
                continue;
            };
            for required in BalanceSheetCategory::REQUIRED {
                if !cells.contains_key(&required) {
                    return Err(AnalyticsError::MissingCategory {
                        period: period.to_string(),
                        category: required.to_string(),
                    });
                }
            }
            rows.push(self.derive_row(*period, income, cells));
        }

        info!(
            "Built indicator table with {} periods from {} classified amounts",
            rows.len(),
            amounts.len()
        );
        Ok(IndicatorTable { rows })
    }

    fn derive_row(
        &self,
        period: Period,
        income: &CategoryTotals,
        cells: &BTreeMap<BalanceSheetCategory, f64>,
    ) -> PeriodIndicatorRow {
        let cell = |c: BalanceSheetCategory| cells.get(&c).copied().unwrap_or(f64::NAN);

        let net_revenue = income.gross_revenue - income.tax_on_sales;
        let gross_profit = net_revenue - income.total_cost;
        let net_profit = self.policy.net_profit(gross_profit, income.expenses);

        let current_assets = cell(BalanceSheetCategory::CurrentAssets);
        let non_current_assets = cell(BalanceSheetCategory::NonCurrentAssets);
        let current_liabilities = cell(BalanceSheetCategory::CurrentLiabilities);
        let non_current_liabilities = cell(BalanceSheetCategory::NonCurrentLiabilities);
        let equity = cell(BalanceSheetCategory::Equity);

        let total_assets = current_assets + non_current_assets;
        let total_liabilities = current_liabilities + non_current_liabilities;

        PeriodIndicatorRow {
            period,
            gross_revenue: income.gross_revenue,
            tax_on_sales: income.tax_on_sales,
            net_revenue,
            total_cost: income.total_cost,
            expenses: income.expenses,
            gross_profit,
            net_profit,
            cash_equivalents: income.cash_equivalents,
            current_assets,
            non_current_assets,
            current_liabilities,
            non_current_liabilities,
            equity,
            total_assets,
            total_liabilities,
            current_liquidity: current_assets / current_liabilities,
            immediate_liquidity: income.cash_equivalents / current_liabilities,
            general_liquidity: total_assets / total_liabilities,
            general_solvency: total_assets / total_liabilities,
            indebtedness: total_liabilities / total_assets,
            profit_margin: net_profit / net_revenue,
            return_on_equity: net_profit / equity,
        }
    }

    /// Exploratory totals over all amounts regardless of period.
    pub fn summarize(&self, amounts: &[ClassifiedAmount]) -> IndicatorSummary {
        let mut totals = CategoryTotals::default();
        for amount in amounts {
            for &category in &amount.categories {
                totals.add(category, amount.record.balance);
            }
        }

        let net_revenue = totals.gross_revenue - totals.tax_on_sales;
        let gross_profit = net_revenue - totals.total_cost;
        IndicatorSummary {
            gross_revenue: totals.gross_revenue,
            tax_on_sales: totals.tax_on_sales,
            net_revenue,
            total_cost: totals.total_cost,
            gross_profit,
            expenses: totals.expenses,
            net_profit: self.policy.net_profit(gross_profit, totals.expenses),
            cash_equivalents: totals.cash_equivalents,
        }
        .rounded()
    }

    /// Per-document summaries plus combined totals of the already rounded figures.
    pub fn summarize_documents(&self, documents: &[(String, Vec<ClassifiedAmount>)]) -> BatchSummary {
        let mut combined = IndicatorSummary::default();
        let per_document: Vec<DocumentSummary> = documents
            .iter()
            .map(|(name, amounts)| {
                let indicators = self.summarize(amounts);
                combined.accumulate(&indicators);
                DocumentSummary {
                    document: name.clone(),
                    leaf_count: amounts.len(),
                    indicators,
                }
            })
            .collect();

        BatchSummary {
            per_document,
            combined_totals: combined.rounded(),
        }
    }

    /// Balances of every synthetic account code, per period, backfilled from leaves.
    ///
    /// Each leaf contributes its balance to its own code, whether or not another leaf
    /// shares it. Each proper dotted prefix of a leaf code becomes a synthetic account
    /// without a balance of its own.
    pub fn synthetic_balances(&self, records: &[LeafRecord]) -> BTreeMap<Period, BackfillResult> {
        let mut by_period: BTreeMap<Period, Vec<&LeafRecord>> = BTreeMap::new();
        for record in records {
            by_period.entry(record.period).or_default().push(record);
        }

        by_period
            .into_iter()
            .map(|(period, leaves)| {
                let mut entries: Vec<BackfillEntry> = leaves
                    .iter()
                    .map(|r| BackfillEntry::Leaf {
                        code: r.code.as_str(),
                        balance: r.balance,
                    })
                    .collect();
                let ancestors: BTreeSet<&str> =
                    leaves.iter().flat_map(|r| ancestor_codes(&r.code)).collect();
                entries.extend(
                    ancestors
                        .into_iter()
                        .map(|code| BackfillEntry::Synthetic { code, balance: None }),
                );
                (period, backfill_synthetic_balances(entries))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(
        path: &[&str],
        balance: f64,
        period: &str,
        categories: &[Category],
        balance_sheet: Option<BalanceSheetCategory>,
    ) -> ClassifiedAmount {
        ClassifiedAmount {
            record: LeafRecord {
                path: path.iter().map(|s| s.to_string()).collect(),
                code: String::new(),
                label: path.last().unwrap().to_string(),
                balance,
                period: period.parse().unwrap(),
                source: None,
            },
            categories: categories.to_vec(),
            balance_sheet,
        }
    }

    fn balance_sheet(period: &str, ca: f64, nca: f64, cl: f64, ncl: f64) -> Vec<ClassifiedAmount> {
        vec![
            amount(&["AC"], ca, period, &[], Some(BalanceSheetCategory::CurrentAssets)),
            amount(&["ANC"], nca, period, &[], Some(BalanceSheetCategory::NonCurrentAssets)),
            amount(&["PC"], cl, period, &[], Some(BalanceSheetCategory::CurrentLiabilities)),
            amount(&["PNC"], ncl, period, &[], Some(BalanceSheetCategory::NonCurrentLiabilities)),
        ]
    }

    #[test]
    fn test_revenue_net_of_taxes() {
        let mut amounts = vec![
            amount(&["RECEITAS", "Serviços Prestados a Prazo"], 1000.0, "2023-01", &[Category::Revenue], None),
            amount(
                &["RECEITAS", "Simples Nacional sobre vendas e serviços"],
                60.0,
                "2023-01",
                &[Category::TaxOnSales],
                None,
            ),
        ];
        amounts.extend(balance_sheet("2023-01", 500.0, 100.0, 250.0, 50.0));

        let table = IndicatorAggregator::default().build_table(&amounts).unwrap();
        let row = table.get("2023-01".parse().unwrap()).unwrap();
        assert_eq!(row.gross_revenue, 1000.0);
        assert_eq!(row.tax_on_sales, 60.0);
        assert_eq!(row.net_revenue, 940.0);
        assert_eq!(row.current_liquidity, 2.0);
        assert_eq!(row.total_assets, 600.0);
        assert_eq!(row.total_liabilities, 300.0);
        assert_eq!(row.general_liquidity, 2.0);
        assert_eq!(row.indebtedness, 0.5);
    }

    #[test]
    fn test_zero_current_liabilities_yields_non_finite_ratio() {
        let mut amounts = vec![amount(&["Caixa"], 10.0, "2023-02", &[Category::CashEquivalent], None)];
        amounts.extend(balance_sheet("2023-02", 500.0, 0.0, 0.0, 0.0));

        let table = IndicatorAggregator::default().build_table(&amounts).unwrap();
        let row = &table.rows()[0];
        assert!(row.current_liquidity.is_infinite() || row.current_liquidity.is_nan());
        assert!(row.immediate_liquidity.is_infinite());
        assert!(row.profit_margin.is_nan());
        assert!(row.return_on_equity.is_nan());
    }

    #[test]
    fn test_missing_required_category_is_an_error() {
        let mut amounts = vec![amount(&["Receita"], 10.0, "2023-03", &[Category::Revenue], None)];
        amounts.extend(balance_sheet("2023-03", 1.0, 1.0, 1.0, 1.0));
        amounts.retain(|a| a.balance_sheet != Some(BalanceSheetCategory::NonCurrentLiabilities));

        let err = IndicatorAggregator::default().build_table(&amounts).unwrap_err();
        match err {
            AnalyticsError::MissingCategory { period, category } => {
                assert_eq!(period, "2023-03");
                assert_eq!(category, "NonCurrentLiabilities");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_inner_join_drops_one_sided_periods_and_sorts() {
        let mut amounts = vec![
            amount(&["Receita"], 10.0, "2023-05", &[Category::Revenue], None),
            amount(&["Receita"], 20.0, "2023-04", &[Category::Revenue], None),
            amount(&["Receita"], 30.0, "2023-06", &[Category::Revenue], None),
        ];
        amounts.extend(balance_sheet("2023-05", 1.0, 1.0, 1.0, 1.0));
        amounts.extend(balance_sheet("2023-04", 1.0, 1.0, 1.0, 1.0));
        amounts.extend(balance_sheet("2023-07", 1.0, 1.0, 1.0, 1.0));

        let table = IndicatorAggregator::default().build_table(&amounts).unwrap();
        let periods: Vec<String> = table.periods().iter().map(|p| p.to_string()).collect();
        assert_eq!(periods, vec!["2023-04", "2023-05"]);
    }

    #[test]
    fn test_pivot_first_source_wins() {
        let mut first = amount(&["AC"], 100.0, "2023-01", &[], Some(BalanceSheetCategory::CurrentAssets));
        first.record.source = Some("a.json".to_string());
        let mut first_more = first.clone();
        first_more.record.balance = 50.0;
        let mut second = first.clone();
        second.record.source = Some("b.json".to_string());
        second.record.balance = 999.0;

        let pivot = IndicatorAggregator::default().balance_sheet_pivot(&[first, second, first_more]);
        assert_eq!(
            pivot[&"2023-01".parse::<Period>().unwrap()][&BalanceSheetCategory::CurrentAssets],
            150.0
        );
    }

    #[test]
    fn test_net_profit_policies() {
        let mut amounts = vec![
            amount(&["Receita"], 1000.0, "2023-01", &[Category::Revenue], None),
            amount(&["Custo"], 300.0, "2023-01", &[Category::Cost], None),
            amount(&["Despesa"], 100.0, "2023-01", &[Category::Expense], None),
        ];
        amounts.extend(balance_sheet("2023-01", 1.0, 1.0, 1.0, 1.0));
        amounts.push(amount(&["PL"], 350.0, "2023-01", &[], Some(BalanceSheetCategory::Equity)));

        let simplified = IndicatorAggregator::new(NetProfitPolicy::Simplified)
            .build_table(&amounts)
            .unwrap();
        assert_eq!(simplified.rows()[0].net_profit, 700.0);
        assert_eq!(simplified.rows()[0].return_on_equity, 2.0);

        let full = IndicatorAggregator::new(NetProfitPolicy::Full)
            .build_table(&amounts)
            .unwrap();
        assert_eq!(full.rows()[0].net_profit, 600.0);
        assert_eq!(full.rows()[0].profit_margin, 0.6);
    }

    #[test]
    fn test_multi_tagged_amount_counts_in_each_category() {
        let amounts = vec![amount(
            &["Custos e despesas"],
            40.0,
            "2023-01",
            &[Category::Cost, Category::Expense],
            None,
        )];
        let summary = IndicatorAggregator::new(NetProfitPolicy::Full).summarize(&amounts);
        assert_eq!(summary.total_cost, 40.0);
        assert_eq!(summary.expenses, 40.0);
        assert_eq!(summary.net_profit, -80.0);
    }

    #[test]
    fn test_summarize_documents_combines_totals() {
        let doc = vec![amount(&["Receita"], 10.005, "2023-01", &[Category::Revenue], None)];
        let batch = IndicatorAggregator::default()
            .summarize_documents(&[("a".to_string(), doc.clone()), ("b".to_string(), doc)]);
        assert_eq!(batch.per_document.len(), 2);
        assert_eq!(batch.per_document[0].leaf_count, 1);
        let single = batch.per_document[0].indicators.gross_revenue;
        assert_eq!(batch.combined_totals.gross_revenue, round2(single * 2.0));
    }

    #[test]
    fn test_synthetic_balances_per_period() {
        let mk = |code: &str, balance: f64, period: &str| LeafRecord {
            path: vec![code.to_string()],
            code: code.to_string(),
            label: code.to_string(),
            balance,
            period: period.parse().unwrap(),
            source: None,
        };
        let records = vec![
            mk("1.1.01", 10.0, "2023-01"),
            mk("1.1.02", 5.0, "2023-01"),
            mk("1.2.01", 2.0, "2023-01"),
            mk("1.1.01", 7.0, "2023-02"),
        ];
        let balances = IndicatorAggregator::default().synthetic_balances(&records);
        let jan = &balances[&"2023-01".parse::<Period>().unwrap()];
        assert_eq!(jan.balances["1.1"], 15.0);
        assert_eq!(jan.balances["1"], 17.0);
        let feb = &balances[&"2023-02".parse::<Period>().unwrap()];
        assert_eq!(feb.balances["1"], 7.0);
    }

    #[test]
    fn test_synthetic_balances_count_every_leaf_of_a_repeated_code() {
        let mk = |code: &str, balance: f64, source: &str| LeafRecord {
            path: vec![code.to_string()],
            code: code.to_string(),
            label: code.to_string(),
            balance,
            period: "2023-01".parse().unwrap(),
            source: Some(source.to_string()),
        };
        let records = vec![
            mk("1.1.01", 10.0, "a.json"),
            mk("1.1.01", 5.0, "b.json"),
            mk("1.1", 7.0, "a.json"),
            mk("1.2.01", 3.0, "a.json"),
        ];
        let balances = IndicatorAggregator::default().synthetic_balances(&records);
        let jan = &balances[&"2023-01".parse::<Period>().unwrap()];

        assert_eq!(jan.balances["1.1.01"], 15.0);
        assert_eq!(jan.balances["1.1"], 22.0);
        assert_eq!(jan.balances["1"], 25.0);
        for code in &jan.backfilled {
            let prefix = format!("{}.", code);
            let expected: f64 = records
                .iter()
                .filter(|r| &r.code == code || r.code.starts_with(&prefix))
                .map(|r| r.balance)
                .sum();
            assert_eq!(jan.balances[code], expected, "code {}", code);
        }
    }

    #[test]
    fn test_indicator_names_round_trip() {
        for indicator in Indicator::ALL {
            let parsed: Indicator = indicator.column_name().parse().unwrap();
            assert_eq!(parsed, indicator);
        }
        assert!("liquidez".parse::<Indicator>().is_err());
    }

    #[test]
    fn test_outputs_use_stable_column_names() {
        let mut amounts = vec![amount(&["Receita"], 1000.0, "2023-01", &[Category::Revenue], None)];
        amounts.extend(balance_sheet("2023-01", 500.0, 100.0, 250.0, 50.0));
        let table = IndicatorAggregator::default().build_table(&amounts).unwrap();

        let csv = table.to_csv();
        assert!(csv.starts_with("period,gross_revenue,tax_on_sales,net_revenue"));
        assert!(csv.contains("2023-01,1000.00"));

        let markdown = table.to_markdown();
        assert!(markdown.contains("| current_liquidity | 2.00 |"));

        let json = table.to_json().unwrap();
        assert!(json.contains("\"return_on_equity\": null"));
        assert!(json.contains("\"period\": \"2023-01\""));
    }
}

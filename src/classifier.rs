use crate::config::{ClassifierConfig, PathRule};
use crate::flatten::LeafRecord;
use crate::utils::first_segment;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Income-statement and cash categories a leaf may be credited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Category {
    #[schemars(description = "Gross revenue from sales and services")]
    Revenue,
    #[schemars(description = "Taxes levied on sales (ISS, ICMS, PIS, COFINS, Simples Nacional)")]
    TaxOnSales,
    #[schemars(description = "Costs of goods and services sold")]
    Cost,
    #[schemars(description = "Operating and financial expenses")]
    Expense,
    #[schemars(description = "Cash, bank deposits and short-term investments")]
    CashEquivalent,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Revenue => "Revenue",
            Self::TaxOnSales => "TaxOnSales",
            Self::Cost => "Cost",
            Self::Expense => "Expense",
            Self::CashEquivalent => "CashEquivalent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum BalanceSheetCategory {
    CurrentAssets,
    NonCurrentAssets,
    CurrentLiabilities,
    NonCurrentLiabilities,
    Equity,
}

impl BalanceSheetCategory {
    /// Categories without which no ratio row can be built.
    pub const REQUIRED: [BalanceSheetCategory; 4] = [
        BalanceSheetCategory::CurrentAssets,
        BalanceSheetCategory::NonCurrentAssets,
        BalanceSheetCategory::CurrentLiabilities,
        BalanceSheetCategory::NonCurrentLiabilities,
    ];
}

impl fmt::Display for BalanceSheetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CurrentAssets => "CurrentAssets",
            Self::NonCurrentAssets => "NonCurrentAssets",
            Self::CurrentLiabilities => "CurrentLiabilities",
            Self::NonCurrentLiabilities => "NonCurrentLiabilities",
            Self::Equity => "Equity",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ClassificationMode {
    #[schemars(description = "Keyword and code-prefix matching. A leaf may count in several categories.")]
    Fuzzy,
    #[default]
    #[schemars(description = "Literal hierarchy paths. A leaf counts in at most one category.")]
    ExactPath,
}

/// A leaf record with the categories it was credited to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedAmount {
    pub record: LeafRecord,
    /// Exact-path mode yields at most one entry; fuzzy mode may yield several.
    pub categories: Vec<Category>,
    pub balance_sheet: Option<BalanceSheetCategory>,
}

/// A strategy mapping leaf records to categories. Implementations are pure.
pub trait AccountClassifier {
    fn categories(&self, record: &LeafRecord) -> Vec<Category>;

    fn balance_sheet_category(&self, record: &LeafRecord) -> Option<BalanceSheetCategory>;

    fn classify(&self, record: &LeafRecord) -> ClassifiedAmount {
        ClassifiedAmount {
            record: record.clone(),
            categories: self.categories(record),
            balance_sheet: self.balance_sheet_category(record),
        }
    }

    fn classify_all(&self, records: &[LeafRecord]) -> Vec<ClassifiedAmount> {
        records.iter().map(|r| self.classify(r)).collect()
    }
}

fn first_matching_path<C: Copy>(rules: &[PathRule<C>], path: &[String]) -> Option<C> {
    rules.iter().find(|r| r.matches(path)).map(|r| r.category)
}

struct PreparedKeywordRule {
    category: Category,
    keywords: Vec<String>,
    code_prefixes: Vec<String>,
}

/// Keyword and code-prefix heuristics. Every rule is tested independently, so the
/// resulting totals are exploratory and may overlap.
pub struct FuzzyClassifier<'a> {
    config: &'a ClassifierConfig,
    rules: Vec<PreparedKeywordRule>,
}

impl<'a> FuzzyClassifier<'a> {
    pub fn new(config: &'a ClassifierConfig) -> Self {
        let rules = config
            .keyword_rules
            .iter()
            .map(|rule| PreparedKeywordRule {
                category: rule.category,
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
                code_prefixes: rule.code_prefixes.iter().map(|p| p.trim().to_string()).collect(),
            })
            .collect();
        Self { config, rules }
    }
}

impl AccountClassifier for FuzzyClassifier<'_> {
    fn categories(&self, record: &LeafRecord) -> Vec<Category> {
        let label = record.label.to_lowercase();
        let prefix = first_segment(&record.code);

        let mut categories: Vec<Category> = Vec::new();
        for rule in &self.rules {
            let keyword_hit = rule.keywords.iter().any(|k| label.contains(k.as_str()));
            let prefix_hit = !prefix.is_empty() && rule.code_prefixes.iter().any(|p| p == prefix);
            if (keyword_hit || prefix_hit) && !categories.contains(&rule.category) {
                categories.push(rule.category);
            }
        }
        categories
    }

    fn balance_sheet_category(&self, record: &LeafRecord) -> Option<BalanceSheetCategory> {
        first_matching_path(&self.config.balance_sheet_paths, &record.path)
    }
}

/// Literal hierarchy-path matching. The first matching rule wins, so a leaf lands in at
/// most one category.
pub struct ExactPathClassifier<'a> {
    config: &'a ClassifierConfig,
}

impl<'a> ExactPathClassifier<'a> {
    pub fn new(config: &'a ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn category(&self, record: &LeafRecord) -> Option<Category> {
        first_matching_path(&self.config.statement_paths, &record.path)
    }
}

impl AccountClassifier for ExactPathClassifier<'_> {
    fn categories(&self, record: &LeafRecord) -> Vec<Category> {
        self.category(record).into_iter().collect()
    }

    fn balance_sheet_category(&self, record: &LeafRecord) -> Option<BalanceSheetCategory> {
        first_matching_path(&self.config.balance_sheet_paths, &record.path)
    }
}

/// Builds the classifier selected by `mode`.
pub fn classifier_for<'a>(
    mode: ClassificationMode,
    config: &'a ClassifierConfig,
) -> Box<dyn AccountClassifier + 'a> {
    match mode {
        ClassificationMode::Fuzzy => Box::new(FuzzyClassifier::new(config)),
        ClassificationMode::ExactPath => Box::new(ExactPathClassifier::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Period;

    fn leaf(path: &[&str], code: &str, balance: f64) -> LeafRecord {
        LeafRecord {
            path: path.iter().map(|s| s.to_string()).collect(),
            code: code.to_string(),
            label: path.last().unwrap().to_string(),
            balance,
            period: Period::new(2023, 1).unwrap(),
            source: None,
        }
    }

    #[test]
    fn test_fuzzy_is_non_exclusive() {
        let config = ClassifierConfig::default();
        let classifier = FuzzyClassifier::new(&config);

        // "Custos" hits cost, "Serviços" hits revenue, and prefix 4 hits cost and expense.
        let record = leaf(&["CUSTOS E DESPESAS", "Custos dos Serviços"], "4.1.01", 80.0);
        let categories = classifier.categories(&record);
        assert!(categories.contains(&Category::Cost));
        assert!(categories.contains(&Category::Expense));
        assert!(categories.contains(&Category::Revenue));
    }

    #[test]
    fn test_fuzzy_case_insensitive_and_code_prefix() {
        let config = ClassifierConfig::default();
        let classifier = FuzzyClassifier::new(&config);

        let bank = leaf(&["ATIVO", "BANCO DO BRASIL"], "1.1.01.02", 10.0);
        assert_eq!(classifier.categories(&bank), vec![Category::CashEquivalent]);

        let revenue_by_code = leaf(&["Outros"], "03.2", 5.0);
        assert_eq!(classifier.categories(&revenue_by_code), vec![Category::Revenue]);

        let nothing = leaf(&["Fornecedores"], "2.1.01", -5.0);
        assert!(classifier.categories(&nothing).is_empty());
    }

    #[test]
    fn test_exact_path_is_exclusive() {
        let config = ClassifierConfig::default();
        let classifier = ExactPathClassifier::new(&config);

        let revenue = leaf(&["RECEITAS", "Serviços Prestados a Prazo"], "3.1", 1000.0);
        assert_eq!(classifier.categories(&revenue), vec![Category::Revenue]);

        let tax = leaf(
            &["RECEITAS", "Simples Nacional sobre vendas e serviços", "DAS"],
            "3.2.01",
            60.0,
        );
        assert_eq!(classifier.category(&tax), Some(Category::TaxOnSales));

        let wrong_case = leaf(&["Receitas", "Serviços Prestados a Prazo"], "3.1", 1.0);
        assert!(classifier.categories(&wrong_case).is_empty());
    }

    #[test]
    fn test_exact_path_cash_and_balance_sheet() {
        let config = ClassifierConfig::default();
        let classifier = ExactPathClassifier::new(&config);

        let cash = leaf(&["ATIVO", "ATIVO CIRCULANTE", "DISPONIBILIDADES", "Caixa"], "1.1.01.01", 25.0);
        let classified = classifier.classify(&cash);
        assert_eq!(classified.categories, vec![Category::CashEquivalent]);
        assert_eq!(classified.balance_sheet, Some(BalanceSheetCategory::CurrentAssets));

        let equity = leaf(&["PASSIVO", "PATRIMÔNIO LÍQUIDO", "Capital Social"], "2.3.01", -50.0);
        assert_eq!(
            classifier.balance_sheet_category(&equity),
            Some(BalanceSheetCategory::Equity)
        );
    }

    #[test]
    fn test_classification_is_idempotent() {
        let config = ClassifierConfig::default();
        let records = vec![
            leaf(&["RECEITAS", "Serviços Prestados a Prazo"], "3.1", 1000.0),
            leaf(&["CUSTOS E DESPESAS", "Salários"], "4.2.01", 300.0),
        ];
        for mode in [ClassificationMode::Fuzzy, ClassificationMode::ExactPath] {
            let classifier = classifier_for(mode, &config);
            let first = classifier.classify_all(&records);
            let second = classifier.classify_all(&records);
            assert_eq!(first, second);
        }
    }
}

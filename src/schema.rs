use crate::utils::normalize_number;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Debit/credit nature of a balance. Credit balances are carried as negative amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum BalanceNature {
    Debit,
    Credit,
}

impl BalanceNature {
    /// Recognizes `D`, `C`, `DB`, `CR`, `debit`, `credit`, `devedora`, `credora`, ...
    pub fn from_marker(marker: &str) -> Option<Self> {
        let upper = marker.trim().to_uppercase();
        if upper.is_empty() || !upper.chars().all(|c| c.is_alphabetic()) {
            return None;
        }
        if upper.starts_with('C') {
            Some(Self::Credit)
        } else if upper.starts_with('D') {
            Some(Self::Debit)
        } else {
            None
        }
    }

    pub fn apply(&self, magnitude: f64) -> f64 {
        match self {
            Self::Debit => magnitude.abs(),
            Self::Credit => -magnitude.abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredAmount {
    #[serde(alias = "valor", alias = "value")]
    #[schemars(description = "Unsigned (or signed) monetary amount.")]
    pub amount: f64,

    #[serde(default, alias = "natureza", alias = "sign", alias = "dc")]
    #[schemars(
        description = "Debit/credit marker such as 'D' or 'C'. Credit yields a negative balance; absent or debit keeps it positive."
    )]
    pub nature: Option<String>,
}

/// Every shape a balance field may take in a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum BalanceValue {
    #[schemars(description = "Plain signed number, e.g. 1234.56")]
    Number(f64),

    #[schemars(
        description = "Localized numeric string with an optional trailing debit/credit marker, e.g. '1.234,56C' or '1,234.56 D'"
    )]
    SignedString(String),

    #[schemars(description = "Amount paired with an explicit debit/credit marker")]
    StructuredAmount(StructuredAmount),
}

impl BalanceValue {
    /// Resolves the value to a signed amount. `None` means the value is unreadable.
    pub fn resolve(&self) -> Option<f64> {
        match self {
            Self::Number(value) => value.is_finite().then_some(*value),
            Self::SignedString(text) => parse_signed_string(text),
            Self::StructuredAmount(structured) => {
                if !structured.amount.is_finite() {
                    return None;
                }
                match structured.nature.as_deref() {
                    None => Some(structured.amount),
                    Some(marker) if marker.trim().is_empty() => Some(structured.amount),
                    Some(marker) => BalanceNature::from_marker(marker)
                        .map(|nature| nature.apply(structured.amount)),
                }
            }
        }
    }
}

fn parse_signed_string(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let split = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphabetic())
        .last()
        .map(|(idx, _)| idx);

    match split {
        Some(idx) => {
            let nature = BalanceNature::from_marker(&trimmed[idx..])?;
            let magnitude = normalize_number(&trimmed[..idx])?;
            Some(nature.apply(magnitude))
        }
        None => normalize_number(trimmed),
    }
}

/// The balance columns of one account line of a trial balance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BalanceFields {
    #[serde(default, alias = "saldo_atual", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Closing balance of the period. Preferred over every other field.")]
    pub current_balance: Option<BalanceValue>,

    #[serde(default, alias = "saldo_anterior", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Opening balance of the period.")]
    pub prior_balance: Option<BalanceValue>,

    #[serde(default, alias = "debito", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Debit movement within the period.")]
    pub debit: Option<BalanceValue>,

    #[serde(default, alias = "credito", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Credit movement within the period.")]
    pub credit: Option<BalanceValue>,
}

impl BalanceFields {
    pub fn is_empty(&self) -> bool {
        self.current_balance.is_none()
            && self.prior_balance.is_none()
            && self.debit.is_none()
            && self.credit.is_none()
    }

    /// Explicit balance, if the document carries one (directly or via movements).
    ///
    /// Current balance wins; otherwise prior + debit - credit when any of the three is
    /// present, with missing parts counted as zero.
    pub fn explicit_balance(&self) -> Option<f64> {
        if let Some(current) = &self.current_balance {
            return Some(current.resolve().unwrap_or(0.0));
        }
        if self.prior_balance.is_none() && self.debit.is_none() && self.credit.is_none() {
            return None;
        }
        let part = |v: &Option<BalanceValue>| v.as_ref().and_then(|b| b.resolve()).unwrap_or(0.0);
        Some(part(&self.prior_balance) + part(&self.debit) - part(&self.credit))
    }

    /// Leaf balance: the explicit balance, or zero.
    pub fn resolve(&self) -> f64 {
        self.explicit_balance().unwrap_or(0.0)
    }
}

/// Typed form of one node of a hierarchical trial balance document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccountNodeDocument {
    #[serde(alias = "descricao")]
    #[schemars(description = "Account description as printed in the trial balance, e.g. 'ATIVO CIRCULANTE'")]
    pub label: String,

    #[serde(default, alias = "conta", skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Dotted hierarchical account code, e.g. '1.1.05.03.0001'")]
    pub code: Option<String>,

    #[serde(flatten)]
    pub balances: BalanceFields,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(description = "Sub-accounts. Empty or absent for analytic (leaf) accounts.")]
    pub children: Vec<AccountNodeDocument>,
}

impl AccountNodeDocument {
    pub fn new(label: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            label: label.into(),
            code: code.map(str::to_string),
            balances: BalanceFields::default(),
            children: Vec::new(),
        }
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balances.current_balance = Some(BalanceValue::Number(balance));
        self
    }

    pub fn with_child(mut self, child: AccountNodeDocument) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AccountNodeDocument)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_marker_yields_negative_balance() {
        let credit = BalanceValue::SignedString("1.234,56C".to_string());
        assert_eq!(credit.resolve(), Some(-1234.56));

        let debit = BalanceValue::SignedString("1.234,56 D".to_string());
        assert_eq!(debit.resolve(), Some(1234.56));

        let unmarked = BalanceValue::SignedString("1.234,56".to_string());
        assert_eq!(unmarked.resolve(), Some(1234.56));

        let structured = BalanceValue::StructuredAmount(StructuredAmount {
            amount: 300.0,
            nature: Some("credit".to_string()),
        });
        assert_eq!(structured.resolve(), Some(-300.0));

        let structured_debit = BalanceValue::StructuredAmount(StructuredAmount {
            amount: 300.0,
            nature: None,
        });
        assert_eq!(structured_debit.resolve(), Some(300.0));
    }

    #[test]
    fn test_unreadable_values() {
        assert_eq!(BalanceValue::SignedString("12X".to_string()).resolve(), None);
        assert_eq!(BalanceValue::SignedString("abc".to_string()).resolve(), None);
        assert_eq!(BalanceValue::Number(f64::NAN).resolve(), None);
    }

    #[test]
    fn test_untagged_deserialization() {
        let number: BalanceValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(number, BalanceValue::Number(12.5));

        let text: BalanceValue = serde_json::from_str("\"10,00C\"").unwrap();
        assert_eq!(text.resolve(), Some(-10.0));

        let structured: BalanceValue =
            serde_json::from_str(r#"{"valor": 7.0, "natureza": "C"}"#).unwrap();
        assert_eq!(structured.resolve(), Some(-7.0));
    }

    #[test]
    fn test_balance_resolution_order() {
        let fields = BalanceFields {
            current_balance: Some(BalanceValue::Number(50.0)),
            prior_balance: Some(BalanceValue::Number(10.0)),
            debit: None,
            credit: None,
        };
        assert_eq!(fields.resolve(), 50.0);

        let movements = BalanceFields {
            current_balance: None,
            prior_balance: Some(BalanceValue::Number(100.0)),
            debit: Some(BalanceValue::Number(40.0)),
            credit: Some(BalanceValue::Number(15.0)),
        };
        assert_eq!(movements.resolve(), 125.0);

        let only_credit = BalanceFields {
            credit: Some(BalanceValue::Number(15.0)),
            ..Default::default()
        };
        assert_eq!(only_credit.resolve(), -15.0);

        assert_eq!(BalanceFields::default().explicit_balance(), None);
        assert_eq!(BalanceFields::default().resolve(), 0.0);
    }

    #[test]
    fn test_node_document_accepts_portuguese_keys() {
        let json = r#"{
            "conta": "1.1",
            "descricao": "ATIVO CIRCULANTE",
            "children": [
                {"conta": "1.1.01", "descricao": "Caixa", "saldo_atual": 150.0}
            ]
        }"#;
        let node: AccountNodeDocument = serde_json::from_str(json).unwrap();
        assert_eq!(node.label, "ATIVO CIRCULANTE");
        assert_eq!(node.code.as_deref(), Some("1.1"));
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].balances.resolve(), 150.0);
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = AccountNodeDocument::schema_as_json().unwrap();
        assert!(schema_json.contains("label"));
        assert!(schema_json.contains("children"));
        assert!(schema_json.contains("current_balance"));
    }
}

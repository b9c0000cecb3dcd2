//! Trial balances that arrive as plain text, one account per line:
//!
//! ```text
//! 1.1.01.001  Caixa Geral   1.000,00   500,00   200,00   1.300,00
//! ```
//!
//! The dotted code opens the line, the description runs up to the first number, and up to
//! four numbers follow in the order opening balance, debit, credit, closing balance.
//! Every dotted prefix of a code becomes a synthetic parent node.

use crate::schema::{AccountNodeDocument, BalanceValue};
use crate::utils::normalize_number;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn code_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+(?:\.\d+)+)\s+(.+)$").expect("static account line pattern"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"-?\d{1,3}(?:[.,]\d{3})*(?:[.,]\d+)?").expect("static number pattern")
    })
}

/// One recognized account line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub code: String,
    pub description: String,
    /// Numbers in line order; `None` where a token could not be read.
    pub amounts: Vec<Option<f64>>,
}

/// Extracts every line that starts with a dotted account code. Other lines are ignored.
pub fn parse_trial_balance_lines(text: &str) -> Vec<TrialBalanceLine> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = code_line_re().captures(line) else {
            continue;
        };
        let code = caps[1].trim().to_string();
        let tail = caps[2].trim_end();

        let numbers: Vec<regex::Match> = number_re().find_iter(tail).collect();
        let description = match numbers.first() {
            Some(first) => tail[..first.start()].trim(),
            None => tail.trim(),
        };

        lines.push(TrialBalanceLine {
            code,
            description: description.to_string(),
            amounts: numbers
                .iter()
                .take(4)
                .map(|m| normalize_number(m.as_str()))
                .collect(),
        });
    }
    debug!("Recognized {} account lines", lines.len());
    lines
}

/// Builds the account hierarchy implied by the dotted codes, children ordered by code.
pub fn build_account_documents(lines: &[TrialBalanceLine]) -> Vec<AccountNodeDocument> {
    let mut roots = Vec::new();
    for line in lines {
        insert_line(&mut roots, line);
    }
    sort_by_code(&mut roots);
    roots
}

/// Parses the text and builds the account hierarchy in one step.
pub fn import_trial_balance_text(text: &str) -> Vec<AccountNodeDocument> {
    let lines = parse_trial_balance_lines(text);
    let roots = build_account_documents(&lines);
    info!(
        "Imported {} account lines into {} root accounts",
        lines.len(),
        roots.len()
    );
    roots
}

fn insert_line(roots: &mut Vec<AccountNodeDocument>, line: &TrialBalanceLine) {
    let parts: Vec<&str> = line.code.split('.').collect();
    let mut siblings = roots;

    for depth in 0..parts.len() {
        let code = parts[..=depth].join(".");
        let idx = match siblings
            .iter()
            .position(|n| n.code.as_deref() == Some(code.as_str()))
        {
            Some(idx) => idx,
            None => {
                siblings.push(AccountNodeDocument::new(code.clone(), Some(&code)));
                siblings.len() - 1
            }
        };

        let node = &mut siblings[idx];
        if depth + 1 == parts.len() {
            if !line.description.is_empty() {
                node.label = line.description.clone();
            }
            assign_amounts(node, &line.amounts);
            return;
        }
        siblings = &mut node.children;
    }
}

fn assign_amounts(node: &mut AccountNodeDocument, amounts: &[Option<f64>]) {
    let balances = &mut node.balances;
    let slots = [
        &mut balances.prior_balance,
        &mut balances.debit,
        &mut balances.credit,
        &mut balances.current_balance,
    ];
    for (slot, amount) in slots.into_iter().zip(amounts) {
        if let Some(value) = amount {
            *slot = Some(BalanceValue::Number(*value));
        }
    }
}

fn code_key(code: Option<&str>) -> Vec<u64> {
    code.unwrap_or("")
        .split('.')
        .map(|part| part.parse().unwrap_or(u64::MAX))
        .collect()
}

fn sort_by_code(nodes: &mut [AccountNodeDocument]) {
    nodes.sort_by_key(|n| code_key(n.code.as_deref()));
    for node in nodes {
        sort_by_code(&mut node.children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
BALANCETE DE VERIFICAÇÃO
Período: 01/01/2023 - 31/01/2023
1.1.01.002 Banco do Brasil 2.000,00 1.000,00 500,00 2.500,00
1.1.01.001 Caixa Geral 1.000,00 500,00 200,00 1.300,00
1.2.10 Imobilizado 10.000,00
1.1 ATIVO CIRCULANTE
";

    #[test]
    fn test_parse_lines() {
        let lines = parse_trial_balance_lines(SAMPLE);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].code, "1.1.01.002");
        assert_eq!(lines[0].description, "Banco do Brasil");
        assert_eq!(
            lines[0].amounts,
            vec![Some(2000.0), Some(1000.0), Some(500.0), Some(2500.0)]
        );
        assert_eq!(lines[3].description, "ATIVO CIRCULANTE");
        assert!(lines[3].amounts.is_empty());
    }

    #[test]
    fn test_builds_synthetic_hierarchy_sorted_by_code() {
        let roots = import_trial_balance_text(SAMPLE);
        assert_eq!(roots.len(), 1);

        let root = &roots[0];
        assert_eq!(root.code.as_deref(), Some("1"));
        assert_eq!(root.label, "1");
        assert_eq!(root.children.len(), 2);

        let current = &root.children[0];
        assert_eq!(current.label, "ATIVO CIRCULANTE");
        let cash = &current.children[0];
        assert_eq!(cash.code.as_deref(), Some("1.1.01"));
        let leaves: Vec<&str> = cash.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(leaves, vec!["Caixa Geral", "Banco do Brasil"]);
        assert_eq!(cash.children[0].balances.resolve(), 1300.0);
    }

    #[test]
    fn test_single_amount_is_opening_balance() {
        let roots = import_trial_balance_text("1.2.10 Imobilizado 10.000,00");
        let leaf = &roots[0].children[0].children[0];
        assert!(leaf.balances.current_balance.is_none());
        assert_eq!(leaf.balances.resolve(), 10000.0);
    }

    #[test]
    fn test_numeric_child_order() {
        let roots = import_trial_balance_text("3.10 Dez\n3.2 Dois\n3.1 Um");
        let codes: Vec<&str> = roots[0]
            .children
            .iter()
            .filter_map(|c| c.code.as_deref())
            .collect();
        assert_eq!(codes, vec!["3.1", "3.2", "3.10"]);
    }
}

//! String-level building blocks for the expressions handed to the algebra backend.
//!
//! The core never interprets the tokens it assembles; it only combines them with
//! products, sums and negations, parenthesising every operand.

use itertools::Itertools;

/// Unit imaginary number as understood by the backend.
pub const I: &str = "i_";

pub fn parwrap<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    terms.iter().map(|t| format!("({})", t.as_ref())).collect()
}

/// Product of all terms, each one wrapped in parentheses. The empty product is `1`.
pub fn times<S: AsRef<str>>(terms: &[S]) -> String {
    if terms.is_empty() {
        return "1".into();
    }
    parwrap(terms).join("*")
}

/// Sum of all terms, each one wrapped in parentheses. The empty sum is `0`.
pub fn plus<S: AsRef<str>>(terms: &[S]) -> String {
    if terms.is_empty() {
        return "0".into();
    }
    parwrap(terms).join("+")
}

pub fn minus(term: &str) -> String {
    format!("-({})", term)
}

/// Split a signed combination of momenta into its components, keeping the signs.
///
/// `-p1+p2-p3` becomes `["-p1", "+p2", "-p3"]`.
pub fn split_momentum(momentum: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in momentum.chars().filter(|c| !c.is_whitespace()) {
        if (c == '+' || c == '-') && current.chars().any(|c| c != '+' && c != '-') {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if current.chars().any(|c| c != '+' && c != '-') {
        parts.push(current);
    }
    parts
}

/// Attach a list of indices to every term of a linear combination of vectors:
/// `p1-p2` with `[mu3]` becomes `p1(mu3)-p2(mu3)`. A literal `0` is left untouched.
pub fn attach_indices<S: AsRef<str>>(combination: &str, indices: &[S]) -> String {
    if combination.trim() == "0" {
        return combination.to_string();
    }
    let suffix = format!("({})", indices.iter().map(|i| i.as_ref()).join(","));
    split_momentum(combination)
        .into_iter()
        .map(|term| format!("{term}{suffix}"))
        .collect()
}

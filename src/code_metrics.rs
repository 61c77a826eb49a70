//! Lightweight source scanning for `log_code_metrics`
//!
//! Locates a function definition by name (Python `def`, Rust `fn`,
//! JavaScript `function`) and derives a branch-count complexity and a
//! documentation score from the text around it. Indentation delimits the
//! body, which is good enough for the conventionally formatted files this
//! runs against.

use regex::Regex;

/// What a scan found out about one function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionScan {
    /// 1 + branch points in the body
    pub complexity: u32,
    /// Docstring or doc-comment text, markers stripped
    pub doc: Option<String>,
    pub has_type_hints: bool,
}

impl FunctionScan {
    /// Documentation quality, 0-100
    pub fn documentation_score(&self) -> u32 {
        let mut score = 0;
        if let Some(doc) = &self.doc {
            score += 30;
            if doc.len() > 50 {
                score += 10;
            }
            if section(doc, r"(?i)\b(args?|arguments|parameters?|params?)\s*:|#\s*arguments") {
                score += 20;
            }
            if section(doc, r"(?i)\breturns?\s*:|#\s*returns") {
                score += 20;
            }
            if section(doc, r"(?i)\b(examples?|usage)\s*:|#\s*examples?") {
                score += 10;
            }
            if section(doc, r"(?i)\b(raises?|errors?|throws?)\s*:|#\s*errors") {
                score += 5;
            }
        }
        if self.has_type_hints {
            score += 5;
        }
        score.min(100)
    }
}

fn section(doc: &str, pattern: &str) -> bool {
    Regex::new(pattern).map(|re| re.is_match(doc)).unwrap_or(false)
}

/// Scan `source` for a function called `name`
pub fn scan_function(source: &str, name: &str) -> Option<FunctionScan> {
    let def_re = Regex::new(&format!(
        r"^(\s*)(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:def|fn|function)\s+{}\b",
        regex::escape(name)
    ))
    .ok()?;

    let lines: Vec<&str> = source.lines().collect();
    let def_idx = lines.iter().position(|line| def_re.is_match(line))?;
    let def_indent = indent_of(lines[def_idx]);

    // Body: everything indented deeper than the definition
    let mut body = Vec::new();
    for line in &lines[def_idx + 1..] {
        if line.trim().is_empty() {
            body.push(*line);
            continue;
        }
        if indent_of(line) <= def_indent {
            break;
        }
        body.push(*line);
    }

    let signature = signature_text(&lines[def_idx..]);
    let doc = python_docstring(&body).or_else(|| comment_doc(&lines[..def_idx]));

    Some(FunctionScan {
        complexity: complexity(&body),
        doc,
        has_type_hints: has_type_hints(&signature),
    })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Definition line plus continuation lines up to the body opener
fn signature_text(lines: &[&str]) -> String {
    let mut sig = String::new();
    for line in lines.iter().take(10) {
        sig.push_str(line.trim());
        sig.push(' ');
        let trimmed = line.trim_end();
        if trimmed.ends_with(':') || trimmed.contains('{') {
            break;
        }
    }
    sig
}

fn has_type_hints(signature: &str) -> bool {
    if signature.contains("->") {
        return true;
    }
    let params = match (signature.find('('), signature.rfind(')')) {
        (Some(open), Some(close)) if close > open => &signature[open + 1..close],
        _ => return false,
    };
    params.contains(':')
}

fn complexity(body: &[&str]) -> u32 {
    let branch_re = Regex::new(
        r"\b(if|elif|while|for|except|catch|case|with|assert|and|or)\b|&&|\|\|",
    );
    let Ok(branch_re) = branch_re else {
        return 1;
    };

    let branches: usize = body
        .iter()
        .map(|line| line.trim())
        .filter(|line| !is_comment(line))
        .map(|line| branch_re.find_iter(line).count())
        .sum();
    1 + branches as u32
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//") || line.starts_with('*')
}

/// Triple-quoted string as the first statement of the body
fn python_docstring(body: &[&str]) -> Option<String> {
    let mut lines = body.iter().map(|l| l.trim()).skip_while(|l| l.is_empty());
    let first = lines.next()?;
    let quote = ["\"\"\"", "'''"].into_iter().find(|q| first.starts_with(q))?;

    let rest = &first[quote.len()..];
    if let Some(end) = rest.find(quote) {
        return Some(rest[..end].trim().to_string());
    }

    let mut doc = vec![rest.to_string()];
    for line in lines {
        if let Some(end) = line.find(quote) {
            doc.push(line[..end].to_string());
            break;
        }
        doc.push(line.to_string());
    }
    let text = doc.join("\n").trim().to_string();
    Some(text)
}

/// `///` or `/** */` comments directly above the definition
fn comment_doc(preceding: &[&str]) -> Option<String> {
    let mut doc = Vec::new();
    for line in preceding.iter().rev().map(|l| l.trim()) {
        if line.starts_with("#[") || line.starts_with('@') {
            continue;
        }
        if let Some(text) = line.strip_prefix("///") {
            doc.push(text.trim().to_string());
        } else if line.starts_with("/**") || line.starts_with('*') {
            let text = line
                .trim_start_matches("/**")
                .trim_start_matches("*/")
                .trim_start_matches('*')
                .trim_end_matches("*/");
            doc.push(text.trim().to_string());
        } else {
            break;
        }
    }
    if doc.is_empty() {
        return None;
    }
    doc.reverse();
    let text = doc.join("\n").trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTHON: &str = r#"
import re

def parse(value: str) -> int:
    """
    Parse a value into an integer.

    Args:
        value: raw text
    Returns:
        The parsed integer.
    """
    if not value:
        return 0
    for ch in value:
        if ch.isdigit() and ch != "0":
            pass
    return int(value)

def untyped(x):
    return x
"#;

    const RUST: &str = r#"
/// Sum the even numbers.
///
/// # Arguments
/// * `items` - numbers to scan
#[inline]
pub fn sum_even(items: &[i32]) -> i32 {
    let mut total = 0;
    for i in items {
        if i % 2 == 0 || *i == 0 {
            total += i;
        }
    }
    total
}
"#;

    #[test]
    fn test_scan_python_function() {
        let scan = scan_function(PYTHON, "parse").unwrap();
        // if, for, if, and
        assert_eq!(scan.complexity, 5);
        assert!(scan.has_type_hints);
        let doc = scan.doc.clone().unwrap();
        assert!(doc.starts_with("Parse a value"));
        // docstring 30 + long 10 + args 20 + returns 20 + hints 5
        assert_eq!(scan.documentation_score(), 85);
    }

    #[test]
    fn test_scan_untyped_python_function() {
        let scan = scan_function(PYTHON, "untyped").unwrap();
        assert_eq!(scan.complexity, 1);
        assert!(!scan.has_type_hints);
        assert_eq!(scan.doc, None);
        assert_eq!(scan.documentation_score(), 0);
    }

    #[test]
    fn test_scan_rust_function() {
        let scan = scan_function(RUST, "sum_even").unwrap();
        // for, if, ||
        assert_eq!(scan.complexity, 4);
        assert!(scan.has_type_hints);
        assert!(scan.doc.unwrap().contains("# Arguments"));
    }

    #[test]
    fn test_missing_function() {
        assert!(scan_function(PYTHON, "nope").is_none());
        // Prefix of another name doesn't match
        assert!(scan_function(PYTHON, "pars").is_none());
    }
}

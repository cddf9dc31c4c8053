//! Diagnostics and the parsers that produce them from checker output

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `path(line,col): error TS2322: message`
static TSC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<path>[^\s:(][^():]*)\((?P<line>\d+),(?P<col>\d+)\):\s*(?P<sev>error|warning)\s*TS\d+:\s*(?P<msg>.+)$")
        .expect("valid tsc line regex")
});

/// `error TS5058: message` with no location (project-level problems)
static TSC_GLOBAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?P<sev>error|warning)\s*TS\d+:\s*(?P<msg>.+)$").expect("valid tsc global regex"));

/// `path:line:col: message [Error/rule]` as printed by `eslint --format unix`
static UNIX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<path>[^\s:][^:]*):(?P<line>\d+):(?P<col>\d+):\s*(?P<msg>.*?)\s*\[(?P<sev>Error|Warning)(?:/(?P<rule>[^\]]+))?\]\s*$")
        .expect("valid unix line regex")
});

/// File name used for diagnostics that are not tied to a source file
pub const PROJECT_FILE: &str = "<project>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One reported issue from a checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(file: impl Into<String>, line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.line {
            Some(line) => write!(f, "{}:{}: {}: {}", self.file, line, severity, self.message),
            None => write!(f, "{}: {}: {}", self.file, severity, self.message),
        }
    }
}

fn clean_path(path: &str, root: Option<&str>) -> String {
    let path = path.trim().replace('\\', "/");
    let path = match root {
        Some(root) => path
            .strip_prefix(root)
            .map(|p| p.trim_start_matches('/').to_string())
            .unwrap_or(path),
        None => path,
    };
    path.trim_start_matches("./").to_string()
}

/// Parse one line of `tsc --pretty false` output
pub fn parse_tsc_line(raw: &str, root: Option<&str>) -> Option<Diagnostic> {
    if let Some(caps) = TSC_LINE.captures(raw) {
        let severity = match &caps["sev"] {
            "warning" => Severity::Warning,
            _ => Severity::Error,
        };
        return Some(Diagnostic {
            file: clean_path(&caps["path"], root),
            line: caps["line"].parse().ok(),
            message: caps["msg"].trim().to_string(),
            severity,
        });
    }

    let caps = TSC_GLOBAL.captures(raw)?;
    let severity = match &caps["sev"] {
        "warning" => Severity::Warning,
        _ => Severity::Error,
    };
    Some(Diagnostic {
        file: PROJECT_FILE.to_string(),
        line: None,
        message: caps["msg"].trim().to_string(),
        severity,
    })
}

/// Parse one line of `eslint --format unix` output
pub fn parse_unix_line(raw: &str, root: Option<&str>) -> Option<Diagnostic> {
    let caps = UNIX_LINE.captures(raw)?;
    let severity = match &caps["sev"] {
        "Warning" => Severity::Warning,
        _ => Severity::Error,
    };
    let message = match caps.name("rule") {
        Some(rule) => format!("{} ({})", caps["msg"].trim(), rule.as_str()),
        None => caps["msg"].trim().to_string(),
    };
    Some(Diagnostic {
        file: clean_path(&caps["path"], root),
        line: caps["line"].parse().ok(),
        message,
        severity,
    })
}

/// Parse every recognizable diagnostic line in a checker's output
///
/// `root` is stripped from absolute paths so diagnostics name files the way
/// the model addressed them.
pub fn parse_output(output: &str, root: Option<&str>) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| parse_unix_line(line, root).or_else(|| parse_tsc_line(line, root)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        for re in [&*TSC_LINE, &*TSC_GLOBAL, &*UNIX_LINE] {
            assert!(re.captures_len() > 1);
        }
    }

    #[test]
    fn test_parse_tsc_line() {
        let d = parse_tsc_line(
            "exercises/odd-one-out/index.tsx(12,5): error TS2322: Type 'string' is not assignable to type 'number'.",
            None,
        )
        .unwrap();

        assert_eq!(d.file, "exercises/odd-one-out/index.tsx");
        assert_eq!(d.line, Some(12));
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.starts_with("Type 'string'"));
    }

    #[test]
    fn test_parse_tsc_global_line() {
        let d = parse_tsc_line("error TS5083: Cannot read file 'tsconfig.json'.", None).unwrap();
        assert_eq!(d.file, PROJECT_FILE);
        assert_eq!(d.line, None);
        assert!(d.is_error());
    }

    #[test]
    fn test_parse_unix_line_strips_root() {
        let d = parse_unix_line(
            "/tmp/.tmpAb12/exercises/odd-one-out/Card.tsx:3:10: 'x' is defined but never used. [Warning/no-unused-vars]",
            Some("/tmp/.tmpAb12"),
        )
        .unwrap();

        assert_eq!(d.file, "exercises/odd-one-out/Card.tsx");
        assert_eq!(d.line, Some(3));
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.message, "'x' is defined but never used. (no-unused-vars)");
    }

    #[test]
    fn test_parse_unix_line_without_rule() {
        let d = parse_unix_line("a.ts:1:1: Parsing error: Unexpected token [Error]", None).unwrap();
        assert!(d.is_error());
        assert_eq!(d.message, "Parsing error: Unexpected token");
    }

    #[test]
    fn test_parse_output_skips_noise() {
        let output = "\
exercises/x/a.ts(1,2): error TS2304: Cannot find name 'foo'.
  This line continues the previous message.

3 problems
exercises/x/b.ts:4:2: Missing semicolon. [Error/semi]
";
        let diagnostics = parse_output(output, None);

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].file, "exercises/x/a.ts");
        assert_eq!(diagnostics[1].file, "exercises/x/b.ts");
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::error("a.ts", Some(3), "type error");
        assert_eq!(d.to_string(), "a.ts:3: error: type error");

        let d = Diagnostic::warning("a.ts", None, "style");
        assert_eq!(d.to_string(), "a.ts: warning: style");
    }
}

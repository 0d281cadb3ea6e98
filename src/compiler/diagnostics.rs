use crate::compiler::Dialect;
use once_cell::sync::Lazy;
use regex::Regex;

static GNU_ERROR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<file>(?:[A-Za-z]:)?[^:]+):(?P<line>\d+):(?P<col>\d+):\s*(?:fatal\s+)?error:\s*(?P<msg>.+)$")
        .unwrap()
});

static GNU_WARNING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<file>(?:[A-Za-z]:)?[^:]+):(?P<line>\d+):(?P<col>\d+):\s*warning:\s*(?P<msg>.+)$").unwrap()
});

static MSVC_ERROR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<file>[^(]+)\((?P<line>\d+)(?:,(?P<col>\d+))?\)\s*:\s*(?:fatal\s+)?error\s+(?P<code>[^:]+):\s*(?P<msg>.+)$")
        .unwrap()
});

static MSVC_WARNING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<file>[^(]+)\((?P<line>\d+)(?:,(?P<col>\d+))?\)\s*:\s*warning\s+(?P<code>[^:]+):\s*(?P<msg>.+)$")
        .unwrap()
});

/// Errors and warnings split out of one invocation's stderr, in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/** Line-oriented diagnostic splitter for one dialect
 *
 * Lines matching neither rule are dropped.
 */
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticParser {
    dialect: Dialect,
}

impl DiagnosticParser {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    fn rules(&self) -> (&'static Regex, &'static Regex) {
        match self.dialect {
            Dialect::Msvc => (&MSVC_ERROR_REGEX, &MSVC_WARNING_REGEX),
            Dialect::Gcc | Dialect::Clang => (&GNU_ERROR_REGEX, &GNU_WARNING_REGEX),
        }
    }

    pub fn parse(&self, output: &str) -> Diagnostics {
        let (error_rule, warning_rule) = self.rules();
        let mut diagnostics = Diagnostics::default();

        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if error_rule.is_match(line) {
                diagnostics.errors.push(line.to_string());
            } else if warning_rule.is_match(line) {
                diagnostics.warnings.push(line.to_string());
            }
        }

        diagnostics
    }
}

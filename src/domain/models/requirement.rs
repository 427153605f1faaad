use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing requirement lines
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequirementParseError {
    #[error("Line {line}: pip options are not supported in requirement sets: {text}")]
    UnsupportedOption { line: usize, text: String },

    #[error("Line {line}: missing package name: {text}")]
    MissingName { line: usize, text: String },

    #[error("Line {line}: unterminated extras list: {text}")]
    UnterminatedExtras { line: usize, text: String },
}

/// A single package specifier: name (with optional extras) plus a version constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    /// Package name as written, including any `[extras]`
    pub name: String,

    /// Version clauses and optional environment marker, e.g. `>=1.24,<2; python_version>"3.9"`
    pub constraint: String,
}

impl RequirementSpec {
    /// Parse one requirements line
    ///
    /// Returns `Ok(None)` for blank and comment lines.
    pub fn parse_line(raw: &str, line: usize) -> Result<Option<Self>, RequirementParseError> {
        let text = strip_inline_comment(raw).trim();
        if text.is_empty() {
            return Ok(None);
        }

        if text.starts_with('-') {
            return Err(RequirementParseError::UnsupportedOption {
                line,
                text: text.to_string(),
            });
        }

        let mut name_end = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(text.len());

        if name_end == 0 {
            return Err(RequirementParseError::MissingName {
                line,
                text: text.to_string(),
            });
        }

        if text[name_end..].starts_with('[') {
            let close = text[name_end..]
                .find(']')
                .ok_or_else(|| RequirementParseError::UnterminatedExtras {
                    line,
                    text: text.to_string(),
                })?;
            name_end += close + 1;
        }

        Ok(Some(Self {
            name: text[..name_end].to_string(),
            constraint: text[name_end..].trim().to_string(),
        }))
    }

    /// Normalized project name (PEP 503): lowercase, separator runs collapsed to `-`, extras dropped
    pub fn normalized_name(&self) -> String {
        let bare = self.name.split('[').next().unwrap_or_default();
        let mut normalized = String::with_capacity(bare.len());
        let mut last_was_sep = false;
        for c in bare.chars() {
            if matches!(c, '-' | '_' | '.') {
                if !last_was_sep {
                    normalized.push('-');
                }
                last_was_sep = true;
            } else {
                normalized.push(c.to_ascii_lowercase());
                last_was_sep = false;
            }
        }
        normalized
    }

    /// Same package with every version clause removed; environment markers survive
    pub fn unconstrained(&self) -> Self {
        let marker = self
            .constraint
            .split_once(';')
            .map(|(_, marker)| format!("; {}", marker.trim()))
            .unwrap_or_default();

        Self {
            name: self.name.clone(),
            constraint: marker,
        }
    }
}

impl fmt::Display for RequirementSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraint.starts_with(';') {
            write!(f, "{} {}", self.name, self.constraint)
        } else {
            write!(f, "{}{}", self.name, self.constraint)
        }
    }
}

fn strip_inline_comment(raw: &str) -> &str {
    if raw.trim_start().starts_with('#') {
        return "";
    }
    match raw.find(" #") {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

/// Ordered, immutable list of package specifiers forming one candidate resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementSet {
    specs: Vec<RequirementSpec>,
}

impl RequirementSet {
    /// Build a set from already-parsed specifiers
    pub fn new(specs: Vec<RequirementSpec>) -> Self {
        Self { specs }
    }

    /// Parse the contents of a requirements file
    pub fn parse(contents: &str) -> Result<Self, RequirementParseError> {
        let mut specs = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if let Some(spec) = RequirementSpec::parse_line(line, idx + 1)? {
                specs.push(spec);
            }
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[RequirementSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Look up a specifier by normalized package name
    pub fn get(&self, name: &str) -> Option<&RequirementSpec> {
        let wanted = RequirementSpec {
            name: name.to_string(),
            constraint: String::new(),
        }
        .normalized_name();
        self.specs.iter().find(|s| s.normalized_name() == wanted)
    }

    /// Return a new set where every pinned specifier wins over a proposal for the same package
    ///
    /// Replaced specifiers keep their position; pins missing from the set are
    /// appended in pin order.
    pub fn enforce_pins(&self, pins: &Self) -> Self {
        let mut specs: Vec<RequirementSpec> = self
            .specs
            .iter()
            .map(|spec| {
                let name = spec.normalized_name();
                pins.specs
                    .iter()
                    .find(|pin| pin.normalized_name() == name)
                    .unwrap_or(spec)
                    .clone()
            })
            .collect();

        for pin in &pins.specs {
            let name = pin.normalized_name();
            if !specs.iter().any(|s| s.normalized_name() == name) {
                specs.push(pin.clone());
            }
        }

        Self { specs }
    }

    /// Return a new set with version constraints dropped from every non-pinned package
    pub fn widened(&self, pins: &Self) -> Self {
        Self {
            specs: self.specs.iter().map(RequirementSpec::unconstrained).collect(),
        }
        .enforce_pins(pins)
    }

    /// Render as requirements-file text, one specifier per line
    pub fn to_file_contents(&self) -> String {
        let mut out = String::new();
        for spec in &self.specs {
            out.push_str(&spec.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for RequirementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.specs.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(text: &str) -> RequirementSet {
        RequirementSet::parse(text).unwrap()
    }

    #[test]
    fn test_parse_common_forms() {
        let parsed = set("numpy>=1.24,<2\nrequests\n\n# comment\nmatplotlib[dev] == 3.8.0  # pinned\n");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.specs()[0].name, "numpy");
        assert_eq!(parsed.specs()[0].constraint, ">=1.24,<2");
        assert_eq!(parsed.specs()[1].constraint, "");
        assert_eq!(parsed.specs()[2].name, "matplotlib[dev]");
        assert_eq!(parsed.specs()[2].constraint, "== 3.8.0");
    }

    #[test]
    fn test_parse_rejects_pip_options() {
        let err = RequirementSet::parse("numpy\n--index-url https://example.org\n").unwrap_err();
        assert!(matches!(
            err,
            RequirementParseError::UnsupportedOption { line: 2, .. }
        ));
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        let err = RequirementSet::parse(">=1.0").unwrap_err();
        assert!(matches!(err, RequirementParseError::MissingName { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_unterminated_extras() {
        let err = RequirementSet::parse("pkg[extra>=1").unwrap_err();
        assert!(matches!(err, RequirementParseError::UnterminatedExtras { .. }));
    }

    #[test]
    fn test_normalized_name() {
        let spec = RequirementSpec::parse_line("Foo__Bar.baz[x]>=1", 1).unwrap().unwrap();
        assert_eq!(spec.normalized_name(), "foo-bar-baz");
    }

    #[test]
    fn test_marker_round_trips_through_display() {
        let spec = RequirementSpec::parse_line("tomli; python_version < \"3.11\"", 1)
            .unwrap()
            .unwrap();
        assert_eq!(spec.to_string(), "tomli ; python_version < \"3.11\"");
        let again = RequirementSpec::parse_line(&spec.to_string(), 1).unwrap().unwrap();
        assert_eq!(again, spec);
    }

    #[test]
    fn test_enforce_pins_replaces_in_place_and_appends() {
        let proposal = set("numpy==2.0.0\nscipy>=1.10\n");
        let pins = set("NumPy==1.26.4\npyparsing==3.1.2\n");

        let merged = proposal.enforce_pins(&pins);
        assert_eq!(
            merged.to_file_contents(),
            "NumPy==1.26.4\nscipy>=1.10\npyparsing==3.1.2\n"
        );
        // original untouched
        assert_eq!(proposal.specs()[0].constraint, "==2.0.0");
    }

    #[test]
    fn test_widened_keeps_pins_and_markers() {
        let initial = set("numpy==1.26.4\ncycler>=0.10; python_version >= \"3.9\"\nkiwisolver<1.5\n");
        let pins = set("kiwisolver==1.4.5\n");

        let widened = initial.widened(&pins);
        assert_eq!(widened.get("numpy").unwrap().constraint, "");
        assert_eq!(
            widened.get("cycler").unwrap().constraint,
            "; python_version >= \"3.9\""
        );
        assert_eq!(widened.get("kiwisolver").unwrap().constraint, "==1.4.5");
    }

    #[test]
    fn test_empty_set_file_contents() {
        assert_eq!(RequirementSet::default().to_file_contents(), "");
        assert!(RequirementSet::default().is_empty());
    }
}

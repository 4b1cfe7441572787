//! Error types for coedit binaries.

use miette::{Diagnostic, NamedSource, SourceOffset, SourceSpan};

/// Main error type for coedit tooling.
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum CoeditError {
    /// IO error
    #[error(transparent)]
    #[diagnostic(code(coedit::io))]
    Io(#[from] std::io::Error),

    /// Unparseable input with source location
    #[error(transparent)]
    #[diagnostic_source]
    Parse(#[from] ParseError),

    /// Switching to a historical version failed
    #[error(transparent)]
    #[diagnostic(code(coedit::version), help("check that the snapshot file has this version"))]
    Version(#[from] coedit_core::VersionError),
}

/// A line of JSON input that failed to parse, pointing at the offending column.
#[derive(thiserror::Error, Debug, Diagnostic)]
#[error("invalid JSON on line {line}")]
#[diagnostic(code(coedit::parse))]
pub struct ParseError {
    #[source]
    source: serde_json::Error,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    err_location: SourceSpan,
    line: usize,
    #[help]
    advice: Option<String>,
}

impl ParseError {
    /// Wrap a serde_json error for `text`, which is line `line` of `name`.
    pub fn json(name: impl AsRef<str>, line: usize, text: &str, source: serde_json::Error) -> Self {
        let offset = SourceOffset::from_location(text, source.line(), source.column());
        let len = usize::from(offset.offset() < text.len());
        Self {
            source,
            src: NamedSource::new(name, text.to_string()),
            err_location: SourceSpan::new(offset, len),
            line,
            advice: None,
        }
    }

    pub fn with_advice(mut self, advice: impl Into<String>) -> Self {
        self.advice = Some(advice.into());
        self
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_points_at_column() {
        let text = r#"{"event": "delta", }"#;
        let err = serde_json::from_str::<serde_json::Value>(text).unwrap_err();
        let parse = ParseError::json("log.jsonl", 3, text, err).with_advice("one event per line");

        assert_eq!(parse.line(), 3);
        assert_eq!(parse.to_string(), "invalid JSON on line 3");
        assert!(parse.err_location.offset() > 0);
        assert!(parse.err_location.offset() < text.len());
        assert_eq!(parse.help().map(|h| h.to_string()).as_deref(), Some("one event per line"));
    }

    #[test]
    fn test_error_codes() {
        let err = CoeditError::from(coedit_core::VersionError::Missing(4));
        assert_eq!(err.code().map(|c| c.to_string()).as_deref(), Some("coedit::version"));
        assert_eq!(err.to_string(), "version 4 does not exist");
    }
}

//! Reclassification of command failures by output signature
//!
//! An [`ErrorMap`] is consulted when an external command exits non-zero.
//! The first pattern found in the output builds the error returned to the
//! caller; when nothing matches the original error is kept.

use crate::core::error::ScmError;
use crate::security::mask::Mask;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Builds a typed error from the (masked) command output
pub type ErrorBuilder = Arc<dyn Fn(&str) -> ScmError + Send + Sync>;

/// Output signature and the error it maps to
#[derive(Clone)]
pub struct ErrorPattern {
    pub regex: Regex,
    pub build: ErrorBuilder,
}

impl ErrorPattern {
    pub fn new<F>(regex: Regex, build: F) -> Self
    where
        F: Fn(&str) -> ScmError + Send + Sync + 'static,
    {
        Self {
            regex,
            build: Arc::new(build),
        }
    }

    /// Maps the pattern to [`ScmError::BasicAuth`], carrying the matched line.
    pub fn basic_auth(regex: Regex) -> Self {
        let line_regex = regex.clone();
        Self::new(regex, move |output| ScmError::BasicAuth {
            reason: matched_line(&line_regex, output),
        })
    }
}

impl fmt::Debug for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPattern")
            .field("regex", &self.regex.as_str())
            .finish_non_exhaustive()
    }
}

/// Ordered list of failure signatures
#[derive(Debug, Clone, Default)]
pub struct ErrorMap {
    patterns: Vec<ErrorPattern>,
}

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pattern: ErrorPattern) {
        self.patterns.push(pattern);
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Signatures of git authentication failures.
    pub fn git() -> Self {
        Self {
            patterns: vec![
                ErrorPattern::basic_auth(Regex::new(r"Authentication failed").unwrap()),
                ErrorPattern::basic_auth(Regex::new(r"could not read Username").unwrap()),
            ],
        }
    }

    /// Signatures of subversion authentication failures.
    pub fn subversion() -> Self {
        Self {
            patterns: vec![
                // Authorization failed
                ErrorPattern::basic_auth(Regex::new(r"E170001").unwrap()),
                // Unable to connect (auth)
                ErrorPattern::basic_auth(Regex::new(r"E170013.*[Aa]uth").unwrap()),
                // No more credentials
                ErrorPattern::basic_auth(Regex::new(r"E215004").unwrap()),
            ],
        }
    }

    /// Error built by the first matching pattern, if any.
    pub fn classify(&self, output: &str) -> Option<ScmError> {
        self.classify_masked(output, &Mask::new())
    }

    /// Match against the raw `output`; the error is built from its masked form.
    pub fn classify_masked(&self, output: &str, mask: &Mask) -> Option<ScmError> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(output))
            .map(|p| (p.build)(&mask.apply(output)))
    }

    /// Replace `err` with the classified error when a pattern matches.
    pub fn error(&self, err: ScmError, output: &str) -> ScmError {
        self.classify(output).unwrap_or(err)
    }

    /// [`ErrorMap::error`] over raw output, keeping secrets out of the result.
    pub fn error_masked(&self, err: ScmError, output: &str, mask: &Mask) -> ScmError {
        self.classify_masked(output, mask).unwrap_or(err)
    }
}

/// Line carrying the signature, or the last line when masking hid it.
fn matched_line(regex: &Regex, output: &str) -> String {
    output
        .lines()
        .find(|line| regex.is_match(line))
        .or_else(|| output.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_error() -> ScmError {
        ScmError::Exec {
            command: "git push".to_string(),
            status: "exit status: 128".to_string(),
            output: String::new(),
        }
    }

    #[test]
    fn test_no_match_keeps_original() {
        let map = ErrorMap::git();
        assert!(map.classify("Hello").is_none());
        let err = map.error(exec_error(), "Hello");
        assert!(matches!(err, ScmError::Exec { .. }));
    }

    #[test]
    fn test_empty_map_keeps_original() {
        let map = ErrorMap::new();
        assert!(map.is_empty());
        assert!(matches!(
            map.error(exec_error(), "Authentication failed"),
            ScmError::Exec { .. }
        ));
    }

    #[test]
    fn test_auth_failure_reclassified() {
        let output = "Cloning into 'x'...\nfatal: Authentication failed for 'https://github.com/org/app.git/'\n";
        let err = ErrorMap::git().error(exec_error(), output);
        match err {
            ScmError::BasicAuth { reason } => {
                assert!(reason.starts_with("fatal: Authentication failed"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_first_match_wins() {
        let mut map = ErrorMap::new();
        map.push(ErrorPattern::new(Regex::new("denied").unwrap(), |_| {
            ScmError::Host("first".to_string())
        }));
        map.push(ErrorPattern::new(Regex::new("denied").unwrap(), |_| {
            ScmError::Host("second".to_string())
        }));

        match map.classify("access denied") {
            Some(ScmError::Host(s)) => assert_eq!(s, "first"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_masked_matches_raw_output() {
        let mut map = ErrorMap::new();
        map.push(ErrorPattern::basic_auth(Regex::new("token hunter2 rejected").unwrap()));
        let mut mask = Mask::new();
        mask.push_literal("hunter2");

        match map.error_masked(exec_error(), "remote: token hunter2 rejected\n", &mask) {
            ScmError::BasicAuth { reason } => assert_eq!(reason, "remote: token ### rejected"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_subversion_authorization_failed() {
        let output = "svn: E170001: Authorization failed\n";
        assert!(matches!(
            ErrorMap::subversion().classify(output),
            Some(ScmError::BasicAuth { .. })
        ));
    }
}

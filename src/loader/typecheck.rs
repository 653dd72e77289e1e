// Pre-flight checking
// Diagnostics over the combined effect source, run before the real compile

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use effect_source::FetchError;
use parking_lot::Mutex;
use rhai::ParseError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{sandbox, script::hooks, UiMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding, positioned in the combined source (1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub category: Severity,
}

impl Diagnostic {
    pub fn error(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
            category: Severity::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            line: 0,
            column: 0,
            message: message.into(),
            category: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.category == Severity::Error
    }

    pub(crate) fn from_parse_error(err: &ParseError) -> Self {
        Self::error(
            err.1.line().unwrap_or(0),
            err.1.position().unwrap_or(0),
            err.0.to_string(),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.category {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.line == 0 {
            write!(f, "{label}: {}", self.message)
        } else {
            write!(f, "{}:{}: {label}: {}", self.line, self.column, self.message)
        }
    }
}

/// A checking service. `Err` means the service could not be reached; the
/// loader then skips the check.
#[async_trait]
pub trait TypeChecker: Send + Sync {
    async fn check(&self, source: &str) -> Result<Vec<Diagnostic>, FetchError>;
}

/// Local checker: compiles with strict variables in a throwaway sandbox
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictChecker;

#[async_trait]
impl TypeChecker for StrictChecker {
    async fn check(&self, source: &str) -> Result<Vec<Diagnostic>, FetchError> {
        let engine = sandbox::strict_engine();
        let scope = sandbox::scope("check", UiMode::Json);
        let ast = match engine.compile_with_scope(&scope, source) {
            Ok(ast) => ast,
            Err(err) => return Ok(vec![Diagnostic::from_parse_error(&err)]),
        };

        let mut diagnostics = Vec::new();
        let defines = |name: &str| ast.iter_functions().any(|f| f.name == name);
        if !defines(hooks::RESET) {
            diagnostics.push(Diagnostic::warning(
                "no on_reset() hook: stop() will not reset effect counters",
            ));
        }
        if !defines(hooks::SET_CONFIG) {
            diagnostics.push(Diagnostic::warning(
                "no on_set_config(key, value) hook: panel edits are ignored",
            ));
        }
        Ok(diagnostics)
    }
}

/// Memoizes another checker's results by source text. Failures are not cached.
pub struct CachingChecker<C> {
    inner: C,
    cache: Mutex<HashMap<String, Vec<Diagnostic>>>,
}

impl<C: TypeChecker> CachingChecker<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

#[async_trait]
impl<C: TypeChecker> TypeChecker for CachingChecker<C> {
    async fn check(&self, source: &str) -> Result<Vec<Diagnostic>, FetchError> {
        let cached = self.cache.lock().get(source).cloned();
        if let Some(hit) = cached {
            debug!("type check cache hit");
            return Ok(hit);
        }
        let diagnostics = self.inner.check(source).await?;
        self.cache
            .lock()
            .insert(source.to_string(), diagnostics.clone());
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl TypeChecker for Counting {
        async fn check(&self, _source: &str) -> Result<Vec<Diagnostic>, FetchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Diagnostic::warning("counted")])
        }
    }

    struct Offline;

    #[async_trait]
    impl TypeChecker for Offline {
        async fn check(&self, _source: &str) -> Result<Vec<Diagnostic>, FetchError> {
            Err(FetchError::Http("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_strict_checker_reports_position() {
        let source = "fn on_tick(n) {\n    let buf = blank(n);\n    bufx\n}\n";
        let diagnostics = StrictChecker.check(source).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
        assert_eq!(diagnostics[0].line, 3);
    }

    #[tokio::test]
    async fn test_strict_checker_warnings() {
        let source = "fn on_tick(n) { blob(n * 3) }";
        let diagnostics = StrictChecker.check(source).await.unwrap();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| !d.is_error()));
    }

    #[tokio::test]
    async fn test_caching_checker() {
        let checker = CachingChecker::new(Counting(AtomicUsize::new(0)));
        checker.check("a").await.unwrap();
        checker.check("a").await.unwrap();
        checker.check("b").await.unwrap();
        assert_eq!(checker.inner.0.load(Ordering::SeqCst), 2);
        assert_eq!(checker.len(), 2);

        checker.clear();
        assert!(checker.is_empty());
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let checker = CachingChecker::new(Offline);
        assert!(checker.check("a").await.is_err());
        assert!(checker.is_empty());
    }

    #[test]
    fn test_display() {
        let diag = Diagnostic::error(3, 5, "Variable not found: bufx");
        assert_eq!(diag.to_string(), "3:5: error: Variable not found: bufx");
    }
}

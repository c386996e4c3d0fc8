//! The diagnostic sink and the tri-level warning dial described in
//! `spec.md` §6 ("Configuration options") and §7 ("Error handling design").

use crate::span::FileSpan;

/// How a diagnostic should be rendered and counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
  Warning,
  Error,
}

impl std::fmt::Display for Severity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self { Severity::Warning => "warning", Severity::Error => "error" })
  }
}

/// The `{ignore, warn, error}` dial for a diagnostic class, data-driven per
/// §9's design note rather than branched per call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WarnLevel {
  Ignore,
  #[default]
  Warn,
  Error,
}

/// Warning classes the core recognizes. Currently just
/// `warnDuplicateDeclSpecifier`; more tri-level classes can be added to
/// this enum without touching any call site, since each call site only
/// ever asks `options.level(class)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WarnClass {
  DuplicateDeclSpecifier,
}

/// Options the core recognizes (§6 "Configuration options"). No
/// environment variables are consulted; everything is explicit.
#[derive(Clone, Debug)]
pub struct Options {
  warn_duplicate_decl_specifier: WarnLevel,
}

impl Default for Options {
  fn default() -> Self { Self { warn_duplicate_decl_specifier: WarnLevel::Warn } }
}

impl Options {
  #[must_use] pub fn with_warn_duplicate_decl_specifier(mut self, level: WarnLevel) -> Self {
    self.warn_duplicate_decl_specifier = level;
    self
  }

  #[must_use] pub fn level(&self, class: WarnClass) -> WarnLevel {
    match class {
      WarnClass::DuplicateDeclSpecifier => self.warn_duplicate_decl_specifier,
    }
  }
}

/// A single diagnostic message, in `file:line:col: severity: message` form.
#[derive(Clone, Debug)]
pub struct Diagnostic {
  pub span: FileSpan,
  pub severity: Severity,
  pub message: String,
}

impl std::fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}:{}: {}: {}",
      crate::symbol::resolve(self.span.file), self.span.line, self.span.col,
      self.severity, self.message)
  }
}

/// Accumulates diagnostics for a phase. The pipeline checks
/// [`Sink::error_count`] after each major phase and aborts if it is
/// nonzero, per §7's propagation policy.
#[derive(Default, Debug)]
pub struct Sink {
  diagnostics: Vec<Diagnostic>,
  error_count: u32,
}

impl Sink {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn error(&mut self, span: FileSpan, message: impl Into<String>) {
    self.error_count += 1;
    self.diagnostics.push(Diagnostic { span, severity: Severity::Error, message: message.into() });
  }

  pub fn warn(&mut self, span: FileSpan, message: impl Into<String>) {
    self.diagnostics.push(Diagnostic { span, severity: Severity::Warning, message: message.into() });
  }

  /// Emit a diagnostic at the severity dictated by `class`'s tri-level
  /// option; `Ignore` emits nothing.
  pub fn tri(&mut self, options: &Options, class: WarnClass, span: FileSpan, message: impl Into<String>) {
    match options.level(class) {
      WarnLevel::Ignore => {}
      WarnLevel::Warn => self.warn(span, message),
      WarnLevel::Error => self.error(span, message),
    }
  }

  #[must_use] pub fn error_count(&self) -> u32 { self.error_count }
  #[must_use] pub fn has_errors(&self) -> bool { self.error_count > 0 }
  #[must_use] pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }
}

/// The phase-abort signals of §7: each names the phase whose accumulated
/// `Sink` diagnostics forced the pipeline to stop before the next phase ran.
/// Individual diagnostics (undeclared names, ambiguous imports, overload
/// failures, and so on) are rendered as `Sink` messages, not as distinct
/// variants here — a phase can fail for many reasons at once, and the sink
/// already carries the specific message and span for each.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
  #[error("{0}: redeclared as a different kind")]
  Redeclaration(String),
  #[error("{0}: type error")]
  Type(String),
  /// Raised by C8; these are internal compiler errors that signal a bug in
  /// C4/C5/C7, and abort the pipeline immediately rather than being merely
  /// sunk like the others.
  #[error("internal error in phase {phase}: {message}")]
  IrInvariant { phase: &'static str, message: String },
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;

  fn span() -> FileSpan { FileSpan { file: intern("t.t"), line: 1, col: 1 } }

  #[test]
  fn sink_counts_errors_only() {
    let mut sink = Sink::new();
    sink.warn(span(), "a warning");
    sink.error(span(), "an error");
    assert_eq!(sink.error_count(), 1);
    assert!(sink.has_errors());
    assert_eq!(sink.diagnostics().len(), 2);
  }

  #[test]
  fn tri_level_dial_controls_severity() {
    let mut sink = Sink::new();
    let ignore = Options::default().with_warn_duplicate_decl_specifier(WarnLevel::Ignore);
    sink.tri(&ignore, WarnClass::DuplicateDeclSpecifier, span(), "dup");
    assert_eq!(sink.diagnostics().len(), 0);

    let warn = Options::default().with_warn_duplicate_decl_specifier(WarnLevel::Warn);
    sink.tri(&warn, WarnClass::DuplicateDeclSpecifier, span(), "dup");
    assert_eq!(sink.error_count(), 0);
    assert_eq!(sink.diagnostics().len(), 1);

    let error = Options::default().with_warn_duplicate_decl_specifier(WarnLevel::Error);
    sink.tri(&error, WarnClass::DuplicateDeclSpecifier, span(), "dup");
    assert_eq!(sink.error_count(), 1);
  }
}

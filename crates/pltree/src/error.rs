//! Error, warning, and other diagnostics handling.

use std::cell::{Ref, RefCell, RefMut};
use std::path::Path;
use std::{error, fmt, io};

use termcolor::{Color, ColorSpec};

use crate::config::Config;

// ----------------------------------------------------------------------------
// Location handling

/// Line and column information for a diagnostic, within one routine body.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, Hash, Serialize, Deserialize)]
pub struct Location {
    /// The line number, starting at 1.
    pub line: u32,
    /// The column number, starting at 1, or 0 when unknown.
    pub column: u16,
}

impl Location {
    pub fn line(line: u32) -> Location {
        Location { line, column: 0 }
    }

    pub fn add_columns(mut self, num: u16) -> Location {
        self.column += num;
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.column != 0 {
            write!(f, "line {}, column {}", self.line, self.column)
        } else {
            write!(f, "line {}", self.line)
        }
    }
}

// ----------------------------------------------------------------------------
// Severities and categories

/// The possible diagnostic severities available.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Info = 3,
}

impl Severity {
    fn style(self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        match self {
            Severity::Error => {
                spec.set_fg(Some(Color::Red));
            }
            Severity::Warning => {
                spec.set_fg(Some(Color::Yellow));
            }
            Severity::Info => {
                spec.set_fg(Some(Color::White)).set_intense(true);
            }
        }
        spec
    }
}

impl Default for Severity {
    fn default() -> Severity {
        Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

/// The warning category a non-error diagnostic belongs to.
///
/// Each category can be enabled or disabled independently, globally through
/// [`Config`] or per block through in-source directives.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Other,
    Extra,
    Performance,
    Security,
    Compatibility,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::Other => "other",
            Category::Extra => "extra",
            Category::Performance => "performance",
            Category::Security => "security",
            Category::Compatibility => "compatibility",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// The diagnostics sink

/// A diagnostics context, tracking the routine under analysis and any
/// observed errors.
#[derive(Debug, Default)]
pub struct Context {
    /// A list of errors, warnings, and other diagnostics generated.
    errors: RefCell<Vec<PlError>>,
    /// Warning config.
    config: RefCell<Config>,
    print_severity: Option<Severity>,
}

impl Context {
    // ------------------------------------------------------------------------
    // Configuration

    pub fn force_config(&self, toml: &Path) {
        match Config::read_toml(toml) {
            Ok(config) => *self.config.borrow_mut() = config,
            Err(io_error) => {
                PlError::new(Location::default(), "error reading configuration file")
                    .with_boxed_cause(io_error.into_boxed_error())
                    .register(self);
            }
        }
    }

    pub fn autodetect_config(&self, input: &Path) {
        let toml = match input.parent() {
            Some(parent) => parent.join("plcheck.toml"),
            None => return,
        };
        if toml.exists() {
            self.force_config(&toml);
        }
    }

    pub fn set_config(&self, config: Config) {
        *self.config.borrow_mut() = config;
    }

    pub fn config(&self) -> Ref<Config> {
        self.config.borrow()
    }

    pub fn config_mut(&self) -> RefMut<Config> {
        self.config.borrow_mut()
    }

    /// Set a severity at and above which errors will be printed immediately.
    pub fn set_print_severity(&mut self, print_severity: Option<Severity>) {
        self.print_severity = print_severity;
    }

    // ------------------------------------------------------------------------
    // Errors

    /// Push an error or other diagnostic to the context.
    pub fn register_error(&self, error: PlError) {
        guard!(let Some(error) = self.config.borrow().set_configured_severity(error) else {
            return // errortype is disabled
        });
        // ignore errors with severity above configured level
        if !self.config.borrow().registerable_error(&error) {
            return;
        }
        if let Some(print_severity) = self.print_severity {
            if error.severity() <= print_severity {
                let stderr = termcolor::StandardStream::stderr(termcolor::ColorChoice::Auto);
                self.pretty_print_error(&mut stderr.lock(), &error)
                    .expect("error writing to stderr");
            }
        }
        let mut errors = self.errors.borrow_mut();

        // repeated checks of one routine can duplicate diagnostics, ignore
        // them if they're an exact match
        for existing_error in errors.iter() {
            if error.eq(existing_error) {
                return;
            }
        }

        errors.push(error);
    }

    /// Access the list of diagnostics generated so far.
    pub fn errors(&self) -> Ref<[PlError]> {
        Ref::map(self.errors.borrow(), |x| &**x)
    }

    /// Mutably access the diagnostics list. Dangerous.
    #[doc(hidden)]
    pub fn errors_mut(&self) -> RefMut<Vec<PlError>> {
        self.errors.borrow_mut()
    }

    /// Pretty-print a `PlError` to the given output.
    pub fn pretty_print_error<W: termcolor::WriteColor>(
        &self,
        w: &mut W,
        error: &PlError,
    ) -> io::Result<()> {
        write!(w, "{}: ", error.location)?;

        w.set_color(&error.severity.style())?;
        write!(w, "{}", error.severity())?;
        w.reset()?;
        if let Some(category) = error.category() {
            write!(w, " ({})", category)?;
        }
        writeln!(w, ": {}", error.description())?;

        for note in error.notes().iter() {
            if note.location == error.location {
                writeln!(w, "- {}", note.description)?;
            } else {
                writeln!(w, "- {}: {}", note.location, note.description)?;
            }
        }
        writeln!(w)
    }

    pub fn pretty_print_error_nocolor<W: io::Write>(
        &self,
        w: &mut W,
        error: &PlError,
    ) -> io::Result<()> {
        self.pretty_print_error(&mut termcolor::NoColor::new(w), error)
    }

    /// Pretty-print all registered diagnostics to standard error.
    ///
    /// Returns `true` if any errors were printed, `false` if none were.
    pub fn print_all_errors(&self, min_severity: Severity) -> bool {
        let stderr = termcolor::StandardStream::stderr(termcolor::ColorChoice::Auto);
        let stderr = &mut stderr.lock();
        let errors = self.errors();
        let mut printed = false;
        for err in errors.iter() {
            if err.severity <= min_severity {
                self.pretty_print_error(stderr, err)
                    .expect("error writing to stderr");
                printed = true;
            }
        }
        printed
    }

    /// Print messages and panic if there were any errors.
    #[doc(hidden)]
    pub fn assert_success(&self) {
        if self.print_all_errors(Severity::Info) {
            panic!("there were check errors");
        }
    }
}

// ----------------------------------------------------------------------------
// Error handling

/// A diagnostic produced while checking a routine, with location information.
#[derive(Debug)]
#[must_use]
pub struct PlError {
    location: Location,
    severity: Severity,
    category: Option<Category>,
    description: String,
    notes: Vec<DiagnosticNote>,
    cause: Option<Box<dyn error::Error + Send + Sync>>,
    errortype: Option<&'static str>,
}

/// An additional note attached to an error, at some other location.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DiagnosticNote {
    location: Location,
    description: String,
}

impl PlError {
    pub fn new<S: Into<String>>(location: Location, desc: S) -> PlError {
        PlError {
            location,
            severity: Default::default(),
            category: None,
            description: desc.into(),
            notes: Vec::new(),
            cause: None,
            errortype: None,
        }
    }

    /// Construct a gated warning diagnostic in the given category.
    pub fn warning<S: Into<String>>(category: Category, location: Location, desc: S) -> PlError {
        PlError::new(location, desc)
            .set_severity(Severity::Warning)
            .with_category(category)
    }

    fn with_boxed_cause(mut self, cause: Box<dyn error::Error + Send + Sync>) -> PlError {
        self.add_note(self.location, cause.to_string());
        self.cause = Some(cause);
        self
    }

    pub fn with_cause<E: error::Error + Send + Sync + 'static>(self, cause: E) -> PlError {
        self.with_boxed_cause(Box::new(cause))
    }

    pub fn set_severity(mut self, severity: Severity) -> PlError {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: Category) -> PlError {
        self.category = Some(category);
        self
    }

    pub fn add_note<S: Into<String>>(&mut self, location: Location, desc: S) {
        self.notes.push(DiagnosticNote {
            location,
            description: desc.into(),
        });
    }

    pub fn with_note<S: Into<String>>(mut self, location: Location, desc: S) -> PlError {
        self.add_note(location, desc);
        self
    }

    pub fn with_errortype(mut self, errortype: &'static str) -> PlError {
        self.errortype = Some(errortype);
        self
    }

    pub fn with_location(mut self, location: Location) -> PlError {
        self.location = location;
        self
    }

    #[inline]
    pub fn register(self, context: &Context) {
        context.register_error(self)
    }

    /// Get the location in the code at which this error was observed.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Get the severity of this diagnostic.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Get the warning category of this diagnostic, if it has one.
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Get the description associated with this error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the errortype associated with this error.
    pub fn errortype(&self) -> Option<&'static str> {
        self.errortype
    }

    /// Get the additional notes associated with this error.
    pub fn notes(&self) -> &[DiagnosticNote] {
        &self.notes
    }
}

impl fmt::Display for PlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Like `pretty_print_error` above, but single-line friendly.
        write!(
            f,
            "{}:{}: {}: {}",
            self.location.line, self.location.column, self.severity, self.description
        )?;
        for note in self.notes.iter() {
            if note.location == self.location {
                write!(f, "\n- {}", note.description)?;
            } else {
                write!(f, "\n- {}: {}", note.location, note.description)?;
            }
        }
        Ok(())
    }
}

impl error::Error for PlError {
    fn cause(&self) -> Option<&dyn error::Error> {
        self.cause.as_ref().map(|x| &**x as &dyn error::Error)
    }
}

impl PartialEq for PlError {
    fn eq(&self, other: &Self) -> bool {
        // ignore causes
        self.location == other.location
            && self.severity == other.severity
            && self.category == other.category
            && self.description == other.description
            && self.notes == other.notes
            && self.errortype == other.errortype
    }
}

impl Eq for PlError {}

impl Clone for PlError {
    fn clone(&self) -> PlError {
        PlError {
            location: self.location,
            severity: self.severity,
            category: self.category,
            description: self.description.clone(),
            notes: self.notes.clone(),
            cause: None, // not trivially cloneable
            errortype: self.errortype,
        }
    }
}

impl DiagnosticNote {
    /// Get the location in the code at which this note applies.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Get the description associated with this note.
    pub fn description(&self) -> &str {
        &self.description
    }
}

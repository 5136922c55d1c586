//! Script error taxonomy and diagnostics
//!
//! Every failure inside the interpreter is a [`ScriptError`]: one kind from the
//! closed [`ErrorKind`] set, up to two template parameters, an optional free-form
//! detail, and (once it reaches a dispatch loop) the trace of frames that were
//! active when it was raised.
//!
//! ## Messages
//!
//! Each kind owns an English template with `{0}`/`{1}` slots. The untranslated
//! message is always built from that template; the localized message starts as
//! the same text and is rebuilt from the host's translation of the template
//! when the error is first traced.

use crate::interpreter::host::Host;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used across the interpreter
pub type ScriptResult<T> = Result<T, ScriptError>;

/* ===================== Error Kinds ===================== */

/// Closed set of script error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // Argument shape
    AxisExpected,
    BadArgumentCount,
    BadMillerIndices,
    BadRgbColor,
    BooleanExpected,
    BooleanOrNumberExpected,
    BooleanOrWhateverExpected,
    ColorExpected,
    ColorOrPaletteRequired,
    CommandExpected,
    CoordinateOrNameOrExpressionRequired,
    EndOfStatementUnexpected,
    ExpressionExpected,
    ExpressionOrIntegerExpected,
    FilenameExpected,
    IncompatibleArguments,
    InsufficientArguments,
    IntegerExpected,
    IntegerOutOfRange,
    InvalidArgument,
    InvalidParameterOrder,
    KeywordExpected,
    NumberExpected,
    NumberMustBe,
    NumberOutOfRange,
    ObjectNameExpected,
    PlaneExpected,
    PropertyNameExpected,
    StringExpected,
    StringOrIdentifierExpected,
    TooManyPoints,
    // Semantic / domain
    BackgroundModelError,
    CannotSet,
    DrawObjectNotDefined,
    MoCoefficients,
    MoIndex,
    MoModelError,
    MoOccupancy,
    MoOnlyOne,
    MultipleModelsDisplayedNotOk,
    MultipleModelsNotOk,
    NoData,
    NoPartialCharges,
    NoUnitCell,
    SpaceGroupNotFound,
    UnrecognizedAtomProperty,
    UnrecognizedBondProperty,
    UnrecognizedExpression,
    UnrecognizedObject,
    UnrecognizedParameter,
    UnrecognizedParameterWarning,
    UnrecognizedShowParameter,
    What,
    WriteWhat,
    // Resource
    FileNotFound,
    // Control
    BadContext,
    MissingEnd,
    TooManyScriptLevels,
    UnrecognizedCommand,
    /// Free-form message raised by handlers and interrupt scripts
    Evaluation,
}

impl ErrorKind {
    /// English template for this kind; `{0}` and `{1}` are parameter slots
    pub fn template(self) -> &'static str {
        use ErrorKind::*;
        match self {
            AxisExpected => "x y z axis expected",
            BadArgumentCount => "bad argument count",
            BadMillerIndices => "Miller indices cannot all be zero.",
            BadRgbColor => "bad [R,G,B] color",
            BooleanExpected => "boolean expected",
            BooleanOrNumberExpected => "boolean or number expected",
            BooleanOrWhateverExpected => "boolean, number, or {0} expected",
            ColorExpected => "color expected",
            ColorOrPaletteRequired => "a color or palette name is required",
            CommandExpected => "command expected",
            CoordinateOrNameOrExpressionRequired => {
                "{x y z} or $name or (atom expression) required"
            }
            EndOfStatementUnexpected => "unexpected end of script command",
            ExpressionExpected => "valid (atom expression) expected",
            ExpressionOrIntegerExpected => "(atom expression) or integer expected",
            FilenameExpected => "filename expected",
            IncompatibleArguments => "incompatible arguments",
            InsufficientArguments => "insufficient arguments",
            IntegerExpected => "integer expected",
            IntegerOutOfRange => "integer out of range ({0} - {1})",
            InvalidArgument => "invalid argument",
            InvalidParameterOrder => "invalid parameter order",
            KeywordExpected => "keyword expected",
            NumberExpected => "number expected",
            NumberMustBe => "number must be ({0} or {1})",
            NumberOutOfRange => "decimal number out of range ({0} - {1})",
            ObjectNameExpected => "object name expected after '$'",
            PlaneExpected => "plane expected -- either three points or atom expressions or {0} or {1}",
            PropertyNameExpected => "property name expected",
            StringExpected => "quoted string expected",
            StringOrIdentifierExpected => "quoted string or identifier expected",
            TooManyPoints => "too many rotation points were specified",
            BackgroundModelError => "{0} not allowed with background model displayed",
            CannotSet => "cannot set value",
            DrawObjectNotDefined => "draw object not defined",
            MoCoefficients => "no MO coefficient data available",
            MoIndex => "An MO index from 1 to {0} is required",
            MoModelError => "no MO basis/coefficient data available for this frame",
            MoOccupancy => "no MO occupancy data available",
            MoOnlyOne => "Only one molecular orbital is available in this file",
            MultipleModelsDisplayedNotOk => "{0} require that only one model be displayed",
            MultipleModelsNotOk => "{0} requires that only one model be loaded",
            NoData => "No data available",
            NoPartialCharges => "No partial charges were read from the file",
            NoUnitCell => "No unit cell",
            SpaceGroupNotFound => "space group {0} was not found.",
            UnrecognizedAtomProperty => "unrecognized atom property",
            UnrecognizedBondProperty => "unrecognized bond property",
            UnrecognizedExpression => "runtime unrecognized expression",
            UnrecognizedObject => "unrecognized object",
            UnrecognizedParameter => "unrecognized {0} parameter",
            UnrecognizedParameterWarning => "unrecognized {0} parameter in state script (set anyway)",
            UnrecognizedShowParameter => "unrecognized SHOW parameter --  use {0}",
            What => "what? {0}",
            WriteWhat => "write what? {0} or {1} \"filename\"",
            FileNotFound => "file not found",
            BadContext => "invalid context for {0}",
            MissingEnd => "missing END for {0}",
            TooManyScriptLevels => "too many script levels",
            UnrecognizedCommand => "unrecognized command",
            Evaluation => "{0}",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/* ===================== Trace Frames ===================== */

/// One frame of a reconstructed call chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Function name when the frame is a function body
    pub function: Option<String>,
    /// Script (file) name of the frame's statement array
    pub file: Option<String>,
    /// 1-based source line of the active statement
    pub line: u32,
    /// 1-based command index of the active statement
    pub command: usize,
    /// Text of the active statement
    pub text: String,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match (&self.function, &self.file) {
            (Some(func), _) => format!("function {}", func),
            (None, Some(file)) => format!("file {}", file),
            (None, None) => "script".to_string(),
        };
        write!(
            f,
            "----line {} command {} of {}:\n         {}",
            self.line, self.command, origin, self.text
        )
    }
}

/* ===================== Script Error ===================== */

/// A script failure with its message pair and trace
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub params: Vec<String>,
    pub detail: Option<String>,
    /// Message in the host's language
    pub message: String,
    /// Message built from the English template
    pub untranslated: String,
    /// Frames innermost first; empty until the error reaches a dispatch loop
    pub trace: Vec<TraceFrame>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind) -> Self {
        Self::build(kind, Vec::new(), None)
    }

    /// Error with template parameters (at most two are used)
    pub fn with_params<I, S>(kind: ErrorKind, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params = params.into_iter().take(2).map(Into::into).collect();
        Self::build(kind, params, None)
    }

    /// Free-form evaluation error
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::with_params(ErrorKind::Evaluation, [message.into()])
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument).detail(detail)
    }

    pub fn bad_context(what: impl Into<String>) -> Self {
        Self::with_params(ErrorKind::BadContext, [what.into()])
    }

    /// Attach a detail string, appended after the templated text
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self.untranslated = render(self.kind.template(), &self.params, self.detail.as_deref());
        self.message = self.untranslated.clone();
        self
    }

    fn build(kind: ErrorKind, params: Vec<String>, detail: Option<String>) -> Self {
        let untranslated = render(kind.template(), &params, detail.as_deref());
        Self {
            kind,
            params,
            detail,
            message: untranslated.clone(),
            untranslated,
            trace: Vec::new(),
        }
    }

    /// Rebuild the localized message from the host's translation of the template
    pub fn localize(&mut self, host: &dyn Host) {
        if let Some(template) = host.translate(self.kind.template()) {
            self.message = render(&template, &self.params, self.detail.as_deref());
        }
    }

    pub fn is_traced(&self) -> bool {
        !self.trace.is_empty()
    }

    /// Localized message followed by every trace frame
    pub fn full_message(&self) -> String {
        let mut out = self.message.clone();
        for frame in &self.trace {
            out.push('\n');
            out.push_str(&frame.to_string());
        }
        out
    }

    /// Position of the innermost frame, if traced
    pub fn line(&self) -> Option<u32> {
        self.trace.first().map(|f| f.line)
    }
}

fn render(template: &str, params: &[String], detail: Option<&str>) -> String {
    let mut text = template.to_string();
    for (i, param) in params.iter().enumerate() {
        text = text.replace(&format!("{{{}}}", i), param);
    }
    match detail {
        Some(d) if !d.is_empty() => format!("{}: {}", text, d),
        _ => text,
    }
}

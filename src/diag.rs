use std::error::Error;
use std::fmt;

/// A single parser diagnostic.
///
/// The parser never aborts on one of these: it records the diagnostic,
/// resynchronizes at the next statement boundary, and keeps going so the
/// user sees every error at once. Callers check the collected list before
/// evaluating.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseError {
    /// The token after the current one was not what the grammar requires.
    /// Both fields hold token-type names as rendered by `Token`'s
    /// `Display`.
    UnexpectedToken { expected: String, got: String },
    /// No expression can start with this token.
    NoPrefixParseFn(String),
    /// An integer literal that does not fit in an `i64`.
    BadIntLiteral(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, got } => write!(
                f,
                "expected next token to be {}, got {} instead",
                expected, got
            ),
            ParseError::NoPrefixParseFn(token) => {
                write!(f, "no prefix parse function for {} found", token)
            }
            ParseError::BadIntLiteral(literal) => {
                write!(f, "could not parse {} as integer", literal)
            }
        }
    }
}

impl Error for ParseError {}

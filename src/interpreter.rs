//! API to control the interpreter.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::ctx::Context;
use crate::diag::ParseError;
use crate::eval::{Evaluator, Value};
use crate::parser::Parser;

/// Constant prefix put in front of each parser diagnostic shown to the
/// user.
pub const PARSE_ERROR_PREFIX: &str = "parse error: ";

/// Tree-walk interpreter.
///
/// Owns the interning context and the global environment, so definitions
/// persist from one `eval` call to the next.
///
/// # Example
///
/// Invoke the interpreter a first time to define a function, then
/// additional times to call this function:
///
/// ```
/// use monkey::interpreter::Interpreter;
///
/// let mut interp = Interpreter::new();
/// interp.eval("let max = fn(x, y) { if (x > y) { x } else { y } };")?;
///
/// assert_eq!(interp.eval("max(10, 20);")?.to_string(), "20");
/// assert_eq!(interp.eval("max(5, 4);")?.to_string(), "5");
/// # Ok::<(), monkey::interpreter::ParseErrors>(())
/// ```
#[derive(Debug)]
pub struct Interpreter {
    ctx: Rc<Context>,
    evaluator: Evaluator,
}

/// The ordered parser diagnostics for one source text.
///
/// Runtime failures are *not* errors at this level: they come back as
/// ordinary values whose inspection string starts with `ERROR:`.
#[derive(Debug)]
pub struct ParseErrors(Vec<ParseError>);

impl ParseErrors {
    /// The individual diagnostics, in source order.
    pub fn errors(&self) -> &[ParseError] {
        &self.0
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}{}", PARSE_ERROR_PREFIX, error)?;
        }
        Ok(())
    }
}

impl Error for ParseErrors {}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter {
            ctx: Context::new(),
            evaluator: Evaluator::new(),
        }
    }

    /// Parses and evaluates `source` in the session's global environment.
    ///
    /// Returns the value of the last statement. If the parser collected
    /// any diagnostics the program is not evaluated and the full list is
    /// returned instead.
    pub fn eval(&mut self, source: &str) -> Result<Value, ParseErrors> {
        let mut parser = Parser::new(source, self.ctx.clone());
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            return Err(ParseErrors(parser.errors().to_vec()));
        }
        Ok(self.evaluator.eval_program_in_global_env(&program))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

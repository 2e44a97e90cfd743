use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::{self, Block, Expr, InfixOp, PrefixOp, Program, Stmt};
use crate::ctx::Symbol;

/// A runtime value.
///
/// `Return` and `Error` are evaluator-internal sentinels: blocks pass them
/// through untouched, the program root and call sites unwrap `Return`, and
/// `Error` short-circuits everything up to the program root where it
/// becomes the program's value. Runtime failures are values, never host
/// errors.
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Str(String),
    Null,
    Return(Box<Value>),
    Error(String),
    Function(Function),
}

/// A closure: a function literal's parameters and body plus the
/// environment that was current at its definition.
#[derive(Clone)]
pub struct Function {
    parameters: Rc<Vec<Symbol>>,
    body: Rc<Block>,
    env: Rc<Env>,
}

// The captured environment is omitted: a recursive closure sits inside its
// own defining environment, and walking that cycle would never terminate.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.body, &other.body) && Rc::ptr_eq(&self.env, &other.env)
    }
}

impl Value {
    /// Type name as it appears in runtime error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Str(_) => "STRING",
            Value::Null => "NULL",
            Value::Return(_) => "RETURN_VALUE",
            Value::Error(_) => "ERROR",
            Value::Function(_) => "FUNCTION",
        }
    }

    /// Everything is truthy except `false` and `null`.
    fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

/// The inspection string shown by the REPL.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
            Value::Return(inner) => write!(f, "{}", inner),
            Value::Error(message) => write!(f, "ERROR: {}", message),
            // The missing closing brace reproduces the reference
            // implementation; tests depend on the exact string.
            Value::Function(func) => write!(
                f,
                "fn({}) {{\n{}\n",
                ast::join(func.parameters.iter()),
                func.body
            ),
        }
    }
}

/// Tree-walking evaluator.
///
/// Holds the session's global environment so that bindings persist from
/// one evaluated program to the next.
#[derive(Debug)]
pub struct Evaluator {
    globals: Rc<Env>,
}

impl Evaluator {
    pub fn new() -> Evaluator {
        Evaluator {
            globals: Env::new(),
        }
    }

    /// Evaluates a program in the session's global environment and returns
    /// the value of its last statement, with `Return` unwrapped and
    /// `Error` surfaced immediately.
    pub fn eval_program_in_global_env(&self, program: &Program) -> Value {
        self.eval_program(program, self.globals.clone())
    }

    fn eval_program(&self, program: &Program, env: Rc<Env>) -> Value {
        let mut result = Value::Null;
        for stmt in &program.statements {
            match self.eval_stmt(stmt, env.clone()) {
                Value::Return(value) => return *value,
                err @ Value::Error(_) => return err,
                value => result = value,
            }
        }
        result
    }

    fn eval_stmt(&self, stmt: &Stmt, env: Rc<Env>) -> Value {
        match stmt {
            Stmt::Expr(expr) => self.eval_expr(expr, env),
            Stmt::Let(name, value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env.clone()),
                    None => Value::Null,
                };
                if value.is_error() {
                    return value;
                }
                env.set(name, value.clone());
                value
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env),
                    None => Value::Null,
                };
                if value.is_error() {
                    return value;
                }
                Value::Return(Box::new(value))
            }
        }
    }

    /// Unlike `eval_program`, a `Return` leaves a block still wrapped so
    /// that the enclosing function call (or the program root) performs the
    /// single unwrap.
    fn eval_block(&self, block: &Block, env: Rc<Env>) -> Value {
        let mut result = Value::Null;
        for stmt in &block.statements {
            result = self.eval_stmt(stmt, env.clone());
            if matches!(result, Value::Return(_) | Value::Error(_)) {
                return result;
            }
        }
        result
    }

    fn eval_expr(&self, expr: &Expr, env: Rc<Env>) -> Value {
        match expr {
            Expr::Integer { value, .. } => Value::Integer(*value),
            Expr::Str(value) => Value::Str(value.clone()),
            Expr::Boolean(value) => Value::Boolean(*value),
            Expr::Identifier(name) => match env.get(name) {
                Some(value) => value,
                None => Value::Error(format!("identifier not found: {}", name)),
            },
            Expr::Prefix(op, right) => {
                let right = self.eval_expr(right, env);
                if right.is_error() {
                    return right;
                }
                eval_prefix(*op, right)
            }
            Expr::Infix(left, op, right) => {
                let left = self.eval_expr(left, env.clone());
                if left.is_error() {
                    return left;
                }
                let right = self.eval_expr(right, env);
                if right.is_error() {
                    return right;
                }
                eval_infix(left, *op, right)
            }
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expr(condition, env.clone());
                if condition.is_error() {
                    return condition;
                }
                if condition.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, env)
                } else {
                    Value::Null
                }
            }
            Expr::Function { parameters, body } => Value::Function(Function {
                parameters: parameters.clone(),
                body: body.clone(),
                env,
            }),
            Expr::Call {
                function,
                arguments,
            } => {
                let function = self.eval_expr(function, env.clone());
                if function.is_error() {
                    return function;
                }
                let arguments = match self.eval_expressions(arguments, &env) {
                    Ok(values) => values,
                    Err(err) => return err,
                };
                self.apply_function(function, arguments)
            }
        }
    }

    /// Evaluates call arguments left to right, stopping at the first
    /// `Error`, which becomes the call's value.
    fn eval_expressions(&self, exprs: &[Expr], env: &Rc<Env>) -> Result<Vec<Value>, Value> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let value = self.eval_expr(expr, env.clone());
            if value.is_error() {
                return Err(value);
            }
            values.push(value);
        }
        Ok(values)
    }

    fn apply_function(&self, function: Value, arguments: Vec<Value>) -> Value {
        match function {
            Value::Function(function) => {
                // The call frame's outer link is the *captured*
                // environment, not the caller's: this is what makes
                // closures lexically scoped.
                let call_env = Env::with_outer(Some(function.env.clone()));
                for (param, arg) in function.parameters.iter().zip(arguments) {
                    call_env.set(param, arg);
                }
                match self.eval_block(&function.body, call_env) {
                    Value::Return(value) => *value,
                    value => value,
                }
            }
            other => Value::Error(format!("not a function: {}", other.type_name())),
        }
    }
}

fn eval_prefix(op: PrefixOp, operand: Value) -> Value {
    match op {
        PrefixOp::Not => match operand {
            Value::Boolean(false) | Value::Null => Value::Boolean(true),
            _ => Value::Boolean(false),
        },
        PrefixOp::Neg => match operand {
            Value::Integer(n) => Value::Integer(n.wrapping_neg()),
            operand => Value::Error(format!("unknown operator: -{}", operand.type_name())),
        },
    }
}

fn eval_infix(left: Value, op: InfixOp, right: Value) -> Value {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => eval_integer_infix(l, op, r),
        (Value::Str(l), Value::Str(r)) => eval_string_infix(l, op, r),
        (left, right) => {
            let bool_operand =
                matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_));
            if bool_operand && op == InfixOp::Equal {
                Value::Boolean(left == right)
            } else if bool_operand && op == InfixOp::NotEqual {
                Value::Boolean(left != right)
            } else if left.type_name() != right.type_name() {
                Value::Error(format!(
                    "type mismatch: {} {} {}",
                    left.type_name(),
                    op,
                    right.type_name()
                ))
            } else {
                Value::Error(format!(
                    "unknown operator: {} {} {}",
                    left.type_name(),
                    op,
                    right.type_name()
                ))
            }
        }
    }
}

fn eval_integer_infix(left: i64, op: InfixOp, right: i64) -> Value {
    match op {
        InfixOp::Add => Value::Integer(left.wrapping_add(right)),
        InfixOp::Sub => Value::Integer(left.wrapping_sub(right)),
        InfixOp::Mul => Value::Integer(left.wrapping_mul(right)),
        InfixOp::Div => {
            if right == 0 {
                Value::Error("division by zero".to_string())
            } else {
                Value::Integer(left.wrapping_div(right))
            }
        }
        InfixOp::Less => Value::Boolean(left < right),
        InfixOp::Greater => Value::Boolean(left > right),
        InfixOp::Equal => Value::Boolean(left == right),
        InfixOp::NotEqual => Value::Boolean(left != right),
    }
}

fn eval_string_infix(left: String, op: InfixOp, right: String) -> Value {
    match op {
        InfixOp::Add => Value::Str(left + &right),
        _ => Value::Error(format!("unknown operator: STRING {} STRING", op)),
    }
}

/// Lexically-scoped name table: a frame of bindings plus an optional outer
/// frame. Lookup walks the chain innermost-first; writes always land in
/// the innermost frame.
///
/// Frames are shared (`Rc`) between closures and their defining scopes.
/// A closure bound under its own name forms a reference cycle; that cycle
/// is accepted, since the interpreter session's lifetime bounds it.
#[derive(Debug)]
pub struct Env {
    outer: Option<Rc<Env>>,
    bindings: RefCell<HashMap<Symbol, Value>>,
}

impl Env {
    pub fn new() -> Rc<Env> {
        Self::with_outer(None)
    }

    fn with_outer(outer: Option<Rc<Env>>) -> Rc<Env> {
        Rc::new(Env {
            outer,
            bindings: RefCell::new(HashMap::new()),
        })
    }

    fn get(&self, sym: &Symbol) -> Option<Value> {
        match self.bindings.borrow().get(sym) {
            Some(value) => Some(value.clone()),
            None => self.outer.as_ref().and_then(|outer| outer.get(sym)),
        }
    }

    fn set(&self, sym: &Symbol, value: Value) {
        self.bindings.borrow_mut().insert(sym.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::Context;
    use crate::parser::Parser;

    fn run(input: &str) -> Value {
        let ctx = Context::new();
        let mut parser = Parser::new(input, ctx);
        let program = parser.parse_program();
        assert!(
            parser.errors().is_empty(),
            "parse errors: {:?}",
            parser.errors()
        );
        Evaluator::new().eval_program_in_global_env(&program)
    }

    fn assert_error(input: &str, message: &str) {
        match run(input) {
            Value::Error(msg) => assert_eq!(msg, message, "input: {}", input),
            other => panic!("expected error for {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn integer_expressions() {
        let cases = [
            ("5", 5),
            ("10", 10),
            ("-5", -5),
            ("-10", -10),
            ("5 + 5 + 5 + 5 - 10", 10),
            ("2 * 2 * 2 * 2 * 2", 32),
            ("-50 + 100 + -50", 0),
            ("5 * 2 + 10", 20),
            ("5 + 2 * 10", 25),
            ("20 + 2 * -10", 0),
            ("50 / 2 * 2 + 10", 60),
            ("2 * (5 + 10)", 30),
            ("3 * 3 * 3 + 10", 37),
            ("3 * (3 * 3) + 10", 37),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), Value::Integer(expected), "input: {}", input);
        }
    }

    #[test]
    fn arithmetic_wraps_on_overflow() {
        assert_eq!(
            run("9223372036854775807 + 1"),
            Value::Integer(i64::MIN)
        );
    }

    #[test]
    fn boolean_expressions() {
        let cases = [
            ("true", true),
            ("false", false),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 < 1", false),
            ("1 > 1", false),
            ("1 == 1", true),
            ("1 != 1", false),
            ("1 == 2", false),
            ("1 != 2", true),
            ("true == true", true),
            ("false == false", true),
            ("true == false", false),
            ("true != false", true),
            ("false != true", true),
            ("(1 < 2) == true", true),
            ("(1 < 2) == false", false),
            ("(1 > 2) == true", false),
            ("(1 > 2) == false", true),
            ("5 == true", false),
            ("5 != true", true),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), Value::Boolean(expected), "input: {}", input);
        }
    }

    #[test]
    fn bang_operator() {
        let cases = [
            ("!true", false),
            ("!false", true),
            ("!5", false),
            ("!0", false),
            ("!!true", true),
            ("!!false", false),
            ("!!5", true),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), Value::Boolean(expected), "input: {}", input);
        }
    }

    #[test]
    fn if_else_expressions() {
        let cases = [
            ("if (true) { 10 }", Value::Integer(10)),
            ("if (false) { 10 }", Value::Null),
            ("if (1) { 10 }", Value::Integer(10)),
            ("if (0) { 10 }", Value::Integer(10)),
            ("if (1 < 2) { 10 }", Value::Integer(10)),
            ("if (1 > 2) { 10 }", Value::Null),
            ("if (1 > 2) { 10 } else { 20 }", Value::Integer(20)),
            ("if (1 < 2) { 10 } else { 20 }", Value::Integer(10)),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn return_statements() {
        let cases = [
            ("return 10;", 10),
            ("return 10; 9;", 10),
            ("return 2 * 5; 9;", 10),
            ("9; return 2 * 5; 9;", 10),
            ("if (10 > 1) { if (10 > 1) { return 10; } return 1; }", 10),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), Value::Integer(expected), "input: {}", input);
        }
    }

    #[test]
    fn error_handling() {
        let cases = [
            ("5 + true;", "type mismatch: INTEGER + BOOLEAN"),
            ("5 + true; 5;", "type mismatch: INTEGER + BOOLEAN"),
            ("-true", "unknown operator: -BOOLEAN"),
            ("true + false;", "unknown operator: BOOLEAN + BOOLEAN"),
            ("5; true + false; 5", "unknown operator: BOOLEAN + BOOLEAN"),
            (
                "if (10 > 1) { true + false; }",
                "unknown operator: BOOLEAN + BOOLEAN",
            ),
            (
                "if (10 > 1) { if (10 > 1) { return true + false; } return 1; }",
                "unknown operator: BOOLEAN + BOOLEAN",
            ),
            ("foobar", "identifier not found: foobar"),
            ("\"Hello\" - \"World\"", "unknown operator: STRING - STRING"),
            ("\"Hello\" == \"World\"", "unknown operator: STRING == STRING"),
            ("5 / 0;", "division by zero"),
        ];
        for (input, expected) in cases {
            assert_error(input, expected);
        }
    }

    #[test]
    fn let_statements() {
        let cases = [
            ("let a = 5; a;", 5),
            ("let a = 5 * 5; a;", 25),
            ("let a = 5; let b = a; b;", 5),
            ("let a = 5; let b = a; let c = a + b + 5; c;", 15),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), Value::Integer(expected), "input: {}", input);
        }
    }

    #[test]
    fn let_evaluates_to_the_bound_value() {
        assert_eq!(run("let a = 5;"), Value::Integer(5));
    }

    #[test]
    fn let_rebinding_overwrites() {
        assert_eq!(run("let a = 1; let a = 2; a;"), Value::Integer(2));
    }

    #[test]
    fn function_value() {
        match run("fn(x) { x + 2; };") {
            Value::Function(func) => {
                assert_eq!(func.parameters.len(), 1);
                assert_eq!(func.parameters[0].name(), "x");
                assert_eq!(func.body.to_string(), "(x + 2)");
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn function_inspect_has_no_closing_brace() {
        assert_eq!(run("fn(x) { x + 2; };").to_string(), "fn(x) {\n(x + 2)\n");
    }

    #[test]
    fn function_application() {
        let cases = [
            ("let identity = fn(x) { x; }; identity(5);", 5),
            ("let identity = fn(x) { return x; }; identity(5);", 5),
            ("let double = fn(x) { x * 2; }; double(5);", 10),
            ("let add = fn(x, y) { x + y; }; add(5, 5);", 10),
            ("let add = fn(x, y) { x + y; }; add(5 + 5, add(5, 5));", 20),
            ("fn(x) { x; }(5)", 5),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), Value::Integer(expected), "input: {}", input);
        }
    }

    #[test]
    fn call_frame_shadows_without_clobbering() {
        assert_eq!(
            run("let x = 5; let f = fn(x) { x }; f(10);"),
            Value::Integer(10)
        );
        assert_eq!(
            run("let x = 5; let f = fn(x) { x }; f(10); x;"),
            Value::Integer(5)
        );
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        assert_eq!(
            run("let newAdder = fn(x) { fn(y) { x + y }; }; \
                 let addTwo = newAdder(2); \
                 addTwo(3);"),
            Value::Integer(5)
        );
    }

    #[test]
    fn return_unwraps_across_recursion() {
        let input = "let counter = fn(x) { \
                       if (x > 100) { return true; } else { let foo = 9999; counter(x + 1); } \
                     }; \
                     counter(0);";
        assert_eq!(run(input), Value::Boolean(true));
    }

    #[test]
    fn recursive_closure() {
        let input = "let fib = fn(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } }; \
                     fib(10);";
        assert_eq!(run(input), Value::Integer(55));
    }

    #[test]
    fn calling_a_non_function() {
        assert_error("5(3)", "not a function: INTEGER");
        assert_error("let x = 5; x();", "not a function: INTEGER");
    }

    #[test]
    fn first_failing_argument_wins() {
        assert_error(
            "let add = fn(x, y) { x + y; }; add(5 + true, foobar);",
            "type mismatch: INTEGER + BOOLEAN",
        );
    }

    #[test]
    fn missing_argument_is_simply_unbound() {
        assert_error(
            "let f = fn(x, y) { y }; f(1);",
            "identifier not found: y",
        );
    }

    #[test]
    fn surplus_arguments_are_ignored() {
        assert_eq!(run("let f = fn(x) { x }; f(1, 2);"), Value::Integer(1));
    }

    #[test]
    fn string_literal() {
        assert_eq!(run("\"Hello World!\""), Value::Str("Hello World!".to_string()));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            run("\"Hello\" + \" \" + \"World!\""),
            Value::Str("Hello World!".to_string())
        );
    }

    #[test]
    fn empty_program_is_null() {
        assert_eq!(run(""), Value::Null);
    }

    #[test]
    fn value_inspection() {
        assert_eq!(Value::Integer(5).to_string(), "5");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Str("hi".to_string()).to_string(), "hi");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::Error("identifier not found: foobar".to_string()).to_string(),
            "ERROR: identifier not found: foobar"
        );
        assert_eq!(
            Value::Return(Box::new(Value::Integer(7))).to_string(),
            "7"
        );
    }

    #[test]
    fn bindings_persist_across_programs() {
        let ctx = Context::new();
        let evaluator = Evaluator::new();

        let mut parser = Parser::new("let x = 41;", ctx.clone());
        let program = parser.parse_program();
        assert!(parser.errors().is_empty());
        evaluator.eval_program_in_global_env(&program);

        let mut parser = Parser::new("x + 1;", ctx);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty());
        assert_eq!(
            evaluator.eval_program_in_global_env(&program),
            Value::Integer(42)
        );
    }
}

use std::rc::Rc;

use crate::ast::{Block, Expr, InfixOp, PrefixOp, Program, Stmt};
use crate::ctx::{Context, Symbol};
use crate::diag::ParseError;
use crate::scanner::Scanner;
use crate::token::Token;

/// Binding strength of an operator token, strictly increasing.
///
/// `parse_expression` keeps extending its left operand while the next
/// token binds tighter than the level it was called at.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
}

impl Precedence {
    fn of(token: &Token) -> Precedence {
        match token {
            Token::EqualEqual | Token::BangEqual => Precedence::Equals,
            Token::Less | Token::Greater => Precedence::LessGreater,
            Token::Plus | Token::Minus => Precedence::Sum,
            Token::Slash | Token::Star => Precedence::Product,
            Token::LeftParen => Precedence::Call,
            _ => Precedence::Lowest,
        }
    }
}

/// Pratt parser over the scanner's token stream.
///
/// A parse failure never aborts the program parse: the offending statement
/// is dropped, the diagnostic lands in the error list, and parsing resumes
/// at the next statement boundary. Callers must consult [`Parser::errors`]
/// before doing anything with the returned [`Program`].
#[derive(Debug)]
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    cur_token: Token,
    peek_token: Token,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, ctx: Rc<Context>) -> Parser<'a> {
        let mut parser = Parser {
            scanner: Scanner::new(input, ctx),
            cur_token: Token::Eof,
            peek_token: Token::Eof,
            errors: vec![],
        };
        // Load cur_token and peek_token.
        parser.advance();
        parser.advance();
        parser
    }

    /// Consumes tokens until `Eof` and returns the program tree.
    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while self.cur_token != Token::Eof {
            if let Some(stmt) = self.parse_statement() {
                program.statements.push(stmt);
            }
            self.advance();
        }
        program
    }

    /// Diagnostics collected so far, in source order.
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.cur_token {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Option<Stmt> {
        let name = self.expect_ident()?;
        if !self.expect_peek(Token::Equal) {
            return None;
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest);
        if self.peek_token == Token::Semicolon {
            self.advance();
        }
        Some(Stmt::Let(name, value))
    }

    /// Parses the return expression, then skips to the next `;`
    /// unconditionally: tokens between the end of the expression and the
    /// semicolon are discarded.
    fn parse_return_statement(&mut self) -> Option<Stmt> {
        self.advance();
        let value = self.parse_expression(Precedence::Lowest);
        while self.cur_token != Token::Semicolon && self.cur_token != Token::Eof {
            self.advance();
        }
        Some(Stmt::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let expr = self.parse_expression(Precedence::Lowest);
        if self.peek_token == Token::Semicolon {
            self.advance();
        }
        expr.map(Stmt::Expr)
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while self.peek_token != Token::Semicolon
            && precedence < Precedence::of(&self.peek_token)
        {
            let op = match self.peek_token {
                Token::Plus => InfixOp::Add,
                Token::Minus => InfixOp::Sub,
                Token::Star => InfixOp::Mul,
                Token::Slash => InfixOp::Div,
                Token::Less => InfixOp::Less,
                Token::Greater => InfixOp::Greater,
                Token::EqualEqual => InfixOp::Equal,
                Token::BangEqual => InfixOp::NotEqual,
                Token::LeftParen => {
                    self.advance();
                    left = self.parse_call_expression(left)?;
                    continue;
                }
                _ => return Some(left),
            };
            self.advance();
            left = self.parse_infix_expression(left, op)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        match self.cur_token.clone() {
            Token::Identifier(sym) => Some(Expr::Identifier(sym)),
            Token::Int(literal) => self.parse_integer_literal(literal),
            Token::Str(value) => Some(Expr::Str(value)),
            Token::True => Some(Expr::Boolean(true)),
            Token::False => Some(Expr::Boolean(false)),
            Token::Bang => self.parse_prefix_expression(PrefixOp::Not),
            Token::Minus => self.parse_prefix_expression(PrefixOp::Neg),
            Token::LeftParen => self.parse_grouped_expression(),
            Token::If => self.parse_if_expression(),
            Token::Function => self.parse_function_literal(),
            token => {
                self.errors.push(ParseError::NoPrefixParseFn(token.to_string()));
                None
            }
        }
    }

    fn parse_integer_literal(&mut self, literal: String) -> Option<Expr> {
        match literal.parse::<i64>() {
            Ok(value) => Some(Expr::Integer { value, literal }),
            Err(_) => {
                self.errors.push(ParseError::BadIntLiteral(literal));
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self, op: PrefixOp) -> Option<Expr> {
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expr::Prefix(op, Box::new(right)))
    }

    fn parse_infix_expression(&mut self, left: Expr, op: InfixOp) -> Option<Expr> {
        let precedence = Precedence::of(&self.cur_token);
        self.advance();
        let right = self.parse_expression(precedence)?;
        Some(Expr::Infix(Box::new(left), op, Box::new(right)))
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.advance();
        let expr = self.parse_expression(Precedence::Lowest);
        if !self.expect_peek(Token::RightParen) {
            return None;
        }
        expr
    }

    fn parse_if_expression(&mut self) -> Option<Expr> {
        if !self.expect_peek(Token::LeftParen) {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(Token::RightParen) {
            return None;
        }
        if !self.expect_peek(Token::LeftCurly) {
            return None;
        }
        let consequence = self.parse_block();

        let alternative = if self.peek_token == Token::Else {
            self.advance();
            if !self.expect_peek(Token::LeftCurly) {
                return None;
            }
            Some(self.parse_block())
        } else {
            None
        };

        Some(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_literal(&mut self) -> Option<Expr> {
        if !self.expect_peek(Token::LeftParen) {
            return None;
        }
        let parameters = self.parse_function_parameters()?;
        if !self.expect_peek(Token::LeftCurly) {
            return None;
        }
        let body = self.parse_block();
        Some(Expr::Function {
            parameters: Rc::new(parameters),
            body: Rc::new(body),
        })
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<Symbol>> {
        let mut parameters = vec![];

        if self.peek_token == Token::RightParen {
            self.advance();
            return Some(parameters);
        }

        self.advance();
        parameters.push(self.current_ident()?);

        while self.peek_token == Token::Comma {
            self.advance();
            self.advance();
            parameters.push(self.current_ident()?);
        }

        if !self.expect_peek(Token::RightParen) {
            return None;
        }

        Some(parameters)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let arguments = self.parse_call_arguments()?;
        Some(Expr::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_call_arguments(&mut self) -> Option<Vec<Expr>> {
        let mut arguments = vec![];

        if self.peek_token == Token::RightParen {
            self.advance();
            return Some(arguments);
        }

        self.advance();
        arguments.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_token == Token::Comma {
            self.advance();
            self.advance();
            arguments.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(Token::RightParen) {
            return None;
        }

        Some(arguments)
    }

    /// On entry the current token is `{`; on return it is the matching `}`
    /// (or `Eof` for an unterminated block).
    fn parse_block(&mut self) -> Block {
        let mut statements = vec![];
        self.advance();
        while self.cur_token != Token::RightCurly && self.cur_token != Token::Eof {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.advance();
        }
        Block { statements }
    }

    fn advance(&mut self) {
        self.cur_token = std::mem::replace(&mut self.peek_token, self.scanner.next_token());
    }

    fn expect_peek(&mut self, expected: Token) -> bool {
        if self.peek_token == expected {
            self.advance();
            true
        } else {
            self.peek_error(&expected.to_string());
            false
        }
    }

    fn expect_ident(&mut self) -> Option<Symbol> {
        if let Token::Identifier(sym) = self.peek_token.clone() {
            self.advance();
            Some(sym)
        } else {
            self.peek_error("IDENT");
            None
        }
    }

    fn peek_error(&mut self, expected: &str) {
        self.errors.push(ParseError::UnexpectedToken {
            expected: expected.to_string(),
            got: self.peek_token.to_string(),
        });
    }

    fn current_ident(&mut self) -> Option<Symbol> {
        if let Token::Identifier(sym) = &self.cur_token {
            Some(sym.clone())
        } else {
            self.errors.push(ParseError::UnexpectedToken {
                expected: "IDENT".to_string(),
                got: self.cur_token.to_string(),
            });
            None
        }
    }
}

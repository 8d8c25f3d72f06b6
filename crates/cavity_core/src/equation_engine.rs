//! Bytecode evaluator for formula-defined elements.
//!
//! A formula is a list of assignment statements (`Name = expression`,
//! separated by `;` or newlines). Statements are compiled into stack-VM
//! bytecode once and evaluated on every matrix recalculation. Assigned
//! names become readable by later statements, so intermediate values can
//! be factored out; the element's custom parameters enter as free names.

use std::collections::HashMap;
use std::fmt::Debug;

use num_traits::{Float, FromPrimitive};
use thiserror::Error;

/// Numeric type the VM operates on.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    #[error("Formula is empty")]
    Empty,
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("Unknown name '{0}'")]
    UnknownName(String),
    #[error("Invalid number '{0}'")]
    BadNumber(String),
    #[error("Unexpected character '{0}'")]
    BadChar(char),
    #[error("{0}")]
    Syntax(String),
}

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Pushes a constant value onto the stack.
    Const(f64),
    /// Pushes the value assigned by an earlier statement (by slot).
    Local(usize),
    /// Pushes the value of an element parameter (by index).
    Param(usize),
    /// Pops (b, a), pushes a + b.
    Add,
    /// Pops (b, a), pushes a - b.
    Sub,
    /// Pops (b, a), pushes a * b.
    Mul,
    /// Pops (b, a), pushes a / b.
    Div,
    /// Pops (b, a), pushes a ^ b.
    Pow,
    /// Pops a, pushes -a.
    Neg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Exp,
    Ln,
    Abs,
}

/// A compiled sequence of operations producing one value.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stateless VM. `execute` takes the bytecode, the values of earlier
/// assignments, the parameter vector and a reusable stack buffer, and
/// returns the value left on the stack.
pub struct Vm;

impl Vm {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        locals: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::Const(val) => stack.push(T::from_f64(*val).unwrap()),
                OpCode::Local(idx) => stack.push(locals[*idx]),
                OpCode::Param(idx) => stack.push(params[*idx]),
                OpCode::Add => Self::binary(stack, |a, b| a + b),
                OpCode::Sub => Self::binary(stack, |a, b| a - b),
                OpCode::Mul => Self::binary(stack, |a, b| a * b),
                OpCode::Div => Self::binary(stack, |a, b| a / b),
                OpCode::Pow => Self::binary(stack, |a, b| a.powf(b)),
                OpCode::Neg => Self::unary(stack, |a| -a),
                OpCode::Sin => Self::unary(stack, |a| a.sin()),
                OpCode::Cos => Self::unary(stack, |a| a.cos()),
                OpCode::Tan => Self::unary(stack, |a| a.tan()),
                OpCode::Asin => Self::unary(stack, |a| a.asin()),
                OpCode::Acos => Self::unary(stack, |a| a.acos()),
                OpCode::Atan => Self::unary(stack, |a| a.atan()),
                OpCode::Sqrt => Self::unary(stack, |a| a.sqrt()),
                OpCode::Exp => Self::unary(stack, |a| a.exp()),
                OpCode::Ln => Self::unary(stack, |a| a.ln()),
                OpCode::Abs => Self::unary(stack, |a| a.abs()),
            }
        }

        stack.pop().unwrap_or_else(|| T::from_f64(0.0).unwrap())
    }

    fn binary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T, T) -> T) {
        let b = stack.pop().unwrap();
        let a = stack.pop().unwrap();
        stack.push(f(a, b));
    }

    fn unary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T) -> T) {
        let a = stack.pop().unwrap();
        stack.push(f(a));
    }
}

// --- AST & Parser ---

/// Abstract syntax tree nodes for expressions.
#[derive(Debug)]
pub enum Expr {
    Number(f64),
    Name(String),
    Binary(Box<Expr>, char, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

/// One `Name = expression` statement.
#[derive(Debug)]
pub struct Statement {
    pub target: String,
    pub value: Expr,
}

/// Parses a whole formula into its statement list. Statements are split
/// on `;` and newlines; blank statements are skipped.
pub fn parse_program(input: &str) -> Result<Vec<Statement>, FormulaError> {
    let mut statements = Vec::new();
    for chunk in input.split(|c| c == ';' || c == '\n') {
        if chunk.trim().is_empty() {
            continue;
        }
        let tokens = tokenize(chunk)?;
        let mut parser = Parser { tokens, pos: 0 };
        statements.push(parser.parse_statement()?);
    }
    if statements.is_empty() {
        return Err(FormulaError::Empty);
    }
    Ok(statements)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else if d == 'e' || d == 'E' {
                    // exponent, optionally signed
                    num_str.push(d);
                    chars.next();
                    if let Some(&sign) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            num_str.push(sign);
                            chars.next();
                        }
                    }
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| FormulaError::BadNumber(num_str.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            match c {
                '=' => tokens.push(Token::Assign),
                '+' => tokens.push(Token::Plus),
                '-' => tokens.push(Token::Minus),
                '*' => tokens.push(Token::Star),
                '/' => tokens.push(Token::Slash),
                '^' => tokens.push(Token::Caret),
                '(' => tokens.push(Token::LParen),
                ')' => tokens.push(Token::RParen),
                other => return Err(FormulaError::BadChar(other)),
            }
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_statement(&mut self) -> Result<Statement, FormulaError> {
        let target = match self.consume() {
            Some(Token::Identifier(name)) => name,
            _ => return Err(FormulaError::Syntax("Expected a name to assign".into())),
        };
        match self.consume() {
            Some(Token::Assign) => {}
            _ => {
                return Err(FormulaError::Syntax(format!(
                    "Expected '=' after '{target}'"
                )))
            }
        }
        let value = self.parse_expression()?;
        if self.peek().is_some() {
            return Err(FormulaError::Syntax("Unexpected trailing tokens".into()));
        }
        Ok(Statement { target, value })
    }

    fn parse_expression(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_term()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_power()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_power()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Caret) = self.peek() {
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), '^', Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(expr)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    match self.consume() {
                        Some(Token::RParen) => Ok(Expr::Call(name, Box::new(arg))),
                        _ => Err(FormulaError::Syntax("Expected ')'".into())),
                    }
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(FormulaError::Syntax("Expected ')'".into())),
                }
            }
            _ => Err(FormulaError::Syntax("Unexpected end of expression".into())),
        }
    }
}

// --- Compiler ---

/// Compiles statements into bytecode. Names resolve in order: previously
/// assigned statement targets, then element parameters, then `pi`.
pub struct Compiler {
    local_map: HashMap<String, usize>,
    param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(param_names: &[String]) -> Self {
        let mut param_map = HashMap::new();
        for (i, name) in param_names.iter().enumerate() {
            param_map.insert(name.clone(), i);
        }
        Self {
            local_map: HashMap::new(),
            param_map,
        }
    }

    pub fn compile(&mut self, statements: &[Statement]) -> Result<Vec<(String, Bytecode)>, FormulaError> {
        let mut compiled = Vec::with_capacity(statements.len());
        for statement in statements {
            let mut ops = Vec::new();
            self.compile_expr(&statement.value, &mut ops)?;
            // the target becomes readable from the next statement on
            let slot = self.local_map.len();
            self.local_map.entry(statement.target.clone()).or_insert(slot);
            compiled.push((statement.target.clone(), Bytecode { ops }));
        }
        Ok(compiled)
    }

    fn compile_expr(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), FormulaError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::Const(*n)),
            Expr::Name(name) => {
                if let Some(&idx) = self.local_map.get(name) {
                    ops.push(OpCode::Local(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::Param(idx));
                } else if name == "pi" {
                    ops.push(OpCode::Const(std::f64::consts::PI));
                } else {
                    return Err(FormulaError::UnknownName(name.clone()));
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_expr(left, ops)?;
                self.compile_expr(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    other => return Err(FormulaError::Syntax(format!("Unknown operator '{other}'"))),
                });
            }
            Expr::Neg(operand) => {
                self.compile_expr(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                self.compile_expr(arg, ops)?;
                ops.push(match func.as_str() {
                    "sin" => OpCode::Sin,
                    "cos" => OpCode::Cos,
                    "tan" => OpCode::Tan,
                    "asin" => OpCode::Asin,
                    "acos" => OpCode::Acos,
                    "atan" => OpCode::Atan,
                    "sqrt" => OpCode::Sqrt,
                    "exp" => OpCode::Exp,
                    "ln" => OpCode::Ln,
                    "abs" => OpCode::Abs,
                    _ => return Err(FormulaError::UnknownFunction(func.clone())),
                });
            }
        }
        Ok(())
    }
}

// --- FormulaProgram ---

/// A fully compiled formula: one bytecode per statement, evaluated in
/// order with earlier results visible to later statements.
#[derive(Debug, Clone)]
pub struct FormulaProgram {
    statements: Vec<(String, Bytecode)>,
    param_names: Vec<String>,
}

impl FormulaProgram {
    pub fn compile(formula: &str, param_names: &[String]) -> Result<Self, FormulaError> {
        let statements = parse_program(formula)?;
        let mut compiler = Compiler::new(param_names);
        let compiled = compiler.compile(&statements)?;
        Ok(Self {
            statements: compiled,
            param_names: param_names.to_vec(),
        })
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Evaluates all statements and returns the assigned values by name.
    /// A name assigned twice keeps its last value.
    pub fn eval(&self, params: &[f64]) -> HashMap<String, f64> {
        let mut locals: Vec<f64> = Vec::with_capacity(self.statements.len());
        let mut named = HashMap::with_capacity(self.statements.len());
        let mut stack = Vec::with_capacity(32);
        let mut slots: HashMap<&str, usize> = HashMap::new();

        for (name, bytecode) in &self.statements {
            let value = Vm::execute(bytecode, &locals, params, &mut stack);
            match slots.get(name.as_str()) {
                Some(&slot) => locals[slot] = value,
                None => {
                    slots.insert(name, locals.len());
                    locals.push(value);
                }
            }
            named.insert(name.clone(), value);
        }
        named
    }
}

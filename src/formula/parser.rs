// Formula parser - converts formula expression text into an AST.
// Supports: numbers, cell refs (A1), basic math (+, -, *, /), unary +/-, parens.
// The printed form of the AST is canonical: minimal parentheses, no whitespace.

use crate::position::Position;

use super::FormulaParseError;

/// Expression AST for a cell formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Cell reference. May point outside the grid bounds; the evaluator
    /// resolves those to `#REF!`.
    Ref(Position),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parse a formula expression (without the leading `=`) into an AST.
pub fn parse(expression: &str) -> Result<Expr, FormulaParseError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(FormulaParseError::new("empty formula"));
    }
    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos < tokens.len() {
        return Err(FormulaParseError::new(format!(
            "unexpected trailing input at token {}",
            pos
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone)]
enum Token {
    Number(f64),
    CellRef(Position),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            'A'..='Z' | 'a'..='z' => {
                // Cell reference: letters followed by digits
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match Position::parse_a1(&ident) {
                    Some(pos) => tokens.push(Token::CellRef(pos)),
                    None => {
                        return Err(FormulaParseError::new(format!(
                            "invalid cell reference: {}",
                            ident
                        )))
                    }
                }
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| FormulaParseError::new(format!("invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            _ => {
                return Err(FormulaParseError::new(format!(
                    "unexpected character: {}",
                    c
                )))
            }
        }
    }

    Ok(tokens)
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaParseError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaParseError> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaParseError> {
    if pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Some(UnaryOp::Plus),
            Token::Minus => Some(UnaryOp::Minus),
            _ => None,
        };
        if let Some(op) = op {
            let (operand, new_pos) = parse_unary(tokens, pos + 1)?;
            return Ok((
                Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
                new_pos,
            ));
        }
    }
    parse_primary(tokens, pos)
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaParseError> {
    if pos >= tokens.len() {
        return Err(FormulaParseError::new("unexpected end of expression"));
    }

    match &tokens[pos] {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::CellRef(p) => Ok((Expr::Ref(*p), pos + 1)),
        Token::LParen => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                _ => Err(FormulaParseError::new("missing closing parenthesis")),
            }
        }
        _ => Err(FormulaParseError::new(format!(
            "unexpected token at position {}",
            pos
        ))),
    }
}

// =============================================================================
// Canonical printing
// =============================================================================

/// Binding strength used when deciding where parentheses are required.
/// Atoms bind tightest; addition/subtraction loosest.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Number(_) | Expr::Ref(_) => 3,
        Expr::Unary { .. } => 2,
        Expr::Binary { op: Op::Mul | Op::Div, .. } => 1,
        Expr::Binary { op: Op::Add | Op::Sub, .. } => 0,
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Ref(p) => write!(f, "{}", p),
            Expr::Unary { op, operand } => {
                let sign = match op {
                    UnaryOp::Plus => '+',
                    UnaryOp::Minus => '-',
                };
                write!(f, "{}", sign)?;
                fmt_child(f, operand, precedence(self), false)
            }
            Expr::Binary { op, left, right } => {
                let prec = precedence(self);
                fmt_child(f, left, prec, false)?;
                let sign = match op {
                    Op::Add => '+',
                    Op::Sub => '-',
                    Op::Mul => '*',
                    Op::Div => '/',
                };
                write!(f, "{}", sign)?;
                // Subtraction and division do not associate to the right:
                // a-(b-c) and a/(b/c) must keep their parentheses.
                let right_grouping = matches!(op, Op::Sub | Op::Div);
                fmt_child(f, right, prec, right_grouping)
            }
        }
    }
}

fn fmt_child(
    f: &mut std::fmt::Formatter<'_>,
    child: &Expr,
    parent_prec: u8,
    parens_on_equal: bool,
) -> std::fmt::Result {
    let child_prec = precedence(child);
    let need_parens = child_prec < parent_prec || (parens_on_equal && child_prec == parent_prec);
    if need_parens {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

//! Expression parser.
//!
//! Recursive descent parser for the alert expression grammar. Converts text to
//! an [`Expr`] tree with error messages carrying the byte offset, the expected
//! construct and what was found instead.
//!
//! Precedence, lowest first: `x if c else y`, `or`, `and`, `not`, comparisons
//! (chainable), `|`, `^`, `&`, `+ -`, `* / // %`, unary `- + ~`, `**`, then
//! postfix calls and subscripts.

use crate::domain::error::SyntaxError;
use crate::domain::expr::{BinaryOp, BoolOp, CompareOp, Expr, Literal, UnaryOp};

const MAX_NESTING: usize = 64;
const MAX_INPUT_LEN: usize = 1024;

const RESERVED: &[&str] = &["and", "or", "not", "if", "else", "in"];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), SyntaxError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    /// Consume `s` only when it is not the prefix of a longer operator in `longer`.
    fn consume_op(&mut self, s: &str, longer: &[&str]) -> bool {
        self.skip_whitespace();
        let remaining = self.remaining();
        if remaining.starts_with(s) && !longer.iter().any(|l| remaining.starts_with(l)) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let body = self.parse_or()?;
        let result = if self.consume_keyword("if") {
            let test = self.parse_or()?;
            if !self.consume_keyword("else") {
                self.skip_whitespace();
                return Err(self.error(format!(
                    "expected 'else', found '{}'",
                    self.peek_word()
                )));
            }
            let orelse = self.parse_expr()?;
            Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            }
        } else {
            body
        };
        self.leave();
        Ok(result)
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_and()?;
        let mut values = vec![first];
        while self.consume_keyword("or") {
            values.push(self.parse_and()?);
        }
        Ok(fold_bool(BoolOp::Or, values))
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_not()?;
        let mut values = vec![first];
        while self.consume_keyword("and") {
            values.push(self.parse_not()?);
        }
        Ok(fold_bool(BoolOp::And, values))
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.pos;
        if self.consume_keyword("not") {
            // `not in` only appears after a left operand
            self.skip_whitespace();
            if self.peek_keyword("in") {
                self.pos = start;
                return Err(self.error("expected expression, found 'not in'"));
            }
            self.enter()?;
            let operand = self.parse_not()?;
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_compare_op(&mut self) -> Result<Option<CompareOp>, SyntaxError> {
        self.skip_whitespace();
        let start = self.pos;
        let op = if self.consume_op("==", &[]) {
            CompareOp::Eq
        } else if self.consume_op("!=", &[]) {
            CompareOp::NotEq
        } else if self.consume_op("<=", &[]) {
            CompareOp::LtE
        } else if self.consume_op(">=", &[]) {
            CompareOp::GtE
        } else if self.consume_op("<", &["<<"]) {
            CompareOp::Lt
        } else if self.consume_op(">", &[">>"]) {
            CompareOp::Gt
        } else if self.consume_keyword("in") {
            CompareOp::In
        } else if self.consume_keyword("not") {
            if !self.consume_keyword("in") {
                self.pos = start;
                return Err(self.error("expected 'in' after 'not'"));
            }
            CompareOp::NotIn
        } else if self.remaining().starts_with('=') {
            return Err(self.error("assignment is not allowed"));
        } else {
            return Ok(None);
        };
        Ok(Some(op))
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_bitor()?;
        let mut comparisons = Vec::new();
        while let Some(op) = self.parse_compare_op()? {
            comparisons.push((op, self.parse_bitor()?));
        }
        if comparisons.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                comparisons,
            })
        }
    }

    fn parse_bitor(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_bitxor()?;
        while self.consume_op("|", &["||"]) {
            let right = self.parse_bitxor()?;
            left = binary(BinaryOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_bitand()?;
        while self.consume_op("^", &[]) {
            let right = self.parse_bitand()?;
            left = binary(BinaryOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_arith()?;
        while self.consume_op("&", &["&&"]) {
            let right = self.parse_arith()?;
            left = binary(BinaryOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.consume_op("+", &["+="]) {
                BinaryOp::Add
            } else if self.consume_op("-", &["-="]) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = if self.consume_op("//", &[]) {
                BinaryOp::FloorDiv
            } else if self.consume_op("/", &[]) {
                BinaryOp::Div
            } else if self.consume_op("*", &["**"]) {
                BinaryOp::Mul
            } else if self.consume_op("%", &[]) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = if self.consume_op("-", &[]) {
            Some(UnaryOp::Neg)
        } else if self.consume_op("+", &[]) {
            Some(UnaryOp::Pos)
        } else if self.consume_op("~", &[]) {
            Some(UnaryOp::Invert)
        } else {
            None
        };
        match op {
            Some(op) => {
                self.enter()?;
                let operand = self.parse_factor()?;
                self.leave();
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_postfix()?;
        if self.consume_op("**", &[]) {
            self.enter()?;
            // right-associative, and binds tighter than a unary minus on its left
            let exponent = self.parse_factor()?;
            self.leave();
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_atom()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('(') => {
                    let name = match &expr {
                        Expr::Identifier(name) => name.clone(),
                        _ => return Err(self.error("only named functions can be called")),
                    };
                    self.advance();
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Call { name, args, kwargs };
                }
                Some('[') => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.skip_whitespace();
                    if self.peek() == Some(':') {
                        return Err(self.error("slice syntax is not supported; use slice()"));
                    }
                    self.expect_char(']')?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some('.') => return Err(self.error("attribute access is not allowed")),
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SyntaxError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok((args, kwargs));
        }
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let word = self.peek_word();
            let is_kwarg = is_identifier(&word) && {
                let after = self.remaining()[word.len()..].trim_start();
                after.starts_with('=') && !after.starts_with("==")
            };
            if is_kwarg {
                self.pos += word.len();
                self.expect_char('=')?;
                if kwargs.iter().any(|(k, _)| *k == word) {
                    self.pos = start;
                    return Err(self.error(format!("duplicate keyword argument '{}'", word)));
                }
                let value = self.parse_expr()?;
                kwargs.push((word, value));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.parse_expr()?);
            }
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
        }
        Ok((args, kwargs))
    }

    /// Comma-separated expressions up to `close`, allowing a trailing comma.
    /// Returns the items and whether a comma was seen.
    fn parse_sequence(&mut self, close: char) -> Result<(Vec<Expr>, bool), SyntaxError> {
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.advance();
                break;
            }
            items.push(self.parse_expr()?);
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.advance();
                saw_comma = true;
                continue;
            }
            self.expect_char(close)?;
            break;
        }
        Ok((items, saw_comma))
    }

    fn parse_map(&mut self) -> Result<Expr, SyntaxError> {
        let mut entries = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.advance();
                break;
            }
            let key = self.parse_expr()?;
            self.expect_char(':')?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.advance();
                continue;
            }
            self.expect_char('}')?;
            break;
        }
        Ok(Expr::Map(entries))
    }

    fn parse_number(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.pos;
        let mut digits = 0;
        let mut has_dot = false;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(SyntaxError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mark = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            let exp_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            if self.pos == exp_start {
                self.pos = mark;
            }
        }

        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.error(format!("invalid number literal near '{}'", self.peek_word())));
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map(|n| Expr::Literal(Literal::Number(n)))
            .map_err(|_| SyntaxError {
                message: format!("invalid number: {}", num_str),
                position: start,
            })
    }

    fn parse_string(&mut self, quote: char) -> Result<Expr, SyntaxError> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(SyntaxError {
                        message: "unterminated string literal".to_string(),
                        position: start,
                    });
                }
                Some(ch) if ch == quote => break,
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(other) => {
                            return Err(self.error(format!("unknown escape sequence '\\{}'", other)));
                        }
                        None => {
                            return Err(SyntaxError {
                                message: "unterminated string literal".to_string(),
                                position: start,
                            });
                        }
                    };
                    out.push(escaped);
                }
                Some(ch) => out.push(ch),
            }
        }
        Ok(Expr::Literal(Literal::String(out)))
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("expected expression, found end of input")),
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.parse_number(),
            Some(q @ ('\'' | '"')) => self.parse_string(q),
            Some('(') => {
                self.advance();
                self.enter()?;
                let (mut items, saw_comma) = self.parse_sequence(')')?;
                self.leave();
                if items.len() == 1 && !saw_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Expr::Tuple(items))
                }
            }
            Some('[') => {
                self.advance();
                self.enter()?;
                let (items, _) = self.parse_sequence(']')?;
                self.leave();
                Ok(Expr::List(items))
            }
            Some('{') => {
                self.advance();
                self.enter()?;
                let map = self.parse_map()?;
                self.leave();
                Ok(map)
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let word = self.peek_word();
                if RESERVED.contains(&word.as_str()) {
                    return Err(self.error(format!("expected expression, found '{}'", word)));
                }
                self.pos += word.len();
                Ok(Expr::Identifier(word))
            }
            Some(ch) => Err(self.error(format!("expected expression, found '{}'", ch))),
        }
    }

    fn parse(&mut self) -> Result<Expr, SyntaxError> {
        if self.input.len() > MAX_INPUT_LEN {
            return Err(self.error(format!(
                "expression longer than {} bytes",
                MAX_INPUT_LEN
            )));
        }
        self.skip_whitespace();
        if self.pos == self.input.len() {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_expr()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after expression: '{}'",
                self.remaining()
            )));
        }
        Ok(expr)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn fold_bool(op: BoolOp, mut values: Vec<Expr>) -> Expr {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Expr::BoolOp { op, values }
    }
}

fn is_identifier(word: &str) -> bool {
    word.chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && word.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !RESERVED.contains(&word)
}

pub fn parse(input: &str) -> Result<Expr, SyntaxError> {
    let mut parser = Parser::new(input);
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Expr {
        Expr::Literal(Literal::Number(n))
    }

    fn ident(name: &str) -> Expr {
        Expr::Identifier(name.into())
    }

    #[test]
    fn parse_number_literal() {
        assert_eq!(parse("42").unwrap(), num(42.0));
        assert_eq!(parse("3.5").unwrap(), num(3.5));
        assert_eq!(parse(".5").unwrap(), num(0.5));
        assert_eq!(parse("1e3").unwrap(), num(1000.0));
        assert_eq!(parse("2.5E-1").unwrap(), num(0.25));
    }

    #[test]
    fn parse_string_literals() {
        assert_eq!(
            parse("'btc'").unwrap(),
            Expr::Literal(Literal::String("btc".into()))
        );
        assert_eq!(
            parse(r#""a\"b""#).unwrap(),
            Expr::Literal(Literal::String("a\"b".into()))
        );
    }

    #[test]
    fn parse_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
        let expr = parse("-2 ** 2").unwrap();
        assert_eq!(expr.to_string(), "(-(2 ** 2))");
        let expr = parse("2 ** 3 ** 2").unwrap();
        assert_eq!(expr.to_string(), "(2 ** (3 ** 2))");
        let expr = parse("a | b ^ c & d").unwrap();
        assert_eq!(expr.to_string(), "(a | (b ^ (c & d)))");
        let expr = parse("7 // 2 % 3").unwrap();
        assert_eq!(expr.to_string(), "((7 // 2) % 3)");
    }

    #[test]
    fn parse_chained_comparison() {
        let expr = parse("1 < x <= 3").unwrap();
        match expr {
            Expr::Compare { left, comparisons } => {
                assert_eq!(*left, num(1.0));
                assert_eq!(comparisons.len(), 2);
                assert_eq!(comparisons[0].0, CompareOp::Lt);
                assert_eq!(comparisons[1].0, CompareOp::LtE);
            }
            other => panic!("expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn parse_membership() {
        let expr = parse("symbol not in ['BTC', 'ETH']").unwrap();
        assert!(matches!(
            expr,
            Expr::Compare { ref comparisons, .. } if comparisons[0].0 == CompareOp::NotIn
        ));
        let expr = parse("'x' in name").unwrap();
        assert!(matches!(
            expr,
            Expr::Compare { ref comparisons, .. } if comparisons[0].0 == CompareOp::In
        ));
    }

    #[test]
    fn parse_boolean_ops() {
        let expr = parse("rsi_14 < 30 and price > sma(prices, 20)").unwrap();
        match expr {
            Expr::BoolOp { op, values } => {
                assert_eq!(op, BoolOp::And);
                assert_eq!(values.len(), 2);
            }
            other => panic!("expected BoolOp, got {:?}", other),
        }
        let expr = parse("a or b and not c").unwrap();
        assert_eq!(expr.to_string(), "(a or (b and (not c)))");
    }

    #[test]
    fn parse_conditional() {
        let expr = parse("1 if flag else 2").unwrap();
        assert!(matches!(expr, Expr::Conditional { .. }));
        assert!(parse("1 if flag").is_err());
    }

    #[test]
    fn parse_call_with_kwargs() {
        let expr = parse("rsi(prices, period=7)").unwrap();
        match expr {
            Expr::Call { name, args, kwargs } => {
                assert_eq!(name, "rsi");
                assert_eq!(args, vec![ident("prices")]);
                assert_eq!(kwargs, vec![("period".to_string(), num(7.0))]);
            }
            other => panic!("expected Call, got {:?}", other),
        }
        assert!(parse("rsi(period=7, prices)").is_err());
        assert!(parse("rsi(prices, period=7, period=8)").is_err());
    }

    #[test]
    fn parse_empty_call() {
        assert_eq!(
            parse("now()").unwrap(),
            Expr::Call {
                name: "now".into(),
                args: vec![],
                kwargs: vec![],
            }
        );
    }

    #[test]
    fn parse_containers() {
        assert_eq!(parse("[1, 2,]").unwrap(), Expr::List(vec![num(1.0), num(2.0)]));
        assert_eq!(parse("(1,)").unwrap(), Expr::Tuple(vec![num(1.0)]));
        assert_eq!(parse("()").unwrap(), Expr::Tuple(vec![]));
        assert_eq!(parse("(1)").unwrap(), num(1.0));
        let map = parse("{'a': 1, 'b': 2}").unwrap();
        assert!(matches!(map, Expr::Map(ref entries) if entries.len() == 2));
    }

    #[test]
    fn parse_subscript() {
        let expr = parse("bb['upper']").unwrap();
        assert!(matches!(expr, Expr::Subscript { .. }));
        let expr = parse("prices[-1]").unwrap();
        assert_eq!(expr.to_string(), "prices[(-1)]");
    }

    #[test]
    fn rejects_attribute_access() {
        let err = parse("price.__class__").unwrap_err();
        assert!(err.message.contains("attribute access"));
        assert_eq!(err.position, 5);
    }

    #[test]
    fn rejects_calls_on_expressions() {
        assert!(parse("(abs)(1)").is_err());
        assert!(parse("f(1)(2)").is_err());
        assert!(parse("x[0](1)").is_err());
    }

    #[test]
    fn rejects_assignment_and_statements() {
        assert!(parse("x = 1").is_err());
        assert!(parse("import os").is_err());
        assert!(parse("lambda: 1").is_err());
        assert!(parse("x; y").is_err());
    }

    #[test]
    fn rejects_slices() {
        let err = parse("prices[1:3]").unwrap_err();
        assert!(err.message.contains("slice"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("(1, 2").is_err());
        assert!(parse("'open").is_err());
        assert!(parse("12abc").is_err());
        assert!(parse("and").is_err());
        assert!(parse("a not b").is_err());
    }

    #[test]
    fn rejects_excessive_nesting() {
        let deep = "(".repeat(200) + "1" + &")".repeat(200);
        let err = parse(&deep).unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn rejects_oversized_input() {
        let long = vec!["1"; 3000].join("+");
        assert!(parse(&long).is_err());
    }

    #[test]
    fn error_position_for_trailing_input() {
        let err = parse("price > 1 )").unwrap_err();
        assert_eq!(err.position, 10);
    }

    #[test]
    fn display_round_trips() {
        for text in [
            "rsi_14 < 30 and price > sma(prices, 20)",
            "1 if a < b < c else -x ** 2",
            "{'k': [1, (2,)], 'n': null}['k'][0]",
            "not (a in b) or c not in d",
            "rsi(prices, period=7) // 3 % 2 | ~4",
        ] {
            let tree = parse(text).unwrap();
            let reparsed = parse(&tree.to_string()).unwrap();
            assert_eq!(tree, reparsed, "round trip failed for {}", text);
        }
    }
}

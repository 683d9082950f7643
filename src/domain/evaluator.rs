//! Expression evaluator.
//!
//! A closed interpreter over [`Expr`]. The function and keyword tables are
//! built once per [`Evaluator`] and never change afterwards, so one evaluator
//! can be shared across threads as long as each call brings its own context.
//!
//! # Evaluation Semantics
//!
//! - Keywords (`true`, `false`, `null`, `pi`, `e`) resolve before the context
//!   and cannot be shadowed.
//! - Identifiers missing from the context evaluate to `0`, or fail with
//!   [`EvalError::UnknownIdentifier`] when `strict_identifiers` is set.
//! - `a < b < c` compares pairwise left to right and stops at the first false pair.
//! - `and` / `or` short-circuit and always produce a `Bool`.
//! - Bitwise operators accept integral numbers only.

use crate::domain::error::{AlertEngineError, EvalError, SyntaxError};
use crate::domain::expr::{BinaryOp, BoolOp, CompareOp, Expr, Literal, NodeKind, UnaryOp};
use crate::domain::expr_parser;
use crate::domain::functions::FunctionRegistry;
use crate::domain::indicator;
use crate::domain::snapshot::MarketSnapshot;
use crate::domain::value::{Context, Value};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const KEYWORDS: &[&str] = &["true", "false", "null", "pi", "e"];

const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "//", "%", "**", "&", "|", "^", "~", "==", "!=", "<", "<=", ">", ">=",
    "in", "not in", "and", "or", "not", "if/else",
];

/// Largest magnitude at which every integer is exactly representable.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorOptions {
    pub strict_identifiers: bool,
    /// Parsed trees kept by [`Evaluator::compile`]; 0 disables caching.
    pub cache_size: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            strict_identifiers: false,
            cache_size: 256,
        }
    }
}

/// Result of static expression validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub variables: Vec<String>,
    pub functions: Vec<String>,
    pub unknown_functions: Vec<String>,
    pub tree: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct Evaluator {
    functions: FunctionRegistry,
    keywords: HashMap<&'static str, Value>,
    options: EvaluatorOptions,
    cache: Mutex<HashMap<String, Arc<Expr>>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorOptions::default())
    }
}

impl Evaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        let keywords = HashMap::from([
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
            ("pi", Value::Number(std::f64::consts::PI)),
            ("e", Value::Number(std::f64::consts::E)),
        ]);
        Self {
            functions: FunctionRegistry::builtin(),
            keywords,
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> EvaluatorOptions {
        self.options
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        self.keywords.contains_key(name)
    }

    pub fn supported_functions(&self) -> Vec<(&'static str, &'static str)> {
        self.functions.describe()
    }

    pub fn supported_operators(&self) -> &'static [&'static str] {
        OPERATORS
    }

    pub fn parse(&self, text: &str) -> Result<Expr, SyntaxError> {
        expr_parser::parse(text)
    }

    /// Parse through the bounded tree cache. The cache is cleared when full.
    pub fn compile(&self, text: &str) -> Result<Arc<Expr>, SyntaxError> {
        if self.options.cache_size == 0 {
            return self.parse(text).map(Arc::new);
        }

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tree) = cache.get(text) {
            return Ok(Arc::clone(tree));
        }
        let tree = Arc::new(self.parse(text)?);
        if cache.len() >= self.options.cache_size {
            cache.clear();
        }
        cache.insert(text.to_string(), Arc::clone(&tree));
        Ok(tree)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Snapshot fields plus indicators derived from `prices` when present:
    /// `sma_20`, `ema_12`, `rsi_14` and `bb` (upper/middle/lower).
    /// Fields already supplied by the snapshot are left alone.
    pub fn build_context(&self, snapshot: &MarketSnapshot) -> Context {
        let mut ctx = snapshot.to_context();
        let prices = ctx.get("prices").and_then(Value::as_series);
        if let Some(prices) = prices {
            let bands = indicator::bollinger(
                &prices,
                indicator::bollinger::DEFAULT_PERIOD,
                indicator::bollinger::DEFAULT_MULTIPLIER,
            );
            let derived = [
                ("sma_20", Value::Number(indicator::sma(&prices, 20))),
                ("ema_12", Value::Number(indicator::ema(&prices, 12))),
                (
                    "rsi_14",
                    Value::Number(indicator::rsi(&prices, indicator::rsi::DEFAULT_PERIOD)),
                ),
                (
                    "bb",
                    Value::map_from([
                        ("upper", bands.upper),
                        ("middle", bands.middle),
                        ("lower", bands.lower),
                    ]),
                ),
            ];
            for (name, value) in derived {
                ctx.entry(name.to_string()).or_insert(value);
            }
        }
        ctx
    }

    /// Parse, evaluate against the snapshot context and coerce to bool.
    pub fn evaluate_condition(
        &self,
        text: &str,
        snapshot: &MarketSnapshot,
    ) -> Result<bool, AlertEngineError> {
        let tree = self.compile(text)?;
        let ctx = self.build_context(snapshot);
        Ok(self.evaluate(&tree, &ctx)?.is_truthy())
    }

    /// Static check: parse and report identifiers and functions without evaluating.
    pub fn validate_expression(&self, text: &str) -> Validation {
        let tree = match self.parse(text) {
            Ok(tree) => tree,
            Err(err) => {
                return Validation {
                    valid: false,
                    variables: Vec::new(),
                    functions: Vec::new(),
                    unknown_functions: Vec::new(),
                    tree: None,
                    error: Some(err.to_string()),
                };
            }
        };

        let variables: Vec<String> = tree
            .identifiers()
            .into_iter()
            .filter(|name| !self.is_keyword(name))
            .collect();
        let functions: Vec<String> = tree.function_names().into_iter().collect();
        let unknown_functions: Vec<String> = functions
            .iter()
            .filter(|name| !self.functions.contains(name))
            .cloned()
            .collect();
        let error = (!unknown_functions.is_empty())
            .then(|| format!("unknown functions: {}", unknown_functions.join(", ")));

        Validation {
            valid: unknown_functions.is_empty(),
            variables,
            functions,
            unknown_functions,
            tree: Some(tree.to_string()),
            error,
        }
    }

    pub fn evaluate(&self, expr: &Expr, ctx: &Context) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            Expr::List(items) => Ok(Value::List(self.evaluate_all(items, ctx)?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.evaluate_all(items, ctx)?)),
            Expr::Map(entries) => {
                let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = self.evaluate(k, ctx)?;
                    let value = self.evaluate(v, ctx)?;
                    match out.iter_mut().find(|(existing, _)| *existing == key) {
                        Some(slot) => slot.1 = value,
                        None => out.push((key, value)),
                    }
                }
                Ok(Value::Map(out))
            }
            Expr::Identifier(name) => self.lookup(name, ctx),
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand, ctx)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                binary(*op, l, r)
            }
            Expr::Compare { left, comparisons } => {
                let mut current = self.evaluate(left, ctx)?;
                for (op, operand) in comparisons {
                    let next = self.evaluate(operand, ctx)?;
                    if !compare(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::BoolOp { op, values } => {
                for value in values {
                    let truthy = self.evaluate(value, ctx)?.is_truthy();
                    match op {
                        BoolOp::And if !truthy => return Ok(Value::Bool(false)),
                        BoolOp::Or if truthy => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                }
                Ok(Value::Bool(*op == BoolOp::And))
            }
            Expr::Conditional {
                test,
                body,
                orelse,
            } => {
                if self.evaluate(test, ctx)?.is_truthy() {
                    self.evaluate(body, ctx)
                } else {
                    self.evaluate(orelse, ctx)
                }
            }
            Expr::Call { name, args, kwargs } => {
                let spec = self
                    .functions
                    .get(name)
                    .ok_or_else(|| EvalError::UnknownFunction { name: name.clone() })?;
                let args = self.evaluate_all(args, ctx)?;
                let kwargs = kwargs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.evaluate(v, ctx)?)))
                    .collect::<Result<Vec<_>, EvalError>>()?;
                let wrap = |reason: String| EvalError::Function {
                    name: name.clone(),
                    reason,
                };
                let bound = spec.bind(args, kwargs).map_err(wrap)?;
                (spec.call)(&bound).map_err(wrap)
            }
            Expr::Subscript { value, index } => {
                let container = self.evaluate(value, ctx)?;
                let index = self.evaluate(index, ctx)?;
                subscript(container, &index)
            }
        }
    }

    fn evaluate_all(&self, items: &[Expr], ctx: &Context) -> Result<Vec<Value>, EvalError> {
        items.iter().map(|e| self.evaluate(e, ctx)).collect()
    }

    fn lookup(&self, name: &str, ctx: &Context) -> Result<Value, EvalError> {
        if let Some(value) = self.keywords.get(name) {
            return Ok(value.clone());
        }
        match ctx.get(name) {
            Some(value) => Ok(value.clone()),
            None if self.options.strict_identifiers => Err(EvalError::UnknownIdentifier {
                name: name.to_string(),
            }),
            None => Ok(Value::Number(0.0)),
        }
    }
}

fn unsupported(node: NodeKind, op: impl ToString, l: &Value, r: &Value) -> EvalError {
    EvalError::UnsupportedOperand {
        node,
        op: op.to_string(),
        left: l.type_name(),
        right: r.type_name(),
    }
}

fn integral(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT).then_some(n as i64)
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    let bad = |value: &Value| EvalError::BadUnaryOperand {
        op: op.to_string().trim().to_string(),
        operand: value.type_name(),
    };
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => value.as_number().map(|n| Value::Number(-n)).ok_or_else(|| bad(&value)),
        UnaryOp::Pos => value.as_number().map(Value::Number).ok_or_else(|| bad(&value)),
        UnaryOp::Invert => {
            let n = value.as_number().ok_or_else(|| bad(&value))?;
            let i = integral(n).ok_or_else(|| EvalError::NotIntegral {
                node: NodeKind::Unary,
                op: "~".to_string(),
            })?;
            Ok(Value::Number(!i as f64))
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    let node = NodeKind::Binary;
    if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
        return numeric(op, a, b).map(Value::Number);
    }
    match (op, l, r) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (BinaryOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (BinaryOp::Add, Value::Tuple(mut a), Value::Tuple(b)) => {
            a.extend(b);
            Ok(Value::Tuple(a))
        }
        (op, l, r) => Err(unsupported(node, op, &l, &r)),
    }
}

fn numeric(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    let node = NodeKind::Binary;
    let nonzero = |b: f64| {
        if b == 0.0 {
            Err(EvalError::DivisionByZero { node })
        } else {
            Ok(b)
        }
    };
    let bitwise = |f: fn(i64, i64) -> i64| match (integral(a), integral(b)) {
        (Some(x), Some(y)) => Ok(f(x, y) as f64),
        _ => Err(EvalError::NotIntegral {
            node,
            op: op.to_string(),
        }),
    };

    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => Ok(a / nonzero(b)?),
        BinaryOp::FloorDiv => Ok((a / nonzero(b)?).floor()),
        BinaryOp::Mod => {
            let b = nonzero(b)?;
            let r = a % b;
            // result takes the sign of the divisor
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                Ok(r + b)
            } else {
                Ok(r)
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::DivisionByZero { node });
            }
            Ok(a.powf(b))
        }
        BinaryOp::BitAnd => bitwise(|x, y| x & y),
        BinaryOp::BitOr => bitwise(|x, y| x | y),
        BinaryOp::BitXor => bitwise(|x, y| x ^ y),
    }
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> Result<bool, EvalError> {
    let ordered = |want: fn(Ordering) -> bool| -> Result<bool, EvalError> {
        if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
            // NaN compares false against everything
            return Ok(a.partial_cmp(&b).is_some_and(want));
        }
        l.partial_cmp_value(r)
            .map(want)
            .ok_or_else(|| unsupported(NodeKind::Compare, op, l, r))
    };

    match op {
        CompareOp::Eq => Ok(l == r),
        CompareOp::NotEq => Ok(l != r),
        CompareOp::Lt => ordered(|o| o == Ordering::Less),
        CompareOp::LtE => ordered(|o| o != Ordering::Greater),
        CompareOp::Gt => ordered(|o| o == Ordering::Greater),
        CompareOp::GtE => ordered(|o| o != Ordering::Less),
        CompareOp::In => contains(r, l, op),
        CompareOp::NotIn => contains(r, l, op).map(|found| !found),
    }
}

fn contains(container: &Value, item: &Value, op: CompareOp) -> Result<bool, EvalError> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::List(items) | Value::Tuple(items), _) => Ok(items.contains(item)),
        (Value::Map(_), _) => Ok(container.get(item).is_some()),
        _ => Err(unsupported(NodeKind::Compare, op, item, container)),
    }
}

fn subscript(container: Value, index: &Value) -> Result<Value, EvalError> {
    let position = |len: usize| -> Result<usize, EvalError> {
        let i = index
            .as_number()
            .and_then(integral)
            .ok_or_else(|| unsupported(NodeKind::Subscript, "[]", &container, index))?;
        let resolved = if i < 0 { i + len as i64 } else { i };
        if resolved < 0 || resolved >= len as i64 {
            return Err(EvalError::IndexOutOfRange { index: i, len });
        }
        Ok(resolved as usize)
    };

    match &container {
        Value::List(items) | Value::Tuple(items) => {
            let i = position(items.len())?;
            Ok(items[i].clone())
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = position(chars.len())?;
            Ok(Value::String(chars[i].to_string()))
        }
        Value::Map(_) => container
            .get(index)
            .cloned()
            .ok_or_else(|| EvalError::KeyNotFound {
                key: index.to_string(),
            }),
        other => Err(EvalError::NotSubscriptable {
            type_name: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn eval(text: &str) -> Result<Value, EvalError> {
        eval_with(text, &Context::new())
    }

    fn eval_with(text: &str, ctx: &Context) -> Result<Value, EvalError> {
        let evaluator = Evaluator::default();
        let tree = evaluator.parse(text).expect("parses");
        evaluator.evaluate(&tree, ctx)
    }

    fn ctx(pairs: &[(&str, Value)]) -> Context {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn chained_comparisons() {
        assert_eq!(eval("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 3 < 2").unwrap(), Value::Bool(false));
        assert_eq!(eval("3 > 2 > 1").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 <= 1 == 1 != 2").unwrap(), Value::Bool(true));
    }

    #[test]
    fn chained_comparison_short_circuits() {
        // the failing first pair means the type error on the right is never reached
        assert_eq!(eval("2 < 1 < 'x'").unwrap(), Value::Bool(false));
        assert!(eval("1 < 2 < 'x'").is_err());
    }

    #[test]
    fn arithmetic_semantics() {
        assert_eq!(eval("7 // 2").unwrap(), Value::Number(3.0));
        assert_eq!(eval("-7 // 2").unwrap(), Value::Number(-4.0));
        assert_eq!(eval("-7 % 3").unwrap(), Value::Number(2.0));
        assert_eq!(eval("7 % -3").unwrap(), Value::Number(-2.0));
        assert_eq!(eval("2 ** 10").unwrap(), Value::Number(1024.0));
        assert_eq!(eval("-2 ** 2").unwrap(), Value::Number(-4.0));
        assert_eq!(eval("true + 1").unwrap(), Value::Number(2.0));
        assert_relative_eq!(eval("1 / 4").unwrap().as_number().unwrap(), 0.25);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        for text in ["1 / 0", "1 // 0", "1 % 0", "0 ** -1"] {
            assert!(
                matches!(eval(text), Err(EvalError::DivisionByZero { .. })),
                "{}",
                text
            );
        }
    }

    #[test]
    fn bitwise_requires_integers() {
        assert_eq!(eval("6 & 3").unwrap(), Value::Number(2.0));
        assert_eq!(eval("6 | 3").unwrap(), Value::Number(7.0));
        assert_eq!(eval("6 ^ 3").unwrap(), Value::Number(5.0));
        assert_eq!(eval("~5").unwrap(), Value::Number(-6.0));
        assert!(matches!(eval("1.5 & 1"), Err(EvalError::NotIntegral { .. })));
        assert!(matches!(eval("~0.5"), Err(EvalError::NotIntegral { .. })));
    }

    #[test]
    fn sequence_concatenation() {
        assert_eq!(eval("'ab' + 'cd'").unwrap(), Value::from("abcd"));
        assert_eq!(eval("[1] + [2]").unwrap(), Value::from(vec![1.0, 2.0]));
        let err = eval("'a' + 1").unwrap_err();
        assert_eq!(err.node(), NodeKind::Binary);
        assert!(err.to_string().contains("string and number"));
    }

    #[test]
    fn unary_errors() {
        assert!(matches!(eval("-'a'"), Err(EvalError::BadUnaryOperand { .. })));
        assert_eq!(eval("not 0").unwrap(), Value::Bool(true));
        assert_eq!(eval("not [1]").unwrap(), Value::Bool(false));
    }

    #[test]
    fn boolean_ops_return_bools_and_short_circuit() {
        assert_eq!(eval("1 and 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("0 or ''").unwrap(), Value::Bool(false));
        // right side would fail if evaluated
        assert_eq!(eval("false and unknown_fn()").unwrap(), Value::Bool(false));
        assert_eq!(eval("true or 1 / 0").unwrap(), Value::Bool(true));
    }

    #[test]
    fn conditional_expression() {
        assert_eq!(eval("'up' if 2 > 1 else 'down'").unwrap(), Value::from("up"));
        assert_eq!(eval("1 if null else 2").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn membership() {
        assert_eq!(eval("2 in [1, 2]").unwrap(), Value::Bool(true));
        assert_eq!(eval("'BTC' in 'BTC/USDT'").unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' not in {'a': 1}").unwrap(), Value::Bool(false));
        assert!(eval("1 in 5").is_err());
    }

    #[test]
    fn identifiers_and_keywords() {
        let c = ctx(&[("price", Value::Number(42.0)), ("pi", Value::Number(3.0))]);
        assert_eq!(eval_with("price", &c).unwrap(), Value::Number(42.0));
        assert_eq!(eval_with("missing", &c).unwrap(), Value::Number(0.0));
        // keywords win over context entries
        assert_relative_eq!(
            eval_with("pi", &c).unwrap().as_number().unwrap(),
            std::f64::consts::PI
        );
        assert_eq!(eval("null").unwrap(), Value::Null);
    }

    #[test]
    fn strict_identifiers() {
        let evaluator = Evaluator::new(EvaluatorOptions {
            strict_identifiers: true,
            cache_size: 0,
        });
        let tree = evaluator.parse("missing > 1").unwrap();
        let err = evaluator.evaluate(&tree, &Context::new()).unwrap_err();
        assert!(matches!(err, EvalError::UnknownIdentifier { .. }));
        let tree = evaluator.parse("true").unwrap();
        assert!(evaluator.evaluate(&tree, &Context::new()).is_ok());
    }

    #[test]
    fn subscripts() {
        let c = ctx(&[("prices", Value::from(vec![1.0, 2.0, 3.0]))]);
        assert_eq!(eval_with("prices[0]", &c).unwrap(), Value::Number(1.0));
        assert_eq!(eval_with("prices[-1]", &c).unwrap(), Value::Number(3.0));
        assert!(matches!(
            eval_with("prices[3]", &c),
            Err(EvalError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert_eq!(eval("{'a': 1}['a']").unwrap(), Value::Number(1.0));
        assert!(matches!(eval("{'a': 1}['b']"), Err(EvalError::KeyNotFound { .. })));
        assert!(matches!(eval("5[0]"), Err(EvalError::NotSubscriptable { .. })));
        assert_eq!(eval("'abc'[1]").unwrap(), Value::from("b"));
    }

    #[test]
    fn map_literal_last_key_wins() {
        let value = eval("{'a': 1, 'a': 2}").unwrap();
        assert_eq!(value, Value::map_from([("a", 2.0)]));
    }

    #[test]
    fn function_calls() {
        let c = ctx(&[("prices", Value::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]))]);
        assert_eq!(eval_with("sma(prices, 3)", &c).unwrap(), Value::Number(4.0));
        assert_eq!(eval_with("sma(prices, period=3)", &c).unwrap(), Value::Number(4.0));
        assert_eq!(eval_with("max(prices) - min(prices)", &c).unwrap(), Value::Number(4.0));
        assert_eq!(eval_with("bollinger(prices, 5)['middle']", &c).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn unknown_function_fails() {
        let err = eval("system('rm')").unwrap_err();
        assert_eq!(
            err,
            EvalError::UnknownFunction {
                name: "system".into()
            }
        );
    }

    #[test]
    fn function_failures_are_wrapped() {
        let err = eval("sqrt(-1)").unwrap_err();
        assert!(matches!(&err, EvalError::Function { name, .. } if name == "sqrt"));
        assert!(err.to_string().starts_with("error calling function sqrt"));
        assert!(matches!(eval("rsi()"), Err(EvalError::Function { .. })));
    }

    #[test]
    fn evaluate_condition_derives_indicators() {
        let evaluator = Evaluator::default();
        let prices: Vec<f64> = (1..=30).map(f64::from).collect();
        let snap = MarketSnapshot::new()
            .with("price", 30.0)
            .with("prices", prices);
        assert!(evaluator.evaluate_condition("price > sma_20", &snap).unwrap());
        assert!(evaluator.evaluate_condition("rsi_14 > 50", &snap).unwrap());
        assert!(evaluator.evaluate_condition("bb['upper'] > bb['lower']", &snap).unwrap());
        assert!(!evaluator.evaluate_condition("price < ema_12", &snap).unwrap());
    }

    #[test]
    fn evaluate_condition_keeps_supplied_fields() {
        let evaluator = Evaluator::default();
        let snap = MarketSnapshot::new()
            .with("prices", vec![1.0, 2.0, 3.0])
            .with("rsi_14", 12.0);
        assert!(evaluator.evaluate_condition("rsi_14 == 12", &snap).unwrap());
    }

    #[test]
    fn evaluate_condition_surfaces_errors() {
        let evaluator = Evaluator::default();
        let snap = MarketSnapshot::new();
        assert!(matches!(
            evaluator.evaluate_condition("price >", &snap),
            Err(AlertEngineError::Syntax(_))
        ));
        assert!(matches!(
            evaluator.evaluate_condition("nope(1)", &snap),
            Err(AlertEngineError::Eval(_))
        ));
    }

    #[test]
    fn compile_caches_and_clears_when_full() {
        let evaluator = Evaluator::new(EvaluatorOptions {
            strict_identifiers: false,
            cache_size: 2,
        });
        let a = evaluator.compile("price > 1").unwrap();
        let again = evaluator.compile("price > 1").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        evaluator.compile("price > 2").unwrap();
        assert_eq!(evaluator.cached_len(), 2);
        evaluator.compile("price > 3").unwrap();
        assert_eq!(evaluator.cached_len(), 1);
        assert!(evaluator.compile("price >").is_err());
    }

    #[test]
    fn compile_without_cache() {
        let evaluator = Evaluator::new(EvaluatorOptions {
            strict_identifiers: false,
            cache_size: 0,
        });
        evaluator.compile("1 + 1").unwrap();
        assert_eq!(evaluator.cached_len(), 0);
    }

    #[test]
    fn validate_reports_names() {
        let evaluator = Evaluator::default();
        let v = evaluator.validate_expression("rsi_14 < 30 and price > sma(prices, 20) and true");
        assert!(v.valid);
        assert_eq!(v.variables, vec!["price", "prices", "rsi_14"]);
        assert_eq!(v.functions, vec!["sma"]);
        assert!(v.unknown_functions.is_empty());
        assert!(v.error.is_none());
        assert!(v.tree.is_some());
    }

    #[test]
    fn validate_flags_unknown_functions() {
        let evaluator = Evaluator::default();
        let v = evaluator.validate_expression("exec(code) or sma(prices) > 1");
        assert!(!v.valid);
        assert_eq!(v.unknown_functions, vec!["exec"]);
        assert_eq!(v.functions, vec!["exec", "sma"]);
        assert!(v.error.unwrap().contains("exec"));
    }

    #[test]
    fn validate_reports_syntax_errors() {
        let evaluator = Evaluator::default();
        let v = evaluator.validate_expression("price.__class__");
        assert!(!v.valid);
        assert!(v.variables.is_empty());
        assert!(v.tree.is_none());
        assert!(v.error.unwrap().contains("attribute access"));
    }

    #[test]
    fn validated_tree_reparses_to_same_tree() {
        let evaluator = Evaluator::default();
        let text = "-(a + 2) * b[1] if not x in [1, 2] else f(y, k=3)";
        let tree = evaluator.parse(text).unwrap();
        let rendered = evaluator.validate_expression(text).tree.unwrap();
        assert_eq!(evaluator.parse(&rendered).unwrap(), tree);
    }

    #[test]
    fn supported_tables() {
        let evaluator = Evaluator::default();
        assert!(evaluator.supported_operators().contains(&"//"));
        assert!(evaluator
            .supported_functions()
            .iter()
            .any(|(name, _)| *name == "bollinger"));
    }

    fn atom() -> impl Strategy<Value = String> {
        prop_oneof![
            (-1000i32..1000).prop_map(|n| n.to_string()),
            (-100.0f64..100.0).prop_map(|n| format!("{:.3}", n)),
            Just("price".to_string()),
            Just("prices".to_string()),
            Just("'abc'".to_string()),
            Just("null".to_string()),
            Just("true".to_string()),
            Just("[1, 2, 3]".to_string()),
            Just("{'k': 1}".to_string()),
        ]
    }

    fn expression() -> impl Strategy<Value = String> {
        atom().prop_recursive(4, 32, 3, |inner| {
            let ops = prop::sample::select(vec![
                "+", "-", "*", "/", "//", "%", "**", "&", "|", "^", "<", "<=", "==", "!=", "in",
                "not in", "and", "or",
            ]);
            let funcs = prop::sample::select(vec![
                "abs", "sqrt", "len", "sma", "max", "first", "round", "log",
            ]);
            prop_oneof![
                (inner.clone(), ops, inner.clone()).prop_map(|(l, op, r)| format!("({} {} {})", l, op, r)),
                inner.clone().prop_map(|e| format!("(not {})", e)),
                inner.clone().prop_map(|e| format!("(-{})", e)),
                (funcs, inner.clone()).prop_map(|(f, e)| format!("{}({})", f, e)),
                (inner.clone(), inner.clone()).prop_map(|(v, i)| format!("{}[{}]", v, i)),
                (inner.clone(), inner.clone(), inner).prop_map(|(a, c, b)| format!("({} if {} else {})", a, c, b)),
            ]
        })
    }

    proptest! {
        #[test]
        fn evaluation_never_panics(text in expression()) {
            let evaluator = Evaluator::default();
            let c = ctx(&[
                ("price", Value::Number(101.5)),
                ("prices", Value::from(vec![100.0, 101.0, 99.5, 101.5])),
            ]);
            if let Ok(tree) = evaluator.parse(&text) {
                let _ = evaluator.evaluate(&tree, &c);
            }
        }

        #[test]
        fn parser_never_panics(text in "\\PC{0,48}") {
            let _ = Evaluator::default().parse(&text);
        }
    }
}

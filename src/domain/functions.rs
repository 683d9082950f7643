//! Built-in function registry for the expression evaluator.
//!
//! Each entry declares its parameter names so that calls can mix positional
//! and keyword arguments (`rsi(prices, period=7)`). Functions report failures
//! as plain reasons; the evaluator wraps them with the function name.

use crate::domain::indicator::{self, bollinger, macd, rsi as rsi_mod};
use crate::domain::metrics;
use crate::domain::value::Value;
use chrono::{SecondsFormat, TimeDelta, Utc};
use std::collections::HashMap;

pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

#[derive(Clone)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
    pub required: usize,
    /// Accepts any number of positional arguments (`min(a, b, c)`).
    pub variadic: bool,
    pub call: NativeFn,
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl FunctionSpec {
    /// Match positional and keyword arguments onto the declared parameters.
    /// Trailing optional parameters that were not supplied are omitted.
    pub fn bind(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Vec<Value>, String> {
        if self.variadic {
            if !kwargs.is_empty() {
                return Err(format!("{}() takes no keyword arguments", self.name));
            }
            if args.len() < self.required {
                return Err(format!(
                    "{}() expected at least {} argument(s), got {}",
                    self.name,
                    self.required,
                    args.len()
                ));
            }
            return Ok(args);
        }

        if args.len() > self.params.len() {
            return Err(format!(
                "{}() takes at most {} argument(s), got {}",
                self.name,
                self.params.len(),
                args.len()
            ));
        }

        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(self.params.len(), None);
        for (key, value) in kwargs {
            let idx = self
                .params
                .iter()
                .position(|p| *p == key)
                .ok_or_else(|| format!("{}() got an unexpected keyword argument '{}'", self.name, key))?;
            if slots[idx].is_some() {
                return Err(format!(
                    "{}() got multiple values for argument '{}'",
                    self.name, key
                ));
            }
            slots[idx] = Some(value);
        }

        if let Some(missing) = (0..self.required).find(|&i| slots[i].is_none()) {
            return Err(format!(
                "{}() missing required argument '{}'",
                self.name, self.params[missing]
            ));
        }

        let supplied = slots.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
        slots.truncate(supplied);
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    format!(
                        "{}() argument '{}' must be given when later arguments are",
                        self.name, self.params[i]
                    )
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn builtin() -> Self {
        let functions = BUILTINS
            .iter()
            .map(|spec| (spec.name, spec.clone()))
            .collect();
        Self { functions }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// `(name, description)` pairs sorted by name.
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        let mut out: Vec<_> = self
            .functions
            .values()
            .map(|f| (f.name, f.description))
            .collect();
        out.sort_by_key(|(name, _)| *name);
        out
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

macro_rules! spec {
    ($name:literal, $desc:literal, [$($param:literal),*], $required:expr, $call:expr) => {
        FunctionSpec {
            name: $name,
            description: $desc,
            params: &[$($param),*],
            required: $required,
            variadic: false,
            call: $call,
        }
    };
}

static BUILTINS: &[FunctionSpec] = &[
    // math
    spec!("abs", "Absolute value", ["x"], 1, |a| Ok(Value::Number(number(a, 0)?.abs()))),
    spec!("round", "Round half to even, optionally to n digits", ["x", "ndigits"], 1, round),
    spec!("floor", "Floor function", ["x"], 1, |a| Ok(Value::Number(number(a, 0)?.floor()))),
    spec!("ceil", "Ceiling function", ["x"], 1, |a| Ok(Value::Number(number(a, 0)?.ceil()))),
    spec!("sqrt", "Square root", ["x"], 1, sqrt),
    spec!("log", "Natural logarithm, or logarithm to base", ["x", "base"], 1, log),
    spec!("log10", "Base-10 logarithm", ["x"], 1, log10),
    spec!("exp", "Exponential", ["x"], 1, |a| Ok(Value::Number(number(a, 0)?.exp()))),
    spec!("pow", "Power function", ["base", "exp"], 2, |a| {
        Ok(Value::Number(number(a, 0)?.powf(number(a, 1)?)))
    }),
    // statistics
    FunctionSpec {
        name: "min",
        description: "Minimum value",
        params: &[],
        required: 1,
        variadic: true,
        call: |a| extremum(a, "min", std::cmp::Ordering::Less),
    },
    FunctionSpec {
        name: "max",
        description: "Maximum value",
        params: &[],
        required: 1,
        variadic: true,
        call: |a| extremum(a, "max", std::cmp::Ordering::Greater),
    },
    spec!("sum", "Sum of values", ["values", "start"], 1, |a| {
        let start = opt_number(a, 1, 0.0)?;
        Ok(Value::Number(series(a, 0)?.iter().sum::<f64>() + start))
    }),
    spec!("mean", "Mean average", ["values"], 1, |a| {
        Ok(Value::Number(indicator::mean(&series(a, 0)?)))
    }),
    spec!("median", "Median value", ["values"], 1, |a| {
        indicator::median(&series(a, 0)?)
            .map(Value::Number)
            .ok_or_else(|| "no median for empty data".to_string())
    }),
    spec!("std", "Standard deviation", ["values"], 1, |a| {
        Ok(Value::Number(indicator::std_dev(&series(a, 0)?)))
    }),
    spec!("var", "Variance", ["values"], 1, |a| {
        Ok(Value::Number(indicator::variance(&series(a, 0)?)))
    }),
    // time
    spec!("now", "Current UTC time (RFC 3339)", [], 0, |_| {
        Ok(Value::String(
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
    }),
    spec!("timestamp", "Current Unix timestamp in seconds", [], 0, |_| {
        Ok(Value::Number(Utc::now().timestamp_millis() as f64 / 1000.0))
    }),
    spec!("days_ago", "UTC time n days ago (RFC 3339)", ["days"], 1, days_ago),
    // technical indicators
    spec!("sma", "Simple Moving Average", ["prices", "period"], 1, |a| {
        let period = opt_period(a, 1, 20)?;
        Ok(Value::Number(indicator::sma(&series(a, 0)?, period)))
    }),
    spec!("ema", "Exponential Moving Average", ["prices", "period"], 1, |a| {
        let period = opt_period(a, 1, 20)?;
        Ok(Value::Number(indicator::ema(&series(a, 0)?, period)))
    }),
    spec!("rsi", "Relative Strength Index", ["prices", "period"], 1, |a| {
        let period = opt_period(a, 1, rsi_mod::DEFAULT_PERIOD)?;
        Ok(Value::Number(indicator::rsi(&series(a, 0)?, period)))
    }),
    spec!(
        "macd",
        "Moving Average Convergence Divergence",
        ["prices", "fast", "slow", "signal"],
        1,
        |a| {
            let fast = opt_period(a, 1, macd::DEFAULT_FAST)?;
            let slow = opt_period(a, 2, macd::DEFAULT_SLOW)?;
            let signal = opt_period(a, 3, macd::DEFAULT_SIGNAL)?;
            let value = indicator::macd(&series(a, 0)?, fast, slow, signal);
            Ok(Value::map_from([
                ("macd", value.macd),
                ("signal", value.signal),
                ("histogram", value.histogram),
            ]))
        }
    ),
    spec!("bollinger", "Bollinger Bands", ["prices", "period", "std_dev"], 1, |a| {
        let period = opt_period(a, 1, bollinger::DEFAULT_PERIOD)?;
        let mult = opt_number(a, 2, bollinger::DEFAULT_MULTIPLIER)?;
        let bands = indicator::bollinger(&series(a, 0)?, period, mult);
        Ok(Value::map_from([
            ("upper", bands.upper),
            ("middle", bands.middle),
            ("lower", bands.lower),
        ]))
    }),
    spec!(
        "atr",
        "Average True Range",
        ["highs", "lows", "closes", "period"],
        3,
        |a| {
            let period = opt_period(a, 3, indicator::atr::DEFAULT_PERIOD)?;
            Ok(Value::Number(indicator::atr(
                &series(a, 0)?,
                &series(a, 1)?,
                &series(a, 2)?,
                period,
            )))
        }
    ),
    // strings
    spec!("lower", "Convert to lowercase", ["s"], 1, |a| {
        Ok(Value::String(string(a, 0)?.to_lowercase()))
    }),
    spec!("upper", "Convert to uppercase", ["s"], 1, |a| {
        Ok(Value::String(string(a, 0)?.to_uppercase()))
    }),
    spec!("contains", "Check if string or list contains an item", ["s", "sub"], 2, contains),
    spec!("starts_with", "Check if string starts with prefix", ["s", "prefix"], 2, |a| {
        Ok(Value::Bool(string(a, 0)?.starts_with(string(a, 1)?)))
    }),
    // arrays
    spec!("len", "Length of array, string or map", ["x"], 1, len),
    spec!("first", "First element", ["x"], 1, |a| end_item(a, true)),
    spec!("last", "Last element", ["x"], 1, |a| end_item(a, false)),
    spec!("slice", "Slice array or string", ["x", "start", "end"], 3, slice),
    // financial
    spec!("returns", "Calculate returns", ["prices", "period"], 1, |a| {
        let period = opt_period(a, 1, 1)?;
        Ok(Value::from(metrics::returns(&series(a, 0)?, period)))
    }),
    spec!("volatility", "Calculate volatility", ["prices", "period"], 1, |a| {
        let period = opt_period(a, 1, metrics::DEFAULT_VOLATILITY_PERIOD)?;
        Ok(Value::Number(metrics::volatility(&series(a, 0)?, period)))
    }),
    spec!("sharpe", "Sharpe Ratio", ["returns", "risk_free_rate"], 1, |a| {
        let rf = opt_number(a, 1, metrics::DEFAULT_RISK_FREE_RATE)?;
        Ok(Value::Number(metrics::sharpe(&series(a, 0)?, rf)))
    }),
    spec!("max_drawdown", "Maximum Drawdown", ["prices"], 1, |a| {
        Ok(Value::Number(metrics::max_drawdown(&series(a, 0)?)))
    }),
];

fn arg(args: &[Value], i: usize) -> Result<&Value, String> {
    args.get(i)
        .ok_or_else(|| format!("missing argument {}", i + 1))
}

fn number(args: &[Value], i: usize) -> Result<f64, String> {
    let value = arg(args, i)?;
    value
        .as_number()
        .ok_or_else(|| format!("argument {} must be a number, got {}", i + 1, value.type_name()))
}

fn opt_number(args: &[Value], i: usize, default: f64) -> Result<f64, String> {
    match args.get(i) {
        None => Ok(default),
        Some(_) => number(args, i),
    }
}

fn integer(args: &[Value], i: usize) -> Result<i64, String> {
    let n = number(args, i)?;
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(format!("argument {} must be an integer, got {}", i + 1, n));
    }
    Ok(n as i64)
}

fn opt_period(args: &[Value], i: usize, default: usize) -> Result<usize, String> {
    if args.get(i).is_none() {
        return Ok(default);
    }
    let n = integer(args, i)?;
    if n < 1 {
        return Err(format!("period must be a positive integer, got {}", n));
    }
    Ok(n as usize)
}

fn series(args: &[Value], i: usize) -> Result<Vec<f64>, String> {
    let value = arg(args, i)?;
    value.as_series().ok_or_else(|| {
        format!(
            "argument {} must be a list of numbers, got {}",
            i + 1,
            value.type_name()
        )
    })
}

fn string(args: &[Value], i: usize) -> Result<&str, String> {
    let value = arg(args, i)?;
    value
        .as_str()
        .ok_or_else(|| format!("argument {} must be a string, got {}", i + 1, value.type_name()))
}

fn round(args: &[Value]) -> Result<Value, String> {
    let x = number(args, 0)?;
    match args.get(1) {
        None => Ok(Value::Number(x.round_ties_even())),
        Some(_) => {
            let digits = integer(args, 1)?;
            // Past ~15 significant digits there is no fraction left to round.
            if !x.is_finite() || (x != 0.0 && digits as f64 > 15.0 - x.abs().log10().floor()) {
                return Ok(Value::Number(x));
            }
            let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
            let scaled = x * scale;
            if !scaled.is_finite() {
                return Ok(Value::Number(x));
            }
            Ok(Value::Number(scaled.round_ties_even() / scale))
        }
    }
}

fn sqrt(args: &[Value]) -> Result<Value, String> {
    let x = number(args, 0)?;
    if x < 0.0 {
        return Err("math domain error".to_string());
    }
    Ok(Value::Number(x.sqrt()))
}

fn log(args: &[Value]) -> Result<Value, String> {
    let x = number(args, 0)?;
    if x <= 0.0 {
        return Err("math domain error".to_string());
    }
    match args.get(1) {
        None => Ok(Value::Number(x.ln())),
        Some(_) => {
            let base = number(args, 1)?;
            if base <= 0.0 || base == 1.0 {
                return Err("math domain error".to_string());
            }
            Ok(Value::Number(x.ln() / base.ln()))
        }
    }
}

fn log10(args: &[Value]) -> Result<Value, String> {
    let x = number(args, 0)?;
    if x <= 0.0 {
        return Err("math domain error".to_string());
    }
    Ok(Value::Number(x.log10()))
}

fn extremum(args: &[Value], name: &str, wanted: std::cmp::Ordering) -> Result<Value, String> {
    let items: &[Value] = match args {
        [single] => single
            .as_items()
            .ok_or_else(|| format!("{} of a single {} is undefined", name, single.type_name()))?,
        many => many,
    };
    let mut iter = items.iter();
    let mut best = iter
        .next()
        .ok_or_else(|| format!("{}() arg is an empty sequence", name))?;
    for item in iter {
        let ord = item.partial_cmp_value(best).ok_or_else(|| {
            format!(
                "cannot compare {} with {}",
                item.type_name(),
                best.type_name()
            )
        })?;
        if ord == wanted {
            best = item;
        }
    }
    Ok(best.clone())
}

fn days_ago(args: &[Value]) -> Result<Value, String> {
    let days = number(args, 0)?;
    let millis = days * 86_400_000.0;
    let delta = if millis.is_finite() && millis.abs() < i64::MAX as f64 {
        TimeDelta::try_milliseconds(millis as i64)
    } else {
        None
    };
    let at = delta
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .ok_or_else(|| format!("{} days is out of range", days))?;
    Ok(Value::String(at.to_rfc3339_opts(SecondsFormat::Secs, true)))
}

fn contains(args: &[Value]) -> Result<Value, String> {
    let haystack = arg(args, 0)?;
    let needle = arg(args, 1)?;
    match haystack {
        Value::String(s) => Ok(Value::Bool(s.contains(string(args, 1)?))),
        Value::List(items) | Value::Tuple(items) => Ok(Value::Bool(items.contains(needle))),
        Value::Map(_) => Ok(Value::Bool(haystack.get(needle).is_some())),
        other => Err(format!("argument 1 of type {} is not a container", other.type_name())),
    }
}

fn len(args: &[Value]) -> Result<Value, String> {
    let n = match arg(args, 0)? {
        Value::String(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => return Err(format!("object of type {} has no len()", other.type_name())),
    };
    Ok(Value::Number(n as f64))
}

fn end_item(args: &[Value], first: bool) -> Result<Value, String> {
    let value = arg(args, 0)?;
    let picked = match value {
        Value::List(items) | Value::Tuple(items) => {
            if first {
                items.first().cloned()
            } else {
                items.last().cloned()
            }
        }
        Value::String(s) => {
            let ch = if first { s.chars().next() } else { s.chars().last() };
            ch.map(|c| Value::String(c.to_string()))
        }
        other => return Err(format!("object of type {} is not a sequence", other.type_name())),
    };
    Ok(picked.unwrap_or(Value::Null))
}

/// Sequence slice with negative indices counted from the end and bounds clamped.
fn slice(args: &[Value]) -> Result<Value, String> {
    let bound = |i: usize, len: usize| -> Result<usize, String> {
        let n = match args.get(i) {
            Some(Value::Null) => return Ok(if i == 1 { 0 } else { len }),
            _ => integer(args, i)?,
        };
        let len = len as i64;
        let resolved = if n < 0 { (len + n).max(0) } else { n.min(len) };
        Ok(resolved as usize)
    };

    match arg(args, 0)? {
        Value::List(items) | Value::Tuple(items) => {
            let (start, end) = (bound(1, items.len())?, bound(2, items.len())?);
            let out = if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            };
            Ok(Value::List(out))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = (bound(1, chars.len())?, bound(2, chars.len())?);
            let out: String = if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            };
            Ok(Value::String(out))
        }
        other => Err(format!("object of type {} cannot be sliced", other.type_name())),
    }
}

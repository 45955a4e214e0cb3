//! Expression evaluator.
//!
//! [`evaluate`] is total and pure for a fixed cell snapshot and parameter map:
//! unknown cells and parameters read as 0, divisors of 0 are treated as 1 and
//! no operator produces NaN.

mod color;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CellStore, Value};

pub use color::Rgba;

/// Numeric parameters attached to an interaction (drag offsets, velocity...).
pub type EventParams = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Expr {
    Literal {
        value: Value,
    },
    Cell {
        id: String,
    },
    Param {
        name: String,
    },
    Op {
        op: Operator,
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// Piecewise-linear mapping of `input` from `input_range` onto
    /// `output_range`, clamped at both ends.
    Interpolate {
        input: Box<Expr>,
        input_range: Vec<f64>,
        output_range: Vec<f64>,
    },
    InterpolateColor {
        input: Box<Expr>,
        input_range: Vec<f64>,
        output_range: Vec<String>,
    },
    Conditional {
        left: Box<Expr>,
        cmp: Comparison,
        right: Box<Expr>,
        then: Box<Expr>,
        #[serde(rename = "else")]
        otherwise: Box<Expr>,
    },
}

impl Expr {
    pub fn number(value: f64) -> Self {
        Self::Literal {
            value: Value::Number(value),
        }
    }

    pub fn cell(id: impl Into<String>) -> Self {
        Self::Cell { id: id.into() }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Param { name: name.into() }
    }

    pub fn op(op: Operator, args: Vec<Expr>) -> Self {
        Self::Op { op, args }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::number(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Clamp,
    Lerp,
    Min,
    Max,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    pub fn holds(self, left: &Value, right: &Value) -> bool {
        if let (Value::Text(l), Value::Text(r)) = (left, right) {
            return match self {
                Self::Eq => l == r,
                Self::Ne => l != r,
                Self::Gt => l > r,
                Self::Ge => l >= r,
                Self::Lt => l < r,
                Self::Le => l <= r,
            };
        }
        let (l, r) = (left.as_number(), right.as_number());
        match self {
            Self::Gt => l > r,
            Self::Ge => l >= r,
            Self::Lt => l < r,
            Self::Le => l <= r,
            Self::Eq => l == r,
            Self::Ne => l != r,
        }
    }
}

pub fn evaluate(expr: &Expr, cells: &CellStore, params: &EventParams) -> Value {
    match expr {
        Expr::Literal { value } => value.clone(),
        Expr::Cell { id } => cells.read(id).unwrap_or_default(),
        Expr::Param { name } => Value::Number(params.get(name).copied().unwrap_or(0.0)),
        Expr::Op { op, args } => {
            let args: Vec<f64> = args
                .iter()
                .map(|arg| evaluate_number(arg, cells, params))
                .collect();
            Value::Number(sanitize(apply_operator(*op, &args)))
        }
        Expr::Interpolate {
            input,
            input_range,
            output_range,
        } => {
            let x = evaluate_number(input, cells, params);
            Value::Number(sanitize(interpolate(x, input_range, output_range)))
        }
        Expr::InterpolateColor {
            input,
            input_range,
            output_range,
        } => {
            let x = evaluate_number(input, cells, params);
            Value::Text(interpolate_color(x, input_range, output_range).to_string())
        }
        Expr::Conditional {
            left,
            cmp,
            right,
            then,
            otherwise,
        } => {
            let left = evaluate(left, cells, params);
            let right = evaluate(right, cells, params);
            if cmp.holds(&left, &right) {
                evaluate(then, cells, params)
            } else {
                evaluate(otherwise, cells, params)
            }
        }
    }
}

pub fn evaluate_number(expr: &Expr, cells: &CellStore, params: &EventParams) -> f64 {
    evaluate(expr, cells, params).as_number()
}

fn apply_operator(op: Operator, args: &[f64]) -> f64 {
    let arg = |i: usize| args.get(i).copied().unwrap_or(0.0);
    match op {
        Operator::Add => args.iter().sum(),
        Operator::Mul => args.iter().product(),
        Operator::Sub => match args.split_first() {
            Some((first, rest)) => rest.iter().fold(*first, |acc, x| acc - x),
            None => 0.0,
        },
        Operator::Div => match args.split_first() {
            Some((first, rest)) => rest
                .iter()
                .fold(*first, |acc, x| acc / if *x == 0.0 { 1.0 } else { *x }),
            None => 0.0,
        },
        Operator::Clamp => {
            let min = args.get(1).copied().unwrap_or(f64::NEG_INFINITY);
            let max = args.get(2).copied().unwrap_or(f64::INFINITY);
            arg(0).max(min).min(max)
        }
        Operator::Lerp => {
            let (a, b, t) = (arg(0), arg(1), arg(2));
            a + (b - a) * t
        }
        Operator::Min => args.iter().copied().reduce(f64::min).unwrap_or(0.0),
        Operator::Max => args.iter().copied().reduce(f64::max).unwrap_or(0.0),
        Operator::Mod => {
            let (a, b) = (arg(0), arg(1));
            if b == 0.0 {
                a
            } else {
                ((a % b) + b) % b
            }
        }
    }
}

/// Segment of a breakpoint array that `x` falls into.
enum Segment {
    Empty,
    Endpoint(usize),
    Between(usize, f64),
}

fn locate(x: f64, range: &[f64]) -> Segment {
    let Some(last) = range.len().checked_sub(1) else {
        return Segment::Empty;
    };
    if last == 0 || x <= range[0] {
        return Segment::Endpoint(0);
    }
    if x >= range[last] {
        return Segment::Endpoint(last);
    }
    for i in 0..last {
        let (lo, hi) = (range[i], range[i + 1]);
        if x >= lo && x <= hi {
            if hi == lo {
                return Segment::Endpoint(i + 1);
            }
            return Segment::Between(i, (x - lo) / (hi - lo));
        }
    }
    Segment::Endpoint(last)
}

fn interpolate(x: f64, input: &[f64], output: &[f64]) -> f64 {
    let len = input.len().min(output.len());
    match locate(x, &input[..len]) {
        Segment::Empty => 0.0,
        Segment::Endpoint(i) => output[i],
        Segment::Between(i, t) => output[i] + (output[i + 1] - output[i]) * t,
    }
}

fn interpolate_color(x: f64, input: &[f64], output: &[String]) -> Rgba {
    let len = input.len().min(output.len());
    let color = |i: usize| Rgba::parse(&output[i]).unwrap_or(Rgba::TRANSPARENT);
    match locate(x, &input[..len]) {
        Segment::Empty => Rgba::TRANSPARENT,
        Segment::Endpoint(i) => color(i),
        Segment::Between(i, t) => color(i).lerp(color(i + 1), t),
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expr) -> f64 {
        evaluate_number(expr, &CellStore::new("test"), &EventParams::new())
    }

    fn op(op: Operator, args: &[f64]) -> f64 {
        eval(&Expr::op(op, args.iter().map(|a| Expr::number(*a)).collect()))
    }

    #[test]
    fn arithmetic_identities() {
        assert_eq!(op(Operator::Add, &[]), 0.0);
        assert_eq!(op(Operator::Mul, &[]), 1.0);
        assert_eq!(op(Operator::Sub, &[10.0, 3.0, 2.0]), 5.0);
        assert_eq!(op(Operator::Div, &[12.0, 2.0, 3.0]), 2.0);
        assert_eq!(op(Operator::Min, &[3.0, -1.0, 2.0]), -1.0);
        assert_eq!(op(Operator::Max, &[3.0, -1.0, 2.0]), 3.0);
    }

    #[test]
    fn division_by_zero_returns_dividend() {
        assert_eq!(op(Operator::Div, &[7.0, 0.0]), 7.0);
        assert!(op(Operator::Div, &[0.0, 0.0]).is_finite());
    }

    #[test]
    fn modulo_is_sign_corrected() {
        assert_eq!(op(Operator::Mod, &[-1.0, 3.0]), 2.0);
        assert_eq!(op(Operator::Mod, &[7.0, 3.0]), 1.0);
        assert_eq!(op(Operator::Mod, &[7.0, 0.0]), 7.0);
    }

    #[test]
    fn clamp_and_lerp() {
        assert_eq!(op(Operator::Clamp, &[15.0, 0.0, 10.0]), 10.0);
        assert_eq!(op(Operator::Clamp, &[-5.0, 0.0, 10.0]), 0.0);
        assert_eq!(op(Operator::Clamp, &[5.0, 10.0, 0.0]), 0.0);
        for (a, b) in [(0.0, 1.0), (-3.5, 12.25), (1e6, -1e6)] {
            assert_eq!(op(Operator::Lerp, &[a, b, 0.0]), a);
            assert_eq!(op(Operator::Lerp, &[a, b, 1.0]), b);
        }
    }

    #[test]
    fn references_default_to_zero() {
        let cells = CellStore::new("test");
        cells.create("label", Value::from("hello"));
        let params = EventParams::from([("dx".to_string(), 4.0)]);

        assert_eq!(evaluate_number(&Expr::cell("missing"), &cells, &params), 0.0);
        assert_eq!(evaluate_number(&Expr::cell("label"), &cells, &params), 0.0);
        assert_eq!(evaluate_number(&Expr::param("dx"), &cells, &params), 4.0);
        assert_eq!(evaluate_number(&Expr::param("dy"), &cells, &params), 0.0);
    }

    #[test]
    fn interpolation_clamps_to_endpoints() {
        let expr = |x: f64| Expr::Interpolate {
            input: Box::new(Expr::number(x)),
            input_range: vec![0.0, 10.0, 20.0],
            output_range: vec![0.0, 100.0, 0.0],
        };
        assert_eq!(eval(&expr(-5.0)), 0.0);
        assert_eq!(eval(&expr(5.0)), 50.0);
        assert_eq!(eval(&expr(15.0)), 50.0);
        assert_eq!(eval(&expr(99.0)), 0.0);
    }

    #[test]
    fn color_interpolation() {
        let expr = Expr::InterpolateColor {
            input: Box::new(Expr::number(0.5)),
            input_range: vec![0.0, 1.0],
            output_range: vec!["#000000".into(), "#ff0000".into()],
        };
        let value = evaluate(&expr, &CellStore::new("test"), &EventParams::new());
        assert_eq!(value, Value::from("rgba(128, 0, 0, 1)"));
    }

    #[test]
    fn conditional_picks_one_branch() {
        let cells = CellStore::new("test");
        cells.create("mode", Value::from("dark"));
        let expr: Expr = serde_json::from_str(
            r#"{
                "kind": "conditional",
                "left": { "kind": "cell", "id": "mode" },
                "cmp": "==",
                "right": { "kind": "literal", "value": "dark" },
                "then": { "kind": "literal", "value": 1 },
                "else": { "kind": "literal", "value": 2 }
            }"#,
        )
        .unwrap();

        assert_eq!(evaluate_number(&expr, &cells, &EventParams::new()), 1.0);
        cells.write("mode", Value::from("light"));
        assert_eq!(evaluate_number(&expr, &cells, &EventParams::new()), 2.0);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let cells = CellStore::new("test");
        cells.create("x", Value::from(3.0));
        let expr = Expr::op(
            Operator::Mul,
            vec![Expr::cell("x"), Expr::param("scale"), Expr::number(2.0)],
        );
        let params = EventParams::from([("scale".to_string(), 1.5)]);

        let first = evaluate(&expr, &cells, &params);
        assert_eq!(first, evaluate(&expr, &cells, &params));
        assert_eq!(first, Value::Number(9.0));
    }
}

//! Property-based tests for the compiler and VM.
//!
//! - arithmetic trees agree with a direct evaluation in Rust
//! - comparisons agree with Rust's ordering
//! - loops run the expected number of times
//! - a successful run always leaves the operand stack empty

use lvm_core::{LvmConfig, LvmError, Value, VirtualMachine};
use proptest::prelude::*;

/// Arithmetic expression used to generate source text
#[derive(Debug, Clone)]
enum Arith {
    Num(i64),
    Add(Box<Arith>, Box<Arith>),
    Sub(Box<Arith>, Box<Arith>),
    Mul(Box<Arith>, Box<Arith>),
}

impl Arith {
    fn source(&self) -> String {
        match self {
            Arith::Num(n) => n.to_string(),
            Arith::Add(a, b) => format!("(+ {} {})", a.source(), b.source()),
            Arith::Sub(a, b) => format!("(- {} {})", a.source(), b.source()),
            Arith::Mul(a, b) => format!("(* {} {})", a.source(), b.source()),
        }
    }

    /// `None` when some intermediate result overflows
    fn eval(&self) -> Option<i64> {
        match self {
            Arith::Num(n) => Some(*n),
            Arith::Add(a, b) => a.eval()?.checked_add(b.eval()?),
            Arith::Sub(a, b) => a.eval()?.checked_sub(b.eval()?),
            Arith::Mul(a, b) => a.eval()?.checked_mul(b.eval()?),
        }
    }
}

fn arb_arith() -> impl Strategy<Value = Arith> {
    let leaf = (-1000i64..1000i64).prop_map(Arith::Num);
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Arith::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Arith::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Arith::Mul(Box::new(a), Box::new(b))),
        ]
    })
}

fn arb_comparator() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("<"), Just(">"), Just("=="), Just("!="), Just("<="), Just(">=")]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn arithmetic_matches_rust(expr in arb_arith()) {
        let mut vm = VirtualMachine::new(LvmConfig::new());
        let result = vm.eval(&expr.source());
        match expr.eval() {
            Some(expected) => {
                prop_assert_eq!(result, Ok(Value::Number(expected)));
                prop_assert_eq!(vm.stack_size(), 0);
            }
            None => prop_assert!(matches!(result, Err(LvmError::IntegerOverflow(_)))),
        }
    }

    #[test]
    fn comparison_matches_rust(a in -50i64..50, b in -50i64..50, op in arb_comparator()) {
        let expected = match op {
            "<" => a < b,
            ">" => a > b,
            "==" => a == b,
            "!=" => a != b,
            "<=" => a <= b,
            _ => a >= b,
        };
        let source = format!("({} {} {})", op, a, b);
        prop_assert_eq!(VirtualMachine::new(LvmConfig::new()).eval(&source), Ok(Value::Bool(expected)));
    }

    #[test]
    fn division_truncates_toward_zero(a in -10_000i64..10_000, b in 1i64..100) {
        let source = format!("(/ {} {})", a, b);
        prop_assert_eq!(VirtualMachine::new(LvmConfig::new()).eval(&source), Ok(Value::Number(a / b)));
    }

    #[test]
    fn while_loop_sums_range(n in 0i64..60) {
        let source = format!(
            "(var i 0) (var total 0) (while (< i {}) (begin (set total (+ total i)) (set i (+ i 1)))) total",
            n
        );
        prop_assert_eq!(VirtualMachine::new(LvmConfig::new()).eval(&source), Ok(Value::Number(n * (n - 1) / 2)));
    }

    #[test]
    fn recursive_sum_leaves_no_frames(n in 1i64..40) {
        let source = format!("(def sum (n) (if (== n 0) 0 (+ n (sum (- n 1))))) (sum {})", n);
        let mut vm = VirtualMachine::new(LvmConfig::new());
        prop_assert_eq!(vm.eval(&source), Ok(Value::Number(n * (n + 1) / 2)));
        prop_assert_eq!(vm.stack_size(), 0);
        prop_assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn nested_blocks_return_innermost_value(values in prop::collection::vec(-100i64..100, 1..8)) {
        // (begin (var v0 a) (begin (var v1 b) ... vN))
        let mut source = String::new();
        for (i, value) in values.iter().enumerate() {
            source.push_str(&format!("(begin (var v{} {}) ", i, value));
        }
        source.push_str(&format!("v{}", values.len() - 1));
        source.push_str(&")".repeat(values.len()));

        let expected = values[values.len() - 1];
        prop_assert_eq!(VirtualMachine::new(LvmConfig::new()).eval(&source), Ok(Value::Number(expected)));
    }
}

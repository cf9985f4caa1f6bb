extern crate stmc;

mod common;

use common::with_runtime;
use indoc::indoc;
use stmc::interp::Interpreter;
use stmc::interp::Value;
use stmc::parser::Parser;
use stmc::tester::Tester;

fn flags() -> Vec<&'static str> {
    vec!["--resolve-stm-accessors", "--lower-stm"]
}

fn counter() -> String {
    let src = indoc! {"
      package demo {
        @SharedMutable class Counter {
          var n: Int = 10
          fun inc(): Unit {
            this.n = this.n + 1
          }
          fun get(): Int {
            return this.n
          }
        }
      }
    "};
    with_runtime("counter", "jvm", src)
}

#[test]
fn accessors_go_through_delegate() {
    Tester::init_tracing();
    let (module, _actual) = Tester::transform(flags(), &counter());
    let mut interp = Interpreter::new(&module);
    let counter = interp.instantiate("demo", "Counter").unwrap();
    assert_eq!(interp.log(), ["findJavaSTM", "wrap"]);

    interp
        .call_method(&counter, "setN", vec![Value::Null, Value::Int(5)])
        .unwrap();
    let n = interp.call_method(&counter, "getN", vec![Value::Null]).unwrap();
    assert_eq!(n, Value::Int(5));
    assert_eq!(interp.log(), ["findJavaSTM", "wrap", "setVar", "getVar"]);
}

#[test]
fn lowering_preserves_behavior() {
    Tester::init_tracing();
    let src = counter();
    let original = Parser::parse(&src).unwrap();
    let (lowered, _actual) = Tester::transform(flags(), &src);

    let mut before = Interpreter::new(&original);
    let c = before.instantiate("demo", "Counter").unwrap();
    before.call_method(&c, "inc", vec![]).unwrap();
    before.call_method(&c, "inc", vec![]).unwrap();
    let expected = before.call_method(&c, "get", vec![]).unwrap();
    assert_eq!(expected, Value::Int(12));
    assert!(before.log().is_empty());

    let mut after = Interpreter::new(&lowered);
    let c = after.instantiate("demo", "Counter").unwrap();
    after.call_method(&c, "inc", vec![]).unwrap();
    after.call_method(&c, "inc", vec![]).unwrap();
    let actual = after.call_method(&c, "get", vec![]).unwrap();
    assert_eq!(actual, expected);

    let log = after.log();
    for call in ["wrap", "runAtomically", "getVar", "setVar"] {
        assert!(log.iter().any(|l| l == call), "{call} missing from {log:?}");
    }
    let updates = log.iter().filter(|l| *l == "setVar").count();
    assert_eq!(updates, 2);
}

#[test]
fn atomic_functions_receive_context() {
    Tester::init_tracing();
    let src = indoc! {"
      package bank {
        @AtomicFunction fun fee(amount: Int): Int {
          return amount * 2
        }
        @AtomicFunction fun total(amount: Int): Int {
          return amount + fee(amount)
        }
        fun charge(amount: Int): Int {
          return runAtomically<Int>(fun (ctx: STMContext).block(): Int {
            return total(amount)
          })
        }
      }
    "};
    let src = with_runtime("bank", "jvm", src);
    let original = Parser::parse(&src).unwrap();
    let (lowered, _actual) = Tester::transform(vec!["--lower-stm"], &src);

    let mut before = Interpreter::new(&original);
    let expected = before
        .call_function("bank", "charge", vec![Value::Int(7)])
        .unwrap();
    assert_eq!(expected, Value::Int(21));

    let mut after = Interpreter::new(&lowered);
    let actual = after
        .call_function("bank", "charge", vec![Value::Int(7)])
        .unwrap();
    assert_eq!(actual, expected);
    assert_eq!(after.log(), ["findJavaSTM", "runAtomically"]);

    let direct = after.call_function("bank", "fee", vec![Value::Int(1), Value::Context]);
    assert_eq!(direct.unwrap(), Value::Int(2));
    assert!(after.call_function("bank", "fee", vec![Value::Int(1)]).is_err());
}

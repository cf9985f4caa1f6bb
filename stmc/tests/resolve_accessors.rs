extern crate stmc;

mod common;

use common::package;
use common::with_runtime;
use indoc::indoc;
use std::panic::Location;
use stmc::tester::Tester;

fn flags() -> Vec<&'static str> {
    vec!["--resolve-stm-accessors"]
}

#[test]
fn declare_accessors() {
    Tester::init_tracing();
    let src = indoc! {"
      package demo {
        @SharedMutable class Account {
          var balance: Int = 0
          val owner: String = \"bob\"
          private var pin: Int = 1234
          fun getOwner(ctx: STMContext): String {
            return \"alice\"
          }
        }
        class Plain {
          var x: Int = 0
        }
      }
    "};
    let expected = indoc! {"
    package demo {
        @SharedMutable class Account {
          var balance: Int = 0
          synthetic fun getBalance(ctx: STMContext): Int
          synthetic fun setBalance(ctx: STMContext, value: Int): Unit
          val owner: String = \"bob\"
          private var pin: Int = 1234
          fun getOwner(ctx: STMContext): String {
            return \"alice\"
          }
        }
        class Plain {
          var x: Int = 0
        }
      }
    }
    "};
    let (module, actual) = Tester::transform(flags(), &with_runtime("bank", "jvm", src));
    Tester::verify(&module);
    Tester::check_lines_exact(package(&actual, "demo"), expected, Location::caller());
}

#[test]
fn missing_context_class_is_an_error() {
    Tester::init_tracing();
    let src = indoc! {"
    module @bare target jvm {
      package demo {
        @SharedMutable class Counter {
          var n: Int = 0
        }
      }
    }
    "};
    let err = Tester::transform_err(flags(), src);
    assert_eq!(
        err.to_string(),
        "Couldn't find STMContext runtime class in dependencies of module bare"
    );
}

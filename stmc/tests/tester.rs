extern crate stmc;

use indoc::indoc;
use std::panic::Location;
use stmc::tester::Tester;

#[test]
fn check_lines_contain_skips_extra_lines() {
    let actual = indoc! {"
    module @m target jvm {
      package demo {
        fun f(): Int {
          return 1
        }
      }
    }
    "};
    let expected = indoc! {"
    package demo {
      return 1
    "};
    Tester::check_lines_contain(actual, expected, Location::caller());
}

#[test]
#[should_panic(expected = "A line is missing from the output")]
fn check_lines_contain_reports_missing_line() {
    let actual = "fun f(): Int {\n  return 1\n}";
    let expected = "return 1\nfun f(): Int {";
    Tester::check_lines_contain(actual, expected, Location::caller());
}

#[test]
#[should_panic]
fn check_lines_exact_rejects_extra_line() {
    Tester::check_lines_exact("a\nb", "a", Location::caller());
}

#[test]
fn parse_prints_module() {
    Tester::init_tracing();
    let src = indoc! {"
    module @m target js {
      package demo {
        fun twice(x: Int): Int {
          return x * 2
        }
      }
    }"};
    let (module, actual) = Tester::parse(src);
    Tester::verify(&module);
    assert_eq!(actual, src);
}

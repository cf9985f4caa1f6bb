extern crate stmc;

mod common;

use common::package;
use common::with_runtime;
use indoc::indoc;
use std::panic::Location;
use stmc::convert::RewriteResult;
use stmc::interp::Interpreter;
use stmc::interp::Value;
use stmc::ir::ExprKind;
use stmc::ir::Origin;
use stmc::parser::Parser;
use stmc::stm::patch_shared_class;
use stmc::stm::wrap_function_into_transaction;
use stmc::stm::LoweringError;
use stmc::stm::SymbolBundle;
use stmc::tester::Tester;
use stmc::transform;
use stmc::DefaultTransformDispatch;
use stmc::Passes;
use stmc::TransformOptions;

fn flags() -> Vec<&'static str> {
    vec!["--resolve-stm-accessors", "--lower-stm"]
}

fn counter() -> String {
    let src = indoc! {"
      package demo {
        @SharedMutable class Counter {
          var n: Int = 0
          fun inc(): Unit {
            this.n = this.n + 1
          }
        }
      }
    "};
    with_runtime("counter", "jvm", src)
}

#[test]
fn lower_counter() {
    Tester::init_tracing();
    let expected = indoc! {"
    package demo {
        @SharedMutable class Counter {
          delegated private final field stm: STM = findJavaSTM()
          delegated private final field n_delegate: UniversalDelegate<Int> = this.#stm.wrap<Int>(0)
          synthetic fun getN(ctx: STMContext): Int {
            return this.#stm.getVar<Int>(ctx, this.#n_delegate)
          }
          synthetic fun setN(ctx: STMContext, value: Int): Unit {
            this.#stm.setVar<Int>(ctx, this.#n_delegate, value)
          }
          transactional fun inc(): Unit {
            return this.#stm.runAtomically<Unit>(null, generated fun (ctx: STMContext).inc_atomicLambda(): Unit {
              this.setN(ctx, this.getN(ctx) + 1)
            })
          }
        }
      }
    }
    "};
    let (module, actual) = Tester::transform(flags(), &counter());
    Tester::verify(&module);
    Tester::check_lines_exact(package(&actual, "demo"), expected, Location::caller());
}

#[test]
fn lowering_twice_changes_nothing() {
    Tester::init_tracing();
    let (mut module, first) = Tester::transform(flags(), &counter());
    let options = TransformOptions::from_passes(Passes::from_convert_vec(flags()));
    let result = transform::<DefaultTransformDispatch>(&mut module, &options).unwrap();
    assert_eq!(result, RewriteResult::Unchanged);
    assert_eq!(module.to_string(), first);
}

#[test]
fn user_stm_property_is_kept() {
    Tester::init_tracing();
    let src = indoc! {"
      package demo {
        @SharedMutable class Legacy {
          val stm: Int = 1
          var n: Int = 0
          fun inc(): Unit {
            this.n = this.n + 1
          }
          fun peek(): Int {
            return this.stm
          }
        }
      }
    "};
    let expected = indoc! {"
    @SharedMutable class Legacy {
      delegated private final field stm: STM = findJavaSTM()
      val stm: Int = 1
      delegated private final field n_delegate: UniversalDelegate<Int> = this.#stm.wrap<Int>(0)
      synthetic fun getN(ctx: STMContext): Int {
        return this.#stm.getVar<Int>(ctx, this.#n_delegate)
      }
      synthetic fun setN(ctx: STMContext, value: Int): Unit {
        this.#stm.setVar<Int>(ctx, this.#n_delegate, value)
      }
      transactional fun inc(): Unit {
        this.setN(ctx, this.getN(ctx) + 1)
      transactional fun peek(): Int {
        return this.#stm.runAtomically<Int>(null, generated fun (ctx: STMContext).peek_atomicLambda(): Int {
          return this.stm
        })
      }
    }
    "};
    let (module, actual) = Tester::transform(flags(), &with_runtime("legacy", "jvm", src));
    Tester::verify(&module);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("getStm"));
    assert!(!actual.contains("stm_delegate"));

    let mut interp = Interpreter::new(&module);
    let legacy = interp.instantiate("demo", "Legacy").unwrap();
    interp.call_method(&legacy, "inc", vec![]).unwrap();
    let n = interp.call_method(&legacy, "getN", vec![Value::Null]).unwrap();
    assert_eq!(n, Value::Int(1));
    let stm = interp.call_method(&legacy, "peek", vec![]).unwrap();
    assert_eq!(stm, Value::Int(1));
}

#[test]
fn lowered_class_is_not_patched_again() {
    Tester::init_tracing();
    let (mut module, first) = Tester::transform(flags(), &counter());
    let bundle = SymbolBundle::resolve(&module).unwrap();
    let class = module.find_class("demo", "Counter").unwrap();
    let inc = module.find_method(class, "inc").unwrap();
    assert_eq!(module.decl(inc).origin, Origin::Transactional);
    let stm_field = module.find_field(class, "stm").unwrap();

    wrap_function_into_transaction(&mut module, &bundle, inc, stm_field).unwrap();
    assert_eq!(module.to_string(), first);
    assert!(!patch_shared_class(&mut module, &bundle, class).unwrap());
    assert_eq!(module.to_string(), first);
}

#[test]
fn private_property_is_skipped() {
    Tester::init_tracing();
    let src = indoc! {"
      package demo {
        @SharedMutable class Vault {
          private var secret: Int = 7
          var n: Int = 0
          fun peek(): Int {
            return this.secret
          }
        }
      }
    "};
    let expected = indoc! {"
    @SharedMutable class Vault {
      delegated private final field stm: STM = findJavaSTM()
      private var secret: Int = 7
      delegated private final field n_delegate: UniversalDelegate<Int> = this.#stm.wrap<Int>(0)
      synthetic fun getN(ctx: STMContext): Int {
      synthetic fun setN(ctx: STMContext, value: Int): Unit {
      transactional fun peek(): Int {
        return this.#stm.runAtomically<Int>(null, generated fun (ctx: STMContext).peek_atomicLambda(): Int {
          return this.secret
        })
      }
    }
    "};
    let (module, actual) = Tester::transform(flags(), &with_runtime("vault", "jvm", src));
    Tester::verify(&module);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("secret_delegate"));
}

#[test]
fn fake_override_calls_base() {
    Tester::init_tracing();
    let src = indoc! {"
      package shapes {
        class Shape {
          fun area(): Int {
            return 0
          }
        }
        @SharedMutable class Square : Shape {
          val side: Int = 3
          fake fun area(): Int
        }
      }
    "};
    let expected = indoc! {"
    @SharedMutable class Square : Shape {
      delegated private final field stm: STM = findJavaSTM()
      delegated private final field side_delegate: UniversalDelegate<Int> = this.#stm.wrap<Int>(3)
      synthetic fun getSide(ctx: STMContext): Int {
        return this.#stm.getVar<Int>(ctx, this.#side_delegate)
      }
      transactional fun area(): Int {
        return this.#stm.runAtomically<Int>(null, generated fun (ctx: STMContext).area_atomicLambda(): Int {
          return super<Shape>.area()
        })
      }
    }
    "};
    let (module, actual) = Tester::transform(flags(), &with_runtime("shapes", "jvm", src));
    Tester::verify(&module);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(actual.contains("class Shape {\n      fun area(): Int {"));
}

#[test]
fn atomic_function_gets_context() {
    Tester::init_tracing();
    let src = indoc! {"
      package bank {
        @AtomicFunction fun fee(amount: Int): Int {
          return amount * 2
        }
        @AtomicFunction fun transfer(amount: Int): Int {
          return amount + fee(amount)
        }
      }
    "};
    let expected = indoc! {"
    package bank {
        @AtomicFunction generated fun fee(amount: Int, ctx: STMContext): Int {
          return amount * 2
        }
        @AtomicFunction generated fun transfer(amount: Int, ctx: STMContext): Int {
          return amount + fee(amount, ctx)
        }
      }
    }
    "};
    let (module, actual) = Tester::transform(vec!["--lower-stm"], &with_runtime("bank", "jvm", src));
    Tester::verify(&module);
    Tester::check_lines_exact(package(&actual, "bank"), expected, Location::caller());

    let transfer = module.find_functions("bank", "transfer")[0];
    let f = module.function(transfer).unwrap();
    let ctx = f.value_parameters[1];
    let body = f.body.clone().unwrap();
    let ExprKind::Return { value, .. } = module.expr(body[0]).kind.clone() else {
        panic!("expected return");
    };
    let ExprKind::Binary { lhs, rhs, .. } = module.expr(value.unwrap()).kind.clone() else {
        panic!("expected binary");
    };
    assert!(matches!(module.expr(lhs).kind, ExprKind::GetValue(p) if p == f.value_parameters[0]));
    let call = module.expr(rhs).as_call().unwrap();
    let last = *call.arguments.last().unwrap();
    assert!(matches!(module.expr(last).kind, ExprKind::GetValue(p) if p == ctx));
}

#[test]
fn run_atomically_gets_stm_handle() {
    Tester::init_tracing();
    let src = indoc! {"
      package bank {
        @AtomicFunction fun fee(amount: Int): Int {
          return amount * 2
        }
        fun charge(amount: Int): Int {
          return runAtomically<Int>(fun (ctx: STMContext).block(): Int {
            return fee(amount)
          })
        }
      }
    "};
    let expected = indoc! {"
    fun charge(amount: Int): Int {
      return runAtomically<Int>(findJavaSTM(), fun (ctx: STMContext).block(): Int {
        return fee(amount, ctx)
      })
    }
    "};
    let (module, actual) = Tester::transform(vec!["--lower-stm"], &with_runtime("bank", "jvm", src));
    Tester::verify(&module);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn run_atomically_alone_is_lowered() {
    Tester::init_tracing();
    let src = indoc! {"
      package jobs {
        fun job(): Int {
          return runAtomically<Int>(fun (ctx: STMContext).block(): Int {
            return 1
          })
        }
      }
    "};
    let (module, actual) = Tester::transform(vec!["--lower-stm"], &with_runtime("jobs", "js", src));
    Tester::verify(&module);
    assert!(actual.contains("return runAtomically<Int>(findJsSTMDefault(), fun (ctx: STMContext).block(): Int {"));
}

#[test]
fn missing_context_is_an_error() {
    Tester::init_tracing();
    let src = indoc! {"
      package bank {
        @AtomicFunction fun withdraw(amount: Int): Int {
          return amount
        }
        fun transfer(amount: Int): Int {
          return withdraw(amount)
        }
      }
    "};
    let err = Tester::transform_err(vec!["--lower-stm"], &with_runtime("bank", "jvm", src));
    assert_eq!(
        err.downcast_ref::<LoweringError>(),
        Some(&LoweringError::MissingContext {
            function: "withdraw".to_string()
        })
    );
    assert_eq!(
        err.to_string(),
        "Call of function withdraw requires kotlinx.stm.STMContext to be present in scope"
    );
}

#[test]
fn missing_runtime_is_an_error() {
    Tester::init_tracing();
    let src = indoc! {"
    module @app target jvm {
      extern package kotlinx.stm {
        class STMContext
      }
      package demo {
        @SharedMutable class Counter {
          var n: Int = 0
        }
      }
    }
    "};
    let err = Tester::transform_err(vec!["--lower-stm"], src);
    assert_eq!(
        err.to_string(),
        "Couldn't find STM runtime class in dependencies of module app"
    );
}

#[test]
fn unsupported_platform_is_an_error() {
    Tester::init_tracing();
    let src = with_runtime("common", "common", indoc! {"
      package demo {
        @SharedMutable class Counter {
          var n: Int = 0
        }
      }
    "});
    let err = Tester::transform_err(flags(), &src);
    assert_eq!(
        err.downcast_ref::<LoweringError>(),
        Some(&LoweringError::UnsupportedPlatform)
    );
}

#[test]
fn module_without_stm_needs_no_runtime() {
    Tester::init_tracing();
    let src = indoc! {"
    module @plain target native {
      package demo {
        fun twice(x: Int): Int {
          return x * 2
        }
      }
    }
    "};
    let mut module = Parser::parse(src).unwrap();
    let options = TransformOptions::from_passes(Passes::from_convert_vec(flags()));
    let result = transform::<DefaultTransformDispatch>(&mut module, &options).unwrap();
    assert_eq!(result, RewriteResult::Unchanged);
}

#[test]
fn early_return_leaves_the_closure() {
    Tester::init_tracing();
    let src = indoc! {"
      package demo {
        @SharedMutable class Counter {
          var n: Int = 10
          fun add(x: Int): Int {
            if (x == 0) {
              return 1
            }
            this.n = this.n + x
            return this.n
          }
        }
      }
    "};
    let src = with_runtime("counter", "jvm", src);
    let original = Parser::parse(&src).unwrap();
    let (lowered, actual) = Tester::transform(flags(), &src);
    Tester::verify(&lowered);
    assert!(!actual.contains("return@add"));

    let mut before = Interpreter::new(&original);
    let c = before.instantiate("demo", "Counter").unwrap();
    assert_eq!(before.call_method(&c, "add", vec![Value::Int(0)]).unwrap(), Value::Int(1));
    assert_eq!(before.call_method(&c, "add", vec![Value::Int(3)]).unwrap(), Value::Int(13));

    let mut after = Interpreter::new(&lowered);
    let c = after.instantiate("demo", "Counter").unwrap();
    assert_eq!(after.call_method(&c, "add", vec![Value::Int(0)]).unwrap(), Value::Int(1));
    assert_eq!(after.call_method(&c, "add", vec![Value::Int(3)]).unwrap(), Value::Int(13));
}

#[test]
fn external_atomic_call_without_context_is_an_error() {
    Tester::init_tracing();
    let src = indoc! {"
      extern package bank.lib {
        @AtomicFunction fun withdraw(amount: Int): Int
      }
      package bank {
        fun transfer(amount: Int): Int {
          return withdraw(amount)
        }
      }
    "};
    let err = Tester::transform_err(vec!["--lower-stm"], &with_runtime("bank", "jvm", src));
    assert_eq!(
        err.downcast_ref::<LoweringError>(),
        Some(&LoweringError::MissingContext {
            function: "withdraw".to_string()
        })
    );
}

#[test]
fn external_atomic_call_is_not_mapped() {
    Tester::init_tracing();
    let src = indoc! {"
      extern package bank.lib {
        @AtomicFunction fun withdraw(amount: Int): Int
      }
      package bank {
        fun transfer(amount: Int): Int {
          return runAtomically<Int>(fun (ctx: STMContext).block(): Int {
            return withdraw(amount)
          })
        }
      }
    "};
    let err = Tester::transform_err(vec!["--lower-stm"], &with_runtime("bank", "jvm", src));
    assert_eq!(
        err.downcast_ref::<LoweringError>(),
        Some(&LoweringError::UnmappedAtomicFunction {
            function: "withdraw".to_string()
        })
    );
}

#[test]
fn fake_override_without_base_is_an_error() {
    Tester::init_tracing();
    let src = indoc! {"
      package shapes {
        @SharedMutable class Square {
          val side: Int = 3
          fake fun area(): Int
        }
      }
    "};
    let err = Tester::transform_err(flags(), &with_runtime("shapes", "jvm", src));
    assert!(matches!(
        err.downcast_ref::<LoweringError>(),
        Some(LoweringError::FakeOverrideWithoutBase { .. })
    ));
}

#[test]
fn initializer_reading_shared_property() {
    Tester::init_tracing();
    let src = indoc! {"
      package demo {
        @SharedMutable class Pair {
          var n: Int = 1
          var m: Int = this.n + 1
        }
      }
    "};
    let expected = indoc! {"
    delegated private final field m_delegate: UniversalDelegate<Int> = this.#stm.wrap<Int>(this.getN(null) + 1)
    "};
    let (module, actual) = Tester::transform(flags(), &with_runtime("pair", "jvm", src));
    Tester::verify(&module);
    Tester::check_lines_contain(&actual, expected, Location::caller());

    let mut interp = Interpreter::new(&module);
    let pair = interp.instantiate("demo", "Pair").unwrap();
    let m = interp.call_method(&pair, "getM", vec![Value::Null]).unwrap();
    assert_eq!(m, Value::Int(2));
}

fn runtime_without(line: &str) -> String {
    let runtime = common::RUNTIME
        .lines()
        .filter(|l| !l.contains(line))
        .collect::<Vec<_>>()
        .join("\n");
    let src = indoc! {"
      package demo {
        @SharedMutable class Counter {
          var n: Int = 0
        }
      }
    "};
    format!("module @app target jvm {{\n{runtime}\n{src}}}")
}

#[test]
fn missing_runtime_method_is_an_error() {
    Tester::init_tracing();
    let err = Tester::transform_err(flags(), &runtime_without("fun setVar"));
    assert_eq!(
        err.downcast_ref::<LoweringError>(),
        Some(&LoweringError::MissingMethod {
            class: "STM".to_string(),
            method: "setVar".to_string(),
            module: "app".to_string(),
        })
    );
}

#[test]
fn missing_context_accessor_is_an_error() {
    Tester::init_tracing();
    let err = Tester::transform_err(flags(), &runtime_without("fun getContext"));
    assert_eq!(
        err.to_string(),
        "Couldn't find STM.getContext() context accessor in dependencies of module app"
    );
}

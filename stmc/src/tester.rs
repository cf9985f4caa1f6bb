use crate::convert::RewriteResult;
use crate::init_subscriber;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::ExprId;
use crate::ir::ExprKind;
use crate::ir::Module;
use crate::parser::Parser;
use crate::transform;
use crate::DefaultTransformDispatch;
use crate::Passes;
use crate::TransformOptions;
use std::cmp::max;
use std::panic::Location;
use tracing::info;

pub struct Tester;

impl Tester {
    /// Initialize the subscriber for the tests.
    ///
    /// Cannot pass options, since the tests run concurrently.
    pub fn init_tracing() {
        let level = tracing::Level::INFO;
        match init_subscriber(level) {
            Ok(_) => (),
            Err(_e) => (),
        }
    }
    fn point_to_missing_line(expected: &str, index: usize) -> String {
        let mut result = String::new();
        result.push_str("A line is missing from the output:\n");
        result.push_str("```");
        for (i, line) in expected.lines().enumerate() {
            if i == index {
                let msg = format!("{line}   <== missing");
                result.push_str(&format!("\n{msg}"));
            } else {
                result.push_str(&format!("\n{line}"));
            }
        }
        result.push_str("\n```");
        result
    }
    pub fn check_lines_exact(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let l = max(actual.lines().count(), expected.lines().count());
        for i in 0..l {
            let Some(actual_line) = actual.lines().nth(i) else {
                panic!("Line {i} not found in output: called from {caller}");
            };
            let Some(expected_line) = expected.lines().nth(i) else {
                panic!("Unexpected line {i} in output: called from {caller}");
            };
            assert_eq!(actual_line, expected_line, "called from {}", caller);
        }
    }
    /// Check whether the expected lines are present in the actual output.
    ///
    /// The actual output may contain additional lines that are not in the
    /// expected output.
    pub fn check_lines_contain(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let mut actual_index = 0;
        'outer: for (i, expected_line) in expected.lines().enumerate() {
            let expected_line = expected_line.trim();
            // An empty line would match any line.
            if expected_line.is_empty() {
                continue;
            }
            for (j, actual_line) in actual.lines().enumerate().skip(actual_index) {
                if actual_line.contains(expected_line) {
                    actual_index = j + 1;
                    continue 'outer;
                }
            }
            let msg = Self::point_to_missing_line(expected, i);
            panic!("{msg}\nwhen called from {caller}");
        }
    }
    fn print_heading(msg: &str, src: &str) {
        info!("{msg}:\n```\n{src}\n```\n");
    }
    pub fn parse(src: &str) -> (Module, String) {
        let src = src.trim();
        Self::print_heading("Before parse", src);
        let module = Parser::parse(src).unwrap();
        let actual = module.to_string();
        Self::print_heading("After parse", &actual);
        (module, actual)
    }
    fn run(arguments: &[&str], src: &str) -> (Module, anyhow::Result<RewriteResult>) {
        let src = src.trim();
        let mut module = Parser::parse(src).unwrap();
        let msg = format!("Before (transform {arguments:?})");
        Self::print_heading(&msg, src);
        for arg in arguments {
            if arg.starts_with("lower-") || arg.starts_with("resolve-") {
                panic!("passes should be prefixed with `--`");
            }
        }
        let passes = Passes::from_convert_vec(arguments.to_vec());
        let options = TransformOptions::from_passes(passes);
        let result = transform::<DefaultTransformDispatch>(&mut module, &options);
        (module, result)
    }
    /// Run the passes in `arguments` on `src` and expect a change.
    pub fn transform(arguments: Vec<&str>, src: &str) -> (Module, String) {
        let (module, result) = Self::run(&arguments, src);
        match result.unwrap() {
            RewriteResult::Changed => (),
            RewriteResult::Unchanged => panic!("Expected changes"),
        }
        let actual = module.to_string();
        let msg = format!("After (transform {arguments:?})");
        Self::print_heading(&msg, &actual);
        (module, actual)
    }
    /// Run the passes in `arguments` on `src` and expect an error.
    pub fn transform_err(arguments: Vec<&str>, src: &str) -> anyhow::Error {
        let (_module, result) = Self::run(&arguments, src);
        match result {
            Ok(_) => panic!("Expected an error"),
            Err(err) => err,
        }
    }
    fn fail(module: &Module, decl: DeclId, msg: &str) -> ! {
        panic!("{msg}: {}\n{module}", module.fq_name(decl));
    }
    fn verify_function(module: &Module, function: DeclId, stack: &mut Vec<DeclId>) {
        for parameter in module.all_parameters(function) {
            if module.decl(parameter).parent != Some(function) {
                Self::fail(module, parameter, "parameter with wrong parent");
            }
        }
        let Some(body) = module.function(function).and_then(|f| f.body.clone()) else {
            return;
        };
        stack.push(function);
        for expr in body {
            Self::verify_expr(module, expr, stack);
        }
        stack.pop();
    }
    fn verify_expr(module: &Module, expr: ExprId, stack: &mut Vec<DeclId>) {
        match &module.expr(expr).kind {
            ExprKind::FunctionExpr(closure) => {
                if module.decl(*closure).parent.is_none() {
                    Self::fail(module, *closure, "closure without parent");
                }
                Self::verify_function(module, *closure, stack);
                return;
            }
            ExprKind::Variable(variable) => {
                if let DeclKind::Variable(v) = &module.decl(*variable).kind {
                    Self::verify_expr(module, v.initializer, stack);
                }
            }
            ExprKind::GetValue(value) => {
                if let Some(owner) = module.parameter(*value).and(module.decl(*value).parent) {
                    let is_class = module.class(owner).is_some();
                    if !is_class && !stack.contains(&owner) {
                        Self::fail(module, *value, "read of a parameter out of scope");
                    }
                }
            }
            ExprKind::Return { target, .. } => {
                if !stack.contains(target) {
                    Self::fail(module, *target, "return to a function out of scope");
                }
            }
            ExprKind::Call(call) => {
                if module.is_replaced(call.callee) {
                    Self::fail(module, call.callee, "call of a replaced declaration");
                }
                let accessor = module.function(call.callee).and_then(|f| f.accessor);
                if let Some(accessor) = accessor {
                    let class = module.decl(accessor.property).parent;
                    let live = class.is_some_and(|c| module.members(c).contains(&accessor.property));
                    if !live && !module.is_external(accessor.property) {
                        Self::fail(module, accessor.property, "access of a removed property");
                    }
                }
            }
            _ => (),
        }
        for child in module.expr(expr).children() {
            Self::verify_expr(module, child, stack);
        }
    }
    /// Run some extra verification on the module.
    ///
    /// This catches problems that are not visible in the textual
    /// representation. For example, whether a member is printed as part of
    /// its class is visible, but whether the member also points to the class
    /// via its parent link is not.
    pub fn verify(module: &Module) {
        for package in module.packages() {
            if module.is_external(*package) {
                continue;
            }
            for member in module.members(*package) {
                if module.decl(member).parent != Some(*package) {
                    Self::fail(module, member, "member with wrong parent");
                }
                for inner in module.members(member) {
                    if module.decl(inner).parent != Some(member) {
                        Self::fail(module, inner, "member with wrong parent");
                    }
                }
            }
        }
        for function in module.functions() {
            let mut stack = vec![];
            Self::verify_function(module, function, &mut stack);
        }
        for class in module.classes() {
            for member in module.members(class) {
                let field = match module.property(member) {
                    Some(property) => property.backing_field,
                    None => Some(member),
                };
                let initializer = field.and_then(|f| module.field(f)).and_then(|f| f.initializer);
                if let Some(initializer) = initializer {
                    let mut stack = vec![];
                    Self::verify_expr(module, initializer, &mut stack);
                }
            }
        }
    }
}

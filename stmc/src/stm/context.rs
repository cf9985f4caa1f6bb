use crate::ir::DeclId;
use crate::ir::Module;
use crate::stm::names;
use crate::stm::LoweringError;
use anyhow::Result;

/// Functions enclosing the expression that is currently visited, innermost
/// last.
///
/// The stack is pushed when the traversal enters a function (including
/// closures) and popped when it leaves, so it mirrors the nesting of
/// declarations.
#[derive(Clone, Debug, Default)]
pub struct FunctionStack {
    functions: Vec<DeclId>,
}

impl FunctionStack {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, function: DeclId) {
        self.functions.push(function);
    }
    pub fn pop(&mut self) -> Option<DeclId> {
        self.functions.pop()
    }
    pub fn innermost(&self) -> Option<DeclId> {
        self.functions.last().copied()
    }
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
    /// Enclosing functions, innermost first.
    pub fn iter_innermost_first(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.functions.iter().rev().copied()
    }
}

fn is_context(module: &Module, parameter: DeclId) -> bool {
    match module.decl(parameter).value_type() {
        Some(typ) => module.is_class_with_fq_name(typ, &names::context_fq_name()),
        None => false,
    }
}

/// The context parameter of `function` itself, if it has one.
///
/// The dispatch receiver is checked first, then the extension receiver and
/// finally the last value parameter.
pub fn context_parameter(module: &Module, function: DeclId) -> Option<DeclId> {
    let f = module.function(function)?;
    let candidates = [
        f.dispatch_receiver,
        f.extension_receiver,
        f.value_parameters.last().copied(),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|p| is_context(module, *p))
}

/// Nearest context value that is in scope, searching the enclosing
/// functions innermost first.
pub fn fetch_stm_context_or_null(module: &Module, stack: &FunctionStack) -> Option<DeclId> {
    stack
        .iter_innermost_first()
        .find_map(|function| context_parameter(module, function))
}

/// Like [fetch_stm_context_or_null], but a missing context is an error that
/// names `called`.
pub fn fetch_stm_context(module: &Module, stack: &FunctionStack, called: DeclId) -> Result<DeclId> {
    match fetch_stm_context_or_null(module, stack) {
        Some(context) => Ok(context),
        None => Err(LoweringError::MissingContext {
            function: module.name_of(called).to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use indoc::indoc;

    const SRC: &str = indoc! {"
    module @app {
      extern package kotlinx.stm {
        class STMContext
      }
      package demo {
        fun outer(a: Int, ctx: STMContext): Int {
          return a
        }
        fun (c: STMContext).inner(ctx: Int): Int {
          return ctx
        }
        fun plain(): Int {
          return 1
        }
      }
    }"};

    #[test]
    fn test_innermost_first() {
        let module = Parser::parse(SRC).unwrap();
        let outer = module.find_functions("demo", "outer")[0];
        let inner = module.find_functions("demo", "inner")[0];
        let plain = module.find_functions("demo", "plain")[0];

        let mut stack = FunctionStack::new();
        stack.push(plain);
        assert_eq!(fetch_stm_context_or_null(&module, &stack), None);
        let err = fetch_stm_context(&module, &stack, plain).unwrap_err();
        assert!(err.to_string().contains("Call of function plain"));

        stack.push(outer);
        let found = fetch_stm_context_or_null(&module, &stack).unwrap();
        assert_eq!(module.name_of(found), "ctx");
        assert_eq!(module.decl(found).parent, Some(outer));

        stack.push(inner);
        let found = fetch_stm_context_or_null(&module, &stack).unwrap();
        assert_eq!(module.name_of(found), "c");
        assert_eq!(stack.pop(), Some(inner));
        assert_eq!(stack.innermost(), Some(outer));
    }
}

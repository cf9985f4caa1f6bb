use crate::convert::LowerStm;
use crate::convert::Pass;
use crate::convert::ResolveStmAccessors;
use crate::convert::RewriteResult;
use crate::ir::Module;
use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use std::env::ArgsOs;
use std::fmt;
use std::fmt::Display;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;

/// A transformation pass (e.g., `--lower-stm`).
#[derive(Clone, Debug)]
pub struct SinglePass {
    pass: String,
}

impl Display for SinglePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pass)
    }
}

impl SinglePass {
    pub fn new(pass: &str) -> SinglePass {
        let pass = pass.strip_prefix("--").unwrap_or(pass);
        SinglePass {
            pass: pass.to_string(),
        }
    }
}

fn is_pass_argument(arg: &str) -> bool {
    arg.starts_with("--resolve-") || arg.starts_with("--lower-")
}

/// A collection of [SinglePass]es.
#[derive(Clone, Debug, Default)]
pub struct Passes {
    passes: Vec<SinglePass>,
}

impl Display for Passes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.passes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

impl Passes {
    pub fn from_vec(passes: Vec<&str>) -> Passes {
        Passes {
            passes: passes.iter().map(|p| SinglePass::new(p)).collect(),
        }
    }
    /// Keep only the arguments that name a pass, in the given order.
    pub fn from_convert_vec(args: Vec<&str>) -> Passes {
        let mut passes = vec![];
        for arg in args {
            if is_pass_argument(arg) {
                passes.push(arg);
            }
        }
        Passes::from_vec(passes)
    }
    /// Extract passes (starting with `--resolve-` or `--lower-`) from the
    /// given args.
    ///
    /// Clap does not keep the order of flags, so the passes are read from the
    /// raw arguments.
    pub fn from_convert_args(args: ArgsOs) -> Passes {
        let mut passes = vec![];
        for arg in args {
            let arg = arg.to_string_lossy();
            if is_pass_argument(&arg) {
                passes.push(SinglePass::new(&arg));
            }
        }
        Passes { passes }
    }
    pub fn vec(&self) -> &Vec<SinglePass> {
        &self.passes
    }
}

/// Passes plus the options that apply to all of them.
#[derive(Clone, Debug, Default)]
pub struct TransformOptions {
    passes: Passes,
    print_ir_before_all: bool,
}

impl TransformOptions {
    pub fn from_passes(passes: Passes) -> TransformOptions {
        TransformOptions {
            passes,
            print_ir_before_all: false,
        }
    }
    pub fn from_args(matches: ArgMatches, passes: Passes) -> TransformOptions {
        let print_ir_before_all = matches
            .try_get_one::<bool>("print-ir-before-all")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false);
        TransformOptions {
            passes,
            print_ir_before_all,
        }
    }
    pub fn set_print_ir_before_all(&mut self, print_ir_before_all: bool) {
        self.print_ir_before_all = print_ir_before_all;
    }
    pub fn passes(&self) -> &Passes {
        &self.passes
    }
    pub fn print_ir_before_all(&self) -> bool {
        self.print_ir_before_all
    }
}

/// Interface to add custom passes to the compiler.
pub trait TransformDispatch {
    fn dispatch(module: &mut Module, pass: &SinglePass) -> Result<RewriteResult>;
}

/// Default implementation of [TransformDispatch].
///
/// Knows the passes that are implemented in this crate.
pub struct DefaultTransformDispatch;

/// Initialize logging with the given level.
pub fn init_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_test_writer()
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

impl TransformDispatch for DefaultTransformDispatch {
    fn dispatch(module: &mut Module, pass: &SinglePass) -> Result<RewriteResult> {
        let pass = pass.to_string();
        match pass.as_str() {
            ResolveStmAccessors::NAME => ResolveStmAccessors::convert(module),
            LowerStm::NAME => LowerStm::convert(module),
            _ => Err(anyhow::anyhow!("Unknown pass: {}", pass)),
        }
    }
}

/// Default arguments that are available in stmc.
///
/// This includes options such as `--print-ir-before-all`, but also the
/// passes. `--debug` is not included to allow downstream projects to handle
/// the logging differently.
pub fn default_arguments() -> Vec<Arg> {
    vec![
        Arg::new("resolve-stm-accessors")
            .long("resolve-stm-accessors")
            .help("Declare getX/setX accessors for the properties of @SharedMutable classes")
            .action(ArgAction::SetTrue),
        Arg::new("lower-stm")
            .long("lower-stm")
            .help("Lower shared classes and atomic functions to STM runtime calls")
            .action(ArgAction::SetTrue),
        Arg::new("print-ir-before-all")
            .long("print-ir-before-all")
            .help("Print the IR before each pass")
            .action(ArgAction::SetTrue),
    ]
}

/// Transform the given module via the given passes.
///
/// The passes run in order. The first failing pass aborts the
/// transformation; the module may then be partially rewritten and should be
/// discarded.
pub fn transform<T: TransformDispatch>(
    module: &mut Module,
    options: &TransformOptions,
) -> Result<RewriteResult> {
    let mut result = RewriteResult::Unchanged;
    for pass in options.passes().vec() {
        if options.print_ir_before_all() {
            info!("IR before {pass}:\n{module}");
        }
        info!("Running pass {pass}");
        let new_result = T::dispatch(module, pass)?;
        result = result.or(new_result);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_from_args() {
        let args = vec!["stmc", "--debug", "--resolve-stm-accessors", "in.ir", "--lower-stm"];
        let passes = Passes::from_convert_vec(args);
        assert_eq!(passes.to_string(), "resolve-stm-accessors lower-stm");
        assert_eq!(passes.vec().len(), 2);
    }

    #[test]
    fn test_unknown_pass() {
        let mut module = Module::new("empty", crate::ir::Platform::Jvm);
        let options = TransformOptions::from_passes(Passes::from_vec(vec!["--lower-everything"]));
        let err = transform::<DefaultTransformDispatch>(&mut module, &options).unwrap_err();
        assert_eq!(err.to_string(), "Unknown pass: lower-everything");
    }
}

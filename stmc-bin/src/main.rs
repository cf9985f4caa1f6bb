use anyhow::Result;
use clap::ArgMatches;
use clap::Args;
use clap::Command;
use std::io::Read;
use stmc::convert::RewriteResult;
use stmc::init_subscriber;
use stmc::ir::Platform;
use stmc::parser::Parser;
use stmc::transform;
use stmc::DefaultTransformDispatch;
use stmc::Passes;
use stmc::TransformOptions;

/// Lower STM-shared classes and atomic functions to STM runtime calls
#[derive(Args, Debug)]
#[command(version, about)]
struct StmcArgs {
    /// The input file (- is interpreted as stdin)
    #[arg(default_value = "-")]
    input: String,
    /// Print debug logs to stdout
    #[arg(long)]
    debug: bool,
    /// Override the target platform of the module (jvm, js, native)
    #[arg(long)]
    target: Option<String>,
}

fn cli() -> Command {
    let cli = Command::new("stmc").args(stmc::default_arguments());
    StmcArgs::augment_args(cli)
}

fn init_tracing(level: tracing::Level) {
    match init_subscriber(level) {
        Ok(_) => (),
        Err(_e) => (),
    }
}

/// Parse `src`, run the passes and print the result.
///
/// Nothing of the module is returned if a pass fails.
fn parse_and_transform(src: &str, matches: &ArgMatches, passes: Passes) -> Result<String> {
    let mut module = Parser::parse(src)?;
    if let Some(target) = matches.get_one::<String>("target") {
        module.set_target(Platform::from_name(target)?);
    }
    let options = TransformOptions::from_args(matches.clone(), passes);
    let result = transform::<DefaultTransformDispatch>(&mut module, &options)?;
    let result = match result {
        RewriteResult::Changed => module.to_string(),
        RewriteResult::Unchanged => src.trim().to_string(),
    };
    Ok(result)
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input).map_err(|e| anyhow::anyhow!("Cannot read {input}: {e}"))
    }
}

fn main() -> Result<()> {
    let cli = cli();
    let args = std::env::args_os();
    let passes = Passes::from_convert_args(args);
    let matches = cli.get_matches();
    if matches.get_flag("debug") {
        init_tracing(tracing::Level::DEBUG);
    } else {
        init_tracing(tracing::Level::INFO);
    }
    let input = matches
        .get_one::<String>("input")
        .map(|s| s.as_str())
        .unwrap_or("-");
    let src = read_input(input)?;
    let result = parse_and_transform(&src, &matches, passes)?;
    println!("{result}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn run_app(args: Vec<&str>, input_text: &str) -> Result<String> {
        let cli = cli();
        let args_owned: Vec<String> = args.iter().map(|&s| s.to_string()).collect();
        let matches = cli.try_get_matches_from(args_owned)?;
        let passes = Passes::from_convert_vec(args);
        parse_and_transform(input_text, &matches, passes)
    }

    const SRC: &str = indoc! {"
    module @counter target jvm {
      extern package kotlinx.stm {
        class STMContext
        class UniversalDelegate<T>
        interface STM {
          fun wrap<T>(initValue: T?): UniversalDelegate<T>
          fun getVar<T>(ctx: STMContext?, delegate: UniversalDelegate<T>): T
          fun setVar<T>(ctx: STMContext?, delegate: UniversalDelegate<T>, newValue: T): Unit
          fun runAtomically<T>(ctx: STMContext?, block: STMContext.() -> T): T
          fun getContext(): STMContext
        }
        fun findJavaSTM(): STM
        fun findNativeSTMDefault(): STM
        fun runAtomically<T>(block: STMContext.() -> T): T
        fun runAtomically<T>(stm: STM, block: STMContext.() -> T): T
      }
      package demo {
        @SharedMutable class Counter {
          var n: Int = 0
        }
      }
    }"};

    #[test]
    fn test_help() {
        let args = vec!["stmc", "--help"];
        let result = run_app(args, "");
        let err = match result {
            Ok(_) => panic!("Expected an error"),
            Err(e) => e,
        };
        let result = err.to_string();
        println!("{result}");
        assert!(result.contains("Usage: stmc"));
        assert!(result.contains("--lower-stm"));
        assert!(result.contains("--resolve-stm-accessors"));
    }

    #[test]
    fn test_invalid_args() {
        let result = run_app(vec!["stmc", "--invalid-flag"], "");
        assert!(result.is_err());
    }

    #[test]
    fn test_lower() {
        let args = vec!["stmc", "--resolve-stm-accessors", "--lower-stm"];
        let result = run_app(args, SRC).unwrap();
        assert!(result.contains("delegated private final field stm: STM = findJavaSTM()"));
        assert!(result.contains("synthetic fun getN(ctx: STMContext): Int {"));
    }

    #[test]
    fn test_no_passes() {
        let result = run_app(vec!["stmc"], SRC).unwrap();
        assert_eq!(result, SRC.trim());
    }

    #[test]
    fn test_target_override() {
        let args = vec!["stmc", "--target", "native", "--resolve-stm-accessors", "--lower-stm"];
        let result = run_app(args, SRC).unwrap();
        assert!(result.contains("module @counter target native {"));
        assert!(result.contains("field stm: STM = findNativeSTMDefault()"));
    }

    #[test]
    fn test_error_without_output() {
        let args = vec!["stmc", "--target", "js", "--resolve-stm-accessors", "--lower-stm"];
        let err = run_app(args, SRC).unwrap_err();
        assert_eq!(err.to_string(), "Expected findJsSTMDefault to be visible in module counter");
    }
}

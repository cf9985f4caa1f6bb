use indoc::indoc;

/// Declarations of the STM runtime library, as seen from a module that
/// depends on it.
pub const RUNTIME: &str = indoc! {"
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
    fun findJsSTMDefault(): STM
    fun runAtomically<T>(block: STMContext.() -> T): T
    fun runAtomically<T>(stm: STM, block: STMContext.() -> T): T
  }
"};

/// A module `@name` that depends on the runtime and declares `packages`.
#[allow(dead_code)]
pub fn with_runtime(name: &str, target: &str, packages: &str) -> String {
    format!("module @{name} target {target} {{\n{RUNTIME}{packages}}}")
}

/// The printed module starting at `package name`.
#[allow(dead_code)]
pub fn package<'a>(printed: &'a str, name: &str) -> &'a str {
    let start = printed
        .find(&format!("package {name} {{"))
        .unwrap_or_else(|| panic!("package {name} not found in\n{printed}"));
    &printed[start..]
}

use crate::ir::DeclId;
use std::fmt::Display;
use std::fmt::Formatter;

/// A resolved type.
///
/// Class types keep the name of the class next to the [DeclId] so that a type
/// can be printed without access to the [crate::ir::Module] that owns the
/// class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Unit,
    Int,
    Boolean,
    String,
    Any,
    Nothing,
    Class {
        class: DeclId,
        name: String,
        arguments: Vec<Type>,
    },
    /// Reference to a type parameter such as `T` in `fun wrap<T>(x: T)`.
    Parameter(String),
    /// Function type, optionally with a receiver (`STMContext.() -> T`).
    Function {
        receiver: Option<Box<Type>>,
        parameters: Vec<Type>,
        ret: Box<Type>,
    },
    Nullable(Box<Type>),
}

impl Type {
    pub fn class(class: DeclId, name: &str, arguments: Vec<Type>) -> Type {
        Type::Class {
            class,
            name: name.to_string(),
            arguments,
        }
    }
    pub fn function(receiver: Option<Type>, parameters: Vec<Type>, ret: Type) -> Type {
        Type::Function {
            receiver: receiver.map(Box::new),
            parameters,
            ret: Box::new(ret),
        }
    }
    /// Return the nullable variant of the type (`T?`).
    ///
    /// Nullable types are not nested; `T??` is `T?`.
    pub fn make_nullable(&self) -> Type {
        match self {
            Type::Nullable(_) => self.clone(),
            _ => Type::Nullable(Box::new(self.clone())),
        }
    }
    pub fn make_not_null(&self) -> Type {
        match self {
            Type::Nullable(inner) => *inner.clone(),
            _ => self.clone(),
        }
    }
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }
    /// Return the class of the type while ignoring nullability.
    pub fn class_or_none(&self) -> Option<DeclId> {
        match self.make_not_null() {
            Type::Class { class, .. } => Some(class),
            _ => None,
        }
    }
    /// Generic arguments of a class type (`Int` for `UniversalDelegate<Int>`).
    pub fn arguments(&self) -> &[Type] {
        match self {
            Type::Class { arguments, .. } => arguments,
            Type::Nullable(inner) => inner.arguments(),
            _ => &[],
        }
    }
    /// Replace type parameters by the given arguments.
    ///
    /// Parameters that have no counterpart in `arguments` are kept as is.
    pub fn substitute(&self, parameters: &[String], arguments: &[Type]) -> Type {
        match self {
            Type::Parameter(name) => {
                let index = parameters.iter().position(|p| p == name);
                match index.and_then(|i| arguments.get(i)) {
                    Some(argument) => argument.clone(),
                    None => self.clone(),
                }
            }
            Type::Class {
                class,
                name,
                arguments: args,
            } => Type::Class {
                class: *class,
                name: name.clone(),
                arguments: args
                    .iter()
                    .map(|a| a.substitute(parameters, arguments))
                    .collect(),
            },
            Type::Function {
                receiver,
                parameters: params,
                ret,
            } => Type::Function {
                receiver: receiver
                    .as_ref()
                    .map(|r| Box::new(r.substitute(parameters, arguments))),
                parameters: params
                    .iter()
                    .map(|p| p.substitute(parameters, arguments))
                    .collect(),
                ret: Box::new(ret.substitute(parameters, arguments)),
            },
            Type::Nullable(inner) => inner.substitute(parameters, arguments).make_nullable(),
            _ => self.clone(),
        }
    }
}

fn display_list(f: &mut Formatter<'_>, types: &[Type]) -> std::fmt::Result {
    for (i, typ) in types.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{typ}")?;
    }
    Ok(())
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Unit => write!(f, "Unit"),
            Type::Int => write!(f, "Int"),
            Type::Boolean => write!(f, "Boolean"),
            Type::String => write!(f, "String"),
            Type::Any => write!(f, "Any"),
            Type::Nothing => write!(f, "Nothing"),
            Type::Class {
                name, arguments, ..
            } => {
                write!(f, "{name}")?;
                if !arguments.is_empty() {
                    write!(f, "<")?;
                    display_list(f, arguments)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Parameter(name) => write!(f, "{name}"),
            Type::Function {
                receiver,
                parameters,
                ret,
            } => {
                if let Some(receiver) = receiver {
                    write!(f, "{receiver}.")?;
                }
                write!(f, "(")?;
                display_list(f, parameters)?;
                write!(f, ") -> {ret}")
            }
            Type::Nullable(inner) => write!(f, "{inner}?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let delegate = Type::class(DeclId(3), "UniversalDelegate", vec![Type::Int]);
        assert_eq!(delegate.to_string(), "UniversalDelegate<Int>");
        let context = Type::class(DeclId(1), "STMContext", vec![]);
        assert_eq!(context.make_nullable().to_string(), "STMContext?");
        assert_eq!(context.make_nullable().make_nullable().to_string(), "STMContext?");
        let block = Type::function(Some(context), vec![], Type::Parameter("T".to_string()));
        assert_eq!(block.to_string(), "STMContext.() -> T");
    }

    #[test]
    fn test_substitute() {
        let t = Type::Parameter("T".to_string());
        let delegate = Type::class(DeclId(3), "UniversalDelegate", vec![t.clone()]);
        let parameters = vec!["T".to_string()];
        let actual = delegate.substitute(&parameters, &[Type::Int]);
        assert_eq!(actual.to_string(), "UniversalDelegate<Int>");
        assert_eq!(actual.arguments(), &[Type::Int]);

        let nullable = t.make_nullable().substitute(&parameters, &[Type::String]);
        assert_eq!(nullable, Type::String.make_nullable());

        let unbound = t.substitute(&parameters, &[]);
        assert_eq!(unbound, t);
    }
}

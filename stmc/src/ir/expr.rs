use crate::ir::DeclId;
use crate::ir::ExprId;
use crate::ir::Type;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Const {
    Int(i64),
    Boolean(bool),
    String(String),
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Eq,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Eq => "==",
        }
    }
}

/// A call of a function or property accessor.
#[derive(Clone, Debug)]
pub struct Call {
    pub callee: DeclId,
    pub dispatch_receiver: Option<ExprId>,
    pub extension_receiver: Option<ExprId>,
    pub arguments: Vec<ExprId>,
    pub type_arguments: Vec<Type>,
    /// Class that a `super<Base>.f()` call is dispatched to.
    pub super_qualifier: Option<DeclId>,
}

impl Call {
    pub fn new(callee: DeclId) -> Self {
        Call {
            callee,
            dispatch_receiver: None,
            extension_receiver: None,
            arguments: vec![],
            type_arguments: vec![],
            super_qualifier: None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Const(Const),
    /// Read of a parameter or local variable.
    GetValue(DeclId),
    GetField {
        receiver: Option<ExprId>,
        field: DeclId,
    },
    SetField {
        receiver: Option<ExprId>,
        field: DeclId,
        value: ExprId,
    },
    Call(Call),
    Binary {
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// Return from the function `target` (which is not necessarily the
    /// innermost function).
    Return {
        target: DeclId,
        value: Option<ExprId>,
    },
    /// A closure; the function declaration is owned by this expression.
    FunctionExpr(DeclId),
    /// Declaration statement of a local variable.
    Variable(DeclId),
    If {
        condition: ExprId,
        then: Vec<ExprId>,
        els: Vec<ExprId>,
    },
}

#[derive(Clone, Debug)]
pub struct Expression {
    pub kind: ExprKind,
    pub typ: Type,
}

impl Expression {
    pub fn new(kind: ExprKind, typ: Type) -> Self {
        Expression { kind, typ }
    }
    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }
    /// Direct subexpressions in evaluation order.
    ///
    /// Closures are not included since their bodies belong to another
    /// function.
    pub fn children(&self) -> Vec<ExprId> {
        match &self.kind {
            ExprKind::Const(_) | ExprKind::GetValue(_) | ExprKind::FunctionExpr(_) => vec![],
            ExprKind::Variable(_) => vec![],
            ExprKind::GetField { receiver, .. } => receiver.iter().copied().collect(),
            ExprKind::SetField {
                receiver, value, ..
            } => receiver.iter().copied().chain([*value]).collect(),
            ExprKind::Call(call) => call
                .dispatch_receiver
                .iter()
                .chain(call.extension_receiver.iter())
                .chain(call.arguments.iter())
                .copied()
                .collect(),
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Return { value, .. } => value.iter().copied().collect(),
            ExprKind::If {
                condition,
                then,
                els,
            } => [*condition]
                .into_iter()
                .chain(then.iter().copied())
                .chain(els.iter().copied())
                .collect(),
        }
    }
}

//! AST node kinds for the ingested tree.
//!
//! The record table identifies node kinds by string; internally they map to
//! a closed enum so dispatch is a single `match`. A kind string the table
//! contract does not know becomes [`AstKind::Unknown`] and flows into the
//! interpreter's not-implemented fallback instead of failing ingestion.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AstKind {
    Toplevel,
    StmtList,
    FuncDecl,
    Closure,
    ParamList,
    Param,
    ArgList,
    Call,
    MethodCall,
    New,
    Return,
    If,
    IfElem,
    Conditional,
    Switch,
    SwitchList,
    SwitchCase,
    While,
    DoWhile,
    For,
    ForEach,
    Break,
    Continue,
    Try,
    CatchList,
    Catch,
    Throw,
    Assign,
    AssignOp,
    Var,
    Prop,
    Dim,
    BinaryOp,
    UnaryOp,
    UpdateOp,
    EncapsList,
    ExprList,
    Array,
    ArrayElem,
    Str,
    Integer,
    Double,
    Name,
    Null,
    Unknown(String),
}

impl AstKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "AST_TOPLEVEL" => Self::Toplevel,
            "AST_STMT_LIST" => Self::StmtList,
            "AST_FUNC_DECL" => Self::FuncDecl,
            "AST_CLOSURE" => Self::Closure,
            "AST_PARAM_LIST" => Self::ParamList,
            "AST_PARAM" => Self::Param,
            "AST_ARG_LIST" => Self::ArgList,
            "AST_CALL" => Self::Call,
            "AST_METHOD_CALL" => Self::MethodCall,
            "AST_NEW" => Self::New,
            "AST_RETURN" => Self::Return,
            "AST_IF" => Self::If,
            "AST_IF_ELEM" => Self::IfElem,
            "AST_CONDITIONAL" => Self::Conditional,
            "AST_SWITCH" => Self::Switch,
            "AST_SWITCH_LIST" => Self::SwitchList,
            "AST_SWITCH_CASE" => Self::SwitchCase,
            "AST_WHILE" => Self::While,
            "AST_DO_WHILE" => Self::DoWhile,
            "AST_FOR" => Self::For,
            "AST_FOREACH" => Self::ForEach,
            "AST_BREAK" => Self::Break,
            "AST_CONTINUE" => Self::Continue,
            "AST_TRY" => Self::Try,
            "AST_CATCH_LIST" => Self::CatchList,
            "AST_CATCH" => Self::Catch,
            "AST_THROW" => Self::Throw,
            "AST_ASSIGN" => Self::Assign,
            "AST_ASSIGN_OP" => Self::AssignOp,
            "AST_VAR" => Self::Var,
            "AST_PROP" => Self::Prop,
            "AST_DIM" => Self::Dim,
            "AST_BINARY_OP" => Self::BinaryOp,
            "AST_UNARY_OP" => Self::UnaryOp,
            "AST_UPDATE_OP" => Self::UpdateOp,
            "AST_ENCAPS_LIST" => Self::EncapsList,
            "AST_EXPR_LIST" => Self::ExprList,
            "AST_ARRAY" => Self::Array,
            "AST_ARRAY_ELEM" => Self::ArrayElem,
            "string" => Self::Str,
            "integer" => Self::Integer,
            "double" => Self::Double,
            "AST_NAME" => Self::Name,
            "NULL" => Self::Null,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Toplevel => "AST_TOPLEVEL",
            Self::StmtList => "AST_STMT_LIST",
            Self::FuncDecl => "AST_FUNC_DECL",
            Self::Closure => "AST_CLOSURE",
            Self::ParamList => "AST_PARAM_LIST",
            Self::Param => "AST_PARAM",
            Self::ArgList => "AST_ARG_LIST",
            Self::Call => "AST_CALL",
            Self::MethodCall => "AST_METHOD_CALL",
            Self::New => "AST_NEW",
            Self::Return => "AST_RETURN",
            Self::If => "AST_IF",
            Self::IfElem => "AST_IF_ELEM",
            Self::Conditional => "AST_CONDITIONAL",
            Self::Switch => "AST_SWITCH",
            Self::SwitchList => "AST_SWITCH_LIST",
            Self::SwitchCase => "AST_SWITCH_CASE",
            Self::While => "AST_WHILE",
            Self::DoWhile => "AST_DO_WHILE",
            Self::For => "AST_FOR",
            Self::ForEach => "AST_FOREACH",
            Self::Break => "AST_BREAK",
            Self::Continue => "AST_CONTINUE",
            Self::Try => "AST_TRY",
            Self::CatchList => "AST_CATCH_LIST",
            Self::Catch => "AST_CATCH",
            Self::Throw => "AST_THROW",
            Self::Assign => "AST_ASSIGN",
            Self::AssignOp => "AST_ASSIGN_OP",
            Self::Var => "AST_VAR",
            Self::Prop => "AST_PROP",
            Self::Dim => "AST_DIM",
            Self::BinaryOp => "AST_BINARY_OP",
            Self::UnaryOp => "AST_UNARY_OP",
            Self::UpdateOp => "AST_UPDATE_OP",
            Self::EncapsList => "AST_ENCAPS_LIST",
            Self::ExprList => "AST_EXPR_LIST",
            Self::Array => "AST_ARRAY",
            Self::ArrayElem => "AST_ARRAY_ELEM",
            Self::Str => "string",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Name => "AST_NAME",
            Self::Null => "NULL",
            Self::Unknown(s) => s,
        }
    }

    /// Kinds that declare a function and therefore get ENTRY/EXIT nodes and
    /// their own scope at call time.
    pub fn is_function(&self) -> bool {
        matches!(self, Self::FuncDecl | Self::Closure)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call | Self::MethodCall | Self::New)
    }
}

/// Declaration flags carried by `AST_VAR` nodes under a declaration.
pub mod flags {
    pub const DECL_VAR: &str = "JS_DECL_VAR";
    pub const DECL_LET: &str = "JS_DECL_LET";
    pub const DECL_CONST: &str = "JS_DECL_CONST";
    /// Object literals share the `AST_ARRAY` kind with array literals.
    pub const OBJECT_LIT: &str = "JS_OBJECT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_kinds() {
        for s in ["AST_TOPLEVEL", "AST_METHOD_CALL", "string", "NULL"] {
            assert_eq!(AstKind::from_str(s).as_str(), s);
        }
    }

    #[test]
    fn unknown_kind_is_preserved_not_rejected() {
        let kind = AstKind::from_str("AST_YIELD");
        assert_eq!(kind, AstKind::Unknown("AST_YIELD".into()));
        assert_eq!(kind.as_str(), "AST_YIELD");
    }
}

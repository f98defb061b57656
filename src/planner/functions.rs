//! Function registry
//!
//! Built-in scalar, aggregate, and window functions with their arity and
//! result typing. The planner owns one registry per instance; extra
//! functions can be registered before planning starts.

use std::collections::BTreeMap;

use crate::catalog::DataType;
use crate::planner::error::{PlannerError, PlannerResult};

/// Where a function may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    /// Usable with GROUP BY or, with OVER, as a window function
    Aggregate,
    /// Only usable with OVER
    Window,
}

/// Accepted argument types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Any,
    Numeric,
    String,
}

impl ArgKind {
    fn accepts(&self, data_type: &DataType) -> bool {
        match self {
            ArgKind::Any => true,
            ArgKind::Numeric => data_type.is_numeric() || data_type.is_unknown(),
            ArgKind::String => data_type.is_string() || data_type.is_unknown(),
        }
    }
}

/// Result type rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Fixed(DataType),
    /// Type of the first argument
    FirstArg,
    /// Common type of all arguments
    Common,
    /// BIGINT for integer input, DOUBLE PRECISION otherwise
    Sum,
}

/// Result nullability rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    Never,
    Always,
    /// Nullable if any argument is
    AnyArg,
    /// Nullable only if every argument is
    AllArgs,
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub kind: FunctionKind,
    pub min_args: usize,
    /// `None` = variadic
    pub max_args: Option<usize>,
    pub arg_kind: ArgKind,
    pub return_type: ReturnType,
    pub nullability: Nullability,
}

impl FunctionSignature {
    /// One-argument function accepting any type
    pub fn new(name: impl Into<String>, kind: FunctionKind, return_type: ReturnType) -> Self {
        Self {
            name: name.into(),
            kind,
            min_args: 1,
            max_args: Some(1),
            arg_kind: ArgKind::Any,
            return_type,
            nullability: Nullability::AnyArg,
        }
    }

    pub fn args(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    pub fn arg_kind(mut self, kind: ArgKind) -> Self {
        self.arg_kind = kind;
        self
    }

    pub fn nullability(mut self, nullability: Nullability) -> Self {
        self.nullability = nullability;
        self
    }

    /// Result type and nullability for the given argument types
    ///
    /// `star` is `count(*)`; it takes no arguments.
    pub fn resolve(
        &self,
        args: &[(DataType, bool)],
        star: bool,
    ) -> PlannerResult<(DataType, bool)> {
        if star {
            if self.name != "count" {
                return Err(PlannerError::invalid_plan(format!(
                    "{}(*) is not allowed",
                    self.name
                )));
            }
        } else {
            let arity_ok = args.len() >= self.min_args
                && self.max_args.map_or(true, |max| args.len() <= max);
            if !arity_ok {
                return Err(PlannerError::invalid_plan(format!(
                    "function {} does not take {} argument(s)",
                    self.name,
                    args.len()
                )));
            }
        }

        if let Some((bad, _)) = args.iter().find(|(t, _)| !self.arg_kind.accepts(t)) {
            return Err(PlannerError::type_mismatch(format!(
                "function {} does not accept {}",
                self.name, bad
            )));
        }

        let data_type = match &self.return_type {
            ReturnType::Fixed(t) => t.clone(),
            ReturnType::FirstArg => args
                .first()
                .map(|(t, _)| t.clone())
                .unwrap_or(DataType::Unknown),
            ReturnType::Common => {
                let mut common = DataType::Unknown;
                for (t, _) in args {
                    common = common_type(&common, t).ok_or_else(|| {
                        PlannerError::type_mismatch(format!(
                            "function {} arguments {} and {} have no common type",
                            self.name, common, t
                        ))
                    })?;
                }
                common
            }
            ReturnType::Sum => match args.first() {
                Some((t, _)) if t.is_integer() => DataType::BigInt,
                Some((t, _)) if t.is_unknown() => DataType::Unknown,
                _ => DataType::Double,
            },
        };

        let nullable = match self.nullability {
            Nullability::Never => false,
            Nullability::Always => true,
            Nullability::AnyArg => args.iter().any(|(_, n)| *n),
            Nullability::AllArgs => args.iter().all(|(_, n)| *n),
        };

        Ok((data_type, nullable))
    }
}

/// Common supertype of two types, if they can meet at all
pub fn common_type(a: &DataType, b: &DataType) -> Option<DataType> {
    if a.is_unknown() {
        return Some(b.clone());
    }
    if b.is_unknown() || a == b {
        return Some(a.clone());
    }
    if a.is_numeric() && b.is_numeric() {
        return Some(if numeric_rank(a) >= numeric_rank(b) {
            a.clone()
        } else {
            b.clone()
        });
    }
    if a.is_string() && b.is_string() {
        return Some(DataType::Text);
    }
    None
}

fn numeric_rank(t: &DataType) -> u8 {
    match t {
        DataType::SmallInt => 1,
        DataType::Int => 2,
        DataType::BigInt => 3,
        DataType::Float => 4,
        DataType::Double => 5,
        _ => 0,
    }
}

/// Name -> signature
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionSignature>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Registry with the built-in functions
    pub fn new() -> Self {
        use FunctionKind::*;

        let mut registry = Self::empty();
        let builtins = [
            // Aggregates
            FunctionSignature::new("count", Aggregate, ReturnType::Fixed(DataType::BigInt))
                .nullability(Nullability::Never),
            FunctionSignature::new("sum", Aggregate, ReturnType::Sum)
                .arg_kind(ArgKind::Numeric)
                .nullability(Nullability::Always),
            FunctionSignature::new("avg", Aggregate, ReturnType::Fixed(DataType::Double))
                .arg_kind(ArgKind::Numeric)
                .nullability(Nullability::Always),
            FunctionSignature::new("min", Aggregate, ReturnType::FirstArg)
                .nullability(Nullability::Always),
            FunctionSignature::new("max", Aggregate, ReturnType::FirstArg)
                .nullability(Nullability::Always),
            // Scalars
            FunctionSignature::new("abs", Scalar, ReturnType::FirstArg).arg_kind(ArgKind::Numeric),
            FunctionSignature::new("lower", Scalar, ReturnType::Fixed(DataType::Text))
                .arg_kind(ArgKind::String),
            FunctionSignature::new("upper", Scalar, ReturnType::Fixed(DataType::Text))
                .arg_kind(ArgKind::String),
            FunctionSignature::new("length", Scalar, ReturnType::Fixed(DataType::Int))
                .arg_kind(ArgKind::String),
            FunctionSignature::new("coalesce", Scalar, ReturnType::Common)
                .args(1, None)
                .nullability(Nullability::AllArgs),
            FunctionSignature::new("nullif", Scalar, ReturnType::FirstArg)
                .args(2, Some(2))
                .nullability(Nullability::Always),
            FunctionSignature::new("concat", Scalar, ReturnType::Fixed(DataType::Text))
                .args(1, None)
                .nullability(Nullability::Never),
            FunctionSignature::new("greatest", Scalar, ReturnType::Common).args(1, None),
            FunctionSignature::new("least", Scalar, ReturnType::Common).args(1, None),
            // Window-only
            FunctionSignature::new("row_number", Window, ReturnType::Fixed(DataType::BigInt))
                .args(0, Some(0))
                .nullability(Nullability::Never),
            FunctionSignature::new("rank", Window, ReturnType::Fixed(DataType::BigInt))
                .args(0, Some(0))
                .nullability(Nullability::Never),
            FunctionSignature::new("dense_rank", Window, ReturnType::Fixed(DataType::BigInt))
                .args(0, Some(0))
                .nullability(Nullability::Never),
            FunctionSignature::new("lag", Window, ReturnType::FirstArg)
                .args(1, Some(3))
                .nullability(Nullability::Always),
            FunctionSignature::new("lead", Window, ReturnType::FirstArg)
                .args(1, Some(3))
                .nullability(Nullability::Always),
            FunctionSignature::new("first_value", Window, ReturnType::FirstArg),
            FunctionSignature::new("last_value", Window, ReturnType::FirstArg),
        ];
        for sig in builtins {
            registry.register(sig);
        }
        registry
    }

    /// Registry with no functions
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// Add or replace a function
    pub fn register(&mut self, signature: FunctionSignature) {
        self.functions.insert(signature.name.clone(), signature);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    /// Signature for `name`, or `FunctionDoesNotExist`
    pub fn lookup(&self, name: &str) -> PlannerResult<&FunctionSignature> {
        self.get(name)
            .ok_or_else(|| PlannerError::FunctionDoesNotExist(name.to_string()))
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|sig| sig.kind == FunctionKind::Aggregate)
    }
}

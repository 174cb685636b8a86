/// Standard SQL function registry
///
/// Describes the functions the converter knows how to type. Unknown
/// functions pass through unchanged and are typed from an explicit return
/// type or their first argument.
use std::collections::HashMap;

use super::value_mapping::JdbcType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// Always the given type
    Fixed(JdbcType),
    /// Same type as the first argument
    FirstArgument,
    /// Numeric widening of the first argument (SUM)
    Widened,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDescriptor {
    pub name: &'static str,
    pub aggregate: bool,
    pub return_type: ReturnType,
    pub min_arguments: usize,
}

/// Get the descriptor for a function name (case-insensitive)
pub fn get_function_descriptor(name: &str) -> Option<FunctionDescriptor> {
    let name_lower = name.to_lowercase();
    FUNCTIONS.get(name_lower.as_str()).copied()
}

/// SUM widens integral types to BIGINT and decimals stay decimal.
pub fn widen(jdbc_type: JdbcType) -> JdbcType {
    match jdbc_type {
        JdbcType::Integer | JdbcType::Bigint => JdbcType::Bigint,
        JdbcType::Decimal => JdbcType::Decimal,
        _ => JdbcType::Double,
    }
}

lazy_static::lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, FunctionDescriptor> = {
        let mut m = HashMap::new();
        let mut add = |name: &'static str, aggregate: bool, return_type: ReturnType, min_arguments: usize| {
            m.insert(name, FunctionDescriptor { name, aggregate, return_type, min_arguments });
        };

        // ===== AGGREGATES =====
        add("count", true, ReturnType::Fixed(JdbcType::Bigint), 1);
        add("sum", true, ReturnType::Widened, 1);
        add("avg", true, ReturnType::Fixed(JdbcType::Double), 1);
        add("min", true, ReturnType::FirstArgument, 1);
        add("max", true, ReturnType::FirstArgument, 1);

        // ===== STRING FUNCTIONS =====
        add("upper", false, ReturnType::Fixed(JdbcType::Varchar), 1);
        add("lower", false, ReturnType::Fixed(JdbcType::Varchar), 1);
        add("trim", false, ReturnType::Fixed(JdbcType::Varchar), 1);
        add("concat", false, ReturnType::Fixed(JdbcType::Varchar), 1);
        add("substring", false, ReturnType::Fixed(JdbcType::Varchar), 2);
        add("length", false, ReturnType::Fixed(JdbcType::Integer), 1);
        add("locate", false, ReturnType::Fixed(JdbcType::Integer), 2);

        // ===== NUMERIC FUNCTIONS =====
        add("abs", false, ReturnType::FirstArgument, 1);
        add("mod", false, ReturnType::FirstArgument, 2);
        add("sqrt", false, ReturnType::Fixed(JdbcType::Double), 1);

        // ===== NULL HANDLING =====
        add("coalesce", false, ReturnType::FirstArgument, 1);
        add("nullif", false, ReturnType::FirstArgument, 2);

        // ===== DATETIME FUNCTIONS =====
        add("current_date", false, ReturnType::Fixed(JdbcType::Date), 0);
        add("current_timestamp", false, ReturnType::Fixed(JdbcType::Timestamp), 0);

        m
    };
}

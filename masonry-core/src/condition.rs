use crate::{
    Branch, Condition, ConfigError, Error, Model, Operand, Operator, Result, SearchCell,
    SearchList, Value, util::separated_by,
};

/// Compiled condition: SQL text with `?` placeholders and the values bound to them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

pub fn write_quoted(out: &mut String, identifier: &str) {
    out.push('"');
    out.push_str(&identifier.replace('"', "\"\""));
    out.push('"');
}

fn invalid(condition: &Condition, reason: impl Into<String>) -> Error {
    Error::new(ConfigError::InvalidCondition {
        field: condition.field.clone(),
        reason: reason.into(),
    })
}

fn bind(condition: &Condition, prototype: &Value, value: &Value) -> Result<Value> {
    if matches!(condition.op, Operator::Like | Operator::NotLike) {
        return Ok(value.clone());
    }
    value.convert_to(prototype).map_err(|e| {
        e.context(format!(
            "While binding {} to the condition on `{}`",
            value, condition.field
        ))
    })
}

fn compile_leaf(model: &Model, condition: &Condition) -> Result<Fragment> {
    let field = model.resolve_field(&condition.field)?;
    if field.ignore {
        return Err(invalid(condition, "the field is not mapped to a column"));
    }
    let mut sql = String::new();
    let mut args = Vec::new();
    let column = |sql: &mut String| write_quoted(sql, &field.column);
    match (&condition.op, &condition.operand) {
        (Operator::Null, Operand::None) => {
            column(&mut sql);
            sql.push_str(" IS NULL");
        }
        (Operator::NotNull, Operand::None) => {
            column(&mut sql);
            sql.push_str(" IS NOT NULL");
        }
        (Operator::Between | Operator::NotBetween, Operand::Pair(low, high)) => {
            column(&mut sql);
            sql.push_str(if condition.op == Operator::Between {
                " BETWEEN ? AND ?"
            } else {
                " NOT BETWEEN ? AND ?"
            });
            args.push(bind(condition, &field.value, low)?);
            args.push(bind(condition, &field.value, high)?);
        }
        (Operator::In, Operand::List(values)) if values.is_empty() => sql.push_str("1 = 0"),
        (Operator::NotIn, Operand::List(values)) if values.is_empty() => sql.push_str("1 = 1"),
        (Operator::In | Operator::NotIn, Operand::List(values)) => {
            column(&mut sql);
            sql.push_str(if condition.op == Operator::In {
                " IN ("
            } else {
                " NOT IN ("
            });
            separated_by(&mut sql, values, |out, _| out.push('?'), ", ");
            sql.push(')');
            for value in values {
                args.push(bind(condition, &field.value, value)?);
            }
        }
        (op, Operand::Single(value)) => {
            let symbol = match op {
                Operator::Equal => "=",
                Operator::NotEqual => "<>",
                Operator::Greater => ">",
                Operator::GreaterEqual => ">=",
                Operator::Less => "<",
                Operator::LessEqual => "<=",
                Operator::Like => "LIKE",
                Operator::NotLike => "NOT LIKE",
                op => return Err(invalid(condition, format!("{op:?} takes no single value"))),
            };
            if value.is_null() && matches!(op, Operator::Equal | Operator::NotEqual) {
                return Err(invalid(
                    condition,
                    "comparing with NULL never matches, use a null condition",
                ));
            }
            column(&mut sql);
            sql.push(' ');
            sql.push_str(symbol);
            sql.push_str(" ?");
            args.push(bind(condition, &field.value, value)?);
        }
        (op, operand) => {
            return Err(invalid(
                condition,
                format!("{op:?} cannot take the operand {operand:?}"),
            ));
        }
    }
    Ok(Fragment { sql, args })
}

/// Evaluates the postfix list, resolving field names through `model`.
pub fn compile(search: &SearchList, model: &Model) -> Result<Fragment> {
    let mut stack: Vec<Fragment> = Vec::new();
    let malformed = |position: usize| {
        Error::msg(format!(
            "Malformed search list on `{}`: operand missing at cell {}",
            model.name(),
            position
        ))
    };
    for (position, cell) in search.cells().iter().enumerate() {
        match cell {
            SearchCell::Leaf(condition) => stack.push(compile_leaf(model, condition)?),
            SearchCell::Branch(Branch::Ignore) => {}
            SearchCell::Branch(Branch::Not) => {
                let operand = stack.pop().ok_or_else(|| malformed(position))?;
                stack.push(Fragment {
                    sql: format!("NOT ({})", operand.sql),
                    args: operand.args,
                });
            }
            SearchCell::Branch(branch) => {
                let r = stack.pop().ok_or_else(|| malformed(position))?;
                let mut l = stack.pop().ok_or_else(|| malformed(position))?;
                l.sql = if *branch == Branch::Or {
                    format!("({} OR {})", l.sql, r.sql)
                } else {
                    format!("{} AND {}", l.sql, r.sql)
                };
                l.args.extend(r.args);
                stack.push(l);
            }
        }
    }
    match stack.len() {
        0 | 1 => Ok(stack.pop().unwrap_or_default()),
        n => Err(Error::msg(format!(
            "Malformed search list on `{}`: {} operands left without a branch",
            model.name(),
            n
        ))),
    }
}

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Between,
    NotBetween,
    In,
    NotIn,
    Like,
    NotLike,
    Null,
    NotNull,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Single(Value),
    Pair(Value, Value),
    List(Vec<Value>),
}

/// Leaf of a search list: `field op operand`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub operand: Operand,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Operator, operand: Operand) -> Self {
        Self {
            field: field.into(),
            op,
            operand,
        }
    }
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Equal, Operand::Single(value.into()))
    }
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::NotEqual, Operand::Single(value.into()))
    }
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Greater, Operand::Single(value.into()))
    }
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::GreaterEqual, Operand::Single(value.into()))
    }
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Less, Operand::Single(value.into()))
    }
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::LessEqual, Operand::Single(value.into()))
    }
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::new(
            field,
            Operator::Between,
            Operand::Pair(low.into(), high.into()),
        )
    }
    pub fn not_between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::new(
            field,
            Operator::NotBetween,
            Operand::Pair(low.into(), high.into()),
        )
    }
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(
            field,
            Operator::In,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }
    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(
            field,
            Operator::NotIn,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(
            field,
            Operator::Like,
            Operand::Single(Value::Varchar(Some(pattern.into()))),
        )
    }
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(
            field,
            Operator::NotLike,
            Operand::Single(Value::Varchar(Some(pattern.into()))),
        )
    }
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Null, Operand::None)
    }
    pub fn not_null(field: impl Into<String>) -> Self {
        Self::new(field, Operator::NotNull, Operand::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    And,
    Or,
    Not,
    /// Seals an appended group, it evaluates to nothing.
    Ignore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchCell {
    Leaf(Condition),
    Branch(Branch),
}

/// Boolean filter in postfix order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SearchList {
    cells: Vec<SearchCell>,
}

impl SearchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// List made of the raw cells, evaluated as is.
    pub fn from_cells(cells: Vec<SearchCell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[SearchCell] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Names of every field the conditions reference.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().filter_map(|cell| match cell {
            SearchCell::Leaf(condition) => Some(condition.field.as_str()),
            SearchCell::Branch(..) => None,
        })
    }

    /// Conjunction with `condition`. A trailing `OR` is reopened so `AND` binds tighter.
    pub fn and(mut self, condition: Condition) -> Self {
        self.push_and(vec![SearchCell::Leaf(condition)]);
        self
    }

    pub fn or(mut self, condition: Condition) -> Self {
        self.push_binary(vec![SearchCell::Leaf(condition)], Branch::Or);
        self
    }

    /// Conjunction with a parenthesized group.
    pub fn and_group(mut self, group: SearchList) -> Self {
        if !group.is_empty() {
            self.push_and(sealed(group));
        }
        self
    }

    /// Disjunction with a parenthesized group.
    pub fn or_group(mut self, group: SearchList) -> Self {
        if !group.is_empty() {
            self.push_binary(sealed(group), Branch::Or);
        }
        self
    }

    /// Negates everything composed so far.
    pub fn not(mut self) -> Self {
        if !self.is_empty() {
            self.cells.push(SearchCell::Branch(Branch::Not));
            self.cells.push(SearchCell::Branch(Branch::Ignore));
        }
        self
    }

    fn push_and(&mut self, operand: Vec<SearchCell>) {
        if self.cells.last() == Some(&SearchCell::Branch(Branch::Or)) {
            self.cells.pop();
            self.cells.extend(operand);
            self.cells.push(SearchCell::Branch(Branch::And));
            self.cells.push(SearchCell::Branch(Branch::Or));
        } else {
            self.push_binary(operand, Branch::And);
        }
    }

    fn push_binary(&mut self, operand: Vec<SearchCell>, branch: Branch) {
        let empty = self.is_empty();
        self.cells.extend(operand);
        if !empty {
            self.cells.push(SearchCell::Branch(branch));
        }
    }
}

fn sealed(group: SearchList) -> Vec<SearchCell> {
    let mut cells = group.cells;
    if cells.last() != Some(&SearchCell::Branch(Branch::Ignore)) {
        cells.push(SearchCell::Branch(Branch::Ignore));
    }
    cells
}

impl From<Condition> for SearchList {
    fn from(condition: Condition) -> Self {
        SearchList::new().and(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(field: &str) -> SearchCell {
        SearchCell::Leaf(Condition::is_null(field))
    }
    const AND: SearchCell = SearchCell::Branch(Branch::And);
    const OR: SearchCell = SearchCell::Branch(Branch::Or);
    const IGNORE: SearchCell = SearchCell::Branch(Branch::Ignore);

    #[test]
    fn and_reopens_a_trailing_or() {
        let list = SearchList::new()
            .and(Condition::is_null("a"))
            .or(Condition::is_null("b"))
            .and(Condition::is_null("c"));
        assert_eq!(
            list.cells(),
            &[leaf("a"), leaf("b"), leaf("c"), AND, OR]
        );
    }

    #[test]
    fn groups_are_sealed() {
        let group = SearchList::new()
            .and(Condition::is_null("a"))
            .or(Condition::is_null("b"));
        let list = SearchList::new()
            .and_group(group)
            .and(Condition::is_null("c"));
        assert_eq!(
            list.cells(),
            &[leaf("a"), leaf("b"), OR, IGNORE, leaf("c"), AND]
        );
        assert_eq!(list.fields().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn empty_groups_vanish() {
        let list = SearchList::new()
            .and_group(SearchList::new())
            .or_group(SearchList::new())
            .not();
        assert!(list.is_empty());
    }
}

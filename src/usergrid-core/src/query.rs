//! Query builder
//!
//! [`UsergridQuery`] compiles a chain of filter, sort and paging operations
//! into the URL fragment the backend expects:
//!
//! ```text
//! ?limit=<n>&<url terms>&cursor=<c>&ql=select * where <clauses> order by <sorts>
//! ```
//!
//! Every segment is emitted only when it carries something. Clauses render
//! in insertion order; consecutive clauses without an explicit conjunction
//! are joined with `and`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;

use crate::models::{QueryOperator, SortOrder, DEFAULT_LIMIT};

/// Characters left as-is inside an encoded `ql` value
const QL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'*');

const SELECT_ALL: &str = "select *";

/// A literal on the right-hand side of a clause
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl QueryValue {
    fn render(&self) -> String {
        match self {
            QueryValue::String(s) => quote(s),
            QueryValue::Int(i) => i.to_string(),
            QueryValue::Float(f) => f.to_string(),
            QueryValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::String(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::String(value)
    }
}

impl From<&String> for QueryValue {
    fn from(value: &String) -> Self {
        QueryValue::String(value.clone())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

impl From<f32> for QueryValue {
    fn from(value: f32) -> Self {
        QueryValue::Float(value as f64)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

macro_rules! int_query_value {
    ($($t:ty),*) => {
        $(impl From<$t> for QueryValue {
            fn from(value: $t) -> Self {
                QueryValue::Int(value as i64)
            }
        })*
    };
}

int_query_value!(i8, i16, i32, i64, u8, u16, u32, isize);

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Requirement(String),
    And,
    Or,
    Not,
}

#[must_use]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsergridQuery {
    collection: Option<String>,
    clauses: Vec<Clause>,
    sorts: Vec<(String, SortOrder)>,
    limit: Option<u32>,
    cursor: Option<String>,
    url_terms: Vec<String>,
    from_string: Option<String>,
}

impl UsergridQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Self::default()
        }
    }

    /// Use a pre-built `ql` string verbatim. All other state is ignored when
    /// rendering.
    pub fn from_string(ql: impl Into<String>) -> Self {
        Self {
            from_string: Some(ql.into()),
            ..Self::default()
        }
    }

    /// Built with [`from_string`](Self::from_string)
    pub fn is_raw(&self) -> bool {
        self.from_string.is_some()
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn limit_value(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn cursor_value(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Alias of [`collection`](Self::collection)
    pub fn type_(self, name: impl Into<String>) -> Self {
        self.collection(name)
    }

    pub fn eq(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.op(term, QueryOperator::Equal, value)
    }

    pub fn equals(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.eq(term, value)
    }

    pub fn filter(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.eq(term, value)
    }

    pub fn gt(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.op(term, QueryOperator::GreaterThan, value)
    }

    pub fn greater_than(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.gt(term, value)
    }

    pub fn gte(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.op(term, QueryOperator::GreaterThanEqualTo, value)
    }

    pub fn greater_than_or_equal(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.gte(term, value)
    }

    pub fn lt(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.op(term, QueryOperator::LessThan, value)
    }

    pub fn less_than(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.lt(term, value)
    }

    pub fn lte(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.op(term, QueryOperator::LessThanEqualTo, value)
    }

    pub fn less_than_or_equal(self, term: &str, value: impl Into<QueryValue>) -> Self {
        self.lte(term, value)
    }

    /// `term <op> value`
    pub fn op(self, term: &str, operator: QueryOperator, value: impl Into<QueryValue>) -> Self {
        let rendered = format!("{} {} {}", term, operator.as_str(), value.into().render());
        self.requirement(rendered)
    }

    /// `term contains 'value'`
    pub fn contains(self, term: &str, value: &str) -> Self {
        let rendered = format!("{} contains {}", term, quote(value));
        self.requirement(rendered)
    }

    pub fn contains_string(self, term: &str, value: &str) -> Self {
        self.contains(term, value)
    }

    pub fn contains_word(self, term: &str, value: &str) -> Self {
        self.contains(term, value)
    }

    /// `location within <distance> of <lat>,<long>`
    pub fn location_within(self, distance: f64, latitude: f64, longitude: f64) -> Self {
        let rendered = format!("location within {} of {},{}", distance, latitude, longitude);
        self.requirement(rendered)
    }

    /// Raw clause, combined like any other
    pub fn ql(self, clause: impl Into<String>) -> Self {
        self.requirement(clause.into())
    }

    pub fn and(self) -> Self {
        self.conjunction(Clause::And)
    }

    pub fn or(self) -> Self {
        self.conjunction(Clause::Or)
    }

    /// Negate the next clause. After a clause this reads `and not`.
    pub fn not(self) -> Self {
        self.conjunction(Clause::Not)
    }

    /// Sort on `term`. Re-sorting a term replaces its order in place.
    pub fn sort(mut self, term: &str, order: SortOrder) -> Self {
        match self.sorts.iter_mut().find(|(t, _)| t == term) {
            Some(existing) => existing.1 = order,
            None => self.sorts.push((term.to_string(), order)),
        }
        self
    }

    pub fn asc(self, term: &str) -> Self {
        self.sort(term, SortOrder::Asc)
    }

    pub fn ascending(self, term: &str) -> Self {
        self.asc(term)
    }

    pub fn desc(self, term: &str) -> Self {
        self.sort(term, SortOrder::Desc)
    }

    pub fn descending(self, term: &str) -> Self {
        self.desc(term)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor.filter(|c| !c.is_empty());
        self
    }

    /// Literal `key=value` outside of `ql`. A `ql` key is treated as a clause.
    pub fn url_term(self, key: &str, value: &str) -> Self {
        if key == "ql" {
            return self.ql(value);
        }
        let mut query = self;
        query.url_terms.push(format!("{}={}", key, value));
        query
    }

    fn requirement(mut self, clause: String) -> Self {
        self.clauses.push(Clause::Requirement(clause));
        self
    }

    fn conjunction(mut self, marker: Clause) -> Self {
        let allowed = match self.clauses.last() {
            Some(Clause::Requirement(_)) => true,
            Some(Clause::And) | Some(Clause::Or) => marker == Clause::Not,
            _ => false,
        };
        if allowed {
            self.clauses.push(marker);
        }
        self
    }

    fn requirements_string(&self) -> String {
        let mut clauses: &[Clause] = &self.clauses;
        while let Some(Clause::And | Clause::Or | Clause::Not) = clauses.last() {
            clauses = &clauses[..clauses.len() - 1];
        }

        let mut words: Vec<&str> = Vec::with_capacity(clauses.len() * 2);
        let mut previous: Option<&Clause> = None;
        for clause in clauses {
            match (previous, clause) {
                (Some(Clause::Requirement(_)), Clause::Requirement(text)) => {
                    words.push("and");
                    words.push(text);
                }
                (_, Clause::Requirement(text)) => words.push(text),
                (Some(Clause::Requirement(_)), Clause::Not) => words.push("and not"),
                (_, Clause::Not) => words.push("not"),
                (_, Clause::And) => words.push("and"),
                (_, Clause::Or) => words.push("or"),
            }
            previous = Some(clause);
        }
        words.join(" ")
    }

    fn order_by_string(&self) -> String {
        self.sorts
            .iter()
            .map(|(term, order)| format!("{} {}", term, order.as_str()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The full `ql` expression, if there is anything to select on
    pub fn ql_string(&self) -> Option<String> {
        if let Some(raw) = &self.from_string {
            return Some(raw.clone());
        }
        let requirements = self.requirements_string();
        let order_by = self.order_by_string();
        if requirements.is_empty() && order_by.is_empty() {
            return None;
        }

        let mut ql = SELECT_ALL.to_string();
        if !requirements.is_empty() {
            ql.push_str(" where ");
            ql.push_str(&requirements);
        }
        if !order_by.is_empty() {
            ql.push_str(" order by ");
            ql.push_str(&order_by);
        }
        Some(ql)
    }

    /// Render the URL fragment with `ql` percent-encoded
    pub fn build(&self) -> String {
        self.build_with(true)
    }

    pub fn build_with(&self, auto_encode: bool) -> String {
        let encode = |s: &str| -> String {
            if auto_encode {
                utf8_percent_encode(s, QL_ENCODE_SET).to_string()
            } else {
                s.to_string()
            }
        };

        if let Some(raw) = &self.from_string {
            return format!("?ql={}", encode(raw));
        }

        let mut segments: Vec<String> = Vec::new();
        if let Some(limit) = self.limit.filter(|l| *l != DEFAULT_LIMIT) {
            segments.push(format!("limit={}", limit));
        }
        segments.extend(self.url_terms.iter().cloned());
        if let Some(cursor) = &self.cursor {
            segments.push(format!("cursor={}", encode(cursor)));
        }
        if let Some(ql) = self.ql_string() {
            segments.push(format!("ql={}", encode(&ql)));
        }

        if segments.is_empty() {
            String::new()
        } else {
            format!("?{}", segments.join("&"))
        }
    }
}

impl fmt::Display for UsergridQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build_with(false))
    }
}

/// A canonical 36-character UUID
pub fn is_uuid(value: &str) -> bool {
    value.len() == 36 && uuid::Uuid::parse_str(value).is_ok()
}

fn quote(value: &str) -> String {
    if is_uuid(value) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "\\'"))
    }
}

//! Declarative aggregation pipeline over event documents.
//!
//! A pipeline is an ordered list of stages (match, group, sort, limit)
//! evaluated over JSON documents produced by [`Event::to_document`].
//! Field paths are dot-separated (`eventData.productId`).
//!
//! [`Event::to_document`]: crate::events::Event::to_document

use chrono::DateTime;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::events::fields;

/// Document predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Field present and not null (`true`) or absent/null (`false`).
    Exists(String, bool),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Self::Eq(path.to_string(), value.into())
    }

    pub fn one_of(path: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::In(path.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn gte(path: &str, value: impl Into<Value>) -> Self {
        Self::Gte(path.to_string(), value.into())
    }

    pub fn lt(path: &str, value: impl Into<Value>) -> Self {
        Self::Lt(path.to_string(), value.into())
    }

    pub fn lte(path: &str, value: impl Into<Value>) -> Self {
        Self::Lte(path.to_string(), value.into())
    }

    pub fn exists(path: &str) -> Self {
        Self::Exists(path.to_string(), true)
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::Eq(path, expected) => lookup(doc, path)
                .map(|v| values_equal(v, expected))
                .unwrap_or(expected.is_null()),
            Self::In(path, options) => {
                let actual = lookup(doc, path).unwrap_or(&Value::Null);
                options.iter().any(|o| values_equal(actual, o))
            }
            Self::Gte(path, bound) => compare_bound(doc, path, bound)
                .map(|o| o != Ordering::Less)
                .unwrap_or(false),
            Self::Lt(path, bound) => compare_bound(doc, path, bound)
                .map(|o| o == Ordering::Less)
                .unwrap_or(false),
            Self::Lte(path, bound) => compare_bound(doc, path, bound)
                .map(|o| o != Ordering::Greater)
                .unwrap_or(false),
            Self::Exists(path, wanted) => {
                let present = lookup(doc, path).map(|v| !v.is_null()).unwrap_or(false);
                present == *wanted
            }
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Value computed from a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    /// Epoch-millisecond field formatted as `YYYY-MM-DD` (UTC).
    Day(String),
    Literal(Value),
    Object(Vec<(String, Expr)>),
}

impl Expr {
    pub fn field(path: &str) -> Self {
        Self::Field(path.to_string())
    }

    pub fn day(path: &str) -> Self {
        Self::Day(path.to_string())
    }

    pub fn object<'a>(entries: impl IntoIterator<Item = (&'a str, Expr)>) -> Self {
        Self::Object(
            entries
                .into_iter()
                .map(|(name, expr)| (name.to_string(), expr))
                .collect(),
        )
    }

    pub fn eval(&self, doc: &Value) -> Value {
        match self {
            Self::Field(path) => lookup(doc, path).cloned().unwrap_or(Value::Null),
            Self::Day(path) => lookup(doc, path)
                .and_then(Value::as_i64)
                .and_then(DateTime::from_timestamp_millis)
                .map(|ts| Value::String(ts.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            Self::Literal(value) => value.clone(),
            Self::Object(entries) => {
                let mut map = Map::new();
                for (name, expr) in entries {
                    map.insert(name.clone(), expr.eval(doc));
                }
                Value::Object(map)
            }
        }
    }
}

/// Grouping key. `All` folds every document into a single `_id: null` row.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    All,
    By(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count,
    Sum(Expr),
    /// Null when no numeric input was seen.
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    First(Expr),
    Last(Expr),
    Push(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: GroupKey,
    pub accumulators: Vec<(String, Accumulator)>,
}

impl Group {
    pub fn by(key: Expr) -> Self {
        Self {
            key: GroupKey::By(key),
            accumulators: Vec::new(),
        }
    }

    pub fn all() -> Self {
        Self {
            key: GroupKey::All,
            accumulators: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, accumulator: Accumulator) -> Self {
        self.accumulators.push((name.to_string(), accumulator));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub path: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(path: &str) -> Self {
        Self {
            path: path.to_string(),
            descending: false,
        }
    }

    pub fn desc(path: &str) -> Self {
        Self {
            path: path.to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group(Group),
    Sort(Vec<SortKey>),
    Limit(usize),
}

/// Ordered list of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.stages.push(Stage::Group(group));
        self
    }

    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.stages.push(Stage::Sort(keys));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.stages.push(Stage::Limit(n));
        self
    }

    /// Evaluate every stage in order.
    pub fn run(&self, docs: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut rows: Vec<Value> = docs.into_iter().collect();
        for stage in &self.stages {
            rows = match stage {
                Stage::Match(filter) => rows.into_iter().filter(|d| filter.matches(d)).collect(),
                Stage::Group(group) => run_group(group, &rows),
                Stage::Sort(keys) => {
                    rows.sort_by(|a, b| compare_rows(a, b, keys));
                    rows
                }
                Stage::Limit(n) => {
                    rows.truncate(*n);
                    rows
                }
            };
        }
        rows
    }

    /// Storage-level narrowing derived from the leading match stage.
    pub fn scan_hint(&self) -> ScanHint {
        let mut hint = ScanHint::default();
        if let Some(Stage::Match(filter)) = self.stages.first() {
            hint.collect(filter);
        }
        hint
    }
}

/// Conditions a backend may push down before running the pipeline.
///
/// A hint only narrows the scan; the full pipeline still runs on the
/// result, so an empty hint is always correct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanHint {
    pub user_id: Option<String>,
    pub event_names: Option<Vec<String>>,
    /// Inclusive lower bound, epoch ms.
    pub created_from: Option<i64>,
    /// Exclusive upper bound, epoch ms.
    pub created_before: Option<i64>,
}

impl ScanHint {
    fn collect(&mut self, filter: &Filter) {
        match filter {
            Filter::And(filters) => filters.iter().for_each(|f| self.collect(f)),
            Filter::Eq(path, Value::String(s)) if path == fields::USER_ID => {
                self.user_id = Some(s.clone());
            }
            Filter::Eq(path, Value::String(s)) if path == fields::EVENT_NAME => {
                self.event_names = Some(vec![s.clone()]);
            }
            Filter::In(path, values) if path == fields::EVENT_NAME => {
                let names: Option<Vec<String>> =
                    values.iter().map(|v| v.as_str().map(String::from)).collect();
                self.event_names = names;
            }
            Filter::Gte(path, bound) if path == fields::CREATED_AT => {
                self.created_from = bound.as_i64();
            }
            Filter::Lt(path, bound) if path == fields::CREATED_AT => {
                self.created_before = bound.as_i64();
            }
            Filter::Lte(path, bound) if path == fields::CREATED_AT => {
                self.created_before = bound.as_i64().map(|ms| ms + 1);
            }
            _ => {}
        }
    }
}

/// Resolve a dot-separated path inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order across JSON values: null, numbers, strings, then the rest.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ if type_rank(a) != type_rank(b) => type_rank(a).cmp(&type_rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b) && compare_values(a, b) == Ordering::Equal
}

/// Range comparisons only apply between values of the same type.
fn compare_bound(doc: &Value, path: &str, bound: &Value) -> Option<Ordering> {
    let actual = lookup(doc, path)?;
    if type_rank(actual) != type_rank(bound) || actual.is_null() {
        return None;
    }
    Some(compare_values(actual, bound))
}

fn compare_rows(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = lookup(a, &key.path).unwrap_or(&Value::Null);
        let right = lookup(b, &key.path).unwrap_or(&Value::Null);
        let ord = compare_values(left, right);
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Running state of one accumulator within one group.
enum AccState {
    Count(u64),
    /// Stays integral while every input is an integer.
    Sum { total: f64, integral: Option<i64> },
    Avg { total: f64, n: u64 },
    Extreme(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Count => Self::Count(0),
            Accumulator::Sum(_) => Self::Sum {
                total: 0.0,
                integral: Some(0),
            },
            Accumulator::Avg(_) => Self::Avg { total: 0.0, n: 0 },
            Accumulator::Min(_) | Accumulator::Max(_) => Self::Extreme(None),
            Accumulator::First(_) => Self::First(None),
            Accumulator::Last(_) => Self::Last(Value::Null),
            Accumulator::Push(_) => Self::Push(Vec::new()),
        }
    }

    fn update(&mut self, acc: &Accumulator, doc: &Value) {
        match (self, acc) {
            (Self::Count(n), Accumulator::Count) => *n += 1,
            (Self::Sum { total, integral }, Accumulator::Sum(expr)) => {
                let value = expr.eval(doc);
                if let Some(x) = value.as_f64() {
                    *total += x;
                    *integral = match (*integral, value.as_i64()) {
                        (Some(sum), Some(i)) => sum.checked_add(i),
                        _ => None,
                    };
                }
            }
            (Self::Avg { total, n }, Accumulator::Avg(expr)) => {
                if let Some(x) = expr.eval(doc).as_f64() {
                    *total += x;
                    *n += 1;
                }
            }
            (Self::Extreme(current), Accumulator::Min(expr) | Accumulator::Max(expr)) => {
                let value = expr.eval(doc);
                if value.is_null() {
                    return;
                }
                let wanted = if matches!(acc, Accumulator::Min(_)) {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match current.as_ref() {
                    None => true,
                    Some(existing) => compare_values(&value, existing) == wanted,
                };
                if replace {
                    *current = Some(value);
                }
            }
            (Self::First(current), Accumulator::First(expr)) => {
                if current.is_none() {
                    *current = Some(expr.eval(doc));
                }
            }
            (Self::Last(current), Accumulator::Last(expr)) => *current = expr.eval(doc),
            (Self::Push(items), Accumulator::Push(expr)) => items.push(expr.eval(doc)),
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            Self::Count(n) => Value::from(n),
            Self::Sum {
                integral: Some(sum), ..
            } => Value::from(sum),
            Self::Sum { total, .. } => number(total),
            Self::Avg { total, n } if n > 0 => number(total / n as f64),
            Self::Avg { .. } => Value::Null,
            Self::Extreme(value) | Self::First(value) => value.unwrap_or(Value::Null),
            Self::Last(value) => value,
            Self::Push(items) => Value::Array(items),
        }
    }
}

fn number(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

fn run_group(group: &Group, docs: &[Value]) -> Vec<Value> {
    // Groups come out in first-seen order.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

    for doc in docs {
        let key = match &group.key {
            GroupKey::All => Value::Null,
            GroupKey::By(expr) => expr.eval(doc),
        };
        let slot = *index.entry(key.to_string()).or_insert_with(|| {
            let states = group.accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect();
            groups.push((key, states));
            groups.len() - 1
        });

        let (_, states) = &mut groups[slot];
        for (state, (_, acc)) in states.iter_mut().zip(&group.accumulators) {
            state.update(acc, doc);
        }
    }

    groups
        .into_iter()
        .map(|(key, states)| {
            let mut row = Map::new();
            row.insert("_id".to_string(), key);
            for (state, (name, _)) in states.into_iter().zip(&group.accumulators) {
                row.insert(name.clone(), state.finish());
            }
            Value::Object(row)
        })
        .collect()
}

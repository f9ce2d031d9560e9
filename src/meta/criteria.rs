//! Selection criteria for catalog queries.
//!
//! The query language that produces these trees lives outside the store; the
//! catalog only evaluates the resulting expression against Meta fields.

use serde::{Deserialize, Serialize};

use super::model::{Meta, MetaId, Status};

/// Anything that can decide whether a Meta is selected.
pub trait MetaFilter {
    fn matches(&self, meta: &Meta) -> bool;
}

impl<F> MetaFilter for F
where
    F: Fn(&Meta) -> bool,
{
    fn matches(&self, meta: &Meta) -> bool {
        self(meta)
    }
}

/// Named Meta fields available to criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaField {
    Id,
    Feed,
    Type,
    Status,
    ParentId,
    ProcessorId,
    ProcessorTaskId,
    PipelineId,
    CreatedAt,
    EffectiveAt,
    StatusChangedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermValue {
    Number(u64),
    Text(String),
}

impl From<u64> for TermValue {
    fn from(value: u64) -> Self {
        TermValue::Number(value)
    }
}

impl From<&str> for TermValue {
    fn from(value: &str) -> Self {
        TermValue::Text(value.to_string())
    }
}

impl From<String> for TermValue {
    fn from(value: String) -> Self {
        TermValue::Text(value)
    }
}

impl From<Status> for TermValue {
    fn from(value: Status) -> Self {
        TermValue::Text(value.as_str().to_string())
    }
}

/// Boolean expression tree over Meta fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Criteria {
    All,
    And { children: Vec<Criteria> },
    Or { children: Vec<Criteria> },
    Not { child: Box<Criteria> },
    Term {
        field: MetaField,
        condition: Condition,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<TermValue>,
    },
}

impl Criteria {
    pub fn term(field: MetaField, condition: Condition, value: impl Into<TermValue>) -> Self {
        Criteria::Term {
            field,
            condition,
            value: Some(value.into()),
        }
    }

    pub fn eq(field: MetaField, value: impl Into<TermValue>) -> Self {
        Self::term(field, Condition::Equals, value)
    }

    pub fn feed(feed_name: impl Into<String>) -> Self {
        Self::eq(MetaField::Feed, TermValue::Text(feed_name.into()))
    }

    pub fn type_name(type_name: impl Into<String>) -> Self {
        Self::eq(MetaField::Type, TermValue::Text(type_name.into()))
    }

    pub fn status(status: Status) -> Self {
        Self::eq(MetaField::Status, status)
    }

    pub fn id(id: MetaId) -> Self {
        Self::eq(MetaField::Id, id)
    }

    pub fn is_null(field: MetaField) -> Self {
        Criteria::Term {
            field,
            condition: Condition::IsNull,
            value: None,
        }
    }

    pub fn and(self, other: Criteria) -> Self {
        match self {
            Criteria::All => other,
            Criteria::And { mut children } => {
                children.push(other);
                Criteria::And { children }
            }
            first => Criteria::And {
                children: vec![first, other],
            },
        }
    }

    pub fn or(self, other: Criteria) -> Self {
        match self {
            Criteria::Or { mut children } => {
                children.push(other);
                Criteria::Or { children }
            }
            first => Criteria::Or {
                children: vec![first, other],
            },
        }
    }

    pub fn negate(self) -> Self {
        Criteria::Not {
            child: Box::new(self),
        }
    }
}

impl MetaFilter for Criteria {
    fn matches(&self, meta: &Meta) -> bool {
        match self {
            Criteria::All => true,
            Criteria::And { children } => children.iter().all(|child| child.matches(meta)),
            Criteria::Or { children } => children.iter().any(|child| child.matches(meta)),
            Criteria::Not { child } => !child.matches(meta),
            Criteria::Term {
                field,
                condition,
                value,
            } => evaluate(field_value(meta, *field), *condition, value.as_ref()),
        }
    }
}

fn field_value(meta: &Meta, field: MetaField) -> Option<TermValue> {
    match field {
        MetaField::Id => Some(TermValue::Number(meta.id)),
        MetaField::Feed => Some(TermValue::Text(meta.feed_name.clone())),
        MetaField::Type => Some(TermValue::Text(meta.type_name.clone())),
        MetaField::Status => Some(meta.status.into()),
        MetaField::ParentId => meta.parent_meta_id.map(TermValue::Number),
        MetaField::ProcessorId => meta.processor_id.map(TermValue::Number),
        MetaField::ProcessorTaskId => meta.processor_task_id.map(TermValue::Number),
        MetaField::PipelineId => meta.pipeline_id.clone().map(TermValue::Text),
        MetaField::CreatedAt => Some(TermValue::Number(meta.created_at_ms)),
        MetaField::EffectiveAt => meta.effective_at_ms.map(TermValue::Number),
        MetaField::StatusChangedAt => Some(TermValue::Number(meta.status_changed_at_ms)),
    }
}

fn evaluate(actual: Option<TermValue>, condition: Condition, expected: Option<&TermValue>) -> bool {
    use std::cmp::Ordering;

    match condition {
        Condition::IsNull => return actual.is_none(),
        Condition::IsNotNull => return actual.is_some(),
        _ => {}
    }
    let (actual, expected) = match (actual, expected) {
        (Some(actual), Some(expected)) => (actual, expected),
        _ => return false,
    };
    let ordering = match (&actual, expected) {
        (TermValue::Number(a), TermValue::Number(b)) => a.cmp(b),
        (TermValue::Text(a), TermValue::Text(b)) => a.as_str().cmp(b.as_str()),
        (TermValue::Number(a), TermValue::Text(b)) => match b.parse::<u64>() {
            Ok(b) => a.cmp(&b),
            Err(_) => return false,
        },
        (TermValue::Text(a), TermValue::Number(b)) => a.as_str().cmp(b.to_string().as_str()),
    };
    match condition {
        Condition::Equals => ordering == Ordering::Equal,
        Condition::NotEquals => ordering != Ordering::Equal,
        Condition::GreaterThan => ordering == Ordering::Greater,
        Condition::GreaterThanOrEqual => ordering != Ordering::Less,
        Condition::LessThan => ordering == Ordering::Less,
        Condition::LessThanOrEqual => ordering != Ordering::Greater,
        Condition::IsNull | Condition::IsNotNull => false,
    }
}

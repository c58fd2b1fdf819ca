//! # Query and Filter Engine
//!
//! One engine parameterized by entity: a case-insensitive text query over the
//! entity's searchable fields combined with categorical filters. Filters use
//! the sentinel `all` to mean "no constraint".
//!
//! Results are produced lazily from the collection version that was current
//! when [`search`] was called. Calling [`search`] again re-scans, so writes
//! committed in between are visible to the next query.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::RepositoryError;
use crate::models::{
    Courier, Issue, IssueStatus, IssueType, Priority, School, SchoolStatus, ShipmentStatus,
    ShippingStatus,
};
use crate::repositories::{Entity, Records};

/// Sentinel filter value matching every record
pub const ALL: &str = "all";

/// Raw filters as received from a caller: field name to value or `all`.
pub type Filters = BTreeMap<String, String>;

/// A single categorical constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter<T> {
    #[default]
    All,
    Only(T),
}

impl<T: PartialEq> Filter<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(expected) => expected == value,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Filter::Only(_))
    }
}

impl<T> FromStr for Filter<T>
where
    T: FromStr<Err = RepositoryError>,
{
    type Err = RepositoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == ALL {
            Ok(Filter::All)
        } else {
            value.parse().map(Filter::Only)
        }
    }
}

/// Free-text categorical values (product type, segment, state, school id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl FromStr for Text {
    type Err = RepositoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Text(value.to_string()))
    }
}

impl Filter<Text> {
    fn matches_str(&self, value: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(Text(expected)) => expected == value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchoolFilter {
    pub status: Filter<SchoolStatus>,
    pub product_type: Filter<Text>,
    pub segment: Filter<Text>,
    pub state: Filter<Text>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFilter {
    pub status: Filter<IssueStatus>,
    pub priority: Filter<Priority>,
    pub issue_type: Filter<IssueType>,
    pub school_id: Filter<Text>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingFilter {
    pub status: Filter<ShipmentStatus>,
    pub courier: Filter<Courier>,
}

/// Owning-issue facts a shipment search joins against
#[derive(Debug, Clone)]
struct IssueJoin {
    school_id: String,
    part_type: Option<String>,
}

/// Lookup tables for fields that live on related records.
#[derive(Debug, Clone, Default)]
pub struct Joins {
    school_names: HashMap<String, String>,
    issues: HashMap<String, IssueJoin>,
}

impl Joins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schools<I>(mut self, schools: I) -> Self
    where
        I: IntoIterator<Item = Arc<School>>,
    {
        self.school_names = schools
            .into_iter()
            .map(|school| (school.id.clone(), school.name.clone()))
            .collect();
        self
    }

    pub fn with_issues<I>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = Arc<Issue>>,
    {
        self.issues = issues
            .into_iter()
            .map(|issue| {
                (
                    issue.id.clone(),
                    IssueJoin {
                        school_id: issue.school_id.clone(),
                        part_type: issue.part_type().map(str::to_string),
                    },
                )
            })
            .collect();
        self
    }

    pub fn school_name(&self, school_id: &str) -> Option<&str> {
        self.school_names.get(school_id).map(String::as_str)
    }

    /// School name of the issue a shipment belongs to
    pub fn school_name_for_issue(&self, issue_id: &str) -> Option<&str> {
        self.issues
            .get(issue_id)
            .and_then(|issue| self.school_name(&issue.school_id))
    }

    /// Part being shipped, taken from the owning issue's hardware details
    pub fn part_description(&self, issue_id: &str) -> Option<&str> {
        self.issues
            .get(issue_id)
            .and_then(|issue| issue.part_type.as_deref())
    }
}

/// Entities the engine can search.
pub trait Searchable: Entity {
    type Filter: Clone + Default + Send + Sync;

    /// Filter field names accepted for this entity
    const FILTER_FIELDS: &'static [&'static str];

    /// Set one filter field from its raw value.
    fn set_filter(filter: &mut Self::Filter, field: &str, value: &str)
    -> Result<(), RepositoryError>;

    fn matches_filter(&self, filter: &Self::Filter) -> bool;

    /// Whether any searchable field contains `needle` (already lowercased).
    fn matches_text(&self, needle: &str, joins: &Joins) -> bool;

    fn parse_filters(filters: &Filters) -> Result<Self::Filter, RepositoryError> {
        let mut filter = Self::Filter::default();
        for (field, value) in filters {
            if !Self::FILTER_FIELDS.contains(&field.as_str()) {
                return Err(RepositoryError::validation_error(format!(
                    "unknown {} filter '{}'; supported: {}",
                    Self::KIND,
                    field,
                    Self::FILTER_FIELDS.join(", ")
                )));
            }
            Self::set_filter(&mut filter, field, value.trim())?;
        }
        Ok(filter)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl Searchable for School {
    type Filter = SchoolFilter;
    const FILTER_FIELDS: &'static [&'static str] = &["status", "productType", "segment", "state"];

    fn set_filter(
        filter: &mut SchoolFilter,
        field: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        match field {
            "status" => filter.status = value.parse()?,
            "productType" => filter.product_type = value.parse()?,
            "segment" => filter.segment = value.parse()?,
            _ => filter.state = value.parse()?,
        }
        Ok(())
    }

    fn matches_filter(&self, filter: &SchoolFilter) -> bool {
        filter.status.matches(&self.current_status)
            && filter.product_type.matches_str(&self.product_type)
            && filter.segment.matches_str(&self.segment)
            && filter.state.matches_str(&self.address.state)
    }

    fn matches_text(&self, needle: &str, _joins: &Joins) -> bool {
        contains_ci(&self.name, needle)
            || contains_ci(&self.deal_id, needle)
            || contains_ci(&self.address.city, needle)
    }
}

impl Searchable for Issue {
    type Filter = IssueFilter;
    const FILTER_FIELDS: &'static [&'static str] = &["status", "priority", "type", "schoolId"];

    fn set_filter(
        filter: &mut IssueFilter,
        field: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        match field {
            "status" => filter.status = value.parse()?,
            "priority" => filter.priority = value.parse()?,
            "type" => filter.issue_type = value.parse()?,
            _ => filter.school_id = value.parse()?,
        }
        Ok(())
    }

    fn matches_filter(&self, filter: &IssueFilter) -> bool {
        filter.status.matches(&self.status)
            && filter.priority.matches(&self.priority)
            && filter.issue_type.matches(&self.issue_type)
            && filter.school_id.matches_str(&self.school_id)
    }

    fn matches_text(&self, needle: &str, joins: &Joins) -> bool {
        contains_ci(&self.id, needle)
            || joins
                .school_name(&self.school_id)
                .is_some_and(|name| contains_ci(name, needle))
            || contains_ci(&self.issue_description, needle)
    }
}

impl Searchable for ShippingStatus {
    type Filter = ShippingFilter;
    const FILTER_FIELDS: &'static [&'static str] = &["status", "courier"];

    fn set_filter(
        filter: &mut ShippingFilter,
        field: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        match field {
            "status" => filter.status = value.parse()?,
            _ => filter.courier = value.parse()?,
        }
        Ok(())
    }

    fn matches_filter(&self, filter: &ShippingFilter) -> bool {
        filter.status.matches(&self.status) && filter.courier.matches(&self.courier)
    }

    fn matches_text(&self, needle: &str, joins: &Joins) -> bool {
        contains_ci(&self.tracking_number, needle)
            || joins
                .school_name_for_issue(&self.issue_id)
                .is_some_and(|name| contains_ci(name, needle))
            || joins
                .part_description(&self.issue_id)
                .is_some_and(|part| contains_ci(part, needle))
            || contains_ci(&self.issue_id, needle)
    }
}

/// A parsed text query plus filters for entity `E`.
#[derive(Clone, Debug)]
pub struct Query<E: Searchable> {
    needle: Option<String>,
    filter: E::Filter,
}

impl<E: Searchable> Default for Query<E> {
    fn default() -> Self {
        Self {
            needle: None,
            filter: E::Filter::default(),
        }
    }
}

impl<E: Searchable> Query<E> {
    /// Whitespace-only text matches everything; any other text is matched as given.
    pub fn new(text: &str, filter: E::Filter) -> Self {
        Self {
            needle: (!text.trim().is_empty()).then(|| text.to_lowercase()),
            filter,
        }
    }

    /// Build a query from raw text and filters, validating every filter.
    pub fn parse(text: &str, filters: &Filters) -> Result<Self, RepositoryError> {
        Ok(Self::new(text, E::parse_filters(filters)?))
    }

    pub fn matches(&self, record: &E, joins: &Joins) -> bool {
        let text_ok = match &self.needle {
            Some(needle) => record.matches_text(needle, joins),
            None => true,
        };
        text_ok && record.matches_filter(&self.filter)
    }
}

/// Lazy sequence of records matching a [`Query`].
pub struct Matches<E: Searchable> {
    records: Records<E>,
    query: Query<E>,
    joins: Arc<Joins>,
}

impl<E: Searchable> Clone for Matches<E> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            query: self.query.clone(),
            joins: self.joins.clone(),
        }
    }
}

impl<E: Searchable> Iterator for Matches<E> {
    type Item = Arc<E>;

    fn next(&mut self) -> Option<Self::Item> {
        let query = &self.query;
        let joins = self.joins.as_ref();
        self.records
            .by_ref()
            .find(|record| query.matches(record, joins))
    }
}

/// Search `records` (text AND every active filter).
pub fn search<E: Searchable>(records: Records<E>, query: Query<E>, joins: Arc<Joins>) -> Matches<E> {
    Matches {
        records,
        query,
        joins,
    }
}

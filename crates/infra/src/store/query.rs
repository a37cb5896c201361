//! Paging and sorting parameters for customer list queries.

use core::cmp::Ordering;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use customerhub_core::{DomainError, DomainResult};
use customerhub_customers::Customer;

/// Sortable customer attribute.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Created,
    Modified,
    Name,
    FirstName,
    DateOfBirth,
}

impl SortField {
    /// Column expression in the relational layout.
    pub fn column(self) -> &'static str {
        match self {
            SortField::Created => "c.created",
            SortField::Modified => "c.modified",
            SortField::Name => "c.name",
            SortField::FirstName => "c.first_name",
            SortField::DateOfBirth => "c.date_of_birth",
        }
    }

    /// Compare two aggregates on this attribute (missing dates sort last).
    pub fn compare(self, a: &Customer, b: &Customer) -> Ordering {
        match self {
            SortField::Created => a.created().at.cmp(&b.created().at),
            SortField::Modified => a.modified().at.cmp(&b.modified().at),
            SortField::Name => a.name().cmp(b.name()),
            SortField::FirstName => a.first_name().cmp(b.first_name()),
            SortField::DateOfBirth => match (a.date_of_birth(), b.date_of_birth()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    }
}

impl FromStr for SortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "created" => Ok(SortField::Created),
            "modified" => Ok(SortField::Modified),
            "name" => Ok(SortField::Name),
            "firstName" | "first_name" => Ok(SortField::FirstName),
            "dateOfBirth" | "date_of_birth" => Ok(SortField::DateOfBirth),
            other => Err(DomainError::validation(format!("unsupported sort field '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Parse `field` or `field,asc|desc`.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let (field, direction) = match raw.split_once(',') {
            Some((field, direction)) => (field, Some(direction.trim())),
            None => (raw, None),
        };
        let field = field.parse::<SortField>()?;
        let direction = match direction.map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(other) => {
                return Err(DomainError::validation(format!(
                    "unsupported sort direction '{other}'"
                )));
            }
        };
        Ok(Self { field, direction })
    }

    pub fn compare(&self, a: &Customer, b: &Customer) -> Ordering {
        let ordering = self.field.compare(a, b);
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// One page of a list query (0-based page number).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    page_number: u32,
    page_size: u32,
    sort: Sort,
}

impl PageRequest {
    pub fn new(page_number: u32, page_size: u32, sort: Sort) -> DomainResult<Self> {
        if page_size == 0 {
            return Err(DomainError::validation("page size must be at least 1"));
        }
        Ok(Self {
            page_number,
            page_size,
            sort,
        })
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page_number) * u64::from(self.page_size)
    }
}

/// A page of results plus the totals of the full match set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let total_pages = total_elements.div_ceil(u64::from(request.page_size));
        Self {
            content,
            page_number: request.page_number,
            page_size: request.page_size,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            total_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_parses_field_and_optional_direction() {
        assert_eq!(Sort::parse("created").unwrap(), Sort::asc(SortField::Created));
        assert_eq!(Sort::parse("firstName,DESC").unwrap(), Sort::desc(SortField::FirstName));
        assert!(Sort::parse("email").is_err());
        assert!(Sort::parse("name,sideways").is_err());
    }

    #[test]
    fn page_request_rejects_zero_size() {
        assert!(PageRequest::new(0, 0, Sort::default()).is_err());
        assert_eq!(PageRequest::new(3, 20, Sort::default()).unwrap().offset(), 60);
    }

    #[test]
    fn page_counts_round_up() {
        let request = PageRequest::new(0, 20, Sort::default()).unwrap();
        assert_eq!(Page::<u8>::new(vec![], &request, 0).total_pages, 0);
        assert_eq!(Page::<u8>::new(vec![], &request, 20).total_pages, 1);
        assert_eq!(Page::<u8>::new(vec![], &request, 41).total_pages, 3);
    }

    #[test]
    fn page_serializes_with_camel_case_totals() {
        let request = PageRequest::new(1, 2, Sort::desc(SortField::DateOfBirth)).unwrap();
        let json = serde_json::to_value(Page::new(vec!["a"], &request, 3)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "content": ["a"],
                "pageNumber": 1,
                "pageSize": 2,
                "totalPages": 2,
                "totalElements": 3,
            })
        );

        let sort = serde_json::to_value(request.sort()).unwrap();
        assert_eq!(sort, serde_json::json!({"field": "dateOfBirth", "direction": "desc"}));
    }
}

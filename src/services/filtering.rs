use crate::models::{Booking, Provider, Service, User};

/// A record that list screens can search and narrow by one category.
pub trait Filterable {
    /// Fields matched by the free-text query.
    fn search_fields(&self) -> Vec<&str>;

    /// The value compared by the categorical filter.
    fn category(&self) -> &str;
}

impl Filterable for Booking {
    fn search_fields(&self) -> Vec<&str> {
        [
            self.service_name.as_deref(),
            self.customer_name.as_deref(),
            Some(self.id.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn category(&self) -> &str {
        self.status.as_str()
    }
}

impl Filterable for User {
    fn search_fields(&self) -> Vec<&str> {
        [self.display_name.as_deref(), Some(self.email.as_str())]
            .into_iter()
            .flatten()
            .collect()
    }

    fn category(&self) -> &str {
        self.role.as_str()
    }
}

impl Filterable for Provider {
    fn search_fields(&self) -> Vec<&str> {
        [self.business_name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn category(&self) -> &str {
        self.status.as_str()
    }
}

impl Filterable for Service {
    fn search_fields(&self) -> Vec<&str> {
        [Some(self.name.as_str()), self.description.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn category(&self) -> &str {
        &self.category_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    /// `None`, blank and `"all"` mean no filter.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("all") => CategoryFilter::All,
            Some(v) => CategoryFilter::Only(v.to_string()),
        }
    }

    pub fn matches(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(v) => v == category,
        }
    }
}

/// Case-insensitive substring match against any field. A blank query matches.
pub fn matches_query(fields: &[&str], query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

/// Items matching both the text query and the category filter, in input order.
pub fn apply<T: Filterable + Clone>(items: &[T], query: &str, category: &CategoryFilter) -> Vec<T> {
    items
        .iter()
        .filter(|item| category.matches(item.category()))
        .filter(|item| matches_query(&item.search_fields(), query))
        .cloned()
        .collect()
}

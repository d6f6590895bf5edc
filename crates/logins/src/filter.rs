//! Search and category filtering of the login list.
//!
//! The visible list is a pure function of the logins, the search text
//! and the active filters. It is recomputed on every keystroke and every
//! filter change.

use crate::{ActiveFilters, Login};

/// Remote logins followed by custom logins, each in their original order.
pub fn all_logins<'a>(
    remote: &'a [Login],
    custom: &'a [Login],
) -> impl Iterator<Item = &'a Login> + Clone {
    remote.iter().chain(custom.iter())
}

/// Case-insensitive substring match on username, description and any
/// category value. An empty search matches everything.
pub fn matches_search(login: &Login, search: &str) -> bool {
    if search.is_empty() {
        return true;
    }
    let needle = search.to_lowercase();

    login.username.to_lowercase().contains(&needle)
        || login.description.to_lowercase().contains(&needle)
        || login
            .categories
            .values()
            .any(|value| value.to_lowercase().contains(&needle))
}

/// Every `(key, value)` filter must equal the login's category value.
/// A missing key fails the filter.
pub fn matches_filters(login: &Login, filters: &ActiveFilters) -> bool {
    filters
        .iter()
        .all(|(key, value)| login.categories.get(key).map(String::as_str) == Some(value))
}

/// Order-preserving subset of `logins` passing both predicates.
pub fn visible_logins<'a, I>(logins: I, search: &str, filters: &ActiveFilters) -> Vec<&'a Login>
where
    I: IntoIterator<Item = &'a Login>,
{
    logins
        .into_iter()
        .filter(|login| matches_search(login, search))
        .filter(|login| matches_filters(login, filters))
        .collect()
}

//! Parsing of interactive query lines.
//!
//! `key=value` tokens become filters (keys lower-cased); every other token
//! is part of the semantic query, space-joined in original order.

use crate::models::Filters;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryLine {
    /// `exit` or `quit`, any case.
    Exit,
    /// Nothing but whitespace.
    Empty,
    /// Filters were given but no query text.
    MissingQuery(Filters),
    Query { text: String, filters: Filters },
}

pub fn parse_query_line(line: &str) -> QueryLine {
    let line = line.trim();
    if line.is_empty() {
        return QueryLine::Empty;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return QueryLine::Exit;
    }

    let mut filters = Filters::new();
    let mut words = Vec::new();

    for token in line.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                filters.insert(key.to_lowercase(), value.to_string());
            }
            _ => words.push(token),
        }
    }

    if words.is_empty() {
        return QueryLine::MissingQuery(filters);
    }

    QueryLine::Query {
        text: words.join(" "),
        filters,
    }
}
